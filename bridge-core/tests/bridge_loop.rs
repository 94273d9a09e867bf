mod support;

use bridge_core::bridge::{ConsoleReply, LoopSignal};
use bridge_core::command::{CommandKind, CommandOutcome};
use bridge_core::console::{ConsoleCommand, ConsoleError, ConsoleOutcome};
use bridge_core::protocol::{self, ChargingSources, OperatingMode};
use bridge_core::telemetry::{DecodeError, RawTelemetrySnapshot};
use bridge_core::{BridgeConfig, BridgeEvent};

use support::{TestBus, TestInstant, TestNetwork, bridge, idle_snapshot, raw_frame, stream_frame};

fn config() -> BridgeConfig<'static> {
    BridgeConfig::new().with_build("test")
}

fn count(bridge: &support::TestBridge, wanted: BridgeEvent) -> usize {
    bridge
        .journal()
        .oldest_first()
        .filter(|record| record.event == wanted)
        .count()
}

#[test]
fn begin_opens_the_interface_and_requests_the_stream() {
    let (mut bridge, wire) = bridge(config());
    bridge.begin(TestInstant(0)).unwrap();

    let mut expected = vec![128, 148, 0];
    expected.extend_from_slice(&protocol::stream_request());
    assert_eq!(wire.written(), expected);
    assert_eq!(count(&bridge, BridgeEvent::StreamRequested), 1);
}

#[test]
fn first_poll_connects_with_last_will_and_announces() {
    let (mut bridge, _wire) = bridge(config());
    let mut bus = TestBus::default();
    bridge.begin(TestInstant(0)).unwrap();

    bridge.poll_timers(TestInstant(1), &mut bus, &TestNetwork);

    assert_eq!(bus.client.as_deref(), Some("roomba"));
    assert_eq!(
        bus.will,
        Some(("vacuum/LWT".to_owned(), "OFFLINE".to_owned(), true))
    );
    assert_eq!(bus.subscriptions, ["vacuum/command"]);

    let liveness = bus.on("vacuum/LWT");
    assert_eq!(liveness.len(), 1);
    assert_eq!(liveness[0].payload, "ONLINE");
    assert!(liveness[0].retained);

    let info = bus.on("vacuum/INFO");
    assert_eq!(info.len(), 1);
    assert_eq!(
        info[0].payload,
        "{\"Hostname\":\"roomba\",\"MACAddress\":\"24:0A:C4:00:11:22\",\
         \"IPAddress\":\"192.168.1.40\",\"RSSI\":-61,\"SSID\":\"attic\",\
         \"COMPILE_DATE\":\"test\"}"
    );

    bridge.poll_timers(TestInstant(2), &mut bus, &TestNetwork);
    assert_eq!(count(&bridge, BridgeEvent::BusConnectAttempt), 1);
}

#[test]
fn reconnect_attempts_are_spaced_out() {
    let (mut bridge, _wire) = bridge(config());
    let mut bus = TestBus {
        refuse_connect: true,
        ..TestBus::default()
    };
    bridge.begin(TestInstant(0)).unwrap();

    bridge.poll_timers(TestInstant(1), &mut bus, &TestNetwork);
    bridge.poll_timers(TestInstant(30_001), &mut bus, &TestNetwork);
    assert_eq!(count(&bridge, BridgeEvent::BusConnectAttempt), 1);
    assert_eq!(count(&bridge, BridgeEvent::BusConnectFailed), 1);

    bridge.poll_timers(TestInstant(30_002), &mut bus, &TestNetwork);
    assert_eq!(count(&bridge, BridgeEvent::BusConnectAttempt), 2);
}

#[test]
fn periodic_info_carries_uptime_without_mac() {
    let (mut bridge, _wire) = bridge(config());
    let mut bus = TestBus::default();
    bridge.begin(TestInstant(0)).unwrap();
    bridge.poll_timers(TestInstant(1), &mut bus, &TestNetwork);

    bridge.poll_timers(TestInstant::secs(61), &mut bus, &TestNetwork);

    let info = bus.on("vacuum/INFO");
    assert_eq!(info.len(), 2);
    assert!(info[1].payload.starts_with("{\"UPTIME\":\"0T00:01:01\",\"Hostname\""));
    assert!(!info[1].payload.contains("MACAddress"));
}

#[test]
fn status_publishes_once_then_rerequests_the_stream() {
    let (mut bridge, wire) = bridge(config());
    let mut bus = TestBus::default();
    bridge.begin(TestInstant(0)).unwrap();
    bridge.poll_timers(TestInstant(1), &mut bus, &TestNetwork);

    bridge.ingest_serial(&stream_frame(&idle_snapshot()), TestInstant(5_000));
    assert!(bridge.state().has_snapshot());
    assert_eq!(bridge.state().battery_percent(), Some(50));

    wire.clear();
    bridge.poll_timers(TestInstant(10_001), &mut bus, &TestNetwork);

    let status = bus.on("vacuum/STATUS");
    assert_eq!(status.len(), 1);
    assert!(!status[0].retained);
    assert!(status[0].payload.contains("\"voltage\":15200"));

    let compact = bus.on("vacuum/STATUSHA");
    assert_eq!(compact.len(), 1);
    assert!(compact[0].retained);
    assert_eq!(compact[0].payload, "{\"state\":\"idle\",\"battery_level\":50}");
    assert!(bridge.state().published());
    assert!(wire.written().is_empty());

    bridge.poll_timers(TestInstant(20_002), &mut bus, &TestNetwork);
    assert_eq!(bus.on("vacuum/STATUS").len(), 1);
    assert_eq!(wire.written(), protocol::stream_request().as_slice());
}

#[test]
fn stale_telemetry_is_rerequested_instead_of_published() {
    let (mut bridge, wire) = bridge(config());
    let mut bus = TestBus::default();
    bridge.begin(TestInstant(0)).unwrap();
    bridge.poll_timers(TestInstant(1), &mut bus, &TestNetwork);
    wire.clear();

    bridge.poll_timers(TestInstant(10_001), &mut bus, &TestNetwork);

    assert!(bus.on("vacuum/STATUS").is_empty());
    assert_eq!(wire.written(), protocol::stream_request().as_slice());
}

#[test]
fn rejected_snapshots_leave_the_state_alone() {
    let (mut bridge, _wire) = bridge(config());
    bridge.begin(TestInstant(0)).unwrap();

    let cold = RawTelemetrySnapshot {
        temperature: 0,
        ..idle_snapshot()
    };
    bridge.ingest_serial(&stream_frame(&cold), TestInstant(100));

    assert!(!bridge.state().has_snapshot());
    assert_eq!(
        count(&bridge, BridgeEvent::SnapshotRejected { temperature: 0 }),
        1
    );
}

#[test]
fn unknown_packet_leaves_the_previous_state_intact() {
    let (mut bridge, _wire) = bridge(config());
    bridge.begin(TestInstant(0)).unwrap();
    bridge.ingest_serial(&stream_frame(&idle_snapshot()), TestInstant(10));
    let before = *bridge.state();

    bridge.ingest_serial(&raw_frame(&[200, 1, 2, 3]), TestInstant(20));

    assert_eq!(*bridge.state(), before);
    assert_eq!(
        count(
            &bridge,
            BridgeEvent::DecodeFailed(DecodeError::UnknownPacket { id: 200, offset: 0 })
        ),
        1
    );
}

#[test]
fn corrupted_frames_are_dropped_and_the_next_one_lands() {
    let (mut bridge, _wire) = bridge(config());
    bridge.begin(TestInstant(0)).unwrap();

    let mut corrupt = stream_frame(&idle_snapshot());
    let last = corrupt.len() - 1;
    corrupt[last] = corrupt[last].wrapping_add(1);
    bridge.ingest_serial(&corrupt, TestInstant(10));
    assert!(!bridge.state().has_snapshot());

    let frame = stream_frame(&idle_snapshot());
    let (head, tail) = frame.split_at(7);
    bridge.ingest_serial(head, TestInstant(20));
    bridge.ingest_serial(tail, TestInstant(30));
    assert_eq!(bridge.state().updated_at(), Some(TestInstant(30)));
}

#[test]
fn off_dock_wake_runs_both_sequences() {
    let (mut bridge, wire) = bridge(config());
    let mut bus = TestBus::default();
    bridge.begin(TestInstant(0)).unwrap();
    bridge.ingest_serial(&stream_frame(&idle_snapshot()), TestInstant(45_000));
    wire.clear();

    bridge.poll_timers(TestInstant(50_001), &mut bus, &TestNetwork);

    // Safe, Passive, then the base wake nudges passive mode with Start.
    assert_eq!(wire.line_pulses(), 1);
    assert_eq!(&wire.written()[..3], &[131, 130, 128]);
}

#[test]
fn docked_wake_follows_configuration() {
    let docked = RawTelemetrySnapshot {
        current: 400,
        charging_sources: ChargingSources(2),
        mode: OperatingMode::Passive,
        ..idle_snapshot()
    };

    let (mut bridge, wire) = bridge(config());
    let mut bus = TestBus::default();
    bridge.begin(TestInstant(0)).unwrap();
    bridge.ingest_serial(&stream_frame(&docked), TestInstant(45_000));
    assert!(bridge.state().docked());
    wire.clear();
    bridge.poll_timers(TestInstant(50_001), &mut bus, &TestNetwork);
    assert_eq!(wire.line_pulses(), 0);
    assert_eq!(count(&bridge, BridgeEvent::WakeSkipped), 1);

    let (mut bridge, wire) = support::bridge(config().with_dock_wake(true));
    bridge.begin(TestInstant(0)).unwrap();
    bridge.ingest_serial(&stream_frame(&docked), TestInstant(45_000));
    wire.clear();
    bridge.poll_timers(TestInstant(50_001), &mut bus, &TestNetwork);
    assert_eq!(wire.line_pulses(), 1);
    assert_eq!(&wire.written()[..3], &[128, 135, 143]);
}

#[test]
fn bus_commands_only_come_from_the_command_topic() {
    let (mut bridge, wire) = bridge(config());
    let mut bus = TestBus::default();
    bridge.begin(TestInstant(0)).unwrap();
    wire.clear();

    let signal = bridge.handle_bus_message("vacuum/other", b"clean", TestInstant(1), &mut bus);
    assert_eq!(signal, LoopSignal::Continue);
    let signal = bridge.handle_bus_message("vacuum/command", &[0xff, 0xfe], TestInstant(2), &mut bus);
    assert_eq!(signal, LoopSignal::Continue);
    assert!(wire.written().is_empty());
    assert_eq!(count(&bridge, BridgeEvent::BusMessageIgnored), 2);

    bridge.handle_bus_message("vacuum/command", b"clean", TestInstant(3), &mut bus);
    assert_eq!(wire.written(), [128, 135]);
    assert!(bridge.state().cleaning());
    assert_eq!(
        count(&bridge, BridgeEvent::CommandExecuted(CommandKind::Clean)),
        1
    );
}

#[test]
fn unrecognized_bus_commands_still_wake() {
    let (mut bridge, wire) = bridge(config());
    let mut bus = TestBus::default();
    bridge.begin(TestInstant(0)).unwrap();
    wire.clear();

    bridge.handle_bus_message("vacuum/command", b"dance", TestInstant(1), &mut bus);

    assert_eq!(wire.line_pulses(), 1);
    assert_eq!(wire.written(), [128]);
    assert_eq!(count(&bridge, BridgeEvent::CommandUnrecognized), 1);
}

#[test]
fn reboot_asks_the_platform_to_restart() {
    let (mut bridge, _wire) = bridge(config());
    let mut bus = TestBus::default();
    bridge.begin(TestInstant(0)).unwrap();

    let signal = bridge.handle_bus_message("vacuum/command", b"reboot", TestInstant(1), &mut bus);

    assert_eq!(signal, LoopSignal::Restart);
    assert_eq!(count(&bridge, BridgeEvent::RestartRequested), 1);
}

#[test]
fn send_status_publishes_immediately_when_connected() {
    let (mut bridge, _wire) = bridge(config());
    let mut bus = TestBus::default();
    bridge.begin(TestInstant(0)).unwrap();
    bridge.poll_timers(TestInstant(1), &mut bus, &TestNetwork);
    bridge.ingest_serial(&stream_frame(&idle_snapshot()), TestInstant(2));

    bridge.handle_bus_message("vacuum/command", b"send_status", TestInstant(3), &mut bus);

    assert_eq!(bus.on("vacuum/STATUS").len(), 1);
    assert_eq!(bus.on("vacuum/STATUSHA").len(), 1);
    assert!(bridge.state().published());
}

#[test]
fn console_falls_back_to_console_commands() {
    let (mut bridge, wire) = bridge(config());
    let mut bus = TestBus::default();
    bridge.begin(TestInstant(0)).unwrap();

    let reply = bridge.handle_console("return_to_base", TestInstant(1), &mut bus);
    let Ok(ConsoleReply::Command(dispatched)) = reply else {
        panic!("expected dispatched command, got {reply:?}");
    };
    assert_eq!(dispatched.kind, CommandKind::ReturnToBase);
    assert_eq!(dispatched.outcome, CommandOutcome::Executed);
    assert!(bridge.state().returning());

    let reply = bridge.handle_console("version", TestInstant(2), &mut bus);
    assert_eq!(
        reply,
        Ok(ConsoleReply::Console {
            command: ConsoleCommand::Version,
            outcome: ConsoleOutcome::Version,
        })
    );
    assert_eq!(bridge.config().build, "test");

    wire.clear();
    bridge
        .handle_console("streampause", TestInstant(3), &mut bus)
        .unwrap();
    assert!(wire.written().ends_with(&[150, 0]));

    assert_eq!(
        bridge.handle_console("frobnicate", TestInstant(4), &mut bus),
        Err(ConsoleError::Unknown)
    );
    assert_eq!(count(&bridge, BridgeEvent::ConsoleUnknown), 1);

    let reply = bridge
        .handle_console("esprestart", TestInstant(5), &mut bus)
        .unwrap();
    assert_eq!(reply.signal(), LoopSignal::Restart);
}

#[test]
fn serial_failures_surface_as_link_errors() {
    let (mut bridge, wire) = bridge(config());
    let mut bus = TestBus::default();
    wire.fail(true);

    assert!(bridge.begin(TestInstant(0)).is_err());
    assert!(matches!(
        bridge.handle_console("clean", TestInstant(1), &mut bus),
        Err(ConsoleError::Link(_))
    ));
    assert!(!bridge.state().cleaning());
    assert_eq!(count(&bridge, BridgeEvent::LinkFailed), 2);
}
