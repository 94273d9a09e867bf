//! Wake templates.
//!
//! The base wake holds BRC low for a full second and then leaves it released
//! for another second before the OI is addressed. The dock and off-dock
//! variants reuse the same opcodes the vacuum's own buttons produce.

use core::time::Duration;

use super::{WakeAction, WakeSequenceKind, WakeStep, WakeTemplate};
use crate::protocol::Opcode;

/// Time the BRC line is held low.
pub const LINE_HOLD: Duration = Duration::from_millis(1_000);
/// Time the BRC line stays released before the OI is addressed.
pub const LINE_RELEASE: Duration = Duration::from_millis(1_000);
/// Settle between the base wake and the dock kick.
pub const DOCK_NUDGE_SETTLE: Duration = Duration::from_millis(10);
/// Settle between Clean and Dock in the dock variant.
pub const DOCK_CLEAN_SETTLE: Duration = Duration::from_millis(150);
/// Settle between Safe and Passive in the off-dock variant.
pub const OFF_DOCK_SETTLE: Duration = Duration::from_millis(300);

/// Ordered steps for the base wake.
pub const BASE_STEPS: [WakeStep; 3] = [
    WakeStep::new(WakeAction::AssertLine, LINE_HOLD),
    WakeStep::new(WakeAction::ReleaseLine, LINE_RELEASE),
    WakeStep::new(WakeAction::ModeNudge, Duration::ZERO),
];

/// Base wake followed by a Clean/Dock kick.
pub const DOCK_STEPS: [WakeStep; 5] = [
    WakeStep::new(WakeAction::AssertLine, LINE_HOLD),
    WakeStep::new(WakeAction::ReleaseLine, LINE_RELEASE),
    WakeStep::new(WakeAction::ModeNudge, DOCK_NUDGE_SETTLE),
    WakeStep::new(WakeAction::Write(Opcode::Clean), DOCK_CLEAN_SETTLE),
    WakeStep::new(WakeAction::Write(Opcode::Dock), Duration::ZERO),
];

/// Safe then Passive, without touching the line.
pub const OFF_DOCK_STEPS: [WakeStep; 2] = [
    WakeStep::new(WakeAction::Write(Opcode::Safe), OFF_DOCK_SETTLE),
    WakeStep::new(WakeAction::Write(Opcode::Passive), Duration::ZERO),
];

pub const BASE_TEMPLATE: WakeTemplate = WakeTemplate::new(WakeSequenceKind::Base, &BASE_STEPS);
pub const DOCK_TEMPLATE: WakeTemplate = WakeTemplate::new(WakeSequenceKind::Dock, &DOCK_STEPS);
pub const OFF_DOCK_TEMPLATE: WakeTemplate =
    WakeTemplate::new(WakeSequenceKind::OffDock, &OFF_DOCK_STEPS);

/// Returns the template for a wake variant.
#[must_use]
pub const fn template_for(kind: WakeSequenceKind) -> &'static WakeTemplate {
    match kind {
        WakeSequenceKind::Base => &BASE_TEMPLATE,
        WakeSequenceKind::Dock => &DOCK_TEMPLATE,
        WakeSequenceKind::OffDock => &OFF_DOCK_TEMPLATE,
    }
}
