mod session;
mod sim;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use crossterm::style::Stylize;

use session::{LineKind, OutputLine, Session, SessionOptions};

const USAGE: &str =
    "Usage: bridge-emulator [--hostname <name>] [--dock-wake] [--transcript <path>]";

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(&options)?;
    let mut line = String::new();

    writeln!(
        writer,
        "{}",
        "Vacuum bridge emulator ready. Type `help` for commands or `exit` to quit.".bold()
    )?;
    print_lines(&mut writer, &session.drain_startup()?)?;

    loop {
        line.clear();
        write!(writer, "{} ", ">".bold())?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.eq_ignore_ascii_case("exit") {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session.handle_command(trimmed)?;
        print_lines(&mut writer, &responses)?;
    }

    Ok(())
}

fn print_lines(writer: &mut impl Write, lines: &[OutputLine]) -> io::Result<()> {
    for line in lines {
        let text = line.text.as_str();
        match line.kind {
            LineKind::Reply => writeln!(writer, "{text}")?,
            LineKind::Published => writeln!(writer, "{}", text.cyan())?,
            LineKind::Event => writeln!(writer, "{}", text.dark_grey())?,
            LineKind::Warning => writeln!(writer, "{}", text.yellow())?,
            LineKind::Error => writeln!(writer, "{}", text.red())?,
        }
    }
    Ok(())
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<SessionOptions, String> {
    let mut options = SessionOptions {
        hostname: "roomba".to_string(),
        ..SessionOptions::default()
    };

    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--hostname=") {
            options.hostname = value.to_string();
        } else if arg == "--hostname" {
            options.hostname = args
                .next()
                .ok_or_else(|| "Expected value after --hostname".to_string())?;
        } else if arg == "--dock-wake" {
            options.dock_wake = true;
        } else if let Some(value) = arg.strip_prefix("--transcript=") {
            options.transcript = Some(PathBuf::from(value));
        } else if arg == "--transcript" {
            let value = args
                .next()
                .ok_or_else(|| "Expected value after --transcript".to_string())?;
            options.transcript = Some(PathBuf::from(value));
        } else {
            return Err(format!("Unknown argument `{arg}`"));
        }
    }

    if options.hostname.is_empty() {
        return Err("Hostname must not be empty".to_string());
    }
    Ok(options)
}
