mod grammar;
mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use presence_core::indicator::IndicatorPolarity;
use session::{Family, Reply, Session};

struct Options {
    family: Family,
    polarity: IndicatorPolarity,
    transcript: Option<PathBuf>,
}

fn main() -> io::Result<()> {
    let options = parse_options().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!(
            "Usage: presence-emulator [--family <name>] [--active-low] [--transcript <path>]"
        );
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(
        options.family,
        options.polarity,
        options.transcript.as_deref(),
    )?;
    let mut line = String::new();

    for banner in session.banner()? {
        writeln!(writer, "{banner}")?;
    }

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        match session.handle_command(&line)? {
            Reply::Exit => {
                writeln!(writer, "Session closed.")?;
                break;
            }
            Reply::Lines(responses) => {
                for response in responses {
                    writeln!(writer, "{response}")?;
                }
            }
        }
    }

    Ok(())
}

fn parse_options() -> Result<Options, String> {
    let mut options = Options {
        family: Family::Atmega328p,
        polarity: IndicatorPolarity::ActiveHigh,
        transcript: None,
    };
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--family=") {
            options.family = Family::from_tag(value)?;
        } else if arg == "--family" {
            let value = args
                .next()
                .ok_or_else(|| "Expected value after --family".to_string())?;
            options.family = Family::from_tag(&value)?;
        } else if arg == "--active-low" {
            options.polarity = IndicatorPolarity::ActiveLow;
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
    Ok(options)
}
