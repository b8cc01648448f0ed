//! Command-line grammar for the presence bench.
//!
//! Lines are lower-cased by the caller and parsed with `winnow` into
//! [`Command`] values. Durations accept `us`, `ms`, and `s` suffixes.

use std::fmt;
use std::time::Duration;

use presence_core::exti::TriggerMode;
use winnow::ascii::{dec_uint, space0, space1};
use winnow::combinator::{alt, cut_err, dispatch, empty, eof, fail, opt, preceded, terminated};
use winnow::error::{StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::take_while;

/// Parsed bench command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Pulse a physical line, or the line behind channel 0 when omitted.
    Pulse {
        line: Option<u8>,
    },
    Train {
        interval: Duration,
        count: u32,
    },
    Wait(Duration),
    Attach {
        channel: u8,
        mode: TriggerMode,
    },
    Detach {
        channel: u8,
    },
    Status,
    History,
    Help {
        topic: Option<String>,
    },
    Exit,
}

/// Syntax error with the byte offset where parsing stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxError {
    pub offset: usize,
    pub message: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "at column {}", self.offset + 1)
        } else {
            write!(f, "at column {}: {}", self.offset + 1, self.message)
        }
    }
}

/// Parses one command line.
///
/// # Errors
///
/// Returns the offset and expectation of the first token that does not fit.
pub fn parse(line: &str) -> Result<Command, SyntaxError> {
    terminated(command, (space0, eof))
        .parse(line.trim())
        .map_err(|error| SyntaxError {
            offset: error.offset(),
            message: error.inner().to_string().replace('\n', "; "),
        })
}

fn keyword<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '-').parse_next(input)
}

fn command(input: &mut &str) -> ModalResult<Command> {
    dispatch! { keyword;
        "pulse" => opt(preceded(space1, line_number)).map(|line| Command::Pulse { line }),
        "train" => (preceded(space1, duration), preceded(space1, count))
            .map(|(interval, count)| Command::Train { interval, count }),
        "wait" => preceded(space1, duration).map(Command::Wait),
        "attach" => (preceded(space1, channel), preceded(space1, trigger_mode))
            .map(|(channel, mode)| Command::Attach { channel, mode }),
        "detach" => preceded(space1, channel).map(|channel| Command::Detach { channel }),
        "status" => empty.value(Command::Status),
        "history" => empty.value(Command::History),
        "help" => opt(preceded(space1, keyword))
            .map(|topic: Option<&str>| Command::Help { topic: topic.map(str::to_string) }),
        "exit" | "quit" => empty.value(Command::Exit),
        _ => fail.context(StrContext::Label("command")),
    }
    .parse_next(input)
}

fn line_number(input: &mut &str) -> ModalResult<u8> {
    cut_err(dec_uint)
        .context(StrContext::Label("line"))
        .parse_next(input)
}

fn channel(input: &mut &str) -> ModalResult<u8> {
    cut_err(dec_uint)
        .context(StrContext::Label("channel"))
        .parse_next(input)
}

fn count(input: &mut &str) -> ModalResult<u32> {
    cut_err(dec_uint)
        .context(StrContext::Label("count"))
        .parse_next(input)
}

fn trigger_mode(input: &mut &str) -> ModalResult<TriggerMode> {
    cut_err(keyword.verify_map(TriggerMode::from_name))
        .context(StrContext::Label("trigger mode"))
        .context(StrContext::Expected(StrContextValue::Description(
            "low, change, falling, or rising",
        )))
        .parse_next(input)
}

fn duration(input: &mut &str) -> ModalResult<Duration> {
    cut_err((dec_uint::<_, u64, _>, alt(("us", "ms", "s"))))
        .map(|(value, unit)| match unit {
            "us" => Duration::from_micros(value),
            "ms" => Duration::from_millis(value),
            _ => Duration::from_secs(value),
        })
        .context(StrContext::Label("duration"))
        .context(StrContext::Expected(StrContextValue::Description("<n>us, <n>ms, or <n>s")))
        .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_command() {
        assert_eq!(parse("pulse"), Ok(Command::Pulse { line: None }));
        assert_eq!(parse("pulse 4"), Ok(Command::Pulse { line: Some(4) }));
        assert_eq!(
            parse("train 10ms 20"),
            Ok(Command::Train {
                interval: Duration::from_millis(10),
                count: 20
            })
        );
        assert_eq!(parse("wait 2s"), Ok(Command::Wait(Duration::from_secs(2))));
        assert_eq!(
            parse("wait 150us"),
            Ok(Command::Wait(Duration::from_micros(150)))
        );
        assert_eq!(
            parse("attach 1 rising"),
            Ok(Command::Attach {
                channel: 1,
                mode: TriggerMode::Rising
            })
        );
        assert_eq!(parse("detach 0"), Ok(Command::Detach { channel: 0 }));
        assert_eq!(parse("status"), Ok(Command::Status));
        assert_eq!(parse("history"), Ok(Command::History));
        assert_eq!(
            parse("help wait"),
            Ok(Command::Help {
                topic: Some("wait".to_string())
            })
        );
        assert_eq!(parse("  exit  "), Ok(Command::Exit));
    }

    #[test]
    fn rejects_unknown_modes_and_units() {
        let error = parse("attach 0 both").expect_err("unknown mode");
        assert_eq!(error.offset, 9);
        assert!(error.message.contains("trigger mode"));

        assert!(parse("wait 10").is_err());
        assert!(parse("wait 10m").is_err());
    }

    #[test]
    fn rejects_trailing_input_and_overflow() {
        assert!(parse("status now").is_err());
        assert!(parse("detach 300").is_err());
        assert!(parse("reboot").is_err());
        assert!(parse("").is_err());
    }
}
