use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use presence_core::exti::avr::{
    Atmega8, Atmega32u4, Atmega328p, Atmega2560, Attiny85, AvrExtInt, AvrLine,
};
use presence_core::exti::stm32::{ExtiController, Stm32g0};
use presence_core::exti::{DeviceFamily, InterruptController, PhysicalLine, TriggerMode};
use presence_core::indicator::IndicatorPolarity;
use presence_core::presence::PresenceSnapshot;
use presence_core::sim::{
    DEFAULT_PULSE_WIDTH_TICKS, SimAvrRegisters, SimBoard, SimExtiRegisters, SimInstant,
};
use presence_core::telemetry::{TelemetryRecord, TelemetryRecorder};
use presence_core::timer::ticks_from_micros;

use crate::grammar::{self, Command, SyntaxError};

/// Bench timer clock: 8 MHz divided by 8, one tick per microsecond.
const TIMER_CLOCK_HZ: u32 = 8_000_000;
const TIMER_PRESCALER: u32 = 8;
const PRESENCE_PERIOD_US: u32 = 20_000;

pub const PERIOD_TICKS: u16 =
    match ticks_from_micros(TIMER_CLOCK_HZ, TIMER_PRESCALER, PRESENCE_PERIOD_US) {
        Some(ticks) => ticks,
        None => panic!("presence period does not fit the compare register"),
    };

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "pulse",
        "pulse [line]                  - pulse a physical line (default: channel 0)",
    ),
    (
        "train",
        "train <interval> <count>      - pulse channel 0 repeatedly",
    ),
    (
        "wait",
        "wait <duration>               - let virtual time pass (us, ms, s)",
    ),
    (
        "attach",
        "attach <channel> <mode>       - bind the pulse handler (low|change|falling|rising)",
    ),
    (
        "detach",
        "detach <channel>              - mask a channel and drop its handler",
    ),
    (
        "status",
        "status                        - show presence state and channel wiring",
    ),
    (
        "history",
        "history                       - list recorded presence events",
    ),
    (
        "help",
        "help [topic]                  - show help for a command",
    ),
];

/// Device family modelled by the bench.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Family {
    Atmega328p,
    Atmega2560,
    Atmega32u4,
    Atmega8,
    Attiny85,
    Stm32g0,
}

impl Family {
    pub const ALL: [Family; 6] = [
        Family::Atmega328p,
        Family::Atmega2560,
        Family::Atmega32u4,
        Family::Atmega8,
        Family::Attiny85,
        Family::Stm32g0,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Family::Atmega328p => Atmega328p::NAME,
            Family::Atmega2560 => Atmega2560::NAME,
            Family::Atmega32u4 => Atmega32u4::NAME,
            Family::Atmega8 => Atmega8::NAME,
            Family::Attiny85 => Attiny85::NAME,
            Family::Stm32g0 => Stm32g0::NAME,
        }
    }

    /// # Errors
    ///
    /// Returns a message naming `tag` when no family matches it.
    pub fn from_tag(tag: &str) -> Result<Self, String> {
        Self::ALL
            .into_iter()
            .find(|family| family.name().eq_ignore_ascii_case(tag))
            .ok_or_else(|| format!("Unknown device family `{tag}`"))
    }

    fn bench(self, polarity: IndicatorPolarity) -> Box<dyn Bench> {
        fn avr<F>(polarity: IndicatorPolarity) -> Box<dyn Bench>
        where
            F: DeviceFamily<Line = AvrLine> + 'static,
        {
            Box::new(SimBoard::new(
                AvrExtInt::<F, _>::new(SimAvrRegisters::new()),
                polarity,
                PERIOD_TICKS,
            ))
        }

        match self {
            Family::Atmega328p => avr::<Atmega328p>(polarity),
            Family::Atmega2560 => avr::<Atmega2560>(polarity),
            Family::Atmega32u4 => avr::<Atmega32u4>(polarity),
            Family::Atmega8 => avr::<Atmega8>(polarity),
            Family::Attiny85 => avr::<Attiny85>(polarity),
            Family::Stm32g0 => Box::new(SimBoard::new(
                ExtiController::<Stm32g0, _>::new(SimExtiRegisters::new()),
                polarity,
                PERIOD_TICKS,
            )),
        }
    }
}

/// Hardware readback for one logical channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChannelState {
    pub line: PhysicalLine,
    pub mode: Option<TriggerMode>,
    pub enabled: bool,
    pub attached: bool,
}

/// Family-erased view of a [`SimBoard`].
trait Bench {
    fn family(&self) -> &'static str;
    fn boot(&mut self) -> bool;
    fn channel_count(&self) -> usize;
    fn channel_state(&self, channel: u8) -> Option<ChannelState>;
    fn is_wired(&self, line: PhysicalLine) -> bool;
    fn pulse_line(&mut self, line: PhysicalLine) -> bool;
    fn pulse_channel(&mut self, channel: u8) -> bool;
    fn train(&mut self, interval_ticks: u32, count: u32) -> u32;
    fn advance(&mut self, ticks: u32) -> u32;
    fn attach(&mut self, channel: u8, mode: TriggerMode) -> bool;
    fn detach(&mut self, channel: u8) -> bool;
    fn snapshot(&mut self) -> PresenceSnapshot;
    fn instant(&self) -> SimInstant;
    fn telemetry(&self) -> &TelemetryRecorder<SimInstant>;
}

impl<C> Bench for SimBoard<C>
where
    C: InterruptController + 'static,
{
    fn family(&self) -> &'static str {
        self.family_name()
    }

    fn boot(&mut self) -> bool {
        SimBoard::boot(self)
    }

    fn channel_count(&self) -> usize {
        self.registry().channel_count()
    }

    fn channel_state(&self, channel: u8) -> Option<ChannelState> {
        let line = C::Family::line(channel)?;
        let controller = self.registry().controller();
        Some(ChannelState {
            line: C::Family::physical(line),
            mode: controller.trigger_mode(channel),
            enabled: controller.is_enabled(channel),
            attached: self.registry().is_attached(channel),
        })
    }

    fn is_wired(&self, line: PhysicalLine) -> bool {
        SimBoard::is_wired(self, line)
    }

    fn pulse_line(&mut self, line: PhysicalLine) -> bool {
        self.pulse(line, DEFAULT_PULSE_WIDTH_TICKS)
    }

    fn pulse_channel(&mut self, channel: u8) -> bool {
        SimBoard::pulse_channel(self, channel)
    }

    fn train(&mut self, interval_ticks: u32, count: u32) -> u32 {
        self.pulse_train(interval_ticks, count)
    }

    fn advance(&mut self, ticks: u32) -> u32 {
        SimBoard::advance(self, ticks)
    }

    fn attach(&mut self, channel: u8, mode: TriggerMode) -> bool {
        SimBoard::attach(self, channel, mode)
    }

    fn detach(&mut self, channel: u8) -> bool {
        SimBoard::detach(self, channel)
    }

    fn snapshot(&mut self) -> PresenceSnapshot {
        SimBoard::snapshot(self)
    }

    fn instant(&self) -> SimInstant {
        SimBoard::instant(self)
    }

    fn telemetry(&self) -> &TelemetryRecorder<SimInstant> {
        SimBoard::telemetry(self)
    }
}

/// Errors reported back to the operator as `ERR ...` lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandError {
    Syntax(SyntaxError),
    ChannelOutOfRange {
        channel: u8,
        count: usize,
    },
    UnwiredLine {
        line: PhysicalLine,
        family: &'static str,
    },
    NotAttached(u8),
    DurationTooLong(Duration),
    UnknownTopic(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Syntax(error) => write!(f, "syntax {error}"),
            CommandError::ChannelOutOfRange { channel, count } => {
                write!(f, "channel {channel} out of range (family has {count})")
            }
            CommandError::UnwiredLine { line, family } => {
                write!(f, "{line} is not wired on {family}")
            }
            CommandError::NotAttached(channel) => write!(f, "channel {channel} is not attached"),
            CommandError::DurationTooLong(duration) => {
                let duration = format_duration_short(*duration);
                write!(f, "duration {duration} exceeds the bench step limit")
            }
            CommandError::UnknownTopic(topic) => {
                write!(f, "no help for `{topic}` (topics: {})", help_topic_list())
            }
        }
    }
}

/// Outcome of one input line.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    Lines(Vec<String>),
    Exit,
}

pub struct Session {
    bench: Box<dyn Bench>,
    transcript: Option<TranscriptLogger>,
}

impl Session {
    /// Builds the bench and runs its boot sequence.
    ///
    /// # Errors
    ///
    /// Fails when the transcript file cannot be created.
    pub fn new(
        family: Family,
        polarity: IndicatorPolarity,
        transcript: Option<&Path>,
    ) -> io::Result<Self> {
        let transcript = transcript.map(TranscriptLogger::new).transpose()?;
        let mut bench = family.bench(polarity);
        bench.boot();

        Ok(Self { bench, transcript })
    }

    /// Lines describing the state after boot.
    ///
    /// # Errors
    ///
    /// Fails when the transcript cannot be written.
    pub fn banner(&mut self) -> io::Result<Vec<String>> {
        let snapshot = self.bench.snapshot();
        let lines = vec![
            format!(
                "Presence bench ready: family={} period={}ticks",
                self.bench.family(),
                snapshot.period_ticks
            ),
            format!(
                "boot lamp check done at {} indicator={}",
                format_instant(self.bench.instant()),
                on_off(snapshot.indicator_on)
            ),
            "Type `help` for commands or `exit` to quit.".to_string(),
        ];
        self.record_output(&lines)?;
        Ok(lines)
    }

    /// Runs one input line and returns the reply lines.
    ///
    /// # Errors
    ///
    /// Fails when the transcript cannot be written.
    pub fn handle_command(&mut self, line: &str) -> io::Result<Reply> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Reply::Lines(Vec::new()));
        }
        let at = self.bench.instant();
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.append_line(at, TranscriptRole::Host, trimmed)?;
        }

        let lines = match grammar::parse(&trimmed.to_ascii_lowercase()) {
            Ok(Command::Exit) => return Ok(Reply::Exit),
            Ok(command) => self.execute(command),
            Err(error) => Err(CommandError::Syntax(error)),
        }
        .unwrap_or_else(|error| vec![format!("ERR {error}")]);

        self.record_output(&lines)?;
        Ok(Reply::Lines(lines))
    }

    fn execute(&mut self, command: Command) -> Result<Vec<String>, CommandError> {
        match command {
            Command::Pulse { line } => self.handle_pulse(line),
            Command::Train { interval, count } => self.handle_train(interval, count),
            Command::Wait(duration) => self.handle_wait(duration),
            Command::Attach { channel, mode } => self.handle_attach(channel, mode),
            Command::Detach { channel } => self.handle_detach(channel),
            Command::Status => Ok(self.handle_status()),
            Command::History => Ok(self.handle_history()),
            Command::Help { topic } => handle_help(topic.as_deref()),
            Command::Exit => Ok(Vec::new()),
        }
    }

    fn handle_pulse(&mut self, line: Option<u8>) -> Result<Vec<String>, CommandError> {
        let (label, delivered) = match line.map(PhysicalLine) {
            Some(line) if !self.bench.is_wired(line) => {
                return Err(CommandError::UnwiredLine {
                    line,
                    family: self.bench.family(),
                });
            }
            Some(line) => (line.to_string(), self.bench.pulse_line(line)),
            None => ("channel 0".to_string(), self.bench.pulse_channel(0)),
        };
        let snapshot = self.bench.snapshot();
        Ok(vec![format!(
            "OK pulse {label} at {} delivered={} indicator={}",
            format_instant(self.bench.instant()),
            yes_no(delivered),
            on_off(snapshot.indicator_on)
        )])
    }

    fn handle_train(
        &mut self,
        interval: Duration,
        count: u32,
    ) -> Result<Vec<String>, CommandError> {
        let interval_ticks = duration_ticks(interval)?;
        let before = self.bench.snapshot();
        let delivered = self.bench.train(interval_ticks, count);
        let after = self.bench.snapshot();
        Ok(vec![format!(
            "OK train interval={} count={count} delivered={delivered} timeouts={} indicator={}",
            format_duration_short(interval),
            timeouts_between(before, after),
            on_off(after.indicator_on)
        )])
    }

    fn handle_wait(&mut self, duration: Duration) -> Result<Vec<String>, CommandError> {
        let ticks = duration_ticks(duration)?;
        let timeouts = self.bench.advance(ticks);
        let snapshot = self.bench.snapshot();
        Ok(vec![format!(
            "OK wait {} now={} timeouts={timeouts} present={} indicator={}",
            format_duration_short(duration),
            format_instant(self.bench.instant()),
            yes_no(snapshot.present),
            on_off(snapshot.indicator_on)
        )])
    }

    fn handle_attach(
        &mut self,
        channel: u8,
        mode: TriggerMode,
    ) -> Result<Vec<String>, CommandError> {
        if !self.bench.attach(channel, mode) {
            return Err(self.out_of_range(channel));
        }
        let state = self
            .bench
            .channel_state(channel)
            .ok_or_else(|| self.out_of_range(channel))?;
        Ok(vec![format!(
            "OK attach channel={channel} {} armed={}",
            state.line,
            state.mode.map_or("none", TriggerMode::name)
        )])
    }

    fn handle_detach(&mut self, channel: u8) -> Result<Vec<String>, CommandError> {
        if usize::from(channel) >= self.bench.channel_count() {
            return Err(self.out_of_range(channel));
        }
        if !self.bench.detach(channel) {
            return Err(CommandError::NotAttached(channel));
        }
        Ok(vec![format!("OK detach channel={channel}")])
    }

    fn handle_status(&mut self) -> Vec<String> {
        let snapshot = self.bench.snapshot();
        let mut lines = vec![format!(
            "family={} now={} present={} indicator={} pulses={} timeouts={} period={}ticks",
            self.bench.family(),
            format_instant(self.bench.instant()),
            yes_no(snapshot.present),
            on_off(snapshot.indicator_on),
            snapshot.pulses,
            snapshot.timeouts,
            snapshot.period_ticks
        )];
        let count = u8::try_from(self.bench.channel_count()).unwrap_or(u8::MAX);
        for channel in 0..count {
            if let Some(state) = self.bench.channel_state(channel) {
                lines.push(describe_channel(channel, state));
            }
        }
        lines
    }

    fn handle_history(&self) -> Vec<String> {
        let telemetry = self.bench.telemetry();
        if telemetry.is_empty() {
            return vec!["history empty".to_string()];
        }
        telemetry.oldest_first().map(describe_record).collect()
    }

    fn out_of_range(&self, channel: u8) -> CommandError {
        CommandError::ChannelOutOfRange {
            channel,
            count: self.bench.channel_count(),
        }
    }

    fn record_output(&mut self, lines: &[String]) -> io::Result<()> {
        let at = self.bench.instant();
        if let Some(transcript) = self.transcript.as_mut() {
            for line in lines {
                transcript.append_line(at, TranscriptRole::Emulator, line)?;
            }
        }
        Ok(())
    }
}

fn handle_help(topic: Option<&str>) -> Result<Vec<String>, CommandError> {
    match topic {
        Some(target) => HELP_TOPICS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(target))
            .map(|(_, detail)| vec![(*detail).to_string()])
            .ok_or_else(|| CommandError::UnknownTopic(target.to_string())),
        None => {
            let mut lines = vec!["Available commands:".to_string()];
            for (_, detail) in HELP_TOPICS {
                lines.push(format!("  {detail}"));
            }
            lines.push("  exit                          - leave the bench".to_string());
            Ok(lines)
        }
    }
}

/// Timeouts delivered between two snapshots; the counters wrap.
fn timeouts_between(before: PresenceSnapshot, after: PresenceSnapshot) -> u32 {
    after.timeouts.wrapping_sub(before.timeouts)
}

fn duration_ticks(duration: Duration) -> Result<u32, CommandError> {
    // One tick per microsecond.
    u32::try_from(duration.as_micros()).map_err(|_| CommandError::DurationTooLong(duration))
}

fn describe_channel(channel: u8, state: ChannelState) -> String {
    format!(
        "  ch{channel} {} mode={} mask={} handler={}",
        state.line,
        state.mode.map_or("none", TriggerMode::name),
        if state.enabled { "enabled" } else { "masked" },
        if state.attached { "attached" } else { "empty" }
    )
}

fn describe_record(record: &TelemetryRecord<SimInstant>) -> String {
    let mut line = format!(
        "  #{} {} {}",
        record.id,
        format_instant(record.timestamp),
        record.event
    );
    if let Some(elapsed) = record.elapsed_since_transition {
        line.push_str(&format!(" after={}", format_duration_short(elapsed)));
    }
    line
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_instant(instant: SimInstant) -> String {
    let elapsed = Duration::from_micros(instant.ticks());
    format!("+{}", format_duration_short(elapsed))
}

fn format_duration_short(duration: Duration) -> String {
    if duration.as_secs() == 0 {
        if duration.subsec_micros() % 1_000 == 0 {
            format!("{}ms", duration.as_millis())
        } else {
            format!("{}us", duration.as_micros())
        }
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

#[derive(Clone, Copy)]
enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

/// Plain-text log of a bench session, stamped with virtual time.
struct TranscriptLogger {
    writer: BufWriter<fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        writeln!(logger.writer, "# Presence bench transcript")?;
        logger.writer.flush()?;
        Ok(logger)
    }

    fn append_line(&mut self, at: SimInstant, role: TranscriptRole, text: &str) -> io::Result<()> {
        writeln!(
            self.writer,
            "[{:>12}] {} {text}",
            format_instant(at),
            role.prefix()
        )?;
        self.writer.flush()
    }
}
