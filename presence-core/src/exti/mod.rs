//! External-interrupt abstractions shared by every supported device family.
//!
//! Firmware is written once against *logical* channel numbers. Each device
//! family describes, in a `const` table, which physical interrupt line backs
//! each logical channel and how that line's trigger bits are laid out. The
//! [`DispatchRegistry`] owns the callback table and talks to hardware only
//! through [`InterruptController`], so nothing outside this module branches
//! on the target family.

use core::fmt;

pub mod avr;
pub mod registry;
pub mod stm32;

pub use registry::{DispatchRegistry, InterruptChannel};

/// Capacity of the dispatch table; every family must fit inside it.
pub const MAX_CHANNELS: usize = 8;

/// Condition that raises an external interrupt.
///
/// The discriminants match the two-bit sense encoding used by AVR `ISCn1:0`
/// fields, which is also the reset value (`Low`) of those registers.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum TriggerMode {
    #[default]
    Low,
    Change,
    Falling,
    Rising,
}

impl TriggerMode {
    /// All modes in encoding order.
    pub const ALL: [TriggerMode; 4] = [
        TriggerMode::Low,
        TriggerMode::Change,
        TriggerMode::Falling,
        TriggerMode::Rising,
    ];

    /// Two-bit sense field value for this mode.
    #[must_use]
    pub const fn sense_bits(self) -> u8 {
        match self {
            TriggerMode::Low => 0b00,
            TriggerMode::Change => 0b01,
            TriggerMode::Falling => 0b10,
            TriggerMode::Rising => 0b11,
        }
    }

    /// Decodes a two-bit sense field; higher bits are ignored.
    #[must_use]
    pub const fn from_sense_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => TriggerMode::Low,
            0b01 => TriggerMode::Change,
            0b10 => TriggerMode::Falling,
            _ => TriggerMode::Rising,
        }
    }

    /// Returns `true` when a transition in the given direction raises the
    /// interrupt. A low-level trigger asserts as soon as the line falls.
    #[must_use]
    pub const fn fires_on(self, edge: Edge) -> bool {
        match (self, edge) {
            (TriggerMode::Change, _) => true,
            (TriggerMode::Low | TriggerMode::Falling, Edge::Falling) => true,
            (TriggerMode::Rising, Edge::Rising) => true,
            _ => false,
        }
    }

    /// Parses the lowercase mode name used in logs and the emulator.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(name))
    }

    /// Lowercase mode name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            TriggerMode::Low => "low",
            TriggerMode::Change => "change",
            TriggerMode::Falling => "falling",
            TriggerMode::Rising => "rising",
        }
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction of a level change on an input pin.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Edge {
    Rising,
    Falling,
}

/// Hardware interrupt line number (`INTn` on AVR, `EXTIn` on STM32).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalLine(pub u8);

impl PhysicalLine {
    /// Raw line index.
    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Single-bit mask for registers that carry one bit per line. Lines past
    /// the 32-bit register width have no bit and yield zero.
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn bit(self) -> u32 {
        match 1u32.checked_shl(self.0 as u32) {
            Some(bit) => bit,
            None => 0,
        }
    }
}

impl fmt::Display for PhysicalLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line{}", self.0)
    }
}

/// Word-addressed view of a peripheral's registers.
///
/// Silicon implementations perform volatile accesses; host models keep the
/// values in memory so the controllers can be exercised in tests.
pub trait RegisterFile {
    /// Register identifier.
    type Register: Copy;
    /// Register width.
    type Word: Copy;

    /// Reads the current register value.
    fn read(&self, register: Self::Register) -> Self::Word;

    /// Writes a full register value.
    fn write(&mut self, register: Self::Register, value: Self::Word);

    /// Read-modify-write helper.
    fn modify<F>(&mut self, register: Self::Register, update: F)
    where
        F: FnOnce(Self::Word) -> Self::Word,
    {
        let current = self.read(register);
        self.write(register, update(current));
    }
}

/// Compile-time description of a device family's external interrupt lines.
pub trait DeviceFamily {
    /// Per-line wiring record.
    type Line: Copy + 'static;

    /// Short family name used in logs.
    const NAME: &'static str;

    /// Lines indexed by logical channel.
    const LINES: &'static [Self::Line];

    /// Physical line behind a wiring record.
    fn physical(line: &Self::Line) -> PhysicalLine;

    /// Number of logical channels (`N`).
    fn channel_count() -> usize {
        Self::LINES.len()
    }

    /// Wiring record for a logical channel, if it exists.
    fn line(channel: u8) -> Option<&'static Self::Line> {
        Self::LINES.get(usize::from(channel))
    }

    /// Logical channel mapped to a physical line, if any.
    fn channel_for(physical: PhysicalLine) -> Option<u8> {
        Self::LINES
            .iter()
            .position(|line| Self::physical(line) == physical)
            .and_then(|index| u8::try_from(index).ok())
    }
}

/// Hardware abstraction for arming external interrupt lines.
///
/// Every method takes a logical channel and must ignore channels the family
/// does not expose.
pub trait InterruptController {
    /// Family whose register layout this controller drives.
    type Family: DeviceFamily;

    /// Writes the trigger-configuration bits for `channel`.
    fn configure_edge_trigger(&mut self, channel: u8, mode: TriggerMode);

    /// Unmasks the channel's interrupt.
    fn enable(&mut self, channel: u8);

    /// Masks the channel's interrupt.
    fn disable(&mut self, channel: u8);

    /// Reads the configured trigger mode back from hardware.
    fn trigger_mode(&self, channel: u8) -> Option<TriggerMode>;

    /// Reads the mask bit back from hardware.
    fn is_enabled(&self, channel: u8) -> bool;
}

/// Callback bound to a logical channel.
///
/// Handlers receive the device context by reference instead of reaching for
/// globals; the registry never owns that context.
pub trait InterruptHandler<Ctx>: Sync {
    /// Runs the handler in interrupt context.
    fn invoke(&self, context: &mut Ctx);
}

impl<Ctx> InterruptHandler<Ctx> for fn(&mut Ctx) {
    fn invoke(&self, context: &mut Ctx) {
        self(context);
    }
}
