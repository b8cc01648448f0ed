//! STM32G0 extended interrupt controller (EXTI).
//!
//! EXTI is edge-only: each line has a rising-trigger bit in `RTSR1` and a
//! falling-trigger bit in `FTSR1`, a mask bit in `IMR1`, and a port selector
//! in `EXTICRx`. Pending edges are latched in the write-one-to-clear `RPR1`
//! and `FPR1` registers, and lines share NVIC vectors in groups.

use core::marker::PhantomData;

use super::{
    DeviceFamily, InterruptController, MAX_CHANNELS, PhysicalLine, RegisterFile, TriggerMode,
};

/// EXTI registers used by the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExtiRegister {
    Rtsr1,
    Ftsr1,
    Rpr1,
    Fpr1,
    Exticr(u8),
    Imr1,
}

impl ExtiRegister {
    /// Byte offset from the EXTI base address.
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn offset(self) -> usize {
        match self {
            ExtiRegister::Rtsr1 => 0x00,
            ExtiRegister::Ftsr1 => 0x04,
            ExtiRegister::Rpr1 => 0x0C,
            ExtiRegister::Fpr1 => 0x10,
            ExtiRegister::Exticr(index) => 0x60 + 4 * (index as usize),
            ExtiRegister::Imr1 => 0x80,
        }
    }

    /// Returns `true` for registers whose bits clear when written as one.
    #[must_use]
    pub const fn is_write_one_to_clear(self) -> bool {
        matches!(self, ExtiRegister::Rpr1 | ExtiRegister::Fpr1)
    }
}

/// GPIO port feeding an EXTI line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GpioPort {
    A,
    B,
    C,
    D,
    F,
}

impl GpioPort {
    /// `EXTICR` selector value.
    #[must_use]
    pub const fn selector(self) -> u32 {
        match self {
            GpioPort::A => 0,
            GpioPort::B => 1,
            GpioPort::C => 2,
            GpioPort::D => 3,
            GpioPort::F => 5,
        }
    }
}

/// Wiring of one EXTI line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ExtiLine {
    pub line: PhysicalLine,
    pub port: GpioPort,
}

impl ExtiLine {
    #[must_use]
    pub const fn new(line: u8, port: GpioPort) -> Self {
        Self {
            line: PhysicalLine(line),
            port,
        }
    }

    const fn exticr(&self) -> ExtiRegister {
        ExtiRegister::Exticr(self.line.0 / 4)
    }

    #[allow(clippy::cast_lossless)]
    const fn exticr_shift(&self) -> u32 {
        (self.line.0 % 4) as u32 * 8
    }
}

/// Checks that every line is a GPIO EXTI line (0..=15) and appears once.
#[must_use]
pub const fn layout_is_valid(lines: &[ExtiLine]) -> bool {
    if lines.is_empty() || lines.len() > MAX_CHANNELS {
        return false;
    }

    let mut i = 0;
    while i < lines.len() {
        if lines[i].line.0 > 15 {
            return false;
        }
        let mut j = i + 1;
        while j < lines.len() {
            if lines[j].line.0 == lines[i].line.0 {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

/// STM32G0 family as wired on the presence board: channel 0 is the pulse
/// input on PA6, channel 1 a spare input on PB4.
#[derive(Copy, Clone, Debug)]
pub struct Stm32g0;

impl DeviceFamily for Stm32g0 {
    type Line = ExtiLine;
    const NAME: &'static str = "stm32g0";
    const LINES: &'static [ExtiLine] =
        &[ExtiLine::new(6, GpioPort::A), ExtiLine::new(4, GpioPort::B)];

    fn physical(line: &ExtiLine) -> PhysicalLine {
        line.line
    }
}

const _: () = assert!(layout_is_valid(Stm32g0::LINES));

/// Shared NVIC vectors on the STM32G0.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExtiVector {
    Exti0_1,
    Exti2_3,
    Exti4_15,
}

impl ExtiVector {
    /// Lines routed to this vector.
    #[must_use]
    pub const fn lines(self) -> u32 {
        match self {
            ExtiVector::Exti0_1 => 0x0000_0003,
            ExtiVector::Exti2_3 => 0x0000_000C,
            ExtiVector::Exti4_15 => 0x0000_FFF0,
        }
    }

    /// Vector serving a given line.
    #[must_use]
    pub const fn for_line(line: PhysicalLine) -> Self {
        match line.0 {
            0 | 1 => ExtiVector::Exti0_1,
            2 | 3 => ExtiVector::Exti2_3,
            _ => ExtiVector::Exti4_15,
        }
    }
}

/// Rising/falling enable bits for a trigger mode. EXTI cannot sense levels,
/// so `Low` arms the falling edge that starts the low period.
#[must_use]
pub const fn edge_bits(mode: TriggerMode) -> (bool, bool) {
    match mode {
        TriggerMode::Low | TriggerMode::Falling => (false, true),
        TriggerMode::Rising => (true, false),
        TriggerMode::Change => (true, true),
    }
}

/// Set of pending lines taken from `RPR1`/`FPR1`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PendingLines(u32);

impl PendingLines {
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Iterator for PendingLines {
    type Item = PhysicalLine;

    fn next(&mut self) -> Option<Self::Item> {
        if self.0 == 0 {
            return None;
        }
        let index = self.0.trailing_zeros();
        self.0 &= self.0 - 1;
        u8::try_from(index).ok().map(PhysicalLine)
    }
}

/// [`InterruptController`] for EXTI over a 32-bit register file.
pub struct ExtiController<F, R> {
    registers: R,
    _family: PhantomData<F>,
}

impl<F, R> ExtiController<F, R>
where
    F: DeviceFamily<Line = ExtiLine>,
    R: RegisterFile<Register = ExtiRegister, Word = u32>,
{
    const LAYOUT_OK: () = assert!(layout_is_valid(F::LINES), "unsupported EXTI family layout");

    #[must_use]
    pub fn new(registers: R) -> Self {
        let () = Self::LAYOUT_OK;
        Self {
            registers,
            _family: PhantomData,
        }
    }

    #[must_use]
    pub fn registers(&self) -> &R {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut R {
        &mut self.registers
    }

    /// Collects and acknowledges the pending edges served by `vector`,
    /// limited to lines the family maps to a logical channel.
    pub fn take_pending(&mut self, vector: ExtiVector) -> PendingLines {
        let mapped = F::LINES
            .iter()
            .fold(0u32, |mask, line| mask | line.line.bit());
        let pending = (self.registers.read(ExtiRegister::Rpr1)
            | self.registers.read(ExtiRegister::Fpr1))
            & vector.lines()
            & mapped;

        if pending != 0 {
            self.registers.write(ExtiRegister::Rpr1, pending);
            self.registers.write(ExtiRegister::Fpr1, pending);
        }
        PendingLines(pending)
    }
}

fn set_bit(value: u32, bit: u32, enabled: bool) -> u32 {
    if enabled { value | bit } else { value & !bit }
}

impl<F, R> InterruptController for ExtiController<F, R>
where
    F: DeviceFamily<Line = ExtiLine>,
    R: RegisterFile<Register = ExtiRegister, Word = u32>,
{
    type Family = F;

    fn configure_edge_trigger(&mut self, channel: u8, mode: TriggerMode) {
        let Some(line) = F::line(channel) else {
            return;
        };
        let bit = line.line.bit();
        let (rising, falling) = edge_bits(mode);
        let shift = line.exticr_shift();
        let selector = line.port.selector() << shift;

        self.registers
            .modify(line.exticr(), |value| (value & !(0xFF << shift)) | selector);
        self.registers
            .modify(ExtiRegister::Rtsr1, |value| set_bit(value, bit, rising));
        self.registers
            .modify(ExtiRegister::Ftsr1, |value| set_bit(value, bit, falling));
    }

    fn enable(&mut self, channel: u8) {
        if let Some(line) = F::line(channel) {
            let bit = line.line.bit();
            self.registers.modify(ExtiRegister::Imr1, |imr| imr | bit);
        }
    }

    fn disable(&mut self, channel: u8) {
        if let Some(line) = F::line(channel) {
            let bit = line.line.bit();
            self.registers.modify(ExtiRegister::Imr1, |imr| imr & !bit);
        }
    }

    fn trigger_mode(&self, channel: u8) -> Option<TriggerMode> {
        let line = F::line(channel)?;
        let bit = line.line.bit();
        let rising = self.registers.read(ExtiRegister::Rtsr1) & bit != 0;
        let falling = self.registers.read(ExtiRegister::Ftsr1) & bit != 0;
        match (rising, falling) {
            (true, true) => Some(TriggerMode::Change),
            (true, false) => Some(TriggerMode::Rising),
            (false, true) => Some(TriggerMode::Falling),
            (false, false) => None,
        }
    }

    fn is_enabled(&self, channel: u8) -> bool {
        F::line(channel)
            .is_some_and(|line| self.registers.read(ExtiRegister::Imr1) & line.line.bit() != 0)
    }
}
