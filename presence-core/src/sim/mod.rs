//! In-memory hardware models for host builds.
//!
//! The models keep register and pin state in plain fields so the same
//! controllers, timer contract, and state machine the firmware runs can be
//! driven from tests and from the emulator without touching real hardware.

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin, StatefulOutputPin};

use crate::exti::avr::AvrRegister;
use crate::exti::stm32::ExtiRegister;
use crate::exti::{PhysicalLine, RegisterFile};
use crate::timer::CompareTimer;

mod board;

pub use board::{DEFAULT_PULSE_WIDTH_TICKS, SimBoard, SimInstant, SimMonitor};

/// AVR external-interrupt registers, all zero at reset.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SimAvrRegisters {
    values: [u8; AvrRegister::COUNT],
}

impl SimAvrRegisters {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: [0; AvrRegister::COUNT],
        }
    }
}

impl RegisterFile for SimAvrRegisters {
    type Register = AvrRegister;
    type Word = u8;

    fn read(&self, register: AvrRegister) -> u8 {
        self.values[register.index()]
    }

    fn write(&mut self, register: AvrRegister, value: u8) {
        self.values[register.index()] = value;
    }
}

/// STM32G0 EXTI registers with write-one-to-clear pending flags.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SimExtiRegisters {
    rtsr1: u32,
    ftsr1: u32,
    rpr1: u32,
    fpr1: u32,
    imr1: u32,
    exticr: [u32; 4],
}

impl SimExtiRegisters {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            rtsr1: 0,
            ftsr1: 0,
            rpr1: 0,
            fpr1: 0,
            imr1: 0,
            exticr: [0; 4],
        }
    }

    /// Sets the rising pending flag for `line`, as the hardware does when an
    /// armed rising edge arrives.
    pub fn latch_rising(&mut self, line: PhysicalLine) {
        self.rpr1 |= line.bit();
    }

    /// Sets the falling pending flag for `line`.
    pub fn latch_falling(&mut self, line: PhysicalLine) {
        self.fpr1 |= line.bit();
    }
}

impl RegisterFile for SimExtiRegisters {
    type Register = ExtiRegister;
    type Word = u32;

    fn read(&self, register: ExtiRegister) -> u32 {
        match register {
            ExtiRegister::Rtsr1 => self.rtsr1,
            ExtiRegister::Ftsr1 => self.ftsr1,
            ExtiRegister::Rpr1 => self.rpr1,
            ExtiRegister::Fpr1 => self.fpr1,
            ExtiRegister::Imr1 => self.imr1,
            ExtiRegister::Exticr(index) => self
                .exticr
                .get(usize::from(index))
                .copied()
                .unwrap_or_default(),
        }
    }

    fn write(&mut self, register: ExtiRegister, value: u32) {
        match register {
            ExtiRegister::Rtsr1 => self.rtsr1 = value,
            ExtiRegister::Ftsr1 => self.ftsr1 = value,
            ExtiRegister::Rpr1 => self.rpr1 &= !value,
            ExtiRegister::Fpr1 => self.fpr1 &= !value,
            ExtiRegister::Imr1 => self.imr1 = value,
            ExtiRegister::Exticr(index) => {
                if let Some(slot) = self.exticr.get_mut(usize::from(index)) {
                    *slot = value;
                }
            }
        }
    }
}

/// Compare-match timer in clear-on-match mode.
///
/// The counter only moves when [`SimCompareTimer::advance`] is called; a
/// match resets it to zero.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SimCompareTimer {
    configured: bool,
    interrupt_enabled: bool,
    compare: u16,
    counter: u16,
    matches: u32,
}

impl SimCompareTimer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            configured: false,
            interrupt_enabled: false,
            compare: 0,
            counter: 0,
            matches: 0,
        }
    }

    #[must_use]
    pub const fn compare(&self) -> u16 {
        self.compare
    }

    #[must_use]
    pub const fn counter(&self) -> u16 {
        self.counter
    }

    #[must_use]
    pub const fn matches(&self) -> u32 {
        self.matches
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.configured
    }

    /// Ticks left before the next compare-match interrupt, if one is armed.
    #[must_use]
    pub fn ticks_until_match(&self) -> Option<u32> {
        if !self.configured || !self.interrupt_enabled || self.compare == 0 {
            return None;
        }
        Some(u32::from(self.compare.saturating_sub(self.counter)).max(1))
    }

    /// Counts `ticks` forward and reports whether the compare value was
    /// reached. Callers step at most [`Self::ticks_until_match`] at a time.
    pub fn advance(&mut self, ticks: u32) -> bool {
        if !self.configured {
            return false;
        }
        let target = u32::from(self.counter) + ticks;
        if self.compare != 0 && target >= u32::from(self.compare) {
            self.counter = 0;
            self.matches = self.matches.wrapping_add(1);
            return self.interrupt_enabled;
        }
        self.counter = u16::try_from(target).unwrap_or(u16::MAX);
        false
    }
}

impl CompareTimer for SimCompareTimer {
    fn configure(&mut self) {
        self.configured = true;
    }

    fn set_compare(&mut self, ticks: u16) {
        self.compare = ticks;
    }

    fn reset_counter(&mut self) {
        self.counter = 0;
    }

    fn enable_compare_interrupt(&mut self) {
        self.interrupt_enabled = true;
    }
}

/// Push-pull output whose latch can be read back. Counts level writes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SimPin {
    level: bool,
    writes: u32,
}

impl SimPin {
    #[must_use]
    pub const fn new(level: bool) -> Self {
        Self { level, writes: 0 }
    }

    /// Current electrical level, `true` meaning high.
    #[must_use]
    pub const fn level(&self) -> bool {
        self.level
    }

    /// Number of `set_high`/`set_low` calls so far.
    #[must_use]
    pub const fn writes(&self) -> u32 {
        self.writes
    }

    /// Changes the latch without counting a write, like a debugger poke.
    pub fn force(&mut self, level: bool) {
        self.level = level;
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.level = false;
        self.writes += 1;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.level = true;
        self.writes += 1;
        Ok(())
    }
}

impl StatefulOutputPin for SimPin {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.level)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exti_pending_flags_clear_on_write_one() {
        let mut regs = SimExtiRegisters::new();
        regs.latch_falling(PhysicalLine(6));
        regs.latch_falling(PhysicalLine(4));

        regs.write(ExtiRegister::Fpr1, PhysicalLine(6).bit());
        assert_eq!(regs.read(ExtiRegister::Fpr1), PhysicalLine(4).bit());

        regs.write(ExtiRegister::Fpr1, 0);
        assert_eq!(regs.read(ExtiRegister::Fpr1), PhysicalLine(4).bit());
    }

    #[test]
    fn compare_timer_matches_and_clears_counter() {
        let mut timer = SimCompareTimer::new();
        assert_eq!(timer.ticks_until_match(), None);

        timer.configure();
        timer.set_compare(100);
        timer.enable_compare_interrupt();

        assert!(!timer.advance(60));
        assert_eq!(timer.ticks_until_match(), Some(40));
        assert!(timer.advance(40));
        assert_eq!(timer.counter(), 0);
        assert_eq!(timer.matches(), 1);
    }

    #[test]
    fn compare_timer_without_interrupt_counts_silently() {
        let mut timer = SimCompareTimer::new();
        timer.configure();
        timer.set_compare(10);

        assert!(!timer.advance(10));
        assert_eq!(timer.matches(), 1);
        assert_eq!(timer.ticks_until_match(), None);
    }
}
