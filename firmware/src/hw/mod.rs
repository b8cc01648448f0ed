//! Peripheral glue for the STM32G0B1.
//!
//! EXTI is exposed through the `RegisterFile` seam so the shared controller
//! code drives the silicon directly; TIM3 implements `CompareTimer` as a
//! free-running 1 MHz counter with channel 1 as the presence compare.

use embassy_stm32::Peri;
use embassy_stm32::pac;
use embassy_stm32::pac::exti::regs::{Exticr, Lines};
use embassy_stm32::peripherals::TIM3;
use embassy_stm32::timer::low_level::Timer;
use presence_core::exti::RegisterFile;
use presence_core::exti::stm32::ExtiRegister;
use presence_core::timer::CompareTimer;

use crate::config::TIMER_PRESCALER;

/// CC1, zero-based as the register accessors count channels.
const COMPARE_CHANNEL: usize = 0;

const _: () = assert!(TIMER_PRESCALER > 0 && TIMER_PRESCALER <= 1 << 16);
#[allow(clippy::cast_possible_truncation)]
const PSC: u16 = (TIMER_PRESCALER - 1) as u16;

/// EXTI block of the running MCU.
#[derive(Copy, Clone, Debug, Default)]
pub struct ExtiRegisters;

impl RegisterFile for ExtiRegisters {
    type Register = ExtiRegister;
    type Word = u32;

    fn read(&self, register: ExtiRegister) -> u32 {
        let exti = pac::EXTI;
        match register {
            ExtiRegister::Rtsr1 => exti.rtsr(0).read().0,
            ExtiRegister::Ftsr1 => exti.ftsr(0).read().0,
            ExtiRegister::Rpr1 => exti.rpr(0).read().0,
            ExtiRegister::Fpr1 => exti.fpr(0).read().0,
            ExtiRegister::Exticr(index) => exti.exticr(usize::from(index)).read().0,
            ExtiRegister::Imr1 => exti.imr(0).read().0,
        }
    }

    fn write(&mut self, register: ExtiRegister, value: u32) {
        let exti = pac::EXTI;
        match register {
            ExtiRegister::Rtsr1 => exti.rtsr(0).write_value(Lines(value)),
            ExtiRegister::Ftsr1 => exti.ftsr(0).write_value(Lines(value)),
            ExtiRegister::Rpr1 => exti.rpr(0).write_value(Lines(value)),
            ExtiRegister::Fpr1 => exti.fpr(0).write_value(Lines(value)),
            ExtiRegister::Exticr(index) => {
                exti.exticr(usize::from(index)).write_value(Exticr(value));
            }
            ExtiRegister::Imr1 => exti.imr(0).write_value(Lines(value)),
        }
    }
}

/// TIM3 as the presence countdown.
pub struct Tim3Compare {
    timer: Timer<'static, TIM3>,
}

impl Tim3Compare {
    /// Takes TIM3; the RCC clock gate is opened by the HAL timer.
    #[must_use]
    pub fn new(tim: Peri<'static, TIM3>) -> Self {
        Self {
            timer: Timer::new(tim),
        }
    }

    /// Clears the channel 1 match flag; call from the TIM3 interrupt.
    pub fn acknowledge(&mut self) -> bool {
        let sr = self.timer.regs_gp16().sr();
        let matched = sr.read().ccif(COMPARE_CHANNEL);
        sr.modify(|w| w.set_ccif(COMPARE_CHANNEL, false));
        matched
    }
}

impl CompareTimer for Tim3Compare {
    fn configure(&mut self) {
        self.timer.stop();
        let core = self.timer.regs_core();
        core.psc().write_value(PSC);
        core.arr().write(|w| w.set_arr(u16::MAX));
        core.egr().write(|w| w.set_ug(true));

        self.timer.regs_gp16().sr().modify(|w| {
            w.set_uif(false);
            w.set_ccif(COMPARE_CHANNEL, false);
        });
        self.timer.start();
    }

    fn set_compare(&mut self, ticks: u16) {
        let gp16 = self.timer.regs_gp16();
        gp16.ccr(COMPARE_CHANNEL).write(|w| w.set_ccr(ticks));
    }

    fn reset_counter(&mut self) {
        self.timer.regs_core().cnt().write(|w| w.set_cnt(0));
        let gp16 = self.timer.regs_gp16();
        gp16.sr().modify(|w| w.set_ccif(COMPARE_CHANNEL, false));
    }

    fn enable_compare_interrupt(&mut self) {
        let gp16 = self.timer.regs_gp16();
        gp16.dier().modify(|w| w.set_ccie(COMPARE_CHANNEL, true));
    }
}
