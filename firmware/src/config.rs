#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Board bindings and timing constants.
//!
//! The pulse input is PA6 (EXTI6, logical channel 0) with a pull-up; the
//! indicator is PA7. TIM3 runs from the 16 MHz HSI divided by 16, so one
//! timer tick is one microsecond.

use presence_core::exti::TriggerMode;
use presence_core::indicator::IndicatorPolarity;
use presence_core::timer::ticks_from_micros;

#[cfg(feature = "family-stm32g0")]
pub use presence_core::exti::stm32::Stm32g0 as Family;

pub use presence_core::self_test::{SELF_TEST_INTERVAL_MS, SELF_TEST_TOGGLES};

/// Logical channel wired to the pulse input.
pub const PULSE_CHANNEL: u8 = 0;
pub const PULSE_TRIGGER: TriggerMode = TriggerMode::Falling;

pub const TIMER_CLOCK_HZ: u32 = 16_000_000;
pub const TIMER_PRESCALER: u32 = 16;

/// Longest accepted gap between pulses before presence is asserted.
pub const PRESENCE_PERIOD_US: u32 = 20_000;

pub const PERIOD_TICKS: u16 =
    match ticks_from_micros(TIMER_CLOCK_HZ, TIMER_PRESCALER, PRESENCE_PERIOD_US) {
        Some(ticks) => ticks,
        None => panic!("presence period does not fit TIM3"),
    };

#[cfg(feature = "active-low")]
pub const INDICATOR_POLARITY: IndicatorPolarity = IndicatorPolarity::ActiveLow;
#[cfg(not(feature = "active-low"))]
pub const INDICATOR_POLARITY: IndicatorPolarity = IndicatorPolarity::ActiveHigh;

/// Interval between status heartbeats.
pub const HEARTBEAT_SECS: u64 = 5;
