//! Power-on lamp check.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::StatefulOutputPin;

use crate::indicator::Indicator;

/// Number of toggles performed at boot.
pub const SELF_TEST_TOGGLES: u8 = 10;

/// Pause after each toggle, in milliseconds.
pub const SELF_TEST_INTERVAL_MS: u32 = 1_000;

/// Blinks the indicator `toggles` times, waiting `interval_ms` after each
/// toggle. Each step reads the pin back and drives the opposite level.
///
/// Returns the logical state the indicator is left in; the presence monitor
/// does not reset it, so the first event after boot decides what happens next.
///
/// # Errors
///
/// Propagates the pin driver's error; the remaining toggles are skipped.
pub fn run<P, D>(
    indicator: &mut Indicator<P>,
    delay: &mut D,
    toggles: u8,
    interval_ms: u32,
) -> Result<bool, P::Error>
where
    P: StatefulOutputPin,
    D: DelayNs,
{
    let mut on = indicator.is_on()?;
    for _ in 0..toggles {
        on = indicator.toggle()?;
        delay.delay_ms(interval_ms);
    }
    Ok(on)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::IndicatorPolarity;
    use crate::sim::SimPin;

    #[derive(Default)]
    struct MockDelay {
        total_ms: u64,
        calls: u32,
    }

    impl DelayNs for MockDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.total_ms += u64::from(ns) / 1_000_000;
        }

        fn delay_ms(&mut self, ms: u32) {
            self.total_ms += u64::from(ms);
            self.calls += 1;
        }
    }

    #[test]
    fn even_toggle_count_returns_to_initial_level() {
        let mut indicator = Indicator::new(SimPin::new(false), IndicatorPolarity::ActiveHigh);
        let mut delay = MockDelay::default();

        let on = run(
            &mut indicator,
            &mut delay,
            SELF_TEST_TOGGLES,
            SELF_TEST_INTERVAL_MS,
        )
        .expect("infallible");

        assert!(!on);
        assert_eq!(indicator.pin().writes(), 10);
        assert_eq!(delay.calls, 10);
        assert_eq!(delay.total_ms, 10_000);
    }

    #[test]
    fn odd_toggle_count_leaves_indicator_lit() {
        let mut indicator = Indicator::new(SimPin::new(true), IndicatorPolarity::ActiveLow);
        let mut delay = MockDelay::default();

        let on = run(&mut indicator, &mut delay, 3, 5).expect("infallible");

        assert!(on);
        assert!(!indicator.pin().level());
        assert_eq!(delay.total_ms, 15);
    }
}
