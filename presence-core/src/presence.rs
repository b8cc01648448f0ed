//! Deadman presence detector.
//!
//! Every observed pulse restarts the countdown and clears presence; a
//! countdown expiry with no pulse in between asserts presence and restarts
//! the countdown. The indicator is lit exactly while presence is asserted.

use core::convert::Infallible;

use embedded_hal::digital::StatefulOutputPin;

use crate::exti::InterruptHandler;
use crate::indicator::Indicator;
use crate::timer::{CompareTimer, TimeoutTimer};

/// Indicator change caused by one event.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Transition {
    #[default]
    Unchanged,
    /// A pulse turned the indicator off.
    Cleared,
    /// A timeout turned the indicator on.
    Asserted,
}

/// Counters and flags reported by [`PresenceMonitor::snapshot`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PresenceSnapshot {
    pub present: bool,
    pub indicator_on: bool,
    pub pulses: u32,
    pub timeouts: u32,
    pub period_ticks: u16,
}

/// Presence state machine owning the indicator and the timeout timer.
///
/// Lifecycle: constructed once at boot, [`start`](Self::start)ed after the
/// self-test, then mutated only by [`on_pulse`](Self::on_pulse) and
/// [`on_timeout`](Self::on_timeout) from their interrupt handlers.
pub struct PresenceMonitor<P, T> {
    indicator: Indicator<P>,
    timer: TimeoutTimer<T>,
    present: bool,
    pulses: u32,
    timeouts: u32,
    last_transition: Transition,
}

fn infallible<V>(result: Result<V, Infallible>) -> V {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}

impl<P, T> PresenceMonitor<P, T>
where
    P: StatefulOutputPin<Error = Infallible>,
    T: CompareTimer,
{
    #[must_use]
    pub const fn new(indicator: Indicator<P>, timer: T, period: u16) -> Self {
        Self {
            indicator,
            timer: TimeoutTimer::with_period(timer, period),
            present: false,
            pulses: 0,
            timeouts: 0,
            last_transition: Transition::Unchanged,
        }
    }

    /// Starts the countdown. The indicator is left at whatever level the
    /// self-test produced until the first event decides the state.
    pub fn start(&mut self) {
        self.timer.start(self.timer.period());
    }

    /// A pulse arrived: restart the countdown and clear presence.
    pub fn on_pulse(&mut self) -> Transition {
        self.timer.rearm(self.timer.period());
        self.present = false;
        self.pulses = self.pulses.wrapping_add(1);

        let transition = if infallible(self.indicator.is_on()) {
            infallible(self.indicator.turn_off());
            Transition::Cleared
        } else {
            Transition::Unchanged
        };
        self.record(transition)
    }

    /// The countdown expired: assert presence and restart the countdown.
    pub fn on_timeout(&mut self) -> Transition {
        self.present = true;
        self.timeouts = self.timeouts.wrapping_add(1);

        let was_on = infallible(self.indicator.is_on());
        infallible(self.indicator.turn_on());
        self.timer.rearm(self.timer.period());

        self.record(if was_on {
            Transition::Unchanged
        } else {
            Transition::Asserted
        })
    }

    /// Returns the transition recorded by the most recent event and resets it.
    pub fn take_transition(&mut self) -> Transition {
        core::mem::take(&mut self.last_transition)
    }

    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.present
    }

    /// Countdown length, as last programmed into the timer.
    #[must_use]
    pub const fn period(&self) -> u16 {
        self.timer.period()
    }

    pub fn snapshot(&mut self) -> PresenceSnapshot {
        PresenceSnapshot {
            present: self.present,
            indicator_on: infallible(self.indicator.is_on()),
            pulses: self.pulses,
            timeouts: self.timeouts,
            period_ticks: self.timer.period(),
        }
    }

    #[must_use]
    pub fn indicator(&self) -> &Indicator<P> {
        &self.indicator
    }

    pub fn indicator_mut(&mut self) -> &mut Indicator<P> {
        &mut self.indicator
    }

    #[must_use]
    pub fn timer(&self) -> &TimeoutTimer<T> {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut TimeoutTimer<T> {
        &mut self.timer
    }

    fn record(&mut self, transition: Transition) -> Transition {
        if transition != Transition::Unchanged {
            self.last_transition = transition;
        }
        transition
    }
}

/// Dispatch-table handler feeding pulses into a [`PresenceMonitor`].
#[derive(Copy, Clone, Debug, Default)]
pub struct PulseHandler;

impl<P, T> InterruptHandler<PresenceMonitor<P, T>> for PulseHandler
where
    P: StatefulOutputPin<Error = Infallible>,
    T: CompareTimer,
{
    fn invoke(&self, monitor: &mut PresenceMonitor<P, T>) {
        monitor.on_pulse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::IndicatorPolarity;
    use crate::sim::{SimCompareTimer, SimPin};

    fn monitor(initially_on: bool) -> PresenceMonitor<SimPin, SimCompareTimer> {
        let indicator = Indicator::new(SimPin::new(initially_on), IndicatorPolarity::ActiveHigh);
        let mut monitor = PresenceMonitor::new(indicator, SimCompareTimer::new(), 20_000);
        monitor.start();
        monitor
    }

    #[test]
    fn starts_absent_with_timer_running() {
        let mut monitor = monitor(false);
        let snapshot = monitor.snapshot();

        assert!(!snapshot.present);
        assert!(!snapshot.indicator_on);
        assert!(monitor.timer().is_running());
        assert_eq!(monitor.timer().hardware().compare(), 20_000);
    }

    #[test]
    fn timeout_asserts_then_pulse_clears() {
        let mut monitor = monitor(false);

        assert_eq!(monitor.on_timeout(), Transition::Asserted);
        assert!(monitor.is_present());
        assert!(monitor.indicator().pin().level());

        assert_eq!(monitor.on_pulse(), Transition::Cleared);
        assert!(!monitor.is_present());
        assert!(!monitor.indicator().pin().level());
        assert_eq!(monitor.take_transition(), Transition::Cleared);
        assert_eq!(monitor.take_transition(), Transition::Unchanged);
    }

    #[test]
    fn repeated_timeouts_are_idempotent_and_rearm() {
        let mut monitor = monitor(false);
        monitor.on_timeout();
        let rearms = monitor.timer().rearms();

        assert_eq!(monitor.on_timeout(), Transition::Unchanged);
        assert_eq!(monitor.on_timeout(), Transition::Unchanged);

        assert!(monitor.is_present());
        assert_eq!(monitor.timer().rearms(), rearms + 2);
        assert_eq!(monitor.snapshot().timeouts, 3);
    }

    #[test]
    fn pulse_while_dark_leaves_pin_untouched() {
        let mut monitor = monitor(false);
        assert_eq!(monitor.on_pulse(), Transition::Unchanged);
        assert_eq!(monitor.indicator().pin().writes(), 0);
        assert_eq!(monitor.timer().hardware().counter(), 0);
    }

    #[test]
    fn first_pulse_clears_indicator_left_on_by_self_test() {
        let mut monitor = monitor(true);
        assert!(monitor.snapshot().indicator_on);

        assert_eq!(monitor.on_pulse(), Transition::Cleared);
        assert!(!monitor.snapshot().indicator_on);
    }

    #[test]
    fn period_follows_the_timer_after_an_external_rearm() {
        let mut monitor = monitor(false);
        monitor.timer_mut().rearm(5_000);
        assert_eq!(monitor.period(), 5_000);

        monitor.on_pulse();
        assert_eq!(monitor.timer().hardware().compare(), 5_000);
        assert_eq!(monitor.snapshot().period_ticks, 5_000);
    }

    #[test]
    fn timeout_over_a_lit_indicator_still_reports_presence() {
        let mut monitor = monitor(true);

        assert_eq!(monitor.on_timeout(), Transition::Unchanged);
        assert_eq!(monitor.take_transition(), Transition::Unchanged);
        assert!(monitor.is_present());
    }

    #[test]
    fn pulse_handler_drives_monitor_through_trait_object() {
        let mut monitor = monitor(false);
        let handler: &dyn InterruptHandler<PresenceMonitor<SimPin, SimCompareTimer>> =
            &PulseHandler;

        handler.invoke(&mut monitor);
        handler.invoke(&mut monitor);

        assert_eq!(monitor.snapshot().pulses, 2);
    }
}
