use core::time::Duration;

use embedded_hal::delay::DelayNs;

use crate::exti::{
    DeviceFamily, DispatchRegistry, Edge, InterruptController, PhysicalLine, TriggerMode,
};
use crate::indicator::{Indicator, IndicatorPolarity};
use crate::presence::{PresenceMonitor, PresenceSnapshot, PulseHandler, Transition};
use crate::self_test::{self, SELF_TEST_INTERVAL_MS, SELF_TEST_TOGGLES};
use crate::telemetry::{TelemetryInstant, TelemetryRecorder};

use super::{SimCompareTimer, SimPin};

/// Low time of a pulse produced by [`SimBoard::pulse`], in timer ticks.
pub const DEFAULT_PULSE_WIDTH_TICKS: u32 = 100;

/// Presence monitor wired to the simulated pin and timer.
pub type SimMonitor = PresenceMonitor<SimPin, SimCompareTimer>;

static PULSE_HANDLER: PulseHandler = PulseHandler;

/// Virtual-time instant; the simulated timer ticks once per microsecond.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SimInstant(pub u64);

impl SimInstant {
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }
}

impl TelemetryInstant for SimInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Blocking delay that only accumulates the requested time.
#[derive(Default)]
struct VirtualDelay {
    elapsed_ns: u64,
}

impl DelayNs for VirtualDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += u64::from(ns);
    }
}

/// Bench wiring one interrupt controller, the presence monitor, and a
/// telemetry ring together under a virtual clock.
///
/// Input lines idle high. Edges reach the dispatch registry only when the
/// controller's registers say the line is unmasked and armed for that edge;
/// the timer's compare match is delivered as the timeout event.
pub struct SimBoard<C> {
    registry: DispatchRegistry<'static, C, SimMonitor>,
    monitor: SimMonitor,
    telemetry: TelemetryRecorder<SimInstant>,
    now: u64,
    low_lines: u32,
}

impl<C> SimBoard<C>
where
    C: InterruptController,
{
    /// Creates a powered-off board: indicator dark, nothing attached.
    #[must_use]
    pub fn new(controller: C, polarity: IndicatorPolarity, period_ticks: u16) -> Self {
        let pin = SimPin::new(polarity.level_for(false));
        let indicator = Indicator::new(pin, polarity);
        Self {
            registry: DispatchRegistry::new(controller),
            monitor: PresenceMonitor::new(indicator, SimCompareTimer::new(), period_ticks),
            telemetry: TelemetryRecorder::new(),
            now: 0,
            low_lines: 0,
        }
    }

    /// Runs the boot sequence: lamp check, channel 0 armed for falling edges,
    /// countdown started. Returns the indicator state the lamp check left.
    pub fn boot(&mut self) -> bool {
        self.boot_with(SELF_TEST_TOGGLES, SELF_TEST_INTERVAL_MS)
    }

    /// Boot sequence with a custom lamp check.
    pub fn boot_with(&mut self, toggles: u8, interval_ms: u32) -> bool {
        let mut delay = VirtualDelay::default();
        let indicator = self.monitor.indicator_mut();
        let lit = match self_test::run(indicator, &mut delay, toggles, interval_ms) {
            Ok(lit) => lit,
            Err(never) => match never {},
        };
        self.now += delay.elapsed_ns / 1_000;

        self.attach(0, TriggerMode::Falling);
        self.monitor.start();
        lit
    }

    /// Binds the pulse handler to `channel`.
    pub fn attach(&mut self, channel: u8, mode: TriggerMode) -> bool {
        if usize::from(channel) >= self.registry.channel_count() {
            return false;
        }
        self.registry.attach(channel, &PULSE_HANDLER, mode);
        self.telemetry.record_attach(channel, mode, self.instant());
        true
    }

    /// Releases `channel`.
    pub fn detach(&mut self, channel: u8) -> bool {
        if !self.registry.is_attached(channel) {
            return false;
        }
        self.registry.detach(channel);
        self.telemetry.record_detach(channel, self.instant());
        true
    }

    /// Whether `line` backs one of the family's channels.
    #[must_use]
    pub fn is_wired(&self, line: PhysicalLine) -> bool {
        C::Family::channel_for(line).is_some()
    }

    /// Drives a physical input line and delivers the interrupt if the line
    /// is armed for the resulting edge. Returns `true` when a handler ran.
    ///
    /// Lines the family does not route are not modelled and are ignored.
    pub fn inject_edge(&mut self, line: PhysicalLine, edge: Edge) -> bool {
        let Some(channel) = C::Family::channel_for(line) else {
            return false;
        };
        match edge {
            Edge::Falling => self.low_lines |= line.bit(),
            Edge::Rising => self.low_lines &= !line.bit(),
        }

        let controller = self.registry.controller();
        let armed = controller.is_enabled(channel)
            && controller
                .trigger_mode(channel)
                .is_some_and(|mode| mode.fires_on(edge));
        if !armed {
            return false;
        }

        if !self.registry.dispatch(line, &mut self.monitor) {
            return false;
        }
        let now = self.instant();
        self.telemetry.record_pulse(now);
        let transition = self.monitor.take_transition();
        self.telemetry.record_transition(transition, now);
        true
    }

    /// Pulls `line` low for `width_ticks`, then releases it.
    pub fn pulse(&mut self, line: PhysicalLine, width_ticks: u32) -> bool {
        let falling = self.inject_edge(line, Edge::Falling);
        self.advance(width_ticks);
        let rising = self.inject_edge(line, Edge::Rising);
        falling || rising
    }

    /// Pulses the physical line behind a logical channel.
    pub fn pulse_channel(&mut self, channel: u8) -> bool {
        match C::Family::line(channel) {
            Some(line) => self.pulse(C::Family::physical(line), DEFAULT_PULSE_WIDTH_TICKS),
            None => false,
        }
    }

    /// Moves virtual time forward, delivering every compare match on the way.
    /// Returns the number of timeout events delivered.
    pub fn advance(&mut self, ticks: u32) -> u32 {
        let mut remaining = ticks;
        let mut timeouts = 0;
        while remaining > 0 {
            let hardware = self.monitor.timer_mut().hardware_mut();
            let step = hardware
                .ticks_until_match()
                .map_or(remaining, |until| until.min(remaining));
            let matched = hardware.advance(step);
            self.now += u64::from(step);
            remaining -= step;

            if matched {
                let transition = self.monitor.on_timeout();
                self.monitor.take_transition();
                self.telemetry.record_transition(transition, self.instant());
                timeouts += 1;
            }
        }
        timeouts
    }

    /// Emits `count` pulses on channel 0, one every `interval_ticks`.
    pub fn pulse_train(&mut self, interval_ticks: u32, count: u32) -> u32 {
        let width = DEFAULT_PULSE_WIDTH_TICKS.min(interval_ticks / 2);
        let Some(line) = C::Family::line(0).map(C::Family::physical) else {
            return 0;
        };
        let mut delivered = 0;
        for _ in 0..count {
            if self.pulse(line, width) {
                delivered += 1;
            }
            self.advance(interval_ticks - width);
        }
        delivered
    }

    #[must_use]
    pub fn is_line_low(&self, line: PhysicalLine) -> bool {
        self.low_lines & line.bit() != 0
    }

    #[must_use]
    pub const fn instant(&self) -> SimInstant {
        SimInstant(self.now)
    }

    #[must_use]
    pub fn family_name(&self) -> &'static str {
        C::Family::NAME
    }

    pub fn snapshot(&mut self) -> PresenceSnapshot {
        self.monitor.snapshot()
    }

    #[must_use]
    pub fn is_indicator_on(&mut self) -> bool {
        self.snapshot().indicator_on
    }

    #[must_use]
    pub fn registry(&self) -> &DispatchRegistry<'static, C, SimMonitor> {
        &self.registry
    }

    #[must_use]
    pub fn monitor(&self) -> &SimMonitor {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut SimMonitor {
        &mut self.monitor
    }

    #[must_use]
    pub fn telemetry(&self) -> &TelemetryRecorder<SimInstant> {
        &self.telemetry
    }

    /// Last state change recorded by the monitor, for callers polling like
    /// the firmware status task does.
    pub fn take_transition(&mut self) -> Transition {
        self.monitor.take_transition()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exti::avr::{Atmega328p, AvrExtInt};
    use crate::sim::SimAvrRegisters;
    use crate::telemetry::PresenceEvent;

    fn board() -> SimBoard<AvrExtInt<Atmega328p, SimAvrRegisters>> {
        SimBoard::new(
            AvrExtInt::new(SimAvrRegisters::new()),
            IndicatorPolarity::ActiveHigh,
            20_000,
        )
    }

    #[test]
    fn boot_advances_clock_by_lamp_check() {
        let mut board = board();
        let lit = board.boot();

        assert!(!lit);
        assert_eq!(board.instant(), SimInstant(10_000_000));
        assert!(board.registry().is_attached(0));
        assert!(board.monitor().timer().is_running());
    }

    #[test]
    fn rising_edge_on_falling_channel_is_ignored() {
        let mut board = board();
        board.boot_with(0, 0);

        assert!(board.inject_edge(PhysicalLine(0), Edge::Falling));
        assert!(board.is_line_low(PhysicalLine(0)));
        assert!(!board.inject_edge(PhysicalLine(0), Edge::Rising));
        assert_eq!(board.snapshot().pulses, 1);
    }

    #[test]
    fn unwired_lines_are_ignored() {
        let mut board = board();
        board.boot_with(0, 0);

        assert!(!board.is_wired(PhysicalLine(40)));
        assert!(!board.pulse(PhysicalLine(40), DEFAULT_PULSE_WIDTH_TICKS));
        assert!(!board.is_line_low(PhysicalLine(40)));
        assert!(!board.inject_edge(PhysicalLine(2), Edge::Falling));
        assert!(!board.is_line_low(PhysicalLine(2)));
        assert_eq!(board.snapshot().pulses, 0);
    }

    #[test]
    fn silence_records_single_assertion_per_gap() {
        let mut board = board();
        board.boot_with(0, 0);

        assert_eq!(board.advance(20_000), 1);
        assert!(board.is_indicator_on());
        let latest = board.telemetry().latest().copied().expect("record");
        assert_eq!(latest.event, PresenceEvent::PresenceAsserted);

        assert_eq!(board.advance(50_000), 2);
        assert_eq!(board.telemetry().len(), 2);
    }

    #[test]
    fn attach_out_of_range_is_rejected() {
        let mut board = board();
        assert!(!board.attach(2, TriggerMode::Rising));
        assert!(!board.detach(1));
        assert!(board.telemetry().is_empty());
    }
}
