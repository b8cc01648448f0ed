#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! Interrupt handlers bump these atomics; the status task reads them for the
//! heartbeat without entering the device critical section.

use core::time::Duration;

use embassy_time::Instant;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};
use presence_core::presence::Transition;
use presence_core::telemetry::{PresenceEvent, TelemetryInstant, TelemetryRecord};

static PRESENT: AtomicBool = AtomicBool::new(false);
static PULSES: AtomicU32 = AtomicU32::new(0);
static TIMEOUTS: AtomicU32 = AtomicU32::new(0);

/// Monotonic instant used by the firmware telemetry ring.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub const fn from_micros(micros: u64) -> Self {
        Self(Instant::from_micros(micros))
    }

    pub fn as_micros(self) -> u64 {
        self.0.as_micros()
    }
}

impl TelemetryInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_duration_since(earlier.0).as_micros())
    }
}

/// Counters published by the interrupt handlers.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct StatusCounters {
    pub present: bool,
    pub pulses: u32,
    pub timeouts: u32,
}

pub fn record_pulse() {
    PULSES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_timeout() {
    TIMEOUTS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_presence(present: bool) {
    PRESENT.store(present, Ordering::Relaxed);
}

/// Mirrors the monitor's presence flag after an interrupt-side event and
/// returns the transition the status task should be woken for.
pub fn record_event(present: bool, transition: Transition) -> Option<Transition> {
    record_presence(present);
    (transition != Transition::Unchanged).then_some(transition)
}

pub fn counters() -> StatusCounters {
    StatusCounters {
        present: PRESENT.load(Ordering::Relaxed),
        pulses: PULSES.load(Ordering::Relaxed),
        timeouts: TIMEOUTS.load(Ordering::Relaxed),
    }
}

/// Mirrors a telemetry record to the log.
pub fn log_record(record: &TelemetryRecord<FirmwareInstant>) {
    let elapsed_us = record
        .elapsed_since_transition
        .map(|elapsed| u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX));
    emit_record(record.event, record.timestamp.as_micros(), elapsed_us);
}

#[cfg(target_os = "none")]
fn emit_record(event: PresenceEvent, timestamp_us: u64, elapsed_us: Option<u64>) {
    if let Some(elapsed) = elapsed_us {
        defmt::info!(
            "telemetry:presence {} t={}us after={}us",
            event.name(),
            timestamp_us,
            elapsed
        );
    } else {
        defmt::info!("telemetry:presence {} t={}us", event.name(), timestamp_us);
    }
}

#[cfg(not(target_os = "none"))]
fn emit_record(event: PresenceEvent, timestamp_us: u64, elapsed_us: Option<u64>) {
    if let Some(elapsed) = elapsed_us {
        println!("telemetry:presence {event} t={timestamp_us}us after={elapsed}us");
    } else {
        println!("telemetry:presence {event} t={timestamp_us}us");
    }
}

#[cfg(target_os = "none")]
pub fn log_heartbeat(counters: StatusCounters) {
    defmt::debug!(
        "status: present={} pulses={} timeouts={}",
        counters.present,
        counters.pulses,
        counters.timeouts
    );
}

#[cfg(not(target_os = "none"))]
pub fn log_heartbeat(counters: StatusCounters) {
    println!(
        "status: present={} pulses={} timeouts={}",
        counters.present, counters.pulses, counters.timeouts
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::indicator::{Indicator, IndicatorPolarity};
    use presence_core::presence::PresenceMonitor;
    use presence_core::sim::{SimCompareTimer, SimPin};

    #[test]
    fn counters_accumulate() {
        let before = counters();
        record_pulse();
        record_pulse();
        record_timeout();
        record_presence(true);

        let after = counters();
        assert_eq!(after.pulses - before.pulses, 2);
        assert_eq!(after.timeouts - before.timeouts, 1);
        assert!(after.present);
    }

    #[test]
    fn presence_tracks_monitor_when_timeout_finds_indicator_lit() {
        let indicator = Indicator::new(SimPin::new(true), IndicatorPolarity::ActiveHigh);
        let mut monitor = PresenceMonitor::new(indicator, SimCompareTimer::new(), 20_000);
        monitor.start();

        monitor.on_timeout();
        let wake = record_event(monitor.is_present(), monitor.take_transition());

        assert_eq!(wake, None);
        assert!(counters().present);
    }

    #[test]
    fn only_changes_wake_the_status_task() {
        assert_eq!(
            record_event(true, Transition::Asserted),
            Some(Transition::Asserted)
        );
        assert_eq!(record_event(true, Transition::Unchanged), None);
    }

    #[test]
    fn instants_saturate() {
        let earlier = FirmwareInstant::from_micros(1_500);
        let later = FirmwareInstant::from_micros(21_500);
        assert_eq!(
            later.saturating_duration_since(earlier),
            Duration::from_millis(20)
        );
        assert_eq!(earlier.saturating_duration_since(later), Duration::ZERO);
    }
}
