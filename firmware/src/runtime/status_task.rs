use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Timer};
use presence_core::telemetry::TelemetryRecorder;

use super::PRESENCE_SIGNAL;
use crate::config::HEARTBEAT_SECS;
use crate::status::{self, FirmwareInstant};

#[embassy_executor::task]
pub async fn run(telemetry: &'static mut TelemetryRecorder<FirmwareInstant>) -> ! {
    let heartbeat = Duration::from_secs(HEARTBEAT_SECS);
    loop {
        match select(PRESENCE_SIGNAL.wait(), Timer::after(heartbeat)).await {
            Either::First(transition) => {
                if telemetry
                    .record_transition(transition, FirmwareInstant::now())
                    .is_some()
                    && let Some(record) = telemetry.latest()
                {
                    status::log_record(record);
                }
            }
            Either::Second(()) => status::log_heartbeat(status::counters()),
        }
    }
}
