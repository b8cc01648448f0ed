use core::cell::RefCell;

use cortex_m::register::primask;
use critical_section::{self, Mutex, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::InterruptExt;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::Delay;
use presence_core::exti::DispatchRegistry;
use presence_core::exti::stm32::{ExtiController, ExtiVector};
use presence_core::indicator::Indicator;
use presence_core::presence::{PresenceMonitor, PulseHandler, Transition};
use presence_core::self_test;
use presence_core::telemetry::TelemetryRecorder;
use static_cell::StaticCell;

use crate::config::{
    Family, INDICATOR_POLARITY, PERIOD_TICKS, PULSE_CHANNEL, PULSE_TRIGGER, SELF_TEST_INTERVAL_MS,
    SELF_TEST_TOGGLES,
};
use crate::hw::{ExtiRegisters, Tim3Compare};
use crate::status::{self, FirmwareInstant};

mod status_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        cortex_m::interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                cortex_m::interrupt::enable();
            }
        }
    }
}

type Exti = ExtiController<Family, ExtiRegisters>;
type Monitor = PresenceMonitor<Output<'static>, Tim3Compare>;

/// Everything the interrupt handlers touch.
///
/// Installed once by `main` before the NVIC lines are unmasked; afterwards
/// only the EXTI and TIM3 handlers borrow it.
struct DeviceContext {
    registry: DispatchRegistry<'static, Exti, Monitor>,
    monitor: Monitor,
    _pulse_input: Input<'static>,
}

static DEVICE: Mutex<RefCell<Option<DeviceContext>>> = Mutex::new(RefCell::new(None));
static PULSE_HANDLER: PulseHandler = PulseHandler;
static TELEMETRY: StaticCell<TelemetryRecorder<FirmwareInstant>> = StaticCell::new();

/// Presence changes handed from interrupt context to the status task.
pub(super) static PRESENCE_SIGNAL: Signal<CriticalSectionRawMutex, Transition> = Signal::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals { PA6, PA7, TIM3, .. } = hal::init(config);

    let pulse_input = Input::new(PA6, Pull::Up);
    let dark = Level::from(INDICATOR_POLARITY.level_for(false));
    let mut indicator = Indicator::new(Output::new(PA7, dark, Speed::Low), INDICATOR_POLARITY);

    let lit = match self_test::run(
        &mut indicator,
        &mut Delay,
        SELF_TEST_TOGGLES,
        SELF_TEST_INTERVAL_MS,
    ) {
        Ok(lit) => lit,
        Err(never) => match never {},
    };
    defmt::info!("self-test complete, indicator lit={}", lit);

    let mut registry = DispatchRegistry::new(ExtiController::new(ExtiRegisters));
    registry.attach(PULSE_CHANNEL, &PULSE_HANDLER, PULSE_TRIGGER);

    let mut monitor = PresenceMonitor::new(indicator, Tim3Compare::new(TIM3), PERIOD_TICKS);
    monitor.start();

    critical_section::with(|cs| {
        DEVICE.borrow(cs).replace(Some(DeviceContext {
            registry,
            monitor,
            _pulse_input: pulse_input,
        }));
    });

    let telemetry = TELEMETRY.init(TelemetryRecorder::new());
    telemetry.record_attach(PULSE_CHANNEL, PULSE_TRIGGER, FirmwareInstant::now());
    if let Some(record) = telemetry.latest() {
        status::log_record(record);
    }

    unsafe {
        interrupt::EXTI4_15.enable();
        interrupt::TIM3_TIM4.enable();
    }
    defmt::info!("presence monitor armed, period={}ticks", PERIOD_TICKS);

    spawner
        .spawn(status_task::run(telemetry))
        .expect("failed to spawn status task");

    core::future::pending::<()>().await;
}

#[interrupt]
fn EXTI4_15() {
    critical_section::with(|cs| {
        let mut device = DEVICE.borrow_ref_mut(cs);
        let Some(device) = device.as_mut() else {
            return;
        };

        let pending = device
            .registry
            .controller_mut()
            .take_pending(ExtiVector::Exti4_15);
        for line in pending {
            if device.registry.dispatch(line, &mut device.monitor) {
                status::record_pulse();
            }
        }
        publish(&mut device.monitor);
    });
}

#[interrupt]
fn TIM3_TIM4() {
    critical_section::with(|cs| {
        let mut device = DEVICE.borrow_ref_mut(cs);
        let Some(DeviceContext { monitor, .. }) = device.as_mut() else {
            return;
        };

        if !monitor.timer_mut().hardware_mut().acknowledge() {
            return;
        }
        status::record_timeout();
        monitor.on_timeout();
        publish(monitor);
    });
}

fn publish(monitor: &mut Monitor) {
    let transition = monitor.take_transition();
    if let Some(transition) = status::record_event(monitor.is_present(), transition) {
        PRESENCE_SIGNAL.signal(transition);
    }
}
