//! Retriggerable timeout built on a single hardware compare channel.

/// Hardware timer channel counting prescaled ticks up to a compare value.
///
/// On a compare match the hardware raises its interrupt and the counter keeps
/// running (or restarts, depending on the part); the timeout layer re-arms
/// explicitly either way.
pub trait CompareTimer {
    /// Selects the prescaler and counting mode. Called once before use.
    fn configure(&mut self);

    /// Writes the compare threshold.
    fn set_compare(&mut self, ticks: u16);

    /// Zeroes the counter.
    fn reset_counter(&mut self);

    /// Unmasks the compare-match interrupt.
    fn enable_compare_interrupt(&mut self);

    /// Restarts the countdown with a fresh threshold.
    fn arm(&mut self, ticks: u16) {
        self.reset_counter();
        self.set_compare(ticks);
    }
}

/// Deadman countdown: expires after `period` ticks without a re-arm.
#[derive(Debug)]
pub struct TimeoutTimer<T> {
    hw: T,
    period: u16,
    running: bool,
    rearms: u32,
}

impl<T: CompareTimer> TimeoutTimer<T> {
    /// Wraps an unconfigured timer channel.
    #[must_use]
    pub const fn new(hw: T) -> Self {
        Self::with_period(hw, 0)
    }

    /// Wraps an unconfigured timer channel that will count to `period`.
    #[must_use]
    pub const fn with_period(hw: T, period: u16) -> Self {
        Self {
            hw,
            period,
            running: false,
            rearms: 0,
        }
    }

    /// Configures the channel, arms it with `period` and unmasks its
    /// interrupt.
    pub fn start(&mut self, period: u16) {
        self.hw.configure();
        self.hw.set_compare(period);
        self.hw.reset_counter();
        self.hw.enable_compare_interrupt();
        self.period = period;
        self.running = true;
    }

    /// Restarts the countdown. The counter reset and threshold write happen
    /// with interrupts masked so a compare match cannot land between them.
    pub fn rearm(&mut self, period: u16) {
        critical_section::with(|_| self.hw.arm(period));
        self.period = period;
        self.rearms = self.rearms.wrapping_add(1);
    }

    #[must_use]
    pub const fn period(&self) -> u16 {
        self.period
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Number of re-arms since construction.
    #[must_use]
    pub const fn rearms(&self) -> u32 {
        self.rearms
    }

    #[must_use]
    pub fn hardware(&self) -> &T {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut T {
        &mut self.hw
    }
}

/// Converts a duration into timer ticks for a clock and prescaler.
///
/// Returns `None` when the prescaler is zero, the period rounds to zero ticks,
/// or it does not fit a 16-bit compare register.
#[must_use]
#[allow(clippy::cast_lossless)]
pub const fn ticks_from_micros(clock_hz: u32, prescaler: u32, micros: u32) -> Option<u16> {
    if prescaler == 0 {
        return None;
    }
    let ticks = clock_hz as u64 * micros as u64 / (prescaler as u64 * 1_000_000);
    if ticks == 0 || ticks > u16::MAX as u64 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    Some(ticks as u16)
}
