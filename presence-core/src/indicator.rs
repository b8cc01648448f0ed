//! Binary indicator output with compile-time polarity.

use embedded_hal::digital::StatefulOutputPin;

/// Electrical level that lights the indicator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IndicatorPolarity {
    ActiveHigh,
    ActiveLow,
}

impl IndicatorPolarity {
    /// Physical level for a logical state, `true` meaning high.
    #[must_use]
    pub const fn level_for(self, on: bool) -> bool {
        match self {
            IndicatorPolarity::ActiveHigh => on,
            IndicatorPolarity::ActiveLow => !on,
        }
    }
}

/// Indicator driven through an output pin whose latch can be read back.
///
/// No shadow copy of the state is kept; [`Indicator::is_on`] always asks the
/// pin.
#[derive(Debug)]
pub struct Indicator<P> {
    pin: P,
    polarity: IndicatorPolarity,
}

impl<P: StatefulOutputPin> Indicator<P> {
    #[must_use]
    pub const fn new(pin: P, polarity: IndicatorPolarity) -> Self {
        Self { pin, polarity }
    }

    /// Drives the pin to the lit level.
    ///
    /// # Errors
    ///
    /// Propagates the pin driver's error.
    pub fn turn_on(&mut self) -> Result<(), P::Error> {
        self.drive(true)
    }

    /// Drives the pin to the dark level.
    ///
    /// # Errors
    ///
    /// Propagates the pin driver's error.
    pub fn turn_off(&mut self) -> Result<(), P::Error> {
        self.drive(false)
    }

    /// Reads the output latch and maps it back through the polarity.
    ///
    /// # Errors
    ///
    /// Propagates the pin driver's error.
    pub fn is_on(&mut self) -> Result<bool, P::Error> {
        let high = self.pin.is_set_high()?;
        Ok(high == self.polarity.level_for(true))
    }

    /// Flips the indicator based on the read-back level and returns the new
    /// logical state.
    ///
    /// # Errors
    ///
    /// Propagates the pin driver's error.
    pub fn toggle(&mut self) -> Result<bool, P::Error> {
        let next = !self.is_on()?;
        self.drive(next)?;
        Ok(next)
    }

    #[must_use]
    pub const fn polarity(&self) -> IndicatorPolarity {
        self.polarity
    }

    #[must_use]
    pub fn pin(&self) -> &P {
        &self.pin
    }

    pub fn pin_mut(&mut self) -> &mut P {
        &mut self.pin
    }

    fn drive(&mut self, on: bool) -> Result<(), P::Error> {
        if self.polarity.level_for(on) {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        }
    }
}
