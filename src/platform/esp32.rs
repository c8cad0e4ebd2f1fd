//! GPIO status LED and button on the ESP32.

use super::{Button, StatusLed};
use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, Input, Output, PinDriver, Pull};
use esp_idf_sys::EspError;
use log::warn;

/// LED on an output pin, lit when high.
pub struct GpioLed<'d> {
    pin: PinDriver<'d, AnyOutputPin, Output>,
}

impl<'d> GpioLed<'d> {
    pub fn new(pin: AnyOutputPin) -> Result<Self, EspError> {
        let mut pin = PinDriver::output(pin)?;
        pin.set_low()?;
        Ok(Self { pin })
    }
}

impl StatusLed for GpioLed<'_> {
    fn set(&mut self, on: bool) {
        let result = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if let Err(e) = result {
            warn!("Failed to drive LED: {:?}", e);
        }
    }
}

/// Push button to ground with the internal pull-up enabled.
pub struct GpioButton<'d> {
    pin: PinDriver<'d, AnyIOPin, Input>,
}

impl<'d> GpioButton<'d> {
    pub fn new(pin: AnyIOPin) -> Result<Self, EspError> {
        let mut pin = PinDriver::input(pin)?;
        pin.set_pull(Pull::Up)?;
        Ok(Self { pin })
    }
}

impl Button for GpioButton<'_> {
    fn is_pressed(&mut self) -> bool {
        // Active low.
        self.pin.is_low()
    }
}
