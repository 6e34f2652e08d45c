use core::convert::Infallible;
use embedded_hal::digital::{ErrorType, OutputPin};

use crate::Hertz;

/// Default address of a PCA9548A with all address pins tied low.
pub const DEFAULT_ADDRESS: u8 = 0x70;
/// The selector is a single byte, one bit per channel.
pub const MAX_CHANNELS: u8 = 8;

/// Placeholder for a multiplexer without a reset line.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResetPin;

impl ErrorType for NoResetPin {
    type Error = Infallible;
}

impl OutputPin for NoResetPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Construction settings for a [`Mux`](crate::Mux).
///
/// Start from [`Config::default()`] and override what differs:
///
/// ```
/// use i2c_mux::{Config, Hertz};
///
/// let config = Config::default()
///     .address(0x74)
///     .channels(4)
///     .max_speed(Hertz::FAST_PLUS);
/// assert_eq!(config.get_address(), 0x74);
/// ```
#[derive(Debug, Clone)]
pub struct Config<RST = NoResetPin> {
    pub(crate) address: u8,
    pub(crate) channels: u8,
    pub(crate) max_speed: Hertz,
    pub(crate) default_speed: Hertz,
    pub(crate) reset_pin: Option<RST>,
}

impl Default for Config<NoResetPin> {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            channels: MAX_CHANNELS,
            max_speed: Hertz::FAST,
            default_speed: Hertz::STANDARD,
            reset_pin: None,
        }
    }
}

impl<RST> Config<RST> {
    /// Address of the multiplexer chip itself.
    pub fn address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// Number of downstream channels, at most [`MAX_CHANNELS`].
    pub fn channels(mut self, channels: u8) -> Self {
        self.channels = channels;
        self
    }

    /// Ceiling for [`Channel::set_speed()`](crate::Channel::set_speed).
    pub fn max_speed(mut self, max_speed: Hertz) -> Self {
        self.max_speed = max_speed;
        self
    }

    /// Speed newly registered channels start out with.
    pub fn default_speed(mut self, default_speed: Hertz) -> Self {
        self.default_speed = default_speed;
        self
    }

    /// Enable [`Mux::reset()`](crate::Mux::reset) by handing over the line wired to `RESET`.
    pub fn reset_pin<P: OutputPin>(self, pin: P) -> Config<P> {
        Config {
            address: self.address,
            channels: self.channels,
            max_speed: self.max_speed,
            default_speed: self.default_speed,
            reset_pin: Some(pin),
        }
    }

    pub fn get_address(&self) -> u8 {
        self.address
    }

    pub fn get_channels(&self) -> u8 {
        self.channels
    }

    pub fn get_max_speed(&self) -> Hertz {
        self.max_speed
    }

    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        if self.address > 0x7f {
            return Err("mux address is not a 7-bit address");
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err("channel count must be between 1 and 8");
        }
        if self.default_speed > self.max_speed {
            return Err("default channel speed exceeds the maximum speed");
        }
        Ok(())
    }
}
