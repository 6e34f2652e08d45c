use core::fmt;
use embedded_hal::i2c::{self as hal_i2c, ErrorKind};

use crate::Hertz;

/// Errors of channel registration and transactions through the multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// The channel number is not below the configured channel count.
    InvalidChannel { channel: u8, channels: u8 },
    /// The target address is the address of the multiplexer itself.
    AddressConflict(u8),
    /// Writing the selector byte to the multiplexer failed.
    ///
    /// The cached channel is left untouched so the next transaction retries the switch.
    ChannelSwitch(E),
    /// The requested speed is above the configured maximum.
    SpeedLimit { requested: Hertz, max: Hertz },
    /// The transfer to the downstream device failed.
    Bus(E),
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidChannel { channel, channels } => write!(
                f,
                "invalid channel {}, valid channels are 0 to {}",
                channel,
                channels.saturating_sub(1)
            ),
            Error::AddressConflict(addr) => {
                write!(f, "address {:#04x} is the address of the mux itself", addr)
            }
            Error::ChannelSwitch(e) => write!(f, "failed to switch mux channel: {:?}", e),
            Error::SpeedLimit { requested, max } => {
                write!(f, "speed {} exceeds the maximum of {}", requested, max)
            }
            Error::Bus(e) => write!(f, "bus error: {:?}", e),
        }
    }
}

impl<E: hal_i2c::Error> hal_i2c::Error for Error<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            // Only the downstream transfer may report e.g. a NACK, drivers probe for devices
            // that way.
            Error::Bus(e) => e.kind(),
            _ => ErrorKind::Other,
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug> std::error::Error for Error<E> {}

/// Errors while bringing up a [`Mux`](crate::Mux).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError<O, E> {
    /// The configuration was rejected before touching the bus.
    InvalidConfig(&'static str),
    /// The bus could not be opened.
    Open(O),
    /// Selecting the initial channel failed.
    Select(E),
}

impl<O: fmt::Debug, E: fmt::Debug> fmt::Display for InitError<O, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::InvalidConfig(reason) => write!(f, "invalid mux configuration: {}", reason),
            InitError::Open(e) => write!(f, "failed to open bus: {:?}", e),
            InitError::Select(e) => write!(f, "failed to initialize mux: {:?}", e),
        }
    }
}

#[cfg(feature = "std")]
impl<O: fmt::Debug, E: fmt::Debug> std::error::Error for InitError<O, E> {}

/// Errors of [`Mux::reset()`](crate::Mux::reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetError<P, E> {
    /// No reset line was configured.
    NoResetLine,
    /// Driving the reset line failed.
    Pin(P),
    /// Re-selecting the initial channel after the reset failed.
    Select(E),
}

impl<P: fmt::Debug, E: fmt::Debug> fmt::Display for ResetError<P, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetError::NoResetLine => write!(f, "no reset line configured"),
            ResetError::Pin(e) => write!(f, "failed to drive reset line: {:?}", e),
            ResetError::Select(e) => write!(f, "failed to re-initialize mux: {:?}", e),
        }
    }
}

#[cfg(feature = "std")]
impl<P: fmt::Debug, E: fmt::Debug> std::error::Error for ResetError<P, E> {}
