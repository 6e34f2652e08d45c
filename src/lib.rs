//! Independent I2C buses for every channel of an I2C multiplexer.
//!
//! Multiplexers like the PCA9548A sit on an I2C bus and route it to one of several downstream
//! channels, selected by writing a single byte with one bit per channel.  This crate hands out a
//! [`Channel`] for each of them which implements [`embedded_hal::i2c::I2c`], so devices behind the
//! multiplexer can be driven as if each had its own bus:
//!
//! ```
//! # use embedded_hal_mock::eh1::i2c as mock_i2c;
//! use i2c_mux::{Config, FixedSpeed, Mux};
//!
//! # let expectations = [
//! #     mock_i2c::Transaction::write(0x70, vec![0x01]),
//! #     mock_i2c::Transaction::write(0x70, vec![0x08]),
//! #     mock_i2c::Transaction::write_read(0x76, vec![0x00], vec![0x58]),
//! #     mock_i2c::Transaction::write_read(0x76, vec![0x00], vec![0x58]),
//! # ];
//! # let mut i2c = mock_i2c::Mock::new(&expectations);
//! let mux = Mux::new(FixedSpeed::new(i2c.clone()), Config::default()).unwrap();
//! let ch3 = mux.register_channel(3).unwrap();
//!
//! let mut buf = [0x00];
//! // selects channel 3 first
//! ch3.tx(0x76, &[0x00], &mut buf).unwrap();
//! // channel 3 is still selected, only the transfer goes out
//! ch3.tx(0x76, &[0x00], &mut buf).unwrap();
//! # i2c.done();
//! ```
//!
//! All channels share the physical bus through a [`BusMutex`].  Channel selection and bus speed
//! are cached and only reprogrammed when a transaction needs a different one.
#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod bus;
mod channel;
mod config;
mod driver;
mod error;
mod mutex;
mod mux;
mod scan;
mod speed;

pub use bus::FixedSpeed;
pub use bus::I2cBus;
pub use bus::I2cExt;
pub use bus::OpenBus;
pub use bus::SetBusSpeed;
pub use channel::Channel;
pub use config::{Config, NoResetPin, DEFAULT_ADDRESS, MAX_CHANNELS};
pub use driver::Driver;
pub use error::{Error, InitError, ResetError};
pub use mutex::BusMutex;
pub use mux::Mux;
pub use scan::Scan;
pub use speed::Hertz;
