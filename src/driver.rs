use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{debug, info, warn};

use crate::{Error, Hertz, I2cBus, ResetError};

/// Time the reset line is held low, and the time the chip gets to come back up.
const RESET_SETTLE_MS: u32 = 100;

/// Multiplexer state shared between all channels.
///
/// Lives inside the [`BusMutex`](crate::BusMutex) of a [`Mux`](crate::Mux) and is only ever
/// touched with the lock held.  The selected channel and bus speed are a cache of what was last
/// successfully written, the chip is never read back.
pub struct Driver<I2C, RST> {
    i2c: I2C,
    reset: Option<RST>,
    address: u8,
    active: Option<u8>,
    speed: Option<Hertz>,
}

impl<I2C, RST> Driver<I2C, RST> {
    pub(crate) fn new(i2c: I2C, reset: Option<RST>, address: u8) -> Self {
        Self {
            i2c,
            reset,
            address,
            active: None,
            speed: None,
        }
    }

    pub(crate) fn active_channel(&self) -> Option<u8> {
        self.active
    }

    pub(crate) fn speed(&self) -> Option<Hertz> {
        self.speed
    }

    pub(crate) fn release(self) -> (I2C, Option<RST>) {
        (self.i2c, self.reset)
    }
}

impl<I2C: I2cBus, RST> Driver<I2C, RST> {
    /// Write the one-hot selector for `channel`.
    pub(crate) fn select(&mut self, channel: u8) -> Result<(), I2C::Error> {
        self.i2c.write(self.address, &[1 << channel])?;
        debug!("mux {:#04x}: selected channel {}", self.address, channel);
        self.active = Some(channel);
        Ok(())
    }

    /// Disconnect all downstream channels.
    pub(crate) fn deselect(&mut self) -> Result<(), I2C::Error> {
        self.i2c.write(self.address, &[0x00])?;
        debug!("mux {:#04x}: all channels disconnected", self.address);
        self.active = None;
        Ok(())
    }

    /// Get the chip and the bus ready for a transfer to `address` on `channel`.
    ///
    /// The order is fixed: the address check comes before any bus traffic and the channel must be
    /// selected before the speed is changed.
    pub(crate) fn prepare(
        &mut self,
        channel: u8,
        speed: Hertz,
        address: u8,
    ) -> Result<(), Error<I2C::Error>> {
        if address == self.address {
            return Err(Error::AddressConflict(address));
        }

        if self.active != Some(channel) {
            self.select(channel).map_err(Error::ChannelSwitch)?;
        }

        if self.speed != Some(speed) {
            match self.i2c.set_speed(speed) {
                Ok(()) => {
                    debug!("mux {:#04x}: bus speed set to {}", self.address, speed);
                    self.speed = Some(speed);
                }
                // Not fatal, the transfer goes out at the previous speed.
                Err(e) => warn!(
                    "mux {:#04x}: failed to set bus speed to {} for channel {}: {:?}",
                    self.address, speed, channel, e
                ),
            }
        }

        Ok(())
    }

    /// Run a plain transfer.  Either buffer may be empty.
    pub(crate) fn transfer(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), I2C::Error> {
        match (write.is_empty(), read.is_empty()) {
            (false, false) => self.i2c.write_read(address, write, read),
            (true, false) => self.i2c.read(address, read),
            (_, true) => self.i2c.write(address, write),
        }
    }

    pub(crate) fn bus(&mut self) -> &mut I2C {
        &mut self.i2c
    }
}

impl<I2C: I2cBus, RST: OutputPin> Driver<I2C, RST> {
    /// Power-cycle the chip through its reset line and select channel 0 again.
    pub(crate) fn reset<D: DelayNs>(
        &mut self,
        delay: &mut D,
    ) -> Result<(), ResetError<RST::Error, I2C::Error>> {
        let pin = self.reset.as_mut().ok_or(ResetError::NoResetLine)?;

        pin.set_low().map_err(ResetError::Pin)?;
        // The chip forgets its selection as soon as reset is asserted.
        self.active = None;
        delay.delay_ms(RESET_SETTLE_MS);
        pin.set_high().map_err(ResetError::Pin)?;
        delay.delay_ms(RESET_SETTLE_MS);
        info!("mux {:#04x}: reset", self.address);

        self.select(0).map_err(ResetError::Select)
    }
}
