use embedded_hal::i2c::{self as hal_i2c, I2c, Operation};

use crate::Hertz;

/// Reprogramming of the bus clock.
///
/// `embedded-hal` leaves clock configuration to the HAL, so buses which can change their speed at
/// runtime need to expose it through this trait.  For buses with a fixed clock, wrap them in
/// [`FixedSpeed`].
pub trait SetBusSpeed {
    type SpeedError: core::fmt::Debug;

    /// Switch the bus clock to `speed` for all following transactions.
    fn set_speed(&mut self, speed: Hertz) -> Result<(), Self::SpeedError>;
}

/// Blanket trait for types implementing `i2c::I2c + SetBusSpeed`
pub trait I2cBus: I2c + SetBusSpeed {}

impl<T> I2cBus for T where T: I2c + SetBusSpeed {}

/// Opening a physical bus by name (e.g. `/dev/i2c-1`).
pub trait OpenBus {
    type Bus: I2cBus;
    type Error;

    fn open(&mut self, name: &str) -> Result<Self::Bus, Self::Error>;
}

/// Adapter for buses whose clock is configured once by the HAL.
///
/// Speed requests are accepted and ignored, the bus keeps running at whatever clock it was set up
/// with.
#[derive(Debug, Clone)]
pub struct FixedSpeed<I2C>(I2C);

impl<I2C> FixedSpeed<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self(i2c)
    }

    pub fn into_inner(self) -> I2C {
        self.0
    }
}

impl<I2C> SetBusSpeed for FixedSpeed<I2C> {
    type SpeedError = core::convert::Infallible;

    fn set_speed(&mut self, _speed: Hertz) -> Result<(), Self::SpeedError> {
        Ok(())
    }
}

impl<I2C: I2c> hal_i2c::ErrorType for FixedSpeed<I2C> {
    type Error = I2C::Error;
}

impl<I2C: I2c> I2c for FixedSpeed<I2C> {
    fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        self.0.read(address, read)
    }

    fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        self.0.write(address, write)
    }

    fn write_read(&mut self, address: u8, write: &[u8], read: &mut [u8]) -> Result<(), Self::Error> {
        self.0.write_read(address, write, read)
    }

    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.0.transaction(address, operations)
    }
}

/// Register access helpers for any I2C bus, including mux [`Channel`](crate::Channel)s.
pub trait I2cExt {
    type Error;

    fn write_reg<R: Into<u8>>(&mut self, addr: u8, reg: R, value: u8) -> Result<(), Self::Error>;
    fn write_regs<R: Into<u8>>(
        &mut self,
        addr: u8,
        reg: R,
        values: &[u8],
    ) -> Result<(), Self::Error>;
    fn update_reg<R: Into<u8>>(
        &mut self,
        addr: u8,
        reg: R,
        mask_set: u8,
        mask_clear: u8,
    ) -> Result<(), Self::Error>;
    fn read_reg<R: Into<u8>>(&mut self, addr: u8, reg: R) -> Result<u8, Self::Error>;
    fn read_regs<R: Into<u8>>(
        &mut self,
        addr: u8,
        reg: R,
        buf: &mut [u8],
    ) -> Result<(), Self::Error>;
}

impl<I2C: I2c> I2cExt for I2C {
    type Error = I2C::Error;

    fn write_reg<R: Into<u8>>(&mut self, addr: u8, reg: R, value: u8) -> Result<(), Self::Error> {
        self.write(addr, &[reg.into(), value])
    }

    fn write_regs<R: Into<u8>>(
        &mut self,
        addr: u8,
        reg: R,
        values: &[u8],
    ) -> Result<(), Self::Error> {
        // Adjacent writes go out as one contiguous write, no repeated start in between.
        self.transaction(
            addr,
            &mut [Operation::Write(&[reg.into()]), Operation::Write(values)],
        )
    }

    fn update_reg<R: Into<u8>>(
        &mut self,
        addr: u8,
        reg: R,
        mask_set: u8,
        mask_clear: u8,
    ) -> Result<(), Self::Error> {
        let reg = reg.into();
        let mut buf = [0x00];
        self.write_read(addr, &[reg], &mut buf)?;
        buf[0] |= mask_set;
        buf[0] &= !mask_clear;
        self.write(addr, &[reg, buf[0]])
    }

    fn read_reg<R: Into<u8>>(&mut self, addr: u8, reg: R) -> Result<u8, Self::Error> {
        let mut buf = [0x00];
        self.write_read(addr, &[reg.into()], &mut buf)?;
        Ok(buf[0])
    }

    fn read_regs<R: Into<u8>>(
        &mut self,
        addr: u8,
        reg: R,
        buf: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.write_read(addr, &[reg.into()], buf)
    }
}
