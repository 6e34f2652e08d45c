use core::fmt;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::{self as hal_i2c, Operation};

use crate::{BusMutex, Driver, Error, Hertz, I2cBus, Mux, Scan};

/// One downstream bus of a [`Mux`].
///
/// `Channel` is not constructed directly, it is handed out by [`Mux::register_channel()`].  It
/// implements [`embedded_hal::i2c::I2c`] so any I2C driver can be used on it as if the device
/// had a bus of its own:
///
/// ```no_run
/// # use embedded_hal_mock::eh1::i2c as mock_i2c;
/// use i2c_mux::{Config, FixedSpeed, I2cExt, Mux};
///
/// # let i2c = mock_i2c::Mock::new(&[]);
/// let mux = Mux::new(FixedSpeed::new(i2c), Config::default()).unwrap();
/// let mut sensor_bus = mux.register_channel(3).unwrap();
///
/// let chip_id = sensor_bus.read_reg(0x76, 0xd0).unwrap();
/// ```
pub struct Channel<'a, M> {
    mux: &'a Mux<M>,
    number: u8,
    speed: Hertz,
}

impl<'a, M> Clone for Channel<'a, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, M> Copy for Channel<'a, M> {}

impl<'a, M> Channel<'a, M> {
    pub(crate) fn new(mux: &'a Mux<M>, number: u8, speed: Hertz) -> Self {
        Self { mux, number, speed }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    /// The bus speed transactions on this channel run at.
    pub fn speed(&self) -> Hertz {
        self.speed
    }
}

impl<'a, M, I2C, RST> Channel<'a, M>
where
    I2C: I2cBus,
    RST: OutputPin,
    M: BusMutex<Bus = Driver<I2C, RST>>,
{
    /// Change the bus speed for this channel.
    ///
    /// Only takes effect on the next transaction through this channel.  Speeds above the
    /// configured maximum are rejected.
    pub fn set_speed(&mut self, speed: Hertz) -> Result<(), Error<I2C::Error>> {
        self.mux.check_speed(speed)?;
        self.speed = speed;
        Ok(())
    }

    /// Raw transaction: write `write`, then read into `read`.
    ///
    /// Either buffer may be empty for a write-only or read-only transaction.
    pub fn tx(&self, address: u8, write: &[u8], read: &mut [u8]) -> Result<(), Error<I2C::Error>> {
        self.mux
            .transaction(self.number, self.speed, address, |drv| {
                drv.transfer(address, write, read)
            })
    }

    pub fn read(&self, address: u8, read: &mut [u8]) -> Result<(), Error<I2C::Error>> {
        self.tx(address, &[], read)
    }

    pub fn write(&self, address: u8, write: &[u8]) -> Result<(), Error<I2C::Error>> {
        self.tx(address, write, &mut [])
    }

    pub fn write_read(
        &self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Error<I2C::Error>> {
        self.tx(address, write, read)
    }

    /// Probe every address on this channel.
    ///
    /// Returns an iterator over the addresses which acknowledged a 1-byte read.  Each call starts
    /// a fresh scan.
    pub fn scan(&self) -> Scan<'a, M> {
        Scan::new(*self)
    }

    /// Probe every address on this channel and collect the ones which responded.
    #[cfg(feature = "heapless")]
    pub fn scan_all(&self) -> heapless::Vec<u8, { crate::scan::SCAN_ADDRESSES }> {
        self.scan().collect()
    }
}

impl<'a, M> fmt::Display for Channel<'a, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel {}", self.number)
    }
}

impl<'a, M> fmt::Debug for Channel<'a, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("number", &self.number)
            .field("speed", &self.speed)
            .finish()
    }
}

impl<'a, M, I2C, RST> hal_i2c::ErrorType for Channel<'a, M>
where
    I2C: I2cBus,
    RST: OutputPin,
    M: BusMutex<Bus = Driver<I2C, RST>>,
{
    type Error = Error<I2C::Error>;
}

impl<'a, M, I2C, RST> hal_i2c::I2c for Channel<'a, M>
where
    I2C: I2cBus,
    RST: OutputPin,
    M: BusMutex<Bus = Driver<I2C, RST>>,
{
    fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        Channel::read(self, address, read)
    }

    fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        Channel::write(self, address, write)
    }

    fn write_read(&mut self, address: u8, write: &[u8], read: &mut [u8]) -> Result<(), Self::Error> {
        Channel::write_read(self, address, write, read)
    }

    /// All operations run under a single lock, no other channel can get in between.
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.mux
            .transaction(self.number, self.speed, address, |drv| {
                drv.bus().transaction(address, operations)
            })
    }
}
