use embedded_hal::digital::OutputPin;
use log::trace;

use crate::{BusMutex, Channel, Driver, I2cBus};

/// Highest address probed by a scan, everything above is reserved.
const LAST_ADDRESS: u8 = 0x76;
/// Number of addresses probed by a scan.
pub(crate) const SCAN_ADDRESSES: usize = LAST_ADDRESS as usize + 1;

/// Iterator over the responding addresses on a [`Channel`], see [`Channel::scan()`].
///
/// Every call to `next()` probes addresses with a 1-byte read until one of them responds, in
/// ascending order.  The multiplexer's own address never shows up.
pub struct Scan<'a, M> {
    channel: Channel<'a, M>,
    next: Option<u8>,
}

impl<'a, M> Scan<'a, M> {
    pub(crate) fn new(channel: Channel<'a, M>) -> Self {
        Self {
            channel,
            next: Some(0x00),
        }
    }
}

impl<'a, M, I2C, RST> Iterator for Scan<'a, M>
where
    I2C: I2cBus,
    RST: OutputPin,
    M: BusMutex<Bus = Driver<I2C, RST>>,
{
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        while let Some(address) = self.next {
            self.next = address.checked_add(1).filter(|a| *a <= LAST_ADDRESS);

            let mut probe = [0x00];
            match self.channel.read(address, &mut probe) {
                Ok(()) => {
                    trace!("{}: device at {:#04x}", self.channel, address);
                    return Some(address);
                }
                Err(e) => trace!("{}: nothing at {:#04x}: {:?}", self.channel, address, e),
            }
        }
        None
    }
}
