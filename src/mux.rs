use core::cell::RefCell;
use core::convert::Infallible;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::{BusMutex, Channel, Config, Driver, Error, Hertz, I2cBus, InitError, OpenBus, ResetError};

/// An I2C multiplexer (PCA9548A, TCA9548A, PCA9546A, ...) and the physical bus it sits on.
///
/// Every downstream channel is handed out as a [`Channel`] which can be used like an independent
/// I2C bus.  All channels share the physical bus through the mutex `M`, the multiplexer is only
/// reprogrammed when a transaction targets a different channel or speed than the last one.
pub struct Mux<M> {
    driver: M,
    address: u8,
    channels: u8,
    max_speed: Hertz,
    default_speed: Hertz,
}

impl<I2C, RST> Mux<RefCell<Driver<I2C, RST>>>
where
    I2C: I2cBus,
    RST: OutputPin,
{
    /// Set up the multiplexer on an already opened bus and select channel 0.
    pub fn new(i2c: I2C, config: Config<RST>) -> Result<Self, InitError<Infallible, I2C::Error>> {
        Self::with_mutex(i2c, config)
    }

    /// Open the bus called `name` and set up the multiplexer on it.
    pub fn open<B>(
        opener: &mut B,
        name: &str,
        config: Config<RST>,
    ) -> Result<Self, InitError<B::Error, I2C::Error>>
    where
        B: OpenBus<Bus = I2C>,
    {
        Self::open_with_mutex(opener, name, config)
    }
}

impl<I2C, RST, M> Mux<M>
where
    I2C: I2cBus,
    RST: OutputPin,
    M: BusMutex<Bus = Driver<I2C, RST>>,
{
    pub fn with_mutex(
        i2c: I2C,
        config: Config<RST>,
    ) -> Result<Self, InitError<Infallible, I2C::Error>> {
        config.validate().map_err(InitError::InvalidConfig)?;
        Self::init(i2c, config)
    }

    pub fn open_with_mutex<B>(
        opener: &mut B,
        name: &str,
        config: Config<RST>,
    ) -> Result<Self, InitError<B::Error, I2C::Error>>
    where
        B: OpenBus<Bus = I2C>,
    {
        config.validate().map_err(InitError::InvalidConfig)?;
        let i2c = opener.open(name).map_err(InitError::Open)?;
        log::debug!("opened bus {}", name);
        Self::init(i2c, config)
    }

    fn init<O>(i2c: I2C, config: Config<RST>) -> Result<Self, InitError<O, I2C::Error>> {
        let mut driver = Driver::new(i2c, config.reset_pin, config.address);
        driver.select(0).map_err(InitError::Select)?;

        Ok(Self {
            driver: BusMutex::create(driver),
            address: config.address,
            channels: config.channels,
            max_speed: config.max_speed,
            default_speed: config.default_speed,
        })
    }

    /// Get a handle for downstream `channel`.
    ///
    /// Does not touch the hardware, the channel is selected on its first transaction.
    pub fn register_channel(&self, channel: u8) -> Result<Channel<'_, M>, Error<I2C::Error>> {
        self.check_channel(channel)?;
        Ok(Channel::new(self, channel, self.default_speed))
    }

    /// Run a transaction on `channel` at `speed`.
    ///
    /// This is what [`Channel::tx()`] does, without going through a registered channel.
    pub fn tx(
        &self,
        channel: u8,
        speed: Hertz,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Error<I2C::Error>> {
        self.check_channel(channel)?;
        self.check_speed(speed)?;
        self.transaction(channel, speed, address, |drv| drv.transfer(address, write, read))
    }

    /// Lock the bus, point the multiplexer at `channel` and run `f` on the physical bus.
    pub(crate) fn transaction<R, F>(
        &self,
        channel: u8,
        speed: Hertz,
        address: u8,
        f: F,
    ) -> Result<R, Error<I2C::Error>>
    where
        F: FnOnce(&mut Driver<I2C, RST>) -> Result<R, I2C::Error>,
    {
        self.driver.lock(|drv| {
            drv.prepare(channel, speed, address)?;
            f(drv).map_err(Error::Bus)
        })
    }

    /// Disconnect all downstream channels.
    pub fn deselect(&self) -> Result<(), Error<I2C::Error>> {
        self.driver
            .lock(|drv| drv.deselect())
            .map_err(Error::ChannelSwitch)
    }

    /// Power-cycle the multiplexer through its reset line.
    ///
    /// Drives the line low, then high again with 100 ms to settle after each edge and selects
    /// channel 0 again afterwards.  Requires a reset line in the [`Config`].
    pub fn reset<D: DelayNs>(
        &self,
        delay: &mut D,
    ) -> Result<(), ResetError<RST::Error, I2C::Error>> {
        self.driver.lock(|drv| drv.reset(delay))
    }

    /// The channel the multiplexer was last switched to, `None` when unknown or disconnected.
    pub fn active_channel(&self) -> Option<u8> {
        self.driver.lock(|drv| drv.active_channel())
    }

    /// The bus speed last set successfully, `None` before the first transaction.
    pub fn speed(&self) -> Option<Hertz> {
        self.driver.lock(|drv| drv.speed())
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn max_speed(&self) -> Hertz {
        self.max_speed
    }

    /// Destroy the multiplexer, handing back the bus and the reset line.
    pub fn release(self) -> (I2C, Option<RST>) {
        self.driver.into_inner().release()
    }

    fn check_channel(&self, channel: u8) -> Result<(), Error<I2C::Error>> {
        if channel >= self.channels {
            return Err(Error::InvalidChannel {
                channel,
                channels: self.channels,
            });
        }
        Ok(())
    }

    pub(crate) fn check_speed(&self, speed: Hertz) -> Result<(), Error<I2C::Error>> {
        if speed > self.max_speed {
            return Err(Error::SpeedLimit {
                requested: speed,
                max: self.max_speed,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FixedSpeed, NoResetPin, SetBusSpeed};
    use embedded_hal::i2c::{self as hal_i2c, ErrorKind, I2c, Operation};
    use embedded_hal_mock::eh1::digital as mock_pin;
    use embedded_hal_mock::eh1::i2c as mock_i2c;

    type MockMux = Mux<RefCell<Driver<FixedSpeed<mock_i2c::Mock>, NoResetPin>>>;

    fn mux(bus: &mock_i2c::Mock) -> MockMux {
        Mux::new(FixedSpeed::new(bus.clone()), Config::default()).unwrap()
    }

    /// Bus which records speed changes, optionally refusing them.
    struct SpeedBus {
        i2c: mock_i2c::Mock,
        speeds: Vec<Hertz>,
        refuse: bool,
    }

    impl hal_i2c::ErrorType for SpeedBus {
        type Error = ErrorKind;
    }

    impl I2c for SpeedBus {
        fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
            self.i2c.read(address, read)
        }

        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            self.i2c.transaction(address, operations)
        }

        fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
            self.i2c.write(address, write)
        }

        fn write_read(
            &mut self,
            address: u8,
            write: &[u8],
            read: &mut [u8],
        ) -> Result<(), Self::Error> {
            self.i2c.write_read(address, write, read)
        }
    }

    impl SetBusSpeed for SpeedBus {
        type SpeedError = &'static str;

        fn set_speed(&mut self, speed: Hertz) -> Result<(), Self::SpeedError> {
            self.speeds.push(speed);
            if self.refuse {
                return Err("clock divider out of range");
            }
            Ok(())
        }
    }

    #[test]
    fn init_selects_channel_zero() {
        let expectations = [mock_i2c::Transaction::write(0x70, vec![0x01])];
        let mut bus = mock_i2c::Mock::new(&expectations);

        let mux = mux(&bus);
        assert_eq!(mux.active_channel(), Some(0));
        assert_eq!(mux.speed(), None);
        assert_eq!(mux.address(), 0x70);
        assert_eq!(mux.channels(), 8);
        assert_eq!(mux.max_speed(), Hertz::FAST);

        bus.done();
    }

    #[test]
    fn init_failure() {
        let expectations =
            [mock_i2c::Transaction::write(0x70, vec![0x01]).with_error(ErrorKind::Other)];
        let mut bus = mock_i2c::Mock::new(&expectations);

        let res = Mux::new(FixedSpeed::new(bus.clone()), Config::default());
        assert_eq!(res.err(), Some(InitError::Select(ErrorKind::Other)));

        bus.done();
    }

    #[test]
    fn invalid_config_does_not_touch_bus() {
        let mut bus = mock_i2c::Mock::new(&[]);

        let res = Mux::new(FixedSpeed::new(bus.clone()), Config::default().channels(9));
        assert!(matches!(res.err(), Some(InitError::InvalidConfig(_))));

        bus.done();
    }

    #[test]
    fn open_by_name() {
        struct Opener(Option<FixedSpeed<mock_i2c::Mock>>);

        impl OpenBus for Opener {
            type Bus = FixedSpeed<mock_i2c::Mock>;
            type Error = &'static str;

            fn open(&mut self, name: &str) -> Result<Self::Bus, Self::Error> {
                match name {
                    "/dev/i2c-1" => self.0.take().ok_or("bus busy"),
                    _ => Err("no such bus"),
                }
            }
        }

        let expectations = [mock_i2c::Transaction::write(0x71, vec![0x01])];
        let mut bus = mock_i2c::Mock::new(&expectations);
        let mut opener = Opener(Some(FixedSpeed::new(bus.clone())));

        let res = Mux::open(&mut opener, "/dev/i2c-0", Config::default().address(0x71));
        assert_eq!(res.err(), Some(InitError::Open("no such bus")));

        let mux = Mux::open(&mut opener, "/dev/i2c-1", Config::default().address(0x71)).unwrap();
        assert_eq!(mux.address(), 0x71);

        let res = Mux::open(&mut opener, "/dev/i2c-1", Config::default());
        assert_eq!(res.err(), Some(InitError::Open("bus busy")));

        bus.done();
    }

    #[test]
    fn register_channel_range() {
        let expectations = [mock_i2c::Transaction::write(0x70, vec![0x01])];
        let mut bus = mock_i2c::Mock::new(&expectations);

        let mux = mux(&bus);
        for ch in 0..8 {
            let channel = mux.register_channel(ch).unwrap();
            assert_eq!(channel.number(), ch);
            assert_eq!(channel.speed(), Hertz::STANDARD);
        }
        for ch in 8..=u8::MAX {
            assert_eq!(
                mux.register_channel(ch).err(),
                Some(Error::InvalidChannel {
                    channel: ch,
                    channels: 8
                })
            );
        }

        bus.done();
    }

    #[test]
    fn switches_only_on_change() {
        let expectations = [
            mock_i2c::Transaction::write(0x70, vec![0x01]),
            // channel 3
            mock_i2c::Transaction::write(0x70, vec![0x08]),
            mock_i2c::Transaction::write_read(0x76, vec![0x00], vec![0x60]),
            // channel 3 again, no selector write
            mock_i2c::Transaction::write_read(0x76, vec![0x00], vec![0x60]),
        ];
        let mut bus = mock_i2c::Mock::new(&expectations);

        let mux = mux(&bus);
        let ch3 = mux.register_channel(3).unwrap();

        let mut buf = [0x00];
        ch3.tx(0x76, &[0x00], &mut buf).unwrap();
        assert_eq!(buf, [0x60]);
        assert_eq!(mux.active_channel(), Some(3));

        ch3.tx(0x76, &[0x00], &mut buf).unwrap();

        bus.done();
    }

    #[test]
    fn switches_back_and_forth() {
        let expectations = [
            mock_i2c::Transaction::write(0x70, vec![0x01]),
            mock_i2c::Transaction::write(0x70, vec![0x02]),
            mock_i2c::Transaction::write(0x40, vec![0x11]),
            mock_i2c::Transaction::write(0x70, vec![0x80]),
            mock_i2c::Transaction::write(0x40, vec![0x22]),
            mock_i2c::Transaction::write(0x70, vec![0x02]),
            mock_i2c::Transaction::write(0x40, vec![0x33]),
        ];
        let mut bus = mock_i2c::Mock::new(&expectations);

        let mux = mux(&bus);
        let a = mux.register_channel(1).unwrap();
        let b = mux.register_channel(7).unwrap();

        a.write(0x40, &[0x11]).unwrap();
        b.write(0x40, &[0x22]).unwrap();
        a.write(0x40, &[0x33]).unwrap();

        bus.done();
    }

    #[test]
    fn address_conflict_short_circuits() {
        let expectations = [mock_i2c::Transaction::write(0x70, vec![0x01])];
        let mut bus = mock_i2c::Mock::new(&expectations);

        let mux = mux(&bus);
        let ch5 = mux.register_channel(5).unwrap();

        let mut buf = [0x00];
        assert_eq!(
            ch5.read(0x70, &mut buf),
            Err(Error::AddressConflict(0x70))
        );
        // no switch happened either
        assert_eq!(mux.active_channel(), Some(0));

        bus.done();
    }

    #[test]
    fn failed_switch_is_retried() {
        let expectations = [
            mock_i2c::Transaction::write(0x70, vec![0x01]),
            mock_i2c::Transaction::write(0x70, vec![0x04]).with_error(ErrorKind::Other),
            mock_i2c::Transaction::write(0x70, vec![0x04]),
            mock_i2c::Transaction::read(0x21, vec![0xff]),
        ];
        let mut bus = mock_i2c::Mock::new(&expectations);

        let mux = mux(&bus);
        let ch2 = mux.register_channel(2).unwrap();

        let mut buf = [0x00];
        assert_eq!(
            ch2.read(0x21, &mut buf),
            Err(Error::ChannelSwitch(ErrorKind::Other))
        );
        assert_eq!(mux.active_channel(), Some(0));

        ch2.read(0x21, &mut buf).unwrap();
        assert_eq!(buf, [0xff]);
        assert_eq!(mux.active_channel(), Some(2));

        bus.done();
    }

    #[test]
    fn transfer_errors_are_passed_through() {
        let nack = ErrorKind::NoAcknowledge(hal_i2c::NoAcknowledgeSource::Data);
        let expectations = [
            mock_i2c::Transaction::write(0x70, vec![0x01]),
            mock_i2c::Transaction::write(0x50, vec![0x00, 0x01]).with_error(nack),
        ];
        let mut bus = mock_i2c::Mock::new(&expectations);

        let mux = mux(&bus);
        let ch0 = mux.register_channel(0).unwrap();
        assert_eq!(ch0.write(0x50, &[0x00, 0x01]), Err(Error::Bus(nack)));
        // the selection itself went fine
        assert_eq!(mux.active_channel(), Some(0));

        bus.done();
    }

    #[test]
    fn speed_is_set_once_per_change() {
        let expectations = [
            mock_i2c::Transaction::write(0x70, vec![0x01]),
            mock_i2c::Transaction::write(0x70, vec![0x02]),
            mock_i2c::Transaction::write(0x29, vec![0x80]),
            mock_i2c::Transaction::write(0x29, vec![0x81]),
            mock_i2c::Transaction::write(0x29, vec![0x82]),
            mock_i2c::Transaction::write(0x70, vec![0x01]),
            mock_i2c::Transaction::write(0x29, vec![0x83]),
        ];
        let mut bus = mock_i2c::Mock::new(&expectations);
        let speed_bus = SpeedBus {
            i2c: bus.clone(),
            speeds: Vec::new(),
            refuse: false,
        };

        let mux: Mux<RefCell<_>> = Mux::new(speed_bus, Config::default()).unwrap();
        let ch0 = mux.register_channel(0).unwrap();
        let mut ch1 = mux.register_channel(1).unwrap();

        ch1.write(0x29, &[0x80]).unwrap();
        ch1.write(0x29, &[0x81]).unwrap();
        assert_eq!(mux.speed(), Some(Hertz::STANDARD));

        ch1.set_speed(Hertz::FAST).unwrap();
        ch1.write(0x29, &[0x82]).unwrap();
        ch0.write(0x29, &[0x83]).unwrap();
        assert_eq!(mux.speed(), Some(Hertz::STANDARD));

        let (speed_bus, _) = mux.release();
        assert_eq!(
            speed_bus.speeds,
            [Hertz::STANDARD, Hertz::FAST, Hertz::STANDARD]
        );

        bus.done();
    }

    #[test]
    fn refused_speed_does_not_block_transfer() {
        let expectations = [
            mock_i2c::Transaction::write(0x70, vec![0x01]),
            mock_i2c::Transaction::write(0x29, vec![0x01]),
            mock_i2c::Transaction::write(0x29, vec![0x02]),
        ];
        let mut bus = mock_i2c::Mock::new(&expectations);
        let speed_bus = SpeedBus {
            i2c: bus.clone(),
            speeds: Vec::new(),
            refuse: true,
        };

        let mux: Mux<RefCell<_>> = Mux::new(speed_bus, Config::default()).unwrap();
        let ch0 = mux.register_channel(0).unwrap();

        ch0.write(0x29, &[0x01]).unwrap();
        assert_eq!(mux.speed(), None);
        // still unknown, so the next transaction tries again
        ch0.write(0x29, &[0x02]).unwrap();

        let (speed_bus, _) = mux.release();
        assert_eq!(speed_bus.speeds, [Hertz::STANDARD, Hertz::STANDARD]);

        bus.done();
    }

    #[test]
    fn mux_tx_validates() {
        let expectations = [
            mock_i2c::Transaction::write(0x70, vec![0x01]),
            mock_i2c::Transaction::write(0x70, vec![0x40]),
            mock_i2c::Transaction::read(0x33, vec![0x12, 0x34]),
        ];
        let mut bus = mock_i2c::Mock::new(&expectations);

        let mux = mux(&bus);
        let mut buf = [0x00; 2];
        assert_eq!(
            mux.tx(8, Hertz::STANDARD, 0x33, &[], &mut buf),
            Err(Error::InvalidChannel {
                channel: 8,
                channels: 8
            })
        );
        assert_eq!(
            mux.tx(6, Hertz::FAST_PLUS, 0x33, &[], &mut buf),
            Err(Error::SpeedLimit {
                requested: Hertz::FAST_PLUS,
                max: Hertz::FAST
            })
        );
        mux.tx(6, Hertz::FAST, 0x33, &[], &mut buf).unwrap();
        assert_eq!(buf, [0x12, 0x34]);

        bus.done();
    }

    #[test]
    fn deselect_forces_reselect() {
        let expectations = [
            mock_i2c::Transaction::write(0x70, vec![0x01]),
            mock_i2c::Transaction::write(0x70, vec![0x00]),
            mock_i2c::Transaction::write(0x70, vec![0x01]),
            mock_i2c::Transaction::write(0x10, vec![0xaa]),
        ];
        let mut bus = mock_i2c::Mock::new(&expectations);

        let mux = mux(&bus);
        let ch0 = mux.register_channel(0).unwrap();

        mux.deselect().unwrap();
        assert_eq!(mux.active_channel(), None);
        ch0.write(0x10, &[0xaa]).unwrap();

        bus.done();
    }

    struct Delay(u32);

    impl DelayNs for Delay {
        fn delay_ns(&mut self, ns: u32) {
            self.0 += ns / 1_000_000;
        }

        fn delay_ms(&mut self, ms: u32) {
            self.0 += ms;
        }
    }

    #[test]
    fn reset_reinitializes() {
        let expectations = [
            mock_i2c::Transaction::write(0x70, vec![0x01]),
            mock_i2c::Transaction::write(0x70, vec![0x08]),
            mock_i2c::Transaction::write(0x48, vec![0x01]),
            // reset
            mock_i2c::Transaction::write(0x70, vec![0x01]),
            // channel 3 must be selected again
            mock_i2c::Transaction::write(0x70, vec![0x08]),
            mock_i2c::Transaction::write(0x48, vec![0x02]),
        ];
        let mut bus = mock_i2c::Mock::new(&expectations);
        let pin_expectations = [
            mock_pin::Transaction::set(mock_pin::State::Low),
            mock_pin::Transaction::set(mock_pin::State::High),
        ];
        let mut pin = mock_pin::Mock::new(&pin_expectations);

        let config = Config::default().reset_pin(pin.clone());
        let mux: Mux<RefCell<_>> = Mux::new(FixedSpeed::new(bus.clone()), config).unwrap();
        let ch3 = mux.register_channel(3).unwrap();

        ch3.write(0x48, &[0x01]).unwrap();

        let mut delay = Delay(0);
        mux.reset(&mut delay).unwrap();
        assert_eq!(delay.0, 200);
        assert_eq!(mux.active_channel(), Some(0));

        ch3.write(0x48, &[0x02]).unwrap();

        bus.done();
        pin.done();
    }

    #[test]
    fn reset_without_line() {
        let expectations = [mock_i2c::Transaction::write(0x70, vec![0x01])];
        let mut bus = mock_i2c::Mock::new(&expectations);

        let mux = mux(&bus);
        let mut delay = Delay(0);
        assert_eq!(mux.reset(&mut delay), Err(ResetError::NoResetLine));
        assert_eq!(delay.0, 0);

        bus.done();
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Select(u8),
        Start(u8),
        End(u8),
    }

    /// Bus which logs every selector write and stalls in the middle of each transfer.
    struct TraceBus {
        log: std::sync::Arc<std::sync::Mutex<Vec<Event>>>,
    }

    impl TraceBus {
        fn push(&self, event: Event) {
            self.log.lock().unwrap().push(event);
        }
    }

    impl hal_i2c::ErrorType for TraceBus {
        type Error = ErrorKind;
    }

    impl I2c for TraceBus {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if address == 0x70 {
                match operations {
                    [Operation::Write(selector)] => self.push(Event::Select(selector[0])),
                    _ => panic!("unexpected mux access"),
                }
                return Ok(());
            }

            self.push(Event::Start(address));
            std::thread::sleep(std::time::Duration::from_millis(2));
            self.push(Event::End(address));
            Ok(())
        }
    }

    impl SetBusSpeed for TraceBus {
        type SpeedError = Infallible;

        fn set_speed(&mut self, _speed: Hertz) -> Result<(), Self::SpeedError> {
            Ok(())
        }
    }

    #[test]
    fn concurrent_channels_do_not_interleave() {
        let log = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let bus = TraceBus { log: log.clone() };
        let mux: Mux<std::sync::Mutex<_>> = Mux::with_mutex(bus, Config::default()).unwrap();

        std::thread::scope(|s| {
            for ch in 0..4u8 {
                let channel = mux.register_channel(ch).unwrap();
                s.spawn(move || {
                    for i in 0..10 {
                        channel.write(0x20 + ch, &[i]).unwrap();
                    }
                });
            }
        });

        let log = log.lock().unwrap();
        assert_eq!(log[0], Event::Select(0x01));
        assert_eq!(
            log.iter().filter(|e| matches!(e, Event::Start(_))).count(),
            40
        );

        let mut selected = None;
        let mut in_flight = None;
        for event in log.iter() {
            match *event {
                Event::Select(selector) => {
                    assert_eq!(in_flight, None, "selector written during a transfer");
                    selected = Some(selector);
                }
                Event::Start(addr) => {
                    assert_eq!(in_flight, None, "transfers overlap");
                    assert_eq!(selected, Some(1 << (addr - 0x20)), "transfer on wrong channel");
                    in_flight = Some(addr);
                }
                Event::End(addr) => {
                    assert_eq!(in_flight, Some(addr));
                    in_flight = None;
                }
            }
        }
    }
}
