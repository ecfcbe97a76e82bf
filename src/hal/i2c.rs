//! Bit-banged I2C master
//!
//! Both lines are open-drain: a line is either pulled low or released to the
//! pull-up resistor, never driven high. That lets slaves acknowledge and
//! stretch the clock.
//!
//! Bus ownership is tracked by [`Transaction`]. Every start hands one out and
//! only [`Transaction::stop`] gives the bus back.

use core::convert::Infallible;
use core::num::NonZeroU16;

use embedded_hal::blocking::i2c::{Read, Write, WriteRead};

use crate::config::BusConfig;
use crate::hal::gpio::OpenDrainLine;
use crate::hal::interrupt::{InterruptControl, NoSuppression};
use crate::hal::timer::HalfPeriodDelay;
use crate::{log_debug, log_trace, log_warn};

/// R/W bit value for reads
pub const READ: u8 = 1;
/// R/W bit value for writes
pub const WRITE: u8 = 0;

/// Bus level error, reported by the `embedded-hal` layer and bounded waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ufmt::derive::uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Nobody acknowledged the address byte
    AddressNack,
    /// The slave refused a data byte
    DataNack,
    /// The slave kept refusing its address for every allowed attempt
    Busy,
}

/// How long [`SoftI2c::start_wait_with`] keeps polling a busy device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Poll until the device answers, possibly forever.
    #[default]
    Unbounded,
    /// Give up after this many address attempts.
    Attempts(NonZeroU16),
}

/// Levels seen on the two lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ufmt::derive::uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineState {
    pub sda: bool,
    pub scl: bool,
}

impl LineState {
    /// Both lines released and pulled high.
    pub fn is_idle(&self) -> bool {
        self.sda && self.scl
    }
}

/// Builds an 8-bit address byte from a 7-bit address and R/W bit.
#[inline]
pub const fn address_byte(address: u8, rw: u8) -> u8 {
    (address << 1) | (rw & 1)
}

/// Software I2C bus master on two GPIO lines.
pub struct SoftI2c<SDA, SCL, D, I = NoSuppression> {
    sda: SDA,
    scl: SCL,
    delay: D,
    interrupts: I,
    config: BusConfig,
}

impl<SDA, SCL, D> SoftI2c<SDA, SCL, D, NoSuppression>
where
    SDA: OpenDrainLine,
    SCL: OpenDrainLine,
    D: HalfPeriodDelay,
{
    /// Bus without interrupt control.
    ///
    /// `config.suppress_interrupts` has nothing to act on here; use
    /// [`SoftI2c::with_interrupts`] for that.
    pub fn new(sda: SDA, scl: SCL, delay: D, config: BusConfig) -> Self {
        Self::with_interrupts(sda, scl, delay, NoSuppression, config)
    }
}

impl<SDA, SCL, D, I> SoftI2c<SDA, SCL, D, I>
where
    SDA: OpenDrainLine,
    SCL: OpenDrainLine,
    D: HalfPeriodDelay,
    I: InterruptControl,
{
    pub fn with_interrupts(sda: SDA, scl: SCL, delay: D, interrupts: I, config: BusConfig) -> Self {
        Self {
            sda,
            scl,
            delay,
            interrupts,
            config,
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Hand the lines and helpers back.
    pub fn free(self) -> (SDA, SCL, D, I) {
        (self.sda, self.scl, self.delay, self.interrupts)
    }

    /// Release both lines. Call once before the first transaction.
    pub fn initialize(&mut self) {
        self.sda.reset();
        self.scl.reset();
        log_debug!(
            "soft i2c up: {} Hz bus, {} delay iterations",
            self.config.realized_frequency_hz(),
            self.config.delay_iterations()
        );
    }

    /// Current levels of SDA and SCL.
    pub fn lines(&self) -> LineState {
        LineState {
            sda: self.sda.is_high(),
            scl: self.scl.is_high(),
        }
    }

    /// Issue a start condition and send `address` (R/W bit included).
    ///
    /// The transaction is returned even when nobody acknowledged; the bus is
    /// claimed either way and must be stopped.
    pub fn start(&mut self, address: u8) -> Transaction<'_, SDA, SCL, D, I> {
        let acknowledged = self.start_condition(address);
        Transaction::new(self, acknowledged)
    }

    /// Single attempt at addressing a device that may be busy.
    ///
    /// On NACK the bus is stopped again and `WouldBlock` is returned.
    pub fn try_start(&mut self, address: u8) -> nb::Result<Transaction<'_, SDA, SCL, D, I>, Infallible> {
        self.poll_start(address)?;
        Ok(Transaction::new(self, true))
    }

    /// Start, retrying until the device acknowledges its address.
    ///
    /// Blocks forever if the device never answers. Useful for EEPROMs, which
    /// ignore their address while an internal write cycle is running.
    pub fn start_wait(&mut self, address: u8) -> Transaction<'_, SDA, SCL, D, I> {
        nb::block!(self.poll_start(address)).unwrap_or_else(|never| match never {});
        Transaction::new(self, true)
    }

    /// [`SoftI2c::start_wait`] with an optional limit on the number of
    /// attempts.
    pub fn start_wait_with(
        &mut self,
        address: u8,
        policy: RetryPolicy,
    ) -> Result<Transaction<'_, SDA, SCL, D, I>, Error> {
        let limit = match policy {
            RetryPolicy::Unbounded => return Ok(self.start_wait(address)),
            RetryPolicy::Attempts(limit) => limit.get(),
        };

        for attempt in 1..=limit {
            if self.poll_start(address).is_ok() {
                log_trace!("address {} acknowledged after {} attempts", address, attempt);
                return Ok(Transaction::new(self, true));
            }
        }

        log_warn!("address {} still busy after {} attempts", address, limit);
        Err(Error::Busy)
    }

    fn poll_start(&mut self, address: u8) -> nb::Result<(), Infallible> {
        if self.start_condition(address) {
            Ok(())
        } else {
            self.stop_condition();
            Err(nb::Error::WouldBlock)
        }
    }

    fn start_condition(&mut self, address: u8) -> bool {
        self.suppress_interrupts();
        // SCL is high while idle, so this falling edge is the start.
        self.sda.drive_low();
        self.delay.delay_half_period();
        self.write_byte(address)
    }

    fn repeated_start_condition(&mut self, address: u8) -> bool {
        self.suppress_interrupts();
        self.scl.drive_low();
        self.delay.delay_half_period();
        self.sda.release();
        self.delay.delay_half_period();
        self.scl.release();
        self.delay.delay_half_period();
        self.sda.drive_low();
        self.delay.delay_half_period();
        self.write_byte(address)
    }

    fn stop_condition(&mut self) {
        self.suppress_interrupts();
        self.scl.drive_low();
        self.sda.drive_low();
        self.delay.delay_half_period();
        self.scl.release();
        self.delay.delay_half_period();
        self.sda.release();
        self.delay.delay_half_period();
        self.restore_interrupts();
    }

    fn write_byte(&mut self, byte: u8) -> bool {
        self.suppress_interrupts();

        for bit in (0..8).rev() {
            self.scl.drive_low();
            if byte & (1 << bit) != 0 {
                self.sda.release();
            } else {
                self.sda.drive_low();
            }
            self.delay.delay_half_period();
            self.scl.release();
            self.wait_for_scl();
            self.delay.delay_half_period();
        }

        // Hand SDA to the slave for the acknowledge bit
        self.scl.drive_low();
        self.sda.release();
        self.delay.delay_half_period();
        self.scl.release();
        self.wait_for_scl();
        let acknowledged = self.sda.is_low();
        self.delay.delay_half_period();
        self.scl.drive_low();

        self.restore_interrupts();
        acknowledged
    }

    fn read_byte(&mut self, last: bool) -> u8 {
        self.suppress_interrupts();

        let mut byte = 0u8;
        for _ in 0..8 {
            self.scl.drive_low();
            self.sda.release();
            self.delay.delay_half_period();
            self.scl.release();
            self.wait_for_scl();
            self.delay.delay_half_period();
            byte = (byte << 1) | self.sda.is_high() as u8;
        }

        // ACK keeps the slave sending, NACK ends the read
        self.scl.drive_low();
        if last {
            self.sda.release();
        } else {
            self.sda.drive_low();
        }
        self.delay.delay_half_period();
        self.scl.release();
        self.wait_for_scl();
        self.delay.delay_half_period();
        self.scl.drive_low();

        self.restore_interrupts();
        byte
    }

    /// Let a slave hold SCL low. No timeout: a stuck line hangs here.
    #[inline(always)]
    fn wait_for_scl(&mut self) {
        if self.config.clock_stretching {
            while self.scl.is_low() {}
        }
    }

    #[inline(always)]
    fn suppress_interrupts(&mut self) {
        if self.config.suppress_interrupts {
            self.interrupts.suppress();
        }
    }

    #[inline(always)]
    fn restore_interrupts(&mut self) {
        if self.config.suppress_interrupts {
            self.interrupts.restore();
        }
    }
}

/// An open bus transaction.
///
/// Holds the bus from the start condition until [`Transaction::stop`].
/// Dropping it without stopping leaves the bus claimed; debug builds panic
/// when that happens.
#[must_use = "the bus stays claimed until `stop` is called"]
pub struct Transaction<'a, SDA, SCL, D, I>
where
    SDA: OpenDrainLine,
    SCL: OpenDrainLine,
    D: HalfPeriodDelay,
    I: InterruptControl,
{
    bus: &'a mut SoftI2c<SDA, SCL, D, I>,
    acknowledged: bool,
    stopped: bool,
}

impl<'a, SDA, SCL, D, I> Transaction<'a, SDA, SCL, D, I>
where
    SDA: OpenDrainLine,
    SCL: OpenDrainLine,
    D: HalfPeriodDelay,
    I: InterruptControl,
{
    fn new(bus: &'a mut SoftI2c<SDA, SCL, D, I>, acknowledged: bool) -> Self {
        Self {
            bus,
            acknowledged,
            stopped: false,
        }
    }

    /// Whether the last address byte was acknowledged.
    pub fn acknowledged(&self) -> bool {
        self.acknowledged
    }

    /// Send one byte, MSB first. Returns true on ACK.
    pub fn write(&mut self, byte: u8) -> bool {
        self.bus.write_byte(byte)
    }

    /// Receive one byte. `last` answers with NACK to end the read.
    pub fn read(&mut self, last: bool) -> u8 {
        self.bus.read_byte(last)
    }

    /// Address a device again without giving up the bus.
    pub fn repeated_start(&mut self, address: u8) -> bool {
        self.acknowledged = self.bus.repeated_start_condition(address);
        self.acknowledged
    }

    /// Current line levels, without giving up the bus.
    pub fn lines(&self) -> LineState {
        self.bus.lines()
    }

    /// Issue the stop condition and free the bus.
    pub fn stop(mut self) {
        self.bus.stop_condition();
        self.stopped = true;
    }
}

impl<'a, SDA, SCL, D, I> Drop for Transaction<'a, SDA, SCL, D, I>
where
    SDA: OpenDrainLine,
    SCL: OpenDrainLine,
    D: HalfPeriodDelay,
    I: InterruptControl,
{
    fn drop(&mut self) {
        debug_assert!(
            self.stopped || unwinding(),
            "I2C transaction dropped without a stop condition"
        );
    }
}

/// A second panic while unwinding aborts and hides the first one.
#[cfg(any(test, feature = "std"))]
fn unwinding() -> bool {
    std::thread::panicking()
}

#[cfg(not(any(test, feature = "std")))]
fn unwinding() -> bool {
    false
}

impl<SDA, SCL, D, I> Write for SoftI2c<SDA, SCL, D, I>
where
    SDA: OpenDrainLine,
    SCL: OpenDrainLine,
    D: HalfPeriodDelay,
    I: InterruptControl,
{
    type Error = Error;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Error> {
        let mut transaction = self.start(address_byte(address, WRITE));
        let result = send(&mut transaction, bytes);
        transaction.stop();
        result
    }
}

impl<SDA, SCL, D, I> Read for SoftI2c<SDA, SCL, D, I>
where
    SDA: OpenDrainLine,
    SCL: OpenDrainLine,
    D: HalfPeriodDelay,
    I: InterruptControl,
{
    type Error = Error;

    /// An empty `buffer` only checks that the device answers. The address
    /// goes out with the write bit so the slave never starts driving SDA.
    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Error> {
        if buffer.is_empty() {
            return Write::write(self, address, &[]);
        }

        let mut transaction = self.start(address_byte(address, READ));
        let result = receive(&mut transaction, buffer);
        transaction.stop();
        result
    }
}

impl<SDA, SCL, D, I> WriteRead for SoftI2c<SDA, SCL, D, I>
where
    SDA: OpenDrainLine,
    SCL: OpenDrainLine,
    D: HalfPeriodDelay,
    I: InterruptControl,
{
    type Error = Error;

    /// With an empty `buffer` this is a plain write.
    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Error> {
        if buffer.is_empty() {
            return Write::write(self, address, bytes);
        }

        let mut transaction = self.start(address_byte(address, WRITE));
        let result = send(&mut transaction, bytes).and_then(|()| {
            transaction.repeated_start(address_byte(address, READ));
            receive(&mut transaction, buffer)
        });
        transaction.stop();
        result
    }
}

fn send<SDA, SCL, D, I>(transaction: &mut Transaction<'_, SDA, SCL, D, I>, bytes: &[u8]) -> Result<(), Error>
where
    SDA: OpenDrainLine,
    SCL: OpenDrainLine,
    D: HalfPeriodDelay,
    I: InterruptControl,
{
    if !transaction.acknowledged() {
        return Err(Error::AddressNack);
    }
    for &byte in bytes {
        if !transaction.write(byte) {
            return Err(Error::DataNack);
        }
    }
    Ok(())
}

fn receive<SDA, SCL, D, I>(transaction: &mut Transaction<'_, SDA, SCL, D, I>, buffer: &mut [u8]) -> Result<(), Error>
where
    SDA: OpenDrainLine,
    SCL: OpenDrainLine,
    D: HalfPeriodDelay,
    I: InterruptControl,
{
    if !transaction.acknowledged() {
        return Err(Error::AddressNack);
    }
    let count = buffer.len();
    for (i, byte) in buffer.iter_mut().enumerate() {
        *byte = transaction.read(i + 1 == count);
    }
    Ok(())
}
