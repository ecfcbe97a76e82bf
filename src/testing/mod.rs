//! On-target bus self tests
//!
//! Suites report over any `ufmt` writer, typically the UART console.

use ufmt::{uwrite, uwriteln, uWrite};

use crate::hal::gpio::OpenDrainLine;
use crate::hal::i2c::{address_byte, SoftI2c, WRITE};
use crate::hal::interrupt::InterruptControl;
use crate::hal::timer::HalfPeriodDelay;

/// First and last non-reserved 7-bit addresses.
pub const SCAN_RANGE: core::ops::RangeInclusive<u8> = 0x08..=0x77;

pub trait TestCase<B> {
    fn name(&self) -> &'static str;
    fn run(&self, bus: &mut B) -> TestResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ufmt::derive::uDebug)]
pub enum TestResult {
    Pass,
    Fail(TestError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ufmt::derive::uDebug)]
pub enum TestError {
    /// A line read low while the bus should be idle
    LineHeldLow,
    /// Address byte not acknowledged
    NoAcknowledge(u8),
    /// Scan found nobody on the bus
    NoDevices,
}

pub struct TestRunner<W> {
    out: W,
    total_tests: u16,
    passed_tests: u16,
    current_suite: &'static str,
}

impl<W: uWrite> TestRunner<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            total_tests: 0,
            passed_tests: 0,
            current_suite: "",
        }
    }

    pub fn run_suite<B>(&mut self, name: &'static str, bus: &mut B, tests: &[&dyn TestCase<B>]) {
        self.current_suite = name;
        self.total_tests = 0;
        self.passed_tests = 0;
        uwriteln!(self.out, "\n=== Test Suite: {} ===", name).ok();

        for test in tests {
            self.total_tests += 1;
            uwrite!(self.out, "Running {}: ", test.name()).ok();

            match test.run(bus) {
                TestResult::Pass => {
                    self.passed_tests += 1;
                    uwriteln!(self.out, "PASS").ok();
                }
                TestResult::Fail(err) => {
                    uwriteln!(self.out, "FAIL - {:?}", err).ok();
                }
            }
        }

        self.print_summary();
    }

    pub fn all_passed(&self) -> bool {
        self.passed_tests == self.total_tests
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn print_summary(&mut self) {
        uwriteln!(self.out, "\nTest Summary for {}:", self.current_suite).ok();

        let percent = if self.total_tests == 0 {
            100
        } else {
            (self.passed_tests as u32 * 100) / self.total_tests as u32
        };
        uwriteln!(
            self.out,
            "Passed: {}/{} ({}%)",
            self.passed_tests,
            self.total_tests,
            percent
        )
        .ok();
    }
}

/// Probe every address in [`SCAN_RANGE`] with an empty write.
///
/// Found addresses are stored in `found` in ascending order; the return value
/// is how many were stored.
pub fn scan<SDA, SCL, D, I>(bus: &mut SoftI2c<SDA, SCL, D, I>, found: &mut [u8]) -> usize
where
    SDA: OpenDrainLine,
    SCL: OpenDrainLine,
    D: HalfPeriodDelay,
    I: InterruptControl,
{
    let mut count = 0;
    for address in SCAN_RANGE {
        let transaction = bus.start(address_byte(address, WRITE));
        let present = transaction.acknowledged();
        transaction.stop();

        if present && count < found.len() {
            found[count] = address;
            count += 1;
        }
    }
    count
}

pub struct IdleLinesTest;

impl<SDA, SCL, D, I> TestCase<SoftI2c<SDA, SCL, D, I>> for IdleLinesTest
where
    SDA: OpenDrainLine,
    SCL: OpenDrainLine,
    D: HalfPeriodDelay,
    I: InterruptControl,
{
    fn name(&self) -> &'static str {
        "Idle Lines"
    }

    fn run(&self, bus: &mut SoftI2c<SDA, SCL, D, I>) -> TestResult {
        bus.initialize();
        if bus.lines().is_idle() {
            TestResult::Pass
        } else {
            TestResult::Fail(TestError::LineHeldLow)
        }
    }
}

/// Checks that a device answers at a 7-bit address.
pub struct ProbeTest {
    pub address: u8,
}

impl<SDA, SCL, D, I> TestCase<SoftI2c<SDA, SCL, D, I>> for ProbeTest
where
    SDA: OpenDrainLine,
    SCL: OpenDrainLine,
    D: HalfPeriodDelay,
    I: InterruptControl,
{
    fn name(&self) -> &'static str {
        "Device Probe"
    }

    fn run(&self, bus: &mut SoftI2c<SDA, SCL, D, I>) -> TestResult {
        let transaction = bus.start(address_byte(self.address, WRITE));
        let acknowledged = transaction.acknowledged();
        transaction.stop();

        if acknowledged {
            TestResult::Pass
        } else {
            TestResult::Fail(TestError::NoAcknowledge(self.address))
        }
    }
}

pub struct ScanTest;

impl<SDA, SCL, D, I> TestCase<SoftI2c<SDA, SCL, D, I>> for ScanTest
where
    SDA: OpenDrainLine,
    SCL: OpenDrainLine,
    D: HalfPeriodDelay,
    I: InterruptControl,
{
    fn name(&self) -> &'static str {
        "Bus Scan"
    }

    fn run(&self, bus: &mut SoftI2c<SDA, SCL, D, I>) -> TestResult {
        let mut found = [0u8; 1];
        if scan(bus, &mut found) > 0 {
            TestResult::Pass
        } else {
            TestResult::Fail(TestError::NoDevices)
        }
    }
}
