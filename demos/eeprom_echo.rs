//! 24Cxx EEPROM echo on an ATmega328P
//!
//! SDA on PC4, SCL on PC5 (bit-banged, the TWI peripheral stays off).
//! Results go out on USART0 at 9600 baud.
#![no_std]
#![no_main]

use panic_halt as _;

use avr_device::atmega328p::{Peripherals, USART0};
use avr_soft_i2c::config::BusConfig;
use avr_soft_i2c::hal::gpio::{atmega328p::PORTC, Pin};
use avr_soft_i2c::hal::{CycleDelay, GlobalInterrupts, SoftI2c};
use avr_soft_i2c::testing::{IdleLinesTest, ProbeTest, ScanTest, TestRunner};
use avr_soft_i2c::{address_byte, READ, WRITE};
use ufmt::{uWrite, uwriteln};

const EEPROM_ADDR: u8 = 0x50;

// (16_000_000 / (16 * 9600)) - 1
const UBRR_9600: u16 = 103;

struct Console {
    usart: USART0,
}

impl Console {
    fn new(usart: USART0) -> Self {
        usart.ubrr0.write(|w| w.bits(UBRR_9600));
        usart.ucsr0b.write(|w| w.txen0().set_bit());
        Self { usart }
    }
}

impl uWrite for Console {
    type Error = core::convert::Infallible;

    fn write_str(&mut self, s: &str) -> Result<(), Self::Error> {
        for byte in s.bytes() {
            while self.usart.ucsr0a.read().udre0().bit_is_clear() {}
            self.usart.udr0.write(|w| w.bits(byte));
        }
        Ok(())
    }
}

#[avr_device::entry]
fn main() -> ! {
    let dp = Peripherals::take().unwrap();
    let mut console = Console::new(dp.USART0);

    let config = BusConfig::DEFAULT;
    let sda = unsafe { Pin::<PORTC, 4>::new() };
    let scl = unsafe { Pin::<PORTC, 5>::new() };
    let mut bus = SoftI2c::with_interrupts(sda, scl, CycleDelay::new(&config), GlobalInterrupts, config);
    bus.initialize();

    uwriteln!(console, "soft i2c @ {} Hz", config.realized_frequency_hz()).ok();

    let mut runner = TestRunner::new(console);
    runner.run_suite(
        "Bus",
        &mut bus,
        &[&IdleLinesTest, &ScanTest, &ProbeTest { address: EEPROM_ADDR }],
    );
    let mut console = runner.into_inner();

    // Write one byte at cell 0x00
    let mut t = bus.start(address_byte(EEPROM_ADDR, WRITE));
    let written = t.write(0x00) && t.write(0xAB);
    t.stop();

    // The EEPROM ignores its address until the write cycle is over
    let mut t = bus.start_wait(address_byte(EEPROM_ADDR, WRITE));
    t.write(0x00);
    t.repeated_start(address_byte(EEPROM_ADDR, READ));
    let value = t.read(true);
    t.stop();

    uwriteln!(console, "wrote: {:?}, read back: {}", written, value).ok();

    loop {}
}
