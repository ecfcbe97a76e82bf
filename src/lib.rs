//! Bit-banged I2C bus master for 8-bit AVR microcontrollers.
//!
//! Any two GPIO pins can serve as SDA and SCL. Timing comes from calibrated
//! busy loops, see [`config::BusConfig`].
//!
//! ```ignore
//! use avr_soft_i2c::config::BusConfig;
//! use avr_soft_i2c::hal::gpio::{atmega328p::PORTC, Pin};
//! use avr_soft_i2c::hal::{CycleDelay, SoftI2c};
//! use avr_soft_i2c::hal::i2c::{address_byte, READ, WRITE};
//!
//! let sda = unsafe { Pin::<PORTC, 4>::new() };
//! let scl = unsafe { Pin::<PORTC, 5>::new() };
//! let config = BusConfig::DEFAULT;
//! let mut bus = SoftI2c::new(sda, scl, CycleDelay::new(&config), config);
//! bus.initialize();
//!
//! let mut t = bus.start(address_byte(0x50, WRITE));
//! t.write(0x00);
//! t.repeated_start(address_byte(0x50, READ));
//! let value = t.read(true);
//! t.stop();
//! ```
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![cfg_attr(target_arch = "avr", feature(asm_experimental_arch))]

pub mod logger;

pub mod config;
pub mod hal;
pub mod testing;

pub use config::{BusConfig, BusMode};
pub use hal::i2c::{address_byte, Error, RetryPolicy, SoftI2c, Transaction, READ, WRITE};
