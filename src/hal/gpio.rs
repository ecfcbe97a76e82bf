use core::convert::Infallible;
use core::marker::PhantomData;

use embedded_hal::digital::v2::{InputPin, OutputPin};

/// One I2C bus line emulated as open-drain.
///
/// A line is either pulled low by us or released to the external pull-up.
/// It is never driven high.
pub trait OpenDrainLine {
    /// Pull the line low.
    fn drive_low(&mut self);

    /// Let the pull-up (or another device) decide the level.
    fn release(&mut self);

    /// Electrical level currently seen on the line.
    fn is_high(&self) -> bool;

    #[inline]
    fn is_low(&self) -> bool {
        !self.is_high()
    }

    /// Put the line into its idle configuration. Called from
    /// [`SoftI2c::initialize`](crate::hal::SoftI2c::initialize).
    fn reset(&mut self) {
        self.release();
    }
}

/// Per-port register access for [`Pin`].
///
/// Bit updates on DDRx and PORTx must be atomic with respect to interrupts,
/// so that an ISR touching another pin of the same port never loses a write.
pub trait PortRegisters {
    /// Set bit `bit` of DDRx (pin becomes an output).
    fn set_direction(bit: u8);
    /// Clear bit `bit` of DDRx (pin becomes an input).
    fn clear_direction(bit: u8);
    /// Clear bit `bit` of PORTx (output latch low, pull-up off).
    fn clear_latch(bit: u8);
    /// Current PINx levels.
    fn read_pins() -> u8;
}

/// A GPIO pin used as an open-drain bus line.
///
/// Driving low sets the DDR bit, releasing clears it. The PORT bit is
/// cleared once by [`OpenDrainLine::reset`] and never touched again, so
/// every edge is a single `sbi`/`cbi`. The level is read back from PINx.
#[derive(Debug)]
pub struct Pin<PORT, const P: u8> {
    _port: PhantomData<PORT>,
}

impl<PORT: PortRegisters, const P: u8> Pin<PORT, P> {
    /// # Safety
    ///
    /// The caller must own the pin exclusively. Nothing else may touch
    /// bit `P` of this port's DDR or PORT register while the pin is alive.
    pub const unsafe fn new() -> Self {
        const { assert!(P < 8, "AVR ports have eight pins") };
        Self { _port: PhantomData }
    }
}

impl<PORT: PortRegisters, const P: u8> OpenDrainLine for Pin<PORT, P> {
    #[inline(always)]
    fn drive_low(&mut self) {
        PORT::set_direction(P);
    }

    #[inline(always)]
    fn release(&mut self) {
        PORT::clear_direction(P);
    }

    #[inline(always)]
    fn is_high(&self) -> bool {
        PORT::read_pins() & (1 << P) != 0
    }

    fn reset(&mut self) {
        PORT::clear_direction(P);
        PORT::clear_latch(P);
    }
}

/// `sbi`/`cbi` on an I/O-space register. The bit number must be a literal
/// in the instruction, hence one arm per bit.
#[cfg(target_arch = "avr")]
macro_rules! io_bit {
    (@emit $insn:literal, $io:literal, $n:literal) => {
        unsafe {
            core::arch::asm!(
                concat!($insn, " ", stringify!($io), ", ", stringify!($n)),
                options(nostack, preserves_flags),
            )
        }
    };
    ($insn:literal, $io:literal, $bit:expr) => {
        match $bit {
            0 => io_bit!(@emit $insn, $io, 0),
            1 => io_bit!(@emit $insn, $io, 1),
            2 => io_bit!(@emit $insn, $io, 2),
            3 => io_bit!(@emit $insn, $io, 3),
            4 => io_bit!(@emit $insn, $io, 4),
            5 => io_bit!(@emit $insn, $io, 5),
            6 => io_bit!(@emit $insn, $io, 6),
            7 => io_bit!(@emit $insn, $io, 7),
            _ => {}
        }
    };
}

/// Implements [`PortRegisters`] for an avr-device port peripheral.
///
/// `$ddr_io` and `$port_io` are the I/O-space addresses used by `sbi`/`cbi`
/// on target. Elsewhere the PAC registers are modified inside a critical
/// section.
#[cfg(feature = "atmega328p")]
macro_rules! impl_port {
    ($PORT:ident, $pin:ident, $ddr:ident, $port:ident, $ddr_io:literal, $port_io:literal) => {
        impl PortRegisters for $PORT {
            #[inline(always)]
            fn set_direction(bit: u8) {
                #[cfg(target_arch = "avr")]
                io_bit!("sbi", $ddr_io, bit);
                #[cfg(not(target_arch = "avr"))]
                avr_device::interrupt::free(|_| unsafe {
                    (*$PORT::ptr()).$ddr.modify(|r, w| w.bits(r.bits() | (1 << bit)));
                });
            }

            #[inline(always)]
            fn clear_direction(bit: u8) {
                #[cfg(target_arch = "avr")]
                io_bit!("cbi", $ddr_io, bit);
                #[cfg(not(target_arch = "avr"))]
                avr_device::interrupt::free(|_| unsafe {
                    (*$PORT::ptr()).$ddr.modify(|r, w| w.bits(r.bits() & !(1 << bit)));
                });
            }

            #[inline(always)]
            fn clear_latch(bit: u8) {
                #[cfg(target_arch = "avr")]
                io_bit!("cbi", $port_io, bit);
                #[cfg(not(target_arch = "avr"))]
                avr_device::interrupt::free(|_| unsafe {
                    (*$PORT::ptr()).$port.modify(|r, w| w.bits(r.bits() & !(1 << bit)));
                });
            }

            #[inline(always)]
            fn read_pins() -> u8 {
                unsafe { (*$PORT::ptr()).$pin.read().bits() }
            }
        }
    };
}

#[cfg(feature = "atmega328p")]
pub mod atmega328p {
    //! ATmega328P ports
    pub use avr_device::atmega328p::{PORTB, PORTC, PORTD};

    use super::PortRegisters;

    impl_port!(PORTB, pinb, ddrb, portb, 0x04, 0x05);
    impl_port!(PORTC, pinc, ddrc, portc, 0x07, 0x08);
    impl_port!(PORTD, pind, ddrd, portd, 0x0A, 0x0B);
}

/// Adapts an `embedded-hal` pin that is already configured as open-drain
/// output with input readback.
///
/// `set_low` pulls the line, `set_high` releases it.
#[derive(Debug)]
pub struct HalLine<P> {
    pin: P,
}

impl<P> HalLine<P>
where
    P: OutputPin<Error = Infallible> + InputPin<Error = Infallible>,
{
    pub fn new(pin: P) -> Self {
        Self { pin }
    }

    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P> OpenDrainLine for HalLine<P>
where
    P: OutputPin<Error = Infallible> + InputPin<Error = Infallible>,
{
    #[inline]
    fn drive_low(&mut self) {
        self.pin.set_low().unwrap_or_else(|e| match e {});
    }

    #[inline]
    fn release(&mut self) {
        self.pin.set_high().unwrap_or_else(|e| match e {});
    }

    #[inline]
    fn is_high(&self) -> bool {
        self.pin.is_high().unwrap_or_else(|e| match e {})
    }
}
