use embedded_hal::blocking::delay::DelayUs;

use crate::config::{BusConfig, BusMode};

/// Half a bus period of busy waiting.
///
/// Called before and after every SCL edge. Must not yield.
pub trait HalfPeriodDelay {
    fn delay_half_period(&mut self);
}

/// Calibrated busy loop, counted in CPU cycles.
///
/// The iteration count comes from [`BusConfig::delay_iterations`]. With a
/// count of zero the call returns immediately and the bus clock is bounded
/// by the CPU clock alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleDelay {
    iterations: u8,
}

impl CycleDelay {
    pub const fn new(config: &BusConfig) -> Self {
        Self {
            iterations: config.delay_iterations(),
        }
    }

    pub const fn iterations(&self) -> u8 {
        self.iterations
    }
}

impl Default for CycleDelay {
    fn default() -> Self {
        Self::new(&BusConfig::DEFAULT)
    }
}

impl HalfPeriodDelay for CycleDelay {
    #[inline(never)]
    fn delay_half_period(&mut self) {
        spin(self.iterations);
    }
}

#[cfg(target_arch = "avr")]
#[inline(always)]
fn spin(iterations: u8) {
    if iterations == 0 {
        return;
    }
    // 3 cycles per iteration, 1 less on the final fall-through
    unsafe {
        core::arch::asm!(
            "1:",
            "dec {n}",
            "brne 1b",
            n = inout(reg) iterations => _,
            options(nomem, nostack),
        );
    }
}

#[cfg(not(target_arch = "avr"))]
#[inline(always)]
fn spin(iterations: u8) {
    for _ in 0..iterations {
        core::hint::spin_loop();
    }
}

/// Half-period delay on top of any `embedded-hal` microsecond delay.
///
/// Coarser than [`CycleDelay`]: the half period rounds up to whole
/// microseconds, so fast mode runs at 250 kHz.
#[derive(Debug)]
pub struct HalDelay<D> {
    delay: D,
    half_period_us: u16,
}

impl<D: DelayUs<u16>> HalDelay<D> {
    pub fn new(delay: D, mode: BusMode) -> Self {
        Self {
            delay,
            half_period_us: mode.half_period_us(),
        }
    }

    pub fn half_period_us(&self) -> u16 {
        self.half_period_us
    }

    pub fn into_inner(self) -> D {
        self.delay
    }
}

impl<D: DelayUs<u16>> HalfPeriodDelay for HalDelay<D> {
    #[inline]
    fn delay_half_period(&mut self) {
        self.delay.delay_us(self.half_period_us);
    }
}
