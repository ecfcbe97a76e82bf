//! Build-time bus configuration

include!(concat!(env!("OUT_DIR"), "/cpu_freq.rs"));

/// Cycles spent by a half-period call that skips the loop (call + ret).
pub const DELAY_CALL_CYCLES: u32 = 7;

/// Cycles per `dec`/`brne` iteration of the delay loop.
pub const CYCLES_PER_ITERATION: u32 = 3;

/// Fixed cycles spent per bit outside the two half-period calls.
pub const BIT_OVERHEAD_CYCLES: u32 = 15;

/// Cycles subtracted from the half period before dividing into iterations.
const HALF_PERIOD_OVERHEAD_CYCLES: u32 = 12;

/// Bus clock class
#[derive(Debug, Clone, Copy, PartialEq, Eq, ufmt::derive::uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusMode {
    /// ~25 kHz, for long or noisy buses
    Slow,
    /// ~100 kHz
    Standard,
    /// ~400 kHz, not every slave copes with it
    Fast,
}

impl BusMode {
    /// Target SCL frequency in Hz
    pub const fn frequency_hz(self) -> u32 {
        match self {
            BusMode::Slow => 25_000,
            BusMode::Standard => 100_000,
            BusMode::Fast => 400_000,
        }
    }

    /// Target half period rounded up to whole microseconds.
    ///
    /// Rounding up keeps a microsecond-granular delay at or below the mode's
    /// frequency.
    pub const fn half_period_us(self) -> u16 {
        let f = self.frequency_hz();
        ((500_000 + f - 1) / f) as u16
    }

    /// Mode selected by the `fast-mode` / `slow-mode` features.
    pub const fn from_features() -> Self {
        if cfg!(feature = "fast-mode") {
            BusMode::Fast
        } else if cfg!(feature = "slow-mode") {
            BusMode::Slow
        } else {
            BusMode::Standard
        }
    }
}

/// Everything the driver needs to lay out its timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ufmt::derive::uDebug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusConfig {
    pub cpu_freq_hz: u32,
    pub mode: BusMode,
    /// Disable interrupts for the duration of each bus operation
    pub suppress_interrupts: bool,
    /// Wait for SCL to read high after releasing it
    pub clock_stretching: bool,
}

impl BusConfig {
    /// Configuration resolved from the build environment and Cargo features.
    pub const DEFAULT: Self = Self {
        cpu_freq_hz: CPU_FREQ_HZ,
        mode: BusMode::from_features(),
        suppress_interrupts: cfg!(feature = "no-interrupt"),
        clock_stretching: cfg!(feature = "clock-stretching"),
    };

    /// Standard mode, no interrupt suppression, no clock stretching.
    pub const fn new(cpu_freq_hz: u32) -> Self {
        Self {
            cpu_freq_hz,
            mode: BusMode::Standard,
            suppress_interrupts: false,
            clock_stretching: false,
        }
    }

    pub const fn with_mode(mut self, mode: BusMode) -> Self {
        self.mode = mode;
        self
    }

    pub const fn with_interrupt_suppression(mut self, enabled: bool) -> Self {
        self.suppress_interrupts = enabled;
        self
    }

    pub const fn with_clock_stretching(mut self, enabled: bool) -> Self {
        self.clock_stretching = enabled;
        self
    }

    /// Number of delay loop iterations per half period.
    ///
    /// Zero means the delay degrades to a bare call/return and the bus runs
    /// as fast as the CPU allows.
    pub const fn delay_iterations(&self) -> u8 {
        let half = self.cpu_freq_hz / self.mode.frequency_hz() / 2;
        let iterations = half.saturating_sub(HALF_PERIOD_OVERHEAD_CYCLES) / CYCLES_PER_ITERATION;
        if iterations > u8::MAX as u32 {
            u8::MAX
        } else {
            iterations as u8
        }
    }

    /// CPU cycles consumed by one half-period delay call.
    pub const fn half_period_cycles(&self) -> u32 {
        DELAY_CALL_CYCLES + CYCLES_PER_ITERATION * self.delay_iterations() as u32
    }

    /// CPU cycles for one SCL period (one transmitted bit).
    pub const fn bit_cycles(&self) -> u32 {
        BIT_OVERHEAD_CYCLES + 2 * self.half_period_cycles()
    }

    /// SCL frequency actually produced with these settings.
    pub const fn realized_frequency_hz(&self) -> u32 {
        self.cpu_freq_hz / self.bit_cycles()
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
