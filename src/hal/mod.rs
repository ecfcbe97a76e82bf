pub mod gpio;
pub mod i2c;
pub mod interrupt;
pub mod timer;

// Re-export commonly used types
pub use gpio::{HalLine, OpenDrainLine, Pin, PortRegisters};
pub use i2c::{Error, LineState, RetryPolicy, SoftI2c, Transaction};
#[cfg(feature = "atmega328p")]
pub use interrupt::GlobalInterrupts;
pub use interrupt::{InterruptControl, NoSuppression};
pub use timer::{CycleDelay, HalDelay, HalfPeriodDelay};
