/// Global interrupt masking around timing-critical bus operations.
///
/// The driver suppresses at the beginning of start, repeated start, write,
/// read and stop, and restores unconditionally at the end of write, read and
/// stop. Start is always followed by a write, which does the restore.
pub trait InterruptControl {
    fn suppress(&mut self);
    fn restore(&mut self);
}

/// Leaves interrupts alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSuppression;

impl InterruptControl for NoSuppression {
    #[inline(always)]
    fn suppress(&mut self) {}

    #[inline(always)]
    fn restore(&mut self) {}
}

/// `cli` / `sei` on the global interrupt flag.
///
/// Restoring always enables interrupts, whatever the state was before the
/// operation. Do not use the bus from interrupt handlers or critical
/// sections with this enabled.
#[cfg(feature = "atmega328p")]
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalInterrupts;

#[cfg(feature = "atmega328p")]
impl InterruptControl for GlobalInterrupts {
    #[inline(always)]
    fn suppress(&mut self) {
        avr_device::interrupt::disable();
    }

    #[inline(always)]
    fn restore(&mut self) {
        unsafe { avr_device::interrupt::enable() };
    }
}
