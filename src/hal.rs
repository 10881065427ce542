//! # Hardware Collaborators
//!
//! The runtime never touches registers itself. Everything chip-specific is
//! reached through the traits below, which a board support type implements
//! (see `arch::nrf52840` for the reference board, and the mock
//! used by the unit tests).
//!
//! All methods take `&self`: register access is inherently shared, and the
//! same board value is reached both from the main loop and from interrupt
//! handlers.

/// Logical GPIO pin, as understood by the board's [`Gpio`] implementation.
pub type PinId = u8;

/// Logical external-interrupt line. Lines are numbered like buttons.
pub type LineId = u8;

/// A single-bit diagnostic output ("mark fault N").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MonitorId(pub u8);

/// Global interrupt enable/disable.
pub trait InterruptGate {
    fn disable_interrupts(&self);
    fn enable_interrupts(&self);
}

/// Free-running time source used to stamp events.
pub trait Clock {
    /// Microseconds since the clock was started.
    fn now_us(&self) -> u64;
}

/// Digital input.
pub trait Gpio {
    /// Current electrical level of `pin` (`true` = high).
    fn read(&self, pin: PinId) -> bool;
}

/// Per-line external interrupt control.
pub trait ExtInterrupt {
    fn enable_line(&self, line: LineId);
    fn disable_line(&self, line: LineId);
    /// Forget an edge latched while the line was disabled.
    fn clear_pending(&self, line: LineId);
}

/// Periodic hardware tick. Each tick must end up as one
/// [`EventKind::Tick`](crate::event::EventKind::Tick) pushed by the
/// board's interrupt handler.
pub trait TickSource {
    fn start_periodic_ms(&self, period_ms: u32);
}

pub trait Watchdog {
    fn feed(&self);
}

/// Low-power modes.
pub trait Power {
    /// Suspend the CPU until any enabled interrupt fires.
    fn wait_for_interrupt(&self);
    /// Deepest sleep the board offers. On the reference board this powers
    /// the chip off and a button press resets it, so it does not return.
    fn sleep_indefinite(&self);
}

/// Diagnostic outputs used to signal faults and CPU activity.
pub trait Monitor {
    fn mark(&self, id: MonitorId);
    fn unmark(&self, id: MonitorId);
}

/// Everything the runtime needs from a board.
pub trait Board:
    InterruptGate + Clock + Gpio + ExtInterrupt + TickSource + Watchdog + Power + Monitor
{
    /// Terminal state after a fail-stop fault. The default spins and lets
    /// the watchdog reset the device.
    fn halt(&self) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }
}
