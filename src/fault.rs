//! # Faults
//!
//! Capacity exhaustion anywhere in the runtime is unrecoverable. The
//! component that detects it marks the matching monitor and returns the
//! fault; it then travels up with `?` to [`Kernel::fail_stop`], which halts
//! until the watchdog resets the device.
//!
//! [`Kernel::fail_stop`]: crate::kernel::Kernel::fail_stop

use core::fmt;

use crate::config::{MONITOR_ALARM_OVERFLOW, MONITOR_QUEUE_OVERFLOW, MONITOR_SUBSCRIPTION_OVERFLOW};
use crate::event::EventKind;
use crate::hal::MonitorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// Push on a full event queue.
    QueueOverflow,
    /// Subscribe on a kind whose table is full.
    SubscriptionOverflow { kind: EventKind },
    /// New alarm requested with every slot in use.
    AlarmPoolExhausted { kind: EventKind, aux: u32 },
}

impl Fault {
    /// Monitor that signals this fault.
    pub const fn monitor(self) -> MonitorId {
        match self {
            Fault::QueueOverflow => MONITOR_QUEUE_OVERFLOW,
            Fault::SubscriptionOverflow { .. } => MONITOR_SUBSCRIPTION_OVERFLOW,
            Fault::AlarmPoolExhausted { .. } => MONITOR_ALARM_OVERFLOW,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::QueueOverflow => f.write_str("event queue overflow"),
            Fault::SubscriptionOverflow { kind } => {
                write!(f, "too many subscribers for {}", kind)
            }
            Fault::AlarmPoolExhausted { kind, aux } => {
                write!(f, "no free alarm for ({}, {})", kind, aux)
            }
        }
    }
}
