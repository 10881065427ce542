//! # Power Policy
//!
//! Puts the device into its deepest sleep once no button has been touched
//! for [`INACTIVITY_TIMEOUT_MS`]. Built on a one-shot alarm that every
//! press restarts, from the first edge on: a press candidate counts as
//! much as a confirmed press.

use crate::alarm::encode;
use crate::config::{INACTIVITY_TIMEOUT_MS, MONITOR_BUSY};
use crate::dispatcher::Subscriber;
use crate::event::{Event, EventKind};
use crate::fault::Fault;
use crate::hal::Board;
use crate::kernel::Kernel;

pub struct PowerPolicy {
    /// Kind emitted by the inactivity alarm.
    alarm_kind: EventKind,
    /// Kinds that count as user activity.
    activity_kinds: [EventKind; 2],
    timeout_ms: u32,
}

/// The policy installed by [`Dispatcher::init`](crate::dispatcher::Dispatcher::init).
pub static POWER_POLICY: PowerPolicy = PowerPolicy::new(
    EventKind::Inactivity,
    [EventKind::ButtonCandidate, EventKind::ButtonPressed],
    INACTIVITY_TIMEOUT_MS,
);

impl PowerPolicy {
    pub const fn new(alarm_kind: EventKind, activity_kinds: [EventKind; 2], timeout_ms: u32) -> Self {
        Self {
            alarm_kind,
            activity_kinds,
            timeout_ms,
        }
    }

    #[inline]
    pub fn alarm_kind(&self) -> EventKind {
        self.alarm_kind
    }

    #[inline]
    pub fn activity_kinds(&self) -> &[EventKind] {
        &self.activity_kinds
    }

    /// (Re)start the inactivity countdown.
    pub fn arm<B: Board>(&self, kernel: &Kernel<B>) -> Result<(), Fault> {
        kernel.activate_alarm(encode(false, self.timeout_ms, 0), self.alarm_kind, 0)
    }
}

impl<B: Board> Subscriber<B> for PowerPolicy {
    fn on_event(&self, kernel: &Kernel<B>, event: Event) -> Result<(), Fault> {
        if event.kind == self.alarm_kind {
            info!("no activity for {} ms, entering deep sleep", self.timeout_ms);
            let board = kernel.board();
            board.unmark(MONITOR_BUSY);
            board.sleep_indefinite();
            board.mark(MONITOR_BUSY);
            // Boards whose deep sleep returns carry on with a fresh countdown.
            self.arm(kernel)
        } else if self.activity_kinds.contains(&event.kind) {
            self.arm(kernel)
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
