//! # Events
//!
//! An event is a kind tag, a 32-bit payload and the time it was queued.
//! Kinds form a small closed set: the runtime's own control kinds followed
//! by slots the application is free to use.

use core::fmt;

/// What happened.
///
/// The discriminants are stable and index the dispatcher's subscription
/// table; [`EventKind::COUNT`] bounds them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum EventKind {
    /// Placeholder; never produced by the runtime.
    Void = 0,
    /// 1 ms hardware tick, consumed by the alarm service.
    Tick = 1,
    /// Edge seen on a button line. `aux` = button index.
    ButtonCandidate = 2,
    /// Debounced press. `aux` = button index.
    ButtonPressed = 3,
    /// Release, or a candidate that turned out to be noise. `aux` = button index.
    ButtonReleased = 4,
    /// Debounce timer expiry. `aux` = button index.
    ButtonTimer = 5,
    /// No confirmed press for the inactivity timeout.
    Inactivity = 6,
    App0 = 7,
    App1 = 8,
    App2 = 9,
    App3 = 10,
    App4 = 11,
    App5 = 12,
    App6 = 13,
    App7 = 14,
    App8 = 15,
}

impl EventKind {
    /// Number of kinds, and the size of every per-kind table.
    pub const COUNT: usize = 16;

    const ALL: [EventKind; Self::COUNT] = [
        EventKind::Void,
        EventKind::Tick,
        EventKind::ButtonCandidate,
        EventKind::ButtonPressed,
        EventKind::ButtonReleased,
        EventKind::ButtonTimer,
        EventKind::Inactivity,
        EventKind::App0,
        EventKind::App1,
        EventKind::App2,
        EventKind::App3,
        EventKind::App4,
        EventKind::App5,
        EventKind::App6,
        EventKind::App7,
        EventKind::App8,
    ];

    /// Kind for a raw numeric id, or `None` if out of range.
    #[inline]
    pub const fn from_id(id: u32) -> Option<Self> {
        if (id as usize) < Self::COUNT {
            Some(Self::ALL[id as usize])
        } else {
            None
        }
    }

    #[inline]
    pub const fn id(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Point in time, in microseconds since the board clock started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Instant(u64);

impl Instant {
    pub const ZERO: Instant = Instant(0);

    #[inline]
    pub const fn from_micros(us: u64) -> Self {
        Self(us)
    }

    #[inline]
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Microseconds from `earlier` to `self`, zero if `earlier` is later.
    #[inline]
    pub const fn micros_since(self, earlier: Instant) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// One queued occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Event {
    pub kind: EventKind,
    pub aux: u32,
    /// When the event was queued.
    pub timestamp: Instant,
}

impl Event {
    pub(crate) const EMPTY: Event = Event {
        kind: EventKind::Void,
        aux: 0,
        timestamp: Instant::ZERO,
    };

    #[inline]
    pub const fn new(kind: EventKind, aux: u32, timestamp: Instant) -> Self {
        Self { kind, aux, timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_ids_roundtrip_through_table() {
        for id in 0..EventKind::COUNT as u32 {
            let kind = EventKind::from_id(id).expect("in range");
            assert_eq!(kind.id() as u32, id);
        }
    }

    #[test]
    fn test_out_of_range_ids_rejected() {
        assert_eq!(EventKind::from_id(EventKind::COUNT as u32), None);
        assert_eq!(EventKind::from_id(u32::MAX), None);
    }

    #[test]
    fn test_instant_arithmetic() {
        let a = Instant::from_micros(1_500);
        let b = Instant::from_micros(4_000);
        assert_eq!(b.micros_since(a), 2_500);
        assert_eq!(a.micros_since(b), 0, "never negative");
        assert_eq!(b.as_micros(), 4_000);
    }
}
