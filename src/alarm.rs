//! # Alarm Service
//!
//! Software timers multiplexed on the 1 ms hardware tick.
//!
//! ## Encoding
//!
//! Alarms are configured with a packed 32-bit word:
//!
//! ```text
//!  31  30        24 23                                0
//! ┌───┬────────────┬───────────────────────────────────┐
//! │ P │   flags    │            delay (ms)             │
//! └───┴────────────┴───────────────────────────────────┘
//! ```
//!
//! `P` selects periodic reload, `flags` are seven free bits for the caller,
//! and the delay tops out at 2^24 - 1 ms (about 4.66 hours). The all-zero
//! word, [`ALARM_OFF`], cancels an alarm.
//!
//! ## Identity
//!
//! An alarm is found by the `(kind, aux)` pair it will emit, not by a
//! handle. Independent call sites can therefore keep one timer each under
//! the same kind, told apart by the payload (one debounce timer per
//! button). Two call sites that happen to use the same pair share a
//! single timer: the second `activate` reconfigures the first one's alarm.

use crate::dispatcher::Subscriber;
use crate::event::{Event, EventKind};
use crate::fault::Fault;
use crate::hal::Board;
use crate::kernel::Kernel;

const DELAY_MASK: u32 = 0x00FF_FFFF;
const FLAGS_MASK: u32 = 0x7F00_0000;
const FLAGS_SHIFT: u32 = 24;
const PERIODIC_BIT: u32 = 0x8000_0000;

/// Longest representable delay.
pub const MAX_DELAY_MS: u32 = DELAY_MASK;

/// Encoded configuration that cancels an alarm.
pub const ALARM_OFF: u32 = 0;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Decoded form of an alarm configuration word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AlarmConfig {
    pub periodic: bool,
    pub delay_ms: u32,
    pub flags: u8,
}

impl AlarmConfig {
    /// Pack into the 32-bit word accepted by [`Kernel::activate_alarm`].
    /// Out-of-range delay and flag bits are truncated.
    pub const fn encode(self) -> u32 {
        let mut word = self.delay_ms & DELAY_MASK;
        word |= ((self.flags as u32) << FLAGS_SHIFT) & FLAGS_MASK;
        if self.periodic {
            word |= PERIODIC_BIT;
        }
        word
    }

    pub const fn decode(word: u32) -> Self {
        Self {
            periodic: word & PERIODIC_BIT != 0,
            delay_ms: word & DELAY_MASK,
            flags: ((word & FLAGS_MASK) >> FLAGS_SHIFT) as u8,
        }
    }
}

/// Shorthand for `AlarmConfig { .. }.encode()`.
#[inline]
pub const fn encode(periodic: bool, delay_ms: u32, flags: u8) -> u32 {
    AlarmConfig { periodic, delay_ms, flags }.encode()
}

#[inline]
pub const fn decode(word: u32) -> AlarmConfig {
    AlarmConfig::decode(word)
}

// ---------------------------------------------------------------------------
// Alarm pool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Alarm {
    active: bool,
    periodic: bool,
    period_ms: u32,
    remaining_ms: u32,
    kind: EventKind,
    aux: u32,
}

impl Alarm {
    const IDLE: Alarm = Alarm {
        active: false,
        periodic: false,
        period_ms: 0,
        remaining_ms: 0,
        kind: EventKind::Void,
        aux: 0,
    };

    #[inline]
    fn matches(&self, kind: EventKind, aux: u32) -> bool {
        self.active && self.kind == kind && self.aux == aux
    }
}

/// Fixed pool of software alarms. Like the queue, this is plain data; the
/// kernel serializes access to it.
pub struct AlarmPool<const N: usize> {
    alarms: [Alarm; N],
    active: usize,
    peak: usize,
}

impl<const N: usize> AlarmPool<N> {
    pub const fn new() -> Self {
        Self {
            alarms: [Alarm::IDLE; N],
            active: 0,
            peak: 0,
        }
    }

    /// Create, reconfigure or cancel the alarm keyed by `(kind, aux)`.
    ///
    /// - `word == ALARM_OFF`: cancel the alarm if there is one.
    /// - existing alarm: reconfigure it in place and restart its countdown.
    /// - otherwise take a free slot, or fail with
    ///   [`Fault::AlarmPoolExhausted`] if there is none.
    pub fn activate(&mut self, word: u32, kind: EventKind, aux: u32) -> Result<(), Fault> {
        let found = self.alarms.iter().position(|a| a.matches(kind, aux));

        if word == ALARM_OFF {
            if let Some(slot) = found {
                self.alarms[slot].active = false;
                self.active -= 1;
                trace!("alarm ({}, {}) cancelled", kind, aux);
            }
            return Ok(());
        }

        let slot = match found {
            Some(slot) => slot,
            None => {
                let slot = self
                    .alarms
                    .iter()
                    .position(|a| !a.active)
                    .ok_or(Fault::AlarmPoolExhausted { kind, aux })?;
                self.active += 1;
                self.peak = self.peak.max(self.active);
                slot
            }
        };

        let config = AlarmConfig::decode(word);
        self.alarms[slot] = Alarm {
            active: true,
            periodic: config.periodic,
            period_ms: config.delay_ms,
            remaining_ms: config.delay_ms,
            kind,
            aux,
        };
        trace!("alarm ({}, {}) set: {} ms, periodic={}", kind, aux, config.delay_ms, config.periodic);
        Ok(())
    }

    /// Advance every active alarm by one tick.
    ///
    /// Each alarm that reaches zero is handed to `fire` and then reloaded
    /// (periodic) or released (one-shot). An alarm configured with a zero
    /// delay fires on every tick. An error from `fire` stops the sweep.
    pub fn tick<F>(&mut self, mut fire: F) -> Result<(), Fault>
    where
        F: FnMut(EventKind, u32) -> Result<(), Fault>,
    {
        for alarm in self.alarms.iter_mut().filter(|a| a.active) {
            alarm.remaining_ms = alarm.remaining_ms.saturating_sub(1);
            if alarm.remaining_ms > 0 {
                continue;
            }

            fire(alarm.kind, alarm.aux)?;

            if alarm.periodic {
                alarm.remaining_ms = alarm.period_ms;
            } else {
                alarm.active = false;
                self.active -= 1;
            }
        }
        Ok(())
    }

    /// Whether an alarm keyed by `(kind, aux)` is running.
    pub fn is_active(&self, kind: EventKind, aux: u32) -> bool {
        self.alarms.iter().any(|a| a.matches(kind, aux))
    }

    /// Milliseconds left on the alarm keyed by `(kind, aux)`.
    pub fn remaining_ms(&self, kind: EventKind, aux: u32) -> Option<u32> {
        self.alarms
            .iter()
            .find(|a| a.matches(kind, aux))
            .map(|a| a.remaining_ms)
    }

    #[inline]
    pub fn active_count(&self) -> usize {
        self.active
    }

    /// Most alarms ever active at once.
    #[inline]
    pub fn peak_usage(&self) -> usize {
        self.peak
    }
}

impl<const N: usize> Default for AlarmPool<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tick subscriber
// ---------------------------------------------------------------------------

/// Subscriber that advances the kernel's alarm pool on every tick event.
/// Events of any other kind are ignored.
pub struct AlarmService {
    tick_kind: EventKind,
}

impl AlarmService {
    pub const fn new(tick_kind: EventKind) -> Self {
        Self { tick_kind }
    }

    #[inline]
    pub fn tick_kind(&self) -> EventKind {
        self.tick_kind
    }
}

/// The service installed by [`Dispatcher::init`](crate::dispatcher::Dispatcher::init).
pub static ALARM_SERVICE: AlarmService = AlarmService::new(EventKind::Tick);

impl<B: Board> Subscriber<B> for AlarmService {
    fn on_event(&self, kernel: &Kernel<B>, event: Event) -> Result<(), Fault> {
        if event.kind != self.tick_kind {
            return Ok(());
        }
        kernel.tick_alarms()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
