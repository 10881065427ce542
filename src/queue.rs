//! # Event Queue
//!
//! Fixed-capacity FIFO between producers (interrupt handlers, the alarm
//! service, drivers) and the dispatcher.
//!
//! The queue itself is a plain ring buffer with `&mut self` methods. The
//! [`Kernel`](crate::kernel::Kernel) owns it inside an interrupt mutex and
//! only touches it under the critical section, which is what makes it safe
//! to push from interrupt context.
//!
//! ```text
//!   head                  head + len
//!    │                        │
//!  ┌─▼──┬────┬────┬────┬────┬─▼──┬────┬────┐
//!  │ e0 │ e1 │ e2 │ e3 │ e4 │    │    │    │   (wraps modulo N)
//!  └────┴────┴────┴────┴────┴────┴────┴────┘
//!   pop()                    push()
//! ```

use crate::event::{Event, EventKind};
use crate::fault::Fault;

pub struct EventQueue<const N: usize> {
    slots: [Event; N],
    /// Index of the oldest pending event.
    head: usize,
    /// Pending events, `0 ..= N`.
    len: usize,
    /// Accepted pushes per kind since start.
    enqueued: [u32; EventKind::COUNT],
    /// Largest `len` ever observed.
    high_water: usize,
}

impl<const N: usize> EventQueue<N> {
    pub const fn new() -> Self {
        Self {
            slots: [Event::EMPTY; N],
            head: 0,
            len: 0,
            enqueued: [0; EventKind::COUNT],
            high_water: 0,
        }
    }

    /// Append `event` at the tail.
    ///
    /// A full queue is left untouched and reported as
    /// [`Fault::QueueOverflow`]; the caller is expected to fail-stop.
    pub fn push(&mut self, event: Event) -> Result<(), Fault> {
        if self.len == N {
            return Err(Fault::QueueOverflow);
        }

        let tail = (self.head + self.len) % N;
        self.slots[tail] = event;
        self.len += 1;

        let counter = &mut self.enqueued[event.kind.index()];
        *counter = counter.wrapping_add(1);
        if self.len > self.high_water {
            self.high_water = self.len;
        }
        Ok(())
    }

    /// Remove and return the oldest event.
    pub fn pop(&mut self) -> Option<Event> {
        if self.len == 0 {
            return None;
        }

        let event = self.slots[self.head];
        self.head = (self.head + 1) % N;
        self.len -= 1;
        Some(event)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Events of `kind` accepted since start.
    #[inline]
    pub fn enqueued(&self, kind: EventKind) -> u32 {
        self.enqueued[kind.index()]
    }

    #[inline]
    pub fn high_water(&self) -> usize {
        self.high_water
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Instant;

    fn ev(kind: EventKind, aux: u32) -> Event {
        Event::new(kind, aux, Instant::from_micros(aux as u64))
    }

    #[test]
    fn test_fifo_order() {
        let mut q: EventQueue<8> = EventQueue::new();
        for aux in 0..8 {
            q.push(ev(EventKind::App0, aux)).unwrap();
        }
        for aux in 0..8 {
            let e = q.pop().expect("queued");
            assert_eq!(e.kind, EventKind::App0);
            assert_eq!(e.aux, aux);
        }
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_overflow_keeps_contents() {
        let mut q: EventQueue<4> = EventQueue::new();
        for aux in 0..4 {
            q.push(ev(EventKind::App1, aux)).unwrap();
        }

        assert_eq!(q.push(ev(EventKind::App2, 99)), Err(Fault::QueueOverflow));
        assert_eq!(q.len(), 4);

        let drained: std::vec::Vec<u32> = core::iter::from_fn(|| q.pop()).map(|e| e.aux).collect();
        assert_eq!(drained, [0, 1, 2, 3]);
        assert_eq!(q.enqueued(EventKind::App2), 0, "rejected push must not be counted");
    }

    #[test]
    fn test_wraparound() {
        let mut q: EventQueue<3> = EventQueue::new();
        for round in 0..10u32 {
            q.push(ev(EventKind::Tick, round * 2)).unwrap();
            q.push(ev(EventKind::Tick, round * 2 + 1)).unwrap();
            assert_eq!(q.pop().map(|e| e.aux), Some(round * 2));
            assert_eq!(q.pop().map(|e| e.aux), Some(round * 2 + 1));
        }
        assert!(q.is_empty());
    }

    #[test]
    fn test_statistics() {
        let mut q: EventQueue<8> = EventQueue::new();
        q.push(ev(EventKind::Tick, 0)).unwrap();
        q.push(ev(EventKind::Tick, 0)).unwrap();
        q.push(ev(EventKind::ButtonPressed, 1)).unwrap();
        q.pop();
        q.pop();
        q.push(ev(EventKind::Tick, 0)).unwrap();

        assert_eq!(q.enqueued(EventKind::Tick), 3);
        assert_eq!(q.enqueued(EventKind::ButtonPressed), 1);
        assert_eq!(q.high_water(), 3);
        assert_eq!(q.len(), 2);
    }
}
