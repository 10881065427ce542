//! # Kernel
//!
//! State shared between interrupt handlers and the main loop: the board,
//! the critical-section nesting counter, the event queue and the alarm
//! pool. Everything here takes `&self`, so one `Kernel` can sit in a
//! `static` and be reached from every ISR, while the
//! [`Dispatcher`](crate::dispatcher::Dispatcher) borrows it from `main`.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► static KERNEL: Kernel<Board>   ← const-initialised
//!         ├─► Dispatcher::new(&KERNEL)
//!         ├─► dispatcher.init()               ← alarm service, power policy, tick
//!         ├─► driver.install(&mut dispatcher) ← button FSM, edge lines
//!         ├─► dispatcher.subscribe(..)        ← application (×N)
//!         └─► dispatcher.run_forever()        ← no return
//! ```
//!
//! Interrupt handlers only ever call [`Kernel::push_event`] (or the button
//! edge handoff built on it) and [`Kernel::fail_stop`] if that fails.

use core::cell::RefCell;
use core::sync::atomic::AtomicU32;

use cortex_m::interrupt::Mutex;

use crate::alarm::AlarmPool;
use crate::config::{ALARM_POOL_SIZE, QUEUE_CAPACITY};
use crate::event::{Event, EventKind, Instant};
use crate::fault::Fault;
use crate::hal::Board;
use crate::queue::EventQueue;
use crate::sync::CriticalSection;

pub struct Kernel<B: Board> {
    board: B,
    /// Critical-section depth, shared by every context.
    nesting: AtomicU32,
    queue: Mutex<RefCell<EventQueue<QUEUE_CAPACITY>>>,
    alarms: Mutex<RefCell<AlarmPool<ALARM_POOL_SIZE>>>,
}

impl<B: Board> Kernel<B> {
    pub const fn new(board: B) -> Self {
        Self {
            board,
            nesting: AtomicU32::new(0),
            queue: Mutex::new(RefCell::new(EventQueue::new())),
            alarms: Mutex::new(RefCell::new(AlarmPool::new())),
        }
    }

    #[inline]
    pub fn board(&self) -> &B {
        &self.board
    }

    /// Enter the system-wide critical section. Interrupts stay disabled
    /// until the outermost guard is dropped.
    #[inline]
    pub fn critical(&self) -> CriticalSection<'_, B> {
        CriticalSection::enter(&self.board, &self.nesting)
    }

    // -----------------------------------------------------------------------
    // Event queue
    // -----------------------------------------------------------------------

    /// Queue an event. Safe to call from interrupt context.
    ///
    /// The timestamp is taken before the critical section so the clock read
    /// does not lengthen it. A full queue marks the overflow monitor and
    /// returns [`Fault::QueueOverflow`]; queued events are not touched.
    pub fn push_event(&self, kind: EventKind, aux: u32) -> Result<(), Fault> {
        let event = Event::new(kind, aux, Instant::from_micros(self.board.now_us()));

        let result = {
            let cs = self.critical();
            let mut queue = self.queue.borrow(cs.token()).borrow_mut();
            queue.push(event)
        };
        result.map_err(|fault| self.raise(fault))
    }

    /// Queue an event given a raw kind id. Unknown ids are dropped.
    pub fn push_raw(&self, id: u32, aux: u32) -> Result<(), Fault> {
        match EventKind::from_id(id) {
            Some(kind) => self.push_event(kind, aux),
            None => {
                trace!("dropping event with unknown id {}", id);
                Ok(())
            }
        }
    }

    /// Remove the oldest pending event.
    pub fn pop_event(&self) -> Option<Event> {
        let cs = self.critical();
        let mut queue = self.queue.borrow(cs.token()).borrow_mut();
        queue.pop()
    }

    /// Events waiting to be dispatched.
    pub fn pending(&self) -> usize {
        let cs = self.critical();
        let queue = self.queue.borrow(cs.token()).borrow();
        queue.len()
    }

    /// Events of `kind` accepted by the queue since start.
    pub fn enqueued(&self, kind: EventKind) -> u32 {
        let cs = self.critical();
        let queue = self.queue.borrow(cs.token()).borrow();
        queue.enqueued(kind)
    }

    /// Deepest the queue has ever been.
    pub fn queue_high_water(&self) -> usize {
        let cs = self.critical();
        let queue = self.queue.borrow(cs.token()).borrow();
        queue.high_water()
    }

    // -----------------------------------------------------------------------
    // Alarms
    // -----------------------------------------------------------------------

    /// Create, reconfigure or cancel the alarm keyed by `(kind, aux)`.
    /// See [`AlarmPool::activate`] and [`crate::alarm::encode`].
    pub fn activate_alarm(&self, word: u32, kind: EventKind, aux: u32) -> Result<(), Fault> {
        let result = {
            let cs = self.critical();
            let mut alarms = self.alarms.borrow(cs.token()).borrow_mut();
            alarms.activate(word, kind, aux)
        };
        result.map_err(|fault| self.raise(fault))
    }

    /// Advance all alarms by one tick, queueing the events of those that
    /// expire. Pushes nest inside the alarm pool's critical section.
    pub fn tick_alarms(&self) -> Result<(), Fault> {
        let cs = self.critical();
        let mut alarms = self.alarms.borrow(cs.token()).borrow_mut();
        alarms.tick(|kind, aux| self.push_event(kind, aux))
    }

    pub fn alarm_active(&self, kind: EventKind, aux: u32) -> bool {
        let cs = self.critical();
        let alarms = self.alarms.borrow(cs.token()).borrow();
        alarms.is_active(kind, aux)
    }

    pub fn alarms_in_use(&self) -> usize {
        let cs = self.critical();
        let alarms = self.alarms.borrow(cs.token()).borrow();
        alarms.active_count()
    }

    pub fn alarm_peak_usage(&self) -> usize {
        let cs = self.critical();
        let alarms = self.alarms.borrow(cs.token()).borrow();
        alarms.peak_usage()
    }

    // -----------------------------------------------------------------------
    // Faults
    // -----------------------------------------------------------------------

    /// Signal `fault` on its monitor and hand it back for propagation.
    pub fn raise(&self, fault: Fault) -> Fault {
        error!("fault: {}", fault);
        self.board.mark(fault.monitor());
        fault
    }

    /// Terminal fault handler. Never returns; the board halts and the
    /// watchdog is expected to reset the device.
    pub fn fail_stop(&self, fault: Fault) -> ! {
        error!("fail-stop after {}", fault);
        self.board.halt()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
