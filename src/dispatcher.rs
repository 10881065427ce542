//! # Dispatcher
//!
//! Cooperative scheduling loop and per-kind subscription table.
//!
//! ## Scheduling Algorithm
//!
//! Each iteration of [`Dispatcher::run_forever`]:
//! 1. **Feed the watchdog**: a subscriber that never returns starves it
//! 2. **Pop one event** from the kernel's queue
//! 3. **Dispatch** it to every subscriber of its kind, lowest priority
//!    number first, each running to completion before the next starts
//! 4. **Idle**: if the queue was empty, wait for an interrupt
//!
//! There is no preemption between subscribers: an event is fully handled
//! before the next one is popped.
//!
//! ## Subscription Order
//!
//! Entries for one kind are kept sorted by ascending priority. A new entry
//! goes after every existing entry with the same or a smaller priority
//! number, so equal priorities run in subscription order.
//!
//! The table is only modified during start-up (`&mut self`); while the
//! loop runs it is read-only and needs no locking.

use core::cell::Cell;

use crate::alarm::AlarmService;
use crate::config::{MAX_SUBSCRIBERS, MONITOR_BUSY, PRIORITY_HIGH, PRIORITY_LOW, TICK_PERIOD_MS};
use crate::event::{Event, EventKind, Instant};
use crate::fault::Fault;
use crate::hal::Board;
use crate::kernel::Kernel;
use crate::power::PowerPolicy;

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

/// Something that reacts to events.
///
/// Subscribers run in main-loop context and get the kernel so they can
/// queue events and arm alarms. Returning a fault aborts the current
/// dispatch and fail-stops the system.
pub trait Subscriber<B: Board> {
    fn on_event(&self, kernel: &Kernel<B>, event: Event) -> Result<(), Fault>;
}

impl<B, F> Subscriber<B> for F
where
    B: Board,
    F: Fn(&Kernel<B>, Event) -> Result<(), Fault>,
{
    #[inline]
    fn on_event(&self, kernel: &Kernel<B>, event: Event) -> Result<(), Fault> {
        self(kernel, event)
    }
}

/// Subscribers are identified by address and vtable. Zero-sized handlers
/// (fn items, unit structs) all share one dangling address, so the
/// address alone cannot tell them apart.
#[inline]
fn same_subscriber<B: Board>(a: &dyn Subscriber<B>, b: &dyn Subscriber<B>) -> bool {
    core::ptr::eq(a, b)
}

// ---------------------------------------------------------------------------
// Subscription table
// ---------------------------------------------------------------------------

struct Subscription<'a, B: Board> {
    handler: &'a dyn Subscriber<B>,
    priority: u8,
}

impl<B: Board> Clone for Subscription<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Board> Copy for Subscription<'_, B> {}

/// Up to `M` subscribers per event kind, sorted by priority.
pub struct SubscriptionTable<'a, B: Board, const M: usize> {
    slots: [[Option<Subscription<'a, B>>; M]; EventKind::COUNT],
    len: [usize; EventKind::COUNT],
}

impl<'a, B: Board, const M: usize> SubscriptionTable<'a, B, M> {
    pub const fn new() -> Self {
        Self {
            slots: [[None; M]; EventKind::COUNT],
            len: [0; EventKind::COUNT],
        }
    }

    /// Insert `handler` after every entry with priority `<= priority`.
    pub fn insert(
        &mut self,
        kind: EventKind,
        priority: u8,
        handler: &'a dyn Subscriber<B>,
    ) -> Result<(), Fault> {
        let k = kind.index();
        if self.len[k] == M {
            return Err(Fault::SubscriptionOverflow { kind });
        }

        let row = &mut self.slots[k];
        let mut i = self.len[k];
        while i > 0 && row[i - 1].map_or(false, |s| s.priority > priority) {
            row[i] = row[i - 1];
            i -= 1;
        }
        row[i] = Some(Subscription { handler, priority });
        self.len[k] += 1;
        Ok(())
    }

    /// Remove `handler` from `kind`, closing the gap. Returns whether it
    /// was subscribed.
    pub fn remove(&mut self, kind: EventKind, handler: &dyn Subscriber<B>) -> bool {
        let k = kind.index();
        let len = self.len[k];
        let row = &mut self.slots[k];

        let Some(pos) = row[..len]
            .iter()
            .position(|s| s.map_or(false, |s| same_subscriber(s.handler, handler)))
        else {
            return false;
        };

        row.copy_within(pos + 1..len, pos);
        row[len - 1] = None;
        self.len[k] -= 1;
        true
    }

    /// Subscribers of `kind`, in dispatch order.
    pub fn handlers(&self, kind: EventKind) -> impl Iterator<Item = &'a dyn Subscriber<B>> + '_ {
        let k = kind.index();
        self.slots[k][..self.len[k]].iter().flatten().map(|s| s.handler)
    }

    #[inline]
    pub fn len(&self, kind: EventKind) -> usize {
        self.len[kind.index()]
    }
}

impl<B: Board, const M: usize> Default for SubscriptionTable<'_, B, M> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Outcome of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Dispatched(Event),
    Idle,
}

pub struct Dispatcher<'a, B: Board> {
    kernel: &'a Kernel<B>,
    table: SubscriptionTable<'a, B, MAX_SUBSCRIBERS>,
    power: Option<&'a PowerPolicy>,
    dispatched: Cell<u32>,
    max_latency_us: Cell<u64>,
}

impl<'a, B: Board> Dispatcher<'a, B> {
    pub fn new(kernel: &'a Kernel<B>) -> Self {
        Self {
            kernel,
            table: SubscriptionTable::new(),
            power: None,
            dispatched: Cell::new(0),
            max_latency_us: Cell::new(0),
        }
    }

    #[inline]
    pub fn kernel(&self) -> &'a Kernel<B> {
        self.kernel
    }

    /// Install the runtime's own subscribers (alarm service and
    /// inactivity policy) and start the hardware tick.
    pub fn init(&mut self) -> Result<(), Fault> {
        self.install_alarm_service(&crate::alarm::ALARM_SERVICE)?;
        self.install_power_policy(&crate::power::POWER_POLICY)
    }

    pub fn install_alarm_service(&mut self, service: &'a AlarmService) -> Result<(), Fault> {
        self.subscribe(service.tick_kind(), PRIORITY_HIGH, service)?;
        self.kernel.board().start_periodic_ms(TICK_PERIOD_MS);
        Ok(())
    }

    pub fn install_power_policy(&mut self, policy: &'a PowerPolicy) -> Result<(), Fault> {
        self.subscribe(policy.alarm_kind(), PRIORITY_HIGH, policy)?;
        for &kind in policy.activity_kinds() {
            self.subscribe(kind, PRIORITY_LOW, policy)?;
        }
        self.power = Some(policy);
        Ok(())
    }

    /// Register `handler` for `kind`. A full table marks the subscription
    /// monitor and fails with [`Fault::SubscriptionOverflow`].
    pub fn subscribe(
        &mut self,
        kind: EventKind,
        priority: u8,
        handler: &'a dyn Subscriber<B>,
    ) -> Result<(), Fault> {
        self.table
            .insert(kind, priority, handler)
            .map_err(|fault| self.kernel.raise(fault))?;
        debug!("subscribed to {} at priority {}", kind, priority);
        Ok(())
    }

    /// Remove `handler` from `kind`. Unknown handlers are ignored.
    pub fn unsubscribe(&mut self, kind: EventKind, handler: &dyn Subscriber<B>) -> bool {
        let removed = self.table.remove(kind, handler);
        if removed {
            debug!("unsubscribed from {}", kind);
        }
        removed
    }

    #[inline]
    pub fn subscribers(&self, kind: EventKind) -> usize {
        self.table.len(kind)
    }

    /// Deliver `event` to its subscribers, in order, to completion.
    pub fn dispatch(&self, event: Event) -> Result<(), Fault> {
        let now = Instant::from_micros(self.kernel.board().now_us());
        let latency = now.micros_since(event.timestamp);
        if latency > self.max_latency_us.get() {
            self.max_latency_us.set(latency);
        }
        self.dispatched.set(self.dispatched.get().wrapping_add(1));

        trace!("dispatch {} aux={} latency={}us", event.kind, event.aux, latency);
        for handler in self.table.handlers(event.kind) {
            handler.on_event(self.kernel, event)?;
        }
        Ok(())
    }

    /// One scheduler iteration: feed the watchdog, then dispatch one event
    /// or wait for an interrupt.
    ///
    /// The emptiness check and the wait happen with interrupts masked; a
    /// pending interrupt still wakes the core, and its handler runs as soon
    /// as the section ends. An event pushed between the check and the wait
    /// therefore cannot be slept on.
    pub fn run_once(&self) -> Result<Step, Fault> {
        let board = self.kernel.board();
        board.feed();

        let cs = self.kernel.critical();
        match self.kernel.pop_event() {
            Some(event) => {
                drop(cs);
                self.dispatch(event)?;
                Ok(Step::Dispatched(event))
            }
            None => {
                board.unmark(MONITOR_BUSY);
                board.wait_for_interrupt();
                board.mark(MONITOR_BUSY);
                drop(cs);
                Ok(Step::Idle)
            }
        }
    }

    /// Dispatch until the queue is empty, without idling. Returns the
    /// number of events handled.
    pub fn run_until_idle(&self) -> Result<usize, Fault> {
        let mut handled = 0;
        while let Some(event) = self.kernel.pop_event() {
            self.dispatch(event)?;
            handled += 1;
        }
        Ok(handled)
    }

    /// The scheduler loop. Arms the inactivity alarm, then runs forever;
    /// any fault ends in [`Kernel::fail_stop`].
    pub fn run_forever(&self) -> ! {
        if let Some(policy) = self.power {
            if let Err(fault) = policy.arm(self.kernel) {
                self.kernel.fail_stop(fault);
            }
        }

        loop {
            if let Err(fault) = self.run_once() {
                self.kernel.fail_stop(fault);
            }
        }
    }

    /// Events dispatched since start.
    #[inline]
    pub fn dispatched(&self) -> u32 {
        self.dispatched.get()
    }

    /// Worst enqueue-to-dispatch delay seen, in microseconds.
    #[inline]
    pub fn max_latency_us(&self) -> u64 {
        self.max_latency_us.get()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MONITOR_SUBSCRIPTION_OVERFLOW;
    use crate::testing::MockBoard;
    use std::cell::RefCell;
    use std::vec::Vec;

    type Log = RefCell<Vec<char>>;

    std::thread_local! {
        static CALLS: RefCell<Vec<char>> = RefCell::new(Vec::new());
    }

    fn handler_a(_: &Kernel<MockBoard>, _: Event) -> Result<(), Fault> {
        CALLS.with(|c| c.borrow_mut().push('a'));
        Ok(())
    }

    fn handler_b(_: &Kernel<MockBoard>, _: Event) -> Result<(), Fault> {
        CALLS.with(|c| c.borrow_mut().push('b'));
        Ok(())
    }

    fn recorder<'l>(log: &'l Log, tag: char) -> impl Fn(&Kernel<MockBoard>, Event) -> Result<(), Fault> + 'l {
        move |_: &Kernel<MockBoard>, _: Event| {
            log.borrow_mut().push(tag);
            Ok(())
        }
    }

    #[test]
    fn test_priority_order_with_stable_ties() {
        let kernel = Kernel::new(MockBoard::new());
        let log = Log::default();
        let a = recorder(&log, 'A');
        let b = recorder(&log, 'B');
        let c = recorder(&log, 'C');

        let mut dispatcher = Dispatcher::new(&kernel);
        dispatcher.subscribe(EventKind::App0, 5, &a).unwrap();
        dispatcher.subscribe(EventKind::App0, 1, &b).unwrap();
        dispatcher.subscribe(EventKind::App0, 5, &c).unwrap();

        kernel.push_event(EventKind::App0, 0).unwrap();
        assert_eq!(dispatcher.run_until_idle().unwrap(), 1);
        assert_eq!(*log.borrow(), ['B', 'A', 'C']);
    }

    #[test]
    fn test_only_matching_kind_is_called() {
        let kernel = Kernel::new(MockBoard::new());
        let log = Log::default();
        let a = recorder(&log, 'A');
        let b = recorder(&log, 'B');

        let mut dispatcher = Dispatcher::new(&kernel);
        dispatcher.subscribe(EventKind::App0, 0, &a).unwrap();
        dispatcher.subscribe(EventKind::App1, 0, &b).unwrap();

        kernel.push_event(EventKind::App1, 0).unwrap();
        kernel.push_event(EventKind::App2, 0).unwrap();
        dispatcher.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), ['B']);
    }

    #[test]
    fn test_subscription_overflow() {
        let kernel = Kernel::new(MockBoard::new());
        let log = Log::default();
        let handlers: Vec<_> = (0..=MAX_SUBSCRIBERS).map(|_| recorder(&log, 'x')).collect();

        let mut dispatcher = Dispatcher::new(&kernel);
        for h in &handlers[..MAX_SUBSCRIBERS] {
            dispatcher.subscribe(EventKind::App3, 0, h).unwrap();
        }

        let err = dispatcher.subscribe(EventKind::App3, 0, &handlers[MAX_SUBSCRIBERS]);
        assert_eq!(err, Err(Fault::SubscriptionOverflow { kind: EventKind::App3 }));
        assert_eq!(kernel.board().marks(MONITOR_SUBSCRIPTION_OVERFLOW), 1);
        assert_eq!(dispatcher.subscribers(EventKind::App3), MAX_SUBSCRIBERS);

        // Other kinds are unaffected.
        dispatcher.subscribe(EventKind::App4, 0, &handlers[MAX_SUBSCRIBERS]).unwrap();
    }

    #[test]
    fn test_unsubscribe_compacts() {
        let kernel = Kernel::new(MockBoard::new());
        let log = Log::default();
        let a = recorder(&log, 'A');
        let b = recorder(&log, 'B');
        let c = recorder(&log, 'C');

        let mut dispatcher = Dispatcher::new(&kernel);
        dispatcher.subscribe(EventKind::App0, 0, &a).unwrap();
        dispatcher.subscribe(EventKind::App0, 1, &b).unwrap();
        dispatcher.subscribe(EventKind::App0, 2, &c).unwrap();

        assert!(dispatcher.unsubscribe(EventKind::App0, &b));
        assert!(!dispatcher.unsubscribe(EventKind::App0, &b), "second removal is a no-op");
        assert!(!dispatcher.unsubscribe(EventKind::App1, &a), "wrong kind is a no-op");
        assert_eq!(dispatcher.subscribers(EventKind::App0), 2);

        // The freed slot is usable again and ordering still holds.
        dispatcher.subscribe(EventKind::App0, 1, &b).unwrap();
        kernel.push_event(EventKind::App0, 0).unwrap();
        dispatcher.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), ['A', 'B', 'C']);
    }

    #[test]
    fn test_unsubscribe_tells_zero_sized_handlers_apart() {
        assert_eq!(core::mem::size_of_val(&handler_a), 0);
        assert_eq!(core::mem::size_of_val(&handler_b), 0);

        let kernel = Kernel::new(MockBoard::new());
        let mut dispatcher = Dispatcher::new(&kernel);
        dispatcher.subscribe(EventKind::App0, 0, &handler_a).unwrap();
        dispatcher.subscribe(EventKind::App0, 1, &handler_b).unwrap();

        assert!(dispatcher.unsubscribe(EventKind::App0, &handler_b));
        assert_eq!(dispatcher.subscribers(EventKind::App0), 1);

        kernel.push_event(EventKind::App0, 0).unwrap();
        dispatcher.run_until_idle().unwrap();
        CALLS.with(|c| assert_eq!(*c.borrow(), ['a']));
    }

    #[test]
    fn test_fault_in_subscriber_stops_dispatch() {
        let kernel = Kernel::new(MockBoard::new());
        let log = Log::default();
        let failing = |_: &Kernel<MockBoard>, _: Event| -> Result<(), Fault> {
            Err(Fault::QueueOverflow)
        };
        let after = recorder(&log, 'Z');

        let mut dispatcher = Dispatcher::new(&kernel);
        dispatcher.subscribe(EventKind::App5, 0, &failing).unwrap();
        dispatcher.subscribe(EventKind::App5, 1, &after).unwrap();

        kernel.push_event(EventKind::App5, 0).unwrap();
        assert_eq!(dispatcher.run_once(), Err(Fault::QueueOverflow));
        assert!(log.borrow().is_empty(), "later subscribers must not run");
    }

    #[test]
    fn test_run_forever_fail_stops_on_subscriber_fault() {
        let kernel = Kernel::new(MockBoard::new());
        let flood = |k: &Kernel<MockBoard>, _: Event| -> Result<(), Fault> {
            loop {
                k.push_event(EventKind::App1, 0)?;
            }
        };

        let mut dispatcher = Dispatcher::new(&kernel);
        dispatcher.init().unwrap();
        dispatcher.subscribe(EventKind::App0, 0, &flood).unwrap();
        kernel.push_event(EventKind::App0, 0).unwrap();

        let halted = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            dispatcher.run_forever();
        }));
        assert!(halted.is_err(), "run_forever must end in the board's halt");

        let board = kernel.board();
        assert_eq!(board.marks(crate::config::MONITOR_QUEUE_OVERFLOW), 1);
        assert_eq!(board.feeds(), 1);
        assert!(kernel.alarm_active(EventKind::Inactivity, 0), "policy armed before the loop");
    }

    #[test]
    fn test_subscriber_can_queue_followups() {
        let kernel = Kernel::new(MockBoard::new());
        let log = Log::default();
        let forward = |k: &Kernel<MockBoard>, e: Event| k.push_event(EventKind::App7, e.aux + 1);
        let sink = recorder(&log, 'S');

        let mut dispatcher = Dispatcher::new(&kernel);
        dispatcher.subscribe(EventKind::App6, 0, &forward).unwrap();
        dispatcher.subscribe(EventKind::App7, 0, &sink).unwrap();

        kernel.push_event(EventKind::App6, 1).unwrap();
        assert_eq!(dispatcher.run_until_idle().unwrap(), 2);
        assert_eq!(*log.borrow(), ['S']);
        assert_eq!(dispatcher.dispatched(), 2);
    }

    #[test]
    fn test_run_once_idles_on_empty_queue() {
        let kernel = Kernel::new(MockBoard::new());
        let dispatcher = Dispatcher::new(&kernel);

        assert_eq!(dispatcher.run_once().unwrap(), Step::Idle);
        assert_eq!(kernel.board().feeds(), 1);
        assert_eq!(kernel.board().waits(), 1);
        assert_eq!(kernel.board().unmarks(MONITOR_BUSY), 1);
        assert_eq!(kernel.board().marks(MONITOR_BUSY), 1);
        assert!(kernel.board().interrupts_enabled());
    }

    #[test]
    fn test_run_once_dispatches_without_waiting() {
        let kernel = Kernel::new(MockBoard::new());
        let dispatcher = Dispatcher::new(&kernel);

        kernel.push_event(EventKind::App0, 3).unwrap();
        match dispatcher.run_once().unwrap() {
            Step::Dispatched(event) => assert_eq!((event.kind, event.aux), (EventKind::App0, 3)),
            Step::Idle => panic!("event was pending"),
        }
        assert_eq!(kernel.board().feeds(), 1);
        assert_eq!(kernel.board().waits(), 0);
    }

    #[test]
    fn test_latency_is_measured_from_timestamp() {
        let kernel = Kernel::new(MockBoard::new());
        let dispatcher = Dispatcher::new(&kernel);

        kernel.board().set_now_us(1_000);
        kernel.push_event(EventKind::App0, 0).unwrap();
        kernel.board().set_now_us(1_250);
        dispatcher.run_until_idle().unwrap();
        assert_eq!(dispatcher.max_latency_us(), 250);
    }

    #[test]
    fn test_init_installs_services_and_starts_tick() {
        let kernel = Kernel::new(MockBoard::new());
        let mut dispatcher = Dispatcher::new(&kernel);
        dispatcher.init().unwrap();

        assert_eq!(dispatcher.subscribers(EventKind::Tick), 1);
        assert_eq!(dispatcher.subscribers(EventKind::Inactivity), 1);
        assert_eq!(dispatcher.subscribers(EventKind::ButtonPressed), 1);
        assert_eq!(dispatcher.subscribers(EventKind::ButtonCandidate), 1);
        assert_eq!(kernel.board().tick_period_ms(), Some(TICK_PERIOD_MS));
    }
}
