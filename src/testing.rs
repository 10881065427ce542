//! Host-side test double for [`Board`] and helpers shared by the unit tests.

use core::cell::{Cell, RefCell};
use std::vec::Vec;

use crate::dispatcher::Dispatcher;
use crate::event::EventKind;
use crate::hal::{
    Board, Clock, ExtInterrupt, Gpio, InterruptGate, LineId, MonitorId, Monitor, PinId, Power,
    TickSource, Watchdog,
};
use crate::kernel::Kernel;

const PINS: usize = 64;
const LINES: usize = 32;

/// Records every call the runtime makes. Pins read high (released) and
/// lines start disabled.
pub struct MockBoard {
    irq_enabled: Cell<bool>,
    disables: Cell<usize>,
    enables: Cell<usize>,
    now_us: Cell<u64>,
    levels: RefCell<[bool; PINS]>,
    lines: RefCell<[bool; LINES]>,
    clears: RefCell<[usize; LINES]>,
    tick_period: Cell<Option<u32>>,
    feeds: Cell<usize>,
    waits: Cell<usize>,
    deep_sleeps: Cell<usize>,
    marks: RefCell<Vec<MonitorId>>,
    unmarks: RefCell<Vec<MonitorId>>,
}

impl MockBoard {
    pub fn new() -> Self {
        Self {
            irq_enabled: Cell::new(true),
            disables: Cell::new(0),
            enables: Cell::new(0),
            now_us: Cell::new(0),
            levels: RefCell::new([true; PINS]),
            lines: RefCell::new([false; LINES]),
            clears: RefCell::new([0; LINES]),
            tick_period: Cell::new(None),
            feeds: Cell::new(0),
            waits: Cell::new(0),
            deep_sleeps: Cell::new(0),
            marks: RefCell::new(Vec::new()),
            unmarks: RefCell::new(Vec::new()),
        }
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.irq_enabled.get()
    }

    pub fn gate_disables(&self) -> usize {
        self.disables.get()
    }

    pub fn gate_enables(&self) -> usize {
        self.enables.get()
    }

    pub fn set_now_us(&self, us: u64) {
        self.now_us.set(us);
    }

    pub fn advance_us(&self, us: u64) {
        self.now_us.set(self.now_us.get() + us);
    }

    pub fn set_level(&self, pin: PinId, level: bool) {
        self.levels.borrow_mut()[pin as usize] = level;
    }

    pub fn line_enabled(&self, line: LineId) -> bool {
        self.lines.borrow()[line as usize]
    }

    pub fn clears(&self, line: LineId) -> usize {
        self.clears.borrow()[line as usize]
    }

    pub fn tick_period_ms(&self) -> Option<u32> {
        self.tick_period.get()
    }

    pub fn feeds(&self) -> usize {
        self.feeds.get()
    }

    pub fn waits(&self) -> usize {
        self.waits.get()
    }

    pub fn deep_sleeps(&self) -> usize {
        self.deep_sleeps.get()
    }

    pub fn marks(&self, id: MonitorId) -> usize {
        self.marks.borrow().iter().filter(|&&m| m == id).count()
    }

    pub fn unmarks(&self, id: MonitorId) -> usize {
        self.unmarks.borrow().iter().filter(|&&m| m == id).count()
    }
}

impl Default for MockBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptGate for MockBoard {
    fn disable_interrupts(&self) {
        self.irq_enabled.set(false);
        self.disables.set(self.disables.get() + 1);
    }

    fn enable_interrupts(&self) {
        self.irq_enabled.set(true);
        self.enables.set(self.enables.get() + 1);
    }
}

impl Clock for MockBoard {
    fn now_us(&self) -> u64 {
        self.now_us.get()
    }
}

impl Gpio for MockBoard {
    fn read(&self, pin: PinId) -> bool {
        self.levels.borrow()[pin as usize]
    }
}

impl ExtInterrupt for MockBoard {
    fn enable_line(&self, line: LineId) {
        self.lines.borrow_mut()[line as usize] = true;
    }

    fn disable_line(&self, line: LineId) {
        self.lines.borrow_mut()[line as usize] = false;
    }

    fn clear_pending(&self, line: LineId) {
        self.clears.borrow_mut()[line as usize] += 1;
    }
}

impl TickSource for MockBoard {
    fn start_periodic_ms(&self, period_ms: u32) {
        self.tick_period.set(Some(period_ms));
    }
}

impl Watchdog for MockBoard {
    fn feed(&self) {
        self.feeds.set(self.feeds.get() + 1);
    }
}

impl Power for MockBoard {
    fn wait_for_interrupt(&self) {
        self.waits.set(self.waits.get() + 1);
    }

    fn sleep_indefinite(&self) {
        self.deep_sleeps.set(self.deep_sleeps.get() + 1);
    }
}

impl Monitor for MockBoard {
    fn mark(&self, id: MonitorId) {
        self.marks.borrow_mut().push(id);
    }

    fn unmark(&self, id: MonitorId) {
        self.unmarks.borrow_mut().push(id);
    }
}

impl Board for MockBoard {
    /// Unwinds instead of spinning so tests can observe a fail-stop.
    fn halt(&self) -> ! {
        panic!("halt")
    }
}

/// Simulate `ms` hardware ticks: for each one, advance the clock, queue a
/// tick like the SysTick handler would, and drain the queue.
pub fn step_ms(kernel: &Kernel<MockBoard>, dispatcher: &Dispatcher<'_, MockBoard>, ms: u32) {
    for _ in 0..ms {
        kernel.board().advance_us(1_000);
        kernel.push_event(EventKind::Tick, 0).unwrap();
        dispatcher.run_until_idle().unwrap();
    }
}
