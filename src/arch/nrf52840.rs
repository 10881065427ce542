//! # nRF52840 DK Board Support
//!
//! Register-level [`Board`] implementation for the nRF52840 Development
//! Kit. Only the peripherals the runtime touches are programmed.
//!
//! | Function        | Peripheral                                      |
//! |-----------------|-------------------------------------------------|
//! | Tick, clock     | SysTick, 1 ms                                   |
//! | Buttons 1..4    | P0.11, P0.12, P0.24, P0.25 (active low, pull-up)|
//! | Edge lines      | GPIO SENSE + GPIOTE PORT event, LATCH register  |
//! | LEDs 1..4       | P0.13 .. P0.16 (active low)                     |
//! | Monitors 1..4   | P0.03, P0.04, P0.28, P0.29                      |
//! | Watchdog        | WDT, runs during sleep                          |
//! | Deep sleep      | System OFF, woken by a button                   |
//!
//! An edge line is a button pin with `SENSE = Low`. Any sensing pin raises
//! the shared PORT event; the LATCH register tells which one.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::arch::cortex_m4;
use crate::config::{BUTTON_COUNT, WATCHDOG_TIMEOUT_S};
use crate::hal::{
    Board, Clock, ExtInterrupt, Gpio, InterruptGate, LineId, Monitor, MonitorId, PinId, Power,
    TickSource, Watchdog,
};

/// Button pins, indexed by line.
pub const BUTTON_PINS: [PinId; BUTTON_COUNT] = [11, 12, 24, 25];

/// LED pins, active low.
pub const LED_PINS: [PinId; 4] = [13, 14, 15, 16];

/// Monitor pins; monitor `n` drives `MONITOR_PINS[n - 1]`.
const MONITOR_PINS: [PinId; 4] = [3, 4, 28, 29];

/// GPIOTE interrupt number.
pub const GPIOTE_IRQ: u16 = 6;

// ---------------------------------------------------------------------------
// Registers
// ---------------------------------------------------------------------------

const P0: usize = 0x5000_0000;
const P0_OUTSET: usize = P0 + 0x508;
const P0_OUTCLR: usize = P0 + 0x50C;
const P0_IN: usize = P0 + 0x510;
const P0_LATCH: usize = P0 + 0x520;
const P0_DETECTMODE: usize = P0 + 0x524;
const P0_PIN_CNF: usize = P0 + 0x700;

const PIN_CNF_DIR_OUTPUT: u32 = 1 << 0;
const PIN_CNF_INPUT_DISCONNECT: u32 = 1 << 1;
const PIN_CNF_PULLUP: u32 = 3 << 2;
const PIN_CNF_SENSE_MASK: u32 = 3 << 16;
const PIN_CNF_SENSE_LOW: u32 = 3 << 16;

const GPIOTE: usize = 0x4000_6000;
const GPIOTE_EVENTS_PORT: usize = GPIOTE + 0x17C;
const GPIOTE_INTENSET: usize = GPIOTE + 0x304;
const GPIOTE_INT_PORT: u32 = 1 << 31;

const WDT: usize = 0x4001_0000;
const WDT_TASKS_START: usize = WDT;
const WDT_CRV: usize = WDT + 0x504;
const WDT_RREN: usize = WDT + 0x508;
const WDT_CONFIG: usize = WDT + 0x50C;
const WDT_RR0: usize = WDT + 0x600;
const WDT_RELOAD: u32 = 0x6E52_4635;
const WDT_CONFIG_SLEEP_RUN: u32 = 1 << 0;
const LFCLK_HZ: u32 = 32_768;

const POWER_SYSTEMOFF: usize = 0x4000_0500;

#[inline]
fn read(addr: usize) -> u32 {
    // SAFETY: `addr` is one of the register constants above.
    unsafe { core::ptr::read_volatile(addr as *const u32) }
}

#[inline]
fn write(addr: usize, value: u32) {
    // SAFETY: `addr` is one of the register constants above.
    unsafe { core::ptr::write_volatile(addr as *mut u32, value) }
}

#[inline]
fn pin_cnf(pin: PinId) -> usize {
    P0_PIN_CNF + 4 * usize::from(pin)
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

pub struct Nrf52840 {
    /// Milliseconds since the tick was started.
    ticks_ms: AtomicU32,
}

impl Nrf52840 {
    pub const fn new() -> Self {
        Self {
            ticks_ms: AtomicU32::new(0),
        }
    }

    /// Configure pins, the PORT interrupt and the watchdog. Edge lines stay
    /// disabled until the button driver enables them.
    pub fn init(&self) {
        for pin in BUTTON_PINS {
            write(pin_cnf(pin), PIN_CNF_PULLUP);
        }
        for pin in LED_PINS {
            write(P0_OUTSET, 1 << pin);
            write(pin_cnf(pin), PIN_CNF_DIR_OUTPUT | PIN_CNF_INPUT_DISCONNECT);
        }
        for pin in MONITOR_PINS {
            write(P0_OUTCLR, 1 << pin);
            write(pin_cnf(pin), PIN_CNF_DIR_OUTPUT | PIN_CNF_INPUT_DISCONNECT);
        }

        // Latched detect: each sensing pin sets its own LATCH bit.
        write(P0_DETECTMODE, 1);
        write(P0_LATCH, u32::MAX);
        write(GPIOTE_EVENTS_PORT, 0);
        write(GPIOTE_INTENSET, GPIOTE_INT_PORT);
        cortex_m4::unmask_irq(GPIOTE_IRQ);

        write(WDT_CONFIG, WDT_CONFIG_SLEEP_RUN);
        write(WDT_CRV, WATCHDOG_TIMEOUT_S * LFCLK_HZ - 1);
        write(WDT_RREN, 1);
        write(WDT_TASKS_START, 1);

        cortex_m4::set_systick_priority();
    }

    /// SysTick handler hook.
    #[inline]
    pub fn on_tick(&self) {
        self.ticks_ms.fetch_add(1, Ordering::Relaxed);
    }

    /// GPIOTE handler hook: acknowledge the PORT event and call `edge` for
    /// each enabled button line that latched.
    pub fn take_edges(&self, mut edge: impl FnMut(LineId)) {
        write(GPIOTE_EVENTS_PORT, 0);
        let latched = read(P0_LATCH);

        for (line, &pin) in BUTTON_PINS.iter().enumerate() {
            let bit = 1 << pin;
            if latched & bit != 0 && self.sensing(pin) {
                write(P0_LATCH, bit);
                edge(line as LineId);
            }
        }
    }

    /// Drive LED `index` (0-based). Out-of-range indices are ignored.
    pub fn set_led(&self, index: usize, on: bool) {
        if let Some(&pin) = LED_PINS.get(index) {
            let reg = if on { P0_OUTCLR } else { P0_OUTSET };
            write(reg, 1 << pin);
        }
    }

    fn sensing(&self, pin: PinId) -> bool {
        read(pin_cnf(pin)) & PIN_CNF_SENSE_MASK != 0
    }

    fn set_sense(&self, line: LineId, enabled: bool) {
        if let Some(&pin) = BUTTON_PINS.get(usize::from(line)) {
            let cnf = read(pin_cnf(pin)) & !PIN_CNF_SENSE_MASK;
            let sense = if enabled { PIN_CNF_SENSE_LOW } else { 0 };
            write(pin_cnf(pin), cnf | sense);
        }
    }
}

impl Default for Nrf52840 {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptGate for Nrf52840 {
    fn disable_interrupts(&self) {
        cortex_m4::disable_interrupts();
    }

    fn enable_interrupts(&self) {
        cortex_m4::enable_interrupts();
    }
}

impl Clock for Nrf52840 {
    fn now_us(&self) -> u64 {
        // Retry if the millisecond count moved while SysTick was read.
        loop {
            let ms = self.ticks_ms.load(Ordering::Relaxed);
            let sub_us = cortex_m4::elapsed_us();
            if self.ticks_ms.load(Ordering::Relaxed) == ms {
                return u64::from(ms) * 1_000 + u64::from(sub_us);
            }
        }
    }
}

impl Gpio for Nrf52840 {
    fn read(&self, pin: PinId) -> bool {
        read(P0_IN) & (1 << pin) != 0
    }
}

impl ExtInterrupt for Nrf52840 {
    fn enable_line(&self, line: LineId) {
        self.set_sense(line, true);
    }

    fn disable_line(&self, line: LineId) {
        self.set_sense(line, false);
    }

    fn clear_pending(&self, line: LineId) {
        if let Some(&pin) = BUTTON_PINS.get(usize::from(line)) {
            write(P0_LATCH, 1 << pin);
        }
    }
}

impl TickSource for Nrf52840 {
    fn start_periodic_ms(&self, period_ms: u32) {
        cortex_m4::start_systick(period_ms);
    }
}

impl Watchdog for Nrf52840 {
    fn feed(&self) {
        write(WDT_RR0, WDT_RELOAD);
    }
}

impl Power for Nrf52840 {
    fn wait_for_interrupt(&self) {
        cortex_m4::wait_for_interrupt();
    }

    /// System OFF. Every button senses low so any press wakes the chip,
    /// which then boots from reset.
    fn sleep_indefinite(&self) {
        for line in 0..BUTTON_COUNT {
            self.set_sense(line as LineId, true);
        }
        for index in 0..LED_PINS.len() {
            self.set_led(index, false);
        }
        write(POWER_SYSTEMOFF, 1);
        // Under a debugger System OFF is emulated and execution continues.
        loop {
            cortex_m::asm::wfe();
        }
    }
}

impl Monitor for Nrf52840 {
    fn mark(&self, id: MonitorId) {
        if let Some(&pin) = monitor_pin(id) {
            write(P0_OUTSET, 1 << pin);
        }
    }

    fn unmark(&self, id: MonitorId) {
        if let Some(&pin) = monitor_pin(id) {
            write(P0_OUTCLR, 1 << pin);
        }
    }
}

fn monitor_pin(id: MonitorId) -> Option<&'static PinId> {
    usize::from(id.0).checked_sub(1).and_then(|i| MONITOR_PINS.get(i))
}

impl Board for Nrf52840 {}
