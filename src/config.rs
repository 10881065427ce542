//! # evsched Configuration
//!
//! Compile-time constants governing the runtime. All capacities are fixed
//! at compile time: there is no dynamic allocation anywhere in the crate.

use crate::hal::MonitorId;

// ---------------------------------------------------------------------------
// Capacities
// ---------------------------------------------------------------------------

/// Number of pending events the queue can hold. Pushing one more is a
/// fail-stop fault, never a silent drop.
pub const QUEUE_CAPACITY: usize = 32;

/// Maximum number of subscribers for a single event kind.
pub const MAX_SUBSCRIBERS: usize = 4;

/// Number of software alarms that can be active at the same time.
pub const ALARM_POOL_SIZE: usize = 8;

/// Number of physical buttons on the reference board (nRF52840 DK).
pub const BUTTON_COUNT: usize = 4;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Period of the hardware tick that drives the alarm service, in ms.
/// Alarm delays are counted in these ticks.
pub const TICK_PERIOD_MS: u32 = 1;

/// Time without a confirmed button press before the runtime puts the
/// device into deep sleep.
pub const INACTIVITY_TIMEOUT_MS: u32 = 10_000;

/// Debounce wait after a press candidate before the pin is sampled (Trp).
pub const DEBOUNCE_PRESS_MS: u32 = 80;

/// Period of release polling while a button is held (Tep).
pub const DEBOUNCE_SAMPLE_MS: u32 = 50;

/// Settle time after a release before the edge interrupt is re-armed (Trd).
pub const DEBOUNCE_SETTLE_MS: u32 = 50;

/// Watchdog timeout in seconds. The dispatcher feeds it once per loop
/// iteration, so a subscriber that never returns resets the chip.
pub const WATCHDOG_TIMEOUT_S: u32 = 1;

/// Core clock of the nRF52840 (HFCLK).
pub const SYSTEM_CLOCK_HZ: u32 = 64_000_000;

// ---------------------------------------------------------------------------
// Subscriber priorities (0 = runs first)
// ---------------------------------------------------------------------------

pub const PRIORITY_HIGH: u8 = 0;
pub const PRIORITY_LOW: u8 = 1;

// ---------------------------------------------------------------------------
// Fault and activity monitors
// ---------------------------------------------------------------------------

/// Marked when the event queue overflows.
pub const MONITOR_QUEUE_OVERFLOW: MonitorId = MonitorId(1);

/// Set while the CPU is awake, cleared while it waits for an interrupt.
pub const MONITOR_BUSY: MonitorId = MonitorId(2);

/// Marked when a subscription table is full.
pub const MONITOR_SUBSCRIPTION_OVERFLOW: MonitorId = MonitorId(3);

/// Marked when the alarm pool is exhausted.
pub const MONITOR_ALARM_OVERFLOW: MonitorId = MonitorId(4);
