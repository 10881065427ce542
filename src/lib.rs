//! # evsched: cooperative event scheduler for single-core Cortex-M
//!
//! A run-to-completion runtime for small microcontroller applications.
//! Interrupt handlers and software timers publish events into a bounded
//! queue; a single main loop hands each event to its subscribers in
//! priority order and sleeps when there is nothing to do.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │              Application subscribers                   │
//! ├────────────────────────────────────────────────────────┤
//! │            Dispatcher (dispatcher.rs)                  │
//! │   subscribe() · unsubscribe() · run_forever()          │
//! ├──────────────┬──────────────────┬──────────────────────┤
//! │ Button FSM   │  Alarm service   │  Power policy        │
//! │ button.rs    │  alarm.rs        │  power.rs            │
//! ├──────────────┴──────────────────┴──────────────────────┤
//! │                 Kernel (kernel.rs)                     │
//! │   push_event() · activate_alarm() · fail_stop()        │
//! ├──────────────┬──────────────────┬──────────────────────┤
//! │ Event queue  │  Sync            │  Faults              │
//! │ queue.rs     │  sync.rs         │  fault.rs            │
//! ├──────────────┴──────────────────┴──────────────────────┤
//! │         Hardware collaborators (hal.rs)                │
//! │   gate · clock · GPIO · lines · tick · WDT · power     │
//! ├────────────────────────────────────────────────────────┤
//! │     Board support (arch/cortex_m4.rs, nrf52840.rs)     │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Event Flow
//!
//! ```text
//! edge ISR ──► queue ──► button FSM ──► alarm ──► tick ──► queue
//!                                                            │
//!   application ◄── dispatcher ◄── queue ◄── Pressed/Released┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: every table has a compile-time capacity (`config.rs`)
//! - **Fail-stop on exhaustion**: overflow marks a monitor and halts; the
//!   watchdog resets the device
//! - **Critical sections**: a reentrant guard around every access to the
//!   queue and the alarm pool, the only state shared with interrupts

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod config;
pub mod hal;
pub mod sync;
pub mod event;
pub mod fault;
pub mod queue;
pub mod alarm;
pub mod dispatcher;
pub mod power;
pub mod button;
pub mod kernel;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod arch;

#[cfg(test)]
mod testing;
