//! # Button Debounce
//!
//! One state machine per button, fed by edge interrupts and debounce
//! alarms. Only confirmed presses and releases leave the driver.
//!
//! ```text
//!            candidate                 timeout, pressed
//!   ┌──────┐ ────────► ┌──────────────┐ ──────────────► ┌──────────┐
//!   │ Idle │           │ DebounceWait │  emit Pressed   │ Sampling │ ◄─┐ timeout,
//!   └──────┘ ◄──────── └──────────────┘                 └──────────┘ ──┘ still held
//!     ▲      timeout, released                               │
//!     │      emit Released, re-arm line                      │ timeout, released
//!     │                                                      │ emit Released
//!     │      timeout                  ┌─────────────┐        │
//!     └────────────────────────────── │ ExitSettle  │ ◄──────┘
//!            re-arm line              └─────────────┘
//! ```
//!
//! The edge interrupt masks its own line and queues a candidate
//! ([`ButtonEvents::on_edge`]). The line stays masked until the FSM is back
//! in `Idle`, so contact bounce cannot flood the queue.
//!
//! Every button uses one alarm keyed by `(timer, index)`. The index is also
//! carried in the alarm flags.

use core::cell::Cell;

use crate::alarm::{encode, ALARM_OFF};
use crate::config::{DEBOUNCE_PRESS_MS, DEBOUNCE_SAMPLE_MS, DEBOUNCE_SETTLE_MS, PRIORITY_HIGH};
use crate::dispatcher::{Dispatcher, Subscriber};
use crate::event::{Event, EventKind};
use crate::fault::Fault;
use crate::hal::{Board, LineId, PinId};
use crate::kernel::Kernel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonState {
    /// Released, edge interrupt armed.
    Idle,
    /// Edge seen, waiting for the contacts to settle.
    DebounceWait,
    /// Confirmed pressed, polling for release.
    Sampling,
    /// Released, waiting before the edge interrupt is re-armed.
    ExitSettle,
}

/// Debounce timing, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    /// Delay between the edge and the first sample.
    pub press_ms: u32,
    /// Release polling period while held.
    pub sample_ms: u32,
    /// Quiet time after a release.
    pub settle_ms: u32,
    /// Pin level that means "pressed". Buttons on the DK pull to ground.
    pub pressed_level: bool,
}

impl DebounceConfig {
    pub const DEFAULT: Self = Self {
        press_ms: DEBOUNCE_PRESS_MS,
        sample_ms: DEBOUNCE_SAMPLE_MS,
        settle_ms: DEBOUNCE_SETTLE_MS,
        pressed_level: false,
    };
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Event kinds the driver consumes and produces. `aux` is always the
/// button index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvents {
    pub candidate: EventKind,
    pub pressed: EventKind,
    pub released: EventKind,
    pub timer: EventKind,
}

impl ButtonEvents {
    pub const DEFAULT: Self = Self {
        candidate: EventKind::ButtonCandidate,
        pressed: EventKind::ButtonPressed,
        released: EventKind::ButtonReleased,
        timer: EventKind::ButtonTimer,
    };

    /// Edge interrupt handoff: mask the line and queue a candidate.
    /// Nothing else may happen in interrupt context.
    pub fn on_edge<B: Board>(&self, kernel: &Kernel<B>, line: LineId) -> Result<(), Fault> {
        kernel.board().disable_line(line);
        kernel.push_event(self.candidate, line as u32)
    }
}

impl Default for ButtonEvents {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Debouncer for `N` buttons. Button `i` reads `pins[i]` and owns
/// interrupt line `i`.
pub struct ButtonDriver<const N: usize> {
    pins: [PinId; N],
    config: DebounceConfig,
    events: ButtonEvents,
    states: [Cell<ButtonState>; N],
}

impl<const N: usize> ButtonDriver<N> {
    pub fn new(pins: [PinId; N], config: DebounceConfig, events: ButtonEvents) -> Self {
        Self {
            pins,
            config,
            events,
            states: core::array::from_fn(|_| Cell::new(ButtonState::Idle)),
        }
    }

    /// Subscribe to candidates and timeouts, then arm every edge line.
    pub fn install<'a, B: Board>(&'a self, dispatcher: &mut Dispatcher<'a, B>) -> Result<(), Fault> {
        dispatcher.subscribe(self.events.candidate, PRIORITY_HIGH, self)?;
        dispatcher.subscribe(self.events.timer, PRIORITY_HIGH, self)?;

        let board = dispatcher.kernel().board();
        for line in 0..N {
            board.enable_line(line as LineId);
        }
        Ok(())
    }

    pub fn state(&self, index: usize) -> Option<ButtonState> {
        self.states.get(index).map(Cell::get)
    }

    #[inline]
    pub fn config(&self) -> &DebounceConfig {
        &self.config
    }

    fn is_pressed<B: Board>(&self, board: &B, index: usize) -> bool {
        board.read(self.pins[index]) == self.config.pressed_level
    }

    fn set_timer<B: Board>(
        &self,
        kernel: &Kernel<B>,
        index: usize,
        periodic: bool,
        delay_ms: u32,
    ) -> Result<(), Fault> {
        let word = encode(periodic, delay_ms, index as u8);
        kernel.activate_alarm(word, self.events.timer, index as u32)
    }

    fn rearm_line<B: Board>(&self, board: &B, index: usize) {
        let line = index as LineId;
        board.clear_pending(line);
        board.enable_line(line);
    }

    fn on_candidate<B: Board>(
        &self,
        kernel: &Kernel<B>,
        index: usize,
        state: ButtonState,
    ) -> Result<ButtonState, Fault> {
        if state != ButtonState::Idle {
            trace!("button {}: candidate ignored in {}", index, state);
            return Ok(state);
        }
        self.set_timer(kernel, index, false, self.config.press_ms)?;
        Ok(ButtonState::DebounceWait)
    }

    fn on_timeout<B: Board>(
        &self,
        kernel: &Kernel<B>,
        index: usize,
        state: ButtonState,
    ) -> Result<ButtonState, Fault> {
        let board = kernel.board();
        let aux = index as u32;

        match state {
            ButtonState::Idle => {
                self.rearm_line(board, index);
                Ok(ButtonState::Idle)
            }
            ButtonState::DebounceWait if self.is_pressed(board, index) => {
                kernel.push_event(self.events.pressed, aux)?;
                self.set_timer(kernel, index, true, self.config.sample_ms)?;
                Ok(ButtonState::Sampling)
            }
            ButtonState::DebounceWait => {
                debug!("button {}: spurious edge", index);
                kernel.push_event(self.events.released, aux)?;
                self.rearm_line(board, index);
                Ok(ButtonState::Idle)
            }
            ButtonState::Sampling if self.is_pressed(board, index) => Ok(ButtonState::Sampling),
            ButtonState::Sampling => {
                kernel.push_event(self.events.released, aux)?;
                kernel.activate_alarm(ALARM_OFF, self.events.timer, aux)?;
                self.set_timer(kernel, index, false, self.config.settle_ms)?;
                Ok(ButtonState::ExitSettle)
            }
            ButtonState::ExitSettle => {
                self.rearm_line(board, index);
                Ok(ButtonState::Idle)
            }
        }
    }
}

impl<B: Board, const N: usize> Subscriber<B> for ButtonDriver<N> {
    fn on_event(&self, kernel: &Kernel<B>, event: Event) -> Result<(), Fault> {
        let index = event.aux as usize;
        let Some(cell) = self.states.get(index) else {
            return Ok(());
        };

        let state = cell.get();
        let next = if event.kind == self.events.candidate {
            self.on_candidate(kernel, index, state)?
        } else if event.kind == self.events.timer {
            self.on_timeout(kernel, index, state)?
        } else {
            return Ok(());
        };

        if next != state {
            trace!("button {}: {} -> {}", index, state, next);
        }
        cell.set(next);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
