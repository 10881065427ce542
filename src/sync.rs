//! # Synchronization Primitives
//!
//! Reentrant critical section for the single-core runtime. The event queue
//! and the alarm pool are touched from both the main loop and interrupt
//! handlers; every read-modify-write on them happens while a
//! [`CriticalSection`] guard is alive.
//!
//! The guard counts nesting: the interrupt gate is closed by the outermost
//! `enter` and reopened only when the outermost guard drops, whatever path
//! the code takes out of the protected region.
//!
//! ```ignore
//! let cs = CriticalSection::enter(&board, &nesting);
//! let queue = shared.borrow(cs.token()).borrow_mut();
//! // ...
//! // interrupts come back when `cs` goes out of scope
//! ```

use core::marker::PhantomData;
use core::sync::atomic::{compiler_fence, AtomicU32, Ordering};

use cortex_m::interrupt;

use crate::hal::InterruptGate;

/// Scoped interrupt lock. Obtained with [`CriticalSection::enter`],
/// released on drop.
pub struct CriticalSection<'a, G: InterruptGate + ?Sized> {
    gate: &'a G,
    nesting: &'a AtomicU32,
    depth: u32,
    token: interrupt::CriticalSection,
    // Must be released on the context that took it.
    _not_send: PhantomData<*const ()>,
}

impl<'a, G: InterruptGate + ?Sized> CriticalSection<'a, G> {
    /// Enter the critical section.
    ///
    /// `nesting` is the system-wide depth counter. It is only written with
    /// interrupts disabled, so plain loads and stores are enough (no CAS,
    /// which Cortex-M0 lacks).
    pub fn enter(gate: &'a G, nesting: &'a AtomicU32) -> Self {
        let depth = nesting.load(Ordering::Relaxed);
        if depth == 0 {
            gate.disable_interrupts();
        }
        compiler_fence(Ordering::SeqCst);
        nesting.store(depth + 1, Ordering::Relaxed);

        Self {
            gate,
            nesting,
            depth,
            // SAFETY: interrupts are disabled for as long as this guard (and
            // therefore the token borrowed from it) lives.
            token: unsafe { interrupt::CriticalSection::new() },
            _not_send: PhantomData,
        }
    }

    /// Nesting depth at the moment this guard was taken (0 = outermost).
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Token for `cortex_m::interrupt::Mutex::borrow`.
    #[inline]
    pub fn token(&self) -> &interrupt::CriticalSection {
        &self.token
    }
}

impl<G: InterruptGate + ?Sized> Drop for CriticalSection<'_, G> {
    fn drop(&mut self) {
        let depth = self.nesting.load(Ordering::Relaxed).saturating_sub(1);
        self.nesting.store(depth, Ordering::Relaxed);
        compiler_fence(Ordering::SeqCst);
        if depth == 0 {
            self.gate.enable_interrupts();
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
