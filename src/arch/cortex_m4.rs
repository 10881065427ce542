//! # Cortex-M4 Core Support
//!
//! Core-peripheral pieces every Cortex-M4 board needs: the global interrupt
//! gate, the SysTick time base, NVIC unmasking and the WFI idle.
//!
//! ## Time Base
//!
//! SysTick runs from the core clock and fires every tick period. The
//! handler counts whole milliseconds; [`elapsed_us`] adds the fraction
//! already counted down by the timer, so timestamps have microsecond
//! resolution without a second hardware timer.
//!
//! ## Interrupt Priorities
//!
//! SysTick is set to the lowest priority, so GPIO edges can preempt it.

use cortex_m::peripheral::{NVIC, SCB, SYST};

use crate::config::SYSTEM_CLOCK_HZ;

const SYST_CSR_ENABLE: u32 = 1 << 0;
const SYST_CSR_TICKINT: u32 = 1 << 1;
const SYST_CSR_CLKSOURCE: u32 = 1 << 2;

const CYCLES_PER_US: u32 = SYSTEM_CLOCK_HZ / 1_000_000;

// ---------------------------------------------------------------------------
// Interrupt gate
// ---------------------------------------------------------------------------

#[inline]
pub fn disable_interrupts() {
    cortex_m::interrupt::disable();
}

#[inline]
pub fn enable_interrupts() {
    // SAFETY: only called by the outermost critical-section guard, which
    // owns no state that outlives it.
    unsafe { cortex_m::interrupt::enable() }
}

// ---------------------------------------------------------------------------
// SysTick
// ---------------------------------------------------------------------------

/// Start SysTick with a `period_ms` period and its interrupt enabled.
pub fn start_systick(period_ms: u32) {
    let reload = (SYSTEM_CLOCK_HZ / 1_000) * period_ms - 1;

    // SAFETY: SysTick is owned by the runtime; nothing else programs it.
    unsafe {
        let syst = &*SYST::PTR;
        syst.csr.write(0);
        syst.rvr.write(reload);
        syst.cvr.write(0);
        syst.csr.write(SYST_CSR_ENABLE | SYST_CSR_TICKINT | SYST_CSR_CLKSOURCE);
    }
}

/// Microseconds counted down in the current SysTick period.
#[inline]
pub fn elapsed_us() -> u32 {
    // SAFETY: read-only access.
    let (reload, current) = unsafe {
        let syst = &*SYST::PTR;
        (syst.rvr.read(), syst.cvr.read())
    };
    (reload - current) / CYCLES_PER_US
}

/// SysTick to the lowest priority.
pub fn set_systick_priority() {
    // SHPR3 bits [31:24] = SysTick priority.
    // SAFETY: read-modify-write of a core register during start-up.
    unsafe {
        let scb = &*SCB::PTR;
        scb.shpr[11].write(0xFF);
    }
}

// ---------------------------------------------------------------------------
// NVIC
// ---------------------------------------------------------------------------

/// Unmask device interrupt `irqn` in the NVIC.
pub fn unmask_irq(irqn: u16) {
    let n = usize::from(irqn);
    // SAFETY: the handler for `irqn` is installed by the firmware's vector
    // table; ISER is write-one-to-set.
    unsafe {
        let nvic = &*NVIC::PTR;
        nvic.iser[n / 32].write(1 << (n % 32));
    }
}

// ---------------------------------------------------------------------------
// Idle
// ---------------------------------------------------------------------------

/// Sleep until an interrupt is pending. Works with PRIMASK set: the core
/// wakes, and the handler runs once interrupts are enabled again.
#[inline]
pub fn wait_for_interrupt() {
    cortex_m::asm::dsb();
    cortex_m::asm::wfi();
}
