//! # evsched demo firmware (nRF52840 DK)
//!
//! Wires the runtime to the DK's four buttons and echoes every debounced
//! press and release on the matching LED.
//!
//! | Source            | Context   | Event                          |
//! |-------------------|-----------|--------------------------------|
//! | SysTick, 1 ms     | interrupt | `Tick`                         |
//! | GPIOTE PORT       | interrupt | `ButtonCandidate(line)`        |
//! | Button FSM        | main loop | `ButtonPressed/Released(idx)`  |
//! | Alarm service     | main loop | `ButtonTimer`, `Inactivity`    |
//!
//! After ten seconds without a press the chip enters System OFF; the next
//! press wakes it through reset.

#![no_std]
#![no_main]

use cortex_m_rt::{entry, exception};
#[cfg(feature = "defmt")]
use defmt_rtt as _;
use panic_halt as _;

use evsched::arch::nrf52840::{Nrf52840, BUTTON_PINS, GPIOTE_IRQ};
use evsched::button::{ButtonDriver, ButtonEvents, DebounceConfig};
use evsched::config::{BUTTON_COUNT, PRIORITY_LOW};
use evsched::dispatcher::{Dispatcher, Subscriber};
use evsched::event::{Event, EventKind};
use evsched::fault::Fault;
use evsched::kernel::Kernel;

static KERNEL: Kernel<Nrf52840> = Kernel::new(Nrf52840::new());

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Lights LED `n` while button `n` is held.
struct LedEcho;

impl Subscriber<Nrf52840> for LedEcho {
    fn on_event(&self, kernel: &Kernel<Nrf52840>, event: Event) -> Result<(), Fault> {
        let on = event.kind == EventKind::ButtonPressed;
        kernel.board().set_led(event.aux as usize, on);
        Ok(())
    }
}

static LED_ECHO: LedEcho = LedEcho;

fn setup<'a>(
    dispatcher: &mut Dispatcher<'a, Nrf52840>,
    buttons: &'a ButtonDriver<BUTTON_COUNT>,
) -> Result<(), Fault> {
    dispatcher.init()?;
    buttons.install(dispatcher)?;
    dispatcher.subscribe(EventKind::ButtonPressed, PRIORITY_LOW, &LED_ECHO)?;
    dispatcher.subscribe(EventKind::ButtonReleased, PRIORITY_LOW, &LED_ECHO)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

#[entry]
fn main() -> ! {
    KERNEL.board().init();

    let buttons = ButtonDriver::new(BUTTON_PINS, DebounceConfig::DEFAULT, ButtonEvents::DEFAULT);
    let mut dispatcher = Dispatcher::new(&KERNEL);
    if let Err(fault) = setup(&mut dispatcher, &buttons) {
        KERNEL.fail_stop(fault);
    }

    #[cfg(feature = "defmt")]
    defmt::info!("evsched running, {} buttons", BUTTON_COUNT);

    dispatcher.run_forever()
}

// ---------------------------------------------------------------------------
// Interrupt handlers
// ---------------------------------------------------------------------------

#[exception]
fn SysTick() {
    KERNEL.board().on_tick();
    if let Err(fault) = KERNEL.push_event(EventKind::Tick, 0) {
        KERNEL.fail_stop(fault);
    }
}

/// Device interrupts land here; only GPIOTE is unmasked.
#[exception]
unsafe fn DefaultHandler(irqn: i16) {
    if irqn != GPIOTE_IRQ as i16 {
        return;
    }
    KERNEL.board().take_edges(|line| {
        if let Err(fault) = ButtonEvents::DEFAULT.on_edge(&KERNEL, line) {
            KERNEL.fail_stop(fault);
        }
    });
}
