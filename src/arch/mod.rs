//! # Architecture and Board Support
//!
//! `cortex_m4` holds what any Cortex-M4 core offers; `nrf52840` builds the
//! reference [`Board`](crate::hal::Board) on top of it. Further boards are
//! added as sibling modules.

pub mod cortex_m4;
pub mod nrf52840;
