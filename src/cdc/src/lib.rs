// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Register-level driver core for the CDC display controller.
//!
//! The crate owns the controller's register state machine: global timing,
//! per-layer window/buffer/scaler/blend programming, shadow register
//! reloads, interrupt decoding and page-flip completion. The host display
//! framework talks to it through the [`crtc::CrtcOps`] and
//! [`crtc::PlaneOps`] traits and supplies its own collaborators (register
//! bank, vblank bookkeeping, pixel clock, deswizzler).

#[macro_use]
extern crate log;

pub mod bus;
pub mod commit;
pub mod config;
pub mod crtc;
pub mod deswizzle;
pub mod device;
pub mod driver;
mod error;
pub mod flip;
pub mod irq;
pub mod layer;
pub mod mode;
pub mod pll;
pub mod regs;
pub mod shadow;
#[cfg(test)]
pub mod test_utils;
pub mod timing;
pub mod worker;

pub use self::device::Cdc;
pub use self::driver::{CdcDriver, Platform};
pub use self::error::{Error, Result};

#[cfg(test)]
pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
