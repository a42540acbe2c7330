// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::time::Duration;

use crate::regs::LayerLayout;

/// Errors associated with a `CdcConfig`.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The page flip timeout is zero.
    ZeroFlipTimeout,
    /// The interrupt event queue has no room.
    ZeroQueueDepth,
    /// A pixel clock cap of zero would reject every mode.
    ZeroClockCap,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::ConfigError::*;
        match *self {
            ZeroFlipTimeout => write!(f, "The page flip timeout must not be zero."),
            ZeroQueueDepth => write!(f, "The interrupt queue depth must not be zero."),
            ZeroClockCap => write!(f, "The maximum pixel clock must not be zero."),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Board level settings of one controller instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CdcConfig {
    /// Highest pixel clock accepted by mode validation, in kHz.
    pub max_clock_khz: Option<u32>,
    pub neg_blank: bool,
    pub neg_pixclk: bool,
    /// Forces a per-layer register layout instead of guessing it from the
    /// hardware revision.
    pub layer_layout: Option<LayerLayout>,
    pub flip_timeout: Duration,
    pub start_background_color: u32,
    pub irq_queue_depth: usize,
}

impl Default for CdcConfig {
    fn default() -> Self {
        CdcConfig {
            max_clock_khz: None,
            neg_blank: false,
            neg_pixclk: false,
            layer_layout: None,
            flip_timeout: Duration::from_millis(50),
            start_background_color: 0xff00_00ff,
            irq_queue_depth: 64,
        }
    }
}

impl CdcConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flip_timeout.is_zero() {
            return Err(ConfigError::ZeroFlipTimeout);
        }
        if self.irq_queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        if self.max_clock_khz == Some(0) {
            return Err(ConfigError::ZeroClockCap);
        }
        Ok(())
    }
}
