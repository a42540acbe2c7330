// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::io;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid layer {layer}, the controller has {count} layers")]
    InvalidLayer { layer: usize, count: usize },
    #[error("Unsupported pixel format code {0}")]
    UnsupportedFormat(u32),
    #[error("Unsupported fourcc {0:#010x}")]
    UnsupportedFourcc(u32),
    #[error("Planar YCbCr is not supported")]
    PlanarYCbCr,
    #[error("Window width {0} must be even while insertion mode is active")]
    OddWindowWidth(u16),
    #[error("Pitch {0} exceeds the maximum framebuffer pitch")]
    PitchTooLarge(u32),
    #[error("Controller reports no layers")]
    NoLayers,
    #[error("Controller reports {0} layers, more than its register window holds")]
    LayerCount(u32),
    #[error("Missing hardware capability: {0}")]
    MissingCapability(&'static str),
    #[error("A page flip is already pending")]
    FlipPending,
    #[error("Could not get a vblank reference")]
    VblankUnavailable,
    #[error("CRTC has no active display mode")]
    CrtcInactive,
    #[error("Pixel clock cannot produce {0} Hz")]
    ClockRate(u64),
    #[error("Pixel clock is not reconfigurable")]
    ClockNotReconfigurable,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] io::Error),
    #[error("Commit worker is gone")]
    CommitQueueClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
