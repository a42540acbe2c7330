// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

//! CRTC and plane callbacks of the host display framework.
//!
//! The controller drives a single CRTC. Every layer is a plane on it,
//! layer 0 being the primary one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::CdcConfig;
use crate::deswizzle::{Deswizzle, DeswizzleMode, SharedDeswizzler};
use crate::device::Cdc;
use crate::flip::{ClientId, FlipNotification, PageFlipCoordinator, VblankControl};
use crate::irq::{IrqDispatcher, IrqMask};
use crate::layer::{BlendMode, PixelFormat, PlaneUpdate, Window, MAX_PITCH};
use crate::mode::DisplayMode;
use crate::pll::ClockSource;
use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeStatus {
    Ok,
    /// The pixel clock is above the board limit.
    ClockHigh,
    /// The pixel clock cannot produce the exact rate of the mode.
    NoClock,
}

/// CRTC helper callbacks.
pub trait CrtcOps {
    fn mode_valid(&self, mode: &DisplayMode) -> ModeStatus;
    fn atomic_enable(&self, mode: &DisplayMode);
    fn disable(&self);
    fn atomic_begin(&self, event: Option<Box<dyn FlipNotification>>) -> Result<()>;
    fn atomic_flush(&self);
    fn set_vblank(&self, enable: bool);
    fn cancel_page_flip(&self, owner: ClientId) -> bool;
}

/// Plane helper callbacks. `None` stands for a plane not bound to the CRTC.
pub trait PlaneOps {
    fn atomic_update(
        &self,
        layer: usize,
        old: Option<&PlaneState>,
        new: Option<&PlaneState>,
    ) -> Result<()>;
    fn atomic_disable(&self, layer: usize) -> Result<()>;
}

/// A scanout buffer in device memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Framebuffer {
    pub paddr: u32,
    pub offset: u32,
    pub pitch: u32,
    pub fourcc: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneState {
    pub fb: Framebuffer,
    pub crtc_x: i32,
    pub crtc_y: i32,
    pub crtc_w: u32,
    pub crtc_h: u32,
    /// Source origin inside the framebuffer, in whole pixels.
    pub src_x: u32,
    pub src_y: u32,
    pub alpha: Option<u8>,
}

impl PlaneState {
    fn rect(&self) -> (i32, i32, u32, u32) {
        (self.crtc_x, self.crtc_y, self.crtc_w, self.crtc_h)
    }
}

struct CrtcState {
    cdc: Cdc,
    clock: Box<dyn ClockSource>,
    mode: Option<DisplayMode>,
    wait_for_vblank: bool,
}

pub struct Crtc {
    state: Mutex<CrtcState>,
    irq: Arc<IrqDispatcher>,
    flip: Arc<PageFlipCoordinator>,
    vblank: Arc<dyn VblankControl>,
    deswizzler: Option<SharedDeswizzler>,
    config: CdcConfig,
}

impl Crtc {
    pub fn new(
        cdc: Cdc,
        clock: Box<dyn ClockSource>,
        irq: Arc<IrqDispatcher>,
        flip: Arc<PageFlipCoordinator>,
        vblank: Arc<dyn VblankControl>,
        deswizzler: Option<SharedDeswizzler>,
        config: CdcConfig,
    ) -> Self {
        Crtc {
            state: Mutex::new(CrtcState {
                cdc,
                clock,
                mode: None,
                wait_for_vblank: false,
            }),
            irq,
            flip,
            vblank,
            deswizzler,
            config,
        }
    }

    fn lock(&self) -> MutexGuard<CrtcState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_deswizzler<F>(&self, f: F)
    where
        F: FnOnce(&mut dyn Deswizzle),
    {
        if let Some(dswz) = &self.deswizzler {
            let mut dswz = dswz.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut *dswz);
        }
    }

    /// Runs `f` on the device with the CRTC locked.
    pub fn with_cdc<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Cdc) -> R,
    {
        f(&mut self.lock().cdc)
    }

    /// Mode of the running output, `None` while disabled.
    pub fn mode(&self) -> Option<DisplayMode> {
        self.lock().mode
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().cdc.is_enabled()
    }

    pub fn wait_for_vblank(&self) -> bool {
        self.lock().wait_for_vblank
    }

    /// Points the primary layer straight at a buffer, bypassing the plane
    /// state, and feeds the same buffer to the deswizzler.
    pub fn set_scanout_buffer(&self, width: u16, height: u16, pitch: u32, address: u32) -> Result<()> {
        debug!(
            "cdc: scanout buffer {}x{} pitch {} at {:#x}",
            width, height, pitch, address
        );
        if pitch >= MAX_PITCH {
            return Err(Error::PitchTooLarge(pitch));
        }
        let mut state = self.lock();
        state.cdc.set_fb_size(0, width, height, pitch as i16)?;
        state.cdc.set_fb_address(0, address)?;
        let bpp = state.cdc.layer(0)?.format().bytes_per_pixel() as u8;
        self.with_deswizzler(|dswz| {
            dswz.set_fb_config(width, height, pitch, bpp);
            dswz.set_fb_addr(address);
            dswz.set_mode(DeswizzleMode::Deswizzle);
            dswz.retrigger();
        });
        state.cdc.trigger_reload(true);
        Ok(())
    }

    /// Waits for the previous page flip to land, bounded by the flip
    /// timeout.
    pub fn wait_for_flip(&self) -> bool {
        self.flip.wait_for_idle(self.config.flip_timeout)
    }

    /// Masks all interrupts and turns the output off.
    pub(crate) fn shutdown(&self) {
        let mut state = self.lock();
        debug!("cdc: shutdown");
        self.irq.set_enabled(IrqMask::all(), false);
        state.cdc.set_enabled(false);
    }
}

impl CrtcOps for Crtc {
    fn mode_valid(&self, mode: &DisplayMode) -> ModeStatus {
        if let Some(max) = self.config.max_clock_khz {
            if mode.clock_khz > max {
                return ModeStatus::ClockHigh;
            }
        }
        let hz = mode.clock_hz();
        if self.lock().clock.round_rate(hz) != Some(hz) {
            return ModeStatus::NoClock;
        }
        ModeStatus::Ok
    }

    fn atomic_enable(&self, mode: &DisplayMode) {
        let mut state = self.lock();
        if state.cdc.is_enabled() {
            return;
        }
        debug!("cdc: crtc enable {:?}", mode);

        state.cdc.set_enabled(false);
        state
            .cdc
            .set_background_color(self.config.start_background_color);

        let timing = mode.to_timing(self.config.neg_blank, self.config.neg_pixclk);
        state.cdc.set_timing(&timing);

        let hz = mode.clock_hz();
        if state.clock.rate() != hz {
            if let Err(e) = state.clock.set_rate(hz) {
                warn!("cdc: pixel clock not set: {}", e);
            }
        }
        state.mode = Some(*mode);

        self.vblank.on();
        state.cdc.set_enabled(true);

        // Error sources may have muted themselves while the output ran.
        self.irq.set_enabled(IrqMask::CRTC, true);
    }

    fn disable(&self) {
        let mut state = self.lock();
        if !state.cdc.is_enabled() {
            return;
        }
        debug!("cdc: crtc disable");

        self.flip.wait_for_idle(self.config.flip_timeout);
        self.vblank.off();
        state.cdc.set_enabled(false);
        self.with_deswizzler(|dswz| dswz.stop());
        state.mode = None;

        self.irq.set_enabled(IrqMask::CRTC, false);
    }

    fn atomic_begin(&self, event: Option<Box<dyn FlipNotification>>) -> Result<()> {
        match event {
            Some(event) => self.flip.begin_or_send(event),
            None => Ok(()),
        }
    }

    fn atomic_flush(&self) {
        let wait = {
            let state = self.lock();
            self.with_deswizzler(|dswz| dswz.trigger());
            state.cdc.trigger_reload(state.wait_for_vblank);
            state.wait_for_vblank
        };
        if wait {
            self.vblank.wait_one();
        }
    }

    fn set_vblank(&self, enable: bool) {
        debug!("cdc: set_vblank {}", enable);
        self.lock().wait_for_vblank = enable;
        self.irq.set_enabled(IrqMask::LINE, enable);
    }

    fn cancel_page_flip(&self, owner: ClientId) -> bool {
        self.flip.cancel(owner)
    }
}

impl PlaneOps for Crtc {
    fn atomic_update(
        &self,
        layer: usize,
        old: Option<&PlaneState>,
        new: Option<&PlaneState>,
    ) -> Result<()> {
        debug!("cdc: plane {} update", layer);
        let mut state = self.lock();

        let new = match new {
            Some(new) => new,
            None => {
                if old.is_some() {
                    state.cdc.set_layer_enabled(layer, false)?;
                }
                return Ok(());
            }
        };

        let mode = state.mode.ok_or(Error::CrtcInactive)?;
        let format = PixelFormat::from_fourcc(new.fb.fourcc)?;
        if new.fb.pitch >= MAX_PITCH {
            return Err(Error::PitchTooLarge(new.fb.pitch));
        }
        let fb_address = new
            .fb
            .paddr
            .wrapping_add(new.fb.offset)
            .wrapping_add(new.src_y.wrapping_mul(new.fb.pitch))
            .wrapping_add(new.src_x.wrapping_mul(format.bytes_per_pixel()));

        let window = match old {
            Some(old) if old.rect() == new.rect() => None,
            _ => Some(Window::clip(
                new.crtc_x,
                new.crtc_y,
                new.crtc_w,
                new.crtc_h,
                mode.hdisplay,
                mode.vdisplay,
            )),
        };

        state.cdc.update_plane(
            layer,
            &PlaneUpdate {
                format,
                window,
                fb_address,
                pitch: new.fb.pitch as i16,
                alpha: new.alpha,
                blend: BlendMode::for_layer(layer),
            },
        )?;

        if old.is_none() {
            state.cdc.set_layer_enabled(layer, true)?;
        }
        Ok(())
    }

    fn atomic_disable(&self, layer: usize) -> Result<()> {
        self.lock().cdc.set_layer_enabled(layer, false)
    }
}
