// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Deswizzling co-processor feeding the CDC.

use std::sync::{Arc, Mutex};

use crate::bus::RegisterIo;

const DSWZ_REG_ID: u32 = 0x00;
const DSWZ_REG_MODE: u32 = 0x01;
const DSWZ_REG_FB_ADDR: u32 = 0x02;
const DSWZ_REG_FB_DIM: u32 = 0x03;
const DSWZ_REG_FB_PITCH: u32 = 0x04;
const DSWZ_REG_IRQ_ENABLE: u32 = 0x05;
const DSWZ_REG_IRQ_STATUS: u32 = 0x06;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeswizzleMode {
    Disabled = 0,
    Test = 1,
    Linear = 2,
    Deswizzle = 3,
}

/// Operations the CRTC and the interrupt worker need from a deswizzler.
pub trait Deswizzle: Send {
    fn set_mode(&mut self, mode: DeswizzleMode);
    fn set_fb_addr(&mut self, addr: u32);
    fn set_fb_config(&mut self, width: u16, height: u16, pitch: u32, bpp: u8);
    /// Starts processing the configured framebuffer.
    fn trigger(&mut self);
    /// Restarts processing for the next frame.
    fn retrigger(&mut self);
    fn stop(&mut self);
    fn handle_irq(&mut self);
    /// Quiesces the device before the driver goes away.
    fn detach(&mut self) {}
}

pub type SharedDeswizzler = Arc<Mutex<dyn Deswizzle>>;

pub struct Deswizzler {
    io: Arc<dyn RegisterIo>,
    fb_addr: u32,
    fb_width: u16,
    fb_height: u16,
    // In bytes.
    fb_pitch: u32,
    fb_bpp: u8,
    mode: DeswizzleMode,
    mode_update: bool,
}

impl Deswizzler {
    pub fn attach(io: Arc<dyn RegisterIo>) -> Self {
        let id = io.read(DSWZ_REG_ID);
        info!("dswz: deswizzler rev. {:x}", id);

        io.write(DSWZ_REG_IRQ_ENABLE, 1);
        io.write(DSWZ_REG_IRQ_STATUS, 1);

        Deswizzler {
            io,
            fb_addr: 0,
            fb_width: 0,
            fb_height: 0,
            fb_pitch: 0,
            fb_bpp: 0,
            mode: DeswizzleMode::Disabled,
            mode_update: false,
        }
    }

    pub fn mode(&self) -> DeswizzleMode {
        self.mode
    }
}

impl Deswizzle for Deswizzler {
    fn set_mode(&mut self, mode: DeswizzleMode) {
        debug!("dswz: set_mode {:?}", mode);
        if self.mode != mode {
            self.io
                .write(DSWZ_REG_MODE, DeswizzleMode::Disabled as u32);
            self.mode_update = true;
        }
        self.mode = mode;
    }

    fn set_fb_addr(&mut self, addr: u32) {
        self.fb_addr = addr;
    }

    fn set_fb_config(&mut self, width: u16, height: u16, pitch: u32, bpp: u8) {
        self.fb_width = width;
        self.fb_height = height;
        self.fb_pitch = pitch;
        self.fb_bpp = bpp;
    }

    fn trigger(&mut self) {
        debug!("dswz: trigger");
        self.mode = DeswizzleMode::Linear;
        self.io.write(
            DSWZ_REG_FB_DIM,
            (u32::from(self.fb_height) << 16) | u32::from(self.fb_width),
        );
        self.io.write(
            DSWZ_REG_FB_PITCH,
            (u32::from(self.fb_bpp) << 24) | self.fb_pitch,
        );
        self.io.write(DSWZ_REG_MODE, self.mode as u32);
        self.io.write(DSWZ_REG_FB_ADDR, self.fb_addr);
    }

    fn retrigger(&mut self) {
        if self.mode_update {
            self.mode_update = false;
            self.io.write(DSWZ_REG_MODE, self.mode as u32);
        }

        // Test mode restarts on a MODE write, the others on an address write.
        if self.mode == DeswizzleMode::Test {
            self.io.write(DSWZ_REG_MODE, self.mode as u32);
        } else {
            self.io.write(DSWZ_REG_FB_ADDR, self.fb_addr);
        }
    }

    fn stop(&mut self) {
        debug!("dswz: stop");
        self.mode = DeswizzleMode::Disabled;
        self.io.write(DSWZ_REG_MODE, self.mode as u32);
    }

    fn handle_irq(&mut self) {
        let status = self.io.read(DSWZ_REG_IRQ_STATUS);
        self.io.write(DSWZ_REG_IRQ_STATUS, status);
    }

    fn detach(&mut self) {
        self.io.write(DSWZ_REG_IRQ_ENABLE, 0);
    }
}
