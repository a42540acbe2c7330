// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Display modes and the fixed video mode presets of the supported boards.

use bitflags::bitflags;

use crate::timing::TimingParams;

bitflags! {
    pub struct ModeFlags: u32 {
        const PHSYNC = 1 << 0;
        const NHSYNC = 1 << 1;
        const PVSYNC = 1 << 2;
        const NVSYNC = 1 << 3;
    }
}

/// A display mode in the host framework's representation: every
/// horizontal and vertical position counts from the start of the active
/// area.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayMode {
    pub clock_khz: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub flags: ModeFlags,
}

impl DisplayMode {
    pub fn clock_hz(&self) -> u64 {
        u64::from(self.clock_khz) * 1000
    }

    /// Discrete timing of the mode. Blank and pixel clock polarity are board
    /// properties and come from the caller.
    pub fn to_timing(&self, neg_blank: bool, inv_clock: bool) -> TimingParams {
        TimingParams {
            h_sync: self.hsync_end.wrapping_sub(self.hsync_start),
            h_back_porch: self.htotal.wrapping_sub(self.hsync_end),
            h_width: self.hdisplay,
            h_front_porch: self.hsync_start.wrapping_sub(self.hdisplay),
            v_sync: self.vsync_end.wrapping_sub(self.vsync_start),
            v_back_porch: self.vtotal.wrapping_sub(self.vsync_end),
            v_width: self.vdisplay,
            v_front_porch: self.vsync_start.wrapping_sub(self.vdisplay),
            neg_hsync: self.flags.contains(ModeFlags::NHSYNC),
            neg_vsync: self.flags.contains(ModeFlags::NVSYNC),
            neg_blank,
            inv_clock,
        }
    }
}

/// A board video mode, given as sync/porch/active lengths.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoMode {
    pub name: &'static str,
    pub h_sync: u16,
    pub h_back_porch: u16,
    pub h_width: u16,
    pub h_front_porch: u16,
    pub v_sync: u16,
    pub v_back_porch: u16,
    pub v_height: u16,
    pub v_front_porch: u16,
    pub clock_khz: u32,
    pub neg_hsync: bool,
    pub neg_vsync: bool,
    pub neg_blank: bool,
    pub inv_clock: bool,
}

macro_rules! video_mode {
    ($name:expr, $hs:expr, $hbp:expr, $hw:expr, $hfp:expr,
     $vs:expr, $vbp:expr, $vh:expr, $vfp:expr, $khz:expr, $inv_clk:expr) => {
        VideoMode {
            name: $name,
            h_sync: $hs,
            h_back_porch: $hbp,
            h_width: $hw,
            h_front_porch: $hfp,
            v_sync: $vs,
            v_back_porch: $vbp,
            v_height: $vh,
            v_front_porch: $vfp,
            clock_khz: $khz,
            neg_hsync: false,
            neg_vsync: false,
            neg_blank: false,
            inv_clock: $inv_clk,
        }
    };
}

impl VideoMode {
    pub const SXGA_60: VideoMode =
        video_mode!("1280x1024@60", 112, 248, 1280, 48, 3, 38, 1024, 1, 108_000, true);
    pub const XGA_60: VideoMode =
        video_mode!("1024x768@60", 136, 160, 1024, 24, 6, 29, 768, 3, 65_000, true);
    pub const SVGA_60: VideoMode =
        video_mode!("800x600@60", 128, 88, 800, 40, 4, 23, 600, 1, 40_000, true);
    /// Two 800x600 panels side by side, driven at twice the pixel rate.
    pub const SVGA_60_DUAL: VideoMode =
        video_mode!("800x600@60 dual", 256, 176, 1600, 80, 4, 23, 600, 1, 80_000, true);
    pub const WVGA_60_VEEK_MT: VideoMode =
        video_mode!("800x480@60 VEEK-MT", 30, 16, 800, 210, 13, 10, 480, 22, 33_000, false);
    pub const WVGA_60_NEEK: VideoMode =
        video_mode!("800x480@60 NEEK", 112, 23, 800, 32, 5, 10, 480, 10, 29_590, true);
    pub const VGA_60: VideoMode =
        video_mode!("640x480@60", 96, 48, 640, 16, 2, 33, 480, 10, 25_180, true);

    pub const PRESETS: [VideoMode; 7] = [
        VideoMode::SXGA_60,
        VideoMode::XGA_60,
        VideoMode::SVGA_60,
        VideoMode::SVGA_60_DUAL,
        VideoMode::WVGA_60_VEEK_MT,
        VideoMode::WVGA_60_NEEK,
        VideoMode::VGA_60,
    ];

    pub fn timing(&self) -> TimingParams {
        TimingParams {
            h_sync: self.h_sync,
            h_back_porch: self.h_back_porch,
            h_width: self.h_width,
            h_front_porch: self.h_front_porch,
            v_sync: self.v_sync,
            v_back_porch: self.v_back_porch,
            v_width: self.v_height,
            v_front_porch: self.v_front_porch,
            neg_hsync: self.neg_hsync,
            neg_vsync: self.neg_vsync,
            neg_blank: self.neg_blank,
            inv_clock: self.inv_clock,
        }
    }
}

impl From<&VideoMode> for DisplayMode {
    fn from(m: &VideoMode) -> Self {
        let hsync_start = m.h_width + m.h_front_porch;
        let hsync_end = hsync_start + m.h_sync;
        let vsync_start = m.v_height + m.v_front_porch;
        let vsync_end = vsync_start + m.v_sync;

        let mut flags = ModeFlags::empty();
        flags |= if m.neg_hsync {
            ModeFlags::NHSYNC
        } else {
            ModeFlags::PHSYNC
        };
        flags |= if m.neg_vsync {
            ModeFlags::NVSYNC
        } else {
            ModeFlags::PVSYNC
        };

        DisplayMode {
            clock_khz: m.clock_khz,
            hdisplay: m.h_width,
            hsync_start,
            hsync_end,
            htotal: hsync_end + m.h_back_porch,
            vdisplay: m.v_height,
            vsync_start,
            vsync_end,
            vtotal: vsync_end + m.v_back_porch,
            flags,
        }
    }
}
