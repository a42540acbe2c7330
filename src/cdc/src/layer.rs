// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-layer state and programming.
//!
//! Every layer keeps an in-memory mirror of the registers the hardware does
//! not let us read back in a useful way (the control word, window and
//! framebuffer geometry, pitches, aux framebuffer control). Operations
//! stage their change on a copy of the mirror, derive the dependent
//! registers from it and only then touch the hardware, so a rejected
//! change leaves both the registers and the mirror untouched.

use crate::device::Cdc;
use crate::regs::{
    LayerConfig2, LayerControl, LayerReg, INSERTION_MODE_SHIFT, LAYER_CONFIG1_ALPHA_PLANE,
    SCALER_FRACTION,
};
use crate::{Error, Result};

/// Largest framebuffer pitch the layer engine accepts, in bytes.
pub const MAX_PITCH: u32 = 0x8000;

/// Number of entries of the color lookup table.
pub const CLUT_SIZE: usize = 256;

pub const fn fourcc_code(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | (b as u32) << 8 | (c as u32) << 16 | (d as u32) << 24
}

pub const DRM_FORMAT_XRGB8888: u32 = fourcc_code(b'X', b'R', b'2', b'4');
pub const DRM_FORMAT_ARGB8888: u32 = fourcc_code(b'A', b'R', b'2', b'4');
pub const DRM_FORMAT_RGB888: u32 = fourcc_code(b'R', b'G', b'2', b'4');
pub const DRM_FORMAT_RGB565: u32 = fourcc_code(b'R', b'G', b'1', b'6');
pub const DRM_FORMAT_ARGB4444: u32 = fourcc_code(b'A', b'R', b'1', b'2');
pub const DRM_FORMAT_ARGB1555: u32 = fourcc_code(b'A', b'R', b'1', b'5');

/// Pixel formats of the layer engine, by register code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Argb8888 = 0,
    Rgb888 = 1,
    Rgb565 = 2,
    Argb4444 = 3,
    Argb1555 = 4,
    Al88 = 5,
    Al44 = 6,
    L8 = 7,
}

impl PixelFormat {
    pub fn from_code(code: u32) -> Result<Self> {
        use self::PixelFormat::*;
        Ok(match code {
            0 => Argb8888,
            1 => Rgb888,
            2 => Rgb565,
            3 => Argb4444,
            4 => Argb1555,
            5 => Al88,
            6 => Al44,
            7 => L8,
            _ => return Err(Error::UnsupportedFormat(code)),
        })
    }

    pub fn from_fourcc(fourcc: u32) -> Result<Self> {
        match fourcc {
            DRM_FORMAT_XRGB8888 | DRM_FORMAT_ARGB8888 => Ok(PixelFormat::Argb8888),
            DRM_FORMAT_RGB888 => Ok(PixelFormat::Rgb888),
            DRM_FORMAT_RGB565 => Ok(PixelFormat::Rgb565),
            DRM_FORMAT_ARGB4444 => Ok(PixelFormat::Argb4444),
            DRM_FORMAT_ARGB1555 => Ok(PixelFormat::Argb1555),
            _ => Err(Error::UnsupportedFourcc(fourcc)),
        }
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn bytes_per_pixel(self) -> u32 {
        use self::PixelFormat::*;
        match self {
            Argb8888 => 4,
            Rgb888 => 3,
            Rgb565 | Argb4444 | Argb1555 | Al88 => 2,
            Al44 | L8 => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendFactor {
    /// Known broken on the hardware.
    One = 0,
    Zero = 1,
    PixelAlpha = 2,
    PixelAlphaInv = 3,
    ConstAlpha = 4,
    ConstAlphaInv = 5,
    PixelAlphaXConstAlpha = 6,
    PixelAlphaXConstAlphaInv = 7,
}

/// The pair of blend factors of a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlendMode {
    pub f1: BlendFactor,
    pub f2: BlendFactor,
}

impl BlendMode {
    /// Used for the base layer.
    pub const PRIMARY: BlendMode = BlendMode {
        f1: BlendFactor::ConstAlpha,
        f2: BlendFactor::ConstAlphaInv,
    };
    /// Used for every layer stacked on top of the base layer.
    pub const OVERLAY: BlendMode = BlendMode {
        f1: BlendFactor::PixelAlpha,
        f2: BlendFactor::PixelAlphaInv,
    };
    pub const RESET: BlendMode = BlendMode {
        f1: BlendFactor::PixelAlphaXConstAlpha,
        f2: BlendFactor::PixelAlphaXConstAlphaInv,
    };

    pub fn for_layer(layer: usize) -> Self {
        if layer == 0 {
            BlendMode::PRIMARY
        } else {
            BlendMode::OVERLAY
        }
    }

    pub fn bits(self) -> u32 {
        ((self.f1 as u32) << 8) | self.f2 as u32
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertionMode {
    /// Insert on every pixel.
    Default = 0,
    Odd = 1,
    Even = 2,
    Duplicate = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum YCbCrMode {
    Interleaved,
    SemiPlanar,
    Planar,
}

/// Decoded AUX_FB_CONTROL register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuxFbControl {
    pub alpha_plane: bool,
    pub vertical_duplication: bool,
    pub horizontal_duplication: bool,
    pub ycbcr_convert: bool,
    pub ycbcr_mode: YCbCrMode,
    pub y_first: bool,
    pub cb_first: bool,
    pub odd_first: bool,
    pub y_headroom: bool,
}

impl Default for AuxFbControl {
    fn default() -> Self {
        AuxFbControl::from_bits(0)
    }
}

impl AuxFbControl {
    pub fn from_bits(value: u32) -> Self {
        let flag = |shift: u32| (value >> shift) & 1 != 0;
        AuxFbControl {
            alpha_plane: flag(0),
            vertical_duplication: flag(1),
            horizontal_duplication: flag(2),
            ycbcr_convert: flag(3),
            ycbcr_mode: match (value >> 4) & 3 {
                0 => YCbCrMode::Interleaved,
                1 => YCbCrMode::SemiPlanar,
                _ => YCbCrMode::Planar,
            },
            y_first: flag(6),
            cb_first: flag(7),
            odd_first: flag(8),
            y_headroom: flag(9),
        }
    }

    pub fn bits(&self) -> u32 {
        let mode = match self.ycbcr_mode {
            YCbCrMode::Interleaved => 0,
            YCbCrMode::SemiPlanar => 1,
            YCbCrMode::Planar => 2,
        };
        u32::from(self.alpha_plane)
            | u32::from(self.vertical_duplication) << 1
            | u32::from(self.horizontal_duplication) << 2
            | u32::from(self.ycbcr_convert) << 3
            | mode << 4
            | u32::from(self.y_first) << 6
            | u32::from(self.cb_first) << 7
            | u32::from(self.odd_first) << 8
            | u32::from(self.y_headroom) << 9
    }
}

/// YCbCr to RGB scale factors for the red and blue channels (10 bits each).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct YCbCrScale1 {
    pub red_cr: u16,
    pub blue_cb: u16,
}

impl YCbCrScale1 {
    pub fn bits(self) -> u32 {
        u32::from(self.red_cr & 0x3ff) | u32::from(self.blue_cb & 0x3ff) << 16
    }
}

/// YCbCr to RGB scale factors for the green channel (10 bits each).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct YCbCrScale2 {
    pub green_cr: u16,
    pub green_cb: u16,
}

impl YCbCrScale2 {
    pub fn bits(self) -> u32 {
        u32::from(self.green_cr & 0x3ff) | u32::from(self.green_cb & 0x3ff) << 16
    }
}

/// Synthesis options of one layer, decoded from its CONFIG_1 and CONFIG_2.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayerConfig {
    /// Bit `n` set means pixel format code `n` is available.
    pub supported_pixel_formats: u8,
    pub supported_blend_factors_f1: u8,
    pub supported_blend_factors_f2: u8,
    pub alpha_mode: bool,
    pub clut: bool,
    pub windowing: bool,
    pub default_color_programmable: bool,
    pub alpha_plane: bool,
    pub pitch: bool,
    pub duplication: bool,
    pub color_key: bool,
    pub scaler: bool,
    pub ycbcr: bool,
}

impl LayerConfig {
    pub fn decode(config1: u32, config2: u32) -> Self {
        let flag = |shift: u32| (config1 >> shift) & 1 != 0;
        let caps = LayerConfig2::from_bits_truncate(config2);
        LayerConfig {
            supported_pixel_formats: (config1 >> 24) as u8,
            supported_blend_factors_f1: (config1 >> 16) as u8,
            supported_blend_factors_f2: (config1 >> 8) as u8,
            alpha_mode: flag(7),
            clut: flag(6),
            windowing: flag(5),
            default_color_programmable: flag(4),
            alpha_plane: flag(3),
            pitch: flag(2),
            duplication: flag(1),
            color_key: flag(0),
            scaler: caps.contains(LayerConfig2::SCALER),
            ycbcr: caps.contains(LayerConfig2::YCBCR),
        }
    }
}

/// A rectangle in active-area coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Window {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Window {
    /// Builds a window from signed plane coordinates, truncating it to the
    /// `hdisplay` x `vdisplay` active area.
    pub fn clip(x: i32, y: i32, width: u32, height: u32, hdisplay: u16, vdisplay: u16) -> Self {
        let (x, width) = clip_axis(x, width, hdisplay);
        let (y, height) = clip_axis(y, height, vdisplay);
        Window {
            x,
            y,
            width,
            height,
        }
    }
}

fn clip_axis(start: i32, size: u32, display: u16) -> (u16, u16) {
    let display = u32::from(display);
    let mut start = start.max(0) as u32;
    if display > 0 && start >= display {
        start = display - 1;
    }
    let size = size.min(display.saturating_sub(start));
    (start as u16, size as u16)
}

/// Derived FB_LENGTH / AUX_FB_LENGTH register values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferLengths {
    pub fb: u32,
    pub aux: Option<u32>,
}

/// Mirror of one layer's hardware configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layer {
    config1: u32,
    config2: LayerConfig2,
    pub(crate) control: LayerControl,
    pub(crate) format: PixelFormat,
    pub(crate) window: Window,
    fb_width: u16,
    fb_height: u16,
    // Zero selects the computed line length.
    fb_pitch: i16,
    aux_pitch: i16,
    aux_control: AuxFbControl,
}

impl Layer {
    pub(crate) fn new(config1: u32, config2: LayerConfig2) -> Self {
        Layer {
            config1,
            config2,
            control: LayerControl::empty(),
            format: PixelFormat::Argb8888,
            window: Window::default(),
            fb_width: 0,
            fb_height: 0,
            fb_pitch: 0,
            aux_pitch: 0,
            aux_control: AuxFbControl::default(),
        }
    }

    pub(crate) fn reset(&mut self, full: Window) {
        self.control = LayerControl::empty();
        self.format = PixelFormat::Argb8888;
        self.window = full;
        self.fb_width = full.width;
        self.fb_height = full.height;
        self.fb_pitch = 0;
        self.aux_pitch = 0;
        self.aux_control = AuxFbControl::default();
    }

    // Disables the layer and spans it over a new active area.
    pub(crate) fn retime(&mut self, full: Window) {
        self.control.remove(LayerControl::ENABLE);
        self.window = full;
        self.fb_pitch = 0;
    }

    pub fn config(&self) -> LayerConfig {
        LayerConfig::decode(self.config1, self.config2.bits())
    }

    pub fn has_scaler(&self) -> bool {
        self.config2.contains(LayerConfig2::SCALER)
    }

    pub fn is_enabled(&self) -> bool {
        self.control.contains(LayerControl::ENABLE)
    }

    pub fn control(&self) -> LayerControl {
        self.control
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn fb_pitch(&self) -> i16 {
        self.fb_pitch
    }

    pub fn aux_control(&self) -> AuxFbControl {
        self.aux_control
    }

    fn ycbcr_enabled(&self) -> bool {
        self.config2.contains(LayerConfig2::YCBCR) && self.aux_control.ycbcr_convert
    }

    fn semi_planar(&self) -> bool {
        self.ycbcr_enabled() && self.aux_control.ycbcr_mode == YCbCrMode::SemiPlanar
    }

    fn insertion(&self) -> bool {
        self.control.intersects(LayerControl::INSERTION_MODE)
    }

    fn half_width_length(&self, bpp: u32) -> Result<u32> {
        let width = self.window.width;
        if width & 1 != 0 {
            return Err(Error::OddWindowWidth(width));
        }
        Ok(u32::from(width) * bpp / 2)
    }

    /// Computes FB_LENGTH and, when the layer fetches an alpha plane or
    /// converts YCbCr, AUX_FB_LENGTH.
    pub fn buffer_lengths(&self, bus_width: u32) -> Result<BufferLengths> {
        let ycbcr = self.ycbcr_enabled();
        let (bpp, aux_bpp) = if ycbcr {
            match self.aux_control.ycbcr_mode {
                YCbCrMode::Interleaved => (2, 1),
                // Luma only, Cb and Cr come interleaved from the aux plane.
                YCbCrMode::SemiPlanar => (1, 2),
                YCbCrMode::Planar => return Err(Error::PlanarYCbCr),
            }
        } else {
            (self.format.bytes_per_pixel(), 1)
        };

        let length = if self.has_scaler() {
            u32::from(self.fb_width) * bpp
        } else if self.insertion() {
            self.half_width_length(bpp)?
        } else {
            u32::from(self.window.width) * bpp
        };
        let fb = encode_length(self.fb_pitch, length, bus_width);

        let aux_plane = self.config1 & LAYER_CONFIG1_ALPHA_PLANE != 0;
        let aux = if aux_plane || ycbcr {
            let length = if self.has_scaler() {
                u32::from(self.fb_width)
            } else if self.insertion() || self.aux_control.ycbcr_mode == YCbCrMode::SemiPlanar {
                self.half_width_length(aux_bpp)?
            } else {
                u32::from(self.window.width) * aux_bpp
            };
            Some(encode_length(self.aux_pitch, length, bus_width))
        } else {
            None
        };

        Ok(BufferLengths { fb, aux })
    }

    // Lengths without insertion mode or YCbCr fetch, valid for every window.
    fn linear_lengths(&self, bus_width: u32) -> BufferLengths {
        let width = if self.has_scaler() {
            self.fb_width
        } else {
            self.window.width
        };
        let length = u32::from(width) * self.format.bytes_per_pixel();
        let fb = encode_length(self.fb_pitch, length, bus_width);
        let aux = if self.config1 & LAYER_CONFIG1_ALPHA_PLANE != 0 {
            Some(encode_length(self.aux_pitch, u32::from(width), bus_width))
        } else {
            None
        };
        BufferLengths { fb, aux }
    }

    /// Buffer lengths of a layer that a timing change or a reset just
    /// spanned over a new area. Insertion mode and YCbCr fetch are dropped
    /// when the new window cannot use them.
    pub(crate) fn respan_lengths(&mut self, index: usize, bus_width: u32) -> BufferLengths {
        match self.buffer_lengths(bus_width) {
            Ok(lengths) => lengths,
            Err(e) => {
                warn!("cdc: layer {}: {}, falling back to linear fetch", index, e);
                self.control.remove(LayerControl::INSERTION_MODE);
                self.aux_control = AuxFbControl::default();
                self.linear_lengths(bus_width)
            }
        }
    }
}

fn encode_length(pitch: i16, length: u32, bus_width: u32) -> u32 {
    let pitch = if pitch == 0 {
        length
    } else {
        u32::from(pitch as u16)
    };
    (pitch << 16) | length.wrapping_add(bus_width).wrapping_sub(1)
}

/// Fixed point ratio `(input - 1) / (output - 1)` with 13 fractional bits.
pub fn scaling_factor(input: u16, output: u16) -> u16 {
    let divisor = u32::from(output).saturating_sub(1);
    if divisor == 0 {
        return 0;
    }
    ((u32::from(input.saturating_sub(1)) << SCALER_FRACTION) / divisor) as u16
}

/// Everything a plane update programs into one layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneUpdate {
    pub format: PixelFormat,
    /// New window, or `None` to keep the current geometry.
    pub window: Option<Window>,
    pub fb_address: u32,
    pub pitch: i16,
    pub alpha: Option<u8>,
    pub blend: BlendMode,
}

impl Cdc {
    pub fn layer(&self, layer: usize) -> Result<&Layer> {
        self.check_layer(layer)?;
        Ok(&self.layers[layer])
    }

    pub fn layer_config(&self, layer: usize) -> Result<LayerConfig> {
        Ok(self.layer(layer)?.config())
    }

    pub(crate) fn write_lengths(&self, index: usize, lengths: &BufferLengths) {
        self.regs.write_layer(index, LayerReg::FbLength, lengths.fb);
        if let Some(aux) = lengths.aux {
            self.regs.write_layer(index, LayerReg::AuxFbLength, aux);
        }
    }

    // Window registers of `layer`, plus the scaler output or the line
    // counts that follow the window.
    fn write_window(&self, index: usize, layer: &Layer) {
        let window = layer.window;
        let origin = self.regs.read_global(crate::regs::BACK_PORCH);
        let (ox, oy) = (origin >> 16, origin & 0xffff);
        let x = u32::from(window.x).wrapping_add(ox);
        let y = u32::from(window.y).wrapping_add(oy);
        let window_h = (x.wrapping_add(u32::from(window.width)) << 16) | x.wrapping_add(1);
        let window_v = (y.wrapping_add(u32::from(window.height)) << 16) | y.wrapping_add(1);
        self.regs.write_layer(index, LayerReg::WindowH, window_h);
        self.regs.write_layer(index, LayerReg::WindowV, window_v);

        if layer.has_scaler() {
            self.regs.write_layer(
                index,
                LayerReg::ScalerOutputSize,
                (u32::from(window.height) << 16) | u32::from(window.width),
            );
            self.write_scaling_factors(index, layer);
        } else {
            self.regs
                .write_layer(index, LayerReg::FbLines, u32::from(window.height));
            if layer.semi_planar() {
                self.regs
                    .write_layer(index, LayerReg::AuxFbLines, u32::from(window.height / 2));
            }
        }
    }

    fn write_scaling_factors(&self, index: usize, layer: &Layer) {
        let h_factor = scaling_factor(layer.fb_width, layer.window.width);
        let h_phase = h_factor.wrapping_add(1 << SCALER_FRACTION);
        let v_factor = scaling_factor(layer.fb_height, layer.window.height);
        self.regs
            .write_layer(index, LayerReg::ScalerHFactor, u32::from(h_factor));
        self.regs
            .write_layer(index, LayerReg::ScalerHPhase, u32::from(h_phase));
        self.regs
            .write_layer(index, LayerReg::ScalerVFactor, u32::from(v_factor));
        // The vertical phase takes the factor itself, unlike the horizontal one.
        self.regs
            .write_layer(index, LayerReg::ScalerVPhase, u32::from(v_factor));
    }

    fn stage(&self, layer: usize) -> Result<Layer> {
        self.check_layer(layer)?;
        Ok(self.layers[layer].clone())
    }

    fn update_control<F>(&mut self, layer: usize, f: F) -> Result<()>
    where
        F: FnOnce(&mut LayerControl),
    {
        self.check_layer(layer)?;
        let control = &mut self.layers[layer].control;
        f(control);
        let bits = control.bits();
        self.regs.write_layer(layer, LayerReg::Control, bits);
        Ok(())
    }

    pub fn set_layer_enabled(&mut self, layer: usize, enable: bool) -> Result<()> {
        debug!("cdc: layer {} enabled: {}", layer, enable);
        self.update_control(layer, |c| c.set(LayerControl::ENABLE, enable))
    }

    pub fn set_duplication(&mut self, layer: usize, horizontal: bool, vertical: bool) -> Result<()> {
        self.update_control(layer, |c| {
            c.set(LayerControl::H_DUPLICATION, horizontal);
            c.set(LayerControl::V_DUPLICATION, vertical);
        })
    }

    pub fn set_clut_enabled(&mut self, layer: usize, enable: bool) -> Result<()> {
        self.update_control(layer, |c| c.set(LayerControl::CLUT_ENABLE, enable))
    }

    /// Color keying and alpha mode share the key logic, enabling one turns
    /// the other off.
    pub fn set_color_key_enabled(&mut self, layer: usize, enable: bool) -> Result<()> {
        self.update_control(layer, |c| {
            c.remove(LayerControl::COLOR_KEY_REPLACE);
            c.set(LayerControl::COLOR_KEY_ENABLE, enable);
        })
    }

    pub fn set_alpha_mode_enabled(&mut self, layer: usize, enable: bool) -> Result<()> {
        self.update_control(layer, |c| {
            c.remove(LayerControl::COLOR_KEY_ENABLE);
            c.set(LayerControl::COLOR_KEY_REPLACE, enable);
        })
    }

    pub fn set_mirroring_enabled(&mut self, layer: usize, enable: bool) -> Result<()> {
        self.update_control(layer, |c| c.set(LayerControl::MIRRORING, enable))
    }

    pub fn set_insertion_mode(&mut self, layer: usize, mode: InsertionMode) -> Result<()> {
        let mut staged = self.stage(layer)?;
        staged.control.remove(LayerControl::INSERTION_MODE);
        staged
            .control
            .insert(LayerControl::from_bits_truncate((mode as u32) << INSERTION_MODE_SHIFT));
        let control = staged.control.bits();
        self.commit_with_lengths(layer, staged, |regs, layer| {
            regs.write_layer(layer, LayerReg::Control, control)
        })
    }

    pub fn set_default_color(&mut self, layer: usize, enable: bool, argb: u32) -> Result<()> {
        self.update_control(layer, |c| c.set(LayerControl::DEFAULT_COLOR_BLENDING, enable))?;
        self.regs.write_layer(layer, LayerReg::Color, argb);
        Ok(())
    }

    pub fn set_constant_alpha(&self, layer: usize, alpha: u8) -> Result<()> {
        self.check_layer(layer)?;
        self.regs
            .write_layer(layer, LayerReg::Alpha, u32::from(alpha));
        Ok(())
    }

    pub fn set_color_key(&self, layer: usize, rgb: u32) -> Result<()> {
        self.check_layer(layer)?;
        self.regs.write_layer(layer, LayerReg::ColorKey, rgb);
        Ok(())
    }

    pub fn set_blend_mode(&self, layer: usize, blend: BlendMode) -> Result<()> {
        self.check_layer(layer)?;
        self.regs
            .write_layer(layer, LayerReg::Blending, blend.bits());
        Ok(())
    }

    pub fn set_pixel_format(&mut self, layer: usize, format: PixelFormat) -> Result<()> {
        let mut staged = self.stage(layer)?;
        check_format(&staged, format)?;
        staged.format = format;
        self.commit_with_lengths(layer, staged, |regs, layer| {
            regs.write_layer(layer, LayerReg::PixelFormat, format.code())
        })
    }

    // Computes the buffer lengths of `staged`, runs `write`, programs the
    // lengths and adopts `staged` as the new mirror.
    fn commit_with_lengths<F>(&mut self, layer: usize, staged: Layer, write: F) -> Result<()>
    where
        F: FnOnce(&crate::bus::Registers, usize),
    {
        let lengths = staged.buffer_lengths(self.bus_width())?;
        write(&self.regs, layer);
        self.write_lengths(layer, &lengths);
        self.layers[layer] = staged;
        Ok(())
    }

    /// Places the layer at `window` (relative to the active area).
    ///
    /// The caller clips the rectangle, nothing is truncated here. `pitch`
    /// of zero selects the computed line length.
    pub fn set_window(&mut self, layer: usize, window: Window, pitch: i16) -> Result<()> {
        debug!("cdc: layer {} window {:?} pitch {}", layer, window, pitch);
        let mut staged = self.stage(layer)?;
        staged.window = window;
        if staged.has_scaler() {
            self.write_window(layer, &staged);
            self.layers[layer] = staged;
            return Ok(());
        }

        staged.fb_pitch = pitch;
        let lengths = staged.buffer_lengths(self.bus_width())?;
        self.write_window(layer, &staged);
        self.write_lengths(layer, &lengths);
        self.layers[layer] = staged;
        Ok(())
    }

    pub fn set_fb_address(&self, layer: usize, address: u32) -> Result<()> {
        self.check_layer(layer)?;
        self.regs.write_layer(layer, LayerReg::FbStart, address);
        Ok(())
    }

    pub fn set_fb_pitch(&mut self, layer: usize, pitch: i16) -> Result<()> {
        let mut staged = self.stage(layer)?;
        staged.fb_pitch = pitch;
        self.commit_with_lengths(layer, staged, |_, _| {})
    }

    /// Sets the framebuffer geometry. On a scaler layer this is the scaler
    /// input size.
    pub fn set_fb_size(&mut self, layer: usize, width: u16, height: u16, pitch: i16) -> Result<()> {
        let mut staged = self.stage(layer)?;
        staged.fb_width = width;
        staged.fb_height = height;
        staged.fb_pitch = pitch;
        let lengths = staged.buffer_lengths(self.bus_width())?;

        self.regs
            .write_layer(layer, LayerReg::FbLines, u32::from(height));
        if staged.has_scaler() {
            self.regs.write_layer(
                layer,
                LayerReg::ScalerInputSize,
                (u32::from(height) << 16) | u32::from(width),
            );
            self.write_scaling_factors(layer, &staged);
        }
        self.write_lengths(layer, &lengths);
        self.layers[layer] = staged;
        Ok(())
    }

    /// Overrides FB_LINES until the next window, format, pitch or timing change.
    pub fn set_buffer_lines(&self, layer: usize, lines: u32) -> Result<()> {
        self.check_layer(layer)?;
        self.regs.write_layer(layer, LayerReg::FbLines, lines);
        Ok(())
    }

    pub fn set_aux_fb_address(&self, layer: usize, address: u32) -> Result<()> {
        self.check_layer(layer)?;
        self.regs.write_layer(layer, LayerReg::AuxFbStart, address);
        Ok(())
    }

    pub fn set_aux_fb_pitch(&mut self, layer: usize, pitch: i16) -> Result<()> {
        let mut staged = self.stage(layer)?;
        staged.aux_pitch = pitch;
        self.commit_with_lengths(layer, staged, |_, _| {})
    }

    pub fn set_aux_fb_control(&mut self, layer: usize, control: AuxFbControl) -> Result<()> {
        let mut staged = self.stage(layer)?;
        staged.aux_control = control;
        self.commit_with_lengths(layer, staged, |regs, layer| {
            regs.write_layer(layer, LayerReg::AuxFbControl, control.bits())
        })
    }

    pub fn set_ycbcr_scale_1(&self, layer: usize, scale: YCbCrScale1) -> Result<()> {
        self.check_layer(layer)?;
        self.regs
            .write_layer(layer, LayerReg::YCbCrScale1, scale.bits());
        Ok(())
    }

    pub fn set_ycbcr_scale_2(&self, layer: usize, scale: YCbCrScale2) -> Result<()> {
        self.check_layer(layer)?;
        self.regs
            .write_layer(layer, LayerReg::YCbCrScale2, scale.bits());
        Ok(())
    }

    /// Loads RGB entries into the lookup table from entry `start` on.
    pub fn upload_clut(&self, layer: usize, start: u8, data: &[u32]) -> Result<()> {
        self.check_layer(layer)?;
        let start = usize::from(start).min(CLUT_SIZE - 1);
        let len = data.len().min(CLUT_SIZE - start);
        for (i, rgb) in data[..len].iter().enumerate() {
            let entry = ((i + start) as u32) << 24;
            self.regs
                .write_layer(layer, LayerReg::Clut, entry | (rgb & 0x00ff_ffff));
        }
        Ok(())
    }

    /// Programs format, blending, alpha, address and, when given, window of
    /// a layer in one go. Nothing is written if any part is rejected.
    pub fn update_plane(&mut self, layer: usize, update: &PlaneUpdate) -> Result<()> {
        let mut staged = self.stage(layer)?;
        check_format(&staged, update.format)?;
        staged.format = update.format;
        match update.window {
            Some(window) => {
                staged.window = window;
                // A scaler layer keeps its pitch across window changes.
                if !staged.has_scaler() {
                    staged.fb_pitch = update.pitch;
                }
            }
            None => staged.fb_pitch = update.pitch,
        }
        let lengths = staged.buffer_lengths(self.bus_width())?;

        self.regs
            .write_layer(layer, LayerReg::PixelFormat, update.format.code());
        self.regs
            .write_layer(layer, LayerReg::Blending, update.blend.bits());
        if let Some(alpha) = update.alpha {
            self.regs
                .write_layer(layer, LayerReg::Alpha, u32::from(alpha));
        }
        self.regs
            .write_layer(layer, LayerReg::FbStart, update.fb_address);
        if update.window.is_some() {
            self.write_window(layer, &staged);
        }
        self.write_lengths(layer, &lengths);
        self.layers[layer] = staged;
        Ok(())
    }
}

fn check_format(layer: &Layer, format: PixelFormat) -> Result<()> {
    let supported = layer.config().supported_pixel_formats;
    if supported != 0 && supported & (1 << format.code()) == 0 {
        return Err(Error::UnsupportedFormat(format.code()));
    }
    Ok(())
}
