// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Register map of the CDC core.
//!
//! All registers are 32 bit wide and addressed by word index. The global
//! block sits at index 0, layer `n` starts at `(n + 1) * LAYER_SPAN`.

use bitflags::bitflags;

/// Size of one layer register block, in words.
pub const LAYER_SPAN: u32 = 0x40;

pub const HW_REVISION: u32 = 0x00; // Hardware Revision Register
pub const LAYER_COUNT: u32 = 0x01; // Layer Count Register
pub const SYNC_SIZE: u32 = 0x02; // Sync Size Register (accumulated)
pub const BACK_PORCH: u32 = 0x03; // Back Porch Register (accumulated)
pub const ACTIVE_WIDTH: u32 = 0x04; // Active Width Register (accumulated)
pub const TOTAL_WIDTH: u32 = 0x05; // Total Width Register (accumulated)
pub const CONTROL: u32 = 0x06; // Global Control Register
pub const CONFIG1: u32 = 0x07; // Global Configuration 1 Register
pub const CONFIG2: u32 = 0x08; // Global Configuration 2 Register
pub const SHADOW_RELOAD: u32 = 0x09; // Shadow Reload Control Register
pub const GAMMA: u32 = 0x0a; // Gamma Correction Register
pub const BG_COLOR: u32 = 0x0b; // Background Color Register
pub const IRQ_POLARITY: u32 = 0x0c; // Interrupt Polarity Register
pub const IRQ_ENABLE: u32 = 0x0d; // Interrupt Enable Register
pub const IRQ_STATUS: u32 = 0x0e; // Interrupt Status Register
pub const IRQ_CLEAR: u32 = 0x0f; // Interrupt Clear Register
pub const LINE_IRQ_POSITION: u32 = 0x10; // Line Interrupt Position Register
pub const POSITION: u32 = 0x11; // Position Status Register
pub const SYNC_STATUS: u32 = 0x12; // Sync/Blank Status Register
pub const BG_LAYER_BASE: u32 = 0x13; // Background Layer Base Register
pub const BG_LAYER_INC: u32 = 0x14; // Background Layer Increments Register
pub const BG_LAYER_ADDR: u32 = 0x15; // Background Layer RAM Address Register
pub const BG_LAYER_DATA: u32 = 0x16; // Background Layer RAM Data Register
pub const SLAVE_TIMING_STATUS: u32 = 0x17; // Slave Timing Mode Status Register
pub const EXT_DISPLAY: u32 = 0x18; // External Display Control Register

/// Value written to [`IRQ_CLEAR`] at attach to drop stale interrupts.
pub const IRQ_CLEAR_ALL: u32 = 0xff;

/// Fractional bits of the scaler factor registers.
pub const SCALER_FRACTION: u32 = 13;

/// Blending register value after reset: pixel alpha x constant alpha.
pub const BLENDING_RESET: u32 = (6 << 8) | 7;

bitflags! {
    /// Bits of the global [`CONTROL`] register.
    pub struct GlobalControl: u32 {
        const HSYNC = 0x8000_0000;
        const VSYNC = 0x4000_0000;
        const BLANK = 0x2000_0000;
        const CLK_POL = 0x1000_0000;
        const STREAM_ENABLE = 0x0010_0000;
        const SLAVE_TIMING = 0x0004_0000;
        const BACKGROUND_LAYER = 0x0002_0000;
        const DITHERING = 0x0001_0000;
        const ENABLE = 0x0000_0001;

        const POLARITY = Self::HSYNC.bits
            | Self::VSYNC.bits
            | Self::BLANK.bits
            | Self::CLK_POL.bits;
    }
}

bitflags! {
    /// Bits of a layer's CONTROL register.
    pub struct LayerControl: u32 {
        const DEFAULT_COLOR_BLENDING = 0x200;
        const MIRRORING = 0x100;
        const INSERTION_MODE = 0xc0;
        const COLOR_KEY_REPLACE = 0x20;
        const CLUT_ENABLE = 0x10;
        const H_DUPLICATION = 0x08;
        const V_DUPLICATION = 0x04;
        const COLOR_KEY_ENABLE = 0x02;
        const ENABLE = 0x01;
    }
}

bitflags! {
    /// Capability bits of a layer's CONFIG_2 register.
    pub struct LayerConfig2: u32 {
        const SCALER = 0x8000_0000;
        const YCBCR = 0x4000_0000;
    }
}

/// Alpha plane capability bit of a layer's CONFIG_1 register.
pub const LAYER_CONFIG1_ALPHA_PLANE: u32 = 0x08;

/// Shift of the insertion mode field inside [`LayerControl`].
pub const INSERTION_MODE_SHIFT: u32 = 6;

/// Per-layer registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerReg {
    Config1,
    Config2,
    Control,
    WindowH,
    WindowV,
    ColorKey,
    PixelFormat,
    Alpha,
    Color,
    Blending,
    AuxFbControl,
    FbStart,
    FbLength,
    FbLines,
    AuxFbStart,
    AuxFbLength,
    AuxFbLines,
    Clut,
    ScalerInputSize,
    ScalerOutputSize,
    ScalerVFactor,
    ScalerVPhase,
    ScalerHFactor,
    ScalerHPhase,
    YCbCrScale1,
    YCbCrScale2,
}

impl LayerReg {
    fn offset(self) -> u32 {
        use self::LayerReg::*;
        match self {
            Config1 => 0x00,
            Config2 => 0x01,
            Control => 0x03,
            WindowH => 0x04,
            WindowV => 0x05,
            ColorKey => 0x06,
            PixelFormat => 0x07,
            Alpha => 0x08,
            Color => 0x09,
            Blending => 0x0a,
            AuxFbControl => 0x0c,
            FbStart => 0x0d,
            FbLength => 0x0e,
            FbLines => 0x0f,
            AuxFbStart => 0x10,
            AuxFbLength => 0x11,
            AuxFbLines => 0x12,
            Clut => 0x13,
            ScalerInputSize => 0x13,
            ScalerOutputSize => 0x14,
            ScalerVFactor => 0x15,
            ScalerVPhase => 0x16,
            ScalerHFactor => 0x17,
            ScalerHPhase => 0x18,
            YCbCrScale1 => 0x19,
            YCbCrScale2 => 0x1a,
        }
    }

    // Registers that moved up by one word when the layer RELOAD register
    // was introduced.
    fn follows_reload(self) -> bool {
        use self::LayerReg::*;
        !matches!(
            self,
            Config1
                | Config2
                | ScalerInputSize
                | ScalerOutputSize
                | ScalerVFactor
                | ScalerVPhase
                | ScalerHFactor
                | ScalerHPhase
                | YCbCrScale1
                | YCbCrScale2
        )
    }
}

/// Arrangement of the per-layer register block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerLayout {
    /// Cores without a per-layer RELOAD register (major revision < 2).
    Legacy,
    /// Cores with a per-layer RELOAD register at offset 0x02.
    Current,
}

impl LayerLayout {
    /// Picks the layout matching a hardware major revision.
    pub fn for_revision(major: u8) -> Self {
        if major >= 2 {
            LayerLayout::Current
        } else {
            LayerLayout::Legacy
        }
    }

    /// Offset of `reg` inside a layer block, in words.
    pub fn offset(self, reg: LayerReg) -> u32 {
        match self {
            LayerLayout::Legacy if reg.follows_reload() => reg.offset() - 1,
            _ => reg.offset(),
        }
    }

    /// Absolute word index of `reg` for `layer`.
    pub fn index(self, layer: usize, reg: LayerReg) -> u32 {
        (layer as u32 + 1) * LAYER_SPAN + self.offset(reg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_layout() {
        let layout = LayerLayout::Current;
        assert_eq!(layout.offset(LayerReg::Control), 0x03);
        assert_eq!(layout.offset(LayerReg::AuxFbControl), 0x0c);
        assert_eq!(layout.offset(LayerReg::FbLength), 0x0e);
        assert_eq!(layout.index(0, LayerReg::Config1), 0x40);
        assert_eq!(layout.index(2, LayerReg::WindowH), 0xc4);
    }

    #[test]
    fn test_legacy_layout() {
        let layout = LayerLayout::Legacy;
        assert_eq!(layout.offset(LayerReg::Config2), 0x01);
        assert_eq!(layout.offset(LayerReg::Control), 0x02);
        assert_eq!(layout.offset(LayerReg::AuxFbControl), 0x0b);
        assert_eq!(layout.offset(LayerReg::Clut), 0x12);
        assert_eq!(layout.offset(LayerReg::ScalerInputSize), 0x13);
        assert_eq!(layout.offset(LayerReg::YCbCrScale2), 0x1a);
    }

    #[test]
    fn test_layout_for_revision() {
        assert_eq!(LayerLayout::for_revision(1), LayerLayout::Legacy);
        assert_eq!(LayerLayout::for_revision(2), LayerLayout::Current);
        assert_eq!(LayerLayout::for_revision(3), LayerLayout::Current);
    }

    #[test]
    fn test_polarity_mask() {
        assert_eq!(GlobalControl::POLARITY.bits(), 0xf000_0000);
    }
}
