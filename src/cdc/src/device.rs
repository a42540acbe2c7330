// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Device context of one controller and its global controls.

use std::sync::Arc;

use bitflags::bitflags;

use crate::bus::{RegisterIo, Registers};
use crate::config::CdcConfig;
use crate::layer::{Layer, Window};
use crate::regs::{self, GlobalControl, LayerConfig2, LayerLayout, LayerReg};
use crate::timing::TimingParams;
use crate::{Error, Result};

const CONFIG1_CONFIG_READING: u32 = 1 << 30;
const CONFIG1_SHADOW_REGS: u32 = 1 << 21;
const CONFIG2_BG_LAYER: u32 = 1 << 0;
const CONFIG2_SLAVE_TIMING: u32 = 1 << 1;

/// Layer blocks the driver addresses at most.
pub const MAX_LAYERS: u32 = 16;

const DUAL_PORT_SHIFT: u32 = 28;
const DUAL_PORT_MASK: u32 = 0x3000_0000;

/// Packed hardware revision as reported by HW_REVISION.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HwRevision {
    pub major: u8,
    pub minor: u8,
    pub revision: u8,
}

impl From<u32> for HwRevision {
    fn from(value: u32) -> Self {
        HwRevision {
            major: (value >> 16) as u8,
            minor: (value >> 8) as u8,
            revision: value as u8,
        }
    }
}

/// Synthesis options of the core, decoded from CONFIG1 and CONFIG2.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlobalConfig {
    pub revision: HwRevision,
    pub layer_count: usize,
    pub blind_mode: bool,
    pub configuration_reading: bool,
    pub status_registers: bool,
    pub dither_width_programmable: bool,
    pub sync_polarity_programmable: bool,
    pub irq_polarity_programmable: bool,
    pub timing_programmable: bool,
    pub line_irq_programmable: bool,
    pub background_blending: bool,
    pub background_color_programmable: bool,
    pub shadow_registers: bool,
    pub gamma_correction_technique: u8,
    pub dithering_technique: u8,
    pub precise_blending: bool,
    pub red_width: u8,
    pub green_width: u8,
    pub blue_width: u8,
    pub background_layer: bool,
    pub slave_timing_mode: bool,
    pub dual_view: bool,
    pub second_output: bool,
    /// Width of the memory bus, in bytes.
    pub bus_width: u32,
    pub external_control: bool,
}

fn bit(value: u32, shift: u32) -> bool {
    (value >> shift) & 1 != 0
}

impl GlobalConfig {
    pub fn decode(revision: HwRevision, layer_count: usize, config1: u32, config2: u32) -> Self {
        GlobalConfig {
            revision,
            layer_count,
            blind_mode: bit(config1, 31),
            configuration_reading: bit(config1, 30),
            status_registers: bit(config1, 29),
            dither_width_programmable: bit(config1, 28),
            sync_polarity_programmable: bit(config1, 27),
            irq_polarity_programmable: bit(config1, 26),
            timing_programmable: bit(config1, 25),
            line_irq_programmable: bit(config1, 24),
            background_blending: bit(config1, 23),
            background_color_programmable: bit(config1, 22),
            shadow_registers: bit(config1, 21),
            gamma_correction_technique: ((config1 >> 17) & 0x7) as u8,
            dithering_technique: ((config1 >> 14) & 0x3) as u8,
            precise_blending: bit(config1, 12),
            red_width: ((config1 >> 8) & 0xf) as u8,
            green_width: ((config1 >> 4) & 0xf) as u8,
            blue_width: (config1 & 0xf) as u8,
            background_layer: bit(config2, 0),
            slave_timing_mode: bit(config2, 1),
            dual_view: bit(config2, 2),
            second_output: bit(config2, 3),
            bus_width: bus_width(config2),
            external_control: bit(config2, 7),
        }
    }
}

// A floating bus reads as all ones, so the count is only trusted if every
// layer block fits the register window.
fn checked_layer_count(count: u32, words: Option<u32>) -> Result<usize> {
    if count == 0 {
        return Err(Error::NoLayers);
    }
    if count > MAX_LAYERS {
        return Err(Error::LayerCount(count));
    }
    if let Some(words) = words {
        if (count + 1) * regs::LAYER_SPAN > words {
            return Err(Error::LayerCount(count));
        }
    }
    Ok(count as usize)
}

fn bus_width(config2: u32) -> u32 {
    1 << ((config2 >> 4) & 7)
}

/// Snapshot of the scanout position and sync state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Status {
    pub x: u16,
    pub y: u16,
    pub hsync: bool,
    pub vsync: bool,
    pub hblank: bool,
    pub vblank: bool,
    pub low_frequency_mode: bool,
    pub external_sync_line: u16,
}

/// Addressing mode of the background layer mask RAM.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackgroundMode {
    Tiled32x16 = 0,
    Tiled16x32 = 1,
    Linear = 2,
}

bitflags! {
    /// Dual view bits of EXT_DISPLAY.
    pub struct DualView: u32 {
        const ENABLE = 1 << 20;
        const SUBPIXEL_MIXING = 1 << 21;
        const HALF_CLOCK_EVEN = 1 << 22;
        const HALF_CLOCK_ODD = 1 << 23;
        const HALF_CLOCK_SHIFT = 1 << 24;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DualPortMode {
    Off = 0,
    Clone = 1,
    Dual = 2,
}

/// One attached controller.
///
/// Owns the register bank and the in-memory mirror of every layer. All
/// mutation goes through `&mut self`, so holders serialize access the way
/// they see fit (the CRTC keeps it behind a mutex).
pub struct Cdc {
    pub(crate) regs: Registers,
    revision: HwRevision,
    config1: u32,
    config2: u32,
    shadow_regs: bool,
    bus_width: u32,
    enabled: bool,
    pub(crate) layers: Vec<Layer>,
    pub(crate) timing: Option<TimingParams>,
}

impl Cdc {
    /// Identifies the core behind `io` and puts it in its reset state.
    pub fn attach(io: Arc<dyn RegisterIo>, config: &CdcConfig) -> Result<Self> {
        config.validate()?;
        let revision = HwRevision::from(io.read(regs::HW_REVISION));
        let layout = config
            .layer_layout
            .unwrap_or_else(|| LayerLayout::for_revision(revision.major));
        let regs = Registers::new(io, layout);

        let config1 = regs.read_global(regs::CONFIG1);
        let config2 = regs.read_global(regs::CONFIG2);
        let (count, shadow_regs) = if config1 & CONFIG1_CONFIG_READING != 0 {
            (
                regs.read_global(regs::LAYER_COUNT),
                config1 & CONFIG1_SHADOW_REGS != 0,
            )
        } else {
            // Without configuration reading only the minimal core can be assumed.
            (1, false)
        };
        let layer_count = checked_layer_count(count, regs.words())?;

        let layers = (0..layer_count)
            .map(|i| {
                Layer::new(
                    regs.read_layer(i, LayerReg::Config1),
                    LayerConfig2::from_bits_truncate(regs.read_layer(i, LayerReg::Config2)),
                )
            })
            .collect();

        let mut cdc = Cdc {
            regs,
            revision,
            config1,
            config2,
            shadow_regs,
            bus_width: bus_width(config2),
            enabled: false,
            layers,
            timing: None,
        };
        info!(
            "cdc: revision {}.{}.{}, {} layer(s), {:?} layout, {} byte bus, shadow registers: {}",
            revision.major,
            revision.minor,
            revision.revision,
            layer_count,
            layout,
            cdc.bus_width,
            shadow_regs
        );

        cdc.reset_registers();

        cdc.regs.write_global(regs::IRQ_ENABLE, 0);
        cdc.regs.write_global(regs::IRQ_CLEAR, regs::IRQ_CLEAR_ALL);

        Ok(cdc)
    }

    /// Masks all interrupts and turns the output off. Only for a device
    /// that no interrupt dispatcher was attached to.
    pub fn detach(mut self) {
        debug!("cdc: detach");
        self.regs.write_global(regs::IRQ_ENABLE, 0);
        self.set_enabled(false);
    }

    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    pub fn revision(&self) -> HwRevision {
        self.revision
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn has_shadow_registers(&self) -> bool {
        self.shadow_regs
    }

    /// Width of the memory bus, in bytes.
    pub fn bus_width(&self) -> u32 {
        self.bus_width
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn check_layer(&self, layer: usize) -> Result<()> {
        if layer >= self.layers.len() {
            return Err(Error::InvalidLayer {
                layer,
                count: self.layers.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn write_enable(&self, enable: bool) {
        let set = if enable {
            GlobalControl::ENABLE.bits()
        } else {
            0
        };
        self.regs
            .update_global(regs::CONTROL, GlobalControl::ENABLE.bits(), set);
    }

    /// Records and applies the output enable state.
    pub fn set_enabled(&mut self, enable: bool) {
        debug!("cdc: set_enabled {}", enable);
        self.enabled = enable;
        self.write_enable(enable);
    }

    fn update_global_control(&self, flag: GlobalControl, enable: bool) {
        let set = if enable { flag.bits() } else { 0 };
        self.regs.update_global(regs::CONTROL, flag.bits(), set);
    }

    pub fn set_background_color(&self, argb: u32) {
        self.regs.write_global(regs::BG_COLOR, argb);
    }

    fn require(&self, cap: u32, name: &'static str) -> Result<()> {
        if self.config2 & cap == 0 {
            return Err(Error::MissingCapability(name));
        }
        Ok(())
    }

    /// Writes `data` into the background layer mask RAM from word `start` on.
    pub fn upload_background_layer(&self, start: u32, data: &[u32]) -> Result<()> {
        self.require(CONFIG2_BG_LAYER, "background layer")?;
        self.regs.write_global(regs::BG_LAYER_ADDR, start);
        for word in data {
            self.regs.write_global(regs::BG_LAYER_DATA, *word);
        }
        Ok(())
    }

    pub fn configure_background_layer(
        &self,
        mode: BackgroundMode,
        base: u16,
        inc_x: i16,
        inc_y: i16,
    ) -> Result<()> {
        self.require(CONFIG2_BG_LAYER, "background layer")?;
        self.regs
            .write_global(regs::BG_LAYER_BASE, ((mode as u32) << 24) | u32::from(base));
        self.regs.write_global(
            regs::BG_LAYER_INC,
            (u32::from(inc_x as u16) << 16) | u32::from(inc_y as u16),
        );
        Ok(())
    }

    pub fn set_background_layer_enabled(&self, enable: bool) -> Result<()> {
        self.require(CONFIG2_BG_LAYER, "background layer")?;
        self.update_global_control(GlobalControl::BACKGROUND_LAYER, enable);
        Ok(())
    }

    pub fn set_dither_enabled(&self, enable: bool) {
        self.update_global_control(GlobalControl::DITHERING, enable);
    }

    pub fn set_slave_timing_enabled(&self, enable: bool) -> Result<()> {
        self.require(CONFIG2_SLAVE_TIMING, "slave timing")?;
        self.update_global_control(GlobalControl::SLAVE_TIMING, enable);
        Ok(())
    }

    pub fn set_dual_view(&self, view: DualView) {
        self.regs
            .update_global(regs::EXT_DISPLAY, DualView::all().bits(), view.bits());
    }

    pub fn set_dual_port(&self, mode: DualPortMode) {
        self.regs.update_global(
            regs::EXT_DISPLAY,
            DUAL_PORT_MASK,
            (mode as u32) << DUAL_PORT_SHIFT,
        );
    }

    /// Moves the line interrupt to `line`, counted from the first active line.
    pub fn set_scanline_irq_position(&self, line: u16) {
        let back_porch = self.regs.read_global(regs::BACK_PORCH) & 0xffff;
        self.regs.write_global(
            regs::LINE_IRQ_POSITION,
            u32::from(line).wrapping_add(back_porch),
        );
    }

    pub fn status(&self) -> Status {
        let position = self.regs.read_global(regs::POSITION);
        let sync = self.regs.read_global(regs::SYNC_STATUS);
        let slave = self.regs.read_global(regs::SLAVE_TIMING_STATUS);
        Status {
            x: (position >> 16) as u16,
            y: position as u16,
            hsync: bit(sync, 3),
            vsync: bit(sync, 2),
            hblank: bit(sync, 1),
            vblank: bit(sync, 0),
            low_frequency_mode: bit(slave, 16),
            external_sync_line: slave as u16,
        }
    }

    pub fn global_config(&self) -> GlobalConfig {
        GlobalConfig::decode(self.revision, self.layers.len(), self.config1, self.config2)
    }

    /// Puts every register but the CLUT and the background RAM in its reset
    /// state. The timing registers and IRQ_ENABLE, which belongs to the
    /// interrupt dispatcher, are left alone.
    pub fn reset_registers(&mut self) {
        let control = self.regs.read_global(regs::CONTROL) & GlobalControl::POLARITY.bits();
        self.regs.write_global(regs::CONTROL, control);
        self.regs.write_global(regs::BG_COLOR, 0);

        let back_porch = self.regs.read_global(regs::BACK_PORCH);
        let active = self.regs.read_global(regs::ACTIVE_WIDTH);
        let (h_bp, v_bp) = (back_porch >> 16, back_porch & 0xffff);
        let (h_active, v_active) = (active >> 16, active & 0xffff);

        self.regs
            .write_global(regs::LINE_IRQ_POSITION, v_active.wrapping_add(1));
        self.regs.write_global(regs::EXT_DISPLAY, 0);

        let full = Window {
            x: 0,
            y: 0,
            width: h_active.wrapping_sub(h_bp) as u16,
            height: v_active.wrapping_sub(v_bp) as u16,
        };
        let window_h = (h_active << 16) | h_bp.wrapping_add(1);
        let window_v = (v_active << 16) | v_bp.wrapping_add(1);

        for i in 0..self.layers.len() {
            let mut layer = self.layers[i].clone();
            layer.reset(full);
            let lengths = layer.respan_lengths(i, self.bus_width);

            self.regs.write_layer(i, LayerReg::Control, 0);
            self.regs.write_layer(i, LayerReg::WindowH, window_h);
            self.regs.write_layer(i, LayerReg::WindowV, window_v);
            self.regs.write_layer(i, LayerReg::ColorKey, 0);
            self.regs.write_layer(i, LayerReg::PixelFormat, 0);
            self.regs.write_layer(i, LayerReg::Alpha, 0xff);
            self.regs.write_layer(i, LayerReg::Color, 0);
            self.regs
                .write_layer(i, LayerReg::Blending, regs::BLENDING_RESET);
            self.regs.write_layer(i, LayerReg::AuxFbControl, 0);
            self.regs.write_layer(i, LayerReg::FbStart, 0);
            self.regs
                .write_layer(i, LayerReg::FbLines, u32::from(full.height));
            self.regs.write_layer(i, LayerReg::AuxFbStart, 0);

            self.write_lengths(i, &lengths);
            self.layers[i] = layer;
        }

        if self.shadow_regs {
            self.regs.write_global(regs::SHADOW_RELOAD, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{attach, sim_registers};

    #[test]
    fn test_attach() {
        crate::init_logger();
        let mem = sim_registers(3, true);
        let cdc = attach(&mem);

        assert_eq!(cdc.layer_count(), 3);
        assert!(cdc.has_shadow_registers());
        assert_eq!(cdc.bus_width(), 8);
        assert_eq!(cdc.revision().major, 2);
        assert_eq!(cdc.registers().layout(), LayerLayout::Current);
        assert!(!cdc.is_enabled());

        assert_eq!(mem.writes_to(regs::IRQ_ENABLE).last(), Some(&0));
        assert_eq!(mem.writes_to(regs::IRQ_CLEAR), vec![0xff]);
        assert_eq!(mem.writes_to(regs::SHADOW_RELOAD), vec![1]);
        let layout = LayerLayout::Current;
        for i in 0..3 {
            assert_eq!(mem.peek(layout.index(i, LayerReg::Alpha)), 0xff);
            assert_eq!(
                mem.peek(layout.index(i, LayerReg::Blending)),
                regs::BLENDING_RESET
            );
        }
    }

    #[test]
    fn test_attach_without_config_reading() {
        let mem = sim_registers(4, true);
        mem.poke(regs::CONFIG1, 0);
        mem.poke(regs::HW_REVISION, 0x0001_0000);

        let cdc = attach(&mem);
        assert_eq!(cdc.layer_count(), 1);
        assert!(!cdc.has_shadow_registers());
        assert_eq!(cdc.registers().layout(), LayerLayout::Legacy);
        assert!(mem.writes_to(regs::SHADOW_RELOAD).is_empty());
    }

    #[test]
    fn test_attach_no_layers() {
        let mem = sim_registers(0, false);
        match Cdc::attach(mem, &CdcConfig::default()) {
            Err(Error::NoLayers) => (),
            _ => panic!("attach must fail without layers"),
        }
    }

    #[test]
    fn test_attach_rejects_bogus_layer_count() {
        let mem = sim_registers(2, false);
        mem.poke(regs::LAYER_COUNT, 0xffff_ffff);
        assert!(matches!(
            Cdc::attach(mem.clone(), &CdcConfig::default()),
            Err(Error::LayerCount(0xffff_ffff))
        ));

        // More layers than the register window maps.
        mem.poke(regs::LAYER_COUNT, 3);
        assert!(matches!(
            Cdc::attach(mem.clone(), &CdcConfig::default()),
            Err(Error::LayerCount(3))
        ));

        mem.poke(regs::LAYER_COUNT, 2);
        assert_eq!(attach(&mem).layer_count(), 2);

        assert_eq!(checked_layer_count(MAX_LAYERS, None).unwrap(), 16);
        assert!(checked_layer_count(MAX_LAYERS + 1, None).is_err());
    }

    #[test]
    fn test_global_and_layer_controls() {
        let mem = sim_registers(1, false);
        let mut cdc = attach(&mem);
        cdc.set_enabled(true);
        cdc.set_dither_enabled(true);
        cdc.set_layer_enabled(0, true).unwrap();

        let layer_control = cdc.registers().layout().index(0, LayerReg::Control);
        assert_eq!(mem.peek(regs::CONTROL), (1 << 16) | 1);
        assert_eq!(mem.peek(layer_control), 1);

        cdc.set_dither_enabled(false);
        assert_eq!(mem.peek(regs::CONTROL), 1);
        assert_eq!(mem.peek(layer_control), 1);
        assert!(matches!(
            cdc.set_slave_timing_enabled(true),
            Err(Error::MissingCapability(_))
        ));
        assert_eq!(mem.peek(regs::CONTROL), 1);
    }

    #[test]
    fn test_reset_keeps_polarity() {
        let mem = sim_registers(1, false);
        mem.poke(regs::CONTROL, 0xf001_0001);
        mem.poke(regs::BACK_PORCH, (10 << 16) | 5);
        mem.poke(regs::ACTIVE_WIDTH, (810 << 16) | 605);

        let cdc = attach(&mem);
        assert_eq!(mem.peek(regs::CONTROL), 0xf000_0000);
        assert_eq!(mem.peek(regs::LINE_IRQ_POSITION), 606);

        let layout = cdc.registers().layout();
        assert_eq!(mem.peek(layout.index(0, LayerReg::WindowH)), (810 << 16) | 11);
        assert_eq!(mem.peek(layout.index(0, LayerReg::WindowV)), (605 << 16) | 6);
        assert_eq!(mem.peek(layout.index(0, LayerReg::FbLines)), 600);
        // 800 pixels of ARGB8888 on an 8 byte bus.
        assert_eq!(
            mem.peek(layout.index(0, LayerReg::FbLength)),
            (3200 << 16) | (3200 + 7)
        );
    }

    #[test]
    fn test_detach() {
        let mem = sim_registers(1, false);
        let mut cdc = attach(&mem);
        cdc.set_enabled(true);
        assert_eq!(mem.peek(regs::CONTROL) & 1, 1);

        mem.clear_writes();
        cdc.detach();
        assert_eq!(mem.writes_to(regs::IRQ_ENABLE), vec![0]);
        assert_eq!(mem.peek(regs::CONTROL) & 1, 0);
    }

    #[test]
    fn test_background_layer() {
        let mem = sim_registers(1, false);
        let cdc = attach(&mem);
        match cdc.set_background_layer_enabled(true) {
            Err(Error::MissingCapability(_)) => (),
            _ => panic!("background layer is not available"),
        }

        mem.poke(regs::CONFIG2, mem.peek(regs::CONFIG2) | CONFIG2_BG_LAYER);
        let cdc = attach(&mem);
        mem.clear_writes();
        cdc.upload_background_layer(4, &[1, 2, 3]).unwrap();
        cdc.configure_background_layer(BackgroundMode::Linear, 0x20, -1, 2)
            .unwrap();
        cdc.set_background_layer_enabled(true).unwrap();

        assert_eq!(mem.writes_to(regs::BG_LAYER_ADDR), vec![4]);
        assert_eq!(mem.writes_to(regs::BG_LAYER_DATA), vec![1, 2, 3]);
        assert_eq!(mem.peek(regs::BG_LAYER_BASE), (2 << 24) | 0x20);
        assert_eq!(mem.peek(regs::BG_LAYER_INC), 0xffff_0002);
        assert_ne!(mem.peek(regs::CONTROL) & (1 << 17), 0);
    }

    #[test]
    fn test_ext_display() {
        let mem = sim_registers(1, false);
        let cdc = attach(&mem);
        mem.poke(regs::EXT_DISPLAY, 0x0000_00ff);

        cdc.set_dual_view(DualView::ENABLE | DualView::HALF_CLOCK_SHIFT);
        cdc.set_dual_port(DualPortMode::Dual);
        assert_eq!(mem.peek(regs::EXT_DISPLAY), 0x2110_00ff);

        cdc.set_dual_view(DualView::empty());
        cdc.set_dual_port(DualPortMode::Clone);
        assert_eq!(mem.peek(regs::EXT_DISPLAY), 0x1000_00ff);
    }

    #[test]
    fn test_status_and_config() {
        let mem = sim_registers(2, true);
        let cdc = attach(&mem);
        mem.poke(regs::POSITION, (100 << 16) | 20);
        mem.poke(regs::SYNC_STATUS, 0b1001);
        mem.poke(regs::SLAVE_TIMING_STATUS, (1 << 16) | 0xffff);

        let status = cdc.status();
        assert_eq!((status.x, status.y), (100, 20));
        assert!(status.hsync && status.vblank);
        assert!(!status.vsync && !status.hblank);
        assert!(status.low_frequency_mode);
        assert_eq!(status.external_sync_line, 0xffff);

        let config = cdc.global_config();
        assert_eq!(config.layer_count, 2);
        assert!(config.configuration_reading);
        assert!(config.shadow_registers);
        assert!(!config.blind_mode);
        assert_eq!(config.bus_width, 8);
    }

    #[test]
    fn test_scanline_irq_position() {
        let mem = sim_registers(1, false);
        let cdc = attach(&mem);
        mem.poke(regs::BACK_PORCH, (40 << 16) | 25);
        cdc.set_scanline_irq_position(600);
        assert_eq!(mem.peek(regs::LINE_IRQ_POSITION), 625);
    }

    #[test]
    fn test_invalid_layer() {
        let mem = sim_registers(2, false);
        let cdc = attach(&mem);
        assert!(cdc.check_layer(1).is_ok());
        match cdc.check_layer(2) {
            Err(Error::InvalidLayer { layer: 2, count: 2 }) => (),
            _ => panic!("layer 2 does not exist"),
        }
    }
}
