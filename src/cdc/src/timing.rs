// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Display timing generator programming.

use crate::device::Cdc;
use crate::layer::Window;
use crate::regs::{self, GlobalControl, LayerReg};

/// Discrete timing of one display mode, in pixels and lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimingParams {
    pub h_sync: u16,
    pub h_back_porch: u16,
    pub h_width: u16,
    pub h_front_porch: u16,
    pub v_sync: u16,
    pub v_back_porch: u16,
    pub v_width: u16,
    pub v_front_porch: u16,
    pub neg_hsync: bool,
    pub neg_vsync: bool,
    pub neg_blank: bool,
    pub inv_clock: bool,
}

impl TimingParams {
    /// Polarity bits of the global CONTROL register.
    pub fn polarity(&self) -> GlobalControl {
        let mut mask = GlobalControl::empty();
        mask.set(GlobalControl::HSYNC, self.neg_hsync);
        mask.set(GlobalControl::VSYNC, self.neg_vsync);
        mask.set(GlobalControl::BLANK, self.neg_blank);
        mask.set(GlobalControl::CLK_POL, self.inv_clock);
        mask
    }
}

/// The four accumulated timing registers.
///
/// The horizontal accumulator lives in the high half and the vertical one
/// in the low half. Each stage is the previous one plus the packed
/// contribution of the stage, so a vertical overflow carries into the
/// horizontal half exactly as the hardware expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccumulatedTiming {
    pub sync_size: u32,
    pub back_porch: u32,
    pub active_width: u32,
    pub total_width: u32,
}

fn stage(h: u16, v: u16) -> u32 {
    (u32::from(h) << 16).wrapping_add(u32::from(v))
}

impl AccumulatedTiming {
    pub fn new(t: &TimingParams) -> Self {
        let sync_size = (u32::from(t.h_sync).wrapping_sub(1) << 16)
            .wrapping_add(u32::from(t.v_sync))
            .wrapping_sub(1);
        let back_porch = stage(t.h_back_porch, t.v_back_porch).wrapping_add(sync_size);
        let active_width = stage(t.h_width, t.v_width).wrapping_add(back_porch);
        let total_width = stage(t.h_front_porch, t.v_front_porch).wrapping_add(active_width);
        AccumulatedTiming {
            sync_size,
            back_porch,
            active_width,
            total_width,
        }
    }

    /// WINDOW_H value spanning the whole active area.
    pub fn window_h(&self) -> u32 {
        (self.active_width & 0xffff_0000) | (self.back_porch >> 16).wrapping_add(1)
    }

    /// WINDOW_V value spanning the whole active area.
    pub fn window_v(&self) -> u32 {
        ((self.active_width & 0xffff) << 16) | ((self.back_porch & 0xffff) + 1)
    }

    /// Line interrupt right after the last active line.
    pub fn line_irq_position(&self) -> u32 {
        (self.active_width & 0xffff) + 1
    }
}

impl Cdc {
    /// Programs a new display timing.
    ///
    /// Output is off while the registers change. Every layer is disabled
    /// and re-spanned over the full active area with an automatic pitch,
    /// then reloaded immediately. The output enable state is restored last.
    pub fn set_timing(&mut self, params: &TimingParams) {
        debug!("cdc: set_timing {:?}", params);
        let acc = AccumulatedTiming::new(params);

        self.write_enable(false);

        self.regs.write_global(regs::SYNC_SIZE, acc.sync_size);
        self.regs.write_global(regs::BACK_PORCH, acc.back_porch);
        self.regs.write_global(regs::ACTIVE_WIDTH, acc.active_width);
        self.regs.write_global(regs::TOTAL_WIDTH, acc.total_width);

        self.regs
            .write_global(regs::LINE_IRQ_POSITION, acc.line_irq_position());

        self.regs.update_global(
            regs::CONTROL,
            GlobalControl::POLARITY.bits(),
            params.polarity().bits(),
        );

        let full = Window {
            x: 0,
            y: 0,
            width: params.h_width,
            height: params.v_width,
        };
        for i in 0..self.layers.len() {
            let mut layer = self.layers[i].clone();
            layer.retime(full);
            let lengths = layer.respan_lengths(i, self.bus_width());

            self.regs
                .write_layer(i, LayerReg::Control, layer.control().bits());
            if layer.aux_control() != self.layers[i].aux_control() {
                self.regs
                    .write_layer(i, LayerReg::AuxFbControl, layer.aux_control().bits());
            }
            self.regs.write_layer(i, LayerReg::WindowH, acc.window_h());
            self.regs.write_layer(i, LayerReg::WindowV, acc.window_v());
            self.regs
                .write_layer(i, LayerReg::FbLines, u32::from(params.v_width));
            self.write_lengths(i, &lengths);
            self.layers[i] = layer;

            self.trigger_reload(false);
        }

        self.timing = Some(*params);
        self.write_enable(self.is_enabled());
    }

    /// Timing programmed by the last [`set_timing`](Self::set_timing).
    pub fn timing(&self) -> Option<TimingParams> {
        self.timing
    }
}
