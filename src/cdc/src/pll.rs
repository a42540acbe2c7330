// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Pixel clock source.

use std::sync::Arc;

use crate::bus::RegisterIo;
use crate::{Error, Result};

const PLL_REG_MODE: u32 = 0;
const PLL_REG_START: u32 = 2;
const PLL_REG_COUNT_N: u32 = 3;
const PLL_REG_COUNT_M: u32 = 4;
const PLL_REG_COUNT_C: u32 = 5;
const PLL_REG_BANDWIDTH: u32 = 8;
const PLL_REG_CHARGE_PUMP: u32 = 9;

pub const COUNTER_BYPASS: u32 = 1 << 16;
pub const COUNTER_ODD_DIVIDE: u32 = 1 << 17;

/// A clock the CRTC programs the pixel clock through.
pub trait ClockSource: Send {
    /// Current rate, in Hz.
    fn rate(&self) -> u64;
    /// The rate the clock would run at if asked for `rate`, or `None` if it
    /// cannot get close enough.
    fn round_rate(&self, rate: u64) -> Option<u64>;
    fn set_rate(&mut self, rate: u64) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PllConfig {
    pub rate: u64,
    pub count_m: u32,
    pub count_n: u32,
    pub count_c: u32,
    pub bandwidth: u32,
    pub charge_pump: u32,
}

/// Counter settings for a 50 MHz reference clock.
pub const PLL_CONFIGS: [PllConfig; 6] = [
    PllConfig {
        rate: 25_200_000,
        count_m: 0x201f | COUNTER_ODD_DIVIDE,
        count_n: 0x0302 | COUNTER_ODD_DIVIDE,
        count_c: 0x0d0c | COUNTER_ODD_DIVIDE,
        bandwidth: 0x7,
        charge_pump: 0x1,
    },
    PllConfig {
        rate: 40_000_000,
        count_m: 0x1010,
        count_n: 0x0302 | COUNTER_ODD_DIVIDE,
        count_c: 0x0404,
        bandwidth: 0x7,
        charge_pump: 0x1,
    },
    PllConfig {
        rate: 65_000_000,
        count_m: 0x0706 | COUNTER_ODD_DIVIDE,
        count_n: 0x0101,
        count_c: 0x0302,
        bandwidth: 0x7,
        charge_pump: 0x2,
    },
    PllConfig {
        rate: 108_000_000,
        count_m: 0x1b1b,
        count_n: 0x0302 | COUNTER_ODD_DIVIDE,
        count_c: 0x0302 | COUNTER_ODD_DIVIDE,
        bandwidth: 0x6,
        charge_pump: 0x1,
    },
    PllConfig {
        rate: 154_000_000,
        count_m: 0x2726 | COUNTER_ODD_DIVIDE,
        count_n: 0x0302 | COUNTER_ODD_DIVIDE,
        count_c: 0x0302 | COUNTER_ODD_DIVIDE,
        bandwidth: 0x4,
        charge_pump: 0x1,
    },
    PllConfig {
        rate: 172_780_000,
        count_m: 0x3d3c | COUNTER_ODD_DIVIDE,
        count_n: 0x0403 | COUNTER_ODD_DIVIDE,
        count_c: 0x0302 | COUNTER_ODD_DIVIDE,
        bandwidth: 0x4,
        charge_pump: 0x1,
    },
];

fn find_config(rate: u64) -> Option<&'static PllConfig> {
    PLL_CONFIGS.iter().find(|c| c.rate == rate)
}

/// Altera PLL, optionally behind a reconfiguration block.
pub struct AlteraPll {
    reconf: Option<Arc<dyn RegisterIo>>,
    rate: u64,
}

impl AlteraPll {
    /// A PLL locked at `rate`.
    pub fn fixed(rate: u64) -> Self {
        AlteraPll { reconf: None, rate }
    }

    /// A PLL whose counters can be rewritten through `io`.
    pub fn reconfigurable(io: Arc<dyn RegisterIo>, initial_rate: u64) -> Self {
        AlteraPll {
            reconf: Some(io),
            rate: initial_rate,
        }
    }

    pub fn is_reconfigurable(&self) -> bool {
        self.reconf.is_some()
    }
}

impl ClockSource for AlteraPll {
    fn rate(&self) -> u64 {
        self.rate
    }

    fn round_rate(&self, rate: u64) -> Option<u64> {
        if self.reconf.is_none() {
            return if rate == self.rate { Some(rate) } else { None };
        }
        find_config(rate).map(|c| c.rate)
    }

    fn set_rate(&mut self, rate: u64) -> Result<()> {
        let io = self.reconf.as_ref().ok_or(Error::ClockNotReconfigurable)?;
        let config = find_config(rate).ok_or(Error::ClockRate(rate))?;

        debug!("pll: setting up PLL to {} Hz", config.rate);
        io.write(PLL_REG_MODE, 0);
        io.write(PLL_REG_COUNT_M, config.count_m);
        io.write(PLL_REG_COUNT_N, config.count_n);
        io.write(PLL_REG_COUNT_C, config.count_c);
        io.write(PLL_REG_BANDWIDTH, config.bandwidth);
        io.write(PLL_REG_CHARGE_PUMP, config.charge_pump);
        io.write(PLL_REG_START, 1);

        self.rate = config.rate;
        Ok(())
    }
}
