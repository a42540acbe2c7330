// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shadow register reloads.
//!
//! On cores with shadow registers, layer and timing writes are staged and
//! only become visible on a reload request. The request is consumed by the
//! hardware, so SHADOW_RELOAD reads back non-zero while it is outstanding.

use crate::device::Cdc;
use crate::regs;

const RELOAD_IMMEDIATE: u32 = 1;
const RELOAD_VBLANK: u32 = 2;

impl Cdc {
    /// Requests a shadow reload, immediately or at the next vertical blank.
    ///
    /// Returns false without touching the hardware on cores without shadow
    /// registers, where writes take effect right away.
    pub fn trigger_reload(&self, in_vblank: bool) -> bool {
        if !self.has_shadow_registers() {
            return false;
        }
        let request = if in_vblank {
            RELOAD_VBLANK
        } else {
            RELOAD_IMMEDIATE
        };
        self.regs.write_global(regs::SHADOW_RELOAD, request);
        true
    }

    pub fn is_reload_pending(&self) -> bool {
        self.has_shadow_registers() && self.regs.read_global(regs::SHADOW_RELOAD) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{attach, sim_registers};

    #[test]
    fn test_reload_without_shadow_registers() {
        let mem = sim_registers(2, false);
        let cdc = attach(&mem);
        mem.clear_writes();

        assert!(!cdc.trigger_reload(false));
        assert!(!cdc.trigger_reload(true));
        assert!(mem.writes().is_empty());

        mem.poke(regs::SHADOW_RELOAD, 1);
        assert!(!cdc.is_reload_pending());
    }

    #[test]
    fn test_reload_requests() {
        let mem = sim_registers(2, true);
        let cdc = attach(&mem);
        mem.clear_writes();

        assert!(cdc.trigger_reload(true));
        assert!(cdc.is_reload_pending());
        assert!(cdc.trigger_reload(false));
        assert_eq!(mem.writes_to(regs::SHADOW_RELOAD), vec![2, 1]);

        // The hardware consumed the request.
        mem.poke(regs::SHADOW_RELOAD, 0);
        assert!(!cdc.is_reload_pending());
    }
}
