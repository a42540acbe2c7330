// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Raw access to memory-mapped register banks.

use std::ptr::{self, NonNull};
use std::sync::{Arc, Mutex, PoisonError};

use utils::byte_order::{read_le_u32, write_le_u32};

use crate::regs::{LayerLayout, LayerReg};

/// A bank of 32 bit registers addressed by word index.
///
/// Accesses never fail: a faulting access is a host-level condition that
/// this crate cannot recover from.
pub trait RegisterIo: Send + Sync {
    fn read(&self, index: u32) -> u32;
    fn write(&self, index: u32, value: u32);

    /// Size of the bank in words, when known.
    fn words(&self) -> Option<u32> {
        None
    }
}

/// Global and per-layer accessors on top of a [`RegisterIo`].
#[derive(Clone)]
pub struct Registers {
    io: Arc<dyn RegisterIo>,
    layout: LayerLayout,
}

impl Registers {
    pub fn new(io: Arc<dyn RegisterIo>, layout: LayerLayout) -> Self {
        Self { io, layout }
    }

    pub fn layout(&self) -> LayerLayout {
        self.layout
    }

    pub fn words(&self) -> Option<u32> {
        self.io.words()
    }

    pub fn read_global(&self, reg: u32) -> u32 {
        self.io.read(reg)
    }

    pub fn write_global(&self, reg: u32, value: u32) {
        self.io.write(reg, value)
    }

    /// Read-modify-write of a global register: clears `clear`, then sets `set`.
    pub fn update_global(&self, reg: u32, clear: u32, set: u32) {
        let value = self.io.read(reg);
        self.io.write(reg, (value & !clear) | set);
    }

    pub fn read_layer(&self, layer: usize, reg: LayerReg) -> u32 {
        self.io.read(self.layout.index(layer, reg))
    }

    pub fn write_layer(&self, layer: usize, reg: LayerReg, value: u32) {
        self.io.write(self.layout.index(layer, reg), value)
    }
}

/// A register window mapped into the address space.
pub struct MmioRegion {
    base: NonNull<u32>,
    // Size of the window, in words.
    len: u32,
}

// SAFETY: the region only performs volatile word accesses, the device
// serializes concurrent accesses itself.
unsafe impl Send for MmioRegion {}
unsafe impl Sync for MmioRegion {}

impl MmioRegion {
    /// Wraps a mapped register window of `len` words.
    ///
    /// # Safety
    ///
    /// `base` must point to a device mapping that stays valid and
    /// word-aligned for `len` words during the whole life of the region.
    pub unsafe fn new(base: *mut u32, len: u32) -> Option<Self> {
        NonNull::new(base).map(|base| Self { base, len })
    }
}

impl RegisterIo for MmioRegion {
    fn read(&self, index: u32) -> u32 {
        if index >= self.len {
            warn!("cdc: read outside the register window: {:#x}", index);
            return 0;
        }
        // SAFETY: index is inside the mapping promised to `new`.
        unsafe { ptr::read_volatile(self.base.as_ptr().add(index as usize)) }
    }

    fn write(&self, index: u32, value: u32) {
        if index >= self.len {
            warn!("cdc: write outside the register window: {:#x}", index);
            return;
        }
        // SAFETY: index is inside the mapping promised to `new`.
        unsafe { ptr::write_volatile(self.base.as_ptr().add(index as usize), value) }
    }

    fn words(&self) -> Option<u32> {
        Some(self.len)
    }
}

/// A register file held in memory.
///
/// Stands in for a device when simulating the controller. Every access
/// through [`RegisterIo::write`] is journaled, while [`poke`](Self::poke)
/// models the device changing a register behind the driver's back.
pub struct MemoryRegisters {
    mem: Mutex<Vec<u8>>,
    journal: Mutex<Vec<(u32, u32)>>,
}

impl MemoryRegisters {
    pub fn new(words: u32) -> Self {
        Self {
            mem: Mutex::new(vec![0; words as usize * 4]),
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Reads a register without going through the driver view.
    pub fn peek(&self, index: u32) -> u32 {
        let mem = self.mem.lock().unwrap_or_else(PoisonError::into_inner);
        match mem.get(index as usize * 4..) {
            Some(bytes) if !bytes.is_empty() => read_le_u32(bytes),
            _ => 0,
        }
    }

    /// Sets a register as the device would, without journaling it.
    pub fn poke(&self, index: u32, value: u32) {
        let mut mem = self.mem.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bytes) = mem.get_mut(index as usize * 4..) {
            write_le_u32(bytes, value);
        }
    }

    /// All journaled writes, oldest first.
    pub fn writes(&self) -> Vec<(u32, u32)> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Journaled values written to one register, oldest first.
    pub fn writes_to(&self, index: u32) -> Vec<u32> {
        self.writes()
            .into_iter()
            .filter(|(i, _)| *i == index)
            .map(|(_, v)| v)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl RegisterIo for MemoryRegisters {
    fn read(&self, index: u32) -> u32 {
        self.peek(index)
    }

    fn write(&self, index: u32, value: u32) {
        self.poke(index, value);
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((index, value));
    }

    fn words(&self) -> Option<u32> {
        let len = self.mem.lock().unwrap_or_else(PoisonError::into_inner).len();
        Some((len / 4) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::{CONTROL, LAYER_SPAN};

    #[test]
    fn test_memory_registers() {
        let mem = MemoryRegisters::new(4);
        mem.write(1, 0x1234_5678);
        mem.poke(2, 0xff);

        assert_eq!(mem.read(1), 0x1234_5678);
        assert_eq!(mem.read(2), 0xff);
        assert_eq!(mem.writes(), vec![(1, 0x1234_5678)]);
        assert_eq!(mem.words(), Some(4));

        // Outside of the file.
        mem.write(9, 1);
        assert_eq!(mem.read(9), 0);

        mem.clear_writes();
        assert!(mem.writes().is_empty());
    }

    #[test]
    fn test_layer_addressing() {
        let mem = Arc::new(MemoryRegisters::new(LAYER_SPAN * 3));
        let regs = Registers::new(mem.clone(), LayerLayout::Current);

        regs.write_layer(1, LayerReg::Control, 0x1);
        assert_eq!(mem.peek(2 * LAYER_SPAN + 3), 0x1);
        assert_eq!(regs.read_layer(1, LayerReg::Control), 0x1);

        regs.write_global(CONTROL, 0xf000_0001);
        regs.update_global(CONTROL, 0x1, 0x10);
        assert_eq!(mem.peek(CONTROL), 0xf000_0010);
    }

    #[test]
    fn test_mmio_region() {
        let mut backing = [0u32; 4];
        let region = unsafe { MmioRegion::new(backing.as_mut_ptr(), 4) }.unwrap();

        region.write(3, 0xcafe);
        region.write(4, 0xdead);
        assert_eq!(region.read(3), 0xcafe);
        assert_eq!(region.read(4), 0);
        assert_eq!(region.words(), Some(4));
        drop(region);
        assert_eq!(backing[3], 0xcafe);
    }
}
