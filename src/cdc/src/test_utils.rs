// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::Receiver;

use crate::bus::MemoryRegisters;
use crate::config::CdcConfig;
use crate::crtc::Crtc;
use crate::deswizzle::{Deswizzle, DeswizzleMode, SharedDeswizzler};
use crate::device::Cdc;
use crate::flip::{ClientId, FlipNotification, PageFlipCoordinator, VblankControl};
use crate::irq::{IrqDispatcher, IrqEvent};
use crate::pll::AlteraPll;
use crate::regs::{self, LayerLayout, LayerReg};

/// Builds a register file for a revision 2 core with `layers` layers and an
/// 8 byte memory bus.
pub fn sim_registers(layers: u32, shadow: bool) -> Arc<MemoryRegisters> {
    let mem = Arc::new(MemoryRegisters::new(regs::LAYER_SPAN * (layers + 1)));
    mem.poke(regs::HW_REVISION, 0x0002_0100);
    let shadow_bit = if shadow { 1 << 21 } else { 0 };
    mem.poke(regs::CONFIG1, (1 << 30) | shadow_bit);
    mem.poke(regs::CONFIG2, 3 << 4);
    mem.poke(regs::LAYER_COUNT, layers);
    mem
}

pub fn attach(mem: &Arc<MemoryRegisters>) -> Cdc {
    Cdc::attach(mem.clone(), &CdcConfig::default()).unwrap()
}

/// Host vblank bookkeeping that counts every call.
#[derive(Default)]
pub struct MockVblank {
    pub refs: AtomicUsize,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
    pub handled: AtomicUsize,
    pub waits: AtomicUsize,
    pub on: AtomicBool,
    pub refuse: AtomicBool,
}

impl VblankControl for MockVblank {
    fn get(&self) -> bool {
        if self.refuse.load(Ordering::SeqCst) {
            return false;
        }
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.refs.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn put(&self) {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.refs.fetch_sub(1, Ordering::SeqCst);
    }

    fn handle(&self) {
        self.handled.fetch_add(1, Ordering::SeqCst);
    }

    fn on(&self) {
        self.on.store(true, Ordering::SeqCst);
    }

    fn off(&self) {
        self.on.store(false, Ordering::SeqCst);
    }

    fn wait_one(&self) {
        self.waits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Flip notification that counts its deliveries.
pub struct MockNotification {
    pub owner: ClientId,
    pub delivered: Arc<AtomicUsize>,
}

impl MockNotification {
    pub fn new(owner: u64) -> (Box<Self>, Arc<AtomicUsize>) {
        let delivered = Arc::new(AtomicUsize::new(0));
        let notification = Box::new(MockNotification {
            owner: ClientId(owner),
            delivered: delivered.clone(),
        });
        (notification, delivered)
    }
}

impl FlipNotification for MockNotification {
    fn owner(&self) -> ClientId {
        self.owner
    }

    fn complete(self: Box<Self>) {
        self.delivered.fetch_add(1, Ordering::SeqCst);
    }
}

/// Deswizzler that only records what was asked of it.
#[derive(Default)]
pub struct MockDeswizzler {
    pub calls: Mutex<Vec<&'static str>>,
}

impl MockDeswizzler {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: &'static str) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

impl Deswizzle for MockDeswizzler {
    fn set_mode(&mut self, _mode: DeswizzleMode) {
        self.record("set_mode");
    }

    fn set_fb_addr(&mut self, _addr: u32) {
        self.record("set_fb_addr");
    }

    fn set_fb_config(&mut self, _width: u16, _height: u16, _pitch: u32, _bpp: u8) {
        self.record("set_fb_config");
    }

    fn trigger(&mut self) {
        self.record("trigger");
    }

    fn retrigger(&mut self) {
        self.record("retrigger");
    }

    fn stop(&mut self) {
        self.record("stop");
    }

    fn handle_irq(&mut self) {
        self.record("handle_irq");
    }

    fn detach(&mut self) {
        self.record("detach");
    }
}

/// A CRTC on a two layer core with shadow registers, a reconfigurable PLL
/// and a recording deswizzler.
pub struct CrtcFixture {
    pub mem: Arc<MemoryRegisters>,
    pub pll: Arc<MemoryRegisters>,
    pub vblank: Arc<MockVblank>,
    pub dswz: Arc<Mutex<MockDeswizzler>>,
    pub flip: Arc<PageFlipCoordinator>,
    pub irq: Arc<IrqDispatcher>,
    pub crtc: Arc<Crtc>,
    pub events: Receiver<IrqEvent>,
}

impl CrtcFixture {
    pub fn new(config: CdcConfig) -> Self {
        let mem = sim_registers(2, true);
        let cdc = attach(&mem);
        let pll = Arc::new(MemoryRegisters::new(16));
        let clock = AlteraPll::reconfigurable(pll.clone(), 25_200_000);
        let (irq, events) = IrqDispatcher::new(cdc.registers().clone(), 8);
        let irq = Arc::new(irq);
        let vblank = Arc::new(MockVblank::default());
        let flip = Arc::new(PageFlipCoordinator::new(vblank.clone()));
        let dswz = Arc::new(Mutex::new(MockDeswizzler::default()));
        let shared: SharedDeswizzler = dswz.clone();
        let crtc = Arc::new(Crtc::new(
            cdc,
            Box::new(clock),
            irq.clone(),
            flip.clone(),
            vblank.clone(),
            Some(shared),
            config,
        ));
        CrtcFixture {
            mem,
            pll,
            vblank,
            dswz,
            flip,
            irq,
            crtc,
            events,
        }
    }

    pub fn deswizzler_calls(&self) -> Vec<&'static str> {
        self.dswz
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calls()
    }

    pub fn index(&self, layer: usize, reg: LayerReg) -> u32 {
        LayerLayout::Current.index(layer, reg)
    }
}
