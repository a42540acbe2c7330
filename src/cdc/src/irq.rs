// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Interrupt decoding.
//!
//! [`IrqDispatcher::handle`] is meant to run in interrupt context: it reads
//! and acknowledges the status word, mutes the sources that would flood and
//! queues one [`IrqEvent`] per fired source. Everything else happens in the
//! consumer of the queue (see [`crate::worker::IrqWorker`]).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use bitflags::bitflags;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::bus::Registers;
use crate::regs;

bitflags! {
    /// Interrupt sources, as laid out in IRQ_ENABLE / IRQ_STATUS / IRQ_CLEAR.
    pub struct IrqMask: u32 {
        const LINE = 0x01;
        const FIFO_UNDERRUN_WARN = 0x02;
        const BUS_ERROR = 0x04;
        const RELOAD = 0x08;
        const SLAVE_TIMING_NO_SIGNAL = 0x10;
        const SLAVE_TIMING_NO_SYNC = 0x20;
        const FIFO_UNDERRUN = 0x40;
        const CRC_ERROR = 0x80;

        /// Sources that turn themselves off when they fire.
        const SELF_MUTING = Self::FIFO_UNDERRUN.bits
            | Self::FIFO_UNDERRUN_WARN.bits
            | Self::CRC_ERROR.bits;
        /// Sources armed while the CRTC is on.
        const CRTC = Self::SELF_MUTING.bits | Self::LINE.bits;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IrqEvent {
    Line,
    FifoUnderrunWarn,
    BusError,
    Reload,
    SlaveTimingNoSignal,
    SlaveTimingNoSync,
    FifoUnderrun,
    CrcError,
}

impl IrqEvent {
    /// All events in status bit order.
    pub const ALL: [IrqEvent; 8] = [
        IrqEvent::Line,
        IrqEvent::FifoUnderrunWarn,
        IrqEvent::BusError,
        IrqEvent::Reload,
        IrqEvent::SlaveTimingNoSignal,
        IrqEvent::SlaveTimingNoSync,
        IrqEvent::FifoUnderrun,
        IrqEvent::CrcError,
    ];

    pub fn mask(self) -> IrqMask {
        match self {
            IrqEvent::Line => IrqMask::LINE,
            IrqEvent::FifoUnderrunWarn => IrqMask::FIFO_UNDERRUN_WARN,
            IrqEvent::BusError => IrqMask::BUS_ERROR,
            IrqEvent::Reload => IrqMask::RELOAD,
            IrqEvent::SlaveTimingNoSignal => IrqMask::SLAVE_TIMING_NO_SIGNAL,
            IrqEvent::SlaveTimingNoSync => IrqMask::SLAVE_TIMING_NO_SYNC,
            IrqEvent::FifoUnderrun => IrqMask::FIFO_UNDERRUN,
            IrqEvent::CrcError => IrqMask::CRC_ERROR,
        }
    }

    pub fn is_self_muting(self) -> bool {
        IrqMask::SELF_MUTING.contains(self.mask())
    }

    /// Log line of a hardware condition event.
    pub fn description(self) -> &'static str {
        match self {
            IrqEvent::Line => "line",
            IrqEvent::FifoUnderrunWarn => "FIFO underrun warn",
            IrqEvent::BusError => "BUS error IRQ triggered",
            IrqEvent::Reload => "shadow reload",
            IrqEvent::SlaveTimingNoSignal => "SLAVE no signal",
            IrqEvent::SlaveTimingNoSync => "SLAVE no sync",
            IrqEvent::FifoUnderrun => "FIFO underrun",
            IrqEvent::CrcError => "CRC error",
        }
    }
}

pub struct IrqDispatcher {
    regs: Registers,
    // Mirror of IRQ_ENABLE, the lock also orders the read-modify-write of
    // the register between the interrupt path and the CRTC.
    enabled: Mutex<IrqMask>,
    sender: Sender<IrqEvent>,
    dropped: AtomicU64,
}

impl IrqDispatcher {
    /// Creates a dispatcher with every source masked, together with the
    /// receiving end of its event queue.
    pub fn new(regs: Registers, queue_depth: usize) -> (Self, Receiver<IrqEvent>) {
        let (sender, receiver) = bounded(queue_depth);
        let dispatcher = IrqDispatcher {
            regs,
            enabled: Mutex::new(IrqMask::empty()),
            sender,
            dropped: AtomicU64::new(0),
        };
        (dispatcher, receiver)
    }

    /// Arms or masks `sources`, leaving the others alone.
    pub fn set_enabled(&self, sources: IrqMask, enable: bool) {
        let mut enabled = self.enabled.lock().unwrap_or_else(PoisonError::into_inner);
        enabled.set(sources, enable);
        self.regs.write_global(regs::IRQ_ENABLE, enabled.bits());
    }

    pub fn enabled(&self) -> IrqMask {
        *self.enabled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Services one hardware interrupt and returns the sources it dispatched.
    pub fn handle(&self) -> IrqMask {
        let fired = {
            let mut enabled = self.enabled.lock().unwrap_or_else(PoisonError::into_inner);
            let status = self.regs.read_global(regs::IRQ_STATUS);
            self.regs.write_global(regs::IRQ_CLEAR, status);

            let fired = IrqMask::from_bits_truncate(status) & *enabled;
            let muted = fired & IrqMask::SELF_MUTING;
            if !muted.is_empty() {
                enabled.remove(muted);
                self.regs.write_global(regs::IRQ_ENABLE, enabled.bits());
            }
            fired
        };

        for event in IrqEvent::ALL.iter().filter(|e| fired.contains(e.mask())) {
            match self.sender.try_send(*event) {
                Ok(()) => (),
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        fired
    }

    /// Events lost because the queue was full or its consumer gone.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
