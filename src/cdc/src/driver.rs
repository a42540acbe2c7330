// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Driver bring-up and teardown.

use std::sync::{Arc, PoisonError};
use std::thread;

use crossbeam_channel::{bounded, Sender};

use crate::bus::RegisterIo;
use crate::commit::{Commit, Committer};
use crate::config::CdcConfig;
use crate::crtc::{Crtc, CrtcOps};
use crate::deswizzle::SharedDeswizzler;
use crate::device::Cdc;
use crate::flip::{PageFlipCoordinator, VblankControl};
use crate::irq::{IrqDispatcher, IrqMask};
use crate::pll::ClockSource;
use crate::worker::IrqWorker;
use crate::Result;

/// Resources the host hands to the driver.
pub struct Platform {
    pub registers: Arc<dyn RegisterIo>,
    pub clock: Box<dyn ClockSource>,
    pub vblank: Arc<dyn VblankControl>,
    pub deswizzler: Option<SharedDeswizzler>,
}

pub struct CdcDriver {
    irq: Arc<IrqDispatcher>,
    crtc: Arc<Crtc>,
    committer: Committer,
    vblank: Arc<dyn VblankControl>,
    deswizzler: Option<SharedDeswizzler>,
    irq_stop: Sender<()>,
    irq_worker: thread::JoinHandle<()>,
    // Vblank reference that keeps the line interrupt, and with it the
    // deswizzler retrigger, running.
    vblank_held: bool,
}

impl CdcDriver {
    pub fn probe(platform: Platform, config: CdcConfig) -> Result<Self> {
        let Platform {
            registers,
            clock,
            vblank,
            deswizzler,
        } = platform;

        let cdc = Cdc::attach(registers, &config)?;
        let (irq, events) = IrqDispatcher::new(cdc.registers().clone(), config.irq_queue_depth);
        let irq = Arc::new(irq);
        let flip = Arc::new(PageFlipCoordinator::new(vblank.clone()));

        let (irq_stop, stop) = bounded(1);
        let irq_worker = IrqWorker::new(
            events,
            stop,
            flip.clone(),
            vblank.clone(),
            deswizzler.clone(),
        )
        .run()?;

        let crtc = Arc::new(Crtc::new(
            cdc,
            clock,
            irq.clone(),
            flip,
            vblank.clone(),
            deswizzler.clone(),
            config,
        ));
        crtc.set_vblank(false);

        let committer = Committer::new(crtc.clone())?;

        let vblank_held = deswizzler.is_some() && vblank.get();
        info!(
            "cdc: probed, deswizzler: {}",
            if deswizzler.is_some() { "yes" } else { "no" }
        );

        Ok(CdcDriver {
            irq,
            crtc,
            committer,
            vblank,
            deswizzler,
            irq_stop,
            irq_worker,
            vblank_held,
        })
    }

    /// Entry point of the controller's interrupt line.
    pub fn handle_irq(&self) -> IrqMask {
        self.irq.handle()
    }

    /// Entry point of the deswizzler's interrupt line.
    pub fn handle_deswizzler_irq(&self) {
        if let Some(dswz) = &self.deswizzler {
            dswz.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .handle_irq();
        }
    }

    pub fn crtc(&self) -> &Arc<Crtc> {
        &self.crtc
    }

    pub fn commit(&self, commit: Commit, nonblock: bool) -> Result<()> {
        self.committer.commit(commit, nonblock)
    }

    pub fn wait_idle(&self) {
        self.committer.wait_idle();
    }

    /// Interrupt events lost to a full queue.
    pub fn dropped_irq_events(&self) -> u64 {
        self.irq.dropped_events()
    }

    pub fn remove(self) {
        let CdcDriver {
            irq: _,
            crtc,
            mut committer,
            vblank,
            deswizzler,
            irq_stop,
            irq_worker,
            vblank_held,
        } = self;

        committer.shutdown();
        crtc.shutdown();
        if vblank_held {
            vblank.put();
        }
        if let Some(dswz) = &deswizzler {
            dswz.lock().unwrap_or_else(PoisonError::into_inner).detach();
        }

        drop(irq_stop);
        if irq_worker.join().is_err() {
            error!("cdc: irq worker panicked");
        }
        debug!("cdc: removed");
    }
}
