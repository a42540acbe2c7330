// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver};

use crate::deswizzle::SharedDeswizzler;
use crate::flip::{PageFlipCoordinator, VblankControl};
use crate::irq::IrqEvent;
use crate::{Error, Result};

const RATELIMIT_INTERVAL: Duration = Duration::from_secs(5);
const RATELIMIT_BURST: u32 = 10;

/// Lets through at most `burst` messages per `interval`.
struct RateLimit {
    interval: Duration,
    burst: u32,
    begin: Option<Instant>,
    printed: u32,
    missed: u32,
}

impl RateLimit {
    fn new(interval: Duration, burst: u32) -> Self {
        RateLimit {
            interval,
            burst,
            begin: None,
            printed: 0,
            missed: 0,
        }
    }

    /// Returns whether a message may go out at `now`, together with the
    /// number of messages swallowed in the interval that just ended.
    fn check(&mut self, now: Instant) -> (bool, u32) {
        let mut suppressed = 0;
        match self.begin {
            Some(begin) if now.duration_since(begin) < self.interval => (),
            _ => {
                suppressed = self.missed;
                self.begin = Some(now);
                self.printed = 0;
                self.missed = 0;
            }
        }
        if self.printed < self.burst {
            self.printed += 1;
            (true, suppressed)
        } else {
            self.missed += 1;
            (false, suppressed)
        }
    }
}

/// Applies the side effects of the interrupt events, outside of the
/// interrupt path.
pub struct IrqWorker {
    receiver: Receiver<IrqEvent>,
    stop: Receiver<()>,
    flip: Arc<PageFlipCoordinator>,
    vblank: Arc<dyn VblankControl>,
    deswizzler: Option<SharedDeswizzler>,
    limits: HashMap<IrqEvent, RateLimit>,
}

impl IrqWorker {
    /// The worker ends when `stop` or the event queue disconnects.
    pub fn new(
        receiver: Receiver<IrqEvent>,
        stop: Receiver<()>,
        flip: Arc<PageFlipCoordinator>,
        vblank: Arc<dyn VblankControl>,
        deswizzler: Option<SharedDeswizzler>,
    ) -> Self {
        IrqWorker {
            receiver,
            stop,
            flip,
            vblank,
            deswizzler,
            limits: HashMap::new(),
        }
    }

    pub fn run(self) -> Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("cdc irq".into())
            .spawn(|| self.work())
            .map_err(Error::WorkerSpawn)
    }

    fn work(mut self) {
        let receiver = self.receiver.clone();
        let stop = self.stop.clone();
        loop {
            select! {
                recv(receiver) -> event => match event {
                    Ok(event) => self.handle_event(event, Instant::now()),
                    Err(_) => break,
                },
                recv(stop) -> _ => break,
            }
        }
        debug!("cdc: irq worker exiting");
    }

    fn handle_event(&mut self, event: IrqEvent, now: Instant) {
        match event {
            IrqEvent::Line => {
                self.vblank.handle();
                self.flip.on_event();
                if let Some(dswz) = &self.deswizzler {
                    dswz.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .retrigger();
                }
            }
            IrqEvent::Reload => debug!("cdc: shadow reload done"),
            _ => self.report(event, now),
        }
    }

    fn report(&mut self, event: IrqEvent, now: Instant) {
        let limit = self
            .limits
            .entry(event)
            .or_insert_with(|| RateLimit::new(RATELIMIT_INTERVAL, RATELIMIT_BURST));
        let (allowed, suppressed) = limit.check(now);
        if suppressed > 0 {
            warn!(
                "cdc: {} \"{}\" messages suppressed",
                suppressed,
                event.description()
            );
        }
        if allowed {
            error!("cdc: {}", event.description());
        }
    }
}
