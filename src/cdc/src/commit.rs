// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Display update serialization.
//!
//! At most one commit is in flight. Submitters block on the [`CommitGate`]
//! until the previous commit released it, so commits apply in the order
//! their submitters got through the gate.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::crtc::{Crtc, CrtcOps, PlaneOps, PlaneState};
use crate::flip::FlipNotification;
use crate::mode::DisplayMode;
use crate::{Error, Result};

/// A "one in flight" gate.
#[derive(Default)]
pub struct CommitGate {
    pending: Mutex<bool>,
    idle: Condvar,
}

impl CommitGate {
    /// Blocks until no commit is pending, then marks one pending.
    pub fn acquire(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while *pending {
            pending = self
                .idle
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *pending = true;
    }

    pub fn release(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.idle.notify_all();
    }

    pub fn is_pending(&self) -> bool {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until no commit is pending.
    pub fn wait_idle(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while *pending {
            pending = self
                .idle
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

pub enum Modeset {
    Enable(DisplayMode),
    Disable,
}

/// One atomic display update.
#[derive(Default)]
pub struct Commit {
    pub modeset: Option<Modeset>,
    /// New state of every plane the update touches, `None` unbinding it.
    pub planes: Vec<(usize, Option<PlaneState>)>,
    pub event: Option<Box<dyn FlipNotification>>,
}

struct CommitWorker {
    crtc: Arc<Crtc>,
    gate: Arc<CommitGate>,
    // Plane states of the last applied commit.
    planes: Mutex<Vec<Option<PlaneState>>>,
}

impl CommitWorker {
    fn apply(&self, commit: Commit) {
        let mut planes = self.planes.lock().unwrap_or_else(PoisonError::into_inner);

        match commit.modeset {
            Some(Modeset::Disable) => {
                self.crtc.disable();
                planes.iter_mut().for_each(|p| *p = None);
            }
            Some(Modeset::Enable(mode)) => {
                self.crtc.disable();
                self.crtc.atomic_enable(&mode);
                // New timing leaves every layer disabled.
                planes.iter_mut().for_each(|p| *p = None);
            }
            None => (),
        }
        let active = self.crtc.mode().is_some();

        if active {
            if commit.event.is_some() {
                self.crtc.wait_for_flip();
            }
            if let Err(e) = self.crtc.atomic_begin(commit.event) {
                warn!("cdc: flip event dropped: {}", e);
            }
        } else if let Some(event) = commit.event {
            event.complete();
        }

        for (layer, new) in commit.planes {
            let old = planes.get(layer).copied().flatten();
            match self.crtc.atomic_update(layer, old.as_ref(), new.as_ref()) {
                Ok(()) => {
                    if let Some(slot) = planes.get_mut(layer) {
                        *slot = new;
                    }
                }
                Err(e) => warn!("cdc: plane {} not updated: {}", layer, e),
            }
        }

        if active {
            self.crtc.atomic_flush();
        }

        drop(planes);
        self.gate.release();
    }

    fn work(self: Arc<Self>, receiver: Receiver<Commit>) {
        for commit in receiver.iter() {
            self.apply(commit);
        }
        debug!("cdc: commit worker exiting");
    }
}

/// Submits commits to the CRTC, inline or through the commit worker thread.
pub struct Committer {
    worker: Arc<CommitWorker>,
    sender: Option<Sender<Commit>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Committer {
    pub fn new(crtc: Arc<Crtc>) -> Result<Self> {
        let layer_count = crtc.with_cdc(|cdc| cdc.layer_count());
        let worker = Arc::new(CommitWorker {
            crtc,
            gate: Arc::new(CommitGate::default()),
            planes: Mutex::new(vec![None; layer_count]),
        });

        let (sender, receiver) = unbounded();
        let thread_worker = worker.clone();
        let handle = thread::Builder::new()
            .name("cdc commit".into())
            .spawn(move || thread_worker.work(receiver))
            .map_err(Error::WorkerSpawn)?;

        Ok(Committer {
            worker,
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Applies `commit` once the previous one is done. With `nonblock` the
    /// call returns as soon as the commit is queued.
    pub fn commit(&self, commit: Commit, nonblock: bool) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(Error::CommitQueueClosed)?;
        self.worker.gate.acquire();
        if !nonblock {
            self.worker.apply(commit);
            return Ok(());
        }
        sender.send(commit).map_err(|_| {
            self.worker.gate.release();
            Error::CommitQueueClosed
        })
    }

    /// Blocks until no commit is in flight.
    pub fn wait_idle(&self) {
        self.worker.gate.wait_idle();
    }

    pub fn is_pending(&self) -> bool {
        self.worker.gate.is_pending()
    }

    /// Drains the queue, turns the output off and stops the worker.
    pub fn shutdown(&mut self) {
        self.wait_idle();
        self.worker.crtc.disable();
        self.sender = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("cdc: commit worker panicked");
            }
        }
    }
}

impl Drop for Committer {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::config::CdcConfig;
    use crate::crtc::Framebuffer;
    use crate::layer::DRM_FORMAT_RGB565;
    use crate::mode::VideoMode;
    use crate::regs::{self, LayerReg};
    use crate::test_utils::{CrtcFixture, MockNotification};

    fn plane(w: u32, h: u32) -> PlaneState {
        PlaneState {
            fb: Framebuffer {
                paddr: 0x3000_0000,
                offset: 0,
                pitch: 1600,
                fourcc: DRM_FORMAT_RGB565,
            },
            crtc_x: 0,
            crtc_y: 0,
            crtc_w: w,
            crtc_h: h,
            src_x: 0,
            src_y: 0,
            alpha: None,
        }
    }

    fn svga() -> Option<Modeset> {
        Some(Modeset::Enable(DisplayMode::from(&VideoMode::SVGA_60)))
    }

    #[test]
    fn test_gate() {
        let gate = Arc::new(CommitGate::default());
        let entered = Arc::new(AtomicUsize::new(0));
        gate.acquire();
        assert!(gate.is_pending());

        let waiter = {
            let gate = gate.clone();
            let entered = entered.clone();
            thread::spawn(move || {
                gate.acquire();
                entered.fetch_add(1, Ordering::SeqCst);
                gate.release();
            })
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(entered.load(Ordering::SeqCst), 0);

        gate.release();
        waiter.join().unwrap();
        assert_eq!(entered.load(Ordering::SeqCst), 1);
        gate.wait_idle();
        assert!(!gate.is_pending());
    }

    #[test]
    fn test_blocking_commit() {
        crate::init_logger();
        let f = CrtcFixture::new(CdcConfig::default());
        let mut committer = Committer::new(f.crtc.clone()).unwrap();

        let (event, delivered) = MockNotification::new(1);
        committer
            .commit(
                Commit {
                    modeset: svga(),
                    planes: vec![(0, Some(plane(800, 600)))],
                    event: Some(event),
                },
                false,
            )
            .unwrap();

        assert!(!committer.is_pending());
        assert!(f.crtc.is_enabled());
        assert_eq!(
            f.mem.peek(f.index(0, LayerReg::FbLength)),
            (1600 << 16) | (1600 + 7)
        );
        assert_eq!(f.mem.peek(f.index(0, LayerReg::Control)) & 1, 1);
        assert_eq!(f.mem.writes_to(regs::SHADOW_RELOAD).last(), Some(&1));
        assert!(f.flip.is_pending());

        // The line interrupt completes the flip.
        assert!(f.flip.on_event());
        assert_eq!(delivered.load(Ordering::SeqCst), 1);

        // Unbinding the plane disables its layer.
        committer
            .commit(
                Commit {
                    planes: vec![(0, None)],
                    ..Default::default()
                },
                false,
            )
            .unwrap();
        assert_eq!(f.mem.peek(f.index(0, LayerReg::Control)) & 1, 0);

        committer.shutdown();
        assert!(!f.crtc.is_enabled());
    }

    #[test]
    fn test_nonblocking_commit() {
        let f = CrtcFixture::new(CdcConfig::default());
        let committer = Committer::new(f.crtc.clone()).unwrap();

        committer
            .commit(
                Commit {
                    modeset: svga(),
                    ..Default::default()
                },
                true,
            )
            .unwrap();
        committer
            .commit(
                Commit {
                    planes: vec![(1, Some(plane(320, 200)))],
                    ..Default::default()
                },
                true,
            )
            .unwrap();
        committer.wait_idle();

        assert!(f.crtc.is_enabled());
        let window = f.crtc.with_cdc(|cdc| cdc.layer(1).unwrap().window());
        assert_eq!((window.width, window.height), (320, 200));
    }

    #[test]
    fn test_commit_while_disabled() {
        let f = CrtcFixture::new(CdcConfig::default());
        let committer = Committer::new(f.crtc.clone()).unwrap();

        let (event, delivered) = MockNotification::new(1);
        committer
            .commit(
                Commit {
                    planes: vec![(0, Some(plane(800, 600)))],
                    event: Some(event),
                    ..Default::default()
                },
                false,
            )
            .unwrap();

        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        assert!(!f.flip.is_pending());
        assert!(f.mem.writes_to(regs::SHADOW_RELOAD).len() <= 1);
        assert_eq!(f.mem.peek(f.index(0, LayerReg::Control)) & 1, 0);
    }

    #[test]
    fn test_modeset_disable() {
        let f = CrtcFixture::new(CdcConfig::default());
        let committer = Committer::new(f.crtc.clone()).unwrap();
        committer
            .commit(
                Commit {
                    modeset: svga(),
                    planes: vec![(0, Some(plane(800, 600)))],
                    ..Default::default()
                },
                false,
            )
            .unwrap();
        committer
            .commit(
                Commit {
                    modeset: Some(Modeset::Disable),
                    ..Default::default()
                },
                false,
            )
            .unwrap();

        assert!(!f.crtc.is_enabled());
        assert_eq!(f.crtc.mode(), None);
        assert_eq!(f.deswizzler_calls().last(), Some(&"stop"));
    }
}
