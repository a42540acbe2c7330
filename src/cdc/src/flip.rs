// Copyright 2021 Red Hat, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Page flip completion.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::{Error, Result};

/// Identifies the client that requested a flip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

/// Completion notification of a display update, delivered at most once.
pub trait FlipNotification: Send {
    fn owner(&self) -> ClientId;
    fn complete(self: Box<Self>);
}

/// Vertical blank bookkeeping of the host display framework.
pub trait VblankControl: Send + Sync {
    /// Takes a reference that keeps vblank interrupts alive. Returns false
    /// if vblank reporting is off.
    fn get(&self) -> bool;
    fn put(&self);
    /// Reports one vertical blank.
    fn handle(&self);
    fn on(&self);
    fn off(&self);
    /// Blocks until the next vertical blank.
    fn wait_one(&self);
}

/// Tracks the single outstanding page flip of a CRTC.
pub struct PageFlipCoordinator {
    pending: Mutex<Option<Box<dyn FlipNotification>>>,
    idle: Condvar,
    vblank: Arc<dyn VblankControl>,
}

impl PageFlipCoordinator {
    pub fn new(vblank: Arc<dyn VblankControl>) -> Self {
        PageFlipCoordinator {
            pending: Mutex::new(None),
            idle: Condvar::new(),
            vblank,
        }
    }

    fn arm(
        &self,
        notification: Box<dyn FlipNotification>,
    ) -> std::result::Result<(), (Error, Box<dyn FlipNotification>)> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.is_some() {
            return Err((Error::FlipPending, notification));
        }
        if !self.vblank.get() {
            return Err((Error::VblankUnavailable, notification));
        }
        *pending = Some(notification);
        Ok(())
    }

    /// Records `notification` for delivery at the next frame boundary.
    pub fn begin_flip(&self, notification: Box<dyn FlipNotification>) -> Result<()> {
        self.arm(notification).map_err(|(e, _)| e)
    }

    /// Like [`begin_flip`](Self::begin_flip), but delivers the notification
    /// right away when vblank reporting is off.
    pub fn begin_or_send(&self, notification: Box<dyn FlipNotification>) -> Result<()> {
        match self.arm(notification) {
            Ok(()) => Ok(()),
            Err((Error::VblankUnavailable, notification)) => {
                debug!("cdc: no vblank, sending flip event now");
                notification.complete();
                Ok(())
            }
            Err((e, _)) => Err(e),
        }
    }

    /// Delivers the pending notification, if any. Returns true if one was
    /// delivered.
    pub fn on_event(&self) -> bool {
        let notification = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.take()
        };
        match notification {
            Some(notification) => {
                notification.complete();
                self.vblank.put();
                self.idle.notify_all();
                true
            }
            None => false,
        }
    }

    /// Drops the pending flip of `owner` without delivering it.
    pub fn cancel(&self, owner: ClientId) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if !matches!(pending.as_ref(), Some(n) if n.owner() == owner) {
            return false;
        }
        debug!("cdc: cancel page flip of client {}", owner.0);
        *pending = None;
        drop(pending);
        self.vblank.put();
        self.idle.notify_all();
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Waits up to `timeout` for the pending flip to complete, and forces its
    /// completion if it does not. Returns false on timeout.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while pending.is_some() {
            let now = Instant::now();
            if now >= deadline {
                drop(pending);
                warn!("cdc: page flip timeout");
                self.on_event();
                return false;
            }
            pending = self
                .idle
                .wait_timeout(pending, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}
