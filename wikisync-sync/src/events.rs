//! Notifications published by the scheduler.
//!
//! A thin wrapper over a `tokio::sync::broadcast` channel. Publishing never
//! blocks and is a no-op when nobody is subscribed; slow subscribers lose the
//! oldest events (`RecvError::Lagged`) rather than stalling a run.

use std::path::PathBuf;

use tokio::sync::broadcast;

use wikisync_core::{ContentUnit, RemoteError, UnitError};

/// Buffered events per subscriber before the oldest are dropped.
const CHANNEL_CAPACITY: usize = 256;

/// Identifies the unit an event is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRef {
    pub original_path: PathBuf,
    pub target_id: String,
}

impl From<&ContentUnit> for UnitRef {
    fn from(unit: &ContentUnit) -> Self {
        Self {
            original_path: unit.original_path().to_path_buf(),
            target_id: unit.target_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Login succeeded; runs may start.
    Ready,
    RunStarted,
    RunEnded,
    LoginError { error: RemoteError },
    MiddlewareError { unit: UnitRef, error: UnitError },
    EditError { unit: UnitRef, error: RemoteError },
    CreateError { unit: UnitRef, error: RemoteError },
}

/// Publishing half of the notification channel, owned by a scheduler.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: SyncEvent) {
        // Err only means there are no receivers right now.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
