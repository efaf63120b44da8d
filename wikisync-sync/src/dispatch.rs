//! Paced writes to the remote service.
//!
//! Write `k` (0-indexed) starts `(k + 1) × interval` after dispatch begins.
//! Started writes run concurrently; [`dispatch`] returns once all of them
//! have settled, one [`WriteOutcome`] per candidate, in candidate order.

use std::time::Duration;

use futures::future::join_all;

use wikisync_core::{EditRequest, PageRevision, RemoteError, RemoteService};

use crate::change_cache::content_fingerprint;
use crate::events::{EventBus, SyncEvent};
use crate::pipeline::Candidate;

// ---------------------------------------------------------------------------
// Write outcome
// ---------------------------------------------------------------------------

/// Outcome of one candidate's write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The page was revised.
    Edited {
        target_id: String,
        revision_id: Option<u64>,
    },
    /// The page already held this content; nothing was submitted.
    NoChange { target_id: String },
    /// The page did not exist and was created.
    Created {
        target_id: String,
        revision_id: Option<u64>,
    },
    /// Edit or create failed; the candidate is retried next run.
    Failed { target_id: String, error: RemoteError },
}

impl WriteOutcome {
    pub fn target_id(&self) -> &str {
        match self {
            WriteOutcome::Edited { target_id, .. }
            | WriteOutcome::NoChange { target_id }
            | WriteOutcome::Created { target_id, .. }
            | WriteOutcome::Failed { target_id, .. } => target_id,
        }
    }

    /// Whether the candidate's fingerprint should be recorded.
    pub fn is_success(&self) -> bool {
        !matches!(self, WriteOutcome::Failed { .. })
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Delay before write `index` may start.
pub fn start_delay(index: usize, interval: Duration) -> Duration {
    let slot = u32::try_from(index + 1).unwrap_or(u32::MAX);
    interval.saturating_mul(slot)
}

/// Write every candidate, staggered by `interval`, and wait for all of them.
pub async fn dispatch<R>(
    remote: &R,
    candidates: &[Candidate],
    interval: Duration,
    events: &EventBus,
) -> Vec<WriteOutcome>
where
    R: RemoteService + ?Sized,
{
    let writes = candidates.iter().enumerate().map(|(index, candidate)| async move {
        tokio::time::sleep(start_delay(index, interval)).await;
        write_candidate(remote, candidate, events).await
    });
    join_all(writes).await
}

/// Edit, falling back to create when the page is missing.
pub async fn write_candidate<R>(remote: &R, candidate: &Candidate, events: &EventBus) -> WriteOutcome
where
    R: RemoteService + ?Sized,
{
    let fingerprint = content_fingerprint(&candidate.content);
    let reviser = |current: &PageRevision| {
        if content_fingerprint(&current.content) == fingerprint {
            EditRequest::NoChange
        } else {
            EditRequest::Submit {
                summary: candidate.commit_message.clone(),
                text: candidate.content.clone(),
            }
        }
    };

    let target_id = candidate.target_id.clone();
    match remote.edit(&candidate.target_id, &reviser).await {
        Ok(receipt) if receipt.no_change => {
            tracing::debug!(page = %target_id, "remote already up to date");
            WriteOutcome::NoChange { target_id }
        }
        Ok(receipt) => {
            tracing::info!(page = %target_id, revision = ?receipt.revision_id, "edited");
            WriteOutcome::Edited {
                target_id,
                revision_id: receipt.revision_id,
            }
        }
        Err(err) if err.is_missing_title() => {
            match remote
                .create(&candidate.target_id, &candidate.content, &candidate.commit_message)
                .await
            {
                Ok(receipt) => {
                    tracing::info!(page = %target_id, revision = ?receipt.revision_id, "created");
                    WriteOutcome::Created {
                        target_id,
                        revision_id: receipt.revision_id,
                    }
                }
                Err(error) => {
                    tracing::warn!(page = %target_id, %error, "create failed");
                    events.publish(SyncEvent::CreateError {
                        unit: candidate.unit.clone(),
                        error: error.clone(),
                    });
                    WriteOutcome::Failed { target_id, error }
                }
            }
        }
        Err(error) => {
            tracing::warn!(page = %target_id, %error, "edit failed");
            events.publish(SyncEvent::EditError {
                unit: candidate.unit.clone(),
                error: error.clone(),
            });
            WriteOutcome::Failed { target_id, error }
        }
    }
}
