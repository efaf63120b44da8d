//! [`RemoteService`] over the blocking [`ApiSession`].
//!
//! Each request runs on tokio's blocking pool so paced writes can overlap
//! without stalling the runtime.

use std::sync::Arc;

use async_trait::async_trait;

use wikisync_core::{
    Credentials, EditRequest, RemoteError, RemoteService, Reviser, WriteReceipt,
};

use crate::api::{ApiSession, EditResult};

/// MediaWiki Action API client.
#[derive(Clone)]
pub struct MediaWikiClient {
    session: Arc<ApiSession>,
}

impl MediaWikiClient {
    pub fn new(credentials: Credentials, max_retries: u32) -> Self {
        Self::from_session(ApiSession::new(credentials, max_retries))
    }

    pub fn from_session(session: ApiSession) -> Self {
        Self {
            session: Arc::new(session),
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, RemoteError>
    where
        T: Send + 'static,
        F: FnOnce(&ApiSession) -> Result<T, RemoteError> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || f(&session))
            .await
            .map_err(|e| RemoteError::Transport(format!("request task failed: {e}")))?
    }
}

fn receipt(fallback_title: &str, result: EditResult) -> WriteReceipt {
    WriteReceipt {
        title: result.title.unwrap_or_else(|| fallback_title.to_string()),
        revision_id: result.newrevid,
        no_change: result.nochange,
    }
}

#[async_trait]
impl RemoteService for MediaWikiClient {
    async fn login(&self) -> Result<(), RemoteError> {
        self.blocking(|session| session.login()).await
    }

    async fn edit(&self, title: &str, reviser: Reviser<'_>) -> Result<WriteReceipt, RemoteError> {
        let owned = title.to_string();
        let current = self
            .blocking(move |session| session.fetch_revision(&owned))
            .await?;

        let (summary, text) = match reviser(&current) {
            EditRequest::NoChange => {
                tracing::debug!(page = %title, "reviser left page unchanged");
                return Ok(WriteReceipt {
                    title: current.title,
                    revision_id: current.revision_id,
                    no_change: true,
                });
            }
            EditRequest::Submit { summary, text } => (summary, text),
        };

        let owned = title.to_string();
        let base_timestamp = current.timestamp;
        let result = self
            .blocking(move |session| {
                session.submit_edit(&owned, &text, &summary, base_timestamp.as_deref(), false)
            })
            .await?;
        Ok(receipt(title, result))
    }

    async fn create(
        &self,
        title: &str,
        text: &str,
        summary: &str,
    ) -> Result<WriteReceipt, RemoteError> {
        let (owned, text, summary) = (title.to_string(), text.to_string(), summary.to_string());
        let result = self
            .blocking(move |session| session.submit_edit(&owned, &text, &summary, None, true))
            .await?;
        Ok(receipt(title, result))
    }
}
