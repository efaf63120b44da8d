//! Contract for the remote content store.
//!
//! The scheduler only needs three operations: log in, revise an existing
//! page through a callback, and create a page that does not exist yet. The
//! trait is implemented by the MediaWiki client and by test fakes.

use async_trait::async_trait;

use crate::error::RemoteError;

/// Latest revision of a page, as handed to a [`Reviser`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageRevision {
    pub title: String,
    pub content: String,
    pub revision_id: Option<u64>,
    /// Timestamp of the revision, used for edit-conflict detection.
    pub timestamp: Option<String>,
}

/// What a [`Reviser`] wants done with the page it was shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditRequest {
    /// Replace the page text.
    Submit { summary: String, text: String },
    /// Leave the page alone; no revision is created.
    NoChange,
}

/// Result of a successful edit or create.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WriteReceipt {
    pub title: String,
    pub revision_id: Option<u64>,
    /// `true` when nothing was submitted, or the service reported no change.
    pub no_change: bool,
}

/// Callback deciding the new text of a page from its current revision.
pub type Reviser<'a> = &'a (dyn Fn(&PageRevision) -> EditRequest + Send + Sync);

#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Authenticate. Must succeed before any write.
    async fn login(&self) -> Result<(), RemoteError>;

    /// Revise an existing page.
    ///
    /// Fails with code `missingtitle` when the page does not exist. When the
    /// reviser answers [`EditRequest::NoChange`], nothing is submitted and the
    /// receipt has `no_change` set.
    async fn edit(&self, title: &str, reviser: Reviser<'_>) -> Result<WriteReceipt, RemoteError>;

    /// Create a page that does not exist yet.
    async fn create(
        &self,
        title: &str,
        text: &str,
        summary: &str,
    ) -> Result<WriteReceipt, RemoteError>;
}
