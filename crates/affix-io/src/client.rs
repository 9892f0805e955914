//! The storage client the attachment manager talks to.
//!
//! The daemon exposes attachment storage over RPC; this trait is the
//! narrow slice of it the manager needs. Implementations translate
//! their own failures into [`ClientError`].

use async_trait::async_trait;

use affix_core::{ParentId, PersistedAttachment, RemoteId, SourceFile};

/// Failure reported by an [`AttachmentClient`] call.
///
/// Both variants end up as the same per-item error status; the split
/// only matters for logging.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The daemon answered with a structured failure. The message is
    /// shown to the user verbatim.
    #[error("{0}")]
    Rejected(String),

    /// The request never produced an answer (connection refused, decode
    /// failure, ...).
    #[error("transport error: {0}")]
    Transport(String),
}

/// Attachment storage operations scoped to a parent entity.
///
/// Futures are not `Send`: the client runs on the browser's single
/// thread alongside the UI.
#[async_trait(?Send)]
pub trait AttachmentClient {
    /// Persist one file under `parent`.
    async fn store(
        &self,
        parent: &ParentId,
        file: &SourceFile,
    ) -> Result<PersistedAttachment, ClientError>;

    /// Delete one persisted file.
    async fn remove(&self, parent: &ParentId, id: &RemoteId) -> Result<(), ClientError>;

    /// Download the raw bytes of a persisted file, for previews.
    async fn fetch(&self, parent: &ParentId, id: &RemoteId) -> Result<Vec<u8>, ClientError>;
}
