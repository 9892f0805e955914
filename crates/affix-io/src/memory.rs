//! In-process attachment store.
//!
//! Stands in for the daemon in the demo app and in tests. Failures can
//! be scripted per file so partial-failure paths are easy to exercise.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use affix_core::{ParentId, PersistedAttachment, RemoteId, SourceFile};

use crate::client::{AttachmentClient, ClientError};

#[derive(Debug, Clone)]
struct StoredFile {
    record: PersistedAttachment,
    bytes: Arc<[u8]>,
}

/// Attachment store kept in memory, keyed by parent entity.
#[derive(Debug, Default)]
pub struct MemoryClient {
    files: RefCell<HashMap<ParentId, Vec<StoredFile>>>,
    next_id: Cell<u64>,
    latency_ms: u32,
    offline: Cell<bool>,
    store_failures: RefCell<HashMap<String, String>>,
    remove_failures: RefCell<HashMap<RemoteId, String>>,
    fetch_failures: RefCell<Vec<RemoteId>>,
    store_calls: Cell<usize>,
    remove_calls: Cell<usize>,
    fetch_calls: Cell<usize>,
}

impl MemoryClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency_ms` using a browser timer, so the UI
    /// shows its in-flight states. Only meaningful on `wasm32`.
    #[must_use]
    pub fn with_latency(latency_ms: u32) -> Self {
        Self {
            latency_ms,
            ..Self::default()
        }
    }

    /// Add a file directly, bypassing `store` and its counters.
    pub fn insert(&self, parent: &ParentId, file: &SourceFile) -> PersistedAttachment {
        let record = PersistedAttachment {
            id: self.allocate_id(),
            filename: file.name().to_owned(),
            mime_type: file.mime_type().to_owned(),
            size: file.size(),
        };
        self.files
            .borrow_mut()
            .entry(parent.clone())
            .or_default()
            .push(StoredFile {
                record: record.clone(),
                bytes: Arc::from(file.bytes()),
            });
        record
    }

    /// Everything stored under `parent`, oldest first.
    #[must_use]
    pub fn list(&self, parent: &ParentId) -> Vec<PersistedAttachment> {
        self.files
            .borrow()
            .get(parent)
            .map(|files| files.iter().map(|f| f.record.clone()).collect())
            .unwrap_or_default()
    }

    /// Make `store` reject any file named `filename` with `message`.
    pub fn fail_store(&self, filename: impl Into<String>, message: impl Into<String>) {
        self.store_failures
            .borrow_mut()
            .insert(filename.into(), message.into());
    }

    /// Make `remove` reject `id` with `message`.
    pub fn fail_remove(&self, id: RemoteId, message: impl Into<String>) {
        self.remove_failures.borrow_mut().insert(id, message.into());
    }

    /// Make `fetch` fail for `id`.
    pub fn fail_fetch(&self, id: RemoteId) {
        self.fetch_failures.borrow_mut().push(id);
    }

    /// Clear every scripted failure.
    pub fn clear_failures(&self) {
        self.store_failures.borrow_mut().clear();
        self.remove_failures.borrow_mut().clear();
        self.fetch_failures.borrow_mut().clear();
    }

    /// While offline every call fails with [`ClientError::Transport`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.set(offline);
    }

    #[must_use]
    pub fn store_calls(&self) -> usize {
        self.store_calls.get()
    }

    #[must_use]
    pub fn remove_calls(&self) -> usize {
        self.remove_calls.get()
    }

    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.get()
    }

    fn allocate_id(&self) -> RemoteId {
        let n = self.next_id.get() + 1;
        self.next_id.set(n);
        RemoteId::new(format!("att-{n}"))
    }

    async fn round_trip(&self) -> Result<(), ClientError> {
        if self.latency_ms > 0 {
            gloo_timers::future::TimeoutFuture::new(self.latency_ms).await;
        }
        if self.offline.get() {
            return Err(ClientError::Transport("daemon unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl AttachmentClient for MemoryClient {
    async fn store(
        &self,
        parent: &ParentId,
        file: &SourceFile,
    ) -> Result<PersistedAttachment, ClientError> {
        self.store_calls.set(self.store_calls.get() + 1);
        self.round_trip().await?;
        if let Some(message) = self.store_failures.borrow().get(file.name()) {
            return Err(ClientError::Rejected(message.clone()));
        }
        let record = self.insert(parent, file);
        debug!(%parent, id = %record.id, "stored attachment");
        Ok(record)
    }

    async fn remove(&self, parent: &ParentId, id: &RemoteId) -> Result<(), ClientError> {
        self.remove_calls.set(self.remove_calls.get() + 1);
        self.round_trip().await?;
        if let Some(message) = self.remove_failures.borrow().get(id) {
            return Err(ClientError::Rejected(message.clone()));
        }
        let mut files = self.files.borrow_mut();
        let entries = files.get_mut(parent).ok_or_else(|| {
            ClientError::Rejected(format!("attachment {id} not found on {parent}"))
        })?;
        let before = entries.len();
        entries.retain(|f| &f.record.id != id);
        if entries.len() == before {
            return Err(ClientError::Rejected(format!(
                "attachment {id} not found on {parent}"
            )));
        }
        Ok(())
    }

    async fn fetch(&self, parent: &ParentId, id: &RemoteId) -> Result<Vec<u8>, ClientError> {
        self.fetch_calls.set(self.fetch_calls.get() + 1);
        self.round_trip().await?;
        if self.fetch_failures.borrow().contains(id) {
            return Err(ClientError::Rejected(format!("attachment {id} unavailable")));
        }
        self.files
            .borrow()
            .get(parent)
            .and_then(|files| files.iter().find(|f| &f.record.id == id))
            .map(|f| f.bytes.to_vec())
            .ok_or_else(|| ClientError::Rejected(format!("attachment {id} not found on {parent}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures::executor::block_on;

    use super::*;

    fn pdf() -> SourceFile {
        SourceFile::new("spec.pdf", "application/pdf", b"%PDF-1.7".to_vec())
    }

    #[test]
    fn store_then_fetch_then_remove() {
        let client = MemoryClient::new();
        let parent = ParentId::new("ISSUE-1");

        let record = block_on(client.store(&parent, &pdf())).unwrap();
        assert_eq!(record.filename, "spec.pdf");
        assert_eq!(client.list(&parent), vec![record.clone()]);

        let bytes = block_on(client.fetch(&parent, &record.id)).unwrap();
        assert_eq!(bytes, b"%PDF-1.7");

        block_on(client.remove(&parent, &record.id)).unwrap();
        assert!(client.list(&parent).is_empty());
        assert_eq!(
            (client.store_calls(), client.fetch_calls(), client.remove_calls()),
            (1, 1, 1)
        );
    }

    #[test]
    fn scripted_store_failure_is_rejected() {
        let client = MemoryClient::new();
        client.fail_store("spec.pdf", "virus scan failed");
        let err = block_on(client.store(&ParentId::new("ISSUE-1"), &pdf())).unwrap_err();
        assert_eq!(err, ClientError::Rejected("virus scan failed".into()));
        assert_eq!(err.to_string(), "virus scan failed");
    }

    #[test]
    fn offline_calls_fail_with_transport_errors() {
        let client = MemoryClient::new();
        client.set_offline(true);
        let err = block_on(client.store(&ParentId::new("ISSUE-1"), &pdf())).unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(client.store_calls(), 1);
    }

    #[test]
    fn removing_unknown_attachment_fails() {
        let client = MemoryClient::new();
        let err = block_on(client.remove(&ParentId::new("ISSUE-1"), &RemoteId::new("att-9")))
            .unwrap_err();
        assert!(err.to_string().contains("att-9"));
    }
}
