//! Tracked items and their upload status.

use serde::Serialize;

use crate::preview::PreviewKind;
use crate::types::{LocalId, PendingFile, PersistedAttachment, RemoteId, SourceFile};

/// Where a tracked item is in its lifecycle.
///
/// The remote record travels inside the variants that require one, so
/// an uploaded item without a server identifier cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    /// Accepted locally, waiting for an upload.
    Pending,
    /// A store call is in flight.
    Uploading,
    /// The server holds the file.
    Uploaded { remote: PersistedAttachment },
    /// A remote delete is in flight.
    Removing { remote: PersistedAttachment },
    /// The last upload or removal failed.
    ///
    /// `remote` is `None` for a failed upload (the item can be retried)
    /// and `Some` for a failed removal (the server copy still exists).
    Error {
        message: String,
        remote: Option<PersistedAttachment>,
    },
}

impl ItemStatus {
    /// Short lowercase name, used in logs and transition errors.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploading => "uploading",
            Self::Uploaded { .. } => "uploaded",
            Self::Removing { .. } => "removing",
            Self::Error { .. } => "error",
        }
    }

    /// The server record, when the server holds this file.
    #[must_use]
    pub const fn remote(&self) -> Option<&PersistedAttachment> {
        match self {
            Self::Uploaded { remote } | Self::Removing { remote } => Some(remote),
            Self::Error { remote, .. } => remote.as_ref(),
            Self::Pending | Self::Uploading => None,
        }
    }

    /// Whether no network operation is in flight for the item.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        match self {
            Self::Pending | Self::Uploaded { .. } | Self::Error { .. } => true,
            Self::Uploading | Self::Removing { .. } => false,
        }
    }
}

/// One file known to the attachment manager, local or persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedItem {
    pub(crate) local_id: LocalId,
    pub(crate) filename: String,
    pub(crate) mime_type: String,
    pub(crate) size: u64,
    /// Kept until the server confirms storage so the file can be
    /// retried or flushed.
    pub(crate) source: Option<SourceFile>,
    pub(crate) status: ItemStatus,
    /// Set once the item appeared in a persisted list supplied by the
    /// parent. Only such items are dropped when that list changes.
    pub(crate) listed: bool,
}

impl TrackedItem {
    /// A freshly accepted local file.
    pub(crate) fn local(file: SourceFile) -> Self {
        Self {
            local_id: LocalId::next(),
            filename: file.name().to_owned(),
            mime_type: file.mime_type().to_owned(),
            size: file.size(),
            source: Some(file),
            status: ItemStatus::Pending,
            listed: false,
        }
    }

    /// An attachment the server already holds.
    pub(crate) fn persisted(remote: PersistedAttachment) -> Self {
        Self {
            local_id: LocalId::next(),
            filename: remote.filename.clone(),
            mime_type: remote.mime_type.clone(),
            size: remote.size,
            source: None,
            status: ItemStatus::Uploaded { remote },
            listed: true,
        }
    }

    #[must_use]
    pub const fn local_id(&self) -> LocalId {
        self.local_id
    }

    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// The local payload, if still held.
    #[must_use]
    pub const fn source(&self) -> Option<&SourceFile> {
        self.source.as_ref()
    }

    #[must_use]
    pub const fn status(&self) -> &ItemStatus {
        &self.status
    }

    /// Server identifier, once the server holds the file.
    #[must_use]
    pub fn remote_id(&self) -> Option<&RemoteId> {
        self.status.remote().map(|r| &r.id)
    }

    /// Failure text, only while in [`ItemStatus::Error`].
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            ItemStatus::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    /// How the item's preview is rendered.
    #[must_use]
    pub fn kind(&self) -> PreviewKind {
        PreviewKind::classify(&self.mime_type)
    }

    pub(crate) fn pending_summary(&self) -> PendingFile {
        PendingFile {
            local_id: self.local_id,
            filename: self.filename.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn remote(id: &str) -> PersistedAttachment {
        PersistedAttachment {
            id: RemoteId::new(id),
            filename: "scan.pdf".into(),
            mime_type: "application/pdf".into(),
            size: 12,
        }
    }

    #[test]
    fn local_item_starts_pending_with_source() {
        let item = TrackedItem::local(SourceFile::new("a.png", "image/png", vec![1, 2, 3]));
        assert_eq!(item.status(), &ItemStatus::Pending);
        assert_eq!(item.size(), 3);
        assert!(item.source().is_some());
        assert!(item.remote_id().is_none());
        assert!(item.error_message().is_none());
    }

    #[test]
    fn persisted_item_carries_remote_record() {
        let item = TrackedItem::persisted(remote("att-1"));
        assert_eq!(item.remote_id(), Some(&RemoteId::new("att-1")));
        assert_eq!(item.filename(), "scan.pdf");
        assert!(item.source().is_none());
        assert_eq!(item.kind(), PreviewKind::Document);
    }

    #[test]
    fn removal_error_keeps_remote() {
        let status = ItemStatus::Error {
            message: "denied".into(),
            remote: Some(remote("att-2")),
        };
        assert_eq!(status.remote().map(|r| r.id.as_str()), Some("att-2"));
        assert!(status.is_settled());
        assert_eq!(status.label(), "error");
    }

    #[test]
    fn in_flight_states_are_not_settled() {
        assert!(!ItemStatus::Uploading.is_settled());
        assert!(
            !ItemStatus::Removing {
                remote: remote("att-3")
            }
            .is_settled()
        );
    }

    #[test]
    fn status_serializes_as_tagged_union() {
        let json = serde_json::to_value(ItemStatus::Uploaded {
            remote: remote("att-4"),
        })
        .unwrap();
        assert_eq!(json["status"], "uploaded");
        assert_eq!(json["remote"]["id"], "att-4");
    }
}
