//! Shared types for affix attachment handling.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::validate::UploadLimits;

/// Source of fresh [`LocalId`] values. Starts at 1 so `0` never shows up
/// in logs as a real item.
static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier assigned to a tracked item at intake.
///
/// Independent of any server identifier, so it stays stable while the
/// item moves from pending to uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(u64);

impl LocalId {
    /// Allocate the next unused local id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

/// Server-assigned identifier of a stored attachment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    /// Wrap a server-assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as sent over the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the entity (issue) that owns the attachments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParentId(String);

impl ParentId {
    /// Wrap an entity identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as sent over the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file picked or dropped by the user, held in memory.
///
/// The bytes are reference counted so handing a copy to an upload does
/// not duplicate the payload.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceFile {
    name: String,
    mime_type: String,
    bytes: Arc<[u8]>,
}

impl SourceFile {
    /// Create a source file from its name, declared MIME type, and bytes.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// The original filename.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The MIME type declared by the browser.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The raw file contents.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

// Payloads can be tens of megabytes; keep them out of debug output.
impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// An attachment the server has acknowledged storing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedAttachment {
    /// Server-assigned identifier.
    pub id: RemoteId,
    /// Filename as stored.
    pub filename: String,
    /// MIME type as stored.
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
}

/// Summary of a not-yet-persisted item, reported to the parent form so
/// it can show a count or hold back submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFile {
    pub local_id: LocalId,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
}

/// When accepted files are sent to the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// Hold accepted files until the parent flushes them. Used while the
    /// parent entity is being created and has no identifier yet.
    #[default]
    Deferred,
    /// Upload each accepted file right away. Used when editing an entity
    /// that already exists.
    Immediate,
}

/// Configuration supplied by the parent form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Upload timing.
    pub mode: UploadMode,

    /// Owning entity. Required for immediate mode and for removing
    /// persisted items; absent in deferred mode until the entity exists.
    pub parent_id: Option<ParentId>,

    /// Attachments already stored for the entity (edit mode).
    pub initial: Vec<PersistedAttachment>,

    /// Type and size restrictions applied at intake.
    pub limits: UploadLimits,
}

impl UploadConfig {
    /// Configuration for a form creating a new entity.
    #[must_use]
    pub fn deferred() -> Self {
        Self::default()
    }

    /// Configuration for a form editing an existing entity.
    #[must_use]
    pub fn immediate(parent_id: ParentId, initial: Vec<PersistedAttachment>) -> Self {
        Self {
            mode: UploadMode::Immediate,
            parent_id: Some(parent_id),
            initial,
            limits: UploadLimits::default(),
        }
    }
}
