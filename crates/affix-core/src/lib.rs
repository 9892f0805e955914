//! affix-core: Attachment bookkeeping for the issue tracker client (sans-IO).
//!
//! Tracks files a user attaches to an issue through their lifecycle:
//! intake -> validation -> pending -> uploading -> uploaded (or error)
//! -> removal. Also owns the bookkeeping for preview resources so each
//! one is released exactly once.
//!
//! This crate has **no I/O dependencies** -- it never talks to the
//! daemon or the browser. Network calls, async orchestration, and the
//! Dioxus components live in `affix-io`.

pub mod item;
pub mod preview;
pub mod set;
pub mod types;
pub mod validate;

pub use item::{ItemStatus, TrackedItem};
pub use preview::{PreviewArena, PreviewBackend, PreviewError, PreviewKind, badge};
pub use set::{AttachmentSet, Reconciled, Removal, TransitionError};
pub use types::{
    LocalId, ParentId, PendingFile, PersistedAttachment, RemoteId, SourceFile, UploadConfig,
    UploadMode,
};
pub use validate::{
    MAX_UPLOAD_BYTES, MimePattern, UploadLimits, ValidationError, compose_notice, format_size,
};
