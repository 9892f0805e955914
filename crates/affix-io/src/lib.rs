//! affix-io: Attachment uploads, browser I/O, and Dioxus components.
//!
//! Drives the bookkeeping from `affix-core` against a storage client:
//! immediate and deferred uploads, the post-create flush, removal,
//! preview downloads, and teardown. Also provides object-URL previews
//! and the attachment panel for the affix web application.

pub mod blob;
pub mod client;
pub mod components;
pub mod manager;
pub mod memory;

pub use blob::BlobUrlPreviews;
pub use client::{AttachmentClient, ClientError};
pub use components::{AttachmentPanel, Attachments, DropZone, use_attachments};
pub use manager::{
    AttachmentChange, AttachmentManager, FLUSH_CONCURRENCY, FlushError, ItemView, ManagerError,
    UploadHandle,
};
pub use memory::MemoryClient;
