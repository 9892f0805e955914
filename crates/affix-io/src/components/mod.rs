//! Dioxus UI components for attachments.
//!
//! Provides the drop zone with its file picker, the per-attachment row,
//! and the panel tying them to an [`AttachmentManager`](crate::AttachmentManager)
//! through the [`use_attachments`] hook.

mod drop_zone;
mod panel;
mod row;

pub use drop_zone::{DropZone, Intake};
pub use panel::{AttachmentPanel, Attachments, use_attachments};
pub use row::AttachmentRow;
