//! Attachment drop zone with drag-and-drop and file picker.

use dioxus::html::{FileData, HasFileData};
use dioxus::prelude::*;
use dioxus_free_icons::Icon;
use dioxus_free_icons::icons::ld_icons::LdPaperclip;

use affix_core::{SourceFile, UploadLimits, ValidationError};

/// One batch of files read from a picker selection or a drop.
#[derive(Debug, Clone, Default)]
pub struct Intake {
    /// Files that passed the type and size checks and were read.
    pub files: Vec<SourceFile>,
    /// Files refused before (or while) reading their bytes.
    pub rejected: Vec<ValidationError>,
}

/// Check and read every file in a batch.
///
/// Type and size are checked before the bytes are loaded, so a huge
/// video is refused without reading it into memory.
async fn read_intake(limits: &UploadLimits, files: Vec<FileData>) -> Intake {
    let mut intake = Intake::default();
    for file in files {
        let name = file.name();
        let mime_type = file.content_type().unwrap_or_default();
        if let Err(e) = limits.check(&name, &mime_type, file.size()) {
            intake.rejected.push(e);
            continue;
        }
        match file.read_bytes().await {
            Ok(bytes) => intake
                .files
                .push(SourceFile::new(name, mime_type, bytes.to_vec())),
            Err(e) => intake.rejected.push(ValidationError::Unreadable {
                filename: name,
                reason: e.to_string(),
            }),
        }
    }
    intake
}

/// Props for the [`DropZone`] component.
#[derive(Props, Clone, PartialEq)]
pub struct DropZoneProps {
    /// Type and size limits; also drives the picker's `accept` filter.
    limits: UploadLimits,
    /// A drag is hovering over the zone.
    dragging: bool,
    /// Called with `true` on drag-over and `false` on leave or drop.
    on_drag: EventHandler<bool>,
    /// Called once per batch with the files read and the ones refused.
    on_files: EventHandler<Intake>,
}

/// A drag-and-drop zone with a multi-file picker button.
#[component]
pub fn DropZone(props: DropZoneProps) -> Element {
    let accept = props.limits.accept_attribute();
    let on_drag = props.on_drag;
    let on_files = props.on_files;

    let handle_files = {
        let limits = props.limits.clone();
        move |evt: FormEvent| {
            let limits = limits.clone();
            async move {
                on_files.call(read_intake(&limits, evt.files()).await);
            }
        }
    };

    let handle_drop = {
        let limits = props.limits.clone();
        move |evt: DragEvent| {
            let limits = limits.clone();
            async move {
                evt.prevent_default();
                on_drag.call(false);
                on_files.call(read_intake(&limits, evt.files()).await);
            }
        }
    };

    let border_class = if props.dragging {
        "border-[var(--border-accent)] bg-[var(--surface-active)]"
    } else {
        "border-[var(--border-muted)] bg-[var(--surface)]"
    };

    rsx! {
        div {
            class: "border-2 border-dashed rounded-lg p-4 text-center transition-colors {border_class}",
            ondragover: move |evt| {
                evt.prevent_default();
                on_drag.call(true);
            },
            ondragleave: move |_| on_drag.call(false),
            ondrop: handle_drop,

            if props.dragging {
                p { class: "text-[var(--text-accent)] font-medium", "Drop files here" }
            } else {
                p { class: "text-[var(--text-secondary)] mb-3",
                    "Drag files here or "
                }

                label {
                    class: "inline-flex items-center gap-2 px-4 py-2 bg-[var(--btn-primary)] hover:bg-[var(--btn-primary-hover)] rounded cursor-pointer text-white font-medium transition-colors",
                    input {
                        r#type: "file",
                        multiple: true,
                        accept: "{accept}",
                        class: "hidden",
                        onchange: handle_files,
                    }
                    Icon { width: 16, height: 16, icon: LdPaperclip }
                    "Attach files"
                }

                p { class: "text-[var(--muted)] text-sm mt-2",
                    "Images, videos, and PDFs up to {affix_core::format_size(props.limits.max_bytes)}"
                }
            }
        }
    }
}
