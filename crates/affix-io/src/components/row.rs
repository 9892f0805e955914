//! One entry in the attachment list.

use dioxus::prelude::*;
use dioxus_free_icons::Icon;
use dioxus_free_icons::icons::ld_icons::{LdLoader, LdRotateCw, LdX};

use affix_core::{ItemStatus, LocalId, PreviewKind, badge, format_size};

use crate::manager::ItemView;

/// Props for the [`AttachmentRow`] component.
#[derive(Props, Clone, PartialEq)]
pub struct AttachmentRowProps {
    item: ItemView<String>,
    on_remove: EventHandler<LocalId>,
    on_retry: EventHandler<LocalId>,
    on_dismiss: EventHandler<LocalId>,
}

/// Preview, name, size, and status for one attachment.
///
/// Images render inline, videos as a playable element, and everything
/// else as a type badge. The remove button is disabled while an upload
/// or removal is in flight.
#[component]
pub fn AttachmentRow(props: AttachmentRowProps) -> Element {
    let item = &props.item;
    let id = item.local_id;
    let size = format_size(item.size);
    let busy = !item.status.is_settled();
    let on_remove = props.on_remove;
    let on_retry = props.on_retry;
    let on_dismiss = props.on_dismiss;

    let preview = match (item.kind, item.preview.as_deref()) {
        (PreviewKind::Image, Some(url)) => rsx! {
            img {
                src: "{url}",
                alt: "{item.filename}",
                class: "w-16 h-16 object-cover rounded bg-[var(--preview-bg)]",
            }
        },
        (PreviewKind::Video, Some(url)) => rsx! {
            video {
                src: "{url}",
                controls: true,
                preload: "metadata",
                class: "w-32 h-20 rounded bg-[var(--preview-bg)]",
            }
        },
        (PreviewKind::Image | PreviewKind::Video, None) if item.loading => rsx! {
            div { class: "w-16 h-16 flex items-center justify-center rounded bg-[var(--preview-bg)]",
                Icon { class: "animate-spin", width: 16, height: 16, icon: LdLoader }
            }
        },
        _ => {
            let label = badge(&item.mime_type, &item.filename);
            rsx! {
                span { class: "w-16 h-16 flex items-center justify-center rounded bg-[var(--surface-active)] text-xs font-semibold",
                    "{label}"
                }
            }
        }
    };

    let status = match &item.status {
        ItemStatus::Pending => rsx! {
            span { class: "text-[var(--muted)] text-xs", "Waiting to upload" }
        },
        ItemStatus::Uploading => rsx! {
            span { class: "text-[var(--muted)] text-xs", "Uploading..." }
        },
        ItemStatus::Uploaded { .. } => rsx! {},
        ItemStatus::Removing { .. } => rsx! {
            span { class: "text-[var(--muted)] text-xs", "Removing..." }
        },
        ItemStatus::Error { message, remote } => {
            let can_retry = remote.is_none();
            rsx! {
                div { class: "flex items-center gap-2 text-xs",
                    span { class: "text-[var(--text-error)]", "{message}" }
                    if can_retry {
                        button {
                            class: "inline-flex items-center gap-1 underline cursor-pointer",
                            onclick: move |_| on_retry.call(id),
                            Icon { width: 12, height: 12, icon: LdRotateCw }
                            "Retry"
                        }
                    }
                    button {
                        class: "underline cursor-pointer",
                        onclick: move |_| on_dismiss.call(id),
                        "Dismiss"
                    }
                }
            }
        }
    };

    rsx! {
        li { class: "flex items-center gap-3 py-2",
            {preview}
            div { class: "flex-1 min-w-0",
                p { class: "truncate", title: "{item.filename}", "{item.filename}" }
                p { class: "text-[var(--muted)] text-xs", "{size}" }
                {status}
            }
            button {
                class: "p-1 rounded hover:bg-[var(--surface-active)] disabled:opacity-50 disabled:cursor-not-allowed cursor-pointer",
                aria_label: "Remove {item.filename}",
                disabled: busy,
                onclick: move |_| on_remove.call(id),
                Icon { width: 16, height: 16, icon: LdX }
            }
        }
    }
}
