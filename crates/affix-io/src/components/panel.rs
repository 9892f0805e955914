//! The attachment panel and the hook that owns its manager.

use std::rc::Rc;

use dioxus::prelude::*;
use dioxus_free_icons::Icon;
use dioxus_free_icons::icons::ld_icons::LdX;

use affix_core::{LocalId, PersistedAttachment, UploadConfig};

use super::drop_zone::{DropZone, Intake};
use super::row::AttachmentRow;
use crate::blob::BlobUrlPreviews;
use crate::client::AttachmentClient;
use crate::manager::{AttachmentChange, AttachmentManager, ItemView, UploadHandle};

/// A mounted attachment list: the shared manager plus the signal that
/// re-renders the panel whenever the manager's state changes.
#[derive(Clone)]
pub struct Attachments {
    manager: AttachmentManager<BlobUrlPreviews>,
    revision: Signal<u64>,
}

impl PartialEq for Attachments {
    fn eq(&self, other: &Self) -> bool {
        self.manager == other.manager && self.revision == other.revision
    }
}

impl Attachments {
    #[must_use]
    pub const fn manager(&self) -> &AttachmentManager<BlobUrlPreviews> {
        &self.manager
    }

    /// The handle the parent form flushes through after creating its
    /// entity.
    #[must_use]
    pub fn handle(&self) -> UploadHandle<BlobUrlPreviews> {
        self.manager.handle()
    }

    /// Current items. Subscribes the calling component to changes.
    #[must_use]
    pub fn items(&self) -> Vec<ItemView<String>> {
        let _ = self.revision.read();
        self.manager.snapshot()
    }

    /// Current global notice. Subscribes the caller to changes.
    #[must_use]
    pub fn notice(&self) -> Option<String> {
        let _ = self.revision.read();
        self.manager.notice()
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        let _ = self.revision.read();
        self.manager.is_dragging()
    }

    /// Reconcile with a refetched persisted list in the background.
    pub fn set_initial(&self, list: Vec<PersistedAttachment>) {
        let manager = self.manager.clone();
        spawn(async move { manager.set_initial(list).await });
    }
}

/// Create the attachment manager for the calling component.
///
/// The manager is built once and closed when the component unmounts,
/// which revokes every preview URL it still holds. `on_change` receives
/// the pending list (deferred mode) or the persisted list (immediate
/// mode) after each change. Previews of `config.initial` start
/// downloading right away.
pub fn use_attachments(
    client: Rc<dyn AttachmentClient>,
    config: UploadConfig,
    on_change: EventHandler<AttachmentChange>,
) -> Attachments {
    let revision = use_signal(|| 0u64);

    let manager = use_hook(move || {
        let manager = AttachmentManager::new(client, BlobUrlPreviews, config);
        manager.on_update(move || {
            let mut revision = revision;
            revision += 1;
        });
        manager.on_change(move |change| on_change.call(change.clone()));
        let loader = manager.clone();
        spawn(async move { loader.load_remote_previews().await });
        manager
    });

    {
        let manager = manager.clone();
        use_drop(move || manager.close());
    }

    Attachments { manager, revision }
}

/// Props for the [`AttachmentPanel`] component.
#[derive(Props, Clone, PartialEq)]
pub struct AttachmentPanelProps {
    attachments: Attachments,
}

/// Drop zone, global notice, and the attachment list.
#[component]
pub fn AttachmentPanel(props: AttachmentPanelProps) -> Element {
    let attachments = props.attachments;
    let items = attachments.items();
    let notice = attachments.notice();
    let dragging = attachments.is_dragging();
    let limits = attachments.manager().limits().clone();

    let on_drag = {
        let manager = attachments.manager().clone();
        move |over: bool| manager.set_dragging(over)
    };

    let on_files = {
        let manager = attachments.manager().clone();
        move |intake: Intake| {
            manager.reject(&intake.rejected);
            if !intake.files.is_empty() {
                let manager = manager.clone();
                spawn(async move {
                    manager.add_files(intake.files).await;
                });
            }
        }
    };

    let dismiss_notice = {
        let manager = attachments.manager().clone();
        move |_: MouseEvent| manager.dismiss_notice()
    };

    let on_remove = {
        let manager = attachments.manager().clone();
        EventHandler::new(move |id: LocalId| {
            let manager = manager.clone();
            spawn(async move {
                if let Err(e) = manager.remove(id).await {
                    tracing::debug!(%id, error = %e, "remove did not complete");
                }
            });
        })
    };

    let on_retry = {
        let manager = attachments.manager().clone();
        EventHandler::new(move |id: LocalId| {
            let manager = manager.clone();
            spawn(async move {
                if let Err(e) = manager.retry(id).await {
                    tracing::debug!(%id, error = %e, "retry did not complete");
                }
            });
        })
    };

    let on_dismiss = {
        let manager = attachments.manager().clone();
        EventHandler::new(move |id: LocalId| {
            if let Err(e) = manager.dismiss_error(id) {
                tracing::debug!(%id, error = %e, "dismiss did not apply");
            }
        })
    };

    rsx! {
        div { class: "space-y-3",
            if let Some(ref message) = notice {
                div { class: "flex items-start gap-2 p-3 rounded border border-[var(--border-error)] text-[var(--text-error)] text-sm",
                    role: "alert",
                    p { class: "flex-1", "{message}" }
                    button {
                        class: "inline-flex items-center gap-1 underline cursor-pointer",
                        onclick: dismiss_notice,
                        Icon { width: 14, height: 14, icon: LdX }
                        "Dismiss"
                    }
                }
            }

            DropZone {
                limits,
                dragging,
                on_drag,
                on_files,
            }

            if !items.is_empty() {
                ul { class: "divide-y divide-[var(--border)]",
                    for item in items {
                        AttachmentRow {
                            key: "{item.local_id}",
                            item,
                            on_remove,
                            on_retry,
                            on_dismiss,
                        }
                    }
                }
            }
        }
    }
}
