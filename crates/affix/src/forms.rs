//! Issue forms: create (deferred uploads) and edit (immediate uploads).

use std::rc::Rc;

use dioxus::prelude::*;

use affix_core::{ParentId, PendingFile, UploadConfig, UploadLimits};
use affix_io::{AttachmentChange, AttachmentPanel, MemoryClient, use_attachments};

/// An issue known to the demo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub id: ParentId,
    pub title: String,
}

/// Props for the [`CreateIssue`] form.
#[derive(Props, Clone)]
pub struct CreateIssueProps {
    client: Rc<MemoryClient>,
    limits: UploadLimits,
    /// Identifier the new issue receives once submitted.
    issue_id: ParentId,
    /// Called once the issue exists and its attachments are settled.
    on_created: EventHandler<Issue>,
}

impl PartialEq for CreateIssueProps {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.client, &other.client)
            && self.limits == other.limits
            && self.issue_id == other.issue_id
    }
}

/// New-issue form. Attachments are held locally until the issue exists,
/// then flushed under its identifier.
#[component]
pub fn CreateIssue(props: CreateIssueProps) -> Element {
    let mut title = use_signal(String::new);
    let mut pending = use_signal(Vec::<PendingFile>::new);
    let mut created = use_signal(|| Option::<Issue>::None);
    let mut submitting = use_signal(|| false);
    let mut error = use_signal(|| Option::<String>::None);
    let on_created = props.on_created;

    let config = UploadConfig {
        limits: props.limits.clone(),
        ..UploadConfig::deferred()
    };
    let attachments = use_attachments(
        props.client.clone(),
        config,
        EventHandler::new(move |change: AttachmentChange| {
            if let AttachmentChange::Pending(files) = change {
                pending.set(files);
            }
        }),
    );

    let onsubmit = {
        let attachments = attachments.clone();
        let issue_id = props.issue_id.clone();
        move |evt: FormEvent| {
            evt.prevent_default();
            if submitting() || created().is_some() || title().trim().is_empty() {
                return;
            }
            let issue = Issue {
                id: issue_id.clone(),
                title: title().trim().to_owned(),
            };
            tracing::info!(id = %issue.id, "issue created");
            created.set(Some(issue.clone()));
            submitting.set(true);
            error.set(None);

            let handle = attachments.handle();
            spawn(async move {
                let result = handle.upload_all_pending(issue.id.clone()).await;
                if let Err(e) = result {
                    tracing::warn!(id = %issue.id, error = %e, "attachment flush incomplete");
                    error.set(Some(e.to_string()));
                }
                submitting.set(false);
            });
        }
    };

    // Leave the form only once nothing is left unsent. Files dropped after
    // submit upload straight away under the new id and hold this back
    // until they land; failures wait for a retry or an explicit removal.
    use_effect(move || {
        if !attachments_settled(submitting(), &pending.read()) {
            return;
        }
        if let Some(issue) = created() {
            on_created.call(issue);
        }
    });

    let count = pending().len();
    let locked = submitting() || created().is_some();

    rsx! {
        form { class: "space-y-4", onsubmit: onsubmit,
            input {
                class: "w-full px-3 py-2 rounded border border-(--border) bg-(--surface)",
                placeholder: "Issue title",
                value: "{title}",
                disabled: locked,
                oninput: move |evt| title.set(evt.value()),
            }

            AttachmentPanel { attachments }

            if let Some(ref err) = error() {
                p { class: "text-(--text-error) text-sm",
                    "{err}. Retry or remove the failed files to finish."
                }
            } else if locked && count > 0 && !submitting() {
                p { class: "text-(--muted) text-sm",
                    "Waiting on {count} attachments. Retry or remove any that failed."
                }
            }

            button {
                r#type: "submit",
                class: "px-4 py-2 rounded bg-[var(--btn-primary)] hover:bg-[var(--btn-primary-hover)] text-white font-medium disabled:bg-[var(--btn-disabled)] disabled:text-[var(--text-disabled)]",
                disabled: locked,
                if submitting() {
                    "Uploading {count} attachments..."
                } else if count > 0 {
                    "Create issue with {count} attachments"
                } else {
                    "Create issue"
                }
            }
        }
    }
}

/// Props for the [`IssueEditor`] view.
#[derive(Props, Clone)]
pub struct IssueEditorProps {
    client: Rc<MemoryClient>,
    limits: UploadLimits,
    issue: Issue,
}

impl PartialEq for IssueEditorProps {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.client, &other.client)
            && self.limits == other.limits
            && self.issue == other.issue
    }
}

/// Existing-issue view. Attachments upload as soon as they are dropped.
///
/// Mount with a `key` of the issue id so switching issues builds a fresh
/// attachment manager.
#[component]
pub fn IssueEditor(props: IssueEditorProps) -> Element {
    let id = props.issue.id.clone();
    let initial = props.client.list(&id);
    let mut stored = use_signal(|| initial.len());

    let config = UploadConfig {
        limits: props.limits.clone(),
        ..UploadConfig::immediate(id.clone(), initial)
    };
    let attachments = use_attachments(
        props.client.clone(),
        config,
        EventHandler::new(move |change: AttachmentChange| {
            if let AttachmentChange::Persisted(files) = change {
                stored.set(files.len());
            }
        }),
    );

    let refresh = {
        let attachments = attachments.clone();
        let client = Rc::clone(&props.client);
        move |_: MouseEvent| attachments.set_initial(client.list(&id))
    };

    rsx! {
        div { class: "space-y-4",
            div { class: "flex items-baseline justify-between",
                h3 { class: "text-lg font-semibold", "{props.issue.title}" }
                span { class: "text-(--muted) text-sm", "{props.issue.id} · {stored} stored" }
            }
            AttachmentPanel { attachments }
            button {
                class: "text-sm underline cursor-pointer",
                onclick: refresh,
                "Reload from server"
            }
        }
    }
}

/// Whether a created issue may leave the form: the flush has returned and
/// every attachment reached the server or was removed.
fn attachments_settled(submitting: bool, pending: &[PendingFile]) -> bool {
    !submitting && pending.is_empty()
}

#[cfg(test)]
mod tests {
    use affix_core::LocalId;

    use super::*;

    fn pending(name: &str) -> PendingFile {
        PendingFile {
            local_id: LocalId::next(),
            filename: name.to_owned(),
            mime_type: "image/png".to_owned(),
            size: 8,
        }
    }

    #[test]
    fn form_waits_for_the_flush_to_return() {
        assert!(!attachments_settled(true, &[]));
    }

    #[test]
    fn form_waits_for_files_dropped_after_submit() {
        assert!(!attachments_settled(false, &[pending("late.png")]));
    }

    #[test]
    fn form_finishes_once_everything_is_sent() {
        assert!(attachments_settled(false, &[]));
    }
}
