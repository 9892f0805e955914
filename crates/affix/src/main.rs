mod config;
mod forms;

use std::rc::Rc;

use affix_core::ParentId;
use affix_io::MemoryClient;
use dioxus::prelude::*;

use config::AppConfig;
use forms::{CreateIssue, Issue, IssueEditor};

fn main() {
    dioxus::logger::initialize_default();
    let config = AppConfig::from_build_env();
    tracing::info!(?config, "starting affix");
    dioxus::LaunchBuilder::new().with_context(config).launch(app);
}

/// Root application component.
///
/// Holds the in-memory daemon and the issue list, and shows the create
/// form next to the editor for the selected issue.
fn app() -> Element {
    let config: AppConfig = use_context();
    let client = use_hook(|| Rc::new(MemoryClient::with_latency(config.latency_ms)));

    let mut issues = use_signal(Vec::<Issue>::new);
    let mut selected = use_signal(|| Option::<Issue>::None);
    // Remounts the create form (and its attachment manager) after each
    // issue is created.
    let mut form_generation = use_signal(|| 0u64);

    let next_id = ParentId::new(format!("ISSUE-{}", issues.read().len() + 1));

    let on_created = move |issue: Issue| {
        issues.write().push(issue.clone());
        selected.set(Some(issue));
        form_generation += 1;
    };

    rsx! {
        style { dangerous_inner_html: include_str!("../assets/theme.css") }

        div { class: "min-h-screen bg-(--bg) text-(--text) flex flex-col",
            header { class: "px-6 py-4 border-b border-(--border)",
                h1 { class: "text-2xl", "affix" }
                p { class: "text-(--muted) text-sm",
                    "Issues with attachments"
                }
            }

            div { class: "flex-1 flex flex-col lg:flex-row gap-6 p-6",
                // Left column: new issue
                section { class: "flex-1 space-y-3",
                    h2 { class: "text-lg font-semibold", "New issue" }
                    CreateIssue {
                        key: "{form_generation}",
                        client: Rc::clone(&client),
                        limits: config.limits.clone(),
                        issue_id: next_id,
                        on_created,
                    }
                }

                // Right column: existing issues
                section { class: "flex-1 space-y-3",
                    h2 { class: "text-lg font-semibold", "Issues" }
                    if issues.read().is_empty() {
                        p { class: "text-(--muted)", "No issues yet" }
                    }
                    ul { class: "flex flex-wrap gap-2",
                        for issue in issues() {
                            li { key: "{issue.id}",
                                button {
                                    class: "px-3 py-1 rounded border border-(--border) cursor-pointer",
                                    onclick: {
                                        let issue = issue.clone();
                                        move |_| selected.set(Some(issue.clone()))
                                    },
                                    "{issue.id}: {issue.title}"
                                }
                            }
                        }
                    }
                    if let Some(issue) = selected() {
                        IssueEditor {
                            key: "{issue.id}",
                            client: Rc::clone(&client),
                            limits: config.limits.clone(),
                            issue,
                        }
                    }
                }
            }
        }
    }
}
