//! The ordered attachment collection and its transition table.
//!
//! Every status change goes through a method here. Each method checks
//! the current status and refuses transitions that do not apply, so two
//! callers racing on one item (say, a delete and an upload) cannot both
//! succeed.
//!
//! ```text
//! Pending -> Uploading -> Uploaded -> Removing -> (dropped)
//!               |            ^           |
//!               v            | dismiss   v
//!          Error (local)     +---- Error (remote kept)
//! ```

use tracing::debug;

use crate::item::{ItemStatus, TrackedItem};
use crate::types::{LocalId, PendingFile, PersistedAttachment, RemoteId, SourceFile};

/// A transition that does not apply to the item's current status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// No item with this id is tracked (already removed, or never added).
    #[error("no tracked item {0}")]
    UnknownItem(LocalId),

    /// The item's status does not allow the requested action.
    #[error("cannot {action} item {id} while it is {status}")]
    Invalid {
        id: LocalId,
        action: &'static str,
        status: &'static str,
    },
}

/// What [`AttachmentSet::begin_remove`] decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// The item never reached the server and has been dropped.
    Dropped(TrackedItem),
    /// The item is now [`ItemStatus::Removing`]; the caller must delete
    /// this remote file and report back through
    /// [`AttachmentSet::finish_remove`].
    Remote(RemoteId),
}

/// Result of reconciling against a new persisted list.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// Items dropped because the list no longer contains them.
    pub removed: Vec<TrackedItem>,
    /// Items added for list entries not tracked before.
    pub added: Vec<LocalId>,
}

/// Ordered collection of tracked attachments.
#[derive(Debug, Default, Clone)]
pub struct AttachmentSet {
    items: Vec<TrackedItem>,
}

impl AttachmentSet {
    /// An empty set, for a form creating a new entity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A set seeded from attachments the server already holds.
    #[must_use]
    pub fn seeded(initial: &[PersistedAttachment]) -> Self {
        let mut set = Self::new();
        set.reconcile(initial);
        set
    }

    #[must_use]
    pub fn items(&self) -> &[TrackedItem] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: LocalId) -> Option<&TrackedItem> {
        self.items.iter().find(|item| item.local_id == id)
    }

    fn position(&self, id: LocalId) -> Result<usize, TransitionError> {
        self.items
            .iter()
            .position(|item| item.local_id == id)
            .ok_or(TransitionError::UnknownItem(id))
    }

    fn item_mut(&mut self, id: LocalId) -> Result<&mut TrackedItem, TransitionError> {
        let index = self.position(id)?;
        Ok(&mut self.items[index])
    }

    /// Track an accepted local file as [`ItemStatus::Pending`].
    pub fn track(&mut self, file: SourceFile) -> LocalId {
        let item = TrackedItem::local(file);
        let id = item.local_id;
        debug!(%id, filename = item.filename(), "tracking local file");
        self.items.push(item);
        id
    }

    /// Ids of every item waiting for an upload, in insertion order.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<LocalId> {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Pending)
            .map(|item| item.local_id)
            .collect()
    }

    /// Every item the server does not hold yet (pending, uploading, or
    /// failed to upload).
    #[must_use]
    pub fn pending_files(&self) -> Vec<PendingFile> {
        self.items
            .iter()
            .filter(|item| item.status.remote().is_none())
            .map(TrackedItem::pending_summary)
            .collect()
    }

    /// Every item the server holds.
    #[must_use]
    pub fn persisted(&self) -> Vec<PersistedAttachment> {
        self.items
            .iter()
            .filter_map(|item| item.status.remote().cloned())
            .collect()
    }

    /// `Pending → Uploading`. Returns the payload to send.
    ///
    /// # Errors
    ///
    /// Fails for unknown items and for items that are not pending, which
    /// makes repeated flushes skip anything already sent.
    pub fn begin_upload(&mut self, id: LocalId) -> Result<SourceFile, TransitionError> {
        let item = self.item_mut(id)?;
        let source = match (&item.status, &item.source) {
            (ItemStatus::Pending, Some(source)) => source.clone(),
            (status, _) => {
                return Err(TransitionError::Invalid {
                    id,
                    action: "upload",
                    status: status.label(),
                });
            }
        };
        item.status = ItemStatus::Uploading;
        debug!(%id, "upload started");
        Ok(source)
    }

    /// `Uploading → Uploaded` on success, `Uploading → Error` on failure.
    ///
    /// On success the local payload is released; the server copy is now
    /// authoritative.
    ///
    /// # Errors
    ///
    /// Fails for unknown items and for items not currently uploading.
    pub fn finish_upload(
        &mut self,
        id: LocalId,
        outcome: Result<PersistedAttachment, String>,
    ) -> Result<(), TransitionError> {
        let item = self.item_mut(id)?;
        if item.status != ItemStatus::Uploading {
            return Err(TransitionError::Invalid {
                id,
                action: "finish uploading",
                status: item.status.label(),
            });
        }
        match outcome {
            Ok(remote) => {
                debug!(%id, remote_id = %remote.id, "upload finished");
                item.source = None;
                item.status = ItemStatus::Uploaded { remote };
            }
            Err(message) => {
                debug!(%id, %message, "upload failed");
                item.status = ItemStatus::Error {
                    message,
                    remote: None,
                };
            }
        }
        Ok(())
    }

    /// `Error → Pending` for a failed upload, so it can be sent again.
    ///
    /// # Errors
    ///
    /// Fails for unknown items and for anything other than a failed
    /// upload. A failed removal has nothing to retry: the server copy
    /// still exists.
    pub fn retry(&mut self, id: LocalId) -> Result<(), TransitionError> {
        let item = self.item_mut(id)?;
        let failed_upload = matches!(item.status, ItemStatus::Error { remote: None, .. });
        if !failed_upload || item.source.is_none() {
            return Err(TransitionError::Invalid {
                id,
                action: "retry",
                status: item.status.label(),
            });
        }
        item.status = ItemStatus::Pending;
        debug!(%id, "queued for retry");
        Ok(())
    }

    /// Start removing an item.
    ///
    /// Items the server never stored are dropped immediately. Persisted
    /// items move to [`ItemStatus::Removing`] and stay in the set until
    /// [`finish_remove`](Self::finish_remove) confirms the delete.
    ///
    /// # Errors
    ///
    /// Fails for unknown items and while an upload or another removal is
    /// in flight.
    pub fn begin_remove(&mut self, id: LocalId) -> Result<Removal, TransitionError> {
        let index = self.position(id)?;
        let remote = match &self.items[index].status {
            ItemStatus::Pending | ItemStatus::Error { remote: None, .. } => None,
            ItemStatus::Uploaded { remote }
            | ItemStatus::Error {
                remote: Some(remote),
                ..
            } => Some(remote.clone()),
            status @ (ItemStatus::Uploading | ItemStatus::Removing { .. }) => {
                return Err(TransitionError::Invalid {
                    id,
                    action: "remove",
                    status: status.label(),
                });
            }
        };
        match remote {
            None => {
                debug!(%id, "dropping local item");
                Ok(Removal::Dropped(self.items.remove(index)))
            }
            Some(remote) => {
                let remote_id = remote.id.clone();
                debug!(%id, %remote_id, "removal started");
                self.items[index].status = ItemStatus::Removing { remote };
                Ok(Removal::Remote(remote_id))
            }
        }
    }

    /// `Removing → (dropped)` on success, `Removing → Error` on failure.
    ///
    /// Returns the dropped item on success and `None` when the item stays
    /// with an error.
    ///
    /// # Errors
    ///
    /// Fails for unknown items and for items not currently removing.
    pub fn finish_remove(
        &mut self,
        id: LocalId,
        outcome: Result<(), String>,
    ) -> Result<Option<TrackedItem>, TransitionError> {
        let index = self.position(id)?;
        let remote = match &self.items[index].status {
            ItemStatus::Removing { remote } => remote.clone(),
            status => {
                return Err(TransitionError::Invalid {
                    id,
                    action: "finish removing",
                    status: status.label(),
                });
            }
        };
        match outcome {
            Ok(()) => {
                debug!(%id, "removal finished");
                Ok(Some(self.items.remove(index)))
            }
            Err(message) => {
                debug!(%id, %message, "removal failed");
                self.items[index].status = ItemStatus::Error {
                    message,
                    remote: Some(remote),
                };
                Ok(None)
            }
        }
    }

    /// Dismiss an item's error.
    ///
    /// A failed upload is dropped (returned as `Some`). A failed removal
    /// goes back to [`ItemStatus::Uploaded`] (returns `None`).
    ///
    /// # Errors
    ///
    /// Fails for unknown items and for items without an error.
    pub fn dismiss_error(&mut self, id: LocalId) -> Result<Option<TrackedItem>, TransitionError> {
        let index = self.position(id)?;
        let remote = match &self.items[index].status {
            ItemStatus::Error { remote, .. } => remote.clone(),
            status => {
                return Err(TransitionError::Invalid {
                    id,
                    action: "dismiss the error of",
                    status: status.label(),
                });
            }
        };
        match remote {
            None => Ok(Some(self.items.remove(index))),
            Some(remote) => {
                self.items[index].status = ItemStatus::Uploaded { remote };
                Ok(None)
            }
        }
    }

    /// Bring the set in line with a persisted list from the parent.
    ///
    /// - list entries not tracked yet are added as uploaded items;
    /// - tracked items whose remote id shows up in the list become
    ///   list-owned;
    /// - list-owned items missing from the list are dropped, unless a
    ///   removal is in flight for them (its result settles them).
    ///
    /// Local items (pending, uploading, failed uploads) are untouched, as
    /// are uploads the parent has not listed yet.
    pub fn reconcile(&mut self, list: &[PersistedAttachment]) -> Reconciled {
        let mut reconciled = Reconciled::default();

        let mut kept = Vec::with_capacity(self.items.len());
        for mut item in self.items.drain(..) {
            let listed = item
                .status
                .remote()
                .is_some_and(|r| list.iter().any(|entry| entry.id == r.id));
            let in_flight = matches!(item.status, ItemStatus::Removing { .. });
            if listed {
                item.listed = true;
                kept.push(item);
            } else if item.listed && item.status.remote().is_some() && !in_flight {
                debug!(id = %item.local_id, "dropping item missing from persisted list");
                reconciled.removed.push(item);
            } else {
                kept.push(item);
            }
        }
        self.items = kept;

        for entry in list {
            let known = self
                .items
                .iter()
                .any(|item| item.status.remote().is_some_and(|r| r.id == entry.id));
            if !known {
                let item = TrackedItem::persisted(entry.clone());
                reconciled.added.push(item.local_id);
                self.items.push(item);
            }
        }

        reconciled
    }

    /// Remove and return every item (teardown).
    pub fn drain(&mut self) -> Vec<TrackedItem> {
        std::mem::take(&mut self.items)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn png(name: &str) -> SourceFile {
        SourceFile::new(name, "image/png", vec![0u8; 16])
    }

    fn remote(id: &str) -> PersistedAttachment {
        PersistedAttachment {
            id: RemoteId::new(id),
            filename: format!("{id}.png"),
            mime_type: "image/png".into(),
            size: 16,
        }
    }

    fn status(set: &AttachmentSet, id: LocalId) -> ItemStatus {
        set.get(id).unwrap().status().clone()
    }

    #[test]
    fn track_creates_pending_items_in_order() {
        let mut set = AttachmentSet::new();
        let a = set.track(png("a.png"));
        let b = set.track(png("b.png"));
        assert_eq!(set.pending_ids(), vec![a, b]);
        assert_eq!(set.pending_files().len(), 2);
        assert!(set.persisted().is_empty());
    }

    #[test]
    fn successful_upload_releases_source() {
        let mut set = AttachmentSet::new();
        let id = set.track(png("a.png"));

        let source = set.begin_upload(id).unwrap();
        assert_eq!(source.name(), "a.png");
        assert_eq!(status(&set, id), ItemStatus::Uploading);

        set.finish_upload(id, Ok(remote("r1"))).unwrap();
        let item = set.get(id).unwrap();
        assert_eq!(item.remote_id(), Some(&RemoteId::new("r1")));
        assert!(item.source().is_none());
        assert_eq!(set.persisted(), vec![remote("r1")]);
        assert!(set.pending_files().is_empty());
    }

    #[test]
    fn uploaded_items_cannot_upload_again() {
        let mut set = AttachmentSet::new();
        let id = set.track(png("a.png"));
        set.begin_upload(id).unwrap();
        set.finish_upload(id, Ok(remote("r1"))).unwrap();

        let err = set.begin_upload(id).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Invalid {
                id,
                action: "upload",
                status: "uploaded",
            }
        );
    }

    #[test]
    fn upload_cannot_start_twice() {
        let mut set = AttachmentSet::new();
        let id = set.track(png("a.png"));
        set.begin_upload(id).unwrap();
        assert!(set.begin_upload(id).is_err());
    }

    #[test]
    fn failed_upload_keeps_source_for_retry() {
        let mut set = AttachmentSet::new();
        let id = set.track(png("a.png"));
        set.begin_upload(id).unwrap();
        set.finish_upload(id, Err("quota exceeded".into())).unwrap();

        let item = set.get(id).unwrap();
        assert_eq!(item.error_message(), Some("quota exceeded"));
        assert!(item.source().is_some());
        assert_eq!(set.pending_files().len(), 1);

        set.retry(id).unwrap();
        assert_eq!(status(&set, id), ItemStatus::Pending);
        assert!(set.begin_upload(id).is_ok());
    }

    #[test]
    fn retry_only_applies_to_failed_uploads() {
        let mut set = AttachmentSet::new();
        let id = set.track(png("a.png"));
        assert!(set.retry(id).is_err());

        let missing = LocalId::next();
        assert_eq!(set.retry(missing), Err(TransitionError::UnknownItem(missing)));
    }

    #[test]
    fn removing_local_items_drops_them() {
        let mut set = AttachmentSet::new();
        let id = set.track(png("a.png"));
        let removal = set.begin_remove(id).unwrap();
        assert!(matches!(removal, Removal::Dropped(item) if item.local_id() == id));
        assert!(set.is_empty());
    }

    #[test]
    fn removing_failed_upload_drops_it() {
        let mut set = AttachmentSet::new();
        let id = set.track(png("a.png"));
        set.begin_upload(id).unwrap();
        set.finish_upload(id, Err("boom".into())).unwrap();
        assert!(matches!(set.begin_remove(id), Ok(Removal::Dropped(_))));
        assert!(set.is_empty());
    }

    #[test]
    fn removing_persisted_items_waits_for_confirmation() {
        let mut set = AttachmentSet::seeded(&[remote("r1")]);
        let id = set.items()[0].local_id();

        let removal = set.begin_remove(id).unwrap();
        assert_eq!(removal, Removal::Remote(RemoteId::new("r1")));
        assert!(matches!(status(&set, id), ItemStatus::Removing { .. }));
        assert!(set.begin_remove(id).is_err(), "second remove must be refused");

        let dropped = set.finish_remove(id, Ok(())).unwrap();
        assert_eq!(dropped.map(|item| item.local_id()), Some(id));
        assert!(set.is_empty());
    }

    #[test]
    fn failed_removal_keeps_item_with_verbatim_reason() {
        let mut set = AttachmentSet::seeded(&[remote("r1")]);
        let id = set.items()[0].local_id();
        set.begin_remove(id).unwrap();

        let dropped = set
            .finish_remove(id, Err("permission denied: read-only issue".into()))
            .unwrap();
        assert!(dropped.is_none());
        let item = set.get(id).unwrap();
        assert_eq!(
            item.error_message(),
            Some("permission denied: read-only issue")
        );
        assert_eq!(item.remote_id(), Some(&RemoteId::new("r1")));
        assert!(set.retry(id).is_err(), "failed removals are not retried as uploads");

        // Dismissing restores the uploaded state.
        assert_eq!(set.dismiss_error(id).unwrap(), None);
        assert_eq!(status(&set, id), ItemStatus::Uploaded { remote: remote("r1") });
    }

    #[test]
    fn dismissing_failed_upload_drops_item() {
        let mut set = AttachmentSet::new();
        let id = set.track(png("a.png"));
        set.begin_upload(id).unwrap();
        set.finish_upload(id, Err("boom".into())).unwrap();

        let dropped = set.dismiss_error(id).unwrap();
        assert_eq!(dropped.map(|item| item.local_id()), Some(id));
        assert!(set.is_empty());
    }

    #[test]
    fn dismiss_requires_an_error() {
        let mut set = AttachmentSet::new();
        let id = set.track(png("a.png"));
        assert!(set.dismiss_error(id).is_err());
    }

    #[test]
    fn uploading_items_cannot_be_removed() {
        let mut set = AttachmentSet::new();
        let id = set.track(png("a.png"));
        set.begin_upload(id).unwrap();
        assert!(matches!(
            set.begin_remove(id),
            Err(TransitionError::Invalid { action: "remove", .. })
        ));
    }

    #[test]
    fn reconcile_adds_and_drops_listed_items() {
        let mut set = AttachmentSet::seeded(&[remote("r1"), remote("r2")]);
        assert_eq!(set.len(), 2);

        let result = set.reconcile(&[remote("r2"), remote("r3")]);
        assert_eq!(result.removed.len(), 1);
        assert_eq!(result.removed[0].remote_id(), Some(&RemoteId::new("r1")));
        assert_eq!(result.added.len(), 1);

        let ids: Vec<_> = set
            .persisted()
            .into_iter()
            .map(|r| r.id.as_str().to_owned())
            .collect();
        assert_eq!(ids, vec!["r2", "r3"]);
    }

    #[test]
    fn reconcile_is_stable_for_the_same_list() {
        let list = [remote("r1")];
        let mut set = AttachmentSet::seeded(&list);
        let before = set.items()[0].local_id();
        let result = set.reconcile(&list);
        assert_eq!(result, Reconciled::default());
        assert_eq!(set.items()[0].local_id(), before);
    }

    #[test]
    fn reconcile_leaves_local_and_unlisted_uploads_alone() {
        let mut set = AttachmentSet::new();
        let pending = set.track(png("a.png"));
        let uploaded = set.track(png("b.png"));
        set.begin_upload(uploaded).unwrap();
        set.finish_upload(uploaded, Ok(remote("r9"))).unwrap();

        let result = set.reconcile(&[]);
        assert!(result.removed.is_empty());
        assert!(set.get(pending).is_some());
        assert!(set.get(uploaded).is_some());

        // Once listed, the upload is owned by the list and follows it.
        set.reconcile(&[remote("r9")]);
        let result = set.reconcile(&[]);
        assert_eq!(result.removed.len(), 1);
        assert!(set.get(uploaded).is_none());
    }

    #[test]
    fn reconcile_keeps_items_with_removal_in_flight() {
        let mut set = AttachmentSet::seeded(&[remote("r1")]);
        let id = set.items()[0].local_id();
        set.begin_remove(id).unwrap();

        let result = set.reconcile(&[]);
        assert!(result.removed.is_empty());
        assert!(set.finish_remove(id, Ok(())).unwrap().is_some());
    }

    #[test]
    fn drain_empties_the_set() {
        let mut set = AttachmentSet::seeded(&[remote("r1")]);
        set.track(png("a.png"));
        assert_eq!(set.drain().len(), 2);
        assert!(set.is_empty());
    }
}
