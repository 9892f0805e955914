//! Upload orchestration for one attachment list.
//!
//! [`AttachmentManager`] couples an [`AttachmentSet`] with the storage
//! client and a [`PreviewArena`]. It runs on a single thread: several
//! uploads, deletes, and preview fetches may be in flight at once, each
//! suspended at its own network call, but state is only touched between
//! awaits and always through the set's transition methods.
//!
//! After [`close`](AttachmentManager::close) (component unmount) any
//! result that arrives late is dropped instead of being applied.

use std::cell::RefCell;
use std::rc::Rc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use affix_core::{
    AttachmentSet, ItemStatus, LocalId, ParentId, PendingFile, PersistedAttachment,
    PreviewArena, PreviewBackend, PreviewKind, Removal, SourceFile, TrackedItem,
    TransitionError, UploadConfig, UploadLimits, UploadMode, ValidationError, compose_notice,
};

use crate::client::AttachmentClient;

/// Maximum number of store calls in flight during one flush.
pub const FLUSH_CONCURRENCY: usize = 4;

/// Maximum number of preview downloads in flight.
pub const PREVIEW_CONCURRENCY: usize = 4;

/// Notification sent to the parent form after the attachment list
/// changes. Each carries the full current list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "files", rename_all = "snake_case")]
pub enum AttachmentChange {
    /// Deferred mode: files not yet stored on the server.
    Pending(Vec<PendingFile>),
    /// Immediate mode: files the server holds.
    Persisted(Vec<PersistedAttachment>),
}

/// Render-ready view of one tracked item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView<H> {
    pub local_id: LocalId,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    pub kind: PreviewKind,
    pub status: ItemStatus,
    /// Live preview handle, if one has been built.
    pub preview: Option<H>,
    /// A preview download is in flight.
    pub loading: bool,
}

/// Aggregate failure of [`UploadHandle::upload_all_pending`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlushError {
    /// Some uploads failed. The failed items stay in the list with an
    /// error status.
    #[error("{failed} of {attempted} attachments failed to upload")]
    Partial { failed: usize, attempted: usize },

    /// The manager uploads as files arrive under a known parent; there is
    /// nothing to flush.
    #[error("attachments upload immediately in this form; nothing is held for a flush")]
    ImmediateMode,

    /// The manager was closed before the flush finished.
    #[error("attachment list was closed")]
    Closed,
}

/// Failure of a single-item operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    /// The item's status does not allow the operation.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// A persisted item cannot be touched without knowing its owner.
    #[error("no parent entity is known yet")]
    MissingParent,

    /// The upload was attempted and failed; the item shows the error.
    #[error("upload failed: {0}")]
    Upload(String),

    /// The remote delete failed; the item stays and shows the error.
    #[error("removal failed: {0}")]
    Remove(String),

    /// The manager was closed.
    #[error("attachment list was closed")]
    Closed,
}

type ChangeListener = Rc<dyn Fn(&AttachmentChange)>;
type UpdateListener = Rc<dyn Fn()>;

struct State<B: PreviewBackend> {
    set: AttachmentSet,
    previews: PreviewArena<B>,
    parent_id: Option<ParentId>,
    /// Global, dismissible validation message.
    notice: Option<String>,
    dragging: bool,
    closed: bool,
}

struct Inner<B: PreviewBackend> {
    client: Rc<dyn AttachmentClient>,
    mode: UploadMode,
    limits: UploadLimits,
    state: RefCell<State<B>>,
    on_change: RefCell<Option<ChangeListener>>,
    on_update: RefCell<Option<UpdateListener>>,
}

/// Attachment list state plus the operations that drive it.
///
/// Cheap to clone; clones share state.
pub struct AttachmentManager<B: PreviewBackend> {
    inner: Rc<Inner<B>>,
}

impl<B: PreviewBackend> Clone for AttachmentManager<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<B: PreviewBackend> PartialEq for AttachmentManager<B> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// What the parent form holds to trigger the deferred upload.
///
/// Obtained from [`AttachmentManager::handle`].
pub struct UploadHandle<B: PreviewBackend> {
    manager: AttachmentManager<B>,
}

impl<B: PreviewBackend> Clone for UploadHandle<B> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
        }
    }
}

impl<B: PreviewBackend> UploadHandle<B> {
    /// Upload every pending item under the newly created `parent`.
    ///
    /// Call once, right after the parent entity is created. Items are
    /// uploaded independently, at most [`FLUSH_CONCURRENCY`] at a time;
    /// one failure does not stop the others. Items already on the server
    /// are skipped, so calling again only sends what is still pending.
    ///
    /// # Errors
    ///
    /// Returns [`FlushError::Partial`] if any attempted upload failed,
    /// [`FlushError::ImmediateMode`] if the manager already uploads
    /// immediately under a known parent, and
    /// [`FlushError::Closed`] if the list was closed meanwhile.
    pub async fn upload_all_pending(&self, parent: ParentId) -> Result<(), FlushError> {
        self.manager.upload_all_pending(parent).await
    }

    /// Number of items a flush would send right now.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.manager.inner.state.borrow().set.pending_ids().len()
    }
}

impl<B: PreviewBackend> AttachmentManager<B> {
    /// Create a manager for one form.
    ///
    /// Items from `config.initial` are tracked as uploaded. Their
    /// previews are not downloaded until
    /// [`load_remote_previews`](Self::load_remote_previews) runs.
    pub fn new(client: Rc<dyn AttachmentClient>, backend: B, config: UploadConfig) -> Self {
        let UploadConfig {
            mode,
            parent_id,
            initial,
            limits,
        } = config;
        if mode == UploadMode::Immediate && parent_id.is_none() {
            warn!("immediate upload mode without a parent id; files wait for a flush");
        }
        let state = State {
            set: AttachmentSet::seeded(&initial),
            previews: PreviewArena::new(backend),
            parent_id,
            notice: None,
            dragging: false,
            closed: false,
        };
        Self {
            inner: Rc::new(Inner {
                client,
                mode,
                limits,
                state: RefCell::new(state),
                on_change: RefCell::new(None),
                on_update: RefCell::new(None),
            }),
        }
    }

    /// The interface object the parent uses to flush deferred uploads.
    #[must_use]
    pub fn handle(&self) -> UploadHandle<B> {
        UploadHandle {
            manager: self.clone(),
        }
    }

    /// Register the parent's change listener, replacing any previous one.
    pub fn on_change(&self, listener: impl Fn(&AttachmentChange) + 'static) {
        *self.inner.on_change.borrow_mut() = Some(Rc::new(listener));
    }

    /// Register a listener called after every state change (re-render).
    pub fn on_update(&self, listener: impl Fn() + 'static) {
        *self.inner.on_update.borrow_mut() = Some(Rc::new(listener));
    }

    #[must_use]
    pub fn mode(&self) -> UploadMode {
        self.inner.mode
    }

    #[must_use]
    pub fn limits(&self) -> &UploadLimits {
        &self.inner.limits
    }

    #[must_use]
    pub fn parent_id(&self) -> Option<ParentId> {
        self.inner.state.borrow().parent_id.clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.borrow().closed
    }

    /// Files the server does not hold yet.
    #[must_use]
    pub fn pending_files(&self) -> Vec<PendingFile> {
        self.inner.state.borrow().set.pending_files()
    }

    /// Files the server holds.
    #[must_use]
    pub fn persisted(&self) -> Vec<PersistedAttachment> {
        self.inner.state.borrow().set.persisted()
    }

    /// The global validation message, if one is showing.
    #[must_use]
    pub fn notice(&self) -> Option<String> {
        self.inner.state.borrow().notice.clone()
    }

    /// Hide the global validation message. Tracked items are unaffected.
    pub fn dismiss_notice(&self) {
        let changed = self.inner.state.borrow_mut().notice.take().is_some();
        if changed {
            self.emit_update();
        }
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        self.inner.state.borrow().dragging
    }

    /// Track whether a drag is hovering over the drop target.
    pub fn set_dragging(&self, dragging: bool) {
        let changed = {
            let mut state = self.inner.state.borrow_mut();
            let changed = state.dragging != dragging;
            state.dragging = dragging;
            changed
        };
        if changed {
            self.emit_update();
        }
    }

    /// Snapshot of every item for rendering, in list order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ItemView<B::Handle>> {
        let state = self.inner.state.borrow();
        state
            .set
            .items()
            .iter()
            .map(|item| ItemView {
                local_id: item.local_id(),
                filename: item.filename().to_owned(),
                mime_type: item.mime_type().to_owned(),
                size: item.size(),
                kind: item.kind(),
                status: item.status().clone(),
                preview: state.previews.handle(item.local_id()).cloned(),
                loading: state.previews.is_loading(item.local_id()),
            })
            .collect()
    }

    /// Show rejections gathered before the bytes were read (the drop
    /// zone refuses oversized files without loading them).
    pub fn reject(&self, errors: &[ValidationError]) {
        let Some(notice) = compose_notice(errors) else {
            return;
        };
        {
            let mut state = self.inner.state.borrow_mut();
            if state.closed {
                return;
            }
            state.notice = Some(notice);
        }
        self.emit_update();
    }

    /// Validate and track a batch of files.
    ///
    /// Each file is judged on its own; rejections are combined into the
    /// global notice. Once the owning entity is known (immediate mode, or
    /// a deferred list that has been flushed) the accepted files are
    /// uploaded before this returns. Returns the ids of the accepted files.
    pub async fn add_files(&self, files: Vec<SourceFile>) -> Vec<LocalId> {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let parent = {
            let mut state = self.inner.state.borrow_mut();
            if state.closed {
                return accepted;
            }
            for file in files {
                if let Err(e) = self
                    .inner
                    .limits
                    .check(file.name(), file.mime_type(), file.size())
                {
                    debug!(error = %e, "rejected file");
                    rejected.push(e);
                    continue;
                }
                let id = state.set.track(file.clone());
                if PreviewKind::classify(file.mime_type()).is_inline()
                    && let Err(e) = state.previews.attach(id, file.bytes(), file.mime_type())
                {
                    warn!(%id, error = %e, "could not build local preview");
                }
                accepted.push(id);
            }
            if let Some(notice) = compose_notice(&rejected) {
                state.notice = Some(notice);
            }
            state.parent_id.clone()
        };
        self.emit_change();

        if accepted.is_empty() {
            return accepted;
        }
        match parent {
            Some(parent) => {
                self.upload_batch(&parent, accepted.clone()).await;
            }
            None if self.inner.mode == UploadMode::Immediate => warn!(
                count = accepted.len(),
                "no parent id; accepted files wait for a flush"
            ),
            None => {}
        }
        accepted
    }

    async fn upload_all_pending(&self, parent: ParentId) -> Result<(), FlushError> {
        let ids = {
            let mut state = self.inner.state.borrow_mut();
            if state.closed {
                return Err(FlushError::Closed);
            }
            // An immediate list only needs a flush while its parent is unknown.
            if self.inner.mode == UploadMode::Immediate && state.parent_id.is_some() {
                return Err(FlushError::ImmediateMode);
            }
            state.parent_id = Some(parent.clone());
            state.set.pending_ids()
        };
        if ids.is_empty() {
            debug!(%parent, "flush: nothing pending");
            return Ok(());
        }

        let (attempted, failed) = self.upload_batch(&parent, ids).await;
        info!(%parent, attempted, failed, "flush finished");

        if self.is_closed() {
            Err(FlushError::Closed)
        } else if failed > 0 {
            Err(FlushError::Partial { failed, attempted })
        } else {
            Ok(())
        }
    }

    /// Upload `ids` with bounded concurrency. Returns `(attempted, failed)`.
    async fn upload_batch(&self, parent: &ParentId, ids: Vec<LocalId>) -> (usize, usize) {
        let outcomes: Vec<Option<bool>> = stream::iter(ids)
            .map(|id| self.upload_one(parent, id))
            .buffer_unordered(FLUSH_CONCURRENCY)
            .collect()
            .await;
        let attempted = outcomes.iter().flatten().count();
        let failed = outcomes.iter().flatten().filter(|ok| !**ok).count();
        (attempted, failed)
    }

    /// Upload one item. `None` means it was skipped (no longer pending).
    async fn upload_one(&self, parent: &ParentId, id: LocalId) -> Option<bool> {
        let source = {
            let mut state = self.inner.state.borrow_mut();
            if state.closed {
                return None;
            }
            match state.set.begin_upload(id) {
                Ok(source) => source,
                Err(e) => {
                    debug!(error = %e, "skipping upload");
                    return None;
                }
            }
        };
        self.emit_update();

        let outcome = self
            .inner
            .client
            .store(parent, &source)
            .await
            .map_err(|e| {
                warn!(%id, filename = source.name(), error = %e, "upload failed");
                e.to_string()
            });
        let ok = outcome.is_ok();

        {
            let mut state = self.inner.state.borrow_mut();
            if state.closed {
                debug!(%id, "discarding upload result after close");
                return Some(ok);
            }
            if let Err(e) = state.set.finish_upload(id, outcome) {
                warn!(error = %e, "upload result did not apply");
                return Some(false);
            }
        }
        self.emit_change();
        Some(ok)
    }

    /// Send a failed upload again.
    ///
    /// If the owning entity is known the upload runs now; otherwise the
    /// item goes back to pending and waits for the flush.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Transition`] if the item is not a failed
    /// upload, [`ManagerError::Upload`] if the new attempt fails, and
    /// [`ManagerError::Closed`] after [`close`](Self::close).
    pub async fn retry(&self, id: LocalId) -> Result<(), ManagerError> {
        let parent = {
            let mut state = self.inner.state.borrow_mut();
            if state.closed {
                return Err(ManagerError::Closed);
            }
            state.set.retry(id)?;
            state.parent_id.clone()
        };
        self.emit_change();

        let Some(parent) = parent else {
            return Ok(());
        };
        match self.upload_one(&parent, id).await {
            Some(false) => {
                let message = self
                    .inner
                    .state
                    .borrow()
                    .set
                    .get(id)
                    .and_then(|item| item.error_message().map(str::to_owned))
                    .unwrap_or_default();
                Err(ManagerError::Upload(message))
            }
            Some(true) | None => Ok(()),
        }
    }

    /// Dismiss an item's error: a failed upload is dropped, a failed
    /// removal goes back to uploaded.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Transition`] if the item has no error.
    pub fn dismiss_error(&self, id: LocalId) -> Result<(), ManagerError> {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.closed {
                return Err(ManagerError::Closed);
            }
            if let Some(item) = state.set.dismiss_error(id)? {
                state.previews.release(item.local_id());
            }
        }
        self.emit_change();
        Ok(())
    }

    /// Remove an item.
    ///
    /// Local items are dropped at once. Persisted items are deleted on
    /// the server first and only dropped once that succeeds; on failure
    /// the item stays with the reason shown against it.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Transition`] while an upload or removal is
    /// in flight for the item, [`ManagerError::MissingParent`] for a
    /// persisted item when no parent is known, and
    /// [`ManagerError::Remove`] if the server refused.
    pub async fn remove(&self, id: LocalId) -> Result<(), ManagerError> {
        let target = {
            let mut state = self.inner.state.borrow_mut();
            if state.closed {
                return Err(ManagerError::Closed);
            }
            let persisted = state
                .set
                .get(id)
                .ok_or(TransitionError::UnknownItem(id))?
                .remote_id()
                .is_some();
            let parent = state.parent_id.clone();
            if persisted && parent.is_none() {
                return Err(ManagerError::MissingParent);
            }
            match state.set.begin_remove(id)? {
                Removal::Dropped(item) => {
                    state.previews.release(item.local_id());
                    None
                }
                Removal::Remote(remote_id) => parent.map(|parent| (parent, remote_id)),
            }
        };

        let Some((parent, remote_id)) = target else {
            self.emit_change();
            return Ok(());
        };
        self.emit_update();

        let outcome = self
            .inner
            .client
            .remove(&parent, &remote_id)
            .await
            .map_err(|e| {
                warn!(%id, %remote_id, error = %e, "removal failed");
                e.to_string()
            });

        let dropped = {
            let mut state = self.inner.state.borrow_mut();
            if state.closed {
                debug!(%id, "discarding removal result after close");
                return outcome.map_err(ManagerError::Remove);
            }
            let dropped = state.set.finish_remove(id, outcome.clone())?;
            if let Some(item) = &dropped {
                state.previews.release(item.local_id());
            }
            dropped.is_some()
        };
        if dropped {
            self.emit_persisted();
        } else {
            self.emit_change();
        }
        outcome.map_err(ManagerError::Remove)
    }

    /// Reconcile with a new persisted list from the parent (e.g. after a
    /// refetch) and download previews for entries that are new.
    pub async fn set_initial(&self, list: Vec<PersistedAttachment>) {
        let added = {
            let mut state = self.inner.state.borrow_mut();
            if state.closed {
                return;
            }
            let reconciled = state.set.reconcile(&list);
            for item in &reconciled.removed {
                state.previews.release(item.local_id());
            }
            reconciled.added
        };
        self.emit_change();
        self.load_previews(added).await;
    }

    /// Download previews for persisted items that have neither local
    /// bytes nor a preview yet.
    pub async fn load_remote_previews(&self) {
        let ids: Vec<LocalId> = {
            let state = self.inner.state.borrow();
            state
                .set
                .items()
                .iter()
                .filter(|item| item.source().is_none() && item.remote_id().is_some())
                .filter(|item| !state.previews.contains(item.local_id()))
                .map(TrackedItem::local_id)
                .collect()
        };
        self.load_previews(ids).await;
    }

    async fn load_previews(&self, ids: Vec<LocalId>) {
        stream::iter(ids)
            .for_each_concurrent(PREVIEW_CONCURRENCY, |id| self.fetch_preview(id))
            .await;
    }

    /// Download one persisted file and build its preview. Failures only
    /// clear the loading marker.
    async fn fetch_preview(&self, id: LocalId) {
        let request = {
            let mut state = self.inner.state.borrow_mut();
            if state.closed {
                return;
            }
            let Some(parent) = state.parent_id.clone() else {
                return;
            };
            let Some(item) = state.set.get(id) else {
                return;
            };
            if !item.kind().is_inline() {
                return;
            }
            let Some(remote_id) = item.remote_id().cloned() else {
                return;
            };
            let mime_type = item.mime_type().to_owned();
            state.previews.mark_loading(id);
            (parent, remote_id, mime_type)
        };
        self.emit_update();

        let (parent, remote_id, mime_type) = request;
        let fetched = self.inner.client.fetch(&parent, &remote_id).await;

        {
            let mut state = self.inner.state.borrow_mut();
            if state.closed {
                return;
            }
            if !state.previews.is_loading(id) || state.set.get(id).is_none() {
                // Removed or replaced while the download was in flight.
                return;
            }
            match fetched {
                Ok(bytes) => {
                    if let Err(e) = state.previews.attach(id, &bytes, &mime_type) {
                        warn!(%id, error = %e, "could not build preview");
                    }
                }
                Err(e) => {
                    debug!(%id, error = %e, "preview download failed");
                    state.previews.release(id);
                }
            }
        }
        self.emit_update();
    }

    /// Tear down: release every preview, drop tracked items and
    /// listeners, and ignore any result still in flight. Idempotent.
    pub fn close(&self) {
        let (released, dropped) = {
            let mut state = self.inner.state.borrow_mut();
            if state.closed {
                return;
            }
            state.closed = true;
            state.dragging = false;
            state.notice = None;
            (state.previews.release_all(), state.set.drain().len())
        };
        self.inner.on_change.borrow_mut().take();
        self.inner.on_update.borrow_mut().take();
        debug!(released, dropped, "attachment list closed");
    }

    /// Notify the parent of the list relevant to this mode, then re-render.
    fn emit_change(&self) {
        let change = {
            let state = self.inner.state.borrow();
            if state.closed {
                return;
            }
            match self.inner.mode {
                UploadMode::Deferred => AttachmentChange::Pending(state.set.pending_files()),
                UploadMode::Immediate => AttachmentChange::Persisted(state.set.persisted()),
            }
        };
        self.notify(&change);
    }

    /// Report the persisted list whatever the mode; a deferred list that
    /// deletes a stored file has changed what the server holds.
    fn emit_persisted(&self) {
        let change = {
            let state = self.inner.state.borrow();
            if state.closed {
                return;
            }
            AttachmentChange::Persisted(state.set.persisted())
        };
        self.notify(&change);
    }

    fn notify(&self, change: &AttachmentChange) {
        // Clone the listener out so it may call back into the manager.
        let listener = self.inner.on_change.borrow().clone();
        if let Some(listener) = listener {
            listener(change);
        }
        self.emit_update();
    }

    fn emit_update(&self) {
        if self.inner.state.borrow().closed {
            return;
        }
        let listener = self.inner.on_update.borrow().clone();
        if let Some(listener) = listener {
            listener();
        }
    }
}
