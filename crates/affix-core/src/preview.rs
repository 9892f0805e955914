//! Preview classification and preview resource bookkeeping.
//!
//! A preview handle is whatever the rendering layer needs to show a file
//! (in the browser: an object URL). Handles are acquired and released
//! through a [`PreviewBackend`]; the [`PreviewArena`] owns every live
//! handle, keyed by the item it belongs to, and guarantees each one is
//! released exactly once: when its item goes away, when it is replaced,
//! or when the arena itself is torn down.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::LocalId;

/// How an attachment is shown in the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewKind {
    /// Rendered inline as an image.
    Image,
    /// Rendered as a playable video element.
    Video,
    /// Anything else (PDF, archives, ...): a type badge plus filename.
    Document,
}

impl PreviewKind {
    /// Classify by the MIME type's top-level category.
    #[must_use]
    pub fn classify(mime_type: &str) -> Self {
        let top = mime_type.split('/').next().unwrap_or_default().trim();
        if top.eq_ignore_ascii_case("image") {
            Self::Image
        } else if top.eq_ignore_ascii_case("video") {
            Self::Video
        } else {
            Self::Document
        }
    }

    /// Whether the kind needs a preview resource at all.
    #[must_use]
    pub const fn is_inline(self) -> bool {
        matches!(self, Self::Image | Self::Video)
    }
}

/// Short uppercase label for a document badge, e.g. `PDF`.
///
/// Taken from the MIME subtype when it is short and plain, otherwise from
/// the file extension, otherwise `FILE`.
#[must_use]
pub fn badge(mime_type: &str, filename: &str) -> String {
    let subtype = mime_type
        .split_once('/')
        .map(|(_, sub)| sub.split(';').next().unwrap_or_default().trim())
        .filter(|sub| {
            !sub.is_empty() && sub.len() <= 4 && sub.chars().all(|c| c.is_ascii_alphanumeric())
        });
    if let Some(sub) = subtype {
        return sub.to_ascii_uppercase();
    }
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 4)
        .map_or_else(|| "FILE".to_owned(), str::to_ascii_uppercase)
}

/// Errors produced while building a preview.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreviewError {
    /// The rendering layer could not create the resource.
    #[error("preview backend error: {0}")]
    Backend(String),
}

/// Creates and frees preview resources.
///
/// Every handle returned by [`acquire`](Self::acquire) must be passed to
/// [`release`](Self::release) exactly once. Callers normally go through a
/// [`PreviewArena`], which enforces this.
pub trait PreviewBackend {
    /// The renderable reference, e.g. an object URL.
    type Handle: Clone;

    /// Build a preview resource from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PreviewError::Backend`] if the resource cannot be created.
    fn acquire(&mut self, bytes: &[u8], mime_type: &str) -> Result<Self::Handle, PreviewError>;

    /// Free a resource returned by [`acquire`](Self::acquire).
    fn release(&mut self, handle: Self::Handle);
}

#[derive(Debug)]
enum Slot<H> {
    Loading,
    Ready(H),
}

/// Owner of every live preview handle.
///
/// Dropping the arena releases whatever it still holds.
pub struct PreviewArena<B: PreviewBackend> {
    backend: B,
    slots: HashMap<LocalId, Slot<B::Handle>>,
}

impl<B: PreviewBackend> PreviewArena<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            slots: HashMap::new(),
        }
    }

    /// Build and store a preview for `id`, replacing (and releasing) any
    /// previous one.
    ///
    /// # Errors
    ///
    /// Propagates the backend's [`PreviewError`]. On error `id` ends up
    /// with no preview and no loading marker.
    pub fn attach(
        &mut self,
        id: LocalId,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<(), PreviewError> {
        self.release(id);
        let handle = self.backend.acquire(bytes, mime_type)?;
        self.slots.insert(id, Slot::Ready(handle));
        Ok(())
    }

    /// Mark `id` as waiting for bytes. Any previous handle is released.
    pub fn mark_loading(&mut self, id: LocalId) {
        self.release(id);
        self.slots.insert(id, Slot::Loading);
    }

    /// Whether `id` is waiting for bytes.
    #[must_use]
    pub fn is_loading(&self, id: LocalId) -> bool {
        matches!(self.slots.get(&id), Some(Slot::Loading))
    }

    /// Whether `id` has a slot, loading or ready.
    #[must_use]
    pub fn contains(&self, id: LocalId) -> bool {
        self.slots.contains_key(&id)
    }

    /// The live handle for `id`, if any.
    #[must_use]
    pub fn handle(&self, id: LocalId) -> Option<&B::Handle> {
        match self.slots.get(&id) {
            Some(Slot::Ready(handle)) => Some(handle),
            Some(Slot::Loading) | None => None,
        }
    }

    /// Drop whatever `id` holds, releasing a ready handle.
    ///
    /// Returns `true` if a handle was released. Releasing an id twice is
    /// a no-op the second time.
    pub fn release(&mut self, id: LocalId) -> bool {
        match self.slots.remove(&id) {
            Some(Slot::Ready(handle)) => {
                self.backend.release(handle);
                true
            }
            Some(Slot::Loading) | None => false,
        }
    }

    /// Release every handle. Returns how many were released.
    pub fn release_all(&mut self) -> usize {
        let mut released = 0;
        for (_, slot) in self.slots.drain() {
            if let Slot::Ready(handle) = slot {
                self.backend.release(handle);
                released += 1;
            }
        }
        released
    }

    /// Number of live handles.
    #[must_use]
    pub fn live(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }
}

impl<B: PreviewBackend> Drop for PreviewArena<B> {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// Backend that hands out numbered handles and records releases.
    #[derive(Default, Clone)]
    struct Counting {
        next: u32,
        released: Rc<RefCell<Vec<u32>>>,
        fail: bool,
    }

    impl PreviewBackend for Counting {
        type Handle = u32;

        fn acquire(&mut self, _bytes: &[u8], _mime: &str) -> Result<u32, PreviewError> {
            if self.fail {
                return Err(PreviewError::Backend("no blob support".into()));
            }
            self.next += 1;
            Ok(self.next)
        }

        fn release(&mut self, handle: u32) {
            self.released.borrow_mut().push(handle);
        }
    }

    #[test]
    fn classify_by_top_level_type() {
        assert_eq!(PreviewKind::classify("image/png"), PreviewKind::Image);
        assert_eq!(PreviewKind::classify("Video/MP4"), PreviewKind::Video);
        assert_eq!(PreviewKind::classify("application/pdf"), PreviewKind::Document);
        assert_eq!(PreviewKind::classify(""), PreviewKind::Document);
        assert!(PreviewKind::Image.is_inline());
        assert!(!PreviewKind::Document.is_inline());
    }

    #[test]
    fn badge_prefers_short_subtype_then_extension() {
        assert_eq!(badge("application/pdf", "spec.pdf"), "PDF");
        assert_eq!(badge("application/zip", "bundle.zip"), "ZIP");
        assert_eq!(
            badge(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "notes.docx"
            ),
            "DOCX"
        );
        assert_eq!(badge("application/octet-stream", "README"), "FILE");
    }

    #[test]
    fn release_happens_exactly_once() {
        let released = Rc::new(RefCell::new(Vec::new()));
        let mut arena = PreviewArena::new(Counting {
            released: Rc::clone(&released),
            ..Counting::default()
        });
        let id = LocalId::next();
        arena.attach(id, b"png", "image/png").unwrap();
        assert_eq!(arena.handle(id), Some(&1));

        assert!(arena.release(id));
        assert!(!arena.release(id));
        assert_eq!(*released.borrow(), vec![1]);
        assert_eq!(arena.live(), 0);
    }

    #[test]
    fn replacing_a_preview_releases_the_old_one() {
        let released = Rc::new(RefCell::new(Vec::new()));
        let mut arena = PreviewArena::new(Counting {
            released: Rc::clone(&released),
            ..Counting::default()
        });
        let id = LocalId::next();
        arena.attach(id, b"a", "image/png").unwrap();
        arena.attach(id, b"b", "image/png").unwrap();
        assert_eq!(*released.borrow(), vec![1]);
        assert_eq!(arena.handle(id), Some(&2));
    }

    #[test]
    fn loading_slots_hold_no_handle() {
        let mut arena = PreviewArena::new(Counting::default());
        let id = LocalId::next();
        arena.mark_loading(id);
        assert!(arena.is_loading(id));
        assert!(arena.contains(id));
        assert!(arena.handle(id).is_none());
        assert!(!arena.release(id));
        assert!(!arena.contains(id));
    }

    #[test]
    fn failed_acquire_leaves_no_slot() {
        let mut arena = PreviewArena::new(Counting {
            fail: true,
            ..Counting::default()
        });
        let id = LocalId::next();
        arena.mark_loading(id);
        assert!(arena.attach(id, b"x", "image/png").is_err());
        assert!(!arena.contains(id));
    }

    #[test]
    fn drop_releases_everything_left() {
        let released = Rc::new(RefCell::new(Vec::new()));
        {
            let mut arena = PreviewArena::new(Counting {
                released: Rc::clone(&released),
                ..Counting::default()
            });
            for _ in 0..3 {
                arena.attach(LocalId::next(), b"x", "video/mp4").unwrap();
            }
            arena.mark_loading(LocalId::next());
            assert_eq!(arena.live(), 3);
        }
        let mut released = released.borrow().clone();
        released.sort_unstable();
        assert_eq!(released, vec![1, 2, 3]);
    }
}
