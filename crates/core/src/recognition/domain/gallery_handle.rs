use std::sync::{Arc, PoisonError, RwLock};

use crate::recognition::domain::identity_gallery::{GalleryError, IdentityGallery};

/// Publication point for the current gallery snapshot.
///
/// Readers clone the `Arc` and match against it without holding any lock;
/// `publish` replaces the pointer in one step. A reader that took snapshot N
/// keeps it alive until it finishes, and every `snapshot()` after `publish`
/// returns the new one.
#[derive(Debug, Default)]
pub struct GalleryHandle {
    current: RwLock<Option<Arc<IdentityGallery>>>,
}

impl GalleryHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gallery(gallery: IdentityGallery) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(gallery))),
        }
    }

    /// The current snapshot, or `None` before the first publish.
    pub fn snapshot(&self) -> Option<Arc<IdentityGallery>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn version(&self) -> Option<u64> {
        self.snapshot().map(|g| g.version())
    }

    /// Swaps in `gallery` if its version is newer than the published one.
    pub fn publish(&self, gallery: IdentityGallery) -> Result<Arc<IdentityGallery>, GalleryError> {
        let next = Arc::new(gallery);
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = slot.as_ref() {
            if next.version() <= current.version() {
                return Err(GalleryError::StaleVersion {
                    current: current.version(),
                    offered: next.version(),
                });
            }
        }
        *slot = Some(Arc::clone(&next));
        drop(slot);
        log::info!(
            "Published gallery version {} ({} entries, {} students)",
            next.version(),
            next.len(),
            next.students().len()
        );
        Ok(next)
    }
}
