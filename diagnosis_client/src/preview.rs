use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use uterine_api::ImageUpload;

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    live: Mutex<HashSet<u64>>,
}

/// Hands out preview handles and tracks which ones have not been released yet.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    inner: Arc<RegistryInner>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, image: &ImageUpload) -> PreviewHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.live.lock().insert(id);
        tracing::trace!("Created preview {} for {}", id, image.file_name);

        PreviewHandle {
            id,
            url: format!("blob:preview/{}", id),
            content_type: image.content_type.clone(),
            bytes: image.bytes.clone(),
            registry: self.clone(),
        }
    }

    pub fn live_count(&self) -> usize {
        self.inner.live.lock().len()
    }

    pub fn is_live(&self, handle_id: u64) -> bool {
        self.inner.live.lock().contains(&handle_id)
    }

    fn release(&self, id: u64) {
        if self.inner.live.lock().remove(&id) {
            tracing::trace!("Released preview {}", id);
        }
    }
}

/// Displayable reference to a selected image. Released on drop.
#[derive(Debug)]
pub struct PreviewHandle {
    id: u64,
    url: String,
    content_type: String,
    bytes: Bytes,
    registry: PreviewRegistry,
}

impl PreviewHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}
