use std::sync::{Arc, LazyLock};

use parking_lot::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::{
    buffer_cache::{BufferCache, CacheError, DecodedBuffer},
    waveform::{WaveformCache, WaveformPeaks},
};

static GLOBAL_CACHES: LazyLock<SharedCaches> = LazyLock::new(|| SharedCaches::new(None));

/// Handle to a buffer cache and the waveform cache derived from it.
///
/// Clones share the same caches. [`SharedCaches::global`] is the process-wide pair every engine
/// uses by default; tests build private pairs with [`SharedCaches::new`]. When both locks are
/// needed the buffer cache is always locked first.
#[derive(Debug, Clone)]
pub struct SharedCaches {
    buffers: Arc<Mutex<BufferCache>>,
    waveforms: Arc<Mutex<WaveformCache>>,
}

impl SharedCaches {
    #[must_use]
    pub fn new(max_buffers: Option<usize>) -> Self {
        Self {
            buffers: Arc::new(Mutex::new(BufferCache::new(max_buffers))),
            waveforms: Arc::new(Mutex::new(WaveformCache::new())),
        }
    }

    #[must_use]
    pub fn global() -> Self {
        GLOBAL_CACHES.clone()
    }

    pub fn buffers(&self) -> MutexGuard<'_, BufferCache> {
        self.buffers.lock()
    }

    pub fn waveforms(&self) -> MutexGuard<'_, WaveformCache> {
        self.waveforms.lock()
    }

    pub fn store(&self, clip_id: Uuid, content: impl Into<Arc<DecodedBuffer>>) {
        self.buffers().add(clip_id, content);
    }

    /// Points `new_id` at the content of `old_id` in both caches.
    pub fn copy_clip_content(&self, old_id: Uuid, new_id: Uuid) -> bool {
        let buffers_copied = self.buffers().copy(old_id, new_id);
        let waveforms_copied = self.waveforms().copy(old_id, new_id);
        buffers_copied || waveforms_copied
    }

    pub fn remove_clip_content(&self, clip_id: Uuid) {
        let mut buffers = self.buffers();
        buffers.remove(clip_id);
        self.waveforms().remove(clip_id);
    }

    /// Peaks for `clip_id`, computing them from the cached buffer on a miss.
    pub fn peaks(
        &self,
        clip_id: Uuid,
        samples_per_pixel: u32,
    ) -> Result<Arc<WaveformPeaks>, CacheError> {
        let buffers = self.buffers();
        let mut waveforms = self.waveforms();
        let peaks = waveforms.get_or_compute(clip_id, samples_per_pixel, &buffers)?;
        // Keep waveform memory from outliving evicted buffers.
        waveforms.remove_oldest_if_unused(&buffers);
        Ok(peaks)
    }

    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.buffers().memory_usage()
    }
}

impl Default for SharedCaches {
    fn default() -> Self {
        Self::global()
    }
}
