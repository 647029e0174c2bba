use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

const BYTES_PER_SAMPLE: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("no decoded audio cached for clip {0}")]
    SourceMissing(Uuid),
}

/// Decoded audio, one `Vec` per channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecodedBuffer {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl DecodedBuffer {
    #[must_use]
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    #[must_use]
    pub fn from_interleaved(sample_rate: u32, channel_count: u16, samples: &[f32]) -> Self {
        let channel_count = usize::from(channel_count.max(1));
        let mut channels = vec![Vec::with_capacity(samples.len() / channel_count); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        Self::new(sample_rate, channels)
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Length in sample frames of the longest channel.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).max().unwrap_or_default()
    }

    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    #[must_use]
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    #[must_use]
    pub fn byte_estimate(&self) -> usize {
        self.frames() * self.channel_count() * BYTES_PER_SAMPLE
    }

    /// Copy of `frames` frames starting at `offset`, truncated at the end of each channel.
    #[must_use]
    pub fn slice_frames(&self, offset: usize, frames: usize) -> Self {
        let channels = self
            .channels
            .iter()
            .map(|channel| {
                let start = offset.min(channel.len());
                let end = start.saturating_add(frames).min(channel.len());
                channel[start..end].to_vec()
            })
            .collect();
        Self::new(self.sample_rate, channels)
    }
}

/// Decoded audio keyed by clip id.
///
/// Entries are shared `Arc`s so [`BufferCache::copy`] aliases content instead of cloning samples.
/// When a capacity is set the oldest *inserted* key is evicted first; reads do not refresh an
/// entry's age. Nothing here tracks clip lifetimes: callers `copy` when a clip is duplicated and
/// `remove` when its content is no longer reachable.
#[derive(Debug, Clone, Default)]
pub struct BufferCache {
    entries: HashMap<Uuid, Arc<DecodedBuffer>>,
    order: VecDeque<Uuid>,
    max_entries: Option<usize>,
}

impl BufferCache {
    /// `Some(0)` is treated as unbounded.
    #[must_use]
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_entries: max_entries.filter(|max| *max > 0),
        }
    }

    #[must_use]
    pub const fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    /// Changes the capacity, evicting the oldest entries if the cache is now over it.
    pub fn set_max_entries(&mut self, max_entries: Option<usize>) {
        self.max_entries = max_entries.filter(|max| *max > 0);
        if let Some(max) = self.max_entries {
            while self.entries.len() > max {
                self.remove_oldest();
            }
        }
    }

    /// Inserts `content` under `id`. Re-adding an existing key replaces it in place.
    pub fn add(&mut self, id: Uuid, content: impl Into<Arc<DecodedBuffer>>) {
        let content = content.into();
        if let Some(existing) = self.entries.get_mut(&id) {
            *existing = content;
            return;
        }

        self.make_room();
        self.entries.insert(id, content);
        self.order.push_back(id);
    }

    /// Aliases the entry at `old_id` under `new_id`. Returns `false` if `old_id` is not cached.
    pub fn copy(&mut self, old_id: Uuid, new_id: Uuid) -> bool {
        match self.entries.get(&old_id) {
            Some(content) => {
                let content = Arc::clone(content);
                self.add(new_id, content);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Arc<DecodedBuffer>> {
        self.entries.get(&id).cloned()
    }

    #[must_use]
    pub fn has(&self, id: Uuid) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn remove(&mut self, id: Uuid) -> Option<Arc<DecodedBuffer>> {
        let removed = self.entries.remove(&id)?;
        self.order.retain(|key| *key != id);
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in insertion order, oldest first.
    pub fn keys(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.order.iter().copied()
    }

    /// Estimated bytes held: frames × channels × 4 per entry. Aliased entries count once per key.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.entries.values().map(|entry| entry.byte_estimate()).sum()
    }

    fn make_room(&mut self) {
        if let Some(max) = self.max_entries
            && self.entries.len() >= max
        {
            self.remove_oldest();
        }
    }

    fn remove_oldest(&mut self) -> Option<Uuid> {
        let oldest = self.order.pop_front()?;
        self.entries.remove(&oldest);
        debug!(clip_id = %oldest, "evicted oldest decoded buffer");
        Some(oldest)
    }
}
