use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::buffer_cache::{BufferCache, CacheError, DecodedBuffer};

/// Extremes of one block of samples.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Peak {
    pub min: f32,
    pub max: f32,
}

/// Peaks for every channel of a buffer at one zoom level.
///
/// The min/max pairs serve both drawing styles: a filled envelope when many samples fall into a
/// pixel, and a line through successive extremes when zoomed close to the samples.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaveformPeaks {
    pub samples_per_pixel: u32,
    pub channels: Vec<Vec<Peak>>,
}

impl WaveformPeaks {
    #[must_use]
    pub fn compute(buffer: &DecodedBuffer, samples_per_pixel: u32) -> Self {
        Self {
            samples_per_pixel,
            channels: buffer
                .channels
                .iter()
                .map(|channel| compute_peaks(channel, samples_per_pixel))
                .collect(),
        }
    }

    /// Width in blocks of the widest channel.
    #[must_use]
    pub fn width(&self) -> usize {
        self.channels.iter().map(Vec::len).max().unwrap_or_default()
    }
}

/// Splits `channel` into `len / samples_per_pixel` whole blocks and records each block's extremes.
/// A trailing partial block is dropped.
#[must_use]
pub fn compute_peaks(channel: &[f32], samples_per_pixel: u32) -> Vec<Peak> {
    let block = usize::try_from(samples_per_pixel.max(1)).unwrap_or(usize::MAX);
    channel
        .chunks_exact(block)
        .map(|chunk| {
            chunk.iter().fold(
                Peak {
                    min: f32::INFINITY,
                    max: f32::NEG_INFINITY,
                },
                |peak, sample| Peak {
                    min: peak.min.min(*sample),
                    max: peak.max.max(*sample),
                },
            )
        })
        .collect()
}

/// Peaks keyed by clip id, then by samples-per-pixel.
#[derive(Debug, Clone, Default)]
pub struct WaveformCache {
    entries: HashMap<Uuid, BTreeMap<u32, Arc<WaveformPeaks>>>,
    order: VecDeque<Uuid>,
}

impl WaveformCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one resolution for `id`, keeping any other resolutions already cached.
    pub fn add(&mut self, id: Uuid, peaks: impl Into<Arc<WaveformPeaks>>, resolution: u32) {
        let resolutions = self.entries.entry(id).or_insert_with(|| {
            self.order.push_back(id);
            BTreeMap::new()
        });
        resolutions.insert(resolution, peaks.into());
    }

    /// `None` means "recompute", never "draw nothing".
    #[must_use]
    pub fn get(&self, id: Uuid, resolution: u32) -> Option<Arc<WaveformPeaks>> {
        self.entries.get(&id)?.get(&resolution).cloned()
    }

    #[must_use]
    pub fn has(&self, id: Uuid) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn resolutions(&self, id: Uuid) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .get(&id)
            .into_iter()
            .flat_map(|resolutions| resolutions.keys().copied())
    }

    /// Aliases every resolution of `old_id` under `new_id`.
    pub fn copy(&mut self, old_id: Uuid, new_id: Uuid) -> bool {
        let Some(resolutions) = self.entries.get(&old_id).cloned() else {
            return false;
        };
        for (resolution, peaks) in resolutions {
            self.add(new_id, peaks, resolution);
        }
        true
    }

    pub fn remove(&mut self, id: Uuid) -> bool {
        let removed = self.entries.remove(&id).is_some();
        if removed {
            self.order.retain(|key| *key != id);
        }
        removed
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

    pub fn keys(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.order.iter().copied()
    }

    /// Drops the oldest entry, but only once its source buffer has left `buffers`.
    pub fn remove_oldest_if_unused(&mut self, buffers: &BufferCache) -> Option<Uuid> {
        let oldest = *self.order.front()?;
        if buffers.has(oldest) {
            return None;
        }
        self.order.pop_front();
        self.entries.remove(&oldest);
        debug!(clip_id = %oldest, "evicted waveform peaks of evicted buffer");
        Some(oldest)
    }

    /// Returns cached peaks or computes and caches them from the decoded buffer.
    #[instrument(skip(self, buffers), fields(clip_id = %id, resolution))]
    pub fn get_or_compute(
        &mut self,
        id: Uuid,
        resolution: u32,
        buffers: &BufferCache,
    ) -> Result<Arc<WaveformPeaks>, CacheError> {
        if let Some(peaks) = self.get(id, resolution) {
            return Ok(peaks);
        }

        let buffer = buffers.get(id).ok_or(CacheError::SourceMissing(id))?;
        let peaks = Arc::new(WaveformPeaks::compute(&buffer, resolution));
        debug!(width = peaks.width(), "waveform peaks computed");
        self.add(id, Arc::clone(&peaks), resolution);
        Ok(peaks)
    }
}
