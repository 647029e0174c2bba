//! Sample-pack archives.
//!
//! The container itself (zip) is provided by an [`ArchiveBackend`]; this module owns the pack
//! layout: one entry per sample plus a JSON [`PackMetadata`] object stored as the archive comment.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::assets::{read_asset, scan_audio_assets};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("malformed archive: {0}")]
    Malformed(String),
    #[error("invalid pack metadata: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("failed to decode sample {name}: {reason}")]
    Decode { name: String, reason: String },
    #[error("io error: {0}")]
    Io(String),
}

impl From<anyhow::Error> for ArchiveError {
    fn from(value: anyhow::Error) -> Self {
        Self::Io(format!("{value:#}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PackMetadata {
    pub pack_name: String,
    pub last_modified: DateTime<Utc>,
    /// Total bytes of all sample entries.
    pub size: u64,
    pub total_samples: usize,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub is_dir: bool,
}

impl ArchiveEntry {
    #[must_use]
    pub fn file(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            is_dir: false,
        }
    }

    #[must_use]
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Vec::new(),
            is_dir: true,
        }
    }
}

/// Entries and comment as read back from a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawArchive {
    pub entries: Vec<ArchiveEntry>,
    pub comment: Option<String>,
}

/// The container format. Implementations live with the application.
pub trait ArchiveBackend {
    fn write_archive(&self, entries: &[ArchiveEntry], comment: &str) -> Result<Vec<u8>, ArchiveError>;

    fn read_archive(&self, bytes: &[u8]) -> Result<RawArchive, ArchiveError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBlob {
    pub name: String,
    pub data: Vec<u8>,
}

impl SampleBlob {
    /// Lower-cased extension of the entry name, used as a decoder hint.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|value| value.to_str())
            .map(str::to_ascii_lowercase)
    }

    /// File name without directories or extension.
    #[must_use]
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePack {
    pub metadata: Option<PackMetadata>,
    pub samples: Vec<SampleBlob>,
}

impl SamplePack {
    /// Pack name from the metadata, or `fallback` when the archive carried none.
    #[must_use]
    pub fn name_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.metadata
            .as_ref()
            .map_or(fallback, |metadata| metadata.pack_name.as_str())
    }
}

#[must_use]
pub fn build_metadata(
    pack_name: impl Into<String>,
    description: impl Into<String>,
    entries: &[ArchiveEntry],
) -> PackMetadata {
    let files = entries.iter().filter(|entry| !entry.is_dir);
    PackMetadata {
        pack_name: pack_name.into(),
        last_modified: Utc::now(),
        size: files.clone().map(|entry| entry.data.len() as u64).sum(),
        total_samples: files.count(),
        description: description.into(),
    }
}

#[instrument(skip(backend, entries), fields(pack_name = %pack_name, entries = entries.len()))]
pub fn export_sample_pack(
    backend: &dyn ArchiveBackend,
    pack_name: &str,
    description: &str,
    entries: &[ArchiveEntry],
) -> Result<Vec<u8>, ArchiveError> {
    let metadata = build_metadata(pack_name, description, entries);
    let comment = serde_json::to_string(&metadata)?;
    let bytes = backend.write_archive(entries, &comment)?;
    info!(
        size = metadata.size,
        total_samples = metadata.total_samples,
        "sample pack exported"
    );
    Ok(bytes)
}

/// Reads every supported audio file under `directory` as an archive entry named relative to it.
#[instrument(fields(directory = %directory.display()))]
pub fn collect_directory_entries(directory: &Path) -> anyhow::Result<Vec<ArchiveEntry>> {
    let assets = scan_audio_assets(directory)?;
    let mut entries = Vec::with_capacity(assets.len());
    for asset in &assets {
        let relative = Path::new(&asset.path)
            .strip_prefix(directory)
            .with_context(|| format!("asset outside pack directory: {}", asset.path))?;
        let name = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        entries.push(ArchiveEntry::file(name, read_asset(asset)?));
    }
    debug!(count = entries.len(), "pack entries collected");
    Ok(entries)
}

/// Splits an archive into sample blobs and optional metadata.
///
/// An absent or blank comment is fine; a comment that is present but not valid metadata fails
/// the whole import.
#[instrument(skip(backend, bytes), fields(len = bytes.len()))]
pub fn import_sample_pack(
    backend: &dyn ArchiveBackend,
    bytes: &[u8],
) -> Result<SamplePack, ArchiveError> {
    let raw = backend.read_archive(bytes)?;
    let metadata = match raw.comment.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(comment) => Some(serde_json::from_str::<PackMetadata>(comment)?),
    };

    let samples: Vec<SampleBlob> = raw
        .entries
        .into_iter()
        .filter(|entry| !entry.is_dir && !entry.name.ends_with('/'))
        .map(|entry| SampleBlob {
            name: entry.name,
            data: entry.data,
        })
        .collect();

    info!(
        samples = samples.len(),
        has_metadata = metadata.is_some(),
        "sample pack imported"
    );
    Ok(SamplePack { metadata, samples })
}
