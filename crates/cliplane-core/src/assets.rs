use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::{Cursor, ErrorKind},
    path::Path,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::DecoderOptions,
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::{MediaSource, MediaSourceStream},
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::buffer_cache::DecodedBuffer;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioAssetEntry {
    pub path: String,
    pub extension: String,
    pub size_bytes: u64,
}

#[instrument(fields(path = %path.display()))]
pub fn decode_audio_file(path: &Path) -> Result<DecodedBuffer> {
    let file = File::open(path)
        .with_context(|| format!("failed to open audio file: {}", path.display()))?;
    let extension = path.extension().and_then(|value| value.to_str());
    decode_source(Box::new(file), extension)
        .with_context(|| format!("failed to decode audio file: {}", path.display()))
}

/// Decodes an in-memory file, e.g. a sample read out of an archive.
#[instrument(skip(bytes), fields(len = bytes.len()))]
pub fn decode_audio_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedBuffer> {
    decode_source(Box::new(Cursor::new(bytes)), extension)
}

fn decode_source(source: Box<dyn MediaSource>, extension: Option<&str>) -> Result<DecodedBuffer> {
    let source = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        source,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow::anyhow!("no default audio track found"))?;
    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(48_000);
    let mut channels: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(error)) if error.kind() == ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                return Err(anyhow::anyhow!("audio stream reset required"));
            }
            Err(error) => return Err(error.into()),
        };

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => {
                continue;
            }
            Err(error) => return Err(error.into()),
        };

        sample_rate = decoded.spec().rate;
        push_planar_samples(decoded, &mut channels);
    }

    if channels.iter().all(Vec::is_empty) {
        return Err(anyhow::anyhow!("decoded zero samples"));
    }

    let buffer = DecodedBuffer::new(sample_rate, channels);
    debug!(
        sample_rate,
        channels = buffer.channel_count(),
        frames = buffer.frames(),
        "audio decode complete"
    );
    Ok(buffer)
}

#[instrument(fields(directory = %directory.display()))]
pub fn scan_audio_assets(directory: &Path) -> Result<Vec<AudioAssetEntry>> {
    if !directory.is_dir() {
        return Err(anyhow::anyhow!(
            "audio asset path is not a directory: {}",
            directory.display()
        ));
    }

    let extensions = supported_audio_extensions();
    let mut assets = Vec::new();

    for entry in WalkDir::new(directory).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(
                    ?error,
                    "ignoring unreadable entry while scanning audio assets"
                );
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let extension = entry
            .path()
            .extension()
            .and_then(|value| value.to_str())
            .map(str::to_ascii_lowercase);
        let Some(extension) = extension else {
            continue;
        };
        if !extensions.contains(extension.as_str()) {
            continue;
        }

        let size_bytes = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
        assets.push(AudioAssetEntry {
            path: entry.path().display().to_string(),
            extension,
            size_bytes,
        });
    }

    assets.sort_by(|left, right| left.path.cmp(&right.path));
    debug!(count = assets.len(), "audio asset scan complete");
    Ok(assets)
}

/// Reads a scanned asset back into memory.
pub fn read_asset(entry: &AudioAssetEntry) -> Result<Vec<u8>> {
    fs::read(&entry.path).with_context(|| format!("failed to read audio asset: {}", entry.path))
}

fn push_planar_samples(
    decoded: symphonia::core::audio::AudioBufferRef<'_>,
    channels: &mut Vec<Vec<f32>>,
) {
    let spec = *decoded.spec();
    let channel_count = spec.channels.count().max(1);
    if channels.len() < channel_count {
        channels.resize_with(channel_count, Vec::new);
    }

    let mut sample_buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
    sample_buffer.copy_interleaved_ref(decoded);

    for frame in sample_buffer.samples().chunks(channel_count) {
        for (channel, sample) in channels.iter_mut().zip(frame) {
            channel.push(*sample);
        }
    }
}

fn supported_audio_extensions() -> BTreeSet<&'static str> {
    [
        "wav", "flac", "mp3", "ogg", "m4a", "aiff", "aif", "caf", "mkv",
    ]
    .into_iter()
    .collect()
}
