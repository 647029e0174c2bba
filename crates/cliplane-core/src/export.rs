use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use tracing::{debug, info, instrument, warn};

use crate::{
    buffer_cache::DecodedBuffer,
    model::{Clip, MidiNote, Project},
    time::DEFAULT_PPQ,
};

pub const MP3_BITRATE_KBPS: u32 = 128;
/// Samples per channel handed to the encoder per call.
pub const MP3_FRAME_SAMPLES: usize = 1_152;

/// Streaming MP3 encoder fed with 16-bit stereo frames.
pub trait Mp3FrameEncoder {
    fn encode_frame(&mut self, left: &[i16], right: &[i16]) -> Result<Vec<u8>>;

    /// Emits whatever the encoder still buffers.
    fn flush(&mut self) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
struct AbsoluteMidiEvent<'a> {
    tick: u64,
    order: u8,
    kind: TrackEventKind<'a>,
}

fn ensure_parent_dir(path: &Path, what: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| {
            format!("failed to create {what} output directory: {}", parent.display())
        })?;
    }
    Ok(())
}

fn quantize_sample(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
}

fn wav_spec(buffer: &DecodedBuffer) -> Result<hound::WavSpec> {
    let channels = u16::try_from(buffer.channel_count())
        .ok()
        .filter(|channels| *channels > 0)
        .ok_or_else(|| {
            anyhow::anyhow!("cannot encode {} channels as wav", buffer.channel_count())
        })?;
    Ok(hound::WavSpec {
        channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    })
}

fn write_wav_frames<W>(writer: &mut hound::WavWriter<W>, buffer: &DecodedBuffer) -> Result<()>
where
    W: std::io::Write + std::io::Seek,
{
    for frame in 0..buffer.frames() {
        for channel in &buffer.channels {
            let sample = channel.get(frame).copied().unwrap_or_default();
            writer
                .write_sample(quantize_sample(sample))
                .context("failed to write wav sample")?;
        }
    }
    Ok(())
}

/// Encodes `buffer` as a 16-bit PCM wav file in memory.
#[instrument(skip(buffer), fields(frames = buffer.frames(), channels = buffer.channel_count()))]
pub fn wav_bytes(buffer: &DecodedBuffer) -> Result<Vec<u8>> {
    let spec = wav_spec(buffer)?;
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("failed to start wav stream")?;
        write_wav_frames(&mut writer, buffer)?;
        writer.finalize().context("failed to finalize wav stream")?;
    }
    Ok(cursor.into_inner())
}

#[instrument(skip(buffer), fields(path = %path.display(), frames = buffer.frames()))]
pub fn export_wav(buffer: &DecodedBuffer, path: &Path) -> Result<()> {
    ensure_parent_dir(path, "wav")?;
    let spec = wav_spec(buffer)?;
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create wav file: {}", path.display()))?;
    write_wav_frames(&mut writer, buffer)?;
    writer.finalize().context("failed to finalize wav file")?;
    info!("wav export completed");
    Ok(())
}

/// Drives `encoder` over `buffer` in [`MP3_FRAME_SAMPLES`] blocks and flushes it at the end.
///
/// Mono input feeds the same samples to both sides; channels past the second are ignored.
#[instrument(skip(buffer, encoder), fields(frames = buffer.frames(), channels = buffer.channel_count()))]
pub fn encode_mp3(buffer: &DecodedBuffer, encoder: &mut dyn Mp3FrameEncoder) -> Result<Vec<u8>> {
    let frames = buffer.frames();
    let to_pcm = |channel: Option<&[f32]>| -> Vec<i16> {
        let mut pcm: Vec<i16> = channel
            .unwrap_or_default()
            .iter()
            .copied()
            .map(quantize_sample)
            .collect();
        pcm.resize(frames, 0);
        pcm
    };

    let left = to_pcm(buffer.channel(0));
    let right = if buffer.channel_count() > 1 {
        to_pcm(buffer.channel(1))
    } else {
        left.clone()
    };

    let mut encoded = Vec::new();
    let mut blocks = 0_usize;
    for (left_block, right_block) in left
        .chunks(MP3_FRAME_SAMPLES)
        .zip(right.chunks(MP3_FRAME_SAMPLES))
    {
        encoded.extend(encoder.encode_frame(left_block, right_block)?);
        blocks += 1;
    }
    encoded.extend(encoder.flush()?);

    debug!(blocks, bytes = encoded.len(), "mp3 encode complete");
    Ok(encoded)
}

#[instrument(skip(buffer), fields(path = %path.display(), frames = buffer.frames()))]
pub fn export_mp3(buffer: &DecodedBuffer, path: &Path, ffmpeg_binary: Option<&Path>) -> Result<()> {
    ensure_parent_dir(path, "mp3")?;

    let ffmpeg = ffmpeg_binary.map_or_else(|| PathBuf::from("ffmpeg"), Path::to_path_buf);

    let temp_dir = tempfile::tempdir().context("failed to create temporary export directory")?;
    let temp_wav = temp_dir.path().join("cliplane_export.wav");
    export_wav(buffer, &temp_wav)?;

    let bitrate = format!("{MP3_BITRATE_KBPS}k");
    let status = Command::new(&ffmpeg)
        .args([
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-i",
            temp_wav
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("invalid temporary wav path"))?,
            "-codec:a",
            "libmp3lame",
            "-b:a",
            bitrate.as_str(),
            path.to_str()
                .ok_or_else(|| anyhow::anyhow!("invalid mp3 output path"))?,
        ])
        .status()
        .with_context(|| format!("failed to spawn ffmpeg: {}", ffmpeg.display()))?;

    if !status.success() {
        return Err(anyhow::anyhow!(
            "ffmpeg exited with status {status} while exporting mp3"
        ));
    }

    info!("mp3 export completed");
    Ok(())
}

#[instrument(skip(project), fields(project_id = %project.id, path = %path.display()))]
pub fn export_midi(project: &Project, path: &Path) -> Result<()> {
    ensure_parent_dir(path, "midi")?;
    let bytes = midi_bytes(project)?;
    fs::write(path, bytes)
        .with_context(|| format!("failed to write midi file: {}", path.display()))?;
    info!("midi export completed");
    Ok(())
}

/// Standard MIDI file of every midi clip on unmuted tracks, one MIDI track per project track.
#[instrument(skip(project), fields(project_id = %project.id))]
pub fn midi_bytes(project: &Project) -> Result<Vec<u8>> {
    let mut tracks = vec![build_tempo_track(project)];

    for (track_index, track) in project.mixer.tracks.iter().enumerate() {
        if track.mute {
            continue;
        }

        let channel = u4::from((track_index % 16) as u8);
        let mut absolute_events = Vec::new();
        for clip in &track.clips {
            let Some(midi) = clip.as_midi() else {
                continue;
            };
            for note in &midi.notes {
                absolute_events.extend(note_to_midi_events(project, clip, note, channel));
            }
        }

        if absolute_events.is_empty() {
            continue;
        }

        absolute_events.sort_by_key(|event| (event.tick, event.order));

        let mut track_events = Vec::with_capacity(absolute_events.len() + 3);
        track_events.push(TrackEvent {
            delta: u28::from(0_u32),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(track.name.as_bytes())),
        });
        track_events.push(TrackEvent {
            delta: u28::from(0_u32),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::from((track_index % 128) as u8),
                },
            },
        });

        let mut previous_tick = 0_u64;
        for event in absolute_events {
            let delta = event
                .tick
                .saturating_sub(previous_tick)
                .min(u64::from(u32::MAX)) as u32;
            track_events.push(TrackEvent {
                delta: u28::from(delta),
                kind: event.kind,
            });
            previous_tick = event.tick;
        }

        track_events.push(TrackEvent {
            delta: u28::from(0_u32),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        tracks.push(track_events);
    }

    let header = Header {
        format: Format::Parallel,
        timing: Timing::Metrical(u15::from(DEFAULT_PPQ)),
    };

    let mut bytes = Vec::new();
    Smf { header, tracks }
        .write_std(&mut bytes)
        .context("failed to encode midi bytes")?;
    Ok(bytes)
}

fn build_tempo_track(project: &Project) -> Vec<TrackEvent<'static>> {
    let timeline = &project.timeline;
    let micros_per_quarter = 60_000_000 / timeline.bpm.max(1);
    let numerator = u8::try_from(timeline.time_signature.numerator).unwrap_or(4);
    let denominator_power = timeline.time_signature.denominator.max(1).trailing_zeros() as u8;

    vec![
        TrackEvent {
            delta: u28::from(0_u32),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(micros_per_quarter))),
        },
        TrackEvent {
            delta: u28::from(0_u32),
            kind: TrackEventKind::Meta(MetaMessage::TimeSignature(
                numerator,
                denominator_power,
                24,
                8,
            )),
        },
        TrackEvent {
            delta: u28::from(0_u32),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ]
}

fn note_to_midi_events<'a>(
    project: &Project,
    clip: &Clip,
    note: &MidiNote,
    channel: u4,
) -> Vec<AbsoluteMidiEvent<'a>> {
    let Some(key) = note.note.to_midi() else {
        warn!(note_id = %note.id, "skipping note outside the midi range");
        return Vec::new();
    };
    let velocity = note.velocity.min(127);

    let timeline = &project.timeline;
    let start_tick = timeline.samples_to_ticks(clip.start.saturating_add(note.on));
    let end_tick = timeline.samples_to_ticks(clip.start.saturating_add(note.off));

    vec![
        AbsoluteMidiEvent {
            tick: start_tick,
            order: 1,
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn {
                    key: u7::from(key),
                    vel: u7::from(velocity),
                },
            },
        },
        AbsoluteMidiEvent {
            tick: end_tick.max(start_tick),
            order: 0,
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff {
                    key: u7::from(key),
                    vel: u7::from(0),
                },
            },
        },
    ]
}
