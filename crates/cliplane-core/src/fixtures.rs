use std::f32::consts::TAU;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    buffer_cache::DecodedBuffer,
    model::{AudioClip, MidiNote, NoteName, Project, Rgb, Track},
    reference::heal_references,
    routing::AuxSend,
    time::DEFAULT_SAMPLE_RATE,
};

pub const DEMO_PROJECT_ID: Uuid = Uuid::from_u128(0x9ed0_a3fa_4064_458f_b95f_1fdd_0bc4_f0be);
pub const DEMO_DRUMS_TRACK_ID: Uuid = Uuid::from_u128(0xa959_fd97_0e35_445d_a7e8_fe6d_81d4_9235);
pub const DEMO_KEYS_TRACK_ID: Uuid = Uuid::from_u128(0x2695_613e_3bef_4f17_b44d_c8e7_53f2_268e);
pub const DEMO_REVERB_TRACK_ID: Uuid = Uuid::from_u128(0x11eb_0ce5_cdb7_4f30_bc14_53a3_a1e1_0de3);
pub const DEMO_LOOP_CLIP_ID: Uuid = Uuid::from_u128(0xfbf4_1a8f_c5b4_464b_a9f3_6e62_eebf_6efb);
pub const DEMO_CHORDS_CLIP_ID: Uuid = Uuid::from_u128(0x0caa_5e8d_6ec2_4b74_9e87_d7f6_0111_f3f2);
pub const DEMO_FIRST_NOTE_ID: Uuid = Uuid::from_u128(0x3c5e_0000_7a1d_4e2b_9c44_18f0_6d2a_0001);
pub const DEMO_SEND_ID: Uuid = Uuid::from_u128(0x5d1c_7a02_98e4_4c1b_8f0d_3b6a_2e91_c470);

/// Two bars at 120 bpm and 48 kHz.
pub const DEMO_CLIP_LENGTH: u64 = 192_000;

/// Deterministic three-track project: an audio loop, a chord clip and a reverb bus fed by the
/// drums.
#[must_use]
pub fn demo_project() -> Project {
    let mut project = Project::new("Cliplane Demo", 120, DEFAULT_SAMPLE_RATE);
    project.id = DEMO_PROJECT_ID;
    let fixed_timestamp = DateTime::parse_from_rfc3339("2026-02-23T00:00:00Z")
        .expect("fixture timestamp should be valid")
        .with_timezone(&Utc);
    project.created_at = fixed_timestamp;
    project.updated_at = fixed_timestamp;

    let mut drums = Track::new("Drums", Rgb(0xf7, 0x7f, 0x00));
    drums.id = DEMO_DRUMS_TRACK_ID;
    let loop_clip = drums.create_audio_clip(
        "Loop",
        0,
        DEMO_CLIP_LENGTH,
        AudioClip {
            fade_in: 480,
            fade_out: 4_800,
            ..AudioClip::default()
        },
    );
    loop_clip.id = DEMO_LOOP_CLIP_ID;

    let mut keys = Track::new("Keys", Rgb(0x00, 0xd1, 0xb2));
    keys.id = DEMO_KEYS_TRACK_ID;
    keys.instrument = Some("Electric Piano".to_string());
    let chords = keys.create_midi_clip("Chords", 0, DEMO_CLIP_LENGTH);
    chords.id = DEMO_CHORDS_CLIP_ID;
    if let Some(midi) = chords.as_midi_mut() {
        // C major then F major, one bar each.
        let chord_tones = [(60, 0), (64, 0), (67, 0), (65, 96_000), (69, 96_000), (72, 96_000)];
        for (offset, (pitch, on)) in (0_u128..).zip(chord_tones) {
            let mut note = MidiNote::new(NoteName::from_midi(pitch), on, on + 90_000, 100);
            note.id = Uuid::from_u128(DEMO_FIRST_NOTE_ID.as_u128() + offset);
            midi.add_note(note);
        }
    }

    let mut reverb = Track::new("Reverb", Rgb(0x8e, 0x7d, 0xbe));
    reverb.id = DEMO_REVERB_TRACK_ID;
    reverb.lane_height = 48;

    project.mixer.tracks.extend([drums, keys, reverb]);
    project
        .routing
        .insert_send(AuxSend {
            id: DEMO_SEND_ID,
            from: DEMO_DRUMS_TRACK_ID,
            to: DEMO_REVERB_TRACK_ID,
        })
        .expect("fixture send should be valid");
    heal_references(&mut project.mixer);
    project
}

/// Mono sine content for audio clips.
#[must_use]
pub fn sine_buffer(sample_rate: u32, frames: usize, frequency_hz: f32) -> DecodedBuffer {
    let step = TAU * frequency_hz / sample_rate.max(1) as f32;
    let samples = (0..frames)
        .map(|frame| (frame as f32 * step).sin() * 0.5)
        .collect();
    DecodedBuffer::new(sample_rate, vec![samples])
}

/// Content matching the demo loop clip.
#[must_use]
pub fn demo_loop_content() -> DecodedBuffer {
    let frames = usize::try_from(DEMO_CLIP_LENGTH).unwrap_or(usize::MAX);
    sine_buffer(DEFAULT_SAMPLE_RATE, frames, 110.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_project_is_deterministic_and_consistent() {
        let first = demo_project();
        let second = demo_project();
        assert_eq!(first, second);
        assert_eq!(first.mixer.tracks.len(), 3);
        assert_eq!(first.note_count(), 6);
        assert_eq!(first.routing.len(), 1);

        let clip = first.mixer.clip(DEMO_CHORDS_CLIP_ID).expect("chords clip");
        assert!(clip.track.points_to(DEMO_KEYS_TRACK_ID));
        assert!(clip.track.resolve(&first.mixer).is_live());
    }

    #[test]
    fn sine_buffer_has_requested_shape() {
        let buffer = sine_buffer(8_000, 400, 440.0);
        assert_eq!(buffer.frames(), 400);
        assert_eq!(buffer.channel_count(), 1);
        assert!(buffer.channels[0].iter().all(|sample| sample.abs() <= 0.5));
    }
}
