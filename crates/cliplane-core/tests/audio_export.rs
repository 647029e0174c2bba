use cliplane_core::{
    CacheError, Engine, EngineError, ExportKind, Mp3FrameEncoder, SharedCaches,
    export::MP3_FRAME_SAMPLES,
    fixtures::{DEMO_CLIP_LENGTH, DEMO_LOOP_CLIP_ID, demo_loop_content, demo_project},
};

fn demo_engine() -> Engine {
    let engine = Engine::with_caches(demo_project(), SharedCaches::new(None));
    engine.caches().store(DEMO_LOOP_CLIP_ID, demo_loop_content());
    engine
}

#[derive(Default)]
struct BlockCounter {
    blocks: usize,
    samples: usize,
}

impl Mp3FrameEncoder for BlockCounter {
    fn encode_frame(&mut self, left: &[i16], _right: &[i16]) -> anyhow::Result<Vec<u8>> {
        self.blocks += 1;
        self.samples += left.len();
        Ok(Vec::new())
    }

    fn flush(&mut self) -> anyhow::Result<Vec<u8>> {
        Ok(vec![0xff, 0xfb])
    }
}

#[test]
fn clip_wav_export_writes_the_clip_length() {
    let engine = demo_engine();
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let path = temp.path().join("nested").join("loop.wav");

    engine
        .export_clip_audio(DEMO_LOOP_CLIP_ID, ExportKind::Wav, &path, None)
        .expect("wav export should succeed");

    let reader = hound::WavReader::open(&path).expect("exported wav should parse");
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 48_000);
    assert_eq!(spec.channels, 1);
    assert_eq!(u64::from(reader.duration()), DEMO_CLIP_LENGTH);
}

#[test]
fn split_halves_export_their_own_slice() {
    let mut engine = demo_engine();
    let (left, right) = engine
        .split_clip(DEMO_LOOP_CLIP_ID, 48_000)
        .expect("split inside the loop");

    let left_audio = engine.clip_audio(left.id).expect("left content aliased");
    let right_audio = engine.clip_audio(right.id).expect("right content aliased");
    assert_eq!(left_audio.frames(), 48_000);
    assert_eq!(right_audio.frames(), 144_000);

    let source = demo_loop_content();
    assert_eq!(right_audio.channels[0][0], source.channels[0][48_000]);
    assert_eq!(left_audio.channels[0][100], source.channels[0][100]);
}

#[test]
fn mp3_encoding_feeds_fixed_blocks() {
    let engine = demo_engine();
    let mut encoder = BlockCounter::default();
    let bytes = engine
        .encode_clip_mp3(DEMO_LOOP_CLIP_ID, &mut encoder)
        .expect("encoder accepts every block");

    let frames = usize::try_from(DEMO_CLIP_LENGTH).expect("fits in usize");
    assert_eq!(encoder.samples, frames);
    assert_eq!(encoder.blocks, frames.div_ceil(MP3_FRAME_SAMPLES));
    assert_eq!(bytes, vec![0xff, 0xfb]);
}

#[test]
fn exporting_uncached_audio_is_a_cache_error() {
    let engine = Engine::with_caches(demo_project(), SharedCaches::new(None));
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let result = engine.export_clip_audio(
        DEMO_LOOP_CLIP_ID,
        ExportKind::Wav,
        &temp.path().join("missing.wav"),
        None,
    );
    assert!(matches!(
        result,
        Err(EngineError::Cache(CacheError::SourceMissing(id))) if id == DEMO_LOOP_CLIP_ID
    ));
}

#[test]
fn midi_export_has_a_tempo_track_and_one_track_per_midi_lane() {
    let engine = demo_engine();
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let path = temp.path().join("demo.mid");
    engine.export_midi(&path).expect("midi export should succeed");

    let bytes = std::fs::read(&path).expect("midi file should exist");
    let smf = midly::Smf::parse(&bytes).expect("exported midi should parse");
    assert_eq!(smf.tracks.len(), 2);

    let note_ons = smf.tracks[1]
        .iter()
        .filter(|event| {
            matches!(
                event.kind,
                midly::TrackEventKind::Midi {
                    message: midly::MidiMessage::NoteOn { .. },
                    ..
                }
            )
        })
        .count();
    assert_eq!(note_ons, 6);
}
