use cliplane_core::{
    AddTrackRequest, BufferCache, CacheError, Engine, EngineError, Project, SharedCaches,
    export::export_wav, fixtures::sine_buffer,
};
use uuid::Uuid;

#[test]
fn capacity_two_evicts_the_first_inserted_buffer() {
    let mut cache = BufferCache::new(Some(2));
    let [c1, c2, c3] = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    cache.add(c1, sine_buffer(8_000, 64, 100.0));
    cache.add(c2, sine_buffer(8_000, 64, 200.0));
    // Reads do not refresh age.
    assert!(cache.get(c1).is_some());
    cache.add(c3, sine_buffer(8_000, 64, 300.0));

    assert!(!cache.has(c1));
    assert!(cache.has(c2));
    assert!(cache.has(c3));
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.memory_usage(), 2 * 64 * 4);
}

fn engine_with_capacity(max_buffers: usize) -> (Engine, Uuid) {
    let mut engine = Engine::with_caches(
        Project::new("Caches", 120, 48_000),
        SharedCaches::new(Some(max_buffers)),
    );
    let track = engine.create_track(AddTrackRequest::default());
    (engine, track.id)
}

#[test]
fn evicted_clip_content_is_a_hard_miss_for_peaks() {
    let (mut engine, track) = engine_with_capacity(2);
    let ids: Vec<Uuid> = (0..3_u64)
        .map(|index| {
            engine
                .import_audio_clip(track, "Take", index * 4_800, sine_buffer(48_000, 4_800, 330.0))
                .expect("track exists")
                .id
        })
        .collect();

    assert!(matches!(
        engine.peaks_for_clip(ids[0], 256),
        Err(EngineError::Cache(CacheError::SourceMissing(id))) if id == ids[0]
    ));
    let peaks = engine
        .peaks_for_clip(ids[2], 256)
        .expect("content cached")
        .expect("clip exists");
    assert_eq!(peaks.width(), 4_800 / 256);
}

#[test]
fn stale_clip_ids_miss_quietly() {
    let (mut engine, track) = engine_with_capacity(4);
    let midi = engine
        .create_midi_clip(track, "Notes", 0, 100)
        .expect("track exists");

    assert!(matches!(engine.peaks_for_clip(Uuid::new_v4(), 512), Ok(None)));
    assert!(matches!(
        engine.peaks_for_clip(midi.id, 512),
        Err(EngineError::NotAudioClip(_))
    ));
}

#[test]
fn peaks_keep_every_requested_resolution() {
    let (mut engine, track) = engine_with_capacity(4);
    let clip = engine
        .import_audio_clip(track, "Pad", 0, sine_buffer(48_000, 8_192, 110.0))
        .expect("track exists");

    let coarse = engine.peaks_for_clip(clip.id, 1_024).expect("cached");
    let fine = engine.peaks_for_clip(clip.id, 128).expect("cached");
    assert_eq!(coarse.map(|peaks| peaks.width()), Some(8));
    assert_eq!(fine.map(|peaks| peaks.width()), Some(64));

    let resolutions: Vec<u32> = engine.caches().waveforms().resolutions(clip.id).collect();
    assert_eq!(resolutions, vec![128, 1_024]);
}

#[test]
fn imported_length_follows_the_project_sample_rate() {
    let (mut engine, track) = engine_with_capacity(4);
    let clip = engine
        .import_audio_clip(track, "Half rate", 0, sine_buffer(24_000, 12_000, 220.0))
        .expect("track exists");
    assert_eq!(clip.length(), 24_000);
}

#[test]
fn purge_keeps_content_reachable_from_undo_history() {
    let (mut engine, track) = engine_with_capacity(8);
    let clip = engine
        .import_audio_clip(track, "Take", 0, sine_buffer(48_000, 1_024, 440.0))
        .expect("track exists");
    engine.peaks_for_clip(clip.id, 512).expect("cached");
    engine.delete_clip(clip.id).expect("clip exists");

    assert_eq!(engine.purge_unreferenced_content(), 0);
    engine.undo();
    assert!(engine.clip_content(clip.id).is_some());

    engine.delete_clip(clip.id).expect("clip exists");
    engine.replace_project(Project::new("Fresh", 120, 48_000));
    assert_eq!(engine.purge_unreferenced_content(), 1);
    assert!(engine.caches().buffers().is_empty());
    assert!(engine.caches().waveforms().is_empty());
}

#[test]
fn imported_files_are_named_after_their_stem() {
    let (mut engine, track) = engine_with_capacity(4);
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let path = temp.path().join("snare_top.wav");
    export_wav(&sine_buffer(48_000, 2_400, 180.0), &path).expect("fixture wav writes");

    let clip = engine
        .import_audio_file(track, &path, 9_600)
        .expect("wav decodes");
    assert_eq!(clip.name, "snare_top");
    assert_eq!((clip.start, clip.end), (9_600, 12_000));
    assert_eq!(engine.clip_content(clip.id).map(|content| content.frames()), Some(2_400));
}
