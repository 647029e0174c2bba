use cliplane_core::{
    AddTrackRequest, BoundsViolation, Engine, EngineError, MidiNote, NoteName, Project,
    SharedCaches, fixtures::sine_buffer,
};
use uuid::Uuid;

fn engine_with_tracks(count: usize) -> (Engine, Vec<Uuid>) {
    let mut engine = Engine::with_caches(
        Project::new("Paste", 120, 48_000),
        SharedCaches::new(None),
    );
    let ids = (0..count)
        .map(|index| {
            engine
                .create_track(AddTrackRequest {
                    name: format!("Track {index}"),
                    ..AddTrackRequest::default()
                })
                .id
        })
        .collect();
    (engine, ids)
}

fn audio_clip(engine: &mut Engine, track_id: Uuid, start: u64) -> Uuid {
    engine
        .import_audio_clip(track_id, "Hit", start, sine_buffer(48_000, 1_000, 440.0))
        .expect("track exists")
        .id
}

#[test]
fn paste_keeps_spacing_from_the_playhead_and_aliases_content() {
    let (mut engine, tracks) = engine_with_tracks(1);
    let first = audio_clip(&mut engine, tracks[0], 1_000);
    let second = audio_clip(&mut engine, tracks[0], 3_000);
    engine.select_clip(first, false).expect("clip exists");
    engine.select_clip(second, true).expect("clip exists");
    assert_eq!(engine.copy_selection(), 2);

    engine.set_position(10_000);
    let report = engine.paste().expect("paste target exists");
    assert_eq!(report.clips.len(), 2);
    assert!(report.tracks.is_empty());
    assert_eq!(engine.undo_label(), Some("Paste"));

    let mixer = &engine.project().mixer;
    let starts: Vec<u64> = report
        .clips
        .iter()
        .map(|id| mixer.clip(*id).expect("pasted clip").start)
        .collect();
    assert_eq!(starts, vec![10_000, 12_000]);
    assert!(!report.clips.contains(&first));

    let selected: Vec<Uuid> = mixer.selected_clips().map(|clip| clip.id).collect();
    assert_eq!(selected, report.clips);

    for id in &report.clips {
        assert!(engine.clip_content(*id).is_some());
    }
}

#[test]
fn paste_falls_back_to_the_focused_track_when_the_source_is_gone() {
    let (mut engine, tracks) = engine_with_tracks(3);
    let clip = audio_clip(&mut engine, tracks[0], 0);
    engine.select_clip(clip, false).expect("clip exists");
    engine.copy_selection();
    engine.remove_track(tracks[0]).expect("track exists");

    engine.focus_track(tracks[2]).expect("track exists");
    let report = engine.paste().expect("focused track is live");
    let pasted = engine
        .project()
        .mixer
        .track(tracks[2])
        .and_then(|track| track.clip(report.clips[0]))
        .expect("pasted into the focused track");
    assert!(pasted.track.points_to(tracks[2]));
}

#[test]
fn paste_without_focus_uses_the_first_selected_then_first_track() {
    let (mut engine, tracks) = engine_with_tracks(3);
    let clip = audio_clip(&mut engine, tracks[0], 0);
    engine.select_clip(clip, false).expect("clip exists");
    engine.copy_selection();
    engine.remove_track(tracks[0]).expect("track exists");

    engine.select_track(tracks[2], false).expect("track exists");
    let report = engine.paste().expect("selected track is live");
    assert!(engine.project().mixer.tracks[1].clip(report.clips[0]).is_some());

    engine.unselect_all_tracks();
    let report = engine.paste().expect("first track is live");
    assert!(engine.project().mixer.tracks[0].clip(report.clips[0]).is_some());
}

#[test]
fn paste_with_no_tracks_left_has_no_target() {
    let (mut engine, tracks) = engine_with_tracks(1);
    let clip = audio_clip(&mut engine, tracks[0], 0);
    engine.select_clip(clip, false).expect("clip exists");
    engine.copy_selection();
    engine.remove_track(tracks[0]).expect("track exists");

    assert!(matches!(engine.paste(), Err(EngineError::NoTargetTrack)));
}

#[test]
fn paste_that_would_start_before_zero_is_rejected_whole() {
    let (mut engine, tracks) = engine_with_tracks(1);
    // Track order puts the later clip first, so the second copied clip sits before the anchor.
    let late = audio_clip(&mut engine, tracks[0], 5_000);
    let early = audio_clip(&mut engine, tracks[0], 1_000);
    engine.select_clip(late, false).expect("clip exists");
    engine.select_clip(early, true).expect("clip exists");
    engine.copy_selection();

    engine.set_position(2_000);
    assert!(matches!(
        engine.paste(),
        Err(EngineError::OutOfBounds(BoundsViolation::NegativeStart { clip })) if clip == early
    ));
    assert_eq!(engine.project().clip_count(), 2);
}

#[test]
fn copied_tracks_paste_as_new_tracks_with_fresh_ids() {
    let (mut engine, tracks) = engine_with_tracks(1);
    let clip = audio_clip(&mut engine, tracks[0], 0);
    engine.select_track(tracks[0], false).expect("track exists");
    assert_eq!(engine.copy_selection(), 1);

    let report = engine.paste().expect("tracks need no target");
    assert_eq!(report.tracks.len(), 1);
    assert_ne!(report.tracks[0], tracks[0]);

    let copy = engine
        .project()
        .mixer
        .track(report.tracks[0])
        .expect("pasted track");
    assert_eq!(copy.clips.len(), 1);
    assert_ne!(copy.clips[0].id, clip);
    assert!(copy.clips[0].track.points_to(copy.id));
    assert!(engine.clip_content(copy.clips[0].id).is_some());
}

#[test]
fn copied_notes_paste_at_the_playhead_inside_a_clip() {
    let (mut engine, tracks) = engine_with_tracks(1);
    let clip = engine
        .create_midi_clip(tracks[0], "Keys", 48_000, 144_000)
        .expect("track exists");
    let root = engine
        .add_note(clip.id, MidiNote::new(NoteName::from_midi(60), 0, 1_000, 90))
        .expect("midi clip");
    let fifth = engine
        .add_note(clip.id, MidiNote::new(NoteName::from_midi(67), 2_000, 3_000, 90))
        .expect("midi clip");
    engine.select_note(clip.id, root, false).expect("note exists");
    engine.select_note(clip.id, fifth, true).expect("note exists");
    assert_eq!(engine.copy_selected_notes(clip.id).expect("midi clip"), 2);

    engine.set_position(58_000);
    let pasted = engine.paste_notes(clip.id).expect("inside the clip");
    assert_eq!(pasted.len(), 2);

    let midi = engine
        .project()
        .mixer
        .clip(clip.id)
        .and_then(|clip| clip.as_midi())
        .expect("midi clip");
    let ons: Vec<u64> = pasted
        .iter()
        .map(|id| midi.note(*id).expect("pasted note").on)
        .collect();
    assert_eq!(ons, vec![10_000, 12_000]);
    assert_eq!(midi.selected_notes().count(), 2);
    assert!(midi.notes.iter().all(|note| note.clip.points_to(clip.id)));

    engine.set_position(0);
    assert!(matches!(
        engine.paste_notes(clip.id),
        Err(EngineError::OutOfBounds(BoundsViolation::NegativeNoteOffset { .. }))
    ));
}

#[test]
fn clips_on_a_copied_track_are_pasted_once() {
    let (mut engine, tracks) = engine_with_tracks(2);
    let inside = audio_clip(&mut engine, tracks[0], 0);
    let loose = audio_clip(&mut engine, tracks[1], 4_000);
    engine.select_track(tracks[0], false).expect("track exists");
    engine.select_clip(inside, false).expect("clip exists");
    engine.select_clip(loose, true).expect("clip exists");
    assert_eq!(engine.copy_selection(), 2);

    let clips_before = engine.project().clip_count();
    engine.set_position(8_000);
    let report = engine.paste().expect("paste target exists");
    assert_eq!(report.tracks.len(), 1);
    assert_eq!(report.clips.len(), 1);
    assert_eq!(engine.project().clip_count(), clips_before + 2);
}
