use cliplane_core::{AddTrackRequest, Engine, EngineError, Project, SharedCaches, TrackMixPatch};
use uuid::Uuid;

fn engine() -> Engine {
    Engine::with_caches(Project::new("Undo", 120, 48_000), SharedCaches::new(None))
}

fn clip_positions(engine: &Engine) -> Vec<(Uuid, u64)> {
    engine
        .project()
        .mixer
        .clips()
        .map(|clip| (clip.id, clip.start))
        .collect()
}

#[test]
fn one_undo_reverts_a_multi_clip_move() {
    let mut engine = engine();
    let track = engine.create_track(AddTrackRequest::default());
    for start in [0, 10_000, 20_000] {
        let clip = engine
            .create_midi_clip(track.id, "Clip", start, start + 5_000)
            .expect("track exists");
        engine.select_clip(clip.id, true).expect("clip exists");
    }
    let before = clip_positions(&engine);

    assert_eq!(engine.move_selection(2_400, 0).expect("in bounds"), 3);
    let moved = clip_positions(&engine);
    assert!(
        moved
            .iter()
            .zip(&before)
            .all(|(after, before)| after.1 == before.1 + 2_400)
    );

    assert_eq!(engine.undo().as_deref(), Some("Move clips"));
    assert_eq!(clip_positions(&engine), before);
    assert_eq!(engine.redo_label(), Some("Move clips"));
}

#[test]
fn groups_fold_nested_edits_into_one_entry() {
    let mut engine = engine();
    let track = engine.create_track(AddTrackRequest::default());

    engine
        .with_group("Build pattern", |engine| {
            for start in [0, 4_000, 8_000] {
                engine.create_midi_clip(track.id, "Beat", start, start + 2_000)?;
            }
            engine.set_bpm(96);
            Ok(())
        })
        .expect("every step succeeds");
    assert_eq!(engine.project().clip_count(), 3);
    assert_eq!(engine.undo_label(), Some("Build pattern"));

    engine.undo();
    assert_eq!(engine.project().clip_count(), 0);
    assert_eq!(engine.timeline().bpm, 120);
    assert_eq!(engine.undo_label(), Some("Create track"));
}

#[test]
fn a_new_edit_clears_the_redo_stack() {
    let mut engine = engine();
    let _first = engine.create_track(AddTrackRequest::default());
    engine.undo();
    assert!(engine.can_redo());

    let _second = engine.create_track(AddTrackRequest::default());
    assert!(!engine.can_redo());
}

#[test]
fn edits_that_change_nothing_are_not_recorded() {
    let mut engine = engine();
    engine.set_bpm(120);
    engine.set_snap_to_grid(engine.timeline().snap_to_grid);
    assert!(!engine.can_undo());
}

#[test]
fn view_changes_inside_without_undo_are_never_recorded() {
    let mut engine = engine();
    engine.without_undo(|engine| engine.set_bpm(140));
    engine.set_position(96_000);
    engine.zoom_out();

    assert_eq!(engine.timeline().bpm, 140);
    assert!(!engine.can_undo());
}

#[test]
fn a_cancelled_preview_is_not_rolled_back() {
    let mut engine = engine();
    let track = engine.create_track(AddTrackRequest::default());
    let clip = engine
        .create_midi_clip(track.id, "Clip", 0, 1_000)
        .expect("track exists");
    engine.select_clip(clip.id, false).expect("clip exists");

    // Live drag preview, then the gesture is abandoned without a commit.
    engine
        .without_undo(|engine| engine.move_selection(500, 0))
        .expect("in bounds");
    let previewed = engine.project().mixer.clip(clip.id).map(|clip| clip.start);
    assert_eq!(previewed, Some(500));
    assert_eq!(engine.undo_label(), Some("Create midi clip"));

    // Undo jumps past the preview to before the clip existed.
    engine.undo();
    assert!(engine.project().mixer.clip(clip.id).is_none());
}

#[test]
fn failed_group_leaves_no_trace() {
    let mut engine = engine();
    let track = engine.create_track(AddTrackRequest::default());

    let result: Result<(), EngineError> = engine.with_group("Half done", |engine| {
        engine.create_midi_clip(track.id, "Kept?", 0, 100)?;
        engine.add_send(track.id, track.id)?;
        Ok(())
    });
    assert!(matches!(result, Err(EngineError::Routing(_))));
    assert_eq!(engine.project().clip_count(), 0);
    assert_eq!(engine.undo_label(), Some("Create track"));
    assert!(!engine.can_redo());
}

#[test]
fn undo_depth_is_bounded() {
    let mut config = cliplane_core::CliplaneConfig::default();
    config.journal.max_depth = 3;
    let mut engine = Engine::from_config(&config);
    for bpm in 100..110 {
        engine.set_bpm(bpm);
    }

    let mut undone = 0;
    while engine.undo().is_some() {
        undone += 1;
    }
    assert_eq!(undone, 3);
    assert_eq!(engine.timeline().bpm, 106);
}

#[test]
fn playhead_zoom_and_selection_survive_undo_and_redo() {
    let mut engine = engine();
    engine.set_position(0);
    let track = engine.create_track(AddTrackRequest::default());
    let clip = engine
        .create_midi_clip(track.id, "Clip", 0, 1_000)
        .expect("track exists");
    engine.set_position(96_000);
    engine.zoom_out();
    engine.select_clip(clip.id, false).expect("clip exists");
    let zoom = engine.timeline().samples_per_pixel;

    engine.set_bpm(90);
    engine.undo();
    assert_eq!(engine.timeline().bpm, 120);
    assert_eq!(engine.timeline().position, 96_000);
    assert_eq!(engine.timeline().samples_per_pixel, zoom);
    assert_eq!(engine.project().mixer.selected_clips().count(), 1);

    engine.redo();
    assert_eq!(engine.timeline().bpm, 90);
    assert_eq!(engine.timeline().position, 96_000);
    assert_eq!(engine.timeline().samples_per_pixel, zoom);
}

#[test]
fn undo_keeps_the_selection_of_a_reverted_track() {
    let mut engine = engine();
    let track = engine.create_track(AddTrackRequest::default());
    let clip = engine
        .create_midi_clip(track.id, "Clip", 0, 1_000)
        .expect("track exists");
    engine.select_clip(clip.id, false).expect("clip exists");
    engine.move_selection(2_000, 0).expect("in bounds");
    engine.unselect_all_clips();

    engine.undo();
    let restored = engine.project().mixer.clip(clip.id).expect("clip exists");
    assert_eq!(restored.start, 0);
    assert!(!restored.selected);
}

#[test]
fn undo_leaves_suppressed_edits_on_other_tracks_alone() {
    let mut engine = engine();
    let drums = engine.create_track(AddTrackRequest::default());
    let bass = engine.create_track(AddTrackRequest::default());
    engine
        .set_track_mix(drums.id, TrackMixPatch { mute: Some(true), ..TrackMixPatch::default() })
        .expect("track exists");
    engine
        .without_undo(|engine| {
            engine.set_track_mix(bass.id, TrackMixPatch { solo: Some(true), ..TrackMixPatch::default() })
        })
        .expect("track exists");

    assert_eq!(engine.undo().as_deref(), Some("Change track mix"));
    let mixer = &engine.project().mixer;
    assert!(!mixer.track(drums.id).expect("drums").mute);
    assert!(mixer.track(bass.id).expect("bass").solo);

    engine.redo();
    let mixer = &engine.project().mixer;
    assert!(mixer.track(drums.id).expect("drums").mute);
    assert!(mixer.track(bass.id).expect("bass").solo);
}

#[test]
fn a_committed_drag_undoes_to_the_value_before_the_gesture() {
    let mut engine = engine();
    let track = engine.create_track(AddTrackRequest::default());
    let gain = |gain_db| TrackMixPatch { gain_db: Some(gain_db), ..TrackMixPatch::default() };

    for preview in [-1.0, -3.0, -6.0] {
        engine
            .without_undo(|engine| engine.set_track_mix(track.id, gain(preview)))
            .expect("track exists");
    }
    assert_eq!(engine.undo_label(), Some("Create track"));
    engine.set_track_mix(track.id, gain(-6.0)).expect("track exists");
    assert_eq!(engine.undo_label(), Some("Change track mix"));

    engine.undo();
    let restored = engine.project().mixer.track(track.id).expect("track exists");
    assert!(restored.gain_db.abs() < f32::EPSILON);
    assert_eq!(engine.undo_label(), Some("Create track"));

    engine.redo();
    let redone = engine.project().mixer.track(track.id).expect("track exists");
    assert!((redone.gain_db + 6.0).abs() < f32::EPSILON);
}

#[test]
fn a_failed_group_rolls_back_inside_without_undo() {
    let mut engine = engine();
    let track = engine.create_track(AddTrackRequest::default());

    let result = engine.without_undo(|engine| {
        engine.with_group("Replay", |engine| {
            engine.create_midi_clip(track.id, "Replayed", 0, 100)?;
            engine.create_midi_clip(Uuid::new_v4(), "Missing track", 0, 100)?;
            Ok(())
        })
    });
    assert!(matches!(result, Err(EngineError::TrackNotFound(_))));
    assert_eq!(engine.project().clip_count(), 0);
    assert_eq!(engine.undo_label(), Some("Create track"));
}

#[test]
fn a_swallowed_inner_failure_keeps_only_the_outer_changes() {
    let mut engine = engine();
    let track = engine.create_track(AddTrackRequest::default());

    engine
        .with_group("Best effort", |engine| {
            engine.create_midi_clip(track.id, "Kept", 0, 100)?;
            let inner = engine.with_group("Doomed", |engine| {
                engine.create_midi_clip(track.id, "Dropped", 200, 300)?;
                engine.add_send(track.id, track.id)?;
                Ok(())
            });
            assert!(inner.is_err());
            Ok(())
        })
        .expect("outer group succeeds");

    let names: Vec<&str> = engine
        .project()
        .mixer
        .clips()
        .map(|clip| clip.name.as_str())
        .collect();
    assert_eq!(names, vec!["Kept"]);
    engine.undo();
    assert_eq!(engine.project().clip_count(), 0);
}
