use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    archive::{self, ArchiveBackend, ArchiveError},
    assets::{decode_audio_bytes, decode_audio_file},
    buffer_cache::{CacheError, DecodedBuffer},
    caches::SharedCaches,
    clipboard::{Clipboard, ClipboardItem},
    config::CliplaneConfig,
    export::{self, Mp3FrameEncoder},
    journal::MutationJournal,
    model::{AudioClip, Clip, ClipKind, MidiClip, MidiNote, Project, Rgb, Track},
    patch::ProjectPatch,
    persistence,
    reference::{HealReport, RefChange, ReferenceIndex, WeakRef, heal_references},
    routing::{AuxSend, RoutingError, is_valid_send},
    time::{DEFAULT_BPM, DEFAULT_SAMPLE_RATE, TimeSignature, Timeline},
    waveform::WaveformPeaks,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("track not found: {0}")]
    TrackNotFound(Uuid),
    #[error("clip not found: {0}")]
    ClipNotFound(Uuid),
    #[error("note {note} not found in clip {clip}")]
    NoteNotFound { clip: Uuid, note: Uuid },
    #[error("clip {0} is not a midi clip")]
    NotMidiClip(Uuid),
    #[error("clip {0} is not an audio clip")]
    NotAudioClip(Uuid),
    #[error("clip {0} is locked")]
    ClipLocked(Uuid),
    #[error("invalid reorder from {from} to {to}")]
    InvalidReorder { from: usize, to: usize },
    #[error("out of bounds: {0}")]
    OutOfBounds(#[from] BoundsViolation),
    #[error("no track to paste into")]
    NoTargetTrack,
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("io error: {0}")]
    Io(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(value: anyhow::Error) -> Self {
        Self::Io(format!("{value:#}"))
    }
}

/// Why a gesture was rejected. The whole change is dropped, nothing is applied.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum BoundsViolation {
    #[error("clip {clip} would start before the timeline origin")]
    NegativeStart { clip: Uuid },
    #[error("clip {clip} would leave the track lanes (lane delta {lane_delta})")]
    LaneOutOfRange { clip: Uuid, lane_delta: i64 },
    #[error("split position {position} is not strictly inside clip {clip}")]
    SplitOutsideClip { clip: Uuid, position: u64 },
    #[error("note {note} would start before its clip")]
    NegativeNoteOffset { note: Uuid },
    #[error("note {note} would leave the midi pitch range")]
    PitchOutOfRange { note: Uuid },
    #[error("range {start}..{end} ends before it starts")]
    InvalidRange { start: u64, end: u64 },
    #[error("invalid time signature {numerator}/{denominator}")]
    InvalidTimeSignature { numerator: u32, denominator: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddTrackRequest {
    pub name: String,
    pub color: Rgb,
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub lane_height: Option<u32>,
}

impl Default for AddTrackRequest {
    fn default() -> Self {
        Self {
            name: "Track".to_string(),
            color: Rgb::default(),
            instrument: None,
            lane_height: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackMixPatch {
    pub gain_db: Option<f32>,
    pub pan: Option<f32>,
    pub mute: Option<bool>,
    pub solo: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasterPatch {
    pub gain_db: Option<f32>,
    pub pan: Option<f32>,
    pub mute: Option<bool>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    Wav,
    Mp3,
}

/// Ids created by a paste, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasteReport {
    pub tracks: Vec<Uuid>,
    pub clips: Vec<Uuid>,
}

impl PasteReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty() && self.clips.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct PlannedMove {
    clip_id: Uuid,
    from_lane: usize,
    to_lane: usize,
    start: u64,
    end: u64,
}

/// Owns one project and every edit made to it.
///
/// Mutators wrap themselves in a journal group so each call undoes as one step; callers can fold
/// several calls into one step with [`Engine::with_group`]. After the outermost group of a
/// structural edit, back-references in the tree and the engine-held references (open midi editor,
/// focused track) are healed.
#[derive(Debug, Clone)]
pub struct Engine {
    project: Project,
    journal: MutationJournal<Project>,
    clipboard: Clipboard,
    caches: SharedCaches,
    editor_clip: WeakRef<Clip>,
    focused_track: WeakRef<Track>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Project::new("Untitled", DEFAULT_BPM, DEFAULT_SAMPLE_RATE))
    }
}

impl Engine {
    #[must_use]
    pub fn new(project: Project) -> Self {
        Self::with_caches(project, SharedCaches::global())
    }

    #[must_use]
    pub fn with_caches(project: Project, caches: SharedCaches) -> Self {
        let mut engine = Self {
            project,
            journal: MutationJournal::default(),
            clipboard: Clipboard::default(),
            caches,
            editor_clip: WeakRef::unattached(),
            focused_track: WeakRef::unattached(),
        };
        engine.heal_references();
        engine
    }

    /// Fresh project from the configured defaults, on the process-wide caches.
    #[must_use]
    pub fn from_config(config: &CliplaneConfig) -> Self {
        let mut project = Project::new(
            config.project.default_title.clone(),
            config.project.default_bpm,
            config.project.default_sample_rate,
        );
        apply_timeline_config(&mut project.timeline, config);

        let caches = SharedCaches::global();
        caches.buffers().set_max_entries(config.cache.max_buffers);

        let mut engine = Self::with_caches(project, caches);
        engine.journal = MutationJournal::new(config.journal.max_depth);
        engine
    }

    #[must_use]
    pub fn project(&self) -> &Project {
        &self.project
    }

    #[must_use]
    pub fn timeline(&self) -> &Timeline {
        &self.project.timeline
    }

    #[must_use]
    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    #[must_use]
    pub fn caches(&self) -> &SharedCaches {
        &self.caches
    }

    #[must_use]
    pub fn total_lane_height(&self) -> u64 {
        self.project.mixer.total_lane_height()
    }

    /// The clip open in the midi editor, if it still exists.
    #[must_use]
    pub fn editor_clip(&self) -> Option<&Clip> {
        self.editor_clip.resolve(&self.project.mixer).live()
    }

    #[must_use]
    pub fn focused_track(&self) -> Option<&Track> {
        self.focused_track.resolve(&self.project.mixer).live()
    }

    // Journal plumbing.

    fn project_mut(&mut self) -> &mut Project {
        debug_assert!(
            self.journal.in_scope(),
            "project mutated outside a journal scope"
        );
        &mut self.project
    }

    /// Re-binds clip and note back-references and detaches the editor or focus when their
    /// targets are gone. Mutators call this themselves.
    pub fn heal_references(&mut self) -> HealReport {
        let (index, report) = heal_references(&mut self.project.mixer);
        self.refresh_engine_refs(&index);
        if report.rebound > 0 || report.detached > 0 {
            debug!(
                rebound = report.rebound,
                detached = report.detached,
                "references healed"
            );
        }
        report
    }

    fn refresh_engine_refs(&mut self, index: &ReferenceIndex) {
        if let RefChange::Detached(clip_id) = self.editor_clip.refresh(index) {
            info!(clip_id = %clip_id, "midi editor closed because its clip is gone");
        }
        if let RefChange::Detached(track_id) = self.focused_track.refresh(index) {
            debug!(track_id = %track_id, "focused track is gone");
        }
    }

    fn begin(&mut self, label: &str) {
        self.journal.begin_group(label, &self.project);
    }

    fn commit(&mut self) {
        if self.journal.group_depth() == 1 {
            self.heal_references();
        }
        if self.journal.end_group(&self.project) {
            self.project.touch();
        }
    }

    fn rollback(&mut self) {
        self.journal.abort_group(&mut self.project);
        self.heal_references();
    }

    fn edit<R>(&mut self, label: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        self.begin(label);
        let result = f(self);
        self.commit();
        result
    }

    /// Runs `f` as one undo step. An `Err` puts the project back to where this group started,
    /// also when the group is nested or runs inside [`Engine::without_undo`].
    pub fn with_group<R>(
        &mut self,
        label: &str,
        f: impl FnOnce(&mut Self) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        self.begin(label);
        match f(self) {
            Ok(value) => {
                self.commit();
                Ok(value)
            }
            Err(error) => {
                self.rollback();
                Err(error)
            }
        }
    }

    /// Runs `f` without adding an undo step, unless an enclosing group is already recording.
    ///
    /// Document changes made here are folded into the next recorded step, so live previews of a
    /// gesture and the commit at its end undo together. View state (playhead, zoom, selection) is
    /// never recorded. Changes are not rolled back if a later gesture is abandoned.
    pub fn without_undo<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.journal.begin_suppressed(&self.project);
        let result = f(self);
        self.journal.end_suppressed();
        result
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.journal.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.journal.can_redo()
    }

    #[must_use]
    pub fn undo_label(&self) -> Option<&str> {
        self.journal.undo_label()
    }

    #[must_use]
    pub fn redo_label(&self) -> Option<&str> {
        self.journal.redo_label()
    }

    #[instrument(skip(self), fields(project_id = %self.project.id))]
    pub fn undo(&mut self) -> Option<String> {
        let Some(label) = self.journal.undo(&mut self.project) else {
            debug!("nothing to undo");
            return None;
        };
        self.project.touch();
        self.heal_references();
        info!(label = %label, "undone");
        Some(label)
    }

    #[instrument(skip(self), fields(project_id = %self.project.id))]
    pub fn redo(&mut self) -> Option<String> {
        let Some(label) = self.journal.redo(&mut self.project) else {
            debug!("nothing to redo");
            return None;
        };
        self.project.touch();
        self.heal_references();
        info!(label = %label, "redone");
        Some(label)
    }

    // Project and timeline.

    #[instrument(skip(self), fields(title = %title, bpm, sample_rate))]
    pub fn create_project(&mut self, title: String, bpm: u32, sample_rate: u32) {
        self.replace_project(Project::new(title, bpm.max(1), sample_rate.max(1)));
    }

    /// Swaps the document out. History, clipboard and editor state belong to the old one.
    #[instrument(skip(self, project), fields(project_id = %project.id))]
    pub fn replace_project(&mut self, project: Project) {
        self.project = project;
        self.journal.clear();
        self.clipboard.clear();
        self.editor_clip.detach();
        self.focused_track.detach();
        self.heal_references();
        info!(project_id = %self.project.id, "project replaced");
    }

    #[instrument(skip(self), fields(project_id = %self.project.id, bpm))]
    pub fn set_bpm(&mut self, bpm: u32) {
        if bpm < 1 {
            debug!("ignored tempo below 1 bpm");
            return;
        }
        self.edit("Change tempo", |engine| {
            engine.project_mut().timeline.set_bpm(bpm);
        });
        info!("tempo changed");
    }

    #[instrument(skip(self), fields(project_id = %self.project.id, numerator, denominator))]
    pub fn set_time_signature(&mut self, numerator: u32, denominator: u32) -> Result<(), EngineError> {
        if numerator == 0 || !denominator.is_power_of_two() {
            warn!("rejected time signature");
            return Err(BoundsViolation::InvalidTimeSignature {
                numerator,
                denominator,
            }
            .into());
        }
        self.edit("Change time signature", |engine| {
            engine.project_mut().timeline.time_signature = TimeSignature::new(numerator, denominator);
        });
        info!("time signature changed");
        Ok(())
    }

    #[instrument(skip(self), fields(project_id = %self.project.id, snap_to_grid))]
    pub fn set_snap_to_grid(&mut self, snap_to_grid: bool) {
        self.edit("Toggle snap", |engine| {
            engine.project_mut().timeline.snap_to_grid = snap_to_grid;
        });
    }

    #[instrument(skip(self), fields(project_id = %self.project.id, subdivision))]
    pub fn set_subdivision(&mut self, subdivision: u32) {
        if subdivision == 0 {
            debug!("ignored zero grid subdivision");
            return;
        }
        self.edit("Change grid", |engine| {
            engine.project_mut().timeline.subdivision = subdivision;
        });
    }

    /// Moves the playhead. View state, so it is never an undo step of its own.
    pub fn set_position(&mut self, position: u64) {
        self.without_undo(|engine| engine.project_mut().timeline.set_position(position));
    }

    pub fn zoom_in(&mut self) {
        self.without_undo(|engine| engine.project_mut().timeline.zoom_in());
    }

    pub fn zoom_out(&mut self) {
        self.without_undo(|engine| engine.project_mut().timeline.zoom_out());
    }

    pub fn set_zoom(&mut self, samples_per_pixel: u32) {
        self.without_undo(|engine| engine.project_mut().timeline.set_zoom(samples_per_pixel));
    }

    // Tracks.

    #[instrument(skip(self), fields(project_id = %self.project.id, track_name = %request.name))]
    pub fn create_track(&mut self, request: AddTrackRequest) -> Track {
        let mut track = Track::new(request.name, request.color);
        track.instrument = request.instrument;
        if let Some(lane_height) = request.lane_height {
            track.lane_height = lane_height.max(1);
        }

        self.edit("Create track", |engine| {
            engine.project_mut().mixer.tracks.push(track.clone());
        });
        info!(track_id = %track.id, "track created");
        track
    }

    /// Removes a track with its clips and every send that names it.
    #[instrument(skip(self), fields(project_id = %self.project.id, track_id = %track_id))]
    pub fn remove_track(&mut self, track_id: Uuid) -> Result<Track, EngineError> {
        let index = self
            .project
            .mixer
            .track_index(track_id)
            .ok_or(EngineError::TrackNotFound(track_id))?;

        let (track, removed_sends) = self.edit("Delete track", |engine| {
            let project = engine.project_mut();
            let track = project.mixer.tracks.remove(index);
            let removed_sends = project.routing.remove_sends_for_track(track_id);
            (track, removed_sends)
        });
        info!(
            clips = track.clips.len(),
            sends = removed_sends.len(),
            "track removed"
        );
        Ok(track)
    }

    #[instrument(skip(self), fields(project_id = %self.project.id, from, to))]
    pub fn reorder_track(&mut self, from: usize, to: usize) -> Result<(), EngineError> {
        let len = self.project.mixer.tracks.len();
        if from >= len || to >= len {
            return Err(EngineError::InvalidReorder { from, to });
        }
        if from == to {
            debug!("reorder noop");
            return Ok(());
        }

        self.edit("Reorder tracks", |engine| {
            let tracks = &mut engine.project_mut().mixer.tracks;
            let track = tracks.remove(from);
            tracks.insert(to, track);
        });
        info!("track reordered");
        Ok(())
    }

    #[instrument(skip(self), fields(project_id = %self.project.id, track_id = %track_id))]
    pub fn set_track_mix(
        &mut self,
        track_id: Uuid,
        patch: TrackMixPatch,
    ) -> Result<Track, EngineError> {
        let track = self.with_group("Change track mix", |engine| {
            let track = engine
                .project_mut()
                .mixer
                .track_mut(track_id)
                .ok_or(EngineError::TrackNotFound(track_id))?;
            if let Some(gain_db) = patch.gain_db {
                track.gain_db = gain_db;
            }
            if let Some(pan) = patch.pan {
                track.pan = pan.clamp(-1.0, 1.0);
            }
            if let Some(mute) = patch.mute {
                track.mute = mute;
            }
            if let Some(solo) = patch.solo {
                track.solo = solo;
            }
            Ok(track.clone())
        })?;
        info!(
            gain_db = track.gain_db,
            pan = track.pan,
            mute = track.mute,
            solo = track.solo,
            "track mix changed"
        );
        Ok(track)
    }

    #[instrument(skip(self), fields(project_id = %self.project.id, track_id = %track_id, lane_height))]
    pub fn set_lane_height(&mut self, track_id: Uuid, lane_height: u32) -> Result<(), EngineError> {
        self.with_group("Resize lane", |engine| {
            engine
                .project_mut()
                .mixer
                .track_mut(track_id)
                .ok_or(EngineError::TrackNotFound(track_id))?
                .lane_height = lane_height.max(1);
            Ok(())
        })
    }

    #[instrument(skip(self), fields(project_id = %self.project.id))]
    pub fn set_master(&mut self, patch: MasterPatch) {
        self.edit("Change master", |engine| {
            let master = &mut engine.project_mut().mixer.master;
            if let Some(gain_db) = patch.gain_db {
                master.gain_db = gain_db;
            }
            if let Some(pan) = patch.pan {
                master.pan = pan.clamp(-1.0, 1.0);
            }
            if let Some(mute) = patch.mute {
                master.mute = mute;
            }
        });
        info!("master bus changed");
    }

    /// Selects a track, replacing the current track selection unless `additive`.
    pub fn select_track(&mut self, track_id: Uuid, additive: bool) -> Result<(), EngineError> {
        if self.project.mixer.track(track_id).is_none() {
            return Err(EngineError::TrackNotFound(track_id));
        }
        self.without_undo(|engine| {
            let mixer = &mut engine.project_mut().mixer;
            if !additive {
                mixer.unselect_all_tracks();
            }
            mixer.select_track(track_id);
        });
        Ok(())
    }

    pub fn unselect_all_tracks(&mut self) {
        self.without_undo(|engine| engine.project_mut().mixer.unselect_all_tracks());
    }

    /// Marks the track that receives pastes without a live source track.
    pub fn focus_track(&mut self, track_id: Uuid) -> Result<(), EngineError> {
        if self.project.mixer.track(track_id).is_none() {
            return Err(EngineError::TrackNotFound(track_id));
        }
        self.focused_track.attach(track_id);
        let index = ReferenceIndex::build(&self.project.mixer);
        self.refresh_engine_refs(&index);
        Ok(())
    }

    // Clips.

    #[instrument(skip(self, audio), fields(project_id = %self.project.id, track_id = %track_id, clip_name = %name))]
    pub fn create_audio_clip(
        &mut self,
        track_id: Uuid,
        name: &str,
        start: u64,
        end: u64,
        audio: AudioClip,
    ) -> Result<Clip, EngineError> {
        ensure_range(start, end)?;
        let clip = self.with_group("Create audio clip", |engine| {
            let track = engine
                .project_mut()
                .mixer
                .track_mut(track_id)
                .ok_or(EngineError::TrackNotFound(track_id))?;
            Ok(track.create_audio_clip(name, start, end, audio).clone())
        })?;
        info!(clip_id = %clip.id, "audio clip created");
        Ok(clip)
    }

    #[instrument(skip(self), fields(project_id = %self.project.id, track_id = %track_id, clip_name = %name))]
    pub fn create_midi_clip(
        &mut self,
        track_id: Uuid,
        name: &str,
        start: u64,
        end: u64,
    ) -> Result<Clip, EngineError> {
        ensure_range(start, end)?;
        let clip = self.with_group("Create midi clip", |engine| {
            let track = engine
                .project_mut()
                .mixer
                .track_mut(track_id)
                .ok_or(EngineError::TrackNotFound(track_id))?;
            Ok(track.create_midi_clip(name, start, end).clone())
        })?;
        info!(clip_id = %clip.id, "midi clip created");
        Ok(clip)
    }

    /// Creates an audio clip sized to `content` and caches the content under the clip's key.
    #[instrument(skip(self, content), fields(project_id = %self.project.id, track_id = %track_id, clip_name = %name, frames = content.frames()))]
    pub fn import_audio_clip(
        &mut self,
        track_id: Uuid,
        name: &str,
        start: u64,
        content: DecodedBuffer,
    ) -> Result<Clip, EngineError> {
        let length = content_length(&content, self.project.timeline.sample_rate);
        let clip = self.with_group("Import audio", |engine| {
            let track = engine
                .project_mut()
                .mixer
                .track_mut(track_id)
                .ok_or(EngineError::TrackNotFound(track_id))?;
            Ok(track
                .create_audio_clip(name, start, start.saturating_add(length), AudioClip::default())
                .clone())
        })?;
        self.caches.store(clip.cache_key(), content);
        info!(clip_id = %clip.id, length, "audio imported");
        Ok(clip)
    }

    #[instrument(skip(self), fields(project_id = %self.project.id, track_id = %track_id, path = %path.display()))]
    pub fn import_audio_file(
        &mut self,
        track_id: Uuid,
        path: &Path,
        start: u64,
    ) -> Result<Clip, EngineError> {
        if self.project.mixer.track(track_id).is_none() {
            return Err(EngineError::TrackNotFound(track_id));
        }
        let content = decode_audio_file(path)?;
        let name = path
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or("Audio");
        self.import_audio_clip(track_id, name, start, content)
    }

    /// Removes a clip. Its cached content stays so undo can bring it back; see
    /// [`Engine::purge_unreferenced_content`].
    #[instrument(skip(self), fields(project_id = %self.project.id, clip_id = %clip_id))]
    pub fn delete_clip(&mut self, clip_id: Uuid) -> Result<Clip, EngineError> {
        let (track_index, _) = self
            .project
            .mixer
            .clip_location(clip_id)
            .ok_or(EngineError::ClipNotFound(clip_id))?;
        let clip = self.with_group("Delete clip", |engine| {
            engine.project_mut().mixer.tracks[track_index]
                .delete_clip(clip_id)
                .ok_or(EngineError::ClipNotFound(clip_id))
        })?;
        info!("clip deleted");
        Ok(clip)
    }

    #[instrument(skip(self), fields(project_id = %self.project.id, clip_id = %clip_id, start, end))]
    pub fn resize_clip(&mut self, clip_id: Uuid, start: u64, end: u64) -> Result<Clip, EngineError> {
        ensure_range(start, end)?;
        let clip = self
            .project
            .mixer
            .clip(clip_id)
            .ok_or(EngineError::ClipNotFound(clip_id))?;
        if clip.locked {
            warn!("rejected resize of a locked clip");
            return Err(EngineError::ClipLocked(clip_id));
        }

        let clip = self.with_group("Resize clip", |engine| {
            let clip = engine
                .project_mut()
                .mixer
                .clip_mut(clip_id)
                .ok_or(EngineError::ClipNotFound(clip_id))?;
            clip.start = start;
            clip.end = end;
            Ok(clip.clone())
        })?;
        info!("clip resized");
        Ok(clip)
    }

    #[instrument(skip(self), fields(project_id = %self.project.id, clip_id = %clip_id, locked))]
    pub fn set_clip_locked(&mut self, clip_id: Uuid, locked: bool) -> Result<(), EngineError> {
        self.with_group(if locked { "Lock clip" } else { "Unlock clip" }, |engine| {
            engine
                .project_mut()
                .mixer
                .clip_mut(clip_id)
                .ok_or(EngineError::ClipNotFound(clip_id))?
                .locked = locked;
            Ok(())
        })
    }

    /// Selects a clip, replacing the current clip selection unless `additive`.
    pub fn select_clip(&mut self, clip_id: Uuid, additive: bool) -> Result<(), EngineError> {
        if self.project.mixer.clip(clip_id).is_none() {
            return Err(EngineError::ClipNotFound(clip_id));
        }
        self.without_undo(|engine| {
            let mixer = &mut engine.project_mut().mixer;
            if !additive {
                mixer.unselect_all_clips();
            }
            mixer.select_clip(clip_id);
        });
        Ok(())
    }

    pub fn unselect_clip(&mut self, clip_id: Uuid) -> Result<(), EngineError> {
        let found = self.without_undo(|engine| engine.project_mut().mixer.unselect_clip(clip_id));
        if found {
            Ok(())
        } else {
            Err(EngineError::ClipNotFound(clip_id))
        }
    }

    pub fn unselect_all_clips(&mut self) {
        self.without_undo(|engine| engine.project_mut().mixer.unselect_all_clips());
    }

    /// Splits an audio clip at `position` into `[start, position)` and `[position, end)`.
    ///
    /// Both halves alias the original's cached content; the right half's source offset advances
    /// by the left half's length. Fades stay on the outer edges, clamped to each half.
    #[instrument(skip(self), fields(project_id = %self.project.id, clip_id = %clip_id, position))]
    pub fn split_clip(&mut self, clip_id: Uuid, position: u64) -> Result<(Clip, Clip), EngineError> {
        let (track_index, clip_index) = self
            .project
            .mixer
            .clip_location(clip_id)
            .ok_or(EngineError::ClipNotFound(clip_id))?;
        let original = &self.project.mixer.tracks[track_index].clips[clip_index];
        let audio = original
            .as_audio()
            .ok_or(EngineError::NotAudioClip(clip_id))?;
        if position <= original.start || position >= original.end {
            warn!("rejected split outside the clip");
            return Err(BoundsViolation::SplitOutsideClip {
                clip: clip_id,
                position,
            }
            .into());
        }

        let left_len = position - original.start;
        let right_len = original.end - position;
        let mut left = Clip::new(
            original.name.clone(),
            original.start,
            position,
            ClipKind::Audio(AudioClip {
                fade_in: audio.fade_in.min(left_len),
                fade_out: 0,
                ..audio.clone()
            }),
        );
        let mut right = Clip::new(
            original.name.clone(),
            position,
            original.end,
            ClipKind::Audio(AudioClip {
                fade_in: 0,
                fade_out: audio.fade_out.min(right_len),
                source_offset: audio.source_offset.saturating_add(left_len),
                ..audio.clone()
            }),
        );
        for half in [&mut left, &mut right] {
            half.locked = original.locked;
            half.selected = original.selected;
        }

        let (left, right) = self.edit("Split clip", |engine| {
            let track = &mut engine.project_mut().mixer.tracks[track_index];
            track.clips.remove(clip_index);
            let left = track.insert_clip_at(clip_index, left).clone();
            let right = track.insert_clip_at(clip_index + 1, right).clone();
            (left, right)
        });

        self.caches.copy_clip_content(clip_id, left.cache_key());
        self.caches.copy_clip_content(clip_id, right.cache_key());
        info!(left_id = %left.id, right_id = %right.id, "clip split");
        Ok((left, right))
    }

    /// Moves every selected, unlocked clip by `delta` samples and `lane_delta` lanes.
    ///
    /// All or nothing: if any clip would start before zero or leave the lanes, nothing moves.
    /// Returns how many clips moved.
    #[instrument(skip(self), fields(project_id = %self.project.id, delta, lane_delta))]
    pub fn move_selection(&mut self, delta: i64, lane_delta: i64) -> Result<usize, EngineError> {
        let moves = self
            .plan_selection_move(delta, lane_delta)
            .inspect_err(|error| warn!(%error, "clip move rejected"))?;
        if moves.is_empty() {
            debug!("no movable clips selected");
            return Ok(0);
        }

        let moved = moves.len();
        self.edit("Move clips", |engine| {
            let tracks = &mut engine.project_mut().mixer.tracks;
            let mut relocated = Vec::new();
            for planned in &moves {
                if planned.from_lane == planned.to_lane {
                    if let Some(clip) = tracks[planned.from_lane].clip_mut(planned.clip_id) {
                        clip.start = planned.start;
                        clip.end = planned.end;
                    }
                } else if let Some(mut clip) =
                    tracks[planned.from_lane].delete_clip(planned.clip_id)
                {
                    clip.start = planned.start;
                    clip.end = planned.end;
                    relocated.push((planned.to_lane, clip));
                }
            }
            for (lane, clip) in relocated {
                tracks[lane].insert_clip(clip);
            }
        });
        info!(moved, "clips moved");
        Ok(moved)
    }

    fn plan_selection_move(
        &self,
        delta: i64,
        lane_delta: i64,
    ) -> Result<Vec<PlannedMove>, BoundsViolation> {
        let track_count = self.project.mixer.tracks.len();
        let mut moves = Vec::new();
        for (lane, track) in self.project.mixer.tracks.iter().enumerate() {
            for clip in track.selected_clips().filter(|clip| !clip.locked) {
                let negative = BoundsViolation::NegativeStart { clip: clip.id };
                let start = clip.start.checked_add_signed(delta).ok_or(negative)?;
                let end = clip.end.checked_add_signed(delta).ok_or(negative)?;
                let to_lane = isize::try_from(lane_delta)
                    .ok()
                    .and_then(|lane_delta| lane.checked_add_signed(lane_delta))
                    .filter(|to_lane| *to_lane < track_count)
                    .ok_or(BoundsViolation::LaneOutOfRange {
                        clip: clip.id,
                        lane_delta,
                    })?;
                moves.push(PlannedMove {
                    clip_id: clip.id,
                    from_lane: lane,
                    to_lane,
                    start,
                    end,
                });
            }
        }
        Ok(moves)
    }

    // Notes.

    fn midi_clip(&self, clip_id: Uuid) -> Result<&Clip, EngineError> {
        let clip = self
            .project
            .mixer
            .clip(clip_id)
            .ok_or(EngineError::ClipNotFound(clip_id))?;
        if clip.as_midi().is_none() {
            return Err(EngineError::NotMidiClip(clip_id));
        }
        Ok(clip)
    }

    fn with_midi_group<R>(
        &mut self,
        label: &str,
        clip_id: Uuid,
        f: impl FnOnce(&mut MidiClip) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        self.with_group(label, |engine| {
            let midi = engine
                .project_mut()
                .mixer
                .clip_mut(clip_id)
                .ok_or(EngineError::ClipNotFound(clip_id))?
                .as_midi_mut()
                .ok_or(EngineError::NotMidiClip(clip_id))?;
            f(midi)
        })
    }

    #[instrument(skip(self, note), fields(project_id = %self.project.id, clip_id = %clip_id, pitch = %note.note))]
    pub fn add_note(&mut self, clip_id: Uuid, mut note: MidiNote) -> Result<Uuid, EngineError> {
        self.midi_clip(clip_id)?;
        if note.note.to_midi().is_none() {
            return Err(BoundsViolation::PitchOutOfRange { note: note.id }.into());
        }
        note.clip.attach(clip_id);
        let note_id = self.with_midi_group("Add note", clip_id, |midi| Ok(midi.add_note(note)))?;
        info!(note_id = %note_id, "note added");
        Ok(note_id)
    }

    #[instrument(skip(self), fields(project_id = %self.project.id, clip_id = %clip_id, note_id = %note_id))]
    pub fn remove_note(&mut self, clip_id: Uuid, note_id: Uuid) -> Result<MidiNote, EngineError> {
        let note = self.with_midi_group("Delete note", clip_id, |midi| {
            midi.remove_note(note_id).ok_or(EngineError::NoteNotFound {
                clip: clip_id,
                note: note_id,
            })
        })?;
        info!("note removed");
        Ok(note)
    }

    /// Moves a note to `index` in its clip's note order. An unknown note is a caller bug and
    /// fails hard.
    #[instrument(skip(self), fields(project_id = %self.project.id, clip_id = %clip_id, note_id = %note_id, index))]
    pub fn reorder_note(&mut self, clip_id: Uuid, note_id: Uuid, index: usize) -> Result<(), EngineError> {
        let midi = self
            .midi_clip(clip_id)?
            .as_midi()
            .ok_or(EngineError::NotMidiClip(clip_id))?;
        let from = midi.note_index(note_id).ok_or(EngineError::NoteNotFound {
            clip: clip_id,
            note: note_id,
        })?;
        if index >= midi.notes.len() {
            return Err(EngineError::InvalidReorder { from, to: index });
        }
        if from == index {
            debug!("reorder noop");
            return Ok(());
        }

        self.with_midi_group("Reorder notes", clip_id, |midi| {
            let note = midi.notes.remove(from);
            midi.notes.insert(index, note);
            Ok(())
        })?;
        info!("note reordered");
        Ok(())
    }

    /// Shifts every selected note of a clip in time and pitch, all or nothing.
    #[instrument(skip(self), fields(project_id = %self.project.id, clip_id = %clip_id, delta, pitch_delta))]
    pub fn move_selected_notes(
        &mut self,
        clip_id: Uuid,
        delta: i64,
        pitch_delta: i16,
    ) -> Result<usize, EngineError> {
        let midi = self
            .midi_clip(clip_id)?
            .as_midi()
            .ok_or(EngineError::NotMidiClip(clip_id))?;

        let mut planned = Vec::new();
        for note in midi.selected_notes() {
            let negative = BoundsViolation::NegativeNoteOffset { note: note.id };
            let on = note.on.checked_add_signed(delta).ok_or(negative)?;
            let off = note.off.checked_add_signed(delta).ok_or(negative)?;
            let pitch = note
                .note
                .transposed(pitch_delta)
                .ok_or(BoundsViolation::PitchOutOfRange { note: note.id })
                .inspect_err(|error| warn!(%error, "note move rejected"))?;
            planned.push((note.id, on, off, pitch));
        }
        if planned.is_empty() {
            debug!("no notes selected");
            return Ok(0);
        }

        let moved = planned.len();
        self.with_midi_group("Move notes", clip_id, |midi| {
            for (note_id, on, off, pitch) in planned {
                if let Some(note) = midi.note_mut(note_id) {
                    note.on = on;
                    note.off = off;
                    note.note = pitch;
                }
            }
            Ok(())
        })?;
        info!(moved, "notes moved");
        Ok(moved)
    }

    pub fn select_note(&mut self, clip_id: Uuid, note_id: Uuid, additive: bool) -> Result<(), EngineError> {
        self.midi_clip(clip_id)?;
        self.without_undo(|engine| {
            let midi = engine
                .project_mut()
                .mixer
                .clip_mut(clip_id)
                .and_then(Clip::as_midi_mut)
                .ok_or(EngineError::NotMidiClip(clip_id))?;
            if midi.note(note_id).is_none() {
                return Err(EngineError::NoteNotFound {
                    clip: clip_id,
                    note: note_id,
                });
            }
            if !additive {
                midi.unselect_all_notes();
            }
            midi.select_note(note_id);
            Ok(())
        })
    }

    pub fn unselect_note(&mut self, clip_id: Uuid, note_id: Uuid) -> Result<(), EngineError> {
        self.midi_clip(clip_id)?;
        self.without_undo(|engine| {
            let found = engine
                .project_mut()
                .mixer
                .clip_mut(clip_id)
                .and_then(Clip::as_midi_mut)
                .is_some_and(|midi| midi.unselect_note(note_id));
            if found {
                Ok(())
            } else {
                Err(EngineError::NoteNotFound {
                    clip: clip_id,
                    note: note_id,
                })
            }
        })
    }

    pub fn unselect_all_notes(&mut self, clip_id: Uuid) -> Result<(), EngineError> {
        self.midi_clip(clip_id)?;
        self.without_undo(|engine| {
            if let Some(midi) = engine
                .project_mut()
                .mixer
                .clip_mut(clip_id)
                .and_then(Clip::as_midi_mut)
            {
                midi.unselect_all_notes();
            }
        });
        Ok(())
    }

    /// Opens a midi clip in the note editor. The editor closes by itself if the clip goes away.
    pub fn open_editor(&mut self, clip_id: Uuid) -> Result<(), EngineError> {
        self.midi_clip(clip_id)?;
        self.editor_clip.attach(clip_id);
        let index = ReferenceIndex::build(&self.project.mixer);
        self.refresh_engine_refs(&index);
        debug!(clip_id = %clip_id, "midi editor opened");
        Ok(())
    }

    pub fn close_editor(&mut self) {
        self.editor_clip.detach();
    }

    // Routing.

    #[instrument(skip(self), fields(project_id = %self.project.id, from = %from, to = %to))]
    pub fn add_send(&mut self, from: Uuid, to: Uuid) -> Result<AuxSend, EngineError> {
        for track_id in [from, to] {
            if self.project.mixer.track(track_id).is_none() {
                return Err(EngineError::TrackNotFound(track_id));
            }
        }
        let send = self
            .with_group("Add send", |engine| {
                Ok(engine.project_mut().routing.add_send(from, to)?)
            })
            .inspect_err(|error| warn!(%error, "send rejected"))?;
        info!(send_id = %send.id, "send added");
        Ok(send)
    }

    #[instrument(skip(self), fields(project_id = %self.project.id, send_id = %send_id))]
    pub fn remove_send(&mut self, send_id: Uuid) -> Result<AuxSend, EngineError> {
        let send = self.with_group("Remove send", |engine| {
            Ok(engine.project_mut().routing.remove_send(send_id)?)
        })?;
        info!("send removed");
        Ok(send)
    }

    #[must_use]
    pub fn is_valid_send(&self, from: Uuid, to: Uuid) -> bool {
        is_valid_send(from, to, self.project.routing.sends())
    }

    // Clipboard.

    /// Copies the selected tracks and clips, replacing the clipboard. Returns the item count.
    ///
    /// Selected clips on a selected track travel with their track only.
    #[instrument(skip(self), fields(project_id = %self.project.id))]
    pub fn copy_selection(&mut self) -> usize {
        let mixer = &self.project.mixer;
        let loose_clips = mixer
            .tracks
            .iter()
            .filter(|track| !track.selected)
            .flat_map(Track::selected_clips);
        let items: Vec<ClipboardItem> = mixer
            .selected_tracks()
            .cloned()
            .map(ClipboardItem::from)
            .chain(loose_clips.cloned().map(ClipboardItem::from))
            .collect();
        let count = items.len();
        self.clipboard.copy(items);
        debug!(count, "selection copied");
        count
    }

    #[instrument(skip(self), fields(project_id = %self.project.id, clip_id = %clip_id))]
    pub fn copy_selected_notes(&mut self, clip_id: Uuid) -> Result<usize, EngineError> {
        let notes: Vec<MidiNote> = self
            .midi_clip(clip_id)?
            .as_midi()
            .map(|midi| midi.selected_notes().cloned().collect())
            .unwrap_or_default();
        let count = notes.len();
        self.clipboard.copy(notes);
        debug!(count, "notes copied");
        Ok(count)
    }

    /// Pastes copied clips at the playhead and appends copied tracks.
    ///
    /// Clip positions keep their spacing relative to the first copied clip. Each clip goes back
    /// to its source track if that still exists, otherwise to the focused track, the first
    /// selected track or the first track. Pasted clips get fresh ids, alias the source content in
    /// both caches and become the clip selection.
    #[instrument(skip(self), fields(project_id = %self.project.id, position = self.project.timeline.position))]
    pub fn paste(&mut self) -> Result<PasteReport, EngineError> {
        let position = self.project.timeline.position;
        let mut aliases = Vec::new();

        let mut planned_clips = Vec::new();
        if let Some(anchor) = self.clipboard.clips().first().map(|clip| clip.start) {
            for source in self.clipboard.clips() {
                let offset = to_signed(source.start) - to_signed(anchor);
                let start = position
                    .checked_add_signed(offset)
                    .ok_or(BoundsViolation::NegativeStart { clip: source.id })
                    .inspect_err(|error| warn!(%error, "paste rejected"))?;
                let target = self.paste_target(source).ok_or(EngineError::NoTargetTrack)?;

                let mut clip = source.duplicate();
                clip.start = start;
                clip.end = start.saturating_add(source.length());
                clip.selected = true;
                aliases.push((source.cache_key(), clip.cache_key()));
                planned_clips.push((target, clip));
            }
        }

        let mut planned_tracks = Vec::new();
        for source in self.clipboard.tracks() {
            let (track, track_aliases) = duplicate_track(source);
            aliases.extend(track_aliases);
            planned_tracks.push(track);
        }

        let mut report = PasteReport::default();
        if planned_clips.is_empty() && planned_tracks.is_empty() {
            debug!("clipboard has nothing to paste");
            return Ok(report);
        }

        self.with_group("Paste", |engine| {
            let mixer = &mut engine.project_mut().mixer;
            if !planned_clips.is_empty() {
                mixer.unselect_all_clips();
            }
            for (track_id, clip) in planned_clips {
                let track = mixer
                    .track_mut(track_id)
                    .ok_or(EngineError::TrackNotFound(track_id))?;
                report.clips.push(track.insert_clip(clip).id);
            }
            for track in planned_tracks {
                report.tracks.push(track.id);
                mixer.tracks.push(track);
            }
            Ok(())
        })?;

        for (source, copy) in aliases {
            self.caches.copy_clip_content(source, copy);
        }
        info!(
            tracks = report.tracks.len(),
            clips = report.clips.len(),
            "clipboard pasted"
        );
        Ok(report)
    }

    fn paste_target(&self, clip: &Clip) -> Option<Uuid> {
        let mixer = &self.project.mixer;
        clip.track
            .resolve(mixer)
            .live()
            .or_else(|| self.focused_track.resolve(mixer).live())
            .or_else(|| mixer.selected_tracks().next())
            .or_else(|| mixer.tracks.first())
            .map(|track| track.id)
    }

    /// Pastes copied notes into a midi clip at the playhead, keeping their relative spacing.
    #[instrument(skip(self), fields(project_id = %self.project.id, clip_id = %clip_id))]
    pub fn paste_notes(&mut self, clip_id: Uuid) -> Result<Vec<Uuid>, EngineError> {
        let clip = self.midi_clip(clip_id)?;
        let Some(anchor) = self.clipboard.notes().first().map(|note| note.on) else {
            debug!("no notes on the clipboard");
            return Ok(Vec::new());
        };
        let base = to_signed(self.project.timeline.position) - to_signed(clip.start);

        let mut planned = Vec::new();
        for source in self.clipboard.notes() {
            let offset = base + to_signed(source.on) - to_signed(anchor);
            let on = 0_u64
                .checked_add_signed(offset)
                .ok_or(BoundsViolation::NegativeNoteOffset { note: source.id })
                .inspect_err(|error| warn!(%error, "note paste rejected"))?;
            let mut note = MidiNote::new(source.note, on, on.saturating_add(source.length()), source.velocity);
            note.selected = true;
            note.clip.attach(clip_id);
            planned.push(note);
        }

        let ids = self.with_midi_group("Paste notes", clip_id, |midi| {
            midi.unselect_all_notes();
            Ok(planned.into_iter().map(|note| midi.add_note(note)).collect::<Vec<_>>())
        })?;
        info!(count = ids.len(), "notes pasted");
        Ok(ids)
    }

    // Caches.

    /// Peaks for an audio clip. A clip id that no longer exists is a miss, not an error.
    pub fn peaks_for_clip(
        &self,
        clip_id: Uuid,
        samples_per_pixel: u32,
    ) -> Result<Option<Arc<WaveformPeaks>>, EngineError> {
        let Some(clip) = self.project.mixer.clip(clip_id) else {
            return Ok(None);
        };
        if !clip.is_audio() {
            return Err(EngineError::NotAudioClip(clip_id));
        }
        Ok(Some(self.caches.peaks(clip.cache_key(), samples_per_pixel)?))
    }

    #[must_use]
    pub fn clip_content(&self, clip_id: Uuid) -> Option<Arc<DecodedBuffer>> {
        self.caches.buffers().get(clip_id)
    }

    /// Drops cached content no clip can reach any more: not in the project, the undo history or
    /// the clipboard. Caches shared with other engines should not be purged this way.
    #[instrument(skip(self), fields(project_id = %self.project.id))]
    pub fn purge_unreferenced_content(&mut self) -> usize {
        let mut referenced: HashSet<Uuid> =
            self.journal.patches().flat_map(ProjectPatch::clip_ids).collect();
        for project in std::iter::once(&self.project).chain(self.journal.held_states()) {
            referenced.extend(project.mixer.clips().map(Clip::cache_key));
        }
        referenced.extend(self.clipboard.clips().iter().map(Clip::cache_key));
        referenced.extend(
            self.clipboard
                .tracks()
                .iter()
                .flat_map(|track| track.clips.iter().map(Clip::cache_key)),
        );

        let stale: HashSet<Uuid> = {
            let buffers = self.caches.buffers();
            let waveforms = self.caches.waveforms();
            buffers
                .keys()
                .chain(waveforms.keys())
                .filter(|key| !referenced.contains(key))
                .collect()
        };
        for key in &stale {
            self.caches.remove_clip_content(*key);
        }
        info!(purged = stale.len(), "unreferenced cache content purged");
        stale.len()
    }

    // Archives.

    /// Imports a sample pack as a new track with one clip per sample, laid end to end.
    ///
    /// Every sample is decoded before the project is touched, so a bad pack changes nothing.
    #[instrument(skip(self, backend, bytes), fields(project_id = %self.project.id, len = bytes.len()))]
    pub fn import_sample_pack(
        &mut self,
        backend: &dyn ArchiveBackend,
        bytes: &[u8],
        fallback_name: &str,
    ) -> Result<Track, EngineError> {
        let pack = archive::import_sample_pack(backend, bytes)?;
        let mut decoded = Vec::with_capacity(pack.samples.len());
        for blob in &pack.samples {
            let content = decode_audio_bytes(blob.data.clone(), blob.extension().as_deref())
                .map_err(|error| ArchiveError::Decode {
                    name: blob.name.clone(),
                    reason: format!("{error:#}"),
                })?;
            decoded.push((blob.stem().to_string(), content));
        }

        let sample_rate = self.project.timeline.sample_rate;
        let mut track = Track::new(pack.name_or(fallback_name), Rgb::default());
        let mut contents = Vec::with_capacity(decoded.len());
        let mut cursor = 0_u64;
        for (name, content) in decoded {
            let length = content_length(&content, sample_rate);
            let clip = track.create_audio_clip(
                name,
                cursor,
                cursor.saturating_add(length),
                AudioClip::default(),
            );
            contents.push((clip.cache_key(), content));
            cursor = cursor.saturating_add(length);
        }

        self.edit("Import sample pack", |engine| {
            engine.project_mut().mixer.tracks.push(track.clone());
        });
        for (key, content) in contents {
            self.caches.store(key, content);
        }
        info!(track_id = %track.id, clips = track.clips.len(), "sample pack imported");
        Ok(track)
    }

    // Persistence and export.

    #[instrument(skip(self), fields(project_id = %self.project.id, path = %path.display()))]
    pub fn save_project(&self, path: &Path) -> Result<(), EngineError> {
        persistence::save_project(path, &self.project)?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn load_project(&mut self, path: &Path) -> Result<&Project, EngineError> {
        let project = persistence::load_project(path)?;
        self.replace_project(project);
        Ok(&self.project)
    }

    #[instrument(skip(self), fields(project_id = %self.project.id, autosave_dir = %autosave_dir.display()))]
    pub fn autosave(&self, autosave_dir: &Path) -> Result<PathBuf, EngineError> {
        let autosave_path = persistence::autosave_project(&self.project, autosave_dir)?;
        Ok(autosave_path)
    }

    /// The part of an audio clip's cached content that plays on the timeline.
    pub fn clip_audio(&self, clip_id: Uuid) -> Result<DecodedBuffer, EngineError> {
        let clip = self
            .project
            .mixer
            .clip(clip_id)
            .ok_or(EngineError::ClipNotFound(clip_id))?;
        let audio = clip.as_audio().ok_or(EngineError::NotAudioClip(clip_id))?;
        let content = self
            .caches
            .buffers()
            .get(clip.cache_key())
            .ok_or(CacheError::SourceMissing(clip.cache_key()))?;

        let project_rate = self.project.timeline.sample_rate;
        let offset = project_to_content_frames(audio.source_offset, content.sample_rate, project_rate);
        let frames = project_to_content_frames(clip.length(), content.sample_rate, project_rate);
        Ok(content.slice_frames(offset, frames))
    }

    #[instrument(skip(self), fields(project_id = %self.project.id, clip_id = %clip_id, kind = ?kind, path = %output_path.display()))]
    pub fn export_clip_audio(
        &self,
        clip_id: Uuid,
        kind: ExportKind,
        output_path: &Path,
        ffmpeg_binary: Option<&Path>,
    ) -> Result<(), EngineError> {
        let audio = self.clip_audio(clip_id)?;
        match kind {
            ExportKind::Wav => export::export_wav(&audio, output_path)?,
            ExportKind::Mp3 => export::export_mp3(&audio, output_path, ffmpeg_binary)?,
        }
        Ok(())
    }

    #[instrument(skip(self, encoder), fields(project_id = %self.project.id, clip_id = %clip_id))]
    pub fn encode_clip_mp3(
        &self,
        clip_id: Uuid,
        encoder: &mut dyn Mp3FrameEncoder,
    ) -> Result<Vec<u8>, EngineError> {
        let audio = self.clip_audio(clip_id)?;
        Ok(export::encode_mp3(&audio, encoder)?)
    }

    #[instrument(skip(self), fields(project_id = %self.project.id, path = %output_path.display()))]
    pub fn export_midi(&self, output_path: &Path) -> Result<(), EngineError> {
        export::export_midi(&self.project, output_path)?;
        Ok(())
    }
}

fn apply_timeline_config(timeline: &mut Timeline, config: &CliplaneConfig) {
    timeline.set_zoom(config.timeline.samples_per_pixel);
    timeline.snap_to_grid = config.timeline.snap_to_grid;
    timeline.subdivision = config.timeline.subdivision.max(1);
}

fn ensure_range(start: u64, end: u64) -> Result<(), BoundsViolation> {
    if end < start {
        return Err(BoundsViolation::InvalidRange { start, end });
    }
    Ok(())
}

fn to_signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Length of `content` in project samples.
fn content_length(content: &DecodedBuffer, project_rate: u32) -> u64 {
    let frames = content.frames() as u64;
    if content.sample_rate == 0 || content.sample_rate == project_rate {
        return frames;
    }
    let scaled = u128::from(frames) * u128::from(project_rate) / u128::from(content.sample_rate);
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

fn project_to_content_frames(samples: u64, content_rate: u32, project_rate: u32) -> usize {
    let frames = if content_rate == project_rate || project_rate == 0 {
        u128::from(samples)
    } else {
        u128::from(samples) * u128::from(content_rate) / u128::from(project_rate)
    };
    usize::try_from(frames).unwrap_or(usize::MAX)
}

/// Copy of `source` under a fresh id with fresh clip ids, plus `(old, new)` cache key pairs.
fn duplicate_track(source: &Track) -> (Track, Vec<(Uuid, Uuid)>) {
    let mut track = source.clone();
    track.id = Uuid::new_v4();
    track.selected = false;
    track.clips = Vec::with_capacity(source.clips.len());

    let mut aliases = Vec::with_capacity(source.clips.len());
    for clip in &source.clips {
        let copy = clip.duplicate();
        aliases.push((clip.cache_key(), copy.cache_key()));
        track.insert_clip(copy);
    }
    (track, aliases)
}
