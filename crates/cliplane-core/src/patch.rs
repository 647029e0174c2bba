//! Track-level changes between two project states, as recorded by the undo journal.
//!
//! Only document state is compared. The playhead, zoom and selection flags are view state: they
//! never make a patch on their own and keep their current values when a patch is reverted or
//! reapplied.

use std::collections::HashSet;

use uuid::Uuid;

use crate::{
    journal::Journaled,
    model::{MasterBus, Mixer, Project, Track},
    routing::Routing,
    time::TimeSignature,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Change<T> {
    pub before: T,
    pub after: T,
}

impl<T> Change<T> {
    const fn side(&self, forward: bool) -> &T {
        if forward { &self.after } else { &self.before }
    }
}

/// Project fields outside the track tree that undo tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSettings {
    pub title: String,
    pub bpm: u32,
    pub time_signature: TimeSignature,
    pub sample_rate: u32,
    pub snap_to_grid: bool,
    pub subdivision: u32,
}

impl DocumentSettings {
    fn of(project: &Project) -> Self {
        let timeline = &project.timeline;
        Self {
            title: project.title.clone(),
            bpm: timeline.bpm,
            time_signature: timeline.time_signature,
            sample_rate: timeline.sample_rate,
            snap_to_grid: timeline.snap_to_grid,
            subdivision: timeline.subdivision,
        }
    }

    fn apply_to(&self, project: &mut Project) {
        project.title.clone_from(&self.title);
        let timeline = &mut project.timeline;
        timeline.bpm = self.bpm;
        timeline.time_signature = self.time_signature;
        timeline.sample_rate = self.sample_rate;
        timeline.snap_to_grid = self.snap_to_grid;
        timeline.subdivision = self.subdivision;
    }
}

/// One track's document state before and after; `None` where the track did not exist.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackChange {
    pub id: Uuid,
    pub change: Change<Option<Track>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectPatch {
    pub settings: Option<Change<DocumentSettings>>,
    pub master: Option<Change<MasterBus>>,
    pub routing: Option<Change<Routing>>,
    pub track_order: Option<Change<Vec<Uuid>>>,
    pub tracks: Vec<TrackChange>,
}

impl ProjectPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.settings.is_none()
            && self.master.is_none()
            && self.routing.is_none()
            && self.track_order.is_none()
            && self.tracks.is_empty()
    }

    /// Ids of the tracks this patch rewrites.
    pub fn track_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.tracks.iter().map(|track| track.id)
    }

    /// Every clip on either side of the patch.
    pub fn clip_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.tracks
            .iter()
            .flat_map(|track| [&track.change.before, &track.change.after])
            .flatten()
            .flat_map(|track| track.clips.iter().map(|clip| clip.id))
    }

    fn apply(&self, project: &mut Project, forward: bool) {
        if let Some(settings) = &self.settings {
            settings.side(forward).apply_to(project);
        }
        if let Some(master) = &self.master {
            project.mixer.master = master.side(forward).clone();
        }
        if let Some(routing) = &self.routing {
            project.routing = routing.side(forward).clone();
        }

        let mut restored_clips = HashSet::new();
        for track_change in &self.tracks {
            let index = project.mixer.track_index(track_change.id);
            match (track_change.change.side(forward), index) {
                (Some(track), index) => {
                    let mut restored = track.clone();
                    carry_view_state(&mut restored, &project.mixer);
                    restored_clips.extend(restored.clips.iter().map(|clip| clip.id));
                    match index {
                        Some(index) => project.mixer.tracks[index] = restored,
                        None => project.mixer.tracks.push(restored),
                    }
                }
                (None, Some(index)) => {
                    project.mixer.tracks.remove(index);
                }
                (None, None) => {}
            }
        }

        // A clip moved since this patch was recorded lives on in its restored track only.
        let patched: HashSet<Uuid> = self.track_ids().collect();
        for track in &mut project.mixer.tracks {
            if !patched.contains(&track.id) {
                track.clips.retain(|clip| !restored_clips.contains(&clip.id));
            }
        }

        if let Some(order) = &self.track_order {
            let order = order.side(forward);
            project
                .mixer
                .tracks
                .sort_by_key(|track| order.iter().position(|id| *id == track.id).unwrap_or(usize::MAX));
        }
    }
}

impl Journaled for Project {
    type Patch = ProjectPatch;

    fn diff(before: &Self, after: &Self) -> Option<ProjectPatch> {
        let mut patch = ProjectPatch::default();

        let settings = Change {
            before: DocumentSettings::of(before),
            after: DocumentSettings::of(after),
        };
        if settings.before != settings.after {
            patch.settings = Some(settings);
        }
        if before.mixer.master != after.mixer.master {
            patch.master = Some(Change {
                before: before.mixer.master.clone(),
                after: after.mixer.master.clone(),
            });
        }
        if before.routing != after.routing {
            patch.routing = Some(Change {
                before: before.routing.clone(),
                after: after.routing.clone(),
            });
        }

        for track in &before.mixer.tracks {
            let current = after.mixer.track(track.id);
            if current.is_some_and(|current| same_document(track, current)) {
                continue;
            }
            patch.tracks.push(TrackChange {
                id: track.id,
                change: Change {
                    before: Some(track.clone()),
                    after: current.cloned(),
                },
            });
        }
        for track in after
            .mixer
            .tracks
            .iter()
            .filter(|track| before.mixer.track(track.id).is_none())
        {
            patch.tracks.push(TrackChange {
                id: track.id,
                change: Change {
                    before: None,
                    after: Some(track.clone()),
                },
            });
        }

        let order = Change {
            before: track_order(&before.mixer),
            after: track_order(&after.mixer),
        };
        if order.before != order.after {
            patch.track_order = Some(order);
        }

        (!patch.is_empty()).then_some(patch)
    }

    fn revert(&mut self, patch: &ProjectPatch) {
        patch.apply(self, false);
    }

    fn reapply(&mut self, patch: &ProjectPatch) {
        patch.apply(self, true);
    }
}

fn track_order(mixer: &Mixer) -> Vec<Uuid> {
    mixer.tracks.iter().map(|track| track.id).collect()
}

fn same_document(a: &Track, b: &Track) -> bool {
    a == b || without_view_state(a) == without_view_state(b)
}

fn without_view_state(track: &Track) -> Track {
    let mut track = track.clone();
    track.selected = false;
    for clip in &mut track.clips {
        clip.selected = false;
        if let Some(midi) = clip.as_midi_mut() {
            midi.unselect_all_notes();
        }
    }
    track
}

/// Copies the selection flags the live tree holds onto a track about to replace it.
fn carry_view_state(restored: &mut Track, live: &Mixer) {
    if let Some(track) = live.track(restored.id) {
        restored.selected = track.selected;
    }
    for clip in &mut restored.clips {
        let Some(live_clip) = live.clip(clip.id) else {
            continue;
        };
        clip.selected = live_clip.selected;
        if let (Some(midi), Some(live_midi)) = (clip.as_midi_mut(), live_clip.as_midi()) {
            for note in &mut midi.notes {
                if let Some(live_note) = live_midi.note(note.id) {
                    note.selected = live_note.selected;
                }
            }
        }
    }
}
