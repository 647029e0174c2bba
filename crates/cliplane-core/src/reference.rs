//! Id-based weak references between entities of the project tree.
//!
//! A [`WeakRef`] never owns its target. It is resolved by searching the collection that owns the
//! target kind (tracks live in the mixer, clips in tracks, notes in midi clips), and it detaches
//! itself once a target it previously resolved disappears. [`heal_references`] runs that check
//! over the whole tree after every structural mutation.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    marker::PhantomData,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::model::{Clip, MidiNote, Mixer, Track};

/// An entity kind that can be the target of a [`WeakRef`].
pub trait Referent: Sized {
    const KIND: &'static str;

    /// Finds the live entity with `id`, descending through nested collections as needed.
    fn lookup(mixer: &Mixer, id: Uuid) -> Option<&Self>;

    fn is_indexed(index: &ReferenceIndex, id: Uuid) -> bool;
}

impl Referent for Track {
    const KIND: &'static str = "track";

    fn lookup(mixer: &Mixer, id: Uuid) -> Option<&Self> {
        mixer.track(id)
    }

    fn is_indexed(index: &ReferenceIndex, id: Uuid) -> bool {
        index.tracks.contains(&id)
    }
}

impl Referent for Clip {
    const KIND: &'static str = "clip";

    fn lookup(mixer: &Mixer, id: Uuid) -> Option<&Self> {
        mixer.clip(id)
    }

    fn is_indexed(index: &ReferenceIndex, id: Uuid) -> bool {
        index.clips.contains_key(&id)
    }
}

impl Referent for MidiNote {
    const KIND: &'static str = "note";

    fn lookup(mixer: &Mixer, id: Uuid) -> Option<&Self> {
        mixer
            .tracks
            .iter()
            .flat_map(|track| track.clips.iter())
            .filter_map(Clip::as_midi)
            .find_map(|midi| midi.note(id))
    }

    fn is_indexed(index: &ReferenceIndex, id: Uuid) -> bool {
        index.notes.contains_key(&id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution<'a, T> {
    Live(&'a T),
    /// The slot does not name any target yet.
    Unattached,
    Gone(Uuid),
}

impl<'a, T> Resolution<'a, T> {
    #[must_use]
    pub fn live(self) -> Option<&'a T> {
        match self {
            Self::Live(target) => Some(target),
            Self::Unattached | Self::Gone(_) => None,
        }
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }

    #[must_use]
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Gone(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefChange {
    Unchanged,
    Resolved,
    Detached(Uuid),
}

pub struct WeakRef<T> {
    id: Option<Uuid>,
    // Whether the last refresh found the target. Only a live -> gone transition detaches.
    live: bool,
    _target: PhantomData<fn() -> T>,
}

impl<T> WeakRef<T> {
    #[must_use]
    pub const fn unattached() -> Self {
        Self {
            id: None,
            live: false,
            _target: PhantomData,
        }
    }

    #[must_use]
    pub const fn to(id: Uuid) -> Self {
        Self {
            id: Some(id),
            live: false,
            _target: PhantomData,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Option<Uuid> {
        self.id
    }

    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.id.is_some()
    }

    #[must_use]
    pub fn points_to(&self, id: Uuid) -> bool {
        self.id == Some(id)
    }

    pub fn attach(&mut self, id: Uuid) {
        if self.id != Some(id) {
            self.id = Some(id);
            self.live = false;
        }
    }

    pub fn detach(&mut self) {
        self.id = None;
        self.live = false;
    }
}

impl<T: Referent> WeakRef<T> {
    #[must_use]
    pub fn resolve<'a>(&self, mixer: &'a Mixer) -> Resolution<'a, T> {
        match self.id {
            None => Resolution::Unattached,
            Some(id) => T::lookup(mixer, id).map_or(Resolution::Gone(id), Resolution::Live),
        }
    }

    /// Re-evaluates the reference against `index`, detaching it when a previously live target
    /// has disappeared. A reference that never resolved is left alone.
    pub fn refresh(&mut self, index: &ReferenceIndex) -> RefChange {
        let Some(id) = self.id else {
            return RefChange::Unchanged;
        };

        let now_live = T::is_indexed(index, id);
        match (self.live, now_live) {
            (true, false) => {
                self.detach();
                tracing::debug!(kind = T::KIND, target = %id, "weak reference detached");
                RefChange::Detached(id)
            }
            (false, true) => {
                self.live = true;
                RefChange::Resolved
            }
            _ => RefChange::Unchanged,
        }
    }
}

impl<T> Default for WeakRef<T> {
    fn default() -> Self {
        Self::unattached()
    }
}

impl<T> Clone for WeakRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for WeakRef<T> {}

impl<T> PartialEq for WeakRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for WeakRef<T> {}

impl<T> fmt::Debug for WeakRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "WeakRef({id})"),
            None => f.write_str("WeakRef(unattached)"),
        }
    }
}

impl<T> Serialize for WeakRef<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.id.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for WeakRef<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<Uuid>::deserialize(deserializer).map(|id| Self {
            id,
            live: false,
            _target: PhantomData,
        })
    }
}

/// Snapshot of every live id in a mixer, with each child's owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceIndex {
    pub tracks: HashSet<Uuid>,
    pub clips: HashMap<Uuid, Uuid>,
    pub notes: HashMap<Uuid, Uuid>,
}

impl ReferenceIndex {
    #[must_use]
    pub fn build(mixer: &Mixer) -> Self {
        let mut index = Self::default();
        for track in &mixer.tracks {
            index.tracks.insert(track.id);
            for clip in &track.clips {
                index.clips.insert(clip.id, track.id);
                if let Some(midi) = clip.as_midi() {
                    index
                        .notes
                        .extend(midi.notes.iter().map(|note| (note.id, clip.id)));
                }
            }
        }
        index
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealReport {
    pub rebound: usize,
    pub detached: usize,
}

/// Re-binds every back-reference in the tree to its actual holder and refreshes them.
///
/// Returns the index used so callers can refresh references they hold outside the tree.
pub fn heal_references(mixer: &mut Mixer) -> (ReferenceIndex, HealReport) {
    let index = ReferenceIndex::build(mixer);
    let mut report = HealReport::default();

    for track in &mut mixer.tracks {
        let track_id = track.id;
        for clip in &mut track.clips {
            if !clip.track.points_to(track_id) {
                clip.track.attach(track_id);
                report.rebound += 1;
            }
            if let RefChange::Detached(_) = clip.track.refresh(&index) {
                report.detached += 1;
            }

            let clip_id = clip.id;
            if let Some(midi) = clip.as_midi_mut() {
                for note in &mut midi.notes {
                    if !note.clip.points_to(clip_id) {
                        note.clip.attach(clip_id);
                        report.rebound += 1;
                    }
                    if let RefChange::Detached(_) = note.clip.refresh(&index) {
                        report.detached += 1;
                    }
                }
            }
        }
    }

    (index, report)
}
