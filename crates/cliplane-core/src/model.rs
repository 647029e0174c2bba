use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{reference::WeakRef, routing::Routing, time::Timeline};

pub const DEFAULT_LANE_HEIGHT: u32 = 96;
pub const DEFAULT_MIDI_ZOOM: u32 = 64;
pub const DEFAULT_TRACK_GAIN_DB: f32 = 0.0;
pub const DEFAULT_TRACK_PAN: f32 = 0.0;
pub const MAX_VELOCITY: u8 = 127;

/// The persisted document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub timeline: Timeline,
    pub mixer: Mixer,
    #[serde(default)]
    pub routing: Routing,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    #[must_use]
    pub fn new(title: impl Into<String>, bpm: u32, sample_rate: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            timeline: Timeline::new(bpm, sample_rate),
            mixer: Mixer::default(),
            routing: Routing::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    #[must_use]
    pub fn clip_count(&self) -> usize {
        self.mixer.tracks.iter().map(|track| track.clips.len()).sum()
    }

    #[must_use]
    pub fn note_count(&self) -> usize {
        self.mixer.clips().map(Clip::note_count).sum()
    }

    #[must_use]
    pub fn end_sample(&self) -> u64 {
        self.mixer.clips().map(|clip| clip.end).max().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Self(0x52, 0xe1, 0xc4)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MasterBus {
    pub gain_db: f32,
    pub pan: f32,
    pub mute: bool,
}

impl Default for MasterBus {
    fn default() -> Self {
        Self {
            gain_db: DEFAULT_TRACK_GAIN_DB,
            pan: DEFAULT_TRACK_PAN,
            mute: false,
        }
    }
}

/// Root of the entity tree. Track order is lane order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Mixer {
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub master: MasterBus,
}

impl Mixer {
    #[must_use]
    pub fn track(&self, id: Uuid) -> Option<&Track> {
        self.tracks.iter().find(|track| track.id == id)
    }

    pub fn track_mut(&mut self, id: Uuid) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|track| track.id == id)
    }

    #[must_use]
    pub fn track_index(&self, id: Uuid) -> Option<usize> {
        self.tracks.iter().position(|track| track.id == id)
    }

    pub fn clips(&self) -> impl Iterator<Item = &Clip> {
        self.tracks.iter().flat_map(|track| track.clips.iter())
    }

    #[must_use]
    pub fn clip(&self, id: Uuid) -> Option<&Clip> {
        self.clips().find(|clip| clip.id == id)
    }

    pub fn clip_mut(&mut self, id: Uuid) -> Option<&mut Clip> {
        self.tracks
            .iter_mut()
            .flat_map(|track| track.clips.iter_mut())
            .find(|clip| clip.id == id)
    }

    /// `(track index, clip index)` of the clip with `id`.
    #[must_use]
    pub fn clip_location(&self, id: Uuid) -> Option<(usize, usize)> {
        self.tracks.iter().enumerate().find_map(|(track_index, track)| {
            track
                .clips
                .iter()
                .position(|clip| clip.id == id)
                .map(|clip_index| (track_index, clip_index))
        })
    }

    pub fn selected_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|track| track.selected)
    }

    pub fn selected_clips(&self) -> impl Iterator<Item = &Clip> {
        self.clips().filter(|clip| clip.selected)
    }

    pub fn select_clip(&mut self, id: Uuid) -> bool {
        self.tracks.iter_mut().any(|track| track.select_clip(id))
    }

    pub fn unselect_clip(&mut self, id: Uuid) -> bool {
        self.tracks.iter_mut().any(|track| track.unselect_clip(id))
    }

    pub fn unselect_all_clips(&mut self) {
        for track in &mut self.tracks {
            track.unselect_all_clips();
        }
    }

    pub fn select_track(&mut self, id: Uuid) -> bool {
        match self.track_mut(id) {
            Some(track) => {
                track.selected = true;
                true
            }
            None => false,
        }
    }

    pub fn unselect_all_tracks(&mut self) {
        for track in &mut self.tracks {
            track.selected = false;
        }
    }

    #[must_use]
    pub fn total_lane_height(&self) -> u64 {
        self.tracks
            .iter()
            .map(|track| u64::from(track.lane_height))
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: Uuid,
    pub name: String,
    pub color: Rgb,
    #[serde(default = "default_lane_height")]
    pub lane_height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
    #[serde(
        default = "default_track_gain_db",
        skip_serializing_if = "is_default_track_gain_db"
    )]
    pub gain_db: f32,
    #[serde(
        default = "default_track_pan",
        skip_serializing_if = "is_default_track_pan"
    )]
    pub pan: f32,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub selected: bool,
    pub clips: Vec<Clip>,
}

impl Track {
    #[must_use]
    pub fn new(name: impl Into<String>, color: Rgb) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            color,
            lane_height: DEFAULT_LANE_HEIGHT,
            instrument: None,
            gain_db: default_track_gain_db(),
            pan: default_track_pan(),
            mute: false,
            solo: false,
            selected: false,
            clips: Vec::new(),
        }
    }

    #[must_use]
    pub fn clip(&self, id: Uuid) -> Option<&Clip> {
        self.clips.iter().find(|clip| clip.id == id)
    }

    pub fn clip_mut(&mut self, id: Uuid) -> Option<&mut Clip> {
        self.clips.iter_mut().find(|clip| clip.id == id)
    }

    pub fn create_audio_clip(
        &mut self,
        name: impl Into<String>,
        start: u64,
        end: u64,
        audio: AudioClip,
    ) -> &mut Clip {
        self.insert_clip(Clip::new(name, start, end, ClipKind::Audio(audio)))
    }

    pub fn create_midi_clip(&mut self, name: impl Into<String>, start: u64, end: u64) -> &mut Clip {
        self.insert_clip(Clip::new(
            name,
            start,
            end,
            ClipKind::Midi(MidiClip::default()),
        ))
    }

    /// Appends `clip`, pointing its back-reference at this track.
    pub fn insert_clip(&mut self, clip: Clip) -> &mut Clip {
        let index = self.clips.len();
        self.insert_clip_at(index, clip)
    }

    pub fn insert_clip_at(&mut self, index: usize, mut clip: Clip) -> &mut Clip {
        clip.track.attach(self.id);
        clip.bind_notes();
        let index = index.min(self.clips.len());
        self.clips.insert(index, clip);
        &mut self.clips[index]
    }

    pub fn delete_clip(&mut self, id: Uuid) -> Option<Clip> {
        let index = self.clips.iter().position(|clip| clip.id == id)?;
        Some(self.clips.remove(index))
    }

    pub fn select_clip(&mut self, id: Uuid) -> bool {
        self.set_clip_selected(id, true)
    }

    pub fn unselect_clip(&mut self, id: Uuid) -> bool {
        self.set_clip_selected(id, false)
    }

    pub fn unselect_all_clips(&mut self) {
        for clip in &mut self.clips {
            clip.selected = false;
        }
    }

    pub fn selected_clips(&self) -> impl Iterator<Item = &Clip> {
        self.clips.iter().filter(|clip| clip.selected)
    }

    fn set_clip_selected(&mut self, id: Uuid, selected: bool) -> bool {
        match self.clip_mut(id) {
            Some(clip) => {
                clip.selected = selected;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clip {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub track: WeakRef<Track>,
    pub start: u64,
    pub end: u64,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub selected: bool,
    pub kind: ClipKind,
}

impl Clip {
    /// `end` is raised to `start` if it lies before it.
    #[must_use]
    pub fn new(name: impl Into<String>, start: u64, end: u64, kind: ClipKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            track: WeakRef::unattached(),
            start,
            end: end.max(start),
            locked: false,
            selected: false,
            kind,
        }
    }

    /// Key of this clip's content in the buffer and waveform caches.
    #[must_use]
    pub const fn cache_key(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn length(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub const fn is_audio(&self) -> bool {
        matches!(self.kind, ClipKind::Audio(_))
    }

    #[must_use]
    pub const fn as_audio(&self) -> Option<&AudioClip> {
        match &self.kind {
            ClipKind::Audio(audio) => Some(audio),
            ClipKind::Midi(_) => None,
        }
    }

    #[must_use]
    pub const fn as_midi(&self) -> Option<&MidiClip> {
        match &self.kind {
            ClipKind::Midi(midi) => Some(midi),
            ClipKind::Audio(_) => None,
        }
    }

    pub fn as_midi_mut(&mut self) -> Option<&mut MidiClip> {
        match &mut self.kind {
            ClipKind::Midi(midi) => Some(midi),
            ClipKind::Audio(_) => None,
        }
    }

    #[must_use]
    pub fn note_count(&self) -> usize {
        self.as_midi().map_or(0, |midi| midi.notes.len())
    }

    /// Copy of this clip under fresh ids, including fresh note ids.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        let mut copy = self.clone();
        copy.id = Uuid::new_v4();
        if let Some(midi) = copy.as_midi_mut() {
            for note in &mut midi.notes {
                note.id = Uuid::new_v4();
            }
        }
        copy.bind_notes();
        copy
    }

    pub(crate) fn bind_notes(&mut self) {
        let clip_id = self.id;
        if let Some(midi) = self.as_midi_mut() {
            for note in &mut midi.notes {
                note.clip.attach(clip_id);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClipKind {
    Audio(AudioClip),
    Midi(MidiClip),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioClip {
    pub fade_in: u64,
    pub fade_out: u64,
    pub loop_length: Option<u64>,
    /// First sample of the cached buffer that plays at `Clip::start`.
    pub source_offset: u64,
    pub gain_db: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MidiClip {
    pub notes: Vec<MidiNote>,
    /// Samples per pixel of the note editor.
    pub zoom: u32,
}

impl Default for MidiClip {
    fn default() -> Self {
        Self {
            notes: Vec::new(),
            zoom: DEFAULT_MIDI_ZOOM,
        }
    }
}

impl MidiClip {
    #[must_use]
    pub fn note(&self, id: Uuid) -> Option<&MidiNote> {
        self.notes.iter().find(|note| note.id == id)
    }

    pub fn note_mut(&mut self, id: Uuid) -> Option<&mut MidiNote> {
        self.notes.iter_mut().find(|note| note.id == id)
    }

    #[must_use]
    pub fn note_index(&self, id: Uuid) -> Option<usize> {
        self.notes.iter().position(|note| note.id == id)
    }

    pub fn add_note(&mut self, note: MidiNote) -> Uuid {
        let id = note.id;
        self.notes.push(note);
        id
    }

    pub fn remove_note(&mut self, id: Uuid) -> Option<MidiNote> {
        let index = self.note_index(id)?;
        Some(self.notes.remove(index))
    }

    pub fn select_note(&mut self, id: Uuid) -> bool {
        self.set_note_selected(id, true)
    }

    pub fn unselect_note(&mut self, id: Uuid) -> bool {
        self.set_note_selected(id, false)
    }

    pub fn unselect_all_notes(&mut self) {
        for note in &mut self.notes {
            note.selected = false;
        }
    }

    pub fn selected_notes(&self) -> impl Iterator<Item = &MidiNote> {
        self.notes.iter().filter(|note| note.selected)
    }

    fn set_note_selected(&mut self, id: Uuid, selected: bool) -> bool {
        match self.note_mut(id) {
            Some(note) => {
                note.selected = selected;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MidiNote {
    pub id: Uuid,
    #[serde(default)]
    pub clip: WeakRef<Clip>,
    pub note: NoteName,
    /// Offsets in samples from the owning clip's start.
    pub on: u64,
    pub off: u64,
    pub velocity: u8,
    #[serde(default)]
    pub selected: bool,
}

impl MidiNote {
    #[must_use]
    pub fn new(note: NoteName, on: u64, off: u64, velocity: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            clip: WeakRef::unattached(),
            note,
            on,
            off: off.max(on),
            velocity: velocity.min(MAX_VELOCITY),
            selected: false,
        }
    }

    #[must_use]
    pub const fn length(&self) -> u64 {
        self.off.saturating_sub(self.on)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    const ALL: [Self; 12] = [
        Self::C,
        Self::CSharp,
        Self::D,
        Self::DSharp,
        Self::E,
        Self::F,
        Self::FSharp,
        Self::G,
        Self::GSharp,
        Self::A,
        Self::ASharp,
        Self::B,
    ];

    #[must_use]
    pub const fn semitone(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::C => "C",
            Self::CSharp => "C#",
            Self::D => "D",
            Self::DSharp => "D#",
            Self::E => "E",
            Self::F => "F",
            Self::FSharp => "F#",
            Self::G => "G",
            Self::GSharp => "G#",
            Self::A => "A",
            Self::ASharp => "A#",
            Self::B => "B",
        }
    }
}

/// Pitch name plus octave; middle C (MIDI 60) is `C4`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteName {
    pub pitch: PitchClass,
    pub octave: i8,
}

impl NoteName {
    #[must_use]
    pub const fn new(pitch: PitchClass, octave: i8) -> Self {
        Self { pitch, octave }
    }

    #[must_use]
    pub fn from_midi(value: u8) -> Self {
        let value = value.min(127);
        Self {
            pitch: PitchClass::ALL[usize::from(value % 12)],
            octave: (value / 12) as i8 - 1,
        }
    }

    /// `None` when the pitch falls outside 0..=127.
    #[must_use]
    pub fn to_midi(self) -> Option<u8> {
        let value = (i16::from(self.octave) + 1) * 12 + i16::from(self.pitch.semitone());
        u8::try_from(value).ok().filter(|value| *value <= 127)
    }

    #[must_use]
    pub fn transposed(self, semitones: i16) -> Option<Self> {
        let current = i16::from(self.to_midi()?);
        u8::try_from(current + semitones)
            .ok()
            .filter(|value| *value <= 127)
            .map(Self::from_midi)
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch.label(), self.octave)
    }
}

const fn default_lane_height() -> u32 {
    DEFAULT_LANE_HEIGHT
}

const fn default_track_gain_db() -> f32 {
    DEFAULT_TRACK_GAIN_DB
}

const fn default_track_pan() -> f32 {
    DEFAULT_TRACK_PAN
}

fn is_default_track_gain_db(value: &f32) -> bool {
    (*value - DEFAULT_TRACK_GAIN_DB).abs() <= f32::EPSILON
}

fn is_default_track_pan(value: &f32) -> bool {
    (*value - DEFAULT_TRACK_PAN).abs() <= f32::EPSILON
}
