use crate::model::{Clip, MidiNote, Track};

#[derive(Debug, Clone, PartialEq)]
pub enum ClipboardItem {
    Track(Track),
    Clip(Clip),
    Note(MidiNote),
}

impl From<Track> for ClipboardItem {
    fn from(value: Track) -> Self {
        Self::Track(value)
    }
}

impl From<Clip> for ClipboardItem {
    fn from(value: Clip) -> Self {
        Self::Clip(value)
    }
}

impl From<MidiNote> for ClipboardItem {
    fn from(value: MidiNote) -> Self {
        Self::Note(value)
    }
}

/// Owned snapshot of the last copy, split by entity kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clipboard {
    tracks: Vec<Track>,
    clips: Vec<Clip>,
    notes: Vec<MidiNote>,
}

impl Clipboard {
    /// Replaces the whole snapshot; copying is never additive.
    pub fn copy<I>(&mut self, items: I)
    where
        I: IntoIterator,
        I::Item: Into<ClipboardItem>,
    {
        self.clear();
        for item in items {
            match item.into() {
                ClipboardItem::Track(track) => self.tracks.push(track),
                ClipboardItem::Clip(clip) => self.clips.push(clip),
                ClipboardItem::Note(note) => self.notes.push(note),
            }
        }
    }

    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[must_use]
    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    #[must_use]
    pub fn notes(&self) -> &[MidiNote] {
        &self.notes
    }

    /// Tracks then clips. Notes only paste inside a midi clip, so they are left out.
    #[must_use]
    pub fn all(&self) -> Vec<ClipboardItem> {
        self.tracks
            .iter()
            .cloned()
            .map(ClipboardItem::Track)
            .chain(self.clips.iter().cloned().map(ClipboardItem::Clip))
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty() && self.clips.is_empty() && self.notes.is_empty()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.clips.clear();
        self.notes.clear();
    }
}
