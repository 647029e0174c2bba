use cliplane_core::{
    ArchiveBackend, ArchiveEntry, ArchiveError, Engine, EngineError, Project, RawArchive,
    SharedCaches, archive::export_sample_pack, export::wav_bytes, fixtures::sine_buffer,
};
use serde::{Deserialize, Serialize};

/// Stand-in container: the entries and comment as one JSON document.
struct JsonArchive;

#[derive(Serialize, Deserialize)]
struct JsonEntry {
    name: String,
    data: Vec<u8>,
    is_dir: bool,
}

#[derive(Serialize, Deserialize)]
struct JsonDocument {
    comment: Option<String>,
    entries: Vec<JsonEntry>,
}

impl ArchiveBackend for JsonArchive {
    fn write_archive(&self, entries: &[ArchiveEntry], comment: &str) -> Result<Vec<u8>, ArchiveError> {
        let document = JsonDocument {
            comment: Some(comment.to_string()),
            entries: entries
                .iter()
                .map(|entry| JsonEntry {
                    name: entry.name.clone(),
                    data: entry.data.clone(),
                    is_dir: entry.is_dir,
                })
                .collect(),
        };
        Ok(serde_json::to_vec(&document)?)
    }

    fn read_archive(&self, bytes: &[u8]) -> Result<RawArchive, ArchiveError> {
        let document: JsonDocument = serde_json::from_slice(bytes)
            .map_err(|error| ArchiveError::Malformed(error.to_string()))?;
        Ok(RawArchive {
            comment: document.comment,
            entries: document
                .entries
                .into_iter()
                .map(|entry| ArchiveEntry {
                    name: entry.name,
                    data: entry.data,
                    is_dir: entry.is_dir,
                })
                .collect(),
        })
    }
}

fn wav_entry(name: &str, frames: usize) -> ArchiveEntry {
    let bytes = wav_bytes(&sine_buffer(48_000, frames, 440.0)).expect("fixture wav encodes");
    ArchiveEntry::file(name, bytes)
}

fn engine() -> Engine {
    Engine::with_caches(Project::new("Packs", 120, 48_000), SharedCaches::new(None))
}

#[test]
fn pack_imports_as_one_track_with_back_to_back_clips() {
    let entries = [
        ArchiveEntry::directory("kit/"),
        wav_entry("kit/kick.wav", 1_000),
        wav_entry("kit/snare.wav", 2_000),
    ];
    let bytes = export_sample_pack(&JsonArchive, "Basic Kit", "two hits", &entries)
        .expect("pack exports");

    let mut engine = engine();
    let track = engine
        .import_sample_pack(&JsonArchive, &bytes, "Unnamed pack")
        .expect("pack imports");
    assert_eq!(track.name, "Basic Kit");

    let clips: Vec<(&str, u64, u64)> = track
        .clips
        .iter()
        .map(|clip| (clip.name.as_str(), clip.start, clip.end))
        .collect();
    assert_eq!(clips, vec![("kick", 0, 1_000), ("snare", 1_000, 3_000)]);
    for clip in &track.clips {
        let content = engine.clip_content(clip.id).expect("content cached");
        assert_eq!(content.frames() as u64, clip.length());
    }
    assert_eq!(engine.undo_label(), Some("Import sample pack"));
}

#[test]
fn blank_comment_falls_back_to_the_given_name() {
    let entries = [wav_entry("hat.wav", 500)];
    let bytes = JsonArchive
        .write_archive(&entries, "   ")
        .expect("archive writes");

    let mut engine = engine();
    let track = engine
        .import_sample_pack(&JsonArchive, &bytes, "hats")
        .expect("pack imports");
    assert_eq!(track.name, "hats");
    assert_eq!(track.clips.len(), 1);
}

#[test]
fn invalid_metadata_aborts_before_touching_the_project() {
    let entries = [wav_entry("hat.wav", 500)];
    let bytes = JsonArchive
        .write_archive(&entries, "{not json")
        .expect("archive writes");

    let mut engine = engine();
    assert!(matches!(
        engine.import_sample_pack(&JsonArchive, &bytes, "hats"),
        Err(EngineError::Archive(ArchiveError::Metadata(_)))
    ));
    assert!(engine.project().mixer.tracks.is_empty());
    assert!(!engine.can_undo());
}

#[test]
fn one_undecodable_sample_fails_the_whole_pack() {
    let entries = [
        wav_entry("good.wav", 500),
        ArchiveEntry::file("broken.wav", b"definitely not audio".to_vec()),
    ];
    let bytes = export_sample_pack(&JsonArchive, "Mixed", "", &entries).expect("pack exports");

    let mut engine = engine();
    let error = engine
        .import_sample_pack(&JsonArchive, &bytes, "Mixed")
        .expect_err("broken sample");
    assert!(matches!(
        error,
        EngineError::Archive(ArchiveError::Decode { ref name, .. }) if name == "broken.wav"
    ));
    assert!(engine.project().mixer.tracks.is_empty());
    assert!(engine.caches().buffers().is_empty());
}
