pub mod archive;
pub mod assets;
pub mod buffer_cache;
pub mod caches;
pub mod clipboard;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod export;
pub mod fixtures;
pub mod journal;
pub mod model;
pub mod patch;
pub mod persistence;
pub mod reference;
pub mod routing;
pub mod time;
pub mod waveform;

pub use archive::{
    ArchiveBackend, ArchiveEntry, ArchiveError, PackMetadata, RawArchive, SampleBlob, SamplePack,
};
pub use assets::{AudioAssetEntry, decode_audio_bytes, decode_audio_file, scan_audio_assets};
pub use buffer_cache::{BufferCache, CacheError, DecodedBuffer};
pub use caches::SharedCaches;
pub use clipboard::{Clipboard, ClipboardItem};
pub use config::CliplaneConfig;
pub use diagnostics::{
    LogRotation, TelemetryGuard, init_tracing, init_tracing_from_config, init_tracing_with_options,
};
pub use engine::{
    AddTrackRequest, BoundsViolation, Engine, EngineError, ExportKind, MasterPatch, PasteReport,
    TrackMixPatch,
};
pub use export::Mp3FrameEncoder;
pub use journal::{Journaled, MutationJournal};
pub use model::{
    AudioClip, Clip, ClipKind, MasterBus, MidiClip, MidiNote, Mixer, NoteName, PitchClass,
    Project, Rgb, Track,
};
pub use patch::{Change, ProjectPatch};
pub use reference::{HealReport, Resolution, WeakRef, heal_references};
pub use routing::{AuxSend, Routing, RoutingError, is_valid_send};
pub use time::{TimeSignature, Timeline};
pub use waveform::{Peak, WaveformCache, WaveformPeaks};
