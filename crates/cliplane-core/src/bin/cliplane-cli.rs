use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use cliplane_core::{
    CliplaneConfig, Engine, ExportKind, SharedCaches, WaveformPeaks,
    assets::decode_audio_file,
    config::discover_config_path,
    diagnostics::init_tracing_from_config,
    export::export_wav,
    fixtures::{DEMO_LOOP_CLIP_ID, demo_loop_content, demo_project},
    persistence::PROJECT_EXTENSION,
};

#[derive(Debug, Parser)]
#[command(name = "cliplane-cli")]
#[command(about = "Headless tools for Cliplane projects, audio analysis and export")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file; defaults to cliplane.config.toml in the cwd or its parent.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Writes the demo project with its midi and audio renders.
    DemoProject {
        #[arg(long)]
        output_dir: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "all")]
        format: DemoFormat,

        /// Also drops a timestamped copy into the configured autosave directory.
        #[arg(long)]
        autosave: bool,
    },
    /// Decodes an audio file and prints its duration and peak range.
    Analyze {
        path: PathBuf,

        #[arg(long)]
        samples_per_pixel: Option<u32>,
    },
    /// Decodes any supported audio file and writes it as 16-bit wav.
    ExportWav { input: PathBuf, output: PathBuf },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DemoFormat {
    Project,
    Midi,
    Wav,
    Mp3,
    All,
}

fn load_config(cli: &Cli) -> anyhow::Result<CliplaneConfig> {
    let mut config = match &cli.config {
        Some(path) => CliplaneConfig::load_from(path)?,
        None => CliplaneConfig::load_or_default()?,
    };
    if let Some(log_dir) = &cli.log_dir {
        config.paths.logs_dir.clone_from(log_dir);
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let _telemetry = init_tracing_from_config(&config)?;
    if let Ok(path) = discover_config_path() {
        tracing::debug!(path = %path.display(), "config discovered");
    }

    match cli.command {
        Commands::DemoProject {
            output_dir,
            format,
            autosave,
        } => {
            let output_dir = output_dir.unwrap_or_else(|| config.paths.export_dir.clone());
            std::fs::create_dir_all(&output_dir)?;

            let engine = Engine::with_caches(demo_project(), SharedCaches::new(None));
            engine.caches().store(DEMO_LOOP_CLIP_ID, demo_loop_content());
            let project_path = output_dir.join(format!("demo.{PROJECT_EXTENSION}"));
            let midi_path = output_dir.join("demo.mid");
            let wav_path = output_dir.join("demo-loop.wav");
            let mp3_path = output_dir.join("demo-loop.mp3");
            let ffmpeg = Some(config.export.ffmpeg_binary.as_path());

            match format {
                DemoFormat::Project => engine.save_project(&project_path)?,
                DemoFormat::Midi => engine.export_midi(&midi_path)?,
                DemoFormat::Wav => {
                    engine.export_clip_audio(DEMO_LOOP_CLIP_ID, ExportKind::Wav, &wav_path, None)?;
                }
                DemoFormat::Mp3 => {
                    engine.export_clip_audio(DEMO_LOOP_CLIP_ID, ExportKind::Mp3, &mp3_path, ffmpeg)?;
                }
                DemoFormat::All => {
                    engine.save_project(&project_path)?;
                    engine.export_midi(&midi_path)?;
                    engine.export_clip_audio(DEMO_LOOP_CLIP_ID, ExportKind::Wav, &wav_path, None)?;
                    if let Err(error) =
                        engine.export_clip_audio(DEMO_LOOP_CLIP_ID, ExportKind::Mp3, &mp3_path, ffmpeg)
                    {
                        tracing::warn!(%error, "mp3 export skipped because ffmpeg is unavailable");
                    }
                }
            }
            if autosave {
                let path = engine.autosave(&config.paths.autosave_dir)?;
                tracing::info!(path = %path.display(), "demo project autosaved");
            }
            tracing::info!(output_dir = %output_dir.display(), "demo project written");
        }
        Commands::Analyze {
            path,
            samples_per_pixel,
        } => {
            let buffer = decode_audio_file(&path)?;
            let samples_per_pixel = samples_per_pixel.unwrap_or(config.timeline.samples_per_pixel);
            let peaks = WaveformPeaks::compute(&buffer, samples_per_pixel);
            let (min, max) = peaks
                .channels
                .iter()
                .flatten()
                .fold((0.0_f32, 0.0_f32), |(min, max), peak| {
                    (min.min(peak.min), max.max(peak.max))
                });
            println!(
                "{}: {} Hz, {} channel(s), {} frames, {:.3}s, {} columns at {} spp, range [{min:.3}, {max:.3}]",
                path.display(),
                buffer.sample_rate,
                buffer.channel_count(),
                buffer.frames(),
                buffer.duration_seconds(),
                peaks.width(),
                samples_per_pixel,
            );
        }
        Commands::ExportWav { input, output } => {
            let buffer = decode_audio_file(&input)?;
            export_wav(&buffer, &output)?;
            tracing::info!(input = %input.display(), output = %output.display(), "wav written");
        }
    }

    Ok(())
}
