use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::info;

use voxover::config::{ExportOptions, QualityPreset, Settings};
use voxover::ffmpeg::Ffmpeg;
use voxover::fonts::SystemFonts;
use voxover::model::{Project, Segment, Video};
use voxover::pipeline::ExportOrchestrator;
use voxover::tts::{EdgeTtsClient, SpeechCache, SpeechGenerator, SpeechSynthesizer};

#[derive(Parser)]
#[command(name = "voxover")]
#[command(about = "Export narrated videos with TTS voice-over, styled subtitles, and music")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a project manifest to a finished video
    Export {
        /// Project manifest (TOML)
        manifest: PathBuf,

        /// Output video path
        #[arg(short, long)]
        output: PathBuf,

        /// Quality preset: lossless, high, or balanced
        #[arg(short, long, default_value = "balanced")]
        quality: QualityPreset,

        /// Skip subtitle burn-in
        #[arg(long)]
        no_subtitles: bool,

        /// Background music file to loop under the narration
        #[arg(short, long)]
        music: Option<PathBuf>,

        /// Hide progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// List available narration voices
    Voices {
        /// Filter by locale prefix, e.g. "en" or "ta-IN"
        #[arg(short, long)]
        language: Option<String>,
    },
}

/// On-disk project description. Videos are probed at load time.
#[derive(Debug, Deserialize)]
struct ProjectManifest {
    name: String,
    #[serde(default)]
    videos: Vec<VideoManifest>,
}

#[derive(Debug, Deserialize)]
struct VideoManifest {
    path: PathBuf,
    #[serde(default)]
    segments: Vec<Segment>,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "voxover=debug" } else { "voxover=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn load_project(manifest_path: &PathBuf, ffmpeg: &Ffmpeg) -> Result<Project> {
    let contents = std::fs::read_to_string(manifest_path)
        .with_context(|| format!("Could not read manifest {}", manifest_path.display()))?;
    let manifest: ProjectManifest =
        toml::from_str(&contents).context("Invalid project manifest")?;

    let base_dir = manifest_path.parent().map(PathBuf::from).unwrap_or_default();
    let mut project = Project::new(manifest.name);
    for video_manifest in manifest.videos {
        let path = if video_manifest.path.is_absolute() {
            video_manifest.path
        } else {
            base_dir.join(video_manifest.path)
        };
        let mut video = Video::probe(ffmpeg, path)
            .with_context(|| "Could not probe source video".to_string())?;
        for segment in video_manifest.segments {
            video
                .timeline
                .add_segment(segment)
                .context("Invalid segment in manifest")?;
        }
        project.add_video(video);
    }
    Ok(project)
}

async fn run_export(
    manifest: PathBuf,
    output: PathBuf,
    quality: QualityPreset,
    no_subtitles: bool,
    music: Option<PathBuf>,
    no_progress: bool,
) -> Result<()> {
    let settings = Settings::load()?;
    let ffmpeg = Ffmpeg::new(&settings);
    let project = load_project(&manifest, &ffmpeg)?;

    let cache = Arc::new(SpeechCache::open(&settings.cache_dir)?);
    let synthesizer: Arc<dyn SpeechSynthesizer> = Arc::new(EdgeTtsClient::new());
    let generator = Arc::new(SpeechGenerator::new(
        synthesizer,
        cache,
        ffmpeg,
        settings.cache_dir.join("artifacts"),
        settings.max_text_length,
    ));

    let orchestrator = ExportOrchestrator::new(generator, Arc::new(SystemFonts), settings)
        .with_progress_bars(!no_progress);

    let cancelled = orchestrator.cancellation_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling export...");
        cancelled.store(true, Ordering::SeqCst);
    })
    .context("Could not install Ctrl+C handler")?;

    let options = ExportOptions {
        quality,
        include_subtitles: !no_subtitles,
        background_music: music,
    };

    let stats = orchestrator.export(&project, &options, &output).await?;
    info!(
        "Export complete: {} ({} segments, {} from cache, {:.1}s)",
        output.display(),
        stats.segments_total,
        stats.segments_cached,
        stats.elapsed.as_secs_f64(),
    );
    Ok(())
}

async fn run_voices(language: Option<String>) -> Result<()> {
    let client = EdgeTtsClient::new();
    let mut voices = client.list_voices().await?;

    if let Some(prefix) = &language {
        voices.retain(|v| v.locale.starts_with(prefix.as_str()));
    }
    voices.sort_by(|a, b| a.locale.cmp(&b.locale).then(a.short_name.cmp(&b.short_name)));

    for voice in &voices {
        println!("{:<10} {:<8} {}", voice.locale, voice.gender, voice.short_name);
    }
    info!("{} voices", voices.len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Export {
            manifest,
            output,
            quality,
            no_subtitles,
            music,
            no_progress,
        } => run_export(manifest, output, quality, no_subtitles, music, no_progress).await,
        Commands::Voices { language } => run_voices(language).await,
    }
}
