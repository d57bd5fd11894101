use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wavecast::encode::ffmpeg::{FfmpegEncoder, FfmpegMuxer, ensure_parent_dir, is_ffmpeg_on_path};
use wavecast::encode::worker::{DEFAULT_QUEUE_CAPACITY, EncodeWorker};
use wavecast::settings::store::{JsonFileStore, SettingsStore};
use wavecast::{
    AudioSource, EffectConfig, EncodeSession, EncodeTarget, ExportOutcome, ExportPipeline, Project,
};

#[derive(Parser, Debug)]
#[command(name = "wavecast", version, about = "Audio-reactive video renderer")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export an MP4 video for an audio file (requires `ffmpeg` on PATH).
    Render(RenderArgs),
    /// Render a single frame as a PNG.
    Frame(FrameArgs),
    /// Print offline waveform peaks and RMS as JSON.
    Analyze(AnalyzeArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input WAV file.
    #[arg(long)]
    audio: PathBuf,

    /// Project JSON. Defaults to the last saved session.
    #[arg(long)]
    project: Option<PathBuf>,

    /// Output MP4 file, or a directory to place a timestamped file in.
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Encode on a background thread.
    #[arg(long)]
    worker: bool,

    /// Do not store the project as the last-used session.
    #[arg(long)]
    no_save: bool,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input WAV file.
    #[arg(long)]
    audio: PathBuf,

    /// Project JSON. Defaults to the last saved session.
    #[arg(long)]
    project: Option<PathBuf>,

    /// Time in seconds.
    #[arg(long, default_value_t = 0.0)]
    time: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    /// Input WAV file.
    #[arg(long)]
    audio: PathBuf,

    /// Number of segments.
    #[arg(long, default_value_t = 1024)]
    segments: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Analyze(args) => cmd_analyze(args),
    }
}

fn read_audio(path: &Path) -> anyhow::Result<Arc<AudioSource>> {
    let bytes = std::fs::read(path).with_context(|| format!("read audio '{}'", path.display()))?;
    let source = AudioSource::from_wav_bytes(bytes)
        .with_context(|| format!("decode audio '{}'", path.display()))?;
    Ok(Arc::new(source))
}

fn open_store() -> anyhow::Result<JsonFileStore> {
    let mut store = JsonFileStore::in_config_dir()?;
    store.open()?;
    Ok(store)
}

fn load_project(path: Option<&Path>) -> anyhow::Result<Project> {
    if let Some(path) = path {
        return Project::load(path).with_context(|| format!("load project '{}'", path.display()));
    }
    let restored = match open_store() {
        Ok(store) => Project::restore(&store).context("restore last session")?,
        Err(e) => {
            tracing::warn!(error = %e, "settings store unavailable");
            None
        }
    };
    match restored {
        Some(project) => Ok(project),
        None => default_project(),
    }
}

fn default_project() -> anyhow::Result<Project> {
    let effects = [
        serde_json::json!({"type": "background", "id": "background", "color": "#101418"}),
        serde_json::json!({
            "type": "waveform",
            "id": "waveform",
            "zIndex": 1,
            "color": "#4fd1c5",
            "position": {"x": 0.1, "y": 0.3},
            "size": {"width": 0.8, "height": 0.4}
        }),
    ]
    .into_iter()
    .map(EffectConfig::from_json)
    .collect::<Result<Vec<_>, _>>()?;
    Ok(Project {
        effects,
        ..Project::default()
    })
}

fn output_path(out: &Path) -> PathBuf {
    if out.is_dir() || out.as_os_str().to_string_lossy().ends_with('/') {
        out.join(wavecast::ExportedFile::timestamped_name())
    } else {
        out.to_path_buf()
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    if !is_ffmpeg_on_path() {
        anyhow::bail!("ffmpeg is required for `render` but was not found on PATH");
    }
    let audio = read_audio(&args.audio)?;
    let project = load_project(args.project.as_deref())?;
    let mut manager = project.build_manager()?;
    let mut pipeline = ExportPipeline::new(project.export.clone())?;

    let encoder = Box::new(FfmpegEncoder::default());
    let muxer = Box::new(FfmpegMuxer::new());
    let mut target: Box<dyn EncodeTarget> = if args.worker {
        Box::new(EncodeWorker::spawn(encoder, muxer, DEFAULT_QUEUE_CAPACITY)?)
    } else {
        Box::new(EncodeSession::new(encoder, muxer))
    };

    let mut next_report = 0.1;
    let outcome = pipeline.export(&mut manager, &audio, target.as_mut(), |progress| {
        if progress >= next_report {
            tracing::info!(percent = (progress * 100.0).round(), "exporting");
            next_report += 0.1;
        }
    })?;

    let file = match outcome {
        ExportOutcome::Completed(file) => file,
        ExportOutcome::Cancelled => {
            eprintln!("export cancelled");
            return Ok(());
        }
    };

    let out = output_path(&args.out);
    ensure_parent_dir(&out)?;
    std::fs::write(&out, &file.bytes).with_context(|| format!("write mp4 '{}'", out.display()))?;

    if !args.no_save {
        match open_store() {
            Ok(mut store) => {
                if let Err(e) = project.persist(&mut store) {
                    tracing::warn!(error = %e, "failed to save session");
                }
                store.close();
            }
            Err(e) => tracing::warn!(error = %e, "settings store unavailable"),
        }
    }

    eprintln!("wrote {}", out.display());
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let audio = read_audio(&args.audio)?;
    let project = load_project(args.project.as_deref())?;
    let mut manager = project.build_manager()?;
    manager.set_audio(audio)?;
    manager.wait_offline()?;
    manager.render(args.time)?;
    let frame = manager.frame();

    ensure_parent_dir(&args.out)?;
    image::save_buffer_with_format(
        &args.out,
        &frame.to_straight_rgba8(),
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_analyze(args: AnalyzeArgs) -> anyhow::Result<()> {
    let audio = read_audio(&args.audio)?;
    let channels: Vec<&[f32]> = audio.channels().collect();
    let summary = wavecast::audio::analysis::analyze_offline_channels(&channels, args.segments)?;
    let report = serde_json::json!({
        "sampleRate": audio.sample_rate(),
        "channels": audio.channel_count(),
        "durationSecs": audio.duration_secs(),
        "segmentCount": summary.len(),
        "peaks": summary.peaks,
        "rms": summary.rms,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
