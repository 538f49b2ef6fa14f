use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use sha2::Digest as _;

use reelplay::decode::{CancelToken, DefaultFetcher, MediaFetcher as _};
use reelplay::demux::{DemuxEvent, Mp4Demuxer};
use reelplay::{EngineConfig, EngineDeps, EngineEvent, ExportFormat, PlaybackEngine, PlaybackState};

#[derive(Parser, Debug)]
#[command(name = "reelplay", version)]
struct Cli {
    /// Engine config JSON; `REELPLAY_*` environment overrides apply on top.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the container's media info as JSON.
    Probe(ProbeArgs),
    /// Composite the frame at a given time into a PNG (requires `media-ffmpeg`).
    Frame(FrameArgs),
    /// Play headlessly against a simulated animation clock.
    Play(PlayArgs),
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Input path or URL.
    #[arg(long = "in")]
    input: String,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input path or URL.
    #[arg(long = "in")]
    input: String,

    /// Presentation time in milliseconds.
    #[arg(long, default_value_t = 0.0)]
    at_ms: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Canvas width in logical pixels (defaults to the video's display width).
    #[arg(long)]
    width: Option<u32>,

    /// Canvas height in logical pixels (defaults to the video's display height).
    #[arg(long)]
    height: Option<u32>,
}

#[derive(Parser, Debug)]
struct PlayArgs {
    /// Input path or URL.
    #[arg(long = "in")]
    input: String,

    /// Wall-clock seconds to simulate.
    #[arg(long, default_value_t = 5.0)]
    seconds: f64,

    /// Simulated animation frame rate.
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Canvas width in logical pixels.
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Canvas height in logical pixels.
    #[arg(long, default_value_t = 360)]
    height: u32,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    match cli.cmd {
        Command::Probe(args) => cmd_probe(&config, args),
        Command::Frame(args) => cmd_frame(config, args),
        Command::Play(args) => cmd_play(config, args),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(p) => EngineConfig::from_path(p)
            .with_context(|| format!("load engine config '{}'", p.display()))?,
        None => EngineConfig::default(),
    }
    .with_env_overrides();
    config.validate().context("validate engine config")?;
    Ok(config)
}

fn cmd_probe(config: &EngineConfig, args: ProbeArgs) -> anyhow::Result<()> {
    let bytes = DefaultFetcher
        .fetch(&args.input, &CancelToken::new(), config.fetch_timeout())
        .with_context(|| format!("fetch '{}'", args.input))?;

    let mut demuxer = Mp4Demuxer::new();
    demuxer.append_data(&bytes, 0);
    demuxer.flush();
    for event in demuxer.drain_events() {
        if let DemuxEvent::Error(e) = event {
            return Err(e).with_context(|| format!("parse '{}'", args.input));
        }
    }
    let info = demuxer
        .media_info()
        .with_context(|| format!("'{}' has no playable movie header", args.input))?;

    println!("{}", serde_json::to_string_pretty(info)?);
    Ok(())
}

fn cmd_frame(config: EngineConfig, args: FrameArgs) -> anyhow::Result<()> {
    let mut engine = PlaybackEngine::new(config, EngineDeps::default())?;
    let info = engine
        .load(&args.input)
        .with_context(|| format!("load '{}'", args.input))?;

    let (vw, vh) = info
        .video
        .as_ref()
        .map(|v| (v.display_width, v.display_height))
        .unwrap_or((640, 360));
    let width = args.width.unwrap_or(vw);
    let height = args.height.unwrap_or(vh);
    engine.attach_canvas(f64::from(width), f64::from(height))?;
    engine
        .seek(args.at_ms)
        .with_context(|| format!("seek to {} ms", args.at_ms))?;
    engine.flush_rendering()?;

    let compositor = engine
        .compositor()
        .context("canvas missing after attach")?;
    let surface = compositor.surface();
    let png = reelplay::render::export::encode(
        surface.pixels(),
        u32::from(surface.pixel_width()),
        u32::from(surface.pixel_height()),
        ExportFormat::Png,
        1.0,
        engine.config().background,
    )?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_play(config: EngineConfig, args: PlayArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.fps > 0, "--fps must be > 0");
    anyhow::ensure!(
        args.seconds.is_finite() && args.seconds >= 0.0,
        "--seconds must be finite and >= 0"
    );

    let mut engine = PlaybackEngine::new(config, EngineDeps::default())?;
    let ended = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = ended.clone();
    engine.subscribe(move |e| {
        if matches!(e, EngineEvent::Ended) {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    });

    let info = engine
        .load(&args.input)
        .with_context(|| format!("load '{}'", args.input))?;
    engine.attach_canvas(f64::from(args.width), f64::from(args.height))?;
    eprintln!("loaded {} ({:.0} ms)", args.input, info.duration_ms);
    engine.play();

    let step_ms = 1000.0 / f64::from(args.fps);
    let total = (args.seconds * f64::from(args.fps)).round() as u64;
    for i in 0..=total {
        engine.on_animation_frame(i as f64 * step_ms);
        if engine.state() == PlaybackState::Error {
            anyhow::bail!("playback failed at {:.0} ms", engine.current_time_ms());
        }
        if i % u64::from(args.fps) == 0 {
            eprintln!(
                "t={:>8.1}ms state={:?} buffered={}",
                engine.current_time_ms(),
                engine.state(),
                engine.buffered_frames()
            );
        }
        if ended.load(std::sync::atomic::Ordering::SeqCst) {
            break;
        }
    }
    engine.flush_rendering()?;

    let compositor = engine.compositor().context("canvas missing after attach")?;
    let digest = sha2::Sha256::digest(compositor.pixels());
    println!(
        "final_time_ms={:.1} sha256={}",
        engine.current_time_ms(),
        hex(&digest)
    );
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
