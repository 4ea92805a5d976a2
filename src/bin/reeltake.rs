use std::{cell::RefCell, path::PathBuf, rc::Rc, sync::Arc, time::Duration};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use reeltake::{
    Camera, CameraConfig, Canvas, EffectKind, Fps, TestPatternSource,
    encode::{EncoderBackend, ffmpeg::FfmpegBackend, memory::ChunkedMemoryBackend},
    foundation::clock::{Clock as _, ManualClock},
    schedule::{FixedRateDriver, ManualTickSource, MissedTickPolicy},
    transcode::{PassthroughTranscoder, SharedTranscoder, Transcoder, ffmpeg::FfmpegTranscoder},
};

#[derive(Parser, Debug)]
#[command(name = "reeltake", version)]
struct Cli {
    /// Camera config JSON. Defaults apply to missing fields.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record synthetic clips, combine them and write the artifact.
    Demo(DemoArgs),
    /// Render one composited frame as a PNG.
    Snapshot(SnapshotArgs),
}

#[derive(Parser, Debug)]
struct SourceArgs {
    #[arg(long, default_value_t = 320)]
    width: u32,

    #[arg(long, default_value_t = 240)]
    height: u32,

    /// Filter preset name or CSS filter string, e.g. "grayscale(1) blur(2px)".
    #[arg(long, default_value = "none")]
    filter: String,

    #[arg(long, default_value = "none")]
    effect: EffectKind,

    /// Particle RNG seed.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Parser, Debug)]
struct DemoArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Number of takes to record.
    #[arg(long, default_value_t = 2)]
    clips: u32,

    /// Seconds per take (the budget may cut the last one short).
    #[arg(long, default_value_t = 3)]
    secs: u32,

    #[arg(long, default_value_t = 1.0)]
    speed: f32,

    #[arg(long, default_value_t = 0)]
    countdown: u32,

    #[arg(long, value_enum, default_value_t = EncoderChoice::Memory)]
    encoder: EncoderChoice,

    #[arg(long, value_enum, default_value_t = EngineChoice::Passthrough)]
    engine: EngineChoice,

    /// Pace ticks in real time instead of simulating as fast as possible.
    #[arg(long)]
    realtime: bool,

    /// Output path for the combined artifact.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct SnapshotArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Render ticks to run before capturing (lets particles build up).
    #[arg(long, default_value_t = 30)]
    ticks: u32,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EncoderChoice {
    Memory,
    Ffmpeg,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EngineChoice {
    Passthrough,
    Ffmpeg,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => CameraConfig::from_json_path(path)?,
        None => CameraConfig::default(),
    };
    match cli.cmd {
        Command::Demo(args) => cmd_demo(config, args),
        Command::Snapshot(args) => cmd_snapshot(config, args),
    }
}

fn build_camera(
    config: CameraConfig,
    args: &SourceArgs,
    backend: Box<dyn EncoderBackend>,
    clock: &ManualClock,
) -> anyhow::Result<Camera> {
    let canvas = Canvas::new(args.width, args.height)?;
    let source = TestPatternSource::new(canvas, config.fps);
    let particle_cap = config.particle_cap;
    let mut camera = Camera::new(config, Box::new(source), backend, Arc::new(clock.clone()))?;
    if let Some(seed) = args.seed {
        camera = camera.with_particles(reeltake::ParticleSimulator::with_seed(
            canvas,
            particle_cap,
            seed,
        ));
    }
    camera
        .set_filter(&args.filter)
        .with_context(|| format!("invalid filter '{}'", args.filter))?;
    camera.set_effect(args.effect);
    Ok(camera)
}

fn cmd_snapshot(config: CameraConfig, args: SnapshotArgs) -> anyhow::Result<()> {
    let clock = ManualClock::new();
    let mut camera = build_camera(
        config,
        &args.source,
        Box::new(ChunkedMemoryBackend::new()),
        &clock,
    )?;
    for _ in 0..args.ticks.max(1) {
        camera.render_tick()?;
    }
    let surface = camera
        .compositor()
        .surface()
        .context("compositor produced no frame")?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    let canvas = surface.canvas();
    image::save_buffer_with_format(
        &args.out,
        surface.data(),
        canvas.width,
        canvas.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!(
        "wrote {} ({} particles)",
        args.out.display(),
        camera.particles().particles().len()
    );
    Ok(())
}

fn cmd_demo(config: CameraConfig, args: DemoArgs) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    match args.engine {
        EngineChoice::Passthrough => {
            rt.block_on(run_demo(config, args, SharedTranscoder::new(PassthroughTranscoder)))
        }
        EngineChoice::Ffmpeg => {
            rt.block_on(run_demo(config, args, SharedTranscoder::new(FfmpegTranscoder::default())))
        }
    }
}

async fn run_demo<T: Transcoder>(
    config: CameraConfig,
    args: DemoArgs,
    engine: SharedTranscoder<T>,
) -> anyhow::Result<()> {
    let preload = engine.preload();
    let fps = config.fps;
    let backend: Box<dyn EncoderBackend> = match args.encoder {
        EncoderChoice::Memory => Box::new(ChunkedMemoryBackend::new()),
        EncoderChoice::Ffmpeg => Box::new(FfmpegBackend::default()),
    };
    let clock = ManualClock::new();
    let mut camera = build_camera(config, &args.source, backend, &clock)?;
    if !camera.set_speed(args.speed) {
        anyhow::bail!("speed {} is not one of the configured options", args.speed);
    }
    if !camera.set_countdown(args.countdown) {
        anyhow::bail!("countdown {} is not one of the configured options", args.countdown);
    }

    let camera = Rc::new(RefCell::new(camera));
    let frames = ManualTickSource::new();
    let seconds = ManualTickSource::new();
    let attachment = Camera::attach(&camera, &frames, &seconds);
    let mut ticker = Ticker::new(fps, args.realtime);

    for take in 0..args.clips {
        if !camera.borrow_mut().start_recording()? {
            tracing::info!(take, "no budget or clip capacity left");
            break;
        }
        ticker.run_secs(&clock, &frames, &seconds, args.countdown).await;
        let target = args.secs.max(1);
        for _ in 0..target {
            if !camera.borrow().session().is_capturing() {
                break;
            }
            ticker.run_secs(&clock, &frames, &seconds, 1).await;
        }
        if let Some(err) = camera.borrow_mut().take_last_error() {
            return Err(err.into());
        }
        let stored = camera.borrow_mut().stop_recording()?;
        tracing::info!(take, ?stored, "take finished");
    }
    attachment.detach();
    preload.await.ok();

    let request = camera
        .borrow_mut()
        .begin_combine()
        .context("nothing recorded to combine")?;
    let progress = request.progress.clone();
    let result = request.run(&engine).await;
    let mut camera = camera.borrow_mut();
    let artifact = camera
        .finish_combine(result)?
        .cloned()
        .context("combination was cancelled")?;
    let bytes = camera.preview_bytes().context("preview released early")?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, &bytes)
        .with_context(|| format!("write artifact '{}'", args.out.display()))?;

    eprintln!(
        "wrote {} ({} bytes, {}, {} clips, {}s{}, progress {:.0}%)",
        args.out.display(),
        artifact.byte_len,
        artifact.mime,
        camera.clips().len(),
        camera.clips().total_duration(),
        if artifact.degraded { ", degraded" } else { "" },
        progress.get(),
    );
    Ok(())
}

/// Drives the frame and second tick sources from a manual clock.
struct Ticker {
    frame_driver: FixedRateDriver,
    second_driver: FixedRateDriver,
    frame_interval: Duration,
    realtime: bool,
}

impl Ticker {
    fn new(fps: Fps, realtime: bool) -> Self {
        let frame_interval = fps.frame_interval();
        Self {
            frame_driver: FixedRateDriver::new(frame_interval, Duration::ZERO, MissedTickPolicy::Burst),
            second_driver: FixedRateDriver::new(
                Duration::from_secs(1),
                Duration::ZERO,
                MissedTickPolicy::Burst,
            ),
            frame_interval,
            realtime,
        }
    }

    async fn run_secs(
        &mut self,
        clock: &ManualClock,
        frames: &ManualTickSource,
        seconds: &ManualTickSource,
        secs: u32,
    ) {
        let until = clock.now() + Duration::from_secs(u64::from(secs));
        while clock.now() < until {
            if self.realtime {
                tokio::time::sleep(self.frame_interval).await;
            }
            let next = self.frame_driver.next_due().min(until);
            clock.advance(next.saturating_sub(clock.now()));
            self.frame_driver.poll(frames, clock.now());
            self.second_driver.poll(seconds, clock.now());
        }
    }
}
