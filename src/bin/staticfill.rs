use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::Parser;
use staticfill::host::{FakeClock, TimerScheduler};
use staticfill::surface::MemorySurface;
use staticfill::text::VelloTextRasterizer;
use staticfill::{Effect, EffectOptions, HostEnv, ValidationMode};

/// Render frames of the static-reveal effect headlessly as PNGs.
#[derive(Parser, Debug)]
#[command(name = "staticfill", version)]
struct Cli {
    /// Text to reveal (overrides the options file).
    #[arg(long)]
    text: Option<String>,

    /// Effect options JSON (same shape as the embedding API takes).
    #[arg(long = "options")]
    options_path: Option<PathBuf>,

    /// Surface width in CSS pixels.
    #[arg(long, default_value_t = 800.0)]
    width: f64,

    /// Surface height in CSS pixels.
    #[arg(long, default_value_t = 600.0)]
    height: f64,

    /// Pixel density (backing pixels per CSS pixel).
    #[arg(long, default_value_t = 1.0)]
    density: f64,

    /// Number of animation steps to render.
    #[arg(long, default_value_t = 8)]
    frames: u32,

    /// Noise seed, for reproducible output.
    #[arg(long)]
    seed: Option<u64>,

    /// Reject out-of-range options instead of clamping them.
    #[arg(long)]
    strict: bool,

    /// Output directory for frame_NNNN.png files.
    #[arg(long, default_value = "frames")]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut options = match &cli.options_path {
        Some(path) => read_options_json(path)?,
        None => EffectOptions::default(),
    };
    if cli.text.is_some() {
        options.text = cli.text.clone();
    }

    let mode = if cli.strict {
        ValidationMode::Strict
    } else {
        ValidationMode::Clamp
    };

    // A manually-stepped clock gives exactly one animation step per frame,
    // independent of wall time.
    let clock = FakeClock::new();
    let host = HostEnv {
        clock: Box::new(clock.clone()),
        scheduler: Box::new(TimerScheduler::default()),
        fallback_scheduler: None,
        text: Box::new(VelloTextRasterizer::new()),
        noise_seed: cli.seed,
    };

    let surface = MemorySurface::new(cli.width, cli.height, cli.density);
    let mut effect = Effect::with_mode(Box::new(surface), host, options, mode)?;
    for warning in effect.warnings() {
        eprintln!("warning: {warning}");
    }

    std::fs::create_dir_all(&cli.out)
        .with_context(|| format!("create output dir '{}'", cli.out.display()))?;

    let step_ms = effect.config().step_ms;
    effect.start()?;
    for i in 0..cli.frames {
        clock.advance(step_ms);
        effect.on_host_frame()?;

        let frame = effect.snapshot()?;
        let path = cli.out.join(format!("frame_{i:04}.png"));
        image::save_buffer_with_format(
            &path,
            frame.data(),
            frame.width(),
            frame.height(),
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .with_context(|| format!("write png '{}'", path.display()))?;
    }
    effect.destroy();

    eprintln!("wrote {} frames to {}", cli.frames, cli.out.display());
    Ok(())
}

fn read_options_json(path: &Path) -> anyhow::Result<EffectOptions> {
    let f = File::open(path).with_context(|| format!("open options '{}'", path.display()))?;
    let r = BufReader::new(f);
    let options: EffectOptions =
        serde_json::from_reader(r).with_context(|| "parse options JSON")?;
    Ok(options)
}
