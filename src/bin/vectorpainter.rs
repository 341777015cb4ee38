use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vectorpainter::pipeline::batch::read_prompts_file;
use vectorpainter::{
    AnalyticDiffusion, PainterConfig, Pipeline, PositionLoss, RunRequest, run_batch,
};

#[derive(Parser, Debug)]
#[command(name = "vectorpainter", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Paint one prompt in the style of an image.
    Paint(PaintArgs),
    /// Paint every prompt with every seed, one run directory each.
    Batch(BatchArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Reference style image.
    #[arg(long)]
    style: PathBuf,

    /// Prompt for content the model should avoid.
    #[arg(long, default_value = "")]
    negative_prompt: String,

    /// Description of the style image. Captioned by the model when omitted.
    #[arg(long)]
    style_prompt: Option<String>,

    /// Painter config JSON. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root directory for run directories.
    #[arg(long, default_value = "workdir")]
    out: PathBuf,

    /// Stroke shape preservation term for stage 2.
    #[arg(long)]
    pos_type: Option<PositionLoss>,

    /// Capture stage-2 frames and assemble `rendering.mp4` (requires `ffmpeg` on PATH).
    #[arg(long, default_value_t = false)]
    make_video: bool,
}

#[derive(Args, Debug)]
struct PaintArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Text prompt.
    #[arg(long)]
    prompt: String,

    /// Override the config seed.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct BatchArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Text prompt.
    #[arg(long, conflicts_with = "prompts_file", required_unless_present = "prompts_file")]
    prompt: Option<String>,

    /// File with one prompt per line.
    #[arg(long)]
    prompts_file: Option<PathBuf>,

    /// Half-open seed range, e.g. `0..4`. Falls back to the config's batch settings.
    #[arg(long, value_parser = parse_seed_range)]
    seeds: Option<(u64, u64)>,
}

fn parse_seed_range(s: &str) -> Result<(u64, u64), String> {
    let (a, b) = s
        .split_once("..")
        .ok_or_else(|| format!("expected START..END, got '{s}'"))?;
    let start: u64 = a.trim().parse().map_err(|e| format!("bad start '{a}': {e}"))?;
    let end: u64 = b.trim().parse().map_err(|e| format!("bad end '{b}': {e}"))?;
    if start >= end {
        return Err(format!("empty seed range {start}..{end}"));
    }
    Ok((start, end))
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Paint(args) => cmd_paint(args),
        Command::Batch(args) => cmd_batch(args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(common: &CommonArgs) -> anyhow::Result<PainterConfig> {
    let mut cfg = match &common.config {
        Some(path) => PainterConfig::from_path(path)
            .with_context(|| format!("load config '{}'", path.display()))?,
        None => PainterConfig::default(),
    };
    if let Some(pos_type) = common.pos_type {
        cfg.loss.pos_type = pos_type;
    }
    if common.make_video {
        cfg.output.make_video = true;
    }
    Ok(cfg)
}

fn build_pipeline(cfg: PainterConfig) -> anyhow::Result<Pipeline<AnalyticDiffusion>> {
    let device = candle_core::Device::Cpu;
    let model = match cfg.model_id.as_str() {
        "analytic" => AnalyticDiffusion::new(&device)?,
        other => anyhow::bail!("unknown model '{other}' (available: analytic)"),
    };
    Ok(Pipeline::new(cfg, model)?.with_device(device))
}

fn request(common: &CommonArgs, prompt: String) -> RunRequest {
    RunRequest {
        style_path: common.style.clone(),
        prompt,
        negative_prompt: common.negative_prompt.clone(),
        style_prompt: common.style_prompt.clone(),
    }
}

fn cmd_paint(args: PaintArgs) -> anyhow::Result<()> {
    let mut cfg = load_config(&args.common)?;
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }
    let mut pipeline = build_pipeline(cfg)?;
    let summary = pipeline.run(&request(&args.common, args.prompt), &args.common.out)?;
    eprintln!("wrote {}", summary.final_svg.display());
    Ok(())
}

fn cmd_batch(args: BatchArgs) -> anyhow::Result<()> {
    let mut cfg = load_config(&args.common)?;
    if let Some(range) = args.seeds {
        cfg.batch.multirun = true;
        cfg.batch.seed_range = Some(range);
    }
    let prompts = match (&args.prompt, &args.prompts_file) {
        (Some(p), _) => vec![p.clone()],
        (None, Some(path)) => read_prompts_file(path)?,
        (None, None) => anyhow::bail!("either --prompt or --prompts-file is required"),
    };
    let seeds = cfg.batch.seeds(cfg.seed);
    let mut pipeline = build_pipeline(cfg)?;
    let template = request(&args.common, String::new());
    let report = run_batch(&mut pipeline, &template, &prompts, &seeds, &args.common.out);

    for failure in &report.failed {
        eprintln!(
            "failed: prompt '{}' seed {}: {}",
            failure.prompt, failure.seed, failure.error
        );
    }
    eprintln!(
        "{} of {} runs completed under {}",
        report.completed.len(),
        report.total(),
        args.common.out.display()
    );
    if !report.is_success() {
        anyhow::bail!("{} run(s) failed", report.failed.len());
    }
    Ok(())
}
