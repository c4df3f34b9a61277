mod adb;
mod ocr;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hinge_contracts::config::{CompareStrategy, HingeConfig, OllamaConfig};
use hinge_contracts::events::EventWriter;
use hinge_engine::{
    Device, ImageComparator, ModelGateway, OllamaProvider, PipelineOrchestrator, ProfileAnalyzer,
    ProfileOutcome, ScreenshotRef, ThreadPause,
};
use serde_json::json;

use crate::adb::AdbDevice;
use crate::ocr::TesseractRecognizer;

#[derive(Debug, Parser)]
#[command(name = "hinge-rs", version, about = "Hinge profile engagement pipeline")]
struct Cli {
    /// JSON config merged over the defaults (falls back to $HINGE_CONFIG).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log filter such as `info` or `hinge_engine=debug`; RUST_LOG applies otherwise.
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Run(RunArgs),
    Analyze(AnalyzeArgs),
    Compare(CompareArgs),
    Flags(FlagsArgs),
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long, default_value = "adb")]
    adb: String,
    #[arg(long)]
    serial: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    ocr: bool,
    #[arg(long, default_value = "tesseract")]
    tesseract: String,
    #[arg(long, default_value = "eng")]
    ocr_lang: String,
    #[arg(long)]
    save_screenshots: Option<PathBuf>,
    #[arg(long)]
    ollama_host: Option<String>,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(long = "image", required = true)]
    images: Vec<PathBuf>,
    #[arg(long)]
    ollama_host: Option<String>,
}

#[derive(Debug, Parser)]
struct CompareArgs {
    first: PathBuf,
    second: PathBuf,
    #[arg(long, default_value = "hash")]
    strategy: String,
}

#[derive(Debug, Parser)]
struct FlagsArgs {
    #[arg(long)]
    text: String,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("hinge-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());
    let config = HingeConfig::load(cli.config.as_deref())?;
    match cli.command {
        Command::Run(args) => run_profile(args, &config),
        Command::Analyze(args) => run_analyze(args, &config),
        Command::Compare(args) => run_compare(args, &config),
        Command::Flags(args) => run_flags(args, &config),
    }
}

fn init_logging(level: Option<&str>) {
    let env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(level) = level.map(str::trim).filter(|value| !value.is_empty()) {
        builder.parse_filters(level);
    }
    builder.init();
}

fn build_analyzer(config: &HingeConfig, ollama_host: Option<&str>) -> ProfileAnalyzer {
    let ollama: OllamaConfig = match ollama_host {
        Some(host) => config.ollama.with_host(host),
        None => config.ollama.clone(),
    };
    log::info!("using {} at {}", ollama.model, ollama.host);
    let gateway = ModelGateway::from_config(
        Box::new(OllamaProvider::new(&ollama)),
        &ollama,
        Arc::new(ThreadPause),
    );
    ProfileAnalyzer::from_config(gateway, config)
}

fn run_profile(args: RunArgs, config: &HingeConfig) -> Result<i32> {
    let adb = AdbDevice::new(&args.adb, args.serial.as_deref())?;
    let bounds = adb.window_bounds().context("could not read device screen size")?;
    log::info!("device screen {}x{}", bounds.width, bounds.height);

    let mut device = Device::new(
        Box::new(adb.clone()),
        Box::new(adb),
        Arc::new(ThreadPause),
    );
    if args.ocr {
        device = device.with_recognizer(Box::new(TesseractRecognizer::new(
            args.tesseract.clone(),
            args.ocr_lang.clone(),
        )));
    }

    let analyzer = build_analyzer(config, args.ollama_host.as_deref());
    let mut orchestrator = PipelineOrchestrator::new(config, bounds, device, analyzer);
    if let Some(path) = &args.events {
        let writer = EventWriter::for_new_run(path);
        log::info!("writing events for {} to {}", writer.run_id(), path.display());
        orchestrator = orchestrator.with_events(writer);
    }
    if let Some(dir) = &args.save_screenshots {
        rotate_screenshot_dir(dir)?;
        orchestrator = orchestrator.with_screenshot_dir(dir);
    }

    let outcome = orchestrator.process_profile();
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(match outcome {
        ProfileOutcome::CaptureFailed => 2,
        _ => 0,
    })
}

fn run_analyze(args: AnalyzeArgs, config: &HingeConfig) -> Result<i32> {
    let screenshots = args
        .images
        .iter()
        .map(|path| ScreenshotRef::load(path))
        .collect::<Result<Vec<_>>>()?;
    let Some(first) = screenshots.first() else {
        bail!("at least one --image is required");
    };

    let analyzer = build_analyzer(config, args.ollama_host.as_deref());
    let quick = analyzer.quick_analyze(first);
    let analysis = analyzer.analyze(&screenshots);
    let report = json!({
        "quick": quick,
        "continue_full_analysis": analyzer.should_continue_full_analysis(&quick),
        "analysis": analysis,
        "should_engage": analyzer.should_engage(&analysis),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(0)
}

fn run_compare(args: CompareArgs, config: &HingeConfig) -> Result<i32> {
    let strategy = parse_strategy(&args.strategy)?;
    let mut comparison = config.comparison.clone();
    comparison.strategy = strategy;
    let comparator = ImageComparator::new(comparison);
    let first = ScreenshotRef::load(&args.first)?;
    let second = ScreenshotRef::load(&args.second)?;
    if comparator.are_similar(&first, &second) {
        println!("similar");
    } else {
        println!("different");
    }
    Ok(0)
}

fn run_flags(args: FlagsArgs, config: &HingeConfig) -> Result<i32> {
    let rules = config.preference_rules();
    let (has_red_flags, details) = rules.has_red_flag(&args.text);
    let report = json!({
        "has_red_flags": has_red_flags,
        "red_flag_details": details,
        "checked_flags": rules.red_flags().names().collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(0)
}

fn parse_strategy(raw: &str) -> Result<CompareStrategy> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "hash" | "phash" | "perceptual_hash" => Ok(CompareStrategy::PerceptualHash),
        "sample" | "sampled" | "sampled_pixels" => Ok(CompareStrategy::SampledPixels),
        other => bail!("unknown comparison strategy: {other} (expected hash or sample)"),
    }
}

fn last_run_dir(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|value| value.to_string_lossy().into_owned())
        .unwrap_or_else(|| "screenshots".to_string());
    dir.with_file_name(format!("{name}_from_last_run"))
}

/// Moves the previous run's screenshots into `<dir>_from_last_run`,
/// replacing whatever was kept there before, and leaves `dir` empty.
fn rotate_screenshot_dir(dir: &Path) -> Result<()> {
    let previous = last_run_dir(dir);
    fs::create_dir_all(dir).with_context(|| format!("failed creating {}", dir.display()))?;
    fs::create_dir_all(&previous)
        .with_context(|| format!("failed creating {}", previous.display()))?;

    for entry in fs::read_dir(&previous)? {
        let path = entry?.path();
        if path.is_file() {
            fs::remove_file(&path)
                .with_context(|| format!("failed removing {}", path.display()))?;
        }
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() {
            let target = previous.join(entry.file_name());
            fs::rename(&path, &target).with_context(|| {
                format!("failed moving {} to {}", path.display(), target.display())
            })?;
        }
    }
    log::info!(
        "previous screenshots moved to {}",
        previous.display()
    );
    Ok(())
}
