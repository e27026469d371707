use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use scenecard::{
    CardOptions, CardOutcome, FfmpegLogLevel, OperationType, Pipeline, PipelineOptions,
    PipelineReport, ProgressCallback, ProgressInfo,
};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  scenecard frames reel.mp4 --out frames --scene-threshold 0.3\n  scenecard card frames/frame_0003.jpg --out card.jpg --debug\n  scenecard run reel.mp4 --out frames --cards --progress --json\n  scenecard completions zsh > _scenecard";

#[derive(Debug, Parser)]
#[command(
    name = "scenecard",
    version,
    about = "Extract distinct scene frames from a video and locate embedded cards",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Worker thread count for parallel card detection.
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Card geometry thresholds shared by `card` and `run`.
#[derive(Debug, Parser, Clone)]
struct CardArgs {
    /// Smallest accepted card area as a fraction of the frame.
    #[arg(long, default_value_t = 0.03)]
    min_area_ratio: f64,
    /// Smallest accepted width / height.
    #[arg(long, default_value_t = 0.6)]
    aspect_min: f64,
    /// Largest accepted width / height.
    #[arg(long, default_value_t = 1.6)]
    aspect_max: f64,
    /// Write an annotated copy of each frame with the candidate box.
    #[arg(long)]
    debug: bool,
}

impl CardArgs {
    fn to_options(&self) -> CardOptions {
        CardOptions::default()
            .with_min_area_ratio(self.min_area_ratio)
            .with_aspect_range(self.aspect_min, self.aspect_max)
            .with_debug(self.debug)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract deduplicated scene frames.
    #[command(
        about = "Extract distinct scene frames",
        after_help = "Examples:\n  scenecard frames reel.mp4 --out frames\n  scenecard frames reel.mp4 --out frames --scene-threshold 0.1 --hash-threshold 6 --json"
    )]
    Frames {
        /// Input video path.
        video: PathBuf,
        /// Output directory for kept frames.
        #[arg(long, default_value = "frames")]
        out: PathBuf,
        /// Scene-change sensitivity in [0, 1]; lower emits more frames.
        #[arg(long, default_value_t = 0.3)]
        scene_threshold: f64,
        /// Hamming distance at or below which frames are duplicates.
        #[arg(long, default_value_t = 10)]
        hash_threshold: u32,
        /// Output the result as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Look for a card in a single frame image.
    #[command(
        about = "Detect a card in one frame",
        after_help = "Exits with status 1 when no card is found.\n\nExamples:\n  scenecard card frame_0001.jpg\n  scenecard card frame_0001.jpg --out card.jpg --debug"
    )]
    Card {
        /// Input frame image.
        image: PathBuf,
        /// Where to write the cropped card.
        #[arg(long, default_value = "card.jpg")]
        out: PathBuf,
        #[command(flatten)]
        card: CardArgs,
        /// Output the result as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run segmentation, deduplication and optionally card detection.
    #[command(
        about = "Run the full pipeline",
        after_help = "Examples:\n  scenecard run reel.mp4 --out frames --cards\n  scenecard run reel.mp4 --out frames --cards --debug --json"
    )]
    Run {
        /// Input video path.
        video: PathBuf,
        /// Output directory for kept frames and cards.
        #[arg(long, default_value = "frames")]
        out: PathBuf,
        /// Scene-change sensitivity in [0, 1]; lower emits more frames.
        #[arg(long, default_value_t = 0.05)]
        scene_threshold: f64,
        /// Hamming distance at or below which frames are duplicates.
        #[arg(long, default_value_t = 10)]
        hash_threshold: u32,
        /// Look for a card in every kept frame.
        #[arg(long)]
        cards: bool,
        #[command(flatten)]
        card: CardArgs,
        /// Output the result as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_log_level(value: &str) -> Option<FfmpegLogLevel> {
    value.parse().ok()
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

/// Refuse to write into a directory that already holds frames.
fn ensure_empty_output(dir: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    let existing = dir
        .read_dir()
        .map(|entries| {
            entries
                .flatten()
                .any(|entry| scenecard::sequence_index(&entry.path()).is_some())
        })
        .unwrap_or(false);
    if existing {
        ensure_writable_path(dir, overwrite)?;
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            let level = match record.level() {
                log::Level::Error => "ERROR".bright_red(),
                log::Level::Warn => "WARN ".yellow(),
                log::Level::Info => "INFO ".green(),
                log::Level::Debug => "DEBUG".blue(),
                log::Level::Trace => "TRACE".magenta(),
            };
            writeln!(buf, "{level} {}", record.args())
        })
        .parse_default_env()
        .init();
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(global.verbose);

    if let Some(level) = &global.log_level {
        let parsed = parse_log_level(level).ok_or(format!("unsupported --log-level: {level}"))?;
        scenecard::set_ffmpeg_log_level(parsed);
    }

    if let Some(threads) = global.threads
        && threads > 0
    {
        unsafe {
            std::env::set_var("RAYON_NUM_THREADS", threads.to_string());
        }
    }

    Ok(())
}

fn base_pipeline_options(global: &GlobalOptions) -> PipelineOptions {
    let mut options = PipelineOptions::new().with_parallel(global.threads != Some(1));
    if global.progress {
        options = options.with_progress(Arc::new(TerminalProgress::new()));
    }
    options
}

/// Renders pipeline progress as one indicatif bar per stage.
struct TerminalProgress {
    bar: Mutex<Option<(OperationType, ProgressBar)>>,
}

impl TerminalProgress {
    fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn stage_bar(operation: OperationType, total: Option<u64>) -> ProgressBar {
        let label = match operation {
            OperationType::SceneSegmentation => "segmenting",
            OperationType::Deduplication => "deduplicating",
            OperationType::CardDetection => "detecting cards",
            _ => "working",
        };
        let bar = match total {
            Some(total) => {
                let bar = ProgressBar::new(total);
                if let Ok(style) =
                    ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")
                {
                    bar.set_style(style.progress_chars("##-"));
                }
                bar
            }
            None => ProgressBar::new_spinner(),
        };
        bar.set_message(label);
        bar
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        let Ok(mut slot) = self.bar.lock() else {
            return;
        };
        let stale = slot
            .as_ref()
            .is_none_or(|(operation, _)| *operation != info.operation);
        if stale {
            if let Some((_, previous)) = slot.take() {
                previous.finish_and_clear();
            }
            *slot = Some((info.operation, Self::stage_bar(info.operation, info.total)));
        }
        if let Some((_, bar)) = slot.as_ref() {
            bar.set_position(info.current);
            if info.total == Some(info.current) {
                bar.finish_with_message("done");
            }
        }
    }
}

impl Drop for TerminalProgress {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.bar.lock()
            && let Some((_, bar)) = slot.take()
        {
            bar.finish_and_clear();
        }
    }
}

fn report_json(report: &PipelineReport) -> serde_json::Value {
    json!({
        "scene_frames": report.scene_frame_count,
        "kept": report.frames.iter().map(|frame| json!({
            "index": frame.index,
            "path": frame.path.display().to_string(),
            "card": frame.card.as_ref().map(|card| json!({
                "found": card.is_found(),
                "area_ratio": card.score,
                "bounds": card.bounds.map(|bounds| [bounds.x1, bounds.y1, bounds.x2, bounds.y2]),
                "rejection": card.rejection.map(|reason| reason.to_string()),
                "crop": card.crop_path.as_ref().map(|path| path.display().to_string()),
                "debug": card.debug_path.as_ref().map(|path| path.display().to_string()),
            })),
        })).collect::<Vec<_>>(),
        "skipped": report.skipped.iter().map(|skipped| json!({
            "path": skipped.path.display().to_string(),
            "reason": skipped.reason,
        })).collect::<Vec<_>>(),
    })
}

fn print_report(report: &PipelineReport, out: &Path) {
    if report.is_empty() {
        println!(
            "{} {}",
            "warning:".yellow().bold(),
            "no scene changes detected".yellow()
        );
        return;
    }

    for frame in &report.frames {
        match &frame.card {
            Some(card) if card.is_found() => println!(
                "  {} {} (area_ratio={:.3})",
                frame.path.display(),
                "card".green(),
                card.score
            ),
            Some(card) => println!(
                "  {} {} ({}, area_ratio={:.3})",
                frame.path.display(),
                "no card".dimmed(),
                card.rejection.map(|reason| reason.to_string()).unwrap_or_default(),
                card.score
            ),
            None => println!("  {}", frame.path.display()),
        }
    }
    for skipped in &report.skipped {
        eprintln!(
            "{} skipped {}: {}",
            "warning:".yellow().bold(),
            skipped.path.display(),
            skipped.reason
        );
    }

    println!(
        "{} {}",
        "success:".green().bold(),
        format!(
            "Kept {} of {} scene frame(s) in {}",
            report.frames.len(),
            report.scene_frame_count,
            out.display()
        )
        .green()
    );
}

fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Frames {
            video,
            out,
            scene_threshold,
            hash_threshold,
            json,
        } => {
            ensure_empty_output(&out, cli.global.overwrite)?;
            let options = base_pipeline_options(&cli.global)
                .with_scene_threshold(scene_threshold)
                .with_hash_threshold(hash_threshold);
            let report = Pipeline::new(options).run(&video, &out)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
            } else {
                print_report(&report, &out);
            }
        }
        Commands::Card {
            image,
            out,
            card,
            json,
        } => {
            let options = card.to_options();
            options.validate()?;
            let detection = scenecard::detect_card_at(&image, &options)?;

            let debug_path = out.with_file_name("debug.jpg");
            if let Some(annotated) = &detection.debug_image {
                ensure_writable_path(&debug_path, cli.global.overwrite)?;
                annotated.save(&debug_path)?;
            }

            let found = match &detection.outcome {
                CardOutcome::Found(crop) => {
                    ensure_writable_path(&out, cli.global.overwrite)?;
                    crop.image.save(&out)?;
                    true
                }
                CardOutcome::NotFound { .. } => false,
            };

            if json {
                let payload = json!({
                    "found": found,
                    "area_ratio": detection.score(),
                    "bounds": detection.candidate.map(|candidate| {
                        let bounds = candidate.bounds;
                        [bounds.x1, bounds.y1, bounds.x2, bounds.y2]
                    }),
                    "rejection": detection.rejection().map(|reason| reason.to_string()),
                    "crop": found.then(|| out.display().to_string()),
                    "debug": detection.debug_image.as_ref().map(|_| debug_path.display().to_string()),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else if found {
                println!(
                    "{} {}",
                    "success:".green().bold(),
                    format!(
                        "Card extracted to {} (area_ratio={:.3})",
                        out.display(),
                        detection.score()
                    )
                    .green()
                );
            } else {
                println!(
                    "{} {}",
                    "not found:".red().bold(),
                    format!(
                        "No embedded card detected (area_ratio={:.3})",
                        detection.score()
                    )
                    .red()
                );
            }

            return Ok(found);
        }
        Commands::Run {
            video,
            out,
            scene_threshold,
            hash_threshold,
            cards,
            card,
            json,
        } => {
            ensure_empty_output(&out, cli.global.overwrite)?;
            let options = base_pipeline_options(&cli.global)
                .with_scene_threshold(scene_threshold)
                .with_hash_threshold(hash_threshold)
                .with_card_detection(cards)
                .with_card_options(card.to_options());
            let report = Pipeline::new(options).run(&video, &out)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
            } else {
                print_report(&report, &out);
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "scenecard", &mut std::io::stdout());
        }
    }

    Ok(true)
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(error) => {
            eprintln!("{} {error}", "error:".red().bold());
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Commands, parse_log_level};
    use scenecard::FfmpegLogLevel;

    #[test]
    fn parse_log_level_aliases() {
        assert_eq!(parse_log_level("quiet"), Some(FfmpegLogLevel::Quiet));
        assert_eq!(parse_log_level("WARN"), Some(FfmpegLogLevel::Warning));
        assert_eq!(parse_log_level("panic"), Some(FfmpegLogLevel::Fatal));
        assert_eq!(parse_log_level("loud"), None);
    }

    #[test]
    fn frames_defaults_follow_the_frame_script() {
        let cli = Cli::try_parse_from(["scenecard", "frames", "reel.mp4"]).unwrap();
        match cli.command {
            Commands::Frames {
                out,
                scene_threshold,
                hash_threshold,
                json,
                ..
            } => {
                assert_eq!(out.to_str(), Some("frames"));
                assert_eq!(scene_threshold, 0.3);
                assert_eq!(hash_threshold, 10);
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn run_accepts_card_thresholds_and_global_flags() {
        let cli = Cli::try_parse_from([
            "scenecard",
            "run",
            "reel.mp4",
            "--cards",
            "--min-area-ratio",
            "0.05",
            "--debug",
            "--progress",
        ])
        .unwrap();
        assert!(cli.global.progress);
        match cli.command {
            Commands::Run { cards, card, .. } => {
                assert!(cards);
                assert!(card.debug);
                assert_eq!(card.to_options().min_area_ratio, 0.05);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
