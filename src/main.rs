//! Command-line interface for the keyframe selector
//!
//! Decodes a video, keeps the frames that start a new shot and are sharp
//! enough, and writes them as JPEG files together with a JSON manifest.

use std::env;
use std::process;
use std::time::{Duration, Instant};
use anyhow::{bail, Context};
use tracing::{info, warn, debug};
use keyframe_select::{
    extract_keyframes, get_video_info, init_tracing, params_json,
    ExtractionReport, FingerprintStrategy, Preset, Sampling, SelectionParameters,
};

/// Command-line arguments structure
#[derive(Debug)]
struct Args {
    video_path: String,
    output_dir: String,
    preset: Preset,
    strategy: Option<FingerprintStrategy>,
    threshold: Option<f64>,
    blur_threshold: Option<Option<f64>>,
    sampling: Option<Sampling>,
    force_first_frame: bool,
    clean: bool,
    verbose: bool,
    show_video_info: bool,
    output_format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OutputFormat {
    Simple,   // Just frame numbers
    Detailed, // Frame numbers, timestamps and files
    Json,     // JSON format for integration
}

impl Default for Args {
    fn default() -> Self {
        Self {
            video_path: String::new(),
            output_dir: "frames".to_string(),
            preset: Preset::PerSecond,
            strategy: None,
            threshold: None,
            blur_threshold: None,
            sampling: None,
            force_first_frame: false,
            clean: false,
            verbose: false,
            show_video_info: false,
            output_format: OutputFormat::Simple,
        }
    }
}

impl Args {
    /// Preset parameters with command-line overrides applied
    fn selection_parameters(&self) -> anyhow::Result<SelectionParameters> {
        let mut params = SelectionParameters::from_preset(self.preset)
            .with_force_first_frame(self.force_first_frame);

        if let Some(strategy) = self.strategy {
            params = params.with_strategy(strategy);
            if self.threshold.is_none() {
                // Keep the threshold meaningful when only the strategy changes
                params = params.with_similarity_threshold(match strategy {
                    FingerprintStrategy::Histogram => 0.95,
                    FingerprintStrategy::BlurDiff { .. } => 0.3,
                });
            }
        }
        if let Some(threshold) = self.threshold {
            params = params.with_similarity_threshold(threshold);
        }
        if let Some(blur) = self.blur_threshold {
            params = params.with_blur_threshold(blur);
        }
        if let Some(sampling) = self.sampling {
            params = params.with_sampling(sampling);
        }

        params.validate().context("Invalid selection parameters")?;
        Ok(params)
    }
}

const USAGE: &str = "\
Options:
  --output <dir>             Directory for keyframe images (default: frames)
  --preset <name>            frame-diff|interval|per-second|every-third (default: per-second)
  --strategy <name>          Change detection: histogram|blur-diff
  --threshold <value>        Similarity threshold (correlation floor or difference ceiling)
  --blur-threshold <value>   Minimum Laplacian variance, or 'none' to disable
  --every <n>                Evaluate every nth frame
  --interval <seconds>       Evaluate one frame per interval
  --force-first-frame        Keep the first sampled frame even if blurry
  --clean                    Remove keyframes from a previous run first
  --verbose                  Enable debug logging
  --info                     Show video information only
  --format <fmt>             Output format: simple|detailed|json (default: simple)
  --help                     Show this help message";

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let argv: Vec<String> = env::args().collect();
    let args = parse_args(&argv)?;

    let log_level = if args.verbose { "debug" } else { "info" };
    init_tracing(log_level);

    info!("Keyframe selector CLI v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if args.show_video_info {
        return show_video_info(&args.video_path);
    }

    let params = args.selection_parameters()?;

    let start_time = Instant::now();
    let report = extract_keyframes(&args.video_path, &args.output_dir, params.clone(), args.clean)
        .with_context(|| format!("Keyframe extraction failed for {}", args.video_path))?;
    let elapsed = start_time.elapsed();

    output_results(&report, &args, &params, elapsed)
}

fn parse_args(argv: &[String]) -> anyhow::Result<Args> {
    let program = argv.first().map(String::as_str).unwrap_or("keyframe-select");

    if argv.len() < 2 {
        bail!("Usage: {} <video_path> [OPTIONS]\n\n{}", program, USAGE);
    }
    if argv[1] == "--help" {
        bail!(
            "Keyframe Selector\n\n\
             Usage: {} <video_path> [OPTIONS]\n\n\
             Keeps the frames of a video that start a new shot and are sharp enough.\n\n{}",
            program, USAGE
        );
    }

    let mut parsed_args = Args {
        video_path: argv[1].clone(),
        ..Args::default()
    };

    let mut i = 2;
    while i < argv.len() {
        let flag = argv[i].as_str();
        let next = argv.get(i + 1).map(String::as_str);
        let value = || next.with_context(|| format!("{} requires a value", flag));

        match flag {
            "--output" => {
                parsed_args.output_dir = value()?.to_string();
                i += 2;
            }
            "--preset" => {
                parsed_args.preset = value()?.parse()?;
                i += 2;
            }
            "--strategy" => {
                parsed_args.strategy = Some(value()?.parse()?);
                i += 2;
            }
            "--threshold" => {
                parsed_args.threshold = Some(value()?.parse().context("Invalid threshold value")?);
                i += 2;
            }
            "--blur-threshold" => {
                parsed_args.blur_threshold = Some(match value()? {
                    "none" | "off" => None,
                    v => Some(v.parse().context("Invalid blur threshold value")?),
                });
                i += 2;
            }
            "--every" => {
                parsed_args.sampling = Some(Sampling::EveryNth(
                    value()?.parse().context("Invalid frame stride")?,
                ));
                i += 2;
            }
            "--interval" => {
                parsed_args.sampling = Some(Sampling::Interval(
                    value()?.parse().context("Invalid interval value")?,
                ));
                i += 2;
            }
            "--format" => {
                parsed_args.output_format = match value()? {
                    "simple" => OutputFormat::Simple,
                    "detailed" => OutputFormat::Detailed,
                    "json" => OutputFormat::Json,
                    _ => bail!("Invalid format. Use 'simple', 'detailed', or 'json'"),
                };
                i += 2;
            }
            "--force-first-frame" => {
                parsed_args.force_first_frame = true;
                i += 1;
            }
            "--clean" => {
                parsed_args.clean = true;
                i += 1;
            }
            "--verbose" => {
                parsed_args.verbose = true;
                i += 1;
            }
            "--info" => {
                parsed_args.show_video_info = true;
                i += 1;
            }
            _ => bail!("Unknown option: {}", flag),
        }
    }

    Ok(parsed_args)
}

fn show_video_info(video_path: &str) -> anyhow::Result<()> {
    info!("Analyzing video: {}", video_path);

    let video_info = get_video_info(video_path).context("Failed to get video info")?;

    println!("Video Information:");
    println!("  Path: {}", video_info.path);
    println!("  Dimensions: {}x{}", video_info.width, video_info.height);
    println!("  Frame Rate: {:.2} fps", video_info.fps);
    match (video_info.frame_count, video_info.duration_seconds) {
        (Some(count), Some(seconds)) => {
            println!("  Frame Count: {}", count);
            println!("  Duration: {:.2} seconds", seconds);
        }
        _ => println!("  Frame Count: unknown (container does not report a length)"),
    }

    if !video_info.is_valid() {
        warn!("Video properties appear invalid - selection may fail");
    }

    Ok(())
}

fn output_results(
    report: &ExtractionReport,
    args: &Args,
    params: &SelectionParameters,
    elapsed: Duration,
) -> anyhow::Result<()> {
    let frame_numbers: Vec<u64> = report.keyframes.iter().map(|k| k.frame_number).collect();

    match args.output_format {
        OutputFormat::Simple => {
            println!("Keyframes saved at frames: {:?}", frame_numbers);
        }
        OutputFormat::Detailed => {
            println!("Keyframe Selection Results:");
            println!("  Video: {}", report.video.description());
            println!("  Selection time: {}ms", elapsed.as_millis());
            println!("  Frames decoded: {}", report.stats.frames_seen);
            println!("  Candidates evaluated: {}", report.stats.sampled);
            println!("  Rejected as too similar: {}", report.stats.too_similar);
            println!("  Rejected as too blurry: {}", report.stats.too_blurry);
            println!("  Keyframes kept: {}", report.keyframes.len());

            for keyframe in &report.keyframes {
                println!(
                    "    Frame {} at {:.2}s ({}) -> {}",
                    keyframe.frame_number,
                    keyframe.seconds,
                    keyframe.reason,
                    keyframe.path.display()
                );
            }
            println!("  Manifest: {}", report.manifest.display());
        }
        OutputFormat::Json => {
            let json_output = serde_json::json!({
                "video_path": args.video_path,
                "output_dir": args.output_dir,
                "selection_time_ms": elapsed.as_millis() as u64,
                "keyframe_count": frame_numbers.len(),
                "frame_numbers": frame_numbers,
                "manifest": report.manifest.display().to_string(),
                "config": params_json(params),
            });

            println!("{}", serde_json::to_string_pretty(&json_output)
                .context("JSON serialization failed")?);
        }
    }

    info!("Selection completed in {}ms, kept {} keyframes",
          elapsed.as_millis(), frame_numbers.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("keyframe-select")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_args_parsing_basic() {
        let args = parse_args(&argv(&["clip.mp4", "--preset", "every-third", "--format", "json"])).unwrap();

        assert_eq!(args.video_path, "clip.mp4");
        assert_eq!(args.preset, Preset::EveryThird);
        assert_eq!(args.output_format, OutputFormat::Json);
        assert_eq!(args.output_dir, "frames");
    }

    #[test]
    fn test_args_overrides() {
        let args = parse_args(&argv(&[
            "clip.mp4", "--threshold", "0.9", "--blur-threshold", "none",
            "--interval", "0.5", "--force-first-frame", "--clean", "--output", "out",
        ]))
        .unwrap();

        let params = args.selection_parameters().unwrap();
        assert_eq!(params.similarity_threshold, 0.9);
        assert_eq!(params.blur_threshold, None);
        assert_eq!(params.sampling, Sampling::Interval(0.5));
        assert!(params.force_first_frame);
        assert!(args.clean);
        assert_eq!(args.output_dir, "out");
    }

    #[test]
    fn test_strategy_switch_resets_threshold() {
        let args = parse_args(&argv(&["clip.mp4", "--strategy", "blur-diff"])).unwrap();
        let params = args.selection_parameters().unwrap();

        assert_eq!(params.strategy, FingerprintStrategy::BlurDiff { kernel_size: 21 });
        assert_eq!(params.similarity_threshold, 0.3);
        assert_eq!(params.blur_threshold, Some(80.0));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(parse_args(&argv(&[])).is_err());
        assert!(parse_args(&argv(&["clip.mp4", "--threshold"])).is_err());
        assert!(parse_args(&argv(&["clip.mp4", "--threshold", "abc"])).is_err());
        assert!(parse_args(&argv(&["clip.mp4", "--preset", "fastest"])).is_err());
        assert!(parse_args(&argv(&["clip.mp4", "--bogus"])).is_err());

        let args = parse_args(&argv(&["clip.mp4", "--every", "0"])).unwrap();
        assert!(args.selection_parameters().is_err());
    }

    #[test]
    fn test_default_args() {
        let args = Args::default();
        assert!(args.video_path.is_empty());
        assert_eq!(args.preset, Preset::PerSecond);
        assert_eq!(args.threshold, None);
        assert!(!args.force_first_frame);
        assert!(!args.verbose);
        assert!(!args.show_video_info);
    }
}
