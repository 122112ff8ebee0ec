use anyhow::Context;
use clap::Parser;
use shared_utils::logging::{init_logging, LogConfig};
use shared_utils::thread_manager::resolve_concurrency;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, Level};

use vid_compress::{compress_directory, preflight, CompressConfig, FfmpegToolchain};

#[derive(Parser)]
#[command(name = "vid-compress")]
#[command(version, about = "Batch HEVC/H.265 video compressor", long_about = None)]
struct Cli {
    /// Directory tree to compress
    #[arg(value_name = "INPUT_DIR")]
    input: PathBuf,
    /// Output root (default: <INPUT_DIR>_compressed)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Number of concurrent encodes (default: 1)
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    jobs: Option<usize>,
    /// One encode per logical CPU
    #[arg(long, conflicts_with = "jobs")]
    all_cores: bool,
    /// Skip resolution probing and never scale
    #[arg(long)]
    no_probe: bool,
    /// Kill any ffmpeg/ffprobe call that runs longer than this
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,
    #[arg(long, default_value = "ffprobe")]
    ffprobe: PathBuf,
    #[arg(long, default_value = "video_processing.log")]
    log_file: PathBuf,
    #[arg(short, long, alias = "debug")]
    verbose: bool,
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let concurrency = resolve_concurrency(cli.jobs, cli.all_cores)?;

    let mut config = CompressConfig::new(&cli.input)
        .with_concurrency(concurrency)
        .with_tool_timeout(cli.timeout.map(Duration::from_secs));
    if let Some(output) = cli.output {
        config = config.with_output_dir(output);
    }
    config.probe_resolution = !cli.no_probe;
    config.ffmpeg = cli.ffmpeg;
    config.ffprobe = cli.ffprobe;
    config.validate()?;

    preflight(&mut config)?;

    info!("🎬 Batch Compression (HEVC/H.265)");
    info!("   Input:   {}", config.input_dir.display());
    info!("   Output:  {}", config.output_dir.display());
    info!("   Workers: {}", config.concurrency);
    if let Some(timeout) = config.tool_timeout {
        info!("   Timeout: {}s per tool call", timeout.as_secs());
    }

    let toolchain = FfmpegToolchain::from_config(&config);
    let result = compress_directory(&config, &toolchain)
        .with_context(|| format!("Failed to compress {}", config.input_dir.display()))?;

    if result.failed > 0 {
        info!(
            "{} of {} files failed, see log for details",
            result.failed, result.total
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_file = cli.log_file.clone();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let guard = init_logging(
        LogConfig::new()
            .with_log_file(&log_file)
            .with_level(level),
    )?;

    let outcome = run(cli);
    if let Err(e) = &outcome {
        error!("{:#}", e);
    }

    guard.close()?;
    if outcome.is_ok() {
        println!("Processing complete. Check {} for details.", log_file.display());
    }
    outcome
}
