//! Video Conversion API Module - batch HEVC/H.265 compression
//!
//! Per-item pipeline: probe → pick scale → encode → restore original name.
//! Everything that goes wrong for one file is logged and folded into that
//! file's `TaskResult`; only discovery/setup errors abort the run.

use shared_utils::batch::{create_directory_structure, discover, BatchResult, WorkItem, VIDEO_EXTENSIONS};
use shared_utils::conversion_types::{CompressConfig, EncodeSettings, Resolution, ScaleFilter, TaskResult};
use shared_utils::errors::{CompressError, EncodeError};
use shared_utils::ffmpeg_process::{find_tool, format_ffmpeg_error, FfmpegProcess};
use shared_utils::ffprobe::{probe_resolution, FFprobeError};
use shared_utils::naming::{restored_path, safe_path_arg, FilenameMapping};
use shared_utils::report::log_summary_report;
use shared_utils::thread_manager::run_batch;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// One encoder invocation.
#[derive(Debug, Clone)]
pub struct EncodeRequest<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub scale: ScaleFilter,
    pub settings: &'a EncodeSettings,
}

impl EncodeRequest<'_> {
    /// `-i <input> -vcodec <codec> -vf scale=... -r <fps> -y <output>`
    pub fn ffmpeg_args(&self) -> Vec<OsString> {
        vec![
            "-i".into(),
            safe_path_arg(self.input).into_owned(),
            "-vcodec".into(),
            self.settings.video_codec.clone().into(),
            "-vf".into(),
            self.scale.to_filter_arg().into(),
            "-r".into(),
            self.settings.frame_rate.to_string().into(),
            "-y".into(),
            safe_path_arg(self.output).into_owned(),
        ]
    }
}

/// The external prober/encoder pair.
pub trait MediaToolchain: Sync {
    fn probe(&self, input: &Path) -> Result<Resolution, FFprobeError>;
    fn encode(&self, request: &EncodeRequest<'_>) -> Result<(), EncodeError>;
}

/// ffprobe + ffmpeg as subprocesses.
#[derive(Debug, Clone)]
pub struct FfmpegToolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub timeout: Option<Duration>,
}

impl FfmpegToolchain {
    pub fn from_config(config: &CompressConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg.clone(),
            ffprobe: config.ffprobe.clone(),
            timeout: config.tool_timeout,
        }
    }
}

impl MediaToolchain for FfmpegToolchain {
    fn probe(&self, input: &Path) -> Result<Resolution, FFprobeError> {
        probe_resolution(&self.ffprobe, input, self.timeout)
    }

    fn encode(&self, request: &EncodeRequest<'_>) -> Result<(), EncodeError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(request.ffmpeg_args());

        let output = FfmpegProcess::spawn(&mut cmd)?.wait_with_timeout(self.timeout)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(EncodeError::Failed {
                exit_code: output.status.code(),
                summary: format_ffmpeg_error(&output.stderr),
                stderr: output.stderr,
            })
        }
    }
}

/// Checks the external tools before anything is dispatched.
///
/// A missing encoder is fatal. A missing prober only turns probing off.
pub fn preflight(config: &mut CompressConfig) -> Result<(), CompressError> {
    let ffmpeg = find_tool(&config.ffmpeg).ok_or_else(|| {
        CompressError::ToolNotFound(format!(
            "{} (install ffmpeg or pass --ffmpeg)",
            config.ffmpeg.display()
        ))
    })?;
    debug!(ffmpeg = %ffmpeg.display(), "Encoder found");

    if config.probe_resolution && find_tool(&config.ffprobe).is_none() {
        warn!(
            "{} not found, resolution probing disabled (all files encoded unscaled)",
            config.ffprobe.display()
        );
        config.probe_resolution = false;
    }
    Ok(())
}

/// Runs the per-item pipeline against a read-only filename mapping.
pub struct Transcoder<'a, T: MediaToolchain> {
    toolchain: &'a T,
    mapping: &'a FilenameMapping,
    settings: &'a EncodeSettings,
    probe_resolution: bool,
}

impl<'a, T: MediaToolchain> Transcoder<'a, T> {
    pub fn new(
        toolchain: &'a T,
        mapping: &'a FilenameMapping,
        settings: &'a EncodeSettings,
        probe_resolution: bool,
    ) -> Self {
        Self {
            toolchain,
            mapping,
            settings,
            probe_resolution,
        }
    }

    /// Never fails: errors come back as a failed `TaskResult`.
    pub fn transcode(&self, item: &WorkItem) -> TaskResult {
        match self.try_transcode(item) {
            Ok(result) => result,
            Err(e) => {
                match &e {
                    EncodeError::Failed {
                        exit_code, stderr, ..
                    } => error!(
                        input = %item.input_path.display(),
                        exit_code = ?exit_code,
                        "FFmpeg error for {}: {}",
                        item.input_path.display(),
                        stderr.trim()
                    ),
                    _ => error!("Error processing {}: {}", item.input_path.display(), e),
                }
                TaskResult::failed(item.input_path.clone(), e.to_string())
            }
        }
    }

    fn scale_for(&self, input: &Path) -> ScaleFilter {
        if !self.probe_resolution {
            return ScaleFilter::PassThrough;
        }
        match self.toolchain.probe(input) {
            Ok(resolution) => {
                let scale = ScaleFilter::for_resolution(
                    resolution,
                    self.settings.max_width,
                    self.settings.max_height,
                );
                info!("Original resolution for {}: {}", input.display(), resolution);
                info!("Using scale filter: {}", scale.to_filter_arg());
                scale
            }
            Err(e) => {
                warn!(
                    "Could not get resolution for {}, using original: {}",
                    input.display(),
                    e
                );
                ScaleFilter::PassThrough
            }
        }
    }

    fn try_transcode(&self, item: &WorkItem) -> Result<TaskResult, EncodeError> {
        let input_size = std::fs::metadata(&item.input_path)?.len();
        let scale = self.scale_for(&item.input_path);

        // Partial output is left in place on failure.
        let output = item.normalized_output();
        self.toolchain.encode(&EncodeRequest {
            input: &item.input_path,
            output: &output,
            scale,
            settings: self.settings,
        })?;
        info!("Successfully processed: {}", item.input_path.display());

        let final_path = match restored_path(self.mapping, &output) {
            Some(target) => {
                std::fs::rename(&output, &target).map_err(|source| EncodeError::Rename {
                    from: output.clone(),
                    to: target.clone(),
                    source,
                })?;
                info!("Renamed {} → {}", output.display(), target.display());
                target
            }
            None => output,
        };

        let output_size = std::fs::metadata(&final_path)?.len();
        Ok(TaskResult::succeeded(
            item.input_path.clone(),
            final_path,
            input_size,
            output_size,
        ))
    }
}

/// Discovery, directory mirroring, parallel transcode, summary.
///
/// Returns the aggregate even when some files failed; only fatal conditions
/// (missing input, bad config, walk or pool errors) are `Err`.
pub fn compress_directory<T: MediaToolchain>(
    config: &CompressConfig,
    toolchain: &T,
) -> Result<BatchResult, CompressError> {
    config.validate()?;
    let start_time = Instant::now();

    let discovery = discover(&config.input_dir, &config.output_dir, VIDEO_EXTENSIONS)?;
    create_directory_structure(&discovery.directories)?;
    info!(
        "Mirrored {} directories into {}",
        discovery.directories.len(),
        config.output_dir.display()
    );

    if discovery.items.is_empty() {
        warn!("No video files found in input directory");
        return Ok(BatchResult::new());
    }
    if !discovery.collisions.is_empty() {
        warn!(
            "{} file(s) renamed to avoid output collisions",
            discovery.collisions.len()
        );
    }

    info!("Found {} video files to process", discovery.items.len());

    let transcoder = Transcoder::new(
        toolchain,
        &discovery.mapping,
        &config.encode,
        config.probe_resolution,
    );
    let results = run_batch(&discovery.items, config.concurrency, |item| {
        transcoder.transcode(item)
    })?;

    let batch = BatchResult::from_results(&results);
    log_summary_report(&batch, start_time.elapsed(), "Video Compression");
    Ok(batch)
}
