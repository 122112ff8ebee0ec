//! Shared Utilities for the vid-compress batch transcoder
//!
//! - Discovery of work items and mirrored output directories
//! - Filename sanitizing and the reverse name mapping
//! - Fixed-size worker pool with per-item fault isolation
//! - Aggregated logging channel (single consumer, many producers)
//! - FFmpeg / FFprobe process plumbing
//! - Configuration, result and error types
//! - Batch summary reporting

pub mod batch;
pub mod conversion_types;
pub mod errors;
pub mod ffmpeg_process;
pub mod ffprobe;
pub mod logging;
pub mod naming;
pub mod report;
pub mod thread_manager;

pub use batch::{
    create_directory_structure, default_output_dir, discover, has_extension, BatchResult,
    Discovery, NameCollision, WorkItem, VIDEO_EXTENSIONS,
};
pub use conversion_types::{CompressConfig, EncodeSettings, Resolution, ScaleFilter, TaskResult};
pub use errors::{CompressError, ConfigError, EncodeError};
pub use ffmpeg_process::{find_tool, format_ffmpeg_error, FfmpegProcess, ProcessError, ProcessOutput};
pub use ffprobe::{parse_resolution, probe_resolution, FFprobeError};
pub use naming::{normalize_output_path, restored_path, sanitize, FilenameMapping, TARGET_EXTENSION};
pub use report::{format_bytes, format_duration, log_summary_report};
pub use thread_manager::{resolve_concurrency, run_batch};
