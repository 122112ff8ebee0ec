//! vid-compress - Batch HEVC/H.265 Video Compression
//!
//! Walks an input tree, mirrors its directories into `<input>_compressed`
//! and re-encodes every video (mp4, mkv, avi, mov, flv, wmv) to an HEVC MP4
//! no larger than 1920x1080 at 30 fps.
//!
//! ```rust,ignore
//! use vid_compress::{compress_directory, preflight, CompressConfig, FfmpegToolchain};
//!
//! let mut config = CompressConfig::new("videos").with_concurrency(4);
//! preflight(&mut config)?;
//! let toolchain = FfmpegToolchain::from_config(&config);
//! let result = compress_directory(&config, &toolchain)?;
//! println!("{} of {} succeeded", result.succeeded, result.total);
//! ```

pub mod conversion_api;

pub use conversion_api::{
    compress_directory, preflight, EncodeRequest, FfmpegToolchain, MediaToolchain, Transcoder,
};

pub use shared_utils::batch::{BatchResult, WorkItem};
pub use shared_utils::conversion_types::{
    CompressConfig, EncodeSettings, Resolution, ScaleFilter, TaskResult,
};
pub use shared_utils::errors::{CompressError, ConfigError, EncodeError, Result};
pub use shared_utils::ffprobe::FFprobeError;
