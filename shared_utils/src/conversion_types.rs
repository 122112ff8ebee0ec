use crate::errors::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

/// Video stream dimensions reported by the prober.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Resize instruction passed to the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleFilter {
    /// Keep source dimensions (`scale=iw:ih`).
    PassThrough,
    /// Shrink into a `max_width` x `max_height` box, preserving aspect ratio.
    FitWithin { max_width: u32, max_height: u32 },
}

impl ScaleFilter {
    /// Decides how to scale a source of the given resolution.
    pub fn for_resolution(resolution: Resolution, max_width: u32, max_height: u32) -> Self {
        if resolution.width > max_width || resolution.height > max_height {
            ScaleFilter::FitWithin {
                max_width,
                max_height,
            }
        } else {
            ScaleFilter::PassThrough
        }
    }

    /// The `-vf` argument.
    ///
    /// `force_divisible_by=2` keeps the shrunk dimensions legal for 4:2:0
    /// chroma subsampling.
    pub fn to_filter_arg(&self) -> String {
        match self {
            ScaleFilter::PassThrough => "scale=iw:ih".to_string(),
            ScaleFilter::FitWithin {
                max_width,
                max_height,
            } => format!(
                "scale={}:{}:force_original_aspect_ratio=decrease:force_divisible_by=2",
                max_width, max_height
            ),
        }
    }
}

/// Fixed encode policy applied to every file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    pub video_codec: String,
    pub frame_rate: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx265".to_string(),
            frame_rate: 30,
            max_width: 1920,
            max_height: 1080,
        }
    }
}

/// Run configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct CompressConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Number of concurrent workers, always >= 1.
    pub concurrency: usize,
    /// Probe each input for its resolution before encoding.
    pub probe_resolution: bool,
    /// Upper bound on each prober/encoder invocation.
    pub tool_timeout: Option<Duration>,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub encode: EncodeSettings,
}

impl CompressConfig {
    /// Config with defaults for everything but the input directory.
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        let input_dir = input_dir.into();
        let output_dir = crate::batch::default_output_dir(&input_dir);
        Self {
            input_dir,
            output_dir,
            concurrency: 1,
            probe_resolution: true,
            tool_timeout: None,
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            encode: EncodeSettings::default(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(self.concurrency));
        }
        if self.tool_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Outcome of one transcode task. Produced exactly once per work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub input_path: PathBuf,
    pub success: bool,
    /// Final location of the encoded file, after any rename.
    pub output_path: Option<PathBuf>,
    pub input_size: u64,
    pub output_size: Option<u64>,
    pub error: Option<String>,
}

impl TaskResult {
    pub fn succeeded(
        input_path: PathBuf,
        output_path: PathBuf,
        input_size: u64,
        output_size: u64,
    ) -> Self {
        Self {
            input_path,
            success: true,
            output_path: Some(output_path),
            input_size,
            output_size: Some(output_size),
            error: None,
        }
    }

    pub fn failed(input_path: PathBuf, error: String) -> Self {
        Self {
            input_path,
            success: false,
            output_path: None,
            input_size: 0,
            output_size: None,
            error: Some(error),
        }
    }
}
