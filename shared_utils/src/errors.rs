use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level failures. Any of these aborts the run before (or instead of)
/// dispatching work, and maps to a non-zero process exit.
#[derive(Error, Debug)]
pub enum CompressError {
    #[error("Input directory \"{0}\" does not exist")]
    InputNotFound(PathBuf),

    #[error("Input path \"{0}\" is not a directory")]
    InputNotDirectory(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Log channel error: {0}")]
    LogChannel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Concurrency must be at least 1 (got {0})")]
    InvalidConcurrency(usize),

    #[error("Tool timeout must be greater than zero")]
    ZeroTimeout,
}

/// Per-item encoder failures. These never leave the transcode task; they are
/// logged and folded into a failed `TaskResult`.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoder exited with {exit_code:?}: {summary}")]
    Failed {
        exit_code: Option<i32>,
        summary: String,
        stderr: String,
    },

    #[error("Encoder timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker panicked: {0}")]
    Panicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CompressError>;
