//! FFprobe wrapper - resolution probing
//!
//! Only the first video stream's width/height is requested. Any failure here
//! is reported to the caller, which degrades to an unscaled encode.

use crate::conversion_types::Resolution;
use crate::ffmpeg_process::{FfmpegProcess, ProcessError};
use crate::naming::safe_path_arg;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FFprobeError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("ffprobe exited with {exit_code:?}: {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("No video stream found")]
    NoVideoStream,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

/// `ffprobe -v error -select_streams v:0 -show_entries stream=width,height -of json <path>`
pub fn probe_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-v",
        "error",
        "-select_streams",
        "v:0",
        "-show_entries",
        "stream=width,height",
        "-of",
        "json",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(safe_path_arg(path).into_owned());
    args
}

/// Extracts the first stream's dimensions from ffprobe's JSON output.
pub fn parse_resolution(json: &str) -> Result<Resolution, FFprobeError> {
    let output: ProbeOutput =
        serde_json::from_str(json).map_err(|e| FFprobeError::ParseError(e.to_string()))?;

    let stream = output.streams.first().ok_or(FFprobeError::NoVideoStream)?;
    match (stream.width, stream.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => Ok(Resolution { width, height }),
        _ => Err(FFprobeError::ParseError(
            "stream is missing width/height".to_string(),
        )),
    }
}

pub fn probe_resolution(
    ffprobe: &Path,
    path: &Path,
    timeout: Option<Duration>,
) -> Result<Resolution, FFprobeError> {
    let mut cmd = Command::new(ffprobe);
    cmd.args(probe_args(path));

    let output = FfmpegProcess::spawn(&mut cmd)?.wait_with_timeout(timeout)?;
    if !output.status.success() {
        return Err(FFprobeError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: output.stderr.trim().to_string(),
        });
    }

    parse_resolution(&output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolution() {
        let json = r#"{"programs": [], "streams": [{"width": 3840, "height": 2160}]}"#;
        assert_eq!(
            parse_resolution(json).unwrap(),
            Resolution {
                width: 3840,
                height: 2160
            }
        );
    }

    #[test]
    fn test_parse_resolution_no_streams() {
        assert!(matches!(
            parse_resolution(r#"{"streams": []}"#),
            Err(FFprobeError::NoVideoStream)
        ));
        assert!(matches!(
            parse_resolution("{}"),
            Err(FFprobeError::NoVideoStream)
        ));
    }

    #[test]
    fn test_parse_resolution_missing_fields() {
        assert!(matches!(
            parse_resolution(r#"{"streams": [{"width": 640}]}"#),
            Err(FFprobeError::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_resolution_malformed() {
        assert!(matches!(
            parse_resolution("not json"),
            Err(FFprobeError::ParseError(_))
        ));
    }

    #[test]
    fn test_probe_args_shape() {
        let args = probe_args(Path::new("-odd name.mkv"));
        assert_eq!(args[3], OsString::from("v:0"));
        assert_eq!(args[5], OsString::from("stream=width,height"));
        assert_eq!(args.last(), Some(&OsString::from("./-odd name.mkv")));
    }

    #[test]
    fn test_probe_missing_tool_is_error() {
        let result = probe_resolution(
            Path::new("definitely_not_a_real_tool_xyz"),
            Path::new("in.mkv"),
            None,
        );
        assert!(matches!(result, Err(FFprobeError::Process(_))));
    }
}
