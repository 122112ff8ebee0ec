//! External process plumbing for ffmpeg / ffprobe
//!
//! Both pipes are drained on dedicated threads while the child runs. Reading
//! only one of them lets the other fill its pipe buffer (usually 64KB), at
//! which point the child blocks on write and never exits.
//!
//! ```ignore
//! use shared_utils::ffmpeg_process::FfmpegProcess;
//! use std::process::Command;
//! use std::time::Duration;
//!
//! let mut cmd = Command::new("ffmpeg");
//! cmd.arg("-i").arg("input.mkv").arg("output.mp4");
//!
//! let output = FfmpegProcess::spawn(&mut cmd)?.wait_with_timeout(Some(Duration::from_secs(600)))?;
//! if !output.status.success() {
//!     eprintln!("{}", format_ffmpeg_error(&output.stderr));
//! }
//! ```

use crate::errors::EncodeError;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    TimedOut {
        program: String,
        timeout: Duration,
        stderr: String,
    },
}

/// Everything a finished child left behind.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// A running ffmpeg/ffprobe child with both output pipes being drained.
pub struct FfmpegProcess {
    child: Child,
    program: String,
    started: Instant,
    stdout_thread: Option<JoinHandle<String>>,
    stderr_thread: Option<JoinHandle<String>>,
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle
        .map(|t| t.join().unwrap_or_default())
        .unwrap_or_default()
}

impl FfmpegProcess {
    /// Starts `cmd` with stdin closed and stdout/stderr captured.
    pub fn spawn(cmd: &mut Command) -> Result<Self, ProcessError> {
        let program = cmd.get_program().to_string_lossy().into_owned();
        info!(command = ?cmd, "Executing external command");

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdout_thread = child.stdout.take().map(drain);
        let stderr_thread = child.stderr.take().map(drain);

        Ok(Self {
            child,
            program,
            started: Instant::now(),
            stdout_thread,
            stderr_thread,
        })
    }

    /// Waits for exit. With `Some(timeout)` the child is killed and reaped once
    /// the deadline passes.
    pub fn wait_with_timeout(
        mut self,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput, ProcessError> {
        let status = match timeout {
            None => self.child.wait().map_err(|source| ProcessError::Wait {
                program: self.program.clone(),
                source,
            })?,
            Some(timeout) => self.poll_until(self.started + timeout, timeout)?,
        };

        let stdout = join(self.stdout_thread.take());
        let stderr = join(self.stderr_thread.take());
        let duration = self.started.elapsed();

        if status.success() {
            info!(
                program = %self.program,
                exit_code = status.code(),
                duration_secs = duration.as_secs_f64(),
                "External command completed successfully"
            );
            debug!(program = %self.program, stderr_output = %stderr, "External command stderr");
        } else {
            error!(
                program = %self.program,
                exit_code = status.code(),
                duration_secs = duration.as_secs_f64(),
                "External command failed"
            );
        }

        Ok(ProcessOutput {
            status,
            stdout,
            stderr,
            duration,
        })
    }

    fn poll_until(
        &mut self,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<ExitStatus, ProcessError> {
        loop {
            let polled = self.child.try_wait().map_err(|source| ProcessError::Wait {
                program: self.program.clone(),
                source,
            })?;
            if let Some(status) = polled {
                return Ok(status);
            }

            let now = Instant::now();
            if now >= deadline {
                error!(
                    program = %self.program,
                    timeout_secs = timeout.as_secs_f64(),
                    "External command timed out, killing"
                );
                let _ = self.child.kill();
                let _ = self.child.wait();
                let _ = join(self.stdout_thread.take());
                let stderr = join(self.stderr_thread.take());
                return Err(ProcessError::TimedOut {
                    program: self.program.clone(),
                    timeout,
                    stderr,
                });
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

impl From<ProcessError> for EncodeError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::Spawn { program, source } => EncodeError::Spawn { program, source },
            ProcessError::Wait { source, .. } => EncodeError::Io(source),
            ProcessError::TimedOut { timeout, .. } => EncodeError::Timeout(timeout),
        }
    }
}

/// Resolves `program` on `PATH` (or as a literal path).
pub fn find_tool(program: &Path) -> Option<PathBuf> {
    which::which(program).ok()
}

/// Picks the most useful line out of ffmpeg's stderr.
///
/// Prefers the last line mentioning "error", then the last line that is not
/// progress output.
pub fn format_ffmpeg_error(stderr: &str) -> String {
    if let Some(error_line) = stderr
        .lines()
        .rev()
        .find(|line| line.contains("Error") || line.contains("error"))
    {
        return error_line.trim().to_string();
    }

    stderr
        .lines()
        .rev()
        .find(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty()
                && !trimmed.starts_with("frame=")
                && !trimmed.starts_with("fps=")
                && !trimmed.starts_with("size=")
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "Unknown FFmpeg error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ffmpeg_error_with_error_line() {
        let stderr = r#"
frame=  100 fps=25.0 q=28.0 size=    1024kB time=00:00:04.00 bitrate=2097.2kbits/s
[libx265 @ 0x7f8b8c000000] Error: invalid parameter
"#;
        let error = format_ffmpeg_error(stderr);
        assert!(error.contains("invalid parameter"));
    }

    #[test]
    fn test_format_ffmpeg_error_no_error_line() {
        let stderr = "frame=  100 fps=25.0 q=28.0\nConversion failed!\n";
        assert_eq!(format_ffmpeg_error(stderr), "Conversion failed!");
    }

    #[test]
    fn test_format_ffmpeg_error_empty() {
        assert_eq!(format_ffmpeg_error(""), "Unknown FFmpeg error");
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_stdout_and_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2; exit 3"]);
        let output = FfmpegProcess::spawn(&mut cmd)
            .unwrap()
            .wait_with_timeout(None)
            .unwrap();
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[test]
    fn test_large_stderr_does_not_deadlock() {
        let mut cmd = Command::new("sh");
        cmd.args([
            "-c",
            "i=0; while [ $i -lt 5000 ]; do echo 'xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx' >&2; i=$((i+1)); done",
        ]);
        let output = FfmpegProcess::spawn(&mut cmd)
            .unwrap()
            .wait_with_timeout(Some(Duration::from_secs(30)))
            .unwrap();
        assert!(output.status.success());
        assert_eq!(output.stderr.lines().count(), 5000);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let mut cmd = Command::new("sleep");
        cmd.arg("10");
        let started = Instant::now();
        let err = FfmpegProcess::spawn(&mut cmd)
            .unwrap()
            .wait_with_timeout(Some(Duration::from_millis(200)))
            .unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_spawn_missing_program() {
        let mut cmd = Command::new("definitely_not_a_real_tool_xyz");
        let err = FfmpegProcess::spawn(&mut cmd).err().unwrap();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[test]
    fn test_find_tool_missing() {
        assert!(find_tool(Path::new("definitely_not_a_real_tool_xyz")).is_none());
    }
}
