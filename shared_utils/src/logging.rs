//! Logging Module - aggregated logging channel
//!
//! Every `tracing` event, from any worker thread, is turned into a
//! [`LogRecord`] and pushed onto one channel. A single consumer thread owns all
//! sinks (the log file and the console echo), so no two records can ever
//! interleave inside a sink.
//!
//! Lifecycle:
//! - [`init_logging`] starts the consumer before anything else logs.
//! - [`LogGuard::close`] (or dropping the guard) enqueues a shutdown sentinel,
//!   then waits for the consumer to write out everything queued ahead of it.
//!
//! # Examples
//!
//! ```no_run
//! use shared_utils::logging::{init_logging, LogConfig};
//! use tracing::info;
//!
//! let guard = init_logging(LogConfig::default()).expect("Failed to initialize logging");
//! info!("Program started");
//! guard.close().expect("Failed to flush logs");
//! ```

use crate::errors::CompressError;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fmt::{self, Write as _};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context as LayerContext, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Append-only log file, default `video_processing.log` in the working directory
    pub log_file: PathBuf,
    /// Echo records to stderr as well
    pub console: bool,
    /// Default level when `RUST_LOG` is not set
    pub level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("video_processing.log"),
            console: true,
            level: Level::INFO,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = path.into();
        self
    }

    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

/// One log line, produced anywhere and consumed only by the channel's consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub message: String,
}

impl LogRecord {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
        }
    }

    /// `{timestamp} - {LEVEL} - {message}`
    pub fn render(&self) -> String {
        format!(
            "{} - {} - {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.level,
            self.message
        )
    }
}

/// A destination owned by the consumer thread.
pub trait LogSink: Send {
    fn write_record(&mut self, record: &LogRecord) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

/// Writes each rendered record as a single `write_all` of one full line.
pub struct WriterSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> LogSink for WriterSink<W> {
    fn write_record(&mut self, record: &LogRecord) -> io::Result<()> {
        let mut line = record.render();
        line.push('\n');
        self.writer.write_all(line.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// stderr echo with the level coloured when stderr is a terminal.
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn write_record(&mut self, record: &LogRecord) -> io::Result<()> {
        let level = console::style(record.level.to_string()).for_stderr();
        let level = match record.level {
            Level::ERROR => level.red().bold(),
            Level::WARN => level.yellow(),
            Level::INFO => level.green(),
            _ => level.dim(),
        };
        let line = format!(
            "{} - {} - {}\n",
            record.timestamp.format(TIMESTAMP_FORMAT),
            level,
            record.message
        );
        io::stderr().lock().write_all(line.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

enum Envelope {
    Record(LogRecord),
    Shutdown,
}

/// Producer handle. Cheap to clone; one per worker is fine.
#[derive(Clone)]
pub struct LogSender {
    tx: mpsc::Sender<Envelope>,
}

impl LogSender {
    /// Enqueues a record. Gives the record back if the consumer has already
    /// exited.
    pub fn send(&self, record: LogRecord) -> std::result::Result<(), LogRecord> {
        self.tx
            .send(Envelope::Record(record))
            .map_err(|mpsc::SendError(envelope)| match envelope {
                Envelope::Record(record) => record,
                Envelope::Shutdown => unreachable!("only records are sent through LogSender"),
            })
    }
}

/// The channel plus its single consumer thread.
pub struct LogChannel {
    sender: LogSender,
    consumer: Option<JoinHandle<usize>>,
}

impl LogChannel {
    /// Spawns the consumer. It is running by the time this returns.
    pub fn start(sinks: Vec<Box<dyn LogSink>>) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let consumer = thread::Builder::new()
            .name("log-consumer".to_string())
            .spawn(move || consume(rx, sinks))?;
        Ok(Self {
            sender: LogSender { tx },
            consumer: Some(consumer),
        })
    }

    pub fn sender(&self) -> LogSender {
        self.sender.clone()
    }

    /// Sends the sentinel and waits for the consumer to drain. Returns the
    /// number of records written.
    pub fn close(mut self) -> crate::errors::Result<usize> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> crate::errors::Result<usize> {
        let Some(consumer) = self.consumer.take() else {
            return Ok(0);
        };
        // A send error means the consumer is already gone; join reports why.
        let _ = self.sender.tx.send(Envelope::Shutdown);
        consumer
            .join()
            .map_err(|_| CompressError::LogChannel("consumer thread panicked".to_string()))
    }
}

impl Drop for LogChannel {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn write_all_sinks(sinks: &mut [Box<dyn LogSink>], record: &LogRecord) {
    for sink in sinks.iter_mut() {
        // The consumer cannot log through tracing without feeding itself.
        if let Err(e) = sink.write_record(record) {
            eprintln!("log sink write failed: {}", e);
        }
    }
}

fn consume(rx: mpsc::Receiver<Envelope>, mut sinks: Vec<Box<dyn LogSink>>) -> usize {
    let mut written = 0usize;
    while let Ok(envelope) = rx.recv() {
        match envelope {
            Envelope::Record(record) => {
                write_all_sinks(&mut sinks, &record);
                written += 1;
            }
            Envelope::Shutdown => break,
        }
    }
    // Records that raced the sentinel still get written.
    while let Ok(Envelope::Record(record)) = rx.try_recv() {
        write_all_sinks(&mut sinks, &record);
        written += 1;
    }
    for sink in sinks.iter_mut() {
        let _ = sink.flush();
    }
    written
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: String,
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// `tracing` layer feeding the aggregated channel.
pub struct ChannelLayer {
    sender: LogSender,
}

impl ChannelLayer {
    pub fn new(sender: LogSender) -> Self {
        Self { sender }
    }
}

impl<S: Subscriber> Layer<S> for ChannelLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);
        visitor.message.push_str(&visitor.fields);

        let record = LogRecord::new(*event.metadata().level(), visitor.message);
        if let Err(record) = self.sender.send(record) {
            eprintln!("{}", record.render());
        }
    }
}

/// Flushes and stops the logging consumer when closed or dropped.
pub struct LogGuard {
    channel: LogChannel,
}

impl LogGuard {
    pub fn close(self) -> crate::errors::Result<usize> {
        self.channel.close()
    }
}

fn open_log_file(config: &LogConfig) -> Result<RollingFileAppender> {
    let file_name = config
        .log_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("Invalid log file path: {}", config.log_file.display()))?;
    let dir = match config.log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(&dir)
        .with_context(|| format!("Failed to open log file: {}", config.log_file.display()))
}

/// Installs the global subscriber and starts the channel consumer.
///
/// `RUST_LOG` overrides `config.level` when set.
pub fn init_logging(config: LogConfig) -> Result<LogGuard> {
    let mut sinks: Vec<Box<dyn LogSink>> =
        vec![Box::new(WriterSink::new(open_log_file(&config)?))];
    if config.console {
        sinks.push(Box::new(ConsoleSink));
    }

    let channel = LogChannel::start(sinks).context("Failed to start log consumer")?;

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.level).into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ChannelLayer::new(channel.sender()))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!(
        log_file = %config.log_file.display(),
        level = %config.level,
        "Logging system initialized"
    );

    Ok(LogGuard { channel })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    /// In-memory sink target shared with the test body.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn buffered_channel() -> (LogChannel, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let channel = LogChannel::start(vec![Box::new(WriterSink::new(buffer.clone()))]).unwrap();
        (channel, buffer)
    }

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new()
            .with_log_file("/tmp/x/run.log")
            .with_console(false)
            .with_level(Level::DEBUG);
        assert_eq!(config.log_file, PathBuf::from("/tmp/x/run.log"));
        assert!(!config.console);
        assert_eq!(config.level, Level::DEBUG);
    }

    #[test]
    fn test_record_render_format() {
        let record = LogRecord::new(Level::WARN, "probe failed");
        let rendered = record.render();
        assert!(rendered.ends_with(" - WARN - probe failed"));
        assert_eq!(rendered.split(" - ").count(), 3);
    }

    #[test]
    fn test_close_flushes_everything_sent_before() {
        let (channel, buffer) = buffered_channel();
        let sender = channel.sender();
        for i in 0..100 {
            sender.send(LogRecord::new(Level::INFO, format!("msg {}", i))).unwrap();
        }
        assert_eq!(channel.close().unwrap(), 100);
        let contents = buffer.contents();
        assert_eq!(contents.lines().count(), 100);
        assert!(contents.lines().last().unwrap().ends_with("msg 99"));
    }

    #[test]
    fn test_send_after_close_returns_record() {
        let (channel, _buffer) = buffered_channel();
        let sender = channel.sender();
        channel.close().unwrap();
        let record = LogRecord::new(Level::INFO, "late");
        assert_eq!(sender.send(record.clone()), Err(record));
    }

    struct PanickingSink;

    impl LogSink for PanickingSink {
        fn write_record(&mut self, _record: &LogRecord) -> io::Result<()> {
            panic!("sink exploded");
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_consumer_panic_reported_on_close() {
        let channel = LogChannel::start(vec![Box::new(PanickingSink)]).unwrap();
        let _ = channel.sender().send(LogRecord::new(Level::ERROR, "boom"));
        let err = channel.close().unwrap_err();
        assert!(matches!(err, CompressError::LogChannel(_)));
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 250;

        let (channel, buffer) = buffered_channel();
        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let sender = channel.sender();
                thread::spawn(move || {
                    for m in 0..PER_PRODUCER {
                        let message = format!("worker={} seq={} {}", p, m, "x".repeat(200));
                        sender.send(LogRecord::new(Level::INFO, message)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(channel.close().unwrap(), PRODUCERS * PER_PRODUCER);

        let contents = buffer.contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), PRODUCERS * PER_PRODUCER);

        let mut seen = HashSet::new();
        for line in &lines {
            let (_, message) = line.split_once(" - INFO - ").expect("intact prefix");
            let mut parts = message.splitn(3, ' ');
            let worker = parts.next().unwrap();
            let seq = parts.next().unwrap();
            assert_eq!(parts.next().unwrap(), "x".repeat(200), "record was split");
            assert!(seen.insert(format!("{} {}", worker, seq)), "duplicate record");
        }
        assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
    }

    #[test]
    fn test_channel_layer_captures_tracing_events() {
        let (channel, buffer) = buffered_channel();
        let dispatch = tracing::Dispatch::new(
            tracing_subscriber::registry().with(ChannelLayer::new(channel.sender())),
        );

        let handles: Vec<_> = (0..4)
            .map(|w| {
                let dispatch = dispatch.clone();
                thread::spawn(move || {
                    tracing::dispatcher::with_default(&dispatch, || {
                        for i in 0..50 {
                            tracing::warn!(worker = w, "event {}", i);
                        }
                    });
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        drop(dispatch);

        assert_eq!(channel.close().unwrap(), 200);
        let contents = buffer.contents();
        assert_eq!(contents.lines().count(), 200);
        assert!(contents
            .lines()
            .all(|l| l.contains(" - WARN - event ") && l.contains(" worker=")));
    }

    #[test]
    fn test_open_log_file_creates_parent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = LogConfig::new().with_log_file(tmp.path().join("logs/run.log"));
        let mut appender = open_log_file(&config).unwrap();
        appender.write_all(b"hello\n").unwrap();
        appender.flush().unwrap();
        let written = std::fs::read_to_string(tmp.path().join("logs/run.log")).unwrap();
        assert_eq!(written, "hello\n");
    }
}
