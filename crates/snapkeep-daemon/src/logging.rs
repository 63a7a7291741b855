use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDateTime;
use tracing::field::{Field, Visit};
use tracing::Level;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

const MAX_BYTES: u64 = 1_000_000;
const BACKUP_COUNT: u32 = 9;
const BUFFER_CAPACITY: usize = 100_000;

/// One captured log line, independent of whichever sink eventually renders it.
struct Record {
    timestamp: NaiveDateTime,
    level: Level,
    target: String,
    message: String,
}

impl Record {
    fn render(&self) -> String {
        format!(
            "[{}] [{}] {}: {}\n",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.target,
            self.message
        )
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else if !self.message.is_empty() {
            self.message.push_str(&format!(" {}={:?}", field.name(), value));
        } else {
            self.message = format!("{}={:?}", field.name(), value);
        }
    }
}

struct RotatingWriter {
    path: PathBuf,
    file: File,
}

impl RotatingWriter {
    fn open(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    fn write(&mut self, line: &str) -> io::Result<()> {
        if self.file.metadata()?.len() >= MAX_BYTES {
            self.rotate()?;
        }
        self.file.write_all(line.as_bytes())
    }

    /// Shifts `path.N` to `path.N+1` for N down to 1, dropping anything past
    /// `BACKUP_COUNT`, then reopens a fresh empty file at `path`. Mirrors
    /// Python's `RotatingFileHandler(maxBytes=1_000_000, backupCount=9)`.
    fn rotate(&mut self) -> io::Result<()> {
        let oldest = self.path.with_extension(format!("{BACKUP_COUNT}"));
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..BACKUP_COUNT).rev() {
            let src = self.path.with_extension(format!("{n}"));
            let dst = self.path.with_extension(format!("{}", n + 1));
            if src.exists() {
                fs::rename(&src, &dst)?;
            }
        }
        fs::rename(&self.path, self.path.with_extension("1"))?;
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        Ok(())
    }
}

fn level_to_u8(level: Level) -> u8 {
    match level {
        Level::ERROR => 0,
        Level::WARN => 1,
        Level::INFO => 2,
        Level::DEBUG => 3,
        Level::TRACE => 4,
    }
}

enum SinkState {
    Buffering(Vec<Record>),
    Persistent(RotatingWriter),
}

/// The file sink for daemon logging, modeled as an explicit two-phase state
/// machine: records are held in a bounded buffer until `attach_file` is
/// called exactly once, at which point the buffer is flushed in order and
/// discarded.
pub struct LogSink {
    state: Mutex<SinkState>,
    level: std::sync::atomic::AtomicU8,
}

impl LogSink {
    /// Starts buffering at `TRACE` (accept everything) since the file
    /// sink's real configured level is not known until the config file
    /// itself has been parsed; `set_level` narrows it once that's done.
    pub fn buffering() -> Self {
        Self {
            state: Mutex::new(SinkState::Buffering(Vec::new())),
            level: std::sync::atomic::AtomicU8::new(level_to_u8(Level::TRACE)),
        }
    }

    /// Narrows the sink's level once the configured value is known.
    pub fn set_level(&self, level: Level) {
        self.level.store(level_to_u8(level), std::sync::atomic::Ordering::Relaxed);
    }

    fn current_level(&self) -> u8 {
        self.level.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Opens `path` for appending, flushes every buffered record to it, and
    /// switches the sink into its persistent phase. Calling this twice is a
    /// logic error in the daemon's startup sequence but is handled
    /// gracefully: the second call simply reopens at the new path, losing
    /// nothing already flushed.
    pub fn attach_file(&self, path: &Path) -> io::Result<()> {
        let mut writer = RotatingWriter::open(path)?;
        let mut state = self.state.lock().expect("log sink mutex poisoned");
        if let SinkState::Buffering(buffered) = &*state {
            for record in buffered {
                writer.write(&record.render())?;
            }
        }
        *state = SinkState::Persistent(writer);
        Ok(())
    }
}

impl<S> Layer<S> for LogSink
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level_to_u8(level) > self.current_level() {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let record = Record {
            timestamp: snapkeep_core::now_naive(),
            level,
            target: event.metadata().target().to_string(),
            message: visitor.message,
        };

        let mut state = self.state.lock().expect("log sink mutex poisoned");
        match &mut *state {
            SinkState::Buffering(buffer) => {
                if buffer.len() >= BUFFER_CAPACITY {
                    buffer.remove(0);
                }
                buffer.push(record);
            }
            SinkState::Persistent(writer) => {
                let _ = writer.write(&record.render());
            }
        }
    }
}

/// Builds the console layer pair: records below `WARN` to stdout, `WARN`
/// and above to stderr, each independently filterable by `console_level`.
pub fn console_layers<S>(
    console_level: Level,
) -> (
    impl Layer<S> + Send + Sync + 'static,
    impl Layer<S> + Send + Sync + 'static,
)
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let stdout = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .without_time()
        .with_filter(tracing_subscriber::filter::filter_fn(move |meta| {
            meta.level() <= &console_level && meta.level() > &Level::WARN
        }));
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .without_time()
        .with_filter(tracing_subscriber::filter::filter_fn(move |meta| {
            meta.level() <= &console_level && meta.level() <= &Level::WARN
        }));
    (stdout, stderr)
}

/// Parses the four config-file loglevel names onto `tracing::Level`. There
/// is no "verbose" level in `tracing`'s scheme; it maps onto `DEBUG`, one
/// notch more verbose than `INFO` and one notch quieter than `TRACE`.
pub fn parse_loglevel(raw: &str) -> Option<Level> {
    match raw {
        "quiet" => Some(Level::WARN),
        "default" => Some(Level::INFO),
        "verbose" => Some(Level::DEBUG),
        "debug" => Some(Level::TRACE),
        _ => None,
    }
}
