//! Logging for `iaml-register`.
//!
//! Terminal output carries only the level and the message. The optional log
//! file gets a timestamp and source location on every line. The level can be
//! changed after startup through [`set_level`].

use std::fs::File;
use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use anyhow::{Context, Result, anyhow, bail};
use chrono::Local;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::{FmtContext, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, reload};

struct LineFormat {
    detailed: bool,
}

fn level_color(level: Level) -> &'static str {
    match level {
        Level::ERROR => "\x1b[1;31m",
        Level::WARN => "\x1b[1;33m",
        Level::INFO => "\x1b[1;32m",
        Level::DEBUG => "\x1b[1;34m",
        Level::TRACE => "\x1b[1;35m",
    }
}

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();

        if self.detailed {
            write!(writer, "{} ", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))?;
        }

        if writer.has_ansi_escapes() {
            write!(writer, "{}{:>5}\x1b[0m ", level_color(*meta.level()), meta.level())?;
        } else {
            write!(writer, "{:>5} ", meta.level())?;
        }

        if self.detailed {
            if let (Some(file), Some(line)) = (meta.file(), meta.line()) {
                write!(writer, "{file}:{line} ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Log file that can be opened or closed after the subscriber is installed.
/// Writes are dropped while it is closed.
#[derive(Clone, Default)]
struct LogFile(Arc<Mutex<Option<File>>>);

impl LogFile {
    fn lock(&self) -> MutexGuard<'_, Option<File>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct LogFileWriter<'a>(MutexGuard<'a, Option<File>>);

impl Write for LogFileWriter<'_> {
    fn write(
        &mut self,
        buf: &[u8],
    ) -> io::Result<usize> {
        match self.0.as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriter(self.lock())
    }
}

static LEVEL: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();
static LOG_FILE: OnceLock<LogFile> = OnceLock::new();

/// `RUST_LOG` wins; otherwise `fallback` (e.g. `"info"` or `"debug"`).
pub fn initial_filter(
    rust_log: Option<&str>,
    fallback: &str,
) -> Result<EnvFilter> {
    let directive = rust_log
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(fallback);
    EnvFilter::try_new(directive).map_err(|e| anyhow!("invalid log filter '{directive}': {e}"))
}

/// Installs the global subscriber. Later calls are ignored.
pub fn init(fallback_level: &str) -> Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = initial_filter(rust_log.as_deref(), fallback_level)?;
    let (filter, handle) = reload::Layer::new(filter);

    let file = LogFile::default();
    let terminal = tracing_subscriber::fmt::layer()
        .event_format(LineFormat { detailed: false })
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal());
    let on_disk = tracing_subscriber::fmt::layer()
        .event_format(LineFormat { detailed: true })
        .with_ansi(false)
        .with_writer(file.clone());

    if tracing_subscriber::registry()
        .with(filter)
        .with(terminal)
        .with(on_disk)
        .try_init()
        .is_ok()
    {
        let _ = LEVEL.set(handle);
        let _ = LOG_FILE.set(file);
    }
    Ok(())
}

/// Replaces the active filter. Accepts a bare level or any `EnvFilter`
/// directive.
pub fn set_level(directive: &str) -> Result<()> {
    let Some(handle) = LEVEL.get() else {
        bail!("logging not initialized");
    };
    let filter = initial_filter(None, directive)?;
    handle
        .reload(filter)
        .map_err(|e| anyhow!("filter reload failed: {e}"))
}

/// Appends log lines to `path` from now on, replacing any open log file.
pub fn log_to_file(path: &Path) -> Result<()> {
    let Some(slot) = LOG_FILE.get() else {
        bail!("logging not initialized");
    };
    let file = File::options()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open log file '{}'", path.display()))?;
    *slot.lock() = Some(file);
    Ok(())
}

pub fn close_log_file() {
    if let Some(slot) = LOG_FILE.get() {
        *slot.lock() = None;
    }
}
