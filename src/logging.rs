//! Log output setup
//!
//! Every record is written as one line, `<timestamp> - <message>`, both to
//! standard output and to an append-only log file. [`LogLineFormat`] is the
//! `tracing-subscriber` event formatter producing that line; [`init_logging`]
//! installs it once at startup. `RUST_LOG` overrides the default `info` level.

use crate::error::{Result, SyncError};
use chrono::Local;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Timestamp layout of each log line, e.g. `2024-05-01 13:37:00,123`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Formats events as `<timestamp> - <message>`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogLineFormat;

impl<S, N> FormatEvent<S, N> for LogLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "{} - ", Local::now().format(TIMESTAMP_FORMAT))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Open the log file for appending, creating it if needed
pub fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SyncError::LogFile {
            path: path.to_path_buf(),
            source,
        })
}

/// Install the global subscriber writing to stdout and `log_file`
///
/// # Errors
///
/// - [`SyncError::LogFile`] if the file cannot be opened
/// - [`SyncError::Logging`] if a global subscriber is already set
pub fn init_logging(log_file: &Path) -> Result<()> {
    let file = open_log_file(log_file)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .event_format(LogLineFormat)
        .with_writer(std::io::stdout);
    let file_layer = tracing_subscriber::fmt::layer()
        .event_format(LogLineFormat)
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| SyncError::Logging(e.to_string()))
}
