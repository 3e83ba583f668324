//! Structured logging utilities for Memoflow
//!
//! All engine logs use structured fields so runs can be filtered by task and
//! cache outcome.
//!
//! # Log Format Conventions
//!
//! - `operation`: The operation being performed (e.g., "cache.lookup", "execute")
//! - `status`: The result status ("hit", "miss", "partial", "success", "error")
//! - `task`: Task module identifier
//! - `name`: Task display name within the job
//! - `hash`: Task input hash or field hash tag (hex-encoded)
//!
//! # Examples
//!
//! ```ignore
//! use tracing::info;
//!
//! info!(
//!     operation = "cache.lookup",
//!     status = "hit",
//!     task = "add",
//!     name = "add@2",
//!     hash = %input_hash,
//!     "cache hit"
//! );
//! ```

use std::{fmt as std_fmt, io};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    fmt::{self, format::Writer},
    prelude::*,
    EnvFilter,
};

/// Custom formatter that shows "memoflow" instead of full module path
struct MemoflowFormatter {
    with_ansi: bool,
}

impl<S, N> FormatEvent<S, N> for MemoflowFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        let meta = event.metadata();

        write!(
            writer,
            "{} ",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f")
        )?;

        if self.with_ansi {
            let level_style = match *meta.level() {
                tracing::Level::ERROR => "\x1b[31m",
                tracing::Level::WARN => "\x1b[33m",
                tracing::Level::INFO => "\x1b[32m",
                tracing::Level::DEBUG => "\x1b[34m",
                tracing::Level::TRACE => "\x1b[35m",
            };
            write!(writer, "{}{:5}(memoflow)\x1b[0m: ", level_style, meta.level())?;
        } else {
            write!(writer, "{:5}(memoflow): ", meta.level())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, coloured
    Pretty,
    /// Same layout without colour (CI)
    Compact,
    /// JSON lines for log aggregation
    Json,
}

impl LogFormat {
    /// Parse from `MEMOFLOW_LOG_FORMAT`, defaulting to compact under `CI`
    pub fn from_env() -> Self {
        Self::parse(
            std::env::var("MEMOFLOW_LOG_FORMAT").ok().as_deref(),
            std::env::var("CI").is_ok(),
        )
    }

    fn parse(value: Option<&str>, ci: bool) -> Self {
        match value.unwrap_or_default().to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            "pretty" => Self::Pretty,
            _ if ci => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

/// Initialize the global tracing subscriber. Logs go to stderr.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Log filter; wins over `verbose`
/// - `MEMOFLOW_LOG_FORMAT`: "pretty", "compact" or "json"
/// - `CI`: If set, defaults to compact format
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match LogFormat::from_env() {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .event_format(MemoflowFormatter { with_ansi: true })
                        .with_writer(io::stderr),
                )
                .init();
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .event_format(MemoflowFormatter { with_ansi: false })
                        .with_writer(io::stderr),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_file(false)
                        .with_line_number(false)
                        .with_ansi(false)
                        .with_writer(io::stderr)
                        .json(),
                )
                .init();
        }
    }
}

/// Operation names for consistent logging
pub mod operations {
    pub const CACHE_LOOKUP: &str = "cache.lookup";
    pub const CACHE_FETCH: &str = "cache.fetch";
    pub const CACHE_UPLOAD: &str = "cache.upload";
    pub const EXECUTE: &str = "execute";
    pub const DRY_RUN: &str = "dry_run";
}

/// Status values for consistent logging
pub mod status {
    pub const SUCCESS: &str = "success";
    pub const HIT: &str = "hit";
    pub const MISS: &str = "miss";
    pub const PARTIAL: &str = "partial";
    pub const ERROR: &str = "error";
}
