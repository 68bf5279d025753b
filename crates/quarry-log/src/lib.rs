//! A minimal, zero-dependency logging crate for the Quarry allocators.
//!
//! This crate provides a leveled diagnostic logger with colored console
//! output and any number of file sinks, each filtering records against its
//! own severity threshold. A logger is assembled once from a [`LogConfig`]
//! value and is then immutable; record calls chain, so a caller can emit a
//! burst of related records in one expression.
//!
//! # Example
//!
//! ```
//! use quarry_log::{LogConfig, Logger, Severity};
//!
//! let config = LogConfig::new().add_console(Severity::Warning);
//! let logger = Logger::from_config(config).unwrap();
//!
//! logger
//!     .warning("arena nearly full")
//!     .error("allocation request failed");
//!
//! // Below the console threshold, so this record is dropped.
//! logger.trace("walked 3 free blocks");
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

/// Severities a diagnostic record can carry.
///
/// `Severity` is ordered from least severe (Trace) to most severe (Error).
/// A sink emits every record whose severity is at or above the sink's
/// threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Trace level - fine-grained operation progress
    Trace = 0,
    /// Debug level - detailed diagnostic information
    Debug = 1,
    /// Warning level - potentially harmful situations
    Warning = 2,
    /// Error level - critical failures and errors
    Error = 3,
}

impl Severity {
    /// Returns the ANSI color code for this severity.
    const fn color_code(&self) -> &'static str {
        match self {
            Severity::Trace => "\x1b[35m",   // Magenta
            Severity::Debug => "\x1b[36m",   // Cyan
            Severity::Warning => "\x1b[33m", // Yellow
            Severity::Error => "\x1b[31m",   // Red
        }
    }

    /// Returns the string representation of this severity.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }

    /// Parses a string into a Severity.
    ///
    /// # Example
    ///
    /// ```
    /// use quarry_log::Severity;
    ///
    /// assert_eq!(Severity::from_str("trace"), Ok(Severity::Trace));
    /// assert_eq!(Severity::from_str("WARNING"), Ok(Severity::Warning));
    /// assert!(Severity::from_str("invalid").is_err());
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(Severity::Trace),
            "DEBUG" => Ok(Severity::Debug),
            "WARNING" => Ok(Severity::Warning),
            "ERROR" => Ok(Severity::Error),
            _ => Err(format!("Invalid severity: {}", s)),
        }
    }
}

/// Where a sink delivers its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// Standard output with ANSI coloring.
    Console,
    /// A line-oriented log file, created on demand and appended to.
    File(PathBuf),
}

/// One sink descriptor: a target plus the minimum severity it lets through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSpec {
    /// Where records go.
    pub target: SinkTarget,
    /// Records below this severity are dropped by this sink.
    pub threshold: Severity,
}

/// The list of sink descriptors a [`Logger`] is built from.
///
/// A `LogConfig` is plain data. It is consumed once by
/// [`Logger::from_config`]; there is no way to reconfigure a logger after
/// construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// The sinks, in the order records will be delivered to them.
    pub sinks: Vec<SinkSpec>,
}

impl LogConfig {
    /// Creates an empty configuration. A logger built from it drops
    /// every record.
    pub fn new() -> Self {
        LogConfig { sinks: Vec::new() }
    }

    /// Appends a console sink with the given threshold.
    pub fn add_console(mut self, threshold: Severity) -> Self {
        self.sinks.push(SinkSpec {
            target: SinkTarget::Console,
            threshold,
        });
        self
    }

    /// Appends a file sink writing to `path` with the given threshold.
    pub fn add_file(mut self, path: impl Into<PathBuf>, threshold: Severity) -> Self {
        self.sinks.push(SinkSpec {
            target: SinkTarget::File(path.into()),
            threshold,
        });
        self
    }
}

/// An opened sink. File handles are held for the logger's lifetime so a
/// record never pays for an `open`.
enum Sink {
    Console { threshold: Severity },
    File { threshold: Severity, file: File },
}

impl Sink {
    fn threshold(&self) -> Severity {
        match self {
            Sink::Console { threshold } | Sink::File { threshold, .. } => *threshold,
        }
    }
}

/// A leveled, multi-sink diagnostic logger.
///
/// Records are delivered to every sink whose threshold admits them. Sink IO
/// failures are silently dropped: diagnostics are best-effort and must never
/// turn into errors in the code being observed.
pub struct Logger {
    sinks: Vec<Sink>,
}

impl Logger {
    /// Builds a logger from a sink configuration, opening every file sink.
    ///
    /// File sinks are created if missing and appended to otherwise.
    ///
    /// # Errors
    ///
    /// Returns the underlying IO error when a file sink cannot be opened.
    pub fn from_config(config: LogConfig) -> io::Result<Logger> {
        let mut sinks = Vec::with_capacity(config.sinks.len());

        for spec in config.sinks {
            let sink = match spec.target {
                SinkTarget::Console => Sink::Console {
                    threshold: spec.threshold,
                },
                SinkTarget::File(path) => {
                    let file = OpenOptions::new().create(true).append(true).open(&path)?;
                    Sink::File {
                        threshold: spec.threshold,
                        file,
                    }
                }
            };
            sinks.push(sink);
        }

        Ok(Logger { sinks })
    }

    /// Emits a record at the Trace severity.
    pub fn trace(&self, message: &str) -> &Self {
        self.record(Severity::Trace, message)
    }

    /// Emits a record at the Debug severity.
    pub fn debug(&self, message: &str) -> &Self {
        self.record(Severity::Debug, message)
    }

    /// Emits a record at the Warning severity.
    pub fn warning(&self, message: &str) -> &Self {
        self.record(Severity::Warning, message)
    }

    /// Emits a record at the Error severity.
    pub fn error(&self, message: &str) -> &Self {
        self.record(Severity::Error, message)
    }

    /// Checks if any sink would emit a record at the given severity.
    pub fn enabled(&self, severity: Severity) -> bool {
        self.sinks.iter().any(|sink| severity >= sink.threshold())
    }

    /// Delivers one record to every sink that admits its severity.
    fn record(&self, severity: Severity, message: &str) -> &Self {
        static RESET: &str = "\x1b[0m";

        let label = severity.as_str();

        for sink in &self.sinks {
            match sink {
                Sink::Console { threshold } if severity >= *threshold => {
                    let color = severity.color_code();
                    println!("{color}[{label}]{RESET} {message}");
                }
                Sink::File { threshold, file } if severity >= *threshold => {
                    let mut out = file;
                    let _ = writeln!(out, "[{label}] {message}");
                }
                _ => {}
            }
        }

        self
    }
}
