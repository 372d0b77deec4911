//! # Logging
//!
//! The bridge logs through `tracing`. This module owns the process-wide
//! subscriber and the level knob: an ordered [`LogLevel`] scale plus the
//! `all`/`none` sentinels, mapped onto an `EnvFilter` that can be swapped at
//! runtime through a reload layer.

use std::str::FromStr;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    UnknownLevel(String),
    /// A global subscriber is already installed.
    AlreadyInstalled,
    /// The subscriber owning the reload layer is gone.
    Reload(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownLevel(name) => write!(f, "Unknown log level: {}", name),
            Self::AlreadyInstalled => write!(f, "A global subscriber is already installed"),
            Self::Reload(msg) => write!(f, "Failed to change log level: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Severity, most severe first. `Emergency < Debug`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl LogLevel {
    pub const ALL: [LogLevel; 8] = [
        Self::Emergency,
        Self::Alert,
        Self::Critical,
        Self::Error,
        Self::Warning,
        Self::Notice,
        Self::Info,
        Self::Debug,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::Alert => "alert",
            Self::Critical => "critical",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Notice => "notice",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    /// The `tracing` level this severity is emitted at.
    pub fn tracing_level(&self) -> tracing::Level {
        match self {
            Self::Emergency | Self::Alert | Self::Critical | Self::Error => tracing::Level::ERROR,
            Self::Warning => tracing::Level::WARN,
            Self::Notice | Self::Info => tracing::Level::INFO,
            Self::Debug => tracing::Level::DEBUG,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.name() == s)
            .ok_or_else(|| Error::UnknownLevel(s.to_string()))
    }
}

/// How much the process wants to hear.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Interest {
    None,
    Level(LogLevel),
    All,
}

impl Interest {
    /// Whether a message at `level` is emitted.
    pub fn permits(&self, level: LogLevel) -> bool {
        match self {
            Self::None => false,
            Self::Level(threshold) => level <= *threshold,
            Self::All => true,
        }
    }

    fn directive(&self) -> &'static str {
        match self {
            Self::None => "off",
            Self::All => "trace",
            Self::Level(level) => match level.tracing_level() {
                tracing::Level::ERROR => "error",
                tracing::Level::WARN => "warn",
                tracing::Level::INFO => "info",
                tracing::Level::DEBUG => "debug",
                tracing::Level::TRACE => "trace",
            },
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::new(self.directive())
    }
}

impl Default for Interest {
    fn default() -> Self {
        Self::Level(LogLevel::Info)
    }
}

impl FromStr for Interest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "none" => Ok(Self::None),
            other => other.parse().map(Self::Level),
        }
    }
}

/// Changes the installed subscriber's level.
#[derive(Clone)]
pub struct LogHandle {
    inner: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    pub fn set_level(&self, interest: Interest) -> Result<()> {
        self.inner
            .reload(interest.filter())
            .map_err(|e| Error::Reload(e.to_string()))
    }
}

/// Installs the global subscriber at `interest` and returns its level handle.
///
/// Fails if the process already has a global subscriber.
pub fn init(interest: Interest) -> Result<LogHandle> {
    let (filter, inner) = reload::Layer::new(interest.filter());
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|_| Error::AlreadyInstalled)?;
    Ok(LogHandle { inner })
}
