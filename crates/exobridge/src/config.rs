//! # Node Configuration
//!
//! Everything needed to launch and talk to one remote runtime. A
//! [`NodeConfig`] is built either with the `with_*` methods or from an
//! options document through serde. Unknown option names are rejected before
//! any process is launched.

use std::ffi::OsStr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Deserializer;

/// Executable looked up on `PATH` when none is configured.
pub const DEFAULT_EXECUTABLE: &str = "java";

/// Main class the remote runtime starts with.
pub const DEFAULT_ENTRY_POINT: &str = "exobridge.Node";

/// Environment variable holding the base classpath, in platform path-list syntax.
pub const CLASSPATH_ENV: &str = "EXOBRIDGE_CLASSPATH";

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_PING_RETRY: Duration = Duration::from_millis(5_000);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1_000);
pub const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An option name the bridge does not know.
    Unknown(String),
    /// A known option with an unusable value.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(name) => write!(f, "unknown option: {}", name),
            Self::Invalid(msg) => write!(f, "invalid option: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// How remote exceptions reach the caller.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultMode {
    /// Returned as [`Value::Fault`](crate::value::Value::Fault).
    AsValue,
    /// Returned as [`Error::RemoteFault`](crate::error::Error::RemoteFault).
    #[default]
    AsError,
}

/// Upper bound on how long a call waits for its reply.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "TimeoutRepr")]
pub enum CallTimeout {
    After(Duration),
    Infinite,
}

impl CallTimeout {
    pub fn millis(ms: u64) -> Self {
        Self::After(Duration::from_millis(ms))
    }

    /// `None` when the call may wait forever.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Self::After(limit) => Some(*limit),
            Self::Infinite => None,
        }
    }
}

impl Default for CallTimeout {
    fn default() -> Self {
        Self::After(DEFAULT_CALL_TIMEOUT)
    }
}

/// Either a millisecond count or the word `infinity`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TimeoutRepr {
    Millis(u64),
    Word(String),
}

impl TryFrom<TimeoutRepr> for CallTimeout {
    type Error = String;

    fn try_from(repr: TimeoutRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            TimeoutRepr::Millis(ms) => Ok(Self::millis(ms)),
            TimeoutRepr::Word(w) if w == "infinity" || w == "infinite" => Ok(Self::Infinite),
            TimeoutRepr::Word(w) => Err(format!("call_timeout must be milliseconds or \"infinity\", got {:?}", w)),
        }
    }
}

/// Launch and session settings for one remote runtime.
///
/// Immutable once the node is connected; `recreate` reuses it as is.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeConfig {
    /// Symbolic name, used for lookup and in diagnostics.
    pub name: Option<String>,
    /// Base classpath. Defaults to the discovered base path.
    pub classpath: Vec<PathBuf>,
    /// Entries appended after `classpath`.
    pub add_to_classpath: Vec<PathBuf>,
    pub executable: PathBuf,
    pub entry_point: String,
    /// Passed through to the remote runtime untouched.
    pub verbosity: Option<String>,
    pub fault_mode: FaultMode,
    /// Default for calls whose context sets no override.
    pub call_timeout: CallTimeout,
    /// Address the session listener binds to.
    pub host: String,
    pub max_attempts: u32,
    pub ping_interval: Duration,
    pub ping_retry: Duration,
    pub connect_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: None,
            classpath: discover_classpath(),
            add_to_classpath: Vec::new(),
            executable: discover_executable(),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            verbosity: None,
            fault_mode: FaultMode::default(),
            call_timeout: CallTimeout::default(),
            host: DEFAULT_HOST.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            ping_interval: DEFAULT_PING_INTERVAL,
            ping_retry: DEFAULT_PING_RETRY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl NodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_classpath<I, P>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.classpath = entries.into_iter().map(Into::into).collect();
        self
    }

    pub fn add_to_classpath(mut self, entry: impl Into<PathBuf>) -> Self {
        self.add_to_classpath.push(entry.into());
        self
    }

    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    pub fn with_verbosity(mut self, verbosity: impl Into<String>) -> Self {
        self.verbosity = Some(verbosity.into());
        self
    }

    pub fn with_fault_mode(mut self, mode: FaultMode) -> Self {
        self.fault_mode = mode;
        self
    }

    pub fn with_call_timeout(mut self, timeout: CallTimeout) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_ping_retry(mut self, deadline: Duration) -> Self {
        self.ping_retry = deadline;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builds a validated config from an options document.
    ///
    /// Works with any serde format; option names are those of the struct
    /// fields, with `*_ms` spellings for the handshake durations.
    pub fn from_options<'de, D>(options: D) -> Result<Self>
    where
        D: Deserializer<'de>,
    {
        let options = Options::deserialize(options).map_err(|e| classify(&e.to_string()))?;
        let config = options.apply(Self::default());
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.ping_interval.is_zero() {
            return Err(ConfigError::Invalid("ping_interval must be positive".into()));
        }
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.entry_point.is_empty() {
            return Err(ConfigError::Invalid("entry_point must not be empty".into()));
        }
        if self.name.as_deref() == Some("") {
            return Err(ConfigError::Invalid("name must not be empty".into()));
        }
        if self.executable.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("executable must not be empty".into()));
        }
        Ok(())
    }

    /// Classpath in launch order: base entries, then appended ones.
    pub fn classpath_entries(&self) -> impl Iterator<Item = &Path> {
        self.classpath
            .iter()
            .chain(self.add_to_classpath.iter())
            .map(PathBuf::as_path)
    }
}

/// Raw options as they arrive from the outside.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Options {
    name: Option<String>,
    classpath: Option<Vec<PathBuf>>,
    add_to_classpath: Option<Vec<PathBuf>>,
    executable: Option<PathBuf>,
    entry_point: Option<String>,
    verbosity: Option<String>,
    fault_mode: Option<FaultMode>,
    call_timeout: Option<CallTimeout>,
    host: Option<String>,
    max_attempts: Option<u32>,
    ping_interval_ms: Option<u64>,
    ping_retry_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
}

impl Options {
    fn apply(self, mut config: NodeConfig) -> NodeConfig {
        if let Some(name) = self.name {
            config.name = Some(name);
        }
        if let Some(classpath) = self.classpath {
            config.classpath = classpath;
        }
        if let Some(extra) = self.add_to_classpath {
            config.add_to_classpath = extra;
        }
        if let Some(executable) = self.executable {
            config.executable = executable;
        }
        if let Some(entry_point) = self.entry_point {
            config.entry_point = entry_point;
        }
        if let Some(verbosity) = self.verbosity {
            config.verbosity = Some(verbosity);
        }
        if let Some(mode) = self.fault_mode {
            config.fault_mode = mode;
        }
        if let Some(timeout) = self.call_timeout {
            config.call_timeout = timeout;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(attempts) = self.max_attempts {
            config.max_attempts = attempts;
        }
        if let Some(ms) = self.ping_interval_ms {
            config.ping_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.ping_retry_ms {
            config.ping_retry = Duration::from_millis(ms);
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(ms);
        }
        config
    }
}

/// Maps a serde message onto the config error kinds.
fn classify(message: &str) -> ConfigError {
    match message.strip_prefix("unknown field `") {
        Some(rest) => {
            let name = rest.split('`').next().unwrap_or(rest);
            ConfigError::Unknown(name.to_string())
        }
        None => ConfigError::Invalid(message.to_string()),
    }
}

/// Base classpath from [`CLASSPATH_ENV`], or nothing.
pub fn discover_classpath() -> Vec<PathBuf> {
    match std::env::var_os(CLASSPATH_ENV) {
        Some(paths) => std::env::split_paths(&paths)
            .filter(|p| !p.as_os_str().is_empty())
            .collect(),
        None => Vec::new(),
    }
}

/// The first `java` found on `PATH`, or the bare name.
pub fn discover_executable() -> PathBuf {
    find_on_path(DEFAULT_EXECUTABLE, std::env::var_os("PATH").as_deref())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_EXECUTABLE))
}

fn find_on_path(program: &str, path: Option<&OsStr>) -> Option<PathBuf> {
    let path = path?;
    std::env::split_paths(path)
        .flat_map(|dir| candidates(&dir, program))
        .find(|candidate| candidate.is_file())
}

#[cfg(windows)]
fn candidates(dir: &Path, program: &str) -> Vec<PathBuf> {
    vec![dir.join(format!("{}.exe", program)), dir.join(program)]
}

#[cfg(not(windows))]
fn candidates(dir: &Path, program: &str) -> Vec<PathBuf> {
    vec![dir.join(program)]
}
