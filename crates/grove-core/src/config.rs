use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that disables reuse of an existing lock profile.
pub const USE_LOCK_ENV: &str = "GROVE_USE_LOCK";

/// Environment variable that forces fresh resolution and rewrites the lock.
pub const UPDATE_LOCK_ENV: &str = "GROVE_UPDATE_LOCK";

/// Runtime configuration for grove.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,

    /// Channel (dev, nightly, stable) - affects cache paths.
    pub channel: Channel,

    /// Load an existing lock profile instead of resolving.
    pub use_lock: bool,

    /// Resolve fresh even if a lock profile exists, then overwrite it.
    pub update_lock: bool,
}

/// Release channel for cache/data directory namespacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Stable,
    Nightly,
    Dev,
}

impl Channel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Nightly => "nightly",
            Self::Dev => "dev",
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
            channel: Channel::default(),
            use_lock: true,
            update_lock: false,
        }
    }
}

/// Parse a boolean-ish environment value (`1`, `true`, `yes`, `on`).
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Apply `GROVE_USE_LOCK` / `GROVE_UPDATE_LOCK` from the environment.
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn with_env_flags(mut self) -> Self {
        if let Some(flag) = std::env::var(USE_LOCK_ENV).ok().as_deref().and_then(parse_flag) {
            self.use_lock = flag;
        }
        if let Some(flag) = std::env::var(UPDATE_LOCK_ENV)
            .ok()
            .as_deref()
            .and_then(parse_flag)
        {
            self.update_lock = flag;
        }
        self
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Set channel.
    #[must_use]
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    /// Set whether an existing lock profile may be reused.
    #[must_use]
    pub fn with_use_lock(mut self, use_lock: bool) -> Self {
        self.use_lock = use_lock;
        self
    }

    /// Set whether the lock profile is rewritten from a fresh resolution.
    #[must_use]
    pub fn with_update_lock(mut self, update_lock: bool) -> Self {
        self.update_lock = update_lock;
        self
    }
}
