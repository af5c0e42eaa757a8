use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Empty for "fake" instances that only contribute a known type.
    pub database: String,
    pub socket: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl ConnectionConfig {
    pub fn is_real(&self) -> bool {
        !self.database.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Execute and commit.
    #[default]
    Commit,
    /// Execute, then roll everything back.
    Dry,
    /// Run checks and print statements without executing them.
    Print,
    /// Only report alterscripts that are not applied yet.
    Look,
}

impl RunMode {
    pub fn commits(self) -> bool {
        matches!(self, Self::Commit)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Dry => "dry",
            Self::Print => "print",
            Self::Look => "look",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "commit" | "sharp" => Ok(Self::Commit),
            "dry" => Ok(Self::Dry),
            "print" => Ok(Self::Print),
            "look" => Ok(Self::Look),
            other => Err(format!(
                "unknown run mode `{other}`; expected commit, dry, print or look"
            )),
        }
    }
}

/// Per-run switches supplied by the caller of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    pub run_mode: RunMode,
    pub ignore_failures: bool,
    pub username: String,
    /// Overrides the environment declared by the database configuration.
    pub environment: Option<String>,
    pub incremental: bool,
    pub use_log_table: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            run_mode: RunMode::Commit,
            ignore_failures: false,
            username: String::new(),
            environment: None,
            incremental: false,
            use_log_table: true,
        }
    }
}

impl ApplyOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.incremental && !self.use_log_table {
            return Err(ConfigError::IncrementalWithoutLogTable);
        }
        Ok(())
    }

    /// Options for the built-in log table alterscripts: always committed,
    /// never incremental, failures never ignored.
    #[must_use]
    pub fn internal(&self) -> Self {
        Self {
            run_mode: RunMode::Commit,
            ignore_failures: false,
            incremental: false,
            use_log_table: false,
            environment: None,
            username: self.username.clone(),
        }
    }
}
