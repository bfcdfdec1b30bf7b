//! Runtime configuration.
//!
//! Resolved once at startup and passed into [`crate::Clinic`]. Operations
//! never read the environment themselves.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;

use crate::{ClinicError, ClinicResult};

/// Default inactivity window after which an active visit is ended.
pub const DEFAULT_VISIT_TIMEOUT_MINUTES: u32 = 30;

pub const ENV_VISIT_TIMEOUT_MINUTES: &str = "CLINIC_VISIT_TIMEOUT_MINUTES";
pub const ENV_DATABASE_PATH: &str = "CLINIC_DATABASE_PATH";

/// Clinic configuration resolved at startup.
///
/// Deserialization goes through [`ClinicConfig::new`], so a config file is
/// held to the same rules as code.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "ConfigFile")]
pub struct ClinicConfig {
    visit_timeout_minutes: u32,
    /// `None` keeps everything in memory
    database_path: Option<PathBuf>,
}

/// On-disk shape of [`ClinicConfig`]; missing keys take the defaults.
#[derive(Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ConfigFile {
    visit_timeout_minutes: u32,
    database_path: Option<PathBuf>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            visit_timeout_minutes: DEFAULT_VISIT_TIMEOUT_MINUTES,
            database_path: None,
        }
    }
}

impl TryFrom<ConfigFile> for ClinicConfig {
    type Error = ClinicError;

    fn try_from(file: ConfigFile) -> Result<Self, Self::Error> {
        Self::new(file.visit_timeout_minutes, file.database_path)
    }
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            visit_timeout_minutes: DEFAULT_VISIT_TIMEOUT_MINUTES,
            database_path: None,
        }
    }
}

impl ClinicConfig {
    pub fn new(visit_timeout_minutes: u32, database_path: Option<PathBuf>) -> ClinicResult<Self> {
        if visit_timeout_minutes == 0 {
            return Err(ClinicError::Validation(
                "visit timeout must be at least one minute".into(),
            ));
        }
        if database_path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            return Err(ClinicError::Validation("database path cannot be empty".into()));
        }

        Ok(Self {
            visit_timeout_minutes,
            database_path,
        })
    }

    /// Read `CLINIC_VISIT_TIMEOUT_MINUTES` and `CLINIC_DATABASE_PATH`.
    pub fn from_env() -> ClinicResult<Self> {
        Self::from_env_values(
            std::env::var(ENV_VISIT_TIMEOUT_MINUTES).ok(),
            std::env::var(ENV_DATABASE_PATH).ok(),
        )
    }

    /// Build from raw environment values. Blank values fall back to defaults.
    pub fn from_env_values(timeout: Option<String>, database_path: Option<String>) -> ClinicResult<Self> {
        let timeout = timeout
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(|v| {
                v.parse::<u32>().map_err(|_| {
                    ClinicError::Validation(format!("{} is not a number: '{}'", ENV_VISIT_TIMEOUT_MINUTES, v))
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_VISIT_TIMEOUT_MINUTES);

        let database_path = database_path
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Self::new(timeout, database_path)
    }

    pub fn visit_inactivity_timeout(&self) -> Duration {
        Duration::minutes(i64::from(self.visit_timeout_minutes))
    }

    pub fn database_path(&self) -> Option<&Path> {
        self.database_path.as_deref()
    }
}
