//! # Configuration
//!
//! `merit.toml` plus environment overrides.
//!
//! Every section has defaults, so a missing file is fine. Environment
//! variables win over the file:
//!
//! - `MERIT_HOST`, `MERIT_PORT`
//! - `MERIT_STORAGE` (`redb` or `memory`), `MERIT_DATA_DIR`
//! - `MERIT_READ_TIMEOUT_SECS`, `MERIT_WRITE_TIMEOUT_SECS`
//! - `MERIT_DIRECTORY` (path to a TOML directory seed)
//! - `MERIT_API_KEY`, `MERIT_RATE_LIMIT`, `MERIT_CORS_ORIGINS`

use merit_core::primitives::{DEFAULT_READ_TIMEOUT_SECS, DEFAULT_WRITE_TIMEOUT_SECS};
use merit_core::{DirectorySeed, MeritError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default requests per second when rate limiting is not configured.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Maximum size of a config or directory file (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// SECTIONS
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub timeouts: TimeoutConfig,
    pub directory: DirectoryConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Which store implementations back the workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Redb,
    Memory,
}

impl StorageBackend {
    fn parse(raw: &str) -> Result<Self, MeritError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "redb" => Ok(Self::Redb),
            "memory" => Ok(Self::Memory),
            other => Err(MeritError::validation(
                "MERIT_STORAGE",
                format!("unknown backend '{}' (expected redb or memory)", other),
            )),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Redb => "redb",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Redb,
            data_dir: PathBuf::from("merit-data"),
        }
    }
}

/// Per-operation budgets in seconds. Reads cover list, get, history and
/// reports; everything that writes uses the write budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub read_secs: u64,
    pub write_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_secs: DEFAULT_READ_TIMEOUT_SECS,
            write_secs: DEFAULT_WRITE_TIMEOUT_SECS,
        }
    }
}

impl TimeoutConfig {
    #[must_use]
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    #[must_use]
    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// TOML seed with students, lecturers and advisor assignments. Without
    /// it the directory is empty and nobody resolves to a profile.
    pub path: Option<PathBuf>,
}

/// HTTP hardening knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Bearer key required on every route except `/health`. `None` disables
    /// authentication.
    pub api_key: Option<String>,
    /// Requests per second; 0 disables rate limiting.
    pub rate_limit: u32,
    /// Comma-separated origins, or `*`. `None` means localhost only.
    pub cors_origins: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            cors_origins: None,
        }
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl Config {
    /// Read `path` (if given and present), then apply process environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, MeritError> {
        let mut config = match path {
            Some(p) if p.exists() => Self::from_toml(&read_limited(p)?)?,
            Some(p) => {
                tracing::info!(path = %p.display(), "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, MeritError> {
        toml::from_str(raw).map_err(|e| MeritError::validation("config", e.to_string()))
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), MeritError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = var("MERIT_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("MERIT_PORT") {
            self.server.port = parse_number("MERIT_PORT", &port)?;
        }
        if let Some(backend) = var("MERIT_STORAGE") {
            self.storage.backend = StorageBackend::parse(&backend)?;
        }
        if let Some(dir) = var("MERIT_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(secs) = var("MERIT_READ_TIMEOUT_SECS") {
            self.timeouts.read_secs = parse_number("MERIT_READ_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = var("MERIT_WRITE_TIMEOUT_SECS") {
            self.timeouts.write_secs = parse_number("MERIT_WRITE_TIMEOUT_SECS", &secs)?;
        }
        if let Some(path) = var("MERIT_DIRECTORY") {
            self.directory.path = Some(PathBuf::from(path));
        }
        if let Some(key) = var("MERIT_API_KEY") {
            self.security.api_key = Some(key);
        }
        if let Some(rate) = var("MERIT_RATE_LIMIT") {
            self.security.rate_limit = parse_number("MERIT_RATE_LIMIT", &rate)?;
        }
        if let Some(origins) = var("MERIT_CORS_ORIGINS") {
            self.security.cors_origins = Some(origins);
        }
        Ok(())
    }

    /// Load the directory seed, or an empty one when no path is configured.
    pub fn directory_seed(&self) -> Result<DirectorySeed, MeritError> {
        let Some(path) = &self.directory.path else {
            tracing::warn!("no directory configured; no caller will resolve to a profile");
            return Ok(DirectorySeed::default());
        };
        toml::from_str(&read_limited(path)?)
            .map_err(|e| MeritError::validation("directory", e.to_string()))
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, MeritError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| MeritError::validation(key, e.to_string()))
}

fn read_limited(path: &Path) -> Result<String, MeritError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        MeritError::Storage(format!("cannot read '{}': {}", path.display(), e))
    })?;
    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(MeritError::validation(
            "config",
            format!(
                "'{}' is {} bytes, maximum is {}",
                path.display(),
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            ),
        ));
    }
    std::fs::read_to_string(path)
        .map_err(|e| MeritError::Storage(format!("cannot read '{}': {}", path.display(), e)))
}

// =============================================================================
// TESTS
// =============================================================================
