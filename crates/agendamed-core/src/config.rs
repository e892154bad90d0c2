//! Configuration loaded from a TOML file with sensible defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgendamedConfig {
    /// Named time zone all date/time strings are interpreted in.
    pub timezone: String,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Job store path; separate file from the main database so the worker
    /// process can run against it independently.
    pub path: String,
    /// Total attempts per job, including the first.
    pub max_attempts: u32,
    /// Base delay for exponential backoff; attempt N waits base × 2^(N-1).
    pub backoff_base_ms: u64,
    /// Completed job records retained for inspection (FIFO eviction).
    pub keep_completed: usize,
    /// Failed job records retained for diagnosis (FIFO eviction).
    pub keep_failed: usize,
    /// Worker poll interval when the queue is idle.
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum concurrent in-flight jobs.
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl Default for AgendamedConfig {
    fn default() -> Self {
        Self {
            timezone: "America/Sao_Paulo".into(),
            database: DatabaseConfig::default(),
            queue: QueueConfig::default(),
            worker: WorkerConfig::default(),
            smtp: SmtpConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "agendamed.db".into(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: "agendamed-jobs.db".into(),
            max_attempts: 3,
            backoff_base_ms: 2000,
            keep_completed: 10,
            keep_failed: 5,
            poll_interval_ms: 500,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { concurrency: 5 }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from: "noreply@agendamed.local".into(),
        }
    }
}

impl AgendamedConfig {
    /// Load configuration from a TOML file; missing keys fall back to
    /// defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| AppError::Config(format!("Invalid config file: {e}")))
    }

    /// Load from `path` if it exists, otherwise return defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgendamedConfig::default();
        assert_eq!(config.timezone, "America/Sao_Paulo");
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.queue.backoff_base_ms, 2000);
        assert_eq!(config.queue.keep_completed, 10);
        assert_eq!(config.queue.keep_failed, 5);
        assert_eq!(config.worker.concurrency, 5);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agendamed.toml");
        std::fs::write(&path, "[worker]\nconcurrency = 2\n").unwrap();

        let config = AgendamedConfig::load(&path).unwrap();
        assert_eq!(config.worker.concurrency, 2);
        // Untouched sections keep their defaults
        assert_eq!(config.queue.max_attempts, 3);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = AgendamedConfig::load_or_default(Path::new("/nonexistent/agendamed.toml"));
        assert_eq!(config.unwrap().timezone, "America/Sao_Paulo");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "timezone = [").unwrap();
        assert!(matches!(
            AgendamedConfig::load(&path),
            Err(AppError::Config(_))
        ));
    }
}
