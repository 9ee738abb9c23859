//! Engine configuration
//!
//! Sources, lowest priority first:
//! 1. Built-in defaults
//! 2. A TOML file (`config_path`, `CONTAN_CONFIG_PATH`, or `contan.toml` in
//!    the working directory if present)
//! 3. `CONTAN_*` environment variables, after loading `.env`
//! 4. Values set on the builder

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Runtime settings for an `Engine`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads besides main available to `async` blocks
    pub async_threads: usize,

    /// How long shutdown waits for each thread's queue to drain
    pub shutdown_grace_ms: u64,

    /// Prefix for worker thread names (`contan-main`, `contan-async-0`, ...)
    pub thread_name_prefix: String,

    /// Tracing filter `Engine::with_config` installs when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            async_threads: 1,
            shutdown_grace_ms: 1000,
            thread_name_prefix: "contan".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.async_threads == 0 {
            bail!("async_threads must be at least 1");
        }
        if self.thread_name_prefix.trim().is_empty() {
            bail!("thread_name_prefix must not be empty");
        }
        Ok(())
    }

    /// Effective configuration as TOML, e.g. to write a starter file
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration as TOML")
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    async_threads: Option<usize>,
    shutdown_grace_ms: Option<u64>,
    thread_name_prefix: Option<String>,
    log_filter: Option<String>,
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn async_threads(mut self, threads: usize) -> Self {
        self.async_threads = Some(threads);
        self
    }

    pub fn shutdown_grace_ms(mut self, millis: u64) -> Self {
        self.shutdown_grace_ms = Some(millis);
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = Some(prefix.into());
        self
    }

    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();

        let config_path = self
            .config_path
            .or_else(|| std::env::var("CONTAN_CONFIG_PATH").ok().map(PathBuf::from));

        let mut builder = config::Config::builder();
        builder = match &config_path {
            Some(path) => builder.add_source(config::File::from(path.as_path()).required(true)),
            None => builder.add_source(config::File::with_name("contan").required(false)),
        };
        builder = builder.add_source(
            config::Environment::with_prefix("CONTAN")
                .try_parsing(true)
                .ignore_empty(true),
        );

        if let Some(threads) = self.async_threads {
            builder = builder.set_override("async_threads", threads as i64)?;
        }
        if let Some(millis) = self.shutdown_grace_ms {
            builder = builder.set_override("shutdown_grace_ms", millis as i64)?;
        }
        if let Some(prefix) = self.thread_name_prefix {
            builder = builder.set_override("thread_name_prefix", prefix)?;
        }
        if let Some(filter) = self.log_filter {
            builder = builder.set_override("log_filter", filter)?;
        }

        let config: EngineConfig = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use uuid::Uuid;

    fn temp_config(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("contan-{}.toml", Uuid::new_v4()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.async_threads, 1);
        assert_eq!(config.shutdown_grace(), Duration::from_millis(1000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_values_and_builder_overrides() {
        let path = temp_config("async_threads = 3\nthread_name_prefix = \"batch\"\n");

        let config = EngineConfig::builder()
            .config_path(Some(path.clone()))
            .shutdown_grace_ms(250)
            .build()
            .unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(config.async_threads, 3);
        assert_eq!(config.thread_name_prefix, "batch");
        assert_eq!(config.shutdown_grace_ms, 250);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_zero_async_threads_rejected() {
        let path = temp_config("async_threads = 0\n");

        let result = EngineConfig::builder().config_path(Some(path.clone())).build();
        fs::remove_file(&path).unwrap();

        assert!(result.is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("contan-missing-{}.toml", Uuid::new_v4()));
        assert!(EngineConfig::builder().config_path(Some(path)).build().is_err());
    }

    #[test]
    fn test_toml_rendering_reloads() {
        let config = EngineConfig {
            async_threads: 2,
            ..EngineConfig::default()
        };
        let path = temp_config(&config.to_toml().unwrap());

        let reloaded = EngineConfig::builder().config_path(Some(path.clone())).build().unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(reloaded, config);
    }
}
