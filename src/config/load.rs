use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::{Config, ConfigLayer};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub fn load_layer(path: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let mut config = Config::default();
    if let Some(layer) = load_layer(path)? {
        layer.apply_to(&mut config);
    }
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load, falling back to defaults on failure; write the default file on
/// first run so operators have something to edit.
pub fn load_or_init(path: &Path) -> Config {
    let had_config = path.exists();

    let config = match load(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("config load failed, using defaults: {e}");
            let mut config = Config::default();
            apply_env_overrides(&mut config);
            config
        }
    };

    if !had_config {
        if let Err(e) = write_config(path, &Config::default()) {
            tracing::warn!("failed to write default config: {e}");
        }
    }

    config
}

pub fn write_config(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }
    let contents = toml::to_string_pretty(config)?;
    atomic_write(path, contents.as_bytes())
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    let temp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    fs::write(temp.path(), data).map_err(write_err)?;
    temp.persist(path).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(listen) = std::env::var("TETHER_LISTEN_ADDR") {
        if !listen.is_empty() {
            config.listen_addr = listen;
        }
    }
    if let Some(max) = env_u64("TETHER_MAX_CONNECTIONS") {
        match NonZeroUsize::new(max as usize) {
            Some(max) => config.max_connections = max,
            None => tracing::warn!("TETHER_MAX_CONNECTIONS must be nonzero, ignoring"),
        }
    }
    if let Some(ms) = env_u64("TETHER_ACTIVATION_DEADLINE_MS") {
        config.timings.activation_deadline_ms = ms;
    }
    if let Some(ms) = env_u64("TETHER_RESUME_GRACE_MS") {
        config.timings.resume_grace_ms = ms;
    }
    if let Some(ms) = env_u64("TETHER_SIGNON_DEADLINE_MS") {
        config.timings.signon_deadline_ms = ms;
    }
    if let Ok(filter) = std::env::var("TETHER_LOG_FILTER") {
        if !filter.is_empty() {
            config.logging.filter = Some(filter);
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("{name}={raw} is not a valid integer, ignoring");
            None
        }
    }
}
