use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::core::SessionTimings;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub max_connections: NonZeroUsize,
    pub timings: SessionTimings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8473".to_string(),
            max_connections: NonZeroUsize::new(256).expect("nonzero"),
            timings: SessionTimings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub stdout_format: LogFormat,
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            stdout_format: LogFormat::Compact,
            filter: None,
        }
    }
}

/// One config file's worth of overrides on top of the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfigLayer {
    pub listen_addr: Option<String>,
    pub max_connections: Option<NonZeroUsize>,
    #[serde(default)]
    pub timings: TimingsOverride,
    #[serde(default)]
    pub logging: LoggingConfigOverride,
}

impl ConfigLayer {
    pub fn apply_to(&self, target: &mut Config) {
        if let Some(listen_addr) = self.listen_addr.as_ref() {
            target.listen_addr = listen_addr.clone();
        }
        if let Some(max_connections) = self.max_connections {
            target.max_connections = max_connections;
        }
        self.timings.apply_to(&mut target.timings);
        self.logging.apply_to(&mut target.logging);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TimingsOverride {
    pub activation_deadline_ms: Option<u64>,
    pub resume_grace_ms: Option<u64>,
    pub signon_deadline_ms: Option<u64>,
}

impl TimingsOverride {
    pub fn apply_to(&self, target: &mut SessionTimings) {
        if let Some(ms) = self.activation_deadline_ms {
            target.activation_deadline_ms = ms;
        }
        if let Some(ms) = self.resume_grace_ms {
            target.resume_grace_ms = ms;
        }
        if let Some(ms) = self.signon_deadline_ms {
            target.signon_deadline_ms = ms;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfigOverride {
    pub stdout: Option<bool>,
    pub stdout_format: Option<LogFormat>,
    pub filter: Option<String>,
}

impl LoggingConfigOverride {
    pub fn apply_to(&self, target: &mut LoggingConfig) {
        if let Some(stdout) = self.stdout {
            target.stdout = stdout;
        }
        if let Some(format) = self.stdout_format {
            target.stdout_format = format;
        }
        if let Some(filter) = self.filter.as_ref() {
            target.filter = Some(filter.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_overrides_only_what_it_names() {
        let layer: ConfigLayer = toml::from_str(
            r#"
            listen_addr = "0.0.0.0:9000"

            [timings]
            resume_grace_ms = 5000
            "#,
        )
        .unwrap();

        let mut config = Config::default();
        layer.apply_to(&mut config);

        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.timings.resume_grace_ms, 5_000);
        assert_eq!(
            config.timings.activation_deadline_ms,
            SessionTimings::default().activation_deadline_ms
        );
        assert_eq!(config.max_connections.get(), 256);
    }

    #[test]
    fn empty_layer_changes_nothing() {
        let mut config = Config::default();
        ConfigLayer::default().apply_to(&mut config);
        assert_eq!(config.listen_addr, Config::default().listen_addr);
    }
}
