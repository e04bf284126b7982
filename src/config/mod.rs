//! Configuration schema and layered loading.

mod load;
mod schema;

pub use load::{apply_env_overrides, load, load_layer, load_or_init, write_config, ConfigError};
pub use schema::{
    Config, ConfigLayer, LogFormat, LoggingConfig, LoggingConfigOverride, TimingsOverride,
};
