//! Configuration loading and env substitution.
//!
//! Config files: `zenor.toml`, `zenor.yaml`, `zenor.yml` or `zenor.json`,
//! searched in `./` then `~/.config/zenor/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values, and the legacy
//! bot environment variables (`SESSION_ID`, `MODE`, `AUTO_REACT`, …) as
//! overrides.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{
        BotConfig, BotMode, CacheConfig, ReactionConfig, ReconnectConfig, SessionConfig,
        SidecarConfig, StatusConfig, WelcomeConfig, ZenorConfig,
    },
};
