//! Layered configuration
//!
//! Settings are merged from, in increasing precedence:
//! 1. Built-in defaults
//! 2. User config (`~/.config/channels/config.toml`)
//! 3. Command-line flags

mod defaults;
mod effective;
mod merge;

pub use defaults::BuiltinDefaults;
pub use effective::{default_user_config_path, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};
