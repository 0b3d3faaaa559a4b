pub mod list;
pub mod onboard;
pub mod run;

use std::path::Path;
use blockmind_config::AppConfig;

/// Load the config at `path`, or the default one.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, String> {
    let loaded = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    loaded.map_err(|e| format!("Failed to load config: {e}"))
}
