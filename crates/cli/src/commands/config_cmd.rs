//! `lorebot config`: print the default configuration or its location.

use std::path::PathBuf;

use lorebot_config::AppConfig;

pub fn run(config: Option<&PathBuf>, show_path: bool) {
    if show_path {
        let path = config.cloned().unwrap_or_else(AppConfig::default_path);
        println!("{}", path.display());
    } else {
        println!("{}", AppConfig::default_toml());
    }
}
