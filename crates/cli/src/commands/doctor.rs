//! `lorebot doctor`: diagnose configuration and storage.

use std::path::{Path, PathBuf};

use lorebot_config::AppConfig;
use lorebot_providers::build_provider;

pub async fn run(config_path: Option<&PathBuf>) -> anyhow::Result<()> {
    println!("Lorebot Doctor");
    println!("==============\n");

    let path = config_path.cloned().unwrap_or_else(AppConfig::default_path);
    let mut issues = 0;

    if path.exists() {
        println!("  ✅ Config file found at {}", path.display());
    } else {
        println!("  ⚠️  No config file at {}, using defaults", path.display());
        issues += 1;
    }

    let mut config = match AppConfig::load_from(&path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ {e}");
            return Err(e.into());
        }
    };
    config.apply_env();

    if config.discord.bot_token.is_some() {
        println!("  ✅ Discord bot token configured");
    } else {
        println!("  ❌ No bot token: set discord.bot_token or DISCORD_BOT_TOKEN");
        issues += 1;
    }
    if config.discord.guild_id == 0 || config.discord.bot_user_id == 0 {
        println!("  ⚠️  discord.guild_id and discord.bot_user_id should both be set");
        issues += 1;
    }

    if !config.ai.enabled {
        println!("  ✅ AI answers disabled; replies list corpus segments");
    } else {
        match build_provider(&config) {
            Ok(provider) => match provider.health_check().await {
                Ok(true) => println!("  ✅ {} reachable ({})", provider.name(), config.ai.model),
                Ok(false) => {
                    println!("  ⚠️  {} answered but rejected the health check", provider.name());
                    issues += 1;
                }
                Err(e) => {
                    println!("  ❌ {} unreachable: {e}", provider.name());
                    issues += 1;
                }
            },
            Err(e) => {
                println!("  ❌ {e}: set LOREBOT_API_KEY or GROQ_API_KEY");
                issues += 1;
            }
        }
    }

    let data_dir = &config.storage.data_dir;
    if data_dir.is_dir() {
        println!("  ✅ Data directory {}", data_dir.display());
    } else {
        println!("  ⚠️  Data directory {} does not exist", data_dir.display());
        issues += 1;
    }

    let persisted = [
        ("blocked", &config.groups.blocked_path),
        ("trusted", &config.groups.trusted_path),
        ("permitting", &config.groups.permitting_path),
        ("cache", &config.cache.filepath),
        ("corpus", &config.corpus.path),
        ("corpus requests", &config.requests.corpus_path),
        ("permitting requests", &config.requests.permitting_path),
    ];
    for (name, path) in persisted {
        match path {
            Some(path) => println!("  {} {name}: {}", status(path), path.display()),
            None => println!("  ·  {name}: no default path"),
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

fn status(path: &Path) -> &'static str {
    if path.exists() { "✅" } else { "·  (new)" }
}
