//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{RepoCacheError, RepoCacheResult};
use crate::ui::{self, UiContext};
use std::path::PathBuf;

/// Keys accepted by `config set`
const VALID_KEYS: &[&str] = &[
    "general.log_format",
    "general.audit_log",
    "storage.base_dir",
    "storage.state_dir",
    "cache.ttl_secs",
    "cache.sweep_interval_secs",
    "analysis.tool",
    "analysis.fixed_args",
    "analysis.timeout_secs",
    "analysis.default_max_tokens",
    "github.host",
    "github.api_base",
    "github.request_timeout_secs",
    "git.clone_timeout_secs",
];

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    manager: &ConfigManager,
    config: &Config,
) -> RepoCacheResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => set_value(manager, &key, &value).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> RepoCacheResult<()> {
    // Never echo the token back
    let mut shown = config.clone();
    if shown.github.token.is_some() {
        shown.github.token = Some("********".to_string());
    }
    println!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> RepoCacheResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail(&ctx, "Configuration initialized", &path.display().to_string());

    Ok(())
}

/// Update one key in the config file. Env overrides are not written back.
async fn set_value(manager: &ConfigManager, key: &str, value: &str) -> RepoCacheResult<()> {
    let mut config = if manager.path().exists() {
        manager.load_from_file(manager.path()).await?
    } else {
        Config::default()
    };

    apply(&mut config, key, value).map_err(|reason| RepoCacheError::ConfigInvalid {
        path: manager.path().to_path_buf(),
        reason,
    })?;
    manager.save(&config).await?;

    let ctx = UiContext::detect();
    ui::step_ok(&ctx, &format!("Set {} = {}", key, value));
    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<(), String> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "log_format"] => match value {
            "text" | "json" => config.general.log_format = value.to_string(),
            _ => return Err(format!("log_format must be text or json, got '{}'", value)),
        },
        ["general", "audit_log"] => config.general.audit_log = parse_bool(value)?,

        ["storage", "base_dir"] => config.storage.base_dir = Some(PathBuf::from(value)),
        ["storage", "state_dir"] => config.storage.state_dir = Some(PathBuf::from(value)),

        ["cache", "ttl_secs"] => config.cache.ttl_secs = parse_secs(value)?,
        ["cache", "sweep_interval_secs"] => config.cache.sweep_interval_secs = parse_secs(value)?,

        ["analysis", "tool"] => config.analysis.tool = value.to_string(),
        ["analysis", "fixed_args"] => {
            config.analysis.fixed_args = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        ["analysis", "timeout_secs"] => config.analysis.timeout_secs = parse_secs(value)?,
        ["analysis", "default_max_tokens"] => {
            config.analysis.default_max_tokens = match value.parse() {
                Ok(n) if n > 0 => n,
                _ => return Err(format!("default_max_tokens must be positive, got '{}'", value)),
            }
        }

        ["github", "host"] => config.github.host = value.to_string(),
        ["github", "api_base"] => config.github.api_base = value.to_string(),
        ["github", "request_timeout_secs"] => {
            config.github.request_timeout_secs = parse_secs(value)?
        }

        ["git", "clone_timeout_secs"] => config.git.clone_timeout_secs = parse_secs(value)?,

        _ => {
            return Err(format!(
                "unknown key '{}'; valid keys: {}",
                key,
                VALID_KEYS.join(", ")
            ))
        }
    }

    Ok(())
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(format!("invalid boolean value '{}', use true/false", value)),
    }
}

fn parse_secs(value: &str) -> Result<u64, String> {
    value
        .parse()
        .map_err(|_| format!("expected a whole number of seconds, got '{}'", value))
}
