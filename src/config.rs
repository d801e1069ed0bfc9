use crate::types::InstallerSettings;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::PathBuf;

pub const APP_NAME: &str = "commitify-installer";
pub const CONFIG_FILE_NAME: &str = "config.json";

pub fn get_config_file_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("COMMITIFY_INSTALLER_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    let path = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join(APP_NAME)
        .join(CONFIG_FILE_NAME);
    tracing::debug!("Config file path: {}", path.display());
    Ok(path)
}

pub fn get_home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))
}

pub fn load_settings() -> Result<InstallerSettings> {
    let config_path = get_config_file_path()?;

    let mut settings = if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Could not read config file at {}", config_path.display()))?;
        serde_json::from_str(&content).with_context(|| "Could not parse config file as JSON")?
    } else {
        InstallerSettings::default()
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn apply_env_overrides<F>(settings: &mut InstallerSettings, var: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(repo) = var("COMMITIFY_REPO") {
        settings.repo = repo;
    }

    if let Some(api_url) = var("COMMITIFY_API_URL") {
        settings.api_url = api_url;
    }

    if let Some(timeout) = var("COMMITIFY_HTTP_TIMEOUT") {
        settings.http_timeout_secs = timeout
            .parse()
            .with_context(|| format!("COMMITIFY_HTTP_TIMEOUT must be seconds, got '{}'", timeout))?;
    }

    Ok(())
}
