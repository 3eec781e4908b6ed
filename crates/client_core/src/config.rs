use std::{fs, path::Path, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use url::Url;

use crate::controller::{
    ReorderTimings, DEFAULT_DEBOUNCE, DEFAULT_ERROR_DISPLAY, DEFAULT_SUCCESS_DISPLAY,
};

pub const DEFAULT_CLIENT_SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: String,
    pub debounce_ms: u64,
    pub success_display_ms: u64,
    pub error_display_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            success_display_ms: DEFAULT_SUCCESS_DISPLAY.as_millis() as u64,
            error_display_ms: DEFAULT_ERROR_DISPLAY.as_millis() as u64,
        }
    }
}

impl ClientSettings {
    pub fn timings(&self) -> ReorderTimings {
        ReorderTimings {
            debounce: Duration::from_millis(self.debounce_ms),
            success_display: Duration::from_millis(self.success_display_ms),
            error_display: Duration::from_millis(self.error_display_ms),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    reorder_debounce_ms: Option<u64>,
    success_display_ms: Option<u64>,
    error_display_ms: Option<u64>,
}

pub fn load_client_settings() -> Result<ClientSettings> {
    load_client_settings_from(Path::new(DEFAULT_CLIENT_SETTINGS_FILE), |key| {
        std::env::var(key).ok()
    })
}

/// Defaults, then the settings file, then environment variables. The
/// resulting server url is validated.
pub fn load_client_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientSettings> {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        let file_cfg: FileSettings = toml::from_str(&raw)
            .with_context(|| format!("invalid client settings in {}", path.display()))?;
        if let Some(v) = file_cfg.server_url {
            settings.server_url = v;
        }
        if let Some(v) = file_cfg.reorder_debounce_ms {
            settings.debounce_ms = v;
        }
        if let Some(v) = file_cfg.success_display_ms {
            settings.success_display_ms = v;
        }
        if let Some(v) = file_cfg.error_display_ms {
            settings.error_display_ms = v;
        }
    }

    if let Some(v) = env("APP__SERVER_URL") {
        settings.server_url = v;
    }
    for (key, slot) in [
        ("APP__REORDER_DEBOUNCE_MS", &mut settings.debounce_ms),
        ("APP__SUCCESS_DISPLAY_MS", &mut settings.success_display_ms),
        ("APP__ERROR_DISPLAY_MS", &mut settings.error_display_ms),
    ] {
        if let Some(v) = env(key) {
            *slot = v
                .trim()
                .parse()
                .with_context(|| format!("{key} must be a number of milliseconds"))?;
        }
    }

    settings.server_url = validate_server_url(&settings.server_url)?;
    Ok(settings)
}

/// Accepts `http`/`https` urls with a host and returns them without a
/// trailing slash.
pub fn validate_server_url(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw.trim()).with_context(|| format!("invalid server url: {raw}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(anyhow!("server url must use http or https: {raw}"));
    }
    if parsed.host_str().is_none() {
        return Err(anyhow!("server url has no host: {raw}"));
    }
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}
