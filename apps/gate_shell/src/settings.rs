use std::{collections::HashMap, fs, path::Path};

use anyhow::{bail, Context};

pub const SETTINGS_FILE: &str = "gate_shell.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub log_filter: String,
    pub json_snapshots: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/gate_flags.sqlite3".into(),
            log_filter: "info".into(),
            json_snapshots: false,
        }
    }
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let mut settings = Settings::default();
    apply_file(&mut settings, Path::new(SETTINGS_FILE))?;
    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

/// Missing files are fine; an unreadable or malformed one is not.
pub fn apply_file(settings: &mut Settings, path: &Path) -> anyhow::Result<()> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(error) => {
            return Err(error).with_context(|| format!("failed to read '{}'", path.display()))
        }
    };
    let file_cfg = toml::from_str::<HashMap<String, String>>(&raw)
        .with_context(|| format!("'{}' must be a flat table of strings", path.display()))?;

    if let Some(v) = file_cfg.get("database_url") {
        settings.database_url = v.clone();
    }
    if let Some(v) = file_cfg.get("log_filter") {
        settings.log_filter = v.clone();
    }
    if let Some(v) = file_cfg.get("json_snapshots") {
        settings.json_snapshots = parse_flag(v)
            .with_context(|| format!("invalid json_snapshots in '{}'", path.display()))?;
    }
    Ok(())
}

pub fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("GATE_SHELL_DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("APP__DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
    if let Some(v) = lookup("APP__JSON_SNAPSHOTS") {
        if let Ok(parsed) = parse_flag(&v) {
            settings.json_snapshots = parsed;
        }
    }
}

fn parse_flag(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got '{other}'"),
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> String {
    storage::normalize_database_url(raw_database_url)
        .unwrap_or_else(|| Settings::default().database_url)
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
