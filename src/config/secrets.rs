// API keys for the external collaborators
//
// Keys are resolved from the environment first, then from
// ~/.innovation-flow/secrets.toml. The file is never project-level.

use crate::utils::atomic_write;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable / secrets key for the generation API
pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
/// Environment variable / secrets key for the search API
pub const TAVILY_API_KEY: &str = "TAVILY_API_KEY";

/// Secrets stored in ~/.innovation-flow/secrets.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    /// API keys indexed by variable name (e.g., "TAVILY_API_KEY" -> "tvly-...")
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

impl SecretsConfig {
    /// Get the secrets file path (~/.innovation-flow/secrets.toml)
    pub fn get_secrets_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".innovation-flow").join("secrets.toml"))
    }

    /// Load secrets from the default location
    pub fn load() -> Result<Self> {
        let path = Self::get_secrets_path()
            .ok_or_else(|| anyhow!("Could not determine home directory"))?;
        Self::load_from(&path)
    }

    /// Load secrets from an explicit file, returning empty secrets if it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read secrets file '{}': {}", path.display(), e))?;

        let config: SecretsConfig = toml::from_str(&contents)
            .map_err(|e| anyhow!("Failed to parse secrets file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Persist the keys, readable by the owner only on unix
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        atomic_write(path, &contents)
            .map_err(|e| anyhow!("Cannot store API keys in {}: {}", path.display(), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
        log::info!("API keys stored in {}", path.display());
        Ok(())
    }

    pub fn get_key(&self, name: &str) -> Option<&String> {
        self.api_keys.get(name)
    }

    /// Record the collaborator keys given on the command line; blank values are ignored.
    /// Returns whether anything changed.
    pub fn update_keys(&mut self, gemini: Option<&str>, tavily: Option<&str>) -> bool {
        let mut changed = false;
        for (name, value) in [(GEMINI_API_KEY, gemini), (TAVILY_API_KEY, tavily)] {
            if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
                self.api_keys.insert(name.to_string(), value.to_string());
                changed = true;
            }
        }
        changed
    }
}

/// Merge the given keys into the secrets file at `path`, keeping any other entries.
/// Returns false without touching the file when no key was given.
pub fn store_api_keys(path: &Path, gemini: Option<&str>, tavily: Option<&str>) -> Result<bool> {
    let mut secrets = SecretsConfig::load_from(path)?;
    if !secrets.update_keys(gemini, tavily) {
        return Ok(false);
    }
    secrets.save_to(path)?;
    Ok(true)
}

/// Resolve a secret: a non-empty environment variable wins over the secrets file
pub fn resolve_secret(name: &str, secrets: &SecretsConfig) -> Option<String> {
    if let Ok(value) = std::env::var(name) {
        if !value.trim().is_empty() {
            return Some(value);
        }
    }
    secrets
        .get_key(name)
        .filter(|v| !v.trim().is_empty())
        .cloned()
}
