use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const SANDBOX_URL: &str = "sandbox.url";
pub const SANDBOX_API_KEY: &str = "sandbox.api_key";
pub const TVU_URL: &str = "tvu.url";
pub const TVU_USERNAME: &str = "tvu.username";
pub const TVU_PASSWORD: &str = "tvu.password";
pub const TVU_TERM: &str = "tvu.term";

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tvu-chat").join("config.toml"))
}

/// Flat string settings persisted as TOML.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl ConfigStore {
    /// Load from `path`; a missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config at {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config at {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, values })
    }

    pub fn load_default() -> Result<Self> {
        let path = default_path().context("No config directory on this platform")?;
        Self::load(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str, default: &str) -> String {
        self.value(key).unwrap_or(default).to_string()
    }

    /// Stored value, treating blank as unset.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string(&self.values).context("Failed to serialize config")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write config to {}", self.path.display()))
    }
}

/// Hide all but the last four characters of a secret.
pub fn mask(value: &str) -> String {
    let count = value.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let tail: String = value.chars().skip(count - 4).collect();
    format!("{}{tail}", "*".repeat(count - 4))
}

pub fn is_secret(key: &str) -> bool {
    key.ends_with("password") || key.ends_with("api_key")
}
