use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use quarry_util::errors::QuarryError;

/// Resolver tuning loaded from `~/.quarry/config.toml`.
///
/// ```toml
/// max-concurrent-fetches = 8
/// prefetch-candidates = 4
/// prereleases = "if-necessary-or-explicit"
/// prefer-locked = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ResolverConfig {
    /// Upper bound on repository requests in flight at once.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// How many top candidates of a package get their metadata fetched
    /// ahead of the decision that needs it.
    #[serde(default = "default_prefetch_candidates")]
    pub prefetch_candidates: usize,

    #[serde(default)]
    pub prereleases: PrereleaseMode,

    /// Try locked versions before newer ones.
    #[serde(default = "default_prefer_locked")]
    pub prefer_locked: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            prefetch_candidates: default_prefetch_candidates(),
            prereleases: PrereleaseMode::default(),
            prefer_locked: default_prefer_locked(),
        }
    }
}

fn default_max_concurrent_fetches() -> usize {
    8
}

fn default_prefetch_candidates() -> usize {
    4
}

fn default_prefer_locked() -> bool {
    true
}

/// When pre-release and dev-release candidates are considered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrereleaseMode {
    /// Only when the requirement names a pre-release, or nothing else matches.
    #[default]
    IfNecessaryOrExplicit,
    Allow,
    Disallow,
}

impl ResolverConfig {
    /// Load from `~/.quarry/config.toml`, or return defaults if the file doesn't exist.
    pub fn load() -> miette::Result<Self> {
        let path = Self::default_path();
        if path.is_file() {
            Ok(Self::from_path(&path)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Load from an explicit file.
    pub fn from_path(path: &Path) -> Result<Self, QuarryError> {
        let content = std::fs::read_to_string(path).map_err(|e| QuarryError::Config {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, QuarryError> {
        let config: Self = toml::from_str(content).map_err(|e| QuarryError::Config {
            message: format!("Failed to parse resolver config: {e}"),
        })?;
        if config.max_concurrent_fetches == 0 {
            return Err(QuarryError::Config {
                message: "max-concurrent-fetches must be at least 1".to_string(),
            });
        }
        Ok(config)
    }

    /// Returns the default path to the config file.
    pub fn default_path() -> PathBuf {
        dirs_path().join("config.toml")
    }
}

/// Returns the path to the Quarry data directory (`~/.quarry/`).
pub fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".quarry")
}
