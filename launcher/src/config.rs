use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::LaunchError;

pub const DEFAULT_GROUND_ZEROES_PATH: &str = r"C:\Path\To\GroundZeroes.exe.lnk";
pub const DEFAULT_PHANTOM_PAIN_PATH: &str = r"C:\Path\To\PhantomPain.exe.lnk";

const CONFIG_HEADER: &str = "\
# MGS Launcher Configuration
# Edit paths to your game executables or shortcuts
";

/// The two programs the menu can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetId {
    GroundZeroes,
    PhantomPain,
}

impl TargetId {
    pub const ALL: [TargetId; 2] = [TargetId::GroundZeroes, TargetId::PhantomPain];
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetId::GroundZeroes => f.write_str("Ground Zeroes"),
            TargetId::PhantomPain => f.write_str("The Phantom Pain"),
        }
    }
}

/// A configured program or shortcut. An empty path means "unconfigured".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTarget {
    pub id: TargetId,
    pub path: String,
}

impl LaunchTarget {
    pub fn is_configured(&self) -> bool {
        !self.path.trim().is_empty()
    }
}

/// On-disk configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LaunchConfig {
    #[serde(rename = "ground.zeroes.path", default)]
    pub ground_zeroes_path: String,
    #[serde(rename = "phantom.pain.path", default)]
    pub phantom_pain_path: String,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            ground_zeroes_path: DEFAULT_GROUND_ZEROES_PATH.to_string(),
            phantom_pain_path: DEFAULT_PHANTOM_PAIN_PATH.to_string(),
        }
    }
}

impl LaunchConfig {
    pub fn target(&self, id: TargetId) -> LaunchTarget {
        let path = match id {
            TargetId::GroundZeroes => &self.ground_zeroes_path,
            TargetId::PhantomPain => &self.phantom_pain_path,
        };
        LaunchTarget {
            id,
            path: path.clone(),
        }
    }

    pub fn targets(&self) -> [LaunchTarget; 2] {
        TargetId::ALL.map(|id| self.target(id))
    }
}

/// Where the values returned by [`load`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from the existing file.
    File,
    /// Placeholders; `written` is false if the default file could not be saved.
    Defaults { written: bool },
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: LaunchConfig,
    pub source: ConfigSource,
}

/// Loads the config at `path`. Never fails: a missing file is created with
/// placeholder paths, and an unreadable or malformed file is replaced by one.
pub fn load(path: &Path) -> LoadedConfig {
    if path.exists() {
        match read_config(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                return LoadedConfig {
                    config,
                    source: ConfigSource::File,
                };
            }
            Err(e) => {
                let err = LaunchError::ConfigUnreadable {
                    path: path.to_path_buf(),
                    reason: format!("{e:#}"),
                };
                warn!("{err} (using defaults)");
            }
        }
    }

    let config = LaunchConfig::default();
    let written = match write_default(path, &config) {
        Ok(()) => {
            info!("Wrote default config to {}", path.display());
            true
        }
        Err(e) => {
            warn!("Failed to write default config: {e:#}");
            false
        }
    };
    LoadedConfig {
        config,
        source: ConfigSource::Defaults { written },
    }
}

fn read_config(path: &Path) -> Result<LaunchConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn write_default(path: &Path, config: &LaunchConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let body = toml::to_string_pretty(config).context("Failed to serialize default config")?;
    std::fs::write(path, format!("{CONFIG_HEADER}{body}"))
        .with_context(|| format!("Failed to write config file: {}", path.display()))
}
