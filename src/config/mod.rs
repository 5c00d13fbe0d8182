//! Configuration management for winmap
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files. It combines the mapper's own settings with the
//! shell and per-application rules that feed the window policy.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration struct containing all winmap settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WinmapConfig {
    /// General process settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Window mapper behavior
    #[serde(default)]
    pub mapper: MapperConfig,

    /// Shell window detection
    #[serde(default)]
    pub shell: ShellConfig,

    /// Per-application chrome and tiling rules
    #[serde(default)]
    pub applications: ApplicationsConfig,
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable debug logging
    pub debug: bool,
}

/// Window mapper settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MapperConfig {
    /// Class-name prefix of helper windows this manager creates itself.
    /// Such windows are never tracked.
    pub synthetic_class_prefix: String,

    /// Category used when allocating correlation ids for windows
    pub window_category: String,

    /// Restore stripped chrome when the process exits, even abnormally
    pub restore_on_exit: bool,
}

/// Shell (desktop environment) window detection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShellConfig {
    /// Case-insensitive suffix of the shell's executable path
    pub executable_suffix: String,

    /// Window classes of the shell executable that are ordinary file
    /// browser windows rather than shell chrome
    pub file_browser_classes: Vec<String>,
}

/// Per-application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ApplicationsConfig {
    /// Values used when no rule sets them
    pub defaults: ApplicationDefaults,

    /// Ordered rules; earlier rules win
    pub rules: Vec<ApplicationRule>,
}

/// Fallback answers for the window policy predicates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApplicationDefaults {
    /// Windows are handed to the layout engine
    pub tiled: bool,

    /// Windows keep their OS title bar
    pub title: bool,

    /// Windows keep their OS sizing border
    pub border: bool,

    /// Windows may be given a new size
    pub resizable: bool,
}

/// A rule matching some windows and overriding some predicates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ApplicationRule {
    /// Exact window class
    pub class: Option<String>,

    /// Case-insensitive executable path suffix
    pub executable_suffix: Option<String>,

    /// Substring of the window title
    pub title_contains: Option<String>,

    pub tiled: Option<bool>,
    pub title: Option<bool>,
    pub border: Option<bool>,
    pub resizable: Option<bool>,
}

impl ApplicationRule {
    /// True when the rule names at least one matcher.
    pub fn has_matcher(&self) -> bool {
        self.class.is_some() || self.executable_suffix.is_some() || self.title_contains.is_some()
    }
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            synthetic_class_prefix: "__winmap__".to_string(),
            window_category: "native-window".to_string(),
            restore_on_exit: true,
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            executable_suffix: "\\explorer.exe".to_string(),
            file_browser_classes: vec!["CabinetWClass".to_string()],
        }
    }
}

impl Default for ApplicationDefaults {
    fn default() -> Self {
        Self {
            tiled: true,
            title: false,
            border: false,
            resizable: true,
        }
    }
}

impl WinmapConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Expand ~ to home directory
        let expanded_path = if path.to_string_lossy().starts_with('~') {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            Path::new(&home).join(path.strip_prefix("~").unwrap_or(path))
        } else {
            path.to_path_buf()
        };

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: WinmapConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.mapper.synthetic_class_prefix.is_empty() {
            anyhow::bail!("Invalid synthetic_class_prefix: must not be empty");
        }

        if self.mapper.window_category.trim().is_empty() {
            anyhow::bail!("Invalid window_category: must not be empty");
        }

        for (index, rule) in self.applications.rules.iter().enumerate() {
            if !rule.has_matcher() {
                anyhow::bail!(
                    "Invalid application rule #{}: needs class, executable_suffix or title_contains",
                    index + 1
                );
            }
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }

    /// Merge a partial configuration into this one
    /// Sections of the partial config that differ from the defaults override this config
    pub fn merge_partial(mut self, partial: WinmapConfig) -> Self {
        let default_config = WinmapConfig::default();

        if partial.general != default_config.general {
            self.general = partial.general;
        }
        if partial.mapper != default_config.mapper {
            self.mapper = partial.mapper;
        }
        if partial.shell != default_config.shell {
            self.shell = partial.shell;
        }
        if partial.applications != default_config.applications {
            self.applications = partial.applications;
        }

        self
    }
}
