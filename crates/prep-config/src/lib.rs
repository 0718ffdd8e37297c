//! Configuration management for prep.
//!
//! Parses `prep.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`] and take
//! precedence over file values.
//!
//! ```toml
//! [expand]
//! prefix = "#"
//! search_roots = ["include", "~/shared/snippets"]
//! max_substitution_depth = 32
//!
//! [defines]
//! VERSION = "3"
//! DEBUG = ""          # defined with no value
//! ```
//!
//! Search roots support `~` expansion; relative roots resolve against the
//! directory the config file was found in.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "prep.toml";

/// CLI settings that override configuration file values.
///
/// All fields are optional or additive. Only non-None values override the
/// loaded config; search roots and defines from the CLI are appended
/// after the file's own.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the directive prefix character.
    pub prefix: Option<char>,
    /// Additional search roots, tried after the configured ones.
    pub search_roots: Vec<PathBuf>,
    /// Additional seed defines; `None` means defined with no value.
    pub defines: Vec<(String, Option<String>)>,
    /// Override the substitution depth cap.
    pub max_substitution_depth: Option<usize>,
}

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Expansion configuration (paths are relative strings from TOML).
    expand: ExpandConfigRaw,
    /// Seed defines; an empty string value means defined with no value.
    defines: BTreeMap<String, String>,

    /// Resolved expansion configuration (set after loading).
    #[serde(skip)]
    pub expand_resolved: ExpandConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            expand: ExpandConfigRaw::default(),
            defines: BTreeMap::new(),
            expand_resolved: ExpandConfig::default(),
            config_path: None,
        }
    }
}

/// Raw expansion configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ExpandConfigRaw {
    prefix: Option<String>,
    search_roots: Option<Vec<String>>,
    max_substitution_depth: Option<usize>,
}

/// Resolved expansion configuration with absolute paths.
#[derive(Debug)]
pub struct ExpandConfig {
    /// Directive prefix character.
    pub prefix: char,
    /// Include search roots, in resolution order.
    pub search_roots: Vec<PathBuf>,
    /// Cap on substitution rounds and identifier resolution depth.
    pub max_substitution_depth: usize,
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self {
            prefix: '#',
            search_roots: Vec::new(),
            max_substitution_depth: 32,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise,
    /// searches for `prep.toml` in the current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution,
    /// allowing CLI arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit `config_path` doesn't exist or
    /// parsing or validation fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }
        config.validate()?;

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(prefix) = settings.prefix {
            self.expand_resolved.prefix = prefix;
        }
        if let Some(depth) = settings.max_substitution_depth {
            self.expand_resolved.max_substitution_depth = depth;
        }
        self.expand_resolved
            .search_roots
            .extend(settings.search_roots.iter().cloned());
        for (name, value) in &settings.defines {
            self.defines
                .insert(name.clone(), value.clone().unwrap_or_default());
        }
    }

    /// Seed defines in engine form: an empty value means defined with no
    /// value.
    #[must_use]
    pub fn seed_defines(&self) -> Vec<(String, Option<String>)> {
        self.defines
            .iter()
            .map(|(name, value)| {
                (
                    name.clone(),
                    (!value.is_empty()).then(|| value.clone()),
                )
            })
            .collect()
    }

    /// Search for a config file in the current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve(config_dir)?;
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Resolve raw values: prefix string to a char, search roots through
    /// `~` expansion and against the config directory.
    fn resolve(&mut self, config_dir: &Path) -> Result<(), ConfigError> {
        let mut resolved = ExpandConfig::default();

        if let Some(ref prefix) = self.expand.prefix {
            let mut chars = prefix.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => resolved.prefix = c,
                _ => {
                    return Err(ConfigError::Validation(format!(
                        "expand.prefix must be a single character, got {prefix:?}"
                    )));
                }
            }
        }

        if let Some(depth) = self.expand.max_substitution_depth {
            resolved.max_substitution_depth = depth;
        }

        if let Some(ref roots) = self.expand.search_roots {
            for root in roots {
                let expanded = shellexpand::tilde(root);
                let path = PathBuf::from(expanded.as_ref());
                resolved.search_roots.push(if path.is_absolute() {
                    path
                } else {
                    config_dir.join(path)
                });
            }
        }

        self.expand_resolved = resolved;
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = self.expand_resolved.prefix;
        if prefix.is_ascii_alphanumeric() || prefix.is_whitespace() || prefix == '_' {
            return Err(ConfigError::Validation(format!(
                "expand.prefix cannot be {prefix:?}"
            )));
        }

        if self.expand_resolved.max_substitution_depth == 0 {
            return Err(ConfigError::Validation(
                "expand.max_substitution_depth must be greater than 0".to_owned(),
            ));
        }

        for name in self.defines.keys() {
            if !is_identifier(name) {
                return Err(ConfigError::Validation(format!(
                    "defines key {name:?} is not a valid identifier"
                )));
            }
        }

        Ok(())
    }
}

/// Whether a defines key is a valid identifier.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
