//! Bridge configuration persistence
//!
//! Stores user preferences in `~/.config/tmbridge/config.yaml`:
//!
//! ```yaml
//! theme: play-light
//! themes:
//!   - name: solarized
//!     url: themes/solarized.json
//! languages:
//!   - id: typst
//!     scope_name: source.typst
//!     grammar: grammars/typst.tmLanguage.yaml
//!     extensions: [typ]
//! engine_options: engine.yaml
//! format:
//!   max_width: 100
//! ```
//!
//! Relative paths resolve against the config directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::formatter::FormatConfig;
use crate::grammar::GrammarLocation;
use crate::language::{builtin_languages, LanguageConfiguration, LanguageSpec};
use crate::theme::{BUILTIN_SCHEME, BUILTIN_THEMES, DEFAULT_THEME};

/// A named theme and where to load it from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeEntry {
    pub name: String,
    /// File path, `file://` URL or `builtin:<id>`
    pub url: String,
}

/// A user-supplied language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageEntry {
    pub id: String,
    pub scope_name: String,
    pub grammar: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<PathBuf>,
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// Configuration that persists across sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Active theme name
    #[serde(default = "default_theme")]
    pub theme: String,

    /// Extra themes; built-in themes are always available
    #[serde(default)]
    pub themes: Vec<ThemeEntry>,

    /// Extra languages; an entry with a built-in id replaces it
    #[serde(default)]
    pub languages: Vec<LanguageEntry>,

    /// YAML file with regex engine options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_options: Option<PathBuf>,

    #[serde(default)]
    pub format: FormatConfig,
}

fn default_theme() -> String {
    DEFAULT_THEME.to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            themes: Vec::new(),
            languages: Vec::new(),
            engine_options: None,
            format: FormatConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load config from the default location, or return defaults if not found
    pub fn load() -> Self {
        let Some(path) = crate::config_paths::config_file() else {
            tracing::debug!("No config directory available, using defaults");
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// Load config from `path`; missing or invalid files give defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config at {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), String> {
        let path = crate::config_paths::config_file()
            .ok_or_else(|| "No config directory available".to_string())?;
        self.save_to(&path)
    }

    /// Save config to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        let content = serde_yaml::to_string(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        std::fs::write(path, content)
            .map_err(|e| format!("Failed to write config to {}: {}", path.display(), e))?;

        tracing::info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Update theme and save
    pub fn set_theme(&mut self, theme: &str) -> Result<(), String> {
        self.theme = theme.to_string();
        self.save()
    }

    /// Built-in themes followed by configured ones
    pub fn theme_entries(&self) -> Vec<ThemeEntry> {
        BUILTIN_THEMES
            .iter()
            .map(|t| ThemeEntry {
                name: t.id.to_string(),
                url: format!("{}{}", BUILTIN_SCHEME, t.id),
            })
            .chain(self.themes.iter().cloned())
            .collect()
    }

    /// Built-in languages with configured entries layered on top
    ///
    /// `base_dir` anchors relative grammar and configuration paths.
    pub fn language_specs(&self, base_dir: Option<&Path>) -> Vec<LanguageSpec> {
        let resolve = |path: &Path| match base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        };

        let mut specs = builtin_languages();
        for entry in &self.languages {
            let configuration = entry
                .configuration
                .as_deref()
                .map(|p| LanguageConfiguration::from_file(&resolve(p)))
                .unwrap_or_default();
            let spec = LanguageSpec {
                id: entry.id.clone(),
                scope_name: entry.scope_name.clone(),
                extensions: entry.extensions.clone(),
                grammar: GrammarLocation::path(resolve(&entry.grammar)),
                configuration,
            };
            match specs.iter_mut().find(|s| s.id == spec.id) {
                Some(existing) => *existing = spec,
                None => specs.push(spec),
            }
        }
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_missing() {
        let config = BridgeConfig::load_from(Path::new("/nonexistent/config.yaml"));
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.theme, "play-dark");
        assert_eq!(config.format.max_width, 80);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: BridgeConfig =
            serde_yaml::from_str("theme: play-light\nformat:\n  tab_spaces: 4\n").unwrap();
        assert_eq!(config.theme, "play-light");
        assert_eq!(config.format.tab_spaces, 4);
        assert_eq!(config.format.max_width, 80);
        assert!(config.format.reorder_import_items);
    }

    #[test]
    fn test_language_entry_replaces_builtin() {
        let config = BridgeConfig {
            languages: vec![LanguageEntry {
                id: "typst".to_string(),
                scope_name: "source.typst".to_string(),
                grammar: PathBuf::from("grammars/typst.json"),
                configuration: None,
                extensions: vec!["typ".to_string()],
            }],
            ..BridgeConfig::default()
        };
        let specs = config.language_specs(Some(Path::new("/cfg")));
        assert_eq!(specs.len(), 1);
        assert_eq!(
            specs[0].grammar,
            GrammarLocation::path("/cfg/grammars/typst.json")
        );
    }

    #[test]
    fn test_theme_entries_start_with_builtins() {
        let config = BridgeConfig {
            themes: vec![ThemeEntry {
                name: "mine".to_string(),
                url: "mine.json".to_string(),
            }],
            ..BridgeConfig::default()
        };
        let entries = config.theme_entries();
        assert_eq!(entries[0].url, "builtin:play-dark");
        assert_eq!(entries.last().unwrap().name, "mine");
    }
}
