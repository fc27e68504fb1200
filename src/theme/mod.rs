//! Token colour themes
//!
//! Themes use the Monaco standalone theme format (`base`, `inherit`, `rules`,
//! `colors`), either bare or wrapped in `{"data": ...}`.
//!
//! Theme loading priority:
//! 1. User config: `~/.config/tmbridge/themes/{id}.json`
//! 2. Embedded: Built-in themes compiled into binary

mod base;
mod loader;
mod resolve;
mod trie;

pub use base::BaseTheme;
pub use loader::{FileThemeLoader, ThemeLoader, BUILTIN_SCHEME};
pub use resolve::{base_language, resolve_display_token, DisplayToken};
pub use trie::{ResolvedStyle, ThemeTrie};

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Embed theme JSON files at compile time
pub const PLAY_DARK_JSON: &str = include_str!("../../themes/play-dark.json");
pub const PLAY_LIGHT_JSON: &str = include_str!("../../themes/play-light.json");

/// A built-in theme entry
pub struct BuiltinTheme {
    /// Stable identifier for config (e.g. "play-dark")
    pub id: &'static str,
    /// Embedded JSON content
    pub json: &'static str,
}

/// Registry of all built-in themes
pub const BUILTIN_THEMES: &[BuiltinTheme] = &[
    BuiltinTheme {
        id: "play-dark",
        json: PLAY_DARK_JSON,
    },
    BuiltinTheme {
        id: "play-light",
        json: PLAY_LIGHT_JSON,
    },
];

/// Theme used when nothing else is configured or a theme fails to load
pub const DEFAULT_THEME: &str = "play-dark";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThemeError {
    #[error("failed to fetch theme {name}: {message}")]
    Fetch { name: String, message: String },

    #[error("failed to parse theme {name}: {message}")]
    Parse { name: String, message: String },

    #[error("invalid color: {0}")]
    InvalidColor(String),

    #[error("unknown theme id: {0}")]
    Unknown(String),
}

/// Where the theme came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeSource {
    /// User-defined theme in ~/.config/tmbridge/themes/
    User,
    /// Built-in theme embedded in binary
    Builtin,
}

/// Information about an available theme
#[derive(Debug, Clone)]
pub struct ThemeInfo {
    pub id: String,
    /// Display name from the theme file, or the id
    pub name: String,
    pub source: ThemeSource,
}

/// RGBA color (0-255 per channel)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Create a new color from RGB values (alpha defaults to 255)
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `RGB`, `RGBA`, `RRGGBB` or `RRGGBBAA`, with or without a leading `#`
    pub fn from_hex(s: &str) -> Result<Self, ThemeError> {
        let hex = s.trim().trim_start_matches('#');
        let invalid = || ThemeError::InvalidColor(s.to_string());
        if !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| invalid())
        };
        let short = |i: usize| channel(i..i + 1).map(|v| v * 17);

        match hex.len() {
            3 => Ok(Color::rgb(short(0)?, short(1)?, short(2)?)),
            4 => Ok(Color::rgba(short(0)?, short(1)?, short(2)?, short(3)?)),
            6 => Ok(Color::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?)),
            8 => Ok(Color::rgba(
                channel(0..2)?,
                channel(2..4)?,
                channel(4..6)?,
                channel(6..8)?,
            )),
            _ => Err(invalid()),
        }
    }

    /// `#RRGGBB`, or `#RRGGBBAA` when not opaque
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

bitflags! {
    /// Combination of italic / bold / underline / strikethrough
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct FontStyle: u8 {
        const ITALIC        = 0b0001;
        const BOLD          = 0b0010;
        const UNDERLINE     = 0b0100;
        const STRIKETHROUGH = 0b1000;
    }
}

impl FontStyle {
    /// Parse a space separated list such as `"italic bold"`; unknown words are ignored
    pub fn parse(s: &str) -> Self {
        s.split_whitespace()
            .filter_map(|word| match word {
                "italic" => Some(FontStyle::ITALIC),
                "bold" => Some(FontStyle::BOLD),
                "underline" => Some(FontStyle::UNDERLINE),
                "strikethrough" => Some(FontStyle::STRIKETHROUGH),
                _ => None,
            })
            .collect()
    }
}

/// Raw theme data in Monaco standalone theme format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeData {
    #[serde(default)]
    pub name: Option<String>,
    pub base: BaseTheme,
    #[serde(default = "default_inherit")]
    pub inherit: bool,
    #[serde(default)]
    pub rules: Vec<ThemeRuleData>,
    #[serde(default)]
    pub colors: BTreeMap<String, String>,
}

fn default_inherit() -> bool {
    true
}

/// One token rule (raw strings)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThemeRuleData {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, rename = "fontStyle", skip_serializing_if = "Option::is_none")]
    pub font_style: Option<String>,
}

/// Theme files are either bare data or `{"data": ...}`
#[derive(Deserialize)]
#[serde(untagged)]
enum ThemeDocument {
    Wrapped { data: ThemeData },
    Bare(ThemeData),
}

impl ThemeData {
    /// Parse theme JSON (bare or wrapped)
    pub fn from_json(name: &str, json: &str) -> Result<Self, ThemeError> {
        let document: ThemeDocument =
            serde_json::from_str(json).map_err(|e| ThemeError::Parse {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        Ok(match document {
            ThemeDocument::Wrapped { data } | ThemeDocument::Bare(data) => data,
        })
    }
}

/// A resolved token rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeRule {
    pub scope: String,
    pub foreground: Option<Color>,
    pub background: Option<Color>,
    pub font_style: Option<FontStyle>,
}

impl ThemeRule {
    fn from_data(data: &ThemeRuleData) -> Self {
        ThemeRule {
            scope: data.token.clone(),
            foreground: lenient_color(&data.token, data.foreground.as_deref()),
            background: lenient_color(&data.token, data.background.as_deref()),
            font_style: data.font_style.as_deref().map(FontStyle::parse),
        }
    }
}

/// Parse an optional colour, dropping (and logging) malformed values
fn lenient_color(owner: &str, value: Option<&str>) -> Option<Color> {
    match Color::from_hex(value?) {
        Ok(color) => Some(color),
        Err(e) => {
            tracing::warn!("Ignoring colour of {:?}: {}", owner, e);
            None
        }
    }
}

/// Resolved theme, immutable once built
#[derive(Debug, Clone)]
pub struct Theme {
    pub name: String,
    pub base: BaseTheme,
    /// Effective rules in application order (inherited base rules first)
    pub rules: Vec<ThemeRule>,
    /// Editor colours (`editor.foreground`, ...) as written in the theme
    pub colors: BTreeMap<String, String>,
    trie: ThemeTrie,
}

impl Theme {
    /// Load theme from JSON string
    pub fn from_json(name: &str, json: &str) -> Result<Self, ThemeError> {
        Self::from_data(name, ThemeData::from_json(name, json)?)
    }

    /// Load a built-in theme by id
    pub fn from_builtin(id: &str) -> Result<Self, ThemeError> {
        let entry = BUILTIN_THEMES
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| ThemeError::Unknown(id.to_string()))?;
        Theme::from_json(id, entry.json)
    }

    /// Convert raw theme data to a resolved theme
    ///
    /// Rule order: inherited base rules, then an empty-token rule carrying
    /// `editor.foreground` / `editor.background`, then the theme's own rules.
    pub fn from_data(name: &str, data: ThemeData) -> Result<Self, ThemeError> {
        let mut rules = Vec::new();
        if data.inherit {
            rules.extend(data.base.rules());
        }

        let editor_fg = data.colors.get("editor.foreground");
        let editor_bg = data.colors.get("editor.background");
        if editor_fg.is_some() || editor_bg.is_some() {
            rules.push(ThemeRule {
                scope: String::new(),
                foreground: lenient_color("editor.foreground", editor_fg.map(String::as_str)),
                background: lenient_color("editor.background", editor_bg.map(String::as_str)),
                font_style: None,
            });
        }

        for rule in &data.rules {
            rules.push(ThemeRule::from_data(rule));
        }

        let trie = ThemeTrie::from_rules(&rules);
        Ok(Theme {
            name: data.name.unwrap_or_else(|| name.to_string()),
            base: data.base,
            rules,
            colors: data.colors,
            trie,
        })
    }

    /// Default dark theme (built-in with a base-only fallback)
    pub fn default_dark() -> Self {
        match Theme::from_builtin(DEFAULT_THEME) {
            Ok(theme) => theme,
            Err(e) => {
                tracing::error!("Built-in theme {} failed to load: {}", DEFAULT_THEME, e);
                let rules = BaseTheme::VsDark.rules();
                Theme {
                    name: DEFAULT_THEME.to_string(),
                    base: BaseTheme::VsDark,
                    trie: ThemeTrie::from_rules(&rules),
                    rules,
                    colors: BTreeMap::new(),
                }
            }
        }
    }

    /// Style for a single scope (longest dotted prefix match)
    pub fn match_scope(&self, scope: &str) -> ResolvedStyle {
        self.trie.matches(scope)
    }

    pub fn default_foreground(&self) -> Color {
        self.trie.defaults().foreground
    }

    pub fn default_background(&self) -> Color {
        self.trie.defaults().background
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::default_dark()
    }
}

/// Shared handle to the active theme
///
/// Readers take an `Arc` snapshot; switching themes swaps the whole `Arc`.
#[derive(Debug, Clone)]
pub struct ActiveTheme {
    current: Arc<RwLock<Arc<Theme>>>,
}

impl ActiveTheme {
    pub fn new(theme: Arc<Theme>) -> Self {
        Self {
            current: Arc::new(RwLock::new(theme)),
        }
    }

    pub fn snapshot(&self) -> Arc<Theme> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn set(&self, theme: Arc<Theme>) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = theme;
    }
}

impl Default for ActiveTheme {
    fn default() -> Self {
        Self::new(Arc::new(Theme::default_dark()))
    }
}

/// Load a theme from a JSON file
pub fn from_file(path: &Path) -> Result<Theme, ThemeError> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("theme")
        .to_string();
    let content = std::fs::read_to_string(path).map_err(|e| ThemeError::Fetch {
        name: name.clone(),
        message: format!("{}: {}", path.display(), e),
    })?;
    Theme::from_json(&name, &content)
}

/// Load theme by id with priority: user → builtin
pub fn load_theme(id: &str) -> Result<Theme, ThemeError> {
    if let Some(user_dir) = crate::config_paths::themes_dir() {
        let user_path = user_dir.join(format!("{}.json", id));
        if user_path.exists() {
            tracing::info!("Loading user theme from {}", user_path.display());
            return from_file(&user_path);
        }
    }

    tracing::info!("Loading builtin theme: {}", id);
    Theme::from_builtin(id)
}

/// List all available themes, user themes overriding builtins with the same id
pub fn list_available_themes() -> Vec<ThemeInfo> {
    let mut themes = Vec::new();
    let mut seen_ids = HashSet::new();

    if let Some(user_dir) = crate::config_paths::themes_dir() {
        if let Ok(entries) = std::fs::read_dir(&user_dir) {
            let mut paths: Vec<_> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
            paths.sort();
            for path in paths {
                if !path.extension().is_some_and(|ext| ext == "json") {
                    continue;
                }
                let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if seen_ids.insert(id.to_string()) {
                    let name = from_file(&path)
                        .map(|t| t.name)
                        .unwrap_or_else(|_| id.to_string());
                    themes.push(ThemeInfo {
                        id: id.to_string(),
                        name,
                        source: ThemeSource::User,
                    });
                }
            }
        }
    }

    for builtin in BUILTIN_THEMES {
        if seen_ids.insert(builtin.id.to_string()) {
            let name = Theme::from_json(builtin.id, builtin.json)
                .map(|t| t.name)
                .unwrap_or_else(|_| builtin.id.to_string());
            themes.push(ThemeInfo {
                id: builtin.id.to_string(),
                name,
                source: ThemeSource::Builtin,
            });
        }
    }

    themes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_font_style_parse() {
        let style = FontStyle::parse("italic bold");
        assert!(style.contains(FontStyle::ITALIC));
        assert!(style.contains(FontStyle::BOLD));
        assert!(!style.contains(FontStyle::UNDERLINE));
        assert!(FontStyle::parse("").is_empty());
    }

    #[test]
    fn test_font_style_flags_compose() {
        assert_eq!(
            FontStyle::parse("bold  wavy underline"),
            FontStyle::BOLD | FontStyle::UNDERLINE
        );
        assert_eq!(FontStyle::parse("normal"), FontStyle::empty());
        assert_eq!(FontStyle::default(), FontStyle::empty());
    }

    #[test]
    fn test_editor_colors_become_defaults() {
        let theme = Theme::from_json(
            "t",
            r##"{ "base": "vs-dark", "inherit": false, "rules": [],
                 "colors": { "editor.foreground": "#ABCDEF", "editor.background": "#101010" } }"##,
        )
        .unwrap();
        assert_eq!(theme.default_foreground(), Color::rgb(0xAB, 0xCD, 0xEF));
        assert_eq!(theme.default_background(), Color::rgb(0x10, 0x10, 0x10));
    }

    #[test]
    fn test_inherit_pulls_in_base_rules() {
        let inherited =
            Theme::from_json("t", r#"{ "base": "vs-dark", "inherit": true, "rules": [] }"#)
                .unwrap();
        assert_eq!(
            inherited.match_scope("comment").foreground,
            Color::from_hex("608B4E").unwrap()
        );

        let bare =
            Theme::from_json("t", r#"{ "base": "vs-dark", "inherit": false, "rules": [] }"#)
                .unwrap();
        assert_eq!(
            bare.match_scope("comment").foreground,
            bare.default_foreground()
        );
    }

    #[test]
    fn test_invalid_rule_color_drops_only_that_attribute() {
        let theme = Theme::from_json(
            "t",
            r##"{ "base": "vs", "inherit": false, "rules": [
                { "token": "x", "foreground": "zzzzzz", "background": "#102030", "fontStyle": "bold" },
                { "token": "y", "foreground": "#00FF00" }
            ] }"##,
        )
        .unwrap();
        let x = theme.rules.iter().find(|r| r.scope == "x").unwrap();
        assert_eq!(x.foreground, None);
        assert_eq!(x.background, Some(Color::rgb(0x10, 0x20, 0x30)));
        assert_eq!(x.font_style, Some(FontStyle::BOLD));
        assert_eq!(theme.match_scope("y").foreground, Color::rgb(0x00, 0xFF, 0x00));
        assert_eq!(
            Color::from_hex("zzzzzz"),
            Err(ThemeError::InvalidColor("zzzzzz".to_string()))
        );
    }

    #[test]
    fn test_active_theme_swap() {
        let active = ActiveTheme::new(Arc::new(Theme::from_builtin("play-dark").unwrap()));
        let before = active.snapshot();
        active.set(Arc::new(Theme::from_builtin("play-light").unwrap()));
        assert_eq!(before.name, "Play Dark");
        assert_eq!(active.snapshot().name, "Play Light");
    }
}
