//! Language registrations and built-in languages
//!
//! A language couples an id (`typst`), a grammar scope (`source.typst`),
//! file extensions, a grammar location and an editor language
//! configuration (comments, brackets, auto-closing pairs).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::grammar::GrammarLocation;

pub const TYPST_GRAMMAR_JSON: &str = include_str!("../grammars/typst.tmLanguage.json");
pub const TYPST_CONFIGURATION_JSON: &str =
    include_str!("../languages/typst.language-configuration.json");

/// A language compiled into the binary
pub struct BuiltinLanguage {
    pub id: &'static str,
    pub scope_name: &'static str,
    pub extensions: &'static [&'static str],
    /// Declared grammar path (selects the parse format)
    pub grammar_path: &'static str,
    pub grammar: &'static str,
    pub configuration: &'static str,
}

pub const BUILTIN_LANGUAGES: &[BuiltinLanguage] = &[BuiltinLanguage {
    id: "typst",
    scope_name: "source.typst",
    extensions: &["typ"],
    grammar_path: "typst.tmLanguage.json",
    grammar: TYPST_GRAMMAR_JSON,
    configuration: TYPST_CONFIGURATION_JSON,
}];

/// Comment tokens for toggle-comment commands
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_comment: Option<(String, String)>,
}

/// Bracket-like pair, written either as `["(", ")"]` or `{"open": "(", "close": ")"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PairSpec {
    Tuple(String, String),
    Object {
        open: String,
        close: String,
        /// Token kinds (`string`, `comment`) in which the pair does not auto-close
        #[serde(default, rename = "notIn", skip_serializing_if = "Vec::is_empty")]
        not_in: Vec<String>,
    },
}

impl PairSpec {
    pub fn open(&self) -> &str {
        match self {
            PairSpec::Tuple(open, _) | PairSpec::Object { open, .. } => open,
        }
    }

    pub fn close(&self) -> &str {
        match self {
            PairSpec::Tuple(_, close) | PairSpec::Object { close, .. } => close,
        }
    }

    pub fn not_in(&self) -> &[String] {
        match self {
            PairSpec::Tuple(..) => &[],
            PairSpec::Object { not_in, .. } => not_in,
        }
    }
}

/// Editor behaviour for a language, in Monaco's language configuration shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<CommentRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub brackets: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auto_closing_pairs: Vec<PairSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub surrounding_pairs: Vec<PairSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_pattern: Option<String>,
}

impl LanguageConfiguration {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Read a configuration file; a missing or malformed file yields the
    /// empty configuration and a warning
    pub fn from_file(path: &Path) -> Self {
        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| Self::from_json(&text).map_err(|e| e.to_string()));
        match parsed {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    "Failed to load language configuration {}: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Closing counterpart for an auto-closing opener
    pub fn auto_close_for(&self, open: &str) -> Option<&str> {
        self.auto_closing_pairs
            .iter()
            .find(|pair| pair.open() == open)
            .map(PairSpec::close)
    }
}

/// Which tokens provider a registered language ended up with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Grammar compiled; TextMate tokenization with theme matching
    TextMate,
    /// No usable grammar; every line is one unstyled token
    PlainText,
}

/// Outcome of setting up a language on a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageRegistration {
    pub id: String,
    pub scope_name: String,
    pub configuration: LanguageConfiguration,
    pub provider: ProviderKind,
}

/// Everything needed to set up one language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSpec {
    pub id: String,
    pub scope_name: String,
    pub extensions: Vec<String>,
    pub grammar: GrammarLocation,
    pub configuration: LanguageConfiguration,
}

impl LanguageSpec {
    pub fn from_builtin(builtin: &BuiltinLanguage) -> Self {
        let configuration = LanguageConfiguration::from_json(builtin.configuration)
            .unwrap_or_else(|e| {
                tracing::error!("Built-in configuration for {} is invalid: {}", builtin.id, e);
                LanguageConfiguration::default()
            });
        Self {
            id: builtin.id.to_string(),
            scope_name: builtin.scope_name.to_string(),
            extensions: builtin.extensions.iter().map(|e| e.to_string()).collect(),
            grammar: GrammarLocation::embedded(builtin.grammar_path, builtin.grammar),
            configuration,
        }
    }

    pub fn matches_path(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
    }
}

/// All built-in languages
pub fn builtin_languages() -> Vec<LanguageSpec> {
    BUILTIN_LANGUAGES
        .iter()
        .map(LanguageSpec::from_builtin)
        .collect()
}

/// Pick a language for `path` by extension
pub fn detect_language<'a>(path: &Path, languages: &'a [LanguageSpec]) -> Option<&'a LanguageSpec> {
    languages.iter().find(|lang| lang.matches_path(path))
}
