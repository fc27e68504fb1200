//! Raw (uncompiled) TextMate grammar model
//!
//! Mirrors the on-disk structure of `.tmLanguage.json` / `.tmLanguage.yaml`
//! files closely enough for serde to read them directly.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::GrammarError;

/// Top-level grammar definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGrammar {
    pub scope_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub file_types: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<RawRule>,
    #[serde(default)]
    pub repository: HashMap<String, RawRule>,
}

/// One grammar rule (match, begin/end, begin/while, include, or pure container)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRule {
    #[serde(default)]
    pub include: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content_name: Option<String>,
    #[serde(default, rename = "match")]
    pub match_: Option<String>,
    #[serde(default)]
    pub begin: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default, rename = "while")]
    pub while_: Option<String>,
    #[serde(default)]
    pub captures: Option<RawCaptures>,
    #[serde(default)]
    pub begin_captures: Option<RawCaptures>,
    #[serde(default)]
    pub end_captures: Option<RawCaptures>,
    #[serde(default)]
    pub while_captures: Option<RawCaptures>,
    #[serde(default)]
    pub patterns: Option<Vec<RawRule>>,
    #[serde(default)]
    pub repository: Option<HashMap<String, RawRule>>,
    #[serde(default)]
    pub apply_end_pattern_last: Option<Flag>,
}

/// Capture index (as a string key, e.g. `"1"`) to capture rule
pub type RawCaptures = BTreeMap<String, RawCapture>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCapture {
    #[serde(default)]
    pub name: Option<String>,
}

/// Grammar files write booleans as either `true` or `1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    pub fn is_set(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(n) => n != 0,
        }
    }
}

/// Source format a grammar is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarFormat {
    Json,
    Yaml,
}

impl GrammarFormat {
    /// Pick the format from the declared path (`foo.tmLanguage.json`, `foo.yaml`).
    /// Unknown extensions fall back to sniffing the first non-blank character.
    pub fn detect(path: &str, text: &str) -> Self {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match ext.as_deref() {
            Some("json") => GrammarFormat::Json,
            Some("yaml") | Some("yml") => GrammarFormat::Yaml,
            _ if text.trim_start().starts_with('{') => GrammarFormat::Json,
            _ => GrammarFormat::Yaml,
        }
    }
}

/// Parse grammar text according to the format implied by `path`
pub fn parse_raw_grammar(text: &str, path: &str) -> Result<RawGrammar, GrammarError> {
    let grammar: RawGrammar = match GrammarFormat::detect(path, text) {
        GrammarFormat::Json => serde_json::from_str(text).map_err(|e| GrammarError::Parse {
            path: path.to_string(),
            message: e.to_string(),
        })?,
        GrammarFormat::Yaml => serde_yaml::from_str(text).map_err(|e| GrammarError::Parse {
            path: path.to_string(),
            message: e.to_string(),
        })?,
    };

    if grammar.scope_name.trim().is_empty() {
        return Err(GrammarError::Parse {
            path: path.to_string(),
            message: "grammar has no scopeName".to_string(),
        });
    }

    Ok(grammar)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_grammar() {
        let text = r#"{
            "scopeName": "source.demo",
            "patterns": [{ "match": "\\d+", "name": "constant.numeric.demo" }],
            "repository": {
                "strings": {
                    "begin": "\"",
                    "end": "\"",
                    "applyEndPatternLast": 1,
                    "beginCaptures": { "0": { "name": "punctuation.definition.string.demo" } }
                }
            }
        }"#;
        let grammar = parse_raw_grammar(text, "demo.tmLanguage.json").unwrap();
        assert_eq!(grammar.scope_name, "source.demo");
        assert_eq!(grammar.patterns.len(), 1);
        assert_eq!(grammar.patterns[0].match_.as_deref(), Some(r"\d+"));

        let strings = &grammar.repository["strings"];
        assert!(strings.apply_end_pattern_last.unwrap().is_set());
        let begin_captures = strings.begin_captures.as_ref().unwrap();
        assert_eq!(
            begin_captures["0"].name.as_deref(),
            Some("punctuation.definition.string.demo")
        );
    }

    #[test]
    fn test_parse_yaml_grammar() {
        let text = r#"
scopeName: source.demo
patterns:
  - include: '#comment'
repository:
  comment:
    match: '//.*'
    name: comment.line.demo
"#;
        let grammar = parse_raw_grammar(text, "demo.tmLanguage.yaml").unwrap();
        assert_eq!(grammar.patterns[0].include.as_deref(), Some("#comment"));
        assert_eq!(
            grammar.repository["comment"].name.as_deref(),
            Some("comment.line.demo")
        );
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(GrammarFormat::detect("a.json", ""), GrammarFormat::Json);
        assert_eq!(GrammarFormat::detect("a.YML", ""), GrammarFormat::Yaml);
        assert_eq!(
            GrammarFormat::detect("https://cdn/grammar", "  {\"a\": 1}"),
            GrammarFormat::Json
        );
        assert_eq!(GrammarFormat::detect("grammar", "a: 1"), GrammarFormat::Yaml);
    }

    #[test]
    fn test_missing_scope_name_is_rejected() {
        let err = parse_raw_grammar(r#"{"patterns": []}"#, "bad.json").unwrap_err();
        assert!(matches!(err, GrammarError::Parse { .. }));
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let err = parse_raw_grammar("{ not json", "bad.json").unwrap_err();
        assert!(matches!(err, GrammarError::Parse { .. }));
    }
}
