//! Grammar compilation
//!
//! Turns a [`RawGrammar`] into a flat rule table with resolved includes and
//! one pre-built [`Scanner`] per rule that owns child patterns.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::raw::{RawCaptures, RawGrammar, RawRule};
use super::GrammarError;
use crate::regex_engine::{EngineHandle, Pattern, Scanner};

/// Index into [`CompiledGrammar::rules`]
pub type RuleId = usize;

/// Capture index to scope name (may contain `$n` references)
pub type CaptureNames = Vec<Option<String>>;

#[derive(Debug)]
pub struct Rule {
    pub id: RuleId,
    pub name: Option<String>,
    pub content_name: Option<String>,
    pub kind: RuleKind,
}

#[derive(Debug)]
pub enum RuleKind {
    /// Single-line match
    Match {
        pattern: Option<Pattern>,
        captures: CaptureNames,
    },
    /// Region opened by `begin` and closed by `end`
    BeginEnd {
        begin: Option<Pattern>,
        begin_captures: CaptureNames,
        end: EndRule,
        end_captures: CaptureNames,
        apply_end_pattern_last: bool,
        patterns: Vec<RuleId>,
    },
    /// Region opened by `begin` that stays open while `while` matches at the
    /// start of each following line
    BeginWhile {
        begin: Option<Pattern>,
        begin_captures: CaptureNames,
        condition: EndRule,
        while_captures: CaptureNames,
        patterns: Vec<RuleId>,
    },
    /// Pattern list without a regex of its own (grammar root, repository groups)
    Include { patterns: Vec<RuleId> },
}

/// End pattern of a begin/end rule, or the condition of a begin/while rule
#[derive(Debug)]
pub enum EndRule {
    /// Compiled once; `None` if the pattern was invalid
    Static {
        source: String,
        pattern: Option<Arc<Pattern>>,
    },
    /// Refers to begin captures (`\1`), compiled per push
    BackReferenced { source: String },
}

/// End pattern carried by a rule stack frame
#[derive(Debug, Clone)]
pub struct EndPattern {
    pub source: String,
    pub pattern: Option<Arc<Pattern>>,
}

impl PartialEq for EndPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for EndPattern {}

/// Child patterns of one rule, scanned together
#[derive(Debug)]
pub struct RuleScanner {
    pub scanner: Scanner,
    /// Rule id for each scanner slot
    pub rules: Vec<RuleId>,
}

/// A grammar ready for tokenization
#[derive(Debug)]
pub struct CompiledGrammar {
    scope_name: String,
    name: Option<String>,
    file_types: Vec<String>,
    rules: Vec<Rule>,
    scanners: Vec<Option<RuleScanner>>,
    root: RuleId,
    engine: EngineHandle,
}

impl CompiledGrammar {
    pub fn compile(raw: &RawGrammar, engine: &EngineHandle) -> Result<Self, GrammarError> {
        let mut compiler = Compiler {
            scope_name: &raw.scope_name,
            engine,
            rules: Vec::new(),
            by_address: HashMap::new(),
            root: 0,
            invalid_patterns: 0,
        };

        let root = compiler.alloc();
        compiler.root = root;
        let repos = [&raw.repository];
        let patterns = compiler.compile_patterns(&raw.patterns, &repos)?;
        compiler.rules[root] = Some(Rule {
            id: root,
            name: None,
            content_name: None,
            kind: RuleKind::Include { patterns },
        });

        let invalid_patterns = compiler.invalid_patterns;
        let rules = compiler
            .rules
            .into_iter()
            .enumerate()
            .map(|(id, rule)| {
                rule.ok_or_else(|| GrammarError::Compile {
                    scope: raw.scope_name.clone(),
                    message: format!("rule {} was never defined", id),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let scanners = (0..rules.len())
            .map(|id| build_scanner(&rules, id))
            .collect();

        tracing::debug!(
            "Compiled grammar {} ({} rules, {} invalid patterns)",
            raw.scope_name,
            rules.len(),
            invalid_patterns
        );

        Ok(Self {
            scope_name: raw.scope_name.clone(),
            name: raw.name.clone(),
            file_types: raw.file_types.clone(),
            rules,
            scanners,
            root,
            engine: engine.clone(),
        })
    }

    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn file_types(&self) -> &[String] {
        &self.file_types
    }

    pub fn root(&self) -> RuleId {
        self.root
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id]
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Scanner over the child patterns of `id`, if it has any
    pub fn scanner(&self, id: RuleId) -> Option<&RuleScanner> {
        self.scanners.get(id).and_then(|s| s.as_ref())
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// End pattern for a frame opened by `end`, substituting begin captures
    pub fn resolve_end(
        &self,
        end: &EndRule,
        line: &str,
        captures: &[Option<std::ops::Range<usize>>],
    ) -> EndPattern {
        match end {
            EndRule::Static { source, pattern } => EndPattern {
                source: source.clone(),
                pattern: pattern.clone(),
            },
            EndRule::BackReferenced { source } => {
                let resolved = substitute_back_references(source, line, captures);
                let pattern = match self.engine.compile(&resolved) {
                    Ok(p) => Some(Arc::new(p)),
                    Err(e) => {
                        tracing::warn!("{}: {}", self.scope_name, e);
                        None
                    }
                };
                EndPattern {
                    source: resolved,
                    pattern,
                }
            }
        }
    }
}

struct Compiler<'g> {
    scope_name: &'g str,
    engine: &'g EngineHandle,
    rules: Vec<Option<Rule>>,
    /// Raw rule address to compiled id; breaks include cycles
    by_address: HashMap<usize, RuleId>,
    root: RuleId,
    invalid_patterns: usize,
}

type Repositories<'g> = [&'g HashMap<String, RawRule>];

impl<'g> Compiler<'g> {
    fn alloc(&mut self) -> RuleId {
        self.rules.push(None);
        self.rules.len() - 1
    }

    fn compile_patterns(
        &mut self,
        patterns: &'g [RawRule],
        repos: &Repositories<'g>,
    ) -> Result<Vec<RuleId>, GrammarError> {
        let mut ids = Vec::with_capacity(patterns.len());
        for raw in patterns {
            if let Some(id) = self.compile_rule(raw, repos)? {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn compile_rule(
        &mut self,
        raw: &'g RawRule,
        repos: &Repositories<'g>,
    ) -> Result<Option<RuleId>, GrammarError> {
        if let Some(include) = &raw.include {
            return self.resolve_include(include, repos);
        }

        let address = raw as *const RawRule as usize;
        if let Some(&id) = self.by_address.get(&address) {
            return Ok(Some(id));
        }
        let id = self.alloc();
        self.by_address.insert(address, id);

        let mut scoped: Vec<&'g HashMap<String, RawRule>> = repos.to_vec();
        if let Some(local) = &raw.repository {
            scoped.push(local);
        }

        let kind = if let Some(source) = &raw.match_ {
            RuleKind::Match {
                pattern: self.compile_pattern(source),
                captures: capture_names(raw.captures.as_ref()),
            }
        } else if let Some(begin) = &raw.begin {
            let begin_captures = raw.begin_captures.as_ref().or(raw.captures.as_ref());
            let patterns = self.compile_patterns(raw.patterns.as_deref().unwrap_or(&[]), &scoped)?;
            if let Some(end) = &raw.end {
                let end_captures = raw.end_captures.as_ref().or(raw.captures.as_ref());
                RuleKind::BeginEnd {
                    begin: self.compile_pattern(begin),
                    begin_captures: capture_names(begin_captures),
                    end: self.compile_follow_pattern(end),
                    end_captures: capture_names(end_captures),
                    apply_end_pattern_last: raw.apply_end_pattern_last.is_some_and(|f| f.is_set()),
                    patterns,
                }
            } else if let Some(condition) = &raw.while_ {
                let while_captures = raw.while_captures.as_ref().or(raw.captures.as_ref());
                RuleKind::BeginWhile {
                    begin: self.compile_pattern(begin),
                    begin_captures: capture_names(begin_captures),
                    condition: self.compile_follow_pattern(condition),
                    while_captures: capture_names(while_captures),
                    patterns,
                }
            } else {
                return Err(GrammarError::Compile {
                    scope: self.scope_name.to_string(),
                    message: format!("rule with begin {:?} has neither end nor while", begin),
                });
            }
        } else {
            RuleKind::Include {
                patterns: self.compile_patterns(raw.patterns.as_deref().unwrap_or(&[]), &scoped)?,
            }
        };

        self.rules[id] = Some(Rule {
            id,
            name: raw.name.clone(),
            content_name: raw.content_name.clone(),
            kind,
        });
        Ok(Some(id))
    }

    fn resolve_include(
        &mut self,
        include: &str,
        repos: &Repositories<'g>,
    ) -> Result<Option<RuleId>, GrammarError> {
        if include == "$self" || include == "$base" || include == self.scope_name {
            return Ok(Some(self.root));
        }

        if let Some(key) = include.strip_prefix('#') {
            for repo in repos.iter().rev() {
                if let Some(raw) = repo.get(key) {
                    return self.compile_rule(raw, repos);
                }
            }
            tracing::warn!(
                "{}: include {:?} not found in repository",
                self.scope_name,
                include
            );
            return Ok(None);
        }

        tracing::warn!(
            "{}: external grammar include {:?} is not supported, skipping",
            self.scope_name,
            include
        );
        Ok(None)
    }

    /// `end` or `while` pattern; compiled per push when it refers to begin captures
    fn compile_follow_pattern(&mut self, source: &str) -> EndRule {
        if has_back_references(source) {
            EndRule::BackReferenced {
                source: source.to_string(),
            }
        } else {
            EndRule::Static {
                source: source.to_string(),
                pattern: self.compile_pattern(source).map(Arc::new),
            }
        }
    }

    fn compile_pattern(&mut self, source: &str) -> Option<Pattern> {
        match self.engine.compile(source) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                self.invalid_patterns += 1;
                tracing::warn!("{}: {}", self.scope_name, e);
                None
            }
        }
    }
}

fn capture_names(captures: Option<&RawCaptures>) -> CaptureNames {
    let Some(captures) = captures else {
        return Vec::new();
    };
    let mut names: CaptureNames = Vec::new();
    for (key, capture) in captures {
        let Ok(index) = key.parse::<usize>() else {
            continue;
        };
        if names.len() <= index {
            names.resize(index + 1, None);
        }
        names[index] = capture.name.clone();
    }
    names
}

/// Flatten the child patterns of `id` into a scanner (includes expanded)
fn build_scanner(rules: &[Rule], id: RuleId) -> Option<RuleScanner> {
    let children = match &rules[id].kind {
        RuleKind::Match { .. } => return None,
        RuleKind::BeginEnd { patterns, .. }
        | RuleKind::BeginWhile { patterns, .. }
        | RuleKind::Include { patterns } => patterns,
    };

    let mut slots = Vec::new();
    let mut rule_ids = Vec::new();
    let mut visited = HashSet::new();
    visited.insert(id);
    collect_scan_targets(rules, children, &mut visited, &mut slots, &mut rule_ids);

    Some(RuleScanner {
        scanner: Scanner::from_patterns(slots),
        rules: rule_ids,
    })
}

fn collect_scan_targets(
    rules: &[Rule],
    children: &[RuleId],
    visited: &mut HashSet<RuleId>,
    slots: &mut Vec<Option<Pattern>>,
    rule_ids: &mut Vec<RuleId>,
) {
    for &child in children {
        match &rules[child].kind {
            RuleKind::Match { pattern, .. } => {
                slots.push(pattern.clone());
                rule_ids.push(child);
            }
            RuleKind::BeginEnd { begin, .. } | RuleKind::BeginWhile { begin, .. } => {
                slots.push(begin.clone());
                rule_ids.push(child);
            }
            RuleKind::Include { patterns } => {
                if visited.insert(child) {
                    collect_scan_targets(rules, patterns, visited, slots, rule_ids);
                }
            }
        }
    }
}

fn has_back_references(source: &str) -> bool {
    let mut chars = source.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(d) if d.is_ascii_digit() && d != '0' => return true,
                _ => {}
            }
        }
    }
    false
}

/// Replace `\N` in an end pattern with the escaped text of begin capture N
fn substitute_back_references(
    source: &str,
    line: &str,
    captures: &[Option<std::ops::Range<usize>>],
) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(d) if d.is_ascii_digit() && d != '0' => {
                let index = d as usize - '0' as usize;
                let text = captures
                    .get(index)
                    .and_then(|r| r.clone())
                    .and_then(|r| line.get(r))
                    .unwrap_or("");
                out.push_str(&fancy_regex::escape(text));
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Expand `$n` / `${n}` / `${n:/downcase}` in a scope name and split it
/// into individual scopes.
pub fn expand_scope_name(
    name: &str,
    line: &str,
    captures: &[Option<std::ops::Range<usize>>],
) -> Vec<String> {
    if !name.contains('$') {
        return name.split_whitespace().map(str::to_string).collect();
    }

    let capture_text = |index: usize| {
        captures
            .get(index)
            .and_then(|r| r.clone())
            .and_then(|r| line.get(r))
            .unwrap_or("")
            .trim_start_matches('.')
            .to_string()
    };

    let mut out = String::with_capacity(name.len());
    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let rest = &name[i + 1..];
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if !digits.is_empty() {
                out.push_str(&capture_text(digits.parse().unwrap_or(0)));
                i += 1 + digits.len();
                continue;
            }
            if let Some(body) = rest.strip_prefix('{') {
                if let Some(close) = body.find('}') {
                    let inner = &body[..close];
                    let (index, command) = inner.split_once(":/").unwrap_or((inner, ""));
                    if let Ok(index) = index.parse::<usize>() {
                        let text = capture_text(index);
                        match command {
                            "downcase" => out.push_str(&text.to_lowercase()),
                            "upcase" => out.push_str(&text.to_uppercase()),
                            _ => out.push_str(&text),
                        }
                        i += 2 + close + 1;
                        continue;
                    }
                }
            }
        }
        let ch = name[i..].chars().next().unwrap_or('$');
        out.push(ch);
        i += ch.len_utf8();
    }

    out.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::raw::parse_raw_grammar;
    use crate::regex_engine::RegexEngine;

    fn compile(json: &str) -> Result<CompiledGrammar, GrammarError> {
        let engine = RegexEngine::with_defaults().initialize().unwrap();
        let raw = parse_raw_grammar(json, "test.json").unwrap();
        CompiledGrammar::compile(&raw, &engine)
    }

    #[test]
    fn test_includes_are_flattened_into_scanner() {
        let grammar = compile(
            r##"{
                "scopeName": "source.t",
                "patterns": [{ "include": "#values" }, { "match": "x", "name": "x.t" }],
                "repository": {
                    "values": { "patterns": [
                        { "match": "\\d+", "name": "constant.numeric.t" },
                        { "include": "#words" }
                    ]},
                    "words": { "match": "[a-z]+", "name": "word.t" }
                }
            }"##,
        )
        .unwrap();

        let scanner = grammar.scanner(grammar.root()).unwrap();
        let names: Vec<_> = scanner
            .rules
            .iter()
            .map(|&id| grammar.rule(id).name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["constant.numeric.t", "word.t", "x.t"]);
    }

    #[test]
    fn test_recursive_self_include_terminates() {
        let grammar = compile(
            r##"{
                "scopeName": "source.t",
                "patterns": [{
                    "begin": "\\(", "end": "\\)", "name": "paren.t",
                    "patterns": [{ "include": "$self" }]
                }]
            }"##,
        )
        .unwrap();
        assert_eq!(grammar.rule_count(), 2);

        let paren = grammar.scanner(grammar.root()).unwrap().rules[0];
        // The paren rule's children include the root, which is flattened back to the paren rule
        let inner = grammar.scanner(paren).unwrap();
        assert_eq!(inner.rules, vec![paren]);
    }

    #[test]
    fn test_begin_without_end_is_compile_error() {
        let err = compile(r#"{ "scopeName": "source.t", "patterns": [{ "begin": "a" }] }"#)
            .unwrap_err();
        assert!(matches!(err, GrammarError::Compile { .. }));
    }

    #[test]
    fn test_begin_while_rule_compiles() {
        let grammar = compile(
            r#"{ "scopeName": "source.t", "patterns": [{
                "begin": "^>", "while": "^>", "name": "quote.t",
                "captures": { "0": { "name": "punctuation.t" } }
            }] }"#,
        )
        .unwrap();
        let id = grammar.scanner(grammar.root()).unwrap().rules[0];
        match &grammar.rule(id).kind {
            RuleKind::BeginWhile {
                begin,
                condition,
                while_captures,
                ..
            } => {
                assert!(begin.is_some());
                assert!(matches!(condition, EndRule::Static { pattern: Some(_), .. }));
                assert_eq!(while_captures, &vec![Some("punctuation.t".to_string())]);
            }
            other => panic!("expected begin/while, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_regex_rule_never_matches() {
        let grammar = compile(
            r#"{ "scopeName": "source.t", "patterns": [{ "match": "(", "name": "bad.t" }] }"#,
        )
        .unwrap();
        let id = grammar.scanner(grammar.root()).unwrap().rules[0];
        assert!(matches!(
            grammar.rule(id).kind,
            RuleKind::Match { pattern: None, .. }
        ));
    }

    #[test]
    fn test_unknown_include_is_skipped() {
        let grammar = compile(
            r##"{ "scopeName": "source.t", "patterns": [{ "include": "#missing" }, { "include": "source.other" }] }"##,
        )
        .unwrap();
        assert!(grammar.scanner(grammar.root()).unwrap().rules.is_empty());
    }

    #[test]
    fn test_back_reference_detection() {
        assert!(has_back_references(r"\1"));
        assert!(has_back_references(r"(?<=x)\2$"));
        assert!(!has_back_references(r"\\1"));
        assert!(!has_back_references(r"\d+"));
    }

    #[test]
    fn test_substitute_back_references_escapes() {
        let line = "``` a.b";
        let captures = vec![Some(0..3), Some(0..3)];
        assert_eq!(substitute_back_references(r"^\1$", line, &captures), "^```$");

        let line = "x.*";
        let captures = vec![Some(0..3), Some(1..3)];
        assert_eq!(substitute_back_references(r"\1", line, &captures), r"\.\*");
    }

    #[test]
    fn test_expand_scope_name() {
        let line = "#let";
        let captures = vec![Some(0..4), Some(1..4)];
        assert_eq!(
            expand_scope_name("keyword.$1.t", line, &captures),
            vec!["keyword.let.t"]
        );
        assert_eq!(
            expand_scope_name("keyword.${1:/upcase}.t meta.t", line, &captures),
            vec!["keyword.LET.t", "meta.t"]
        );
        assert_eq!(
            expand_scope_name("string.quoted punctuation.x", line, &captures),
            vec!["string.quoted", "punctuation.x"]
        );
    }
}
