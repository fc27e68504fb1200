//! Shared test helpers for integration tests
//!
//! Note: Functions may appear unused because each test file compiles separately.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tmbridge::grammar::{
    parse_raw_grammar, single_scope_loader, CompiledGrammar, GrammarLocation, GrammarRegistry,
};
use tmbridge::language::{BUILTIN_LANGUAGES, TYPST_GRAMMAR_JSON};
use tmbridge::syntax::{tokenize_line, LineTokens, RuleStack, Token};
use tmbridge::RegexEngine;

pub const TYPST_SCOPE: &str = "source.typst";

/// Registry serving the built-in Typst grammar
pub fn typst_registry() -> GrammarRegistry {
    GrammarRegistry::new(
        Arc::new(RegexEngine::with_defaults()),
        single_scope_loader(
            TYPST_SCOPE,
            GrammarLocation::embedded("typst.tmLanguage.json", TYPST_GRAMMAR_JSON),
        ),
    )
}

/// Compiled built-in Typst grammar
pub fn typst_grammar() -> Arc<CompiledGrammar> {
    typst_registry()
        .load_grammar(TYPST_SCOPE)
        .expect("built-in grammar compiles")
        .expect("built-in grammar is found")
}

/// Compile an inline JSON grammar against a fresh engine
pub fn compile_grammar(json: &str) -> CompiledGrammar {
    let engine = RegexEngine::with_defaults()
        .initialize()
        .expect("default engine starts");
    let raw = parse_raw_grammar(json, "inline.tmLanguage.json").expect("grammar parses");
    CompiledGrammar::compile(&raw, &engine).expect("grammar compiles")
}

/// Tokenize `lines` in order, threading the rule stack through
pub fn tokenize_lines(grammar: &CompiledGrammar, lines: &[&str]) -> Vec<LineTokens> {
    let mut stack = RuleStack::INITIAL;
    lines
        .iter()
        .map(|line| {
            let result = tokenize_line(line, &stack, grammar);
            stack = result.rule_stack.clone();
            result
        })
        .collect()
}

/// Scopes of the token covering `column`
pub fn scopes_at(tokens: &[Token], column: usize) -> Vec<String> {
    tokens
        .iter()
        .take_while(|t| t.start_column <= column)
        .last()
        .map(|t| t.scopes.clone())
        .unwrap_or_default()
}

pub fn has_scope(tokens: &[Token], scope: &str) -> bool {
    tokens
        .iter()
        .any(|t| t.scopes.iter().any(|s| s == scope))
}

pub fn samples_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("samples")
}

/// Every `.typ` sample, sorted by name
pub fn sample_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(samples_dir())
        .expect("samples directory exists")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "typ"))
        .collect();
    paths.sort();
    paths
}

pub fn sample(name: &str) -> String {
    std::fs::read_to_string(samples_dir().join(name)).expect("sample exists")
}

/// The built-in Typst language entry
pub fn typst_builtin() -> &'static tmbridge::language::BuiltinLanguage {
    &BUILTIN_LANGUAGES[0]
}
