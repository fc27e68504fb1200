//! TextMate grammars
//!
//! - [`raw`]: serde model of `.tmLanguage.json` / `.tmLanguage.yaml`
//! - [`compile`]: rule table and scanners built against the regex engine
//! - [`loader`]: where grammar text comes from
//! - [`registry`]: per-scope cache of compiled grammars

mod compile;
mod loader;
mod raw;
mod registry;

pub use compile::{
    expand_scope_name, CaptureNames, CompiledGrammar, EndPattern, EndRule, Rule, RuleId,
    RuleKind, RuleScanner,
};
pub use loader::{
    grammar_from_path, single_scope_loader, GrammarLoader, GrammarLocation, GrammarSource,
    ScopeHandlers,
};
pub use raw::{parse_raw_grammar, Flag, GrammarFormat, RawCapture, RawCaptures, RawGrammar, RawRule};
pub use registry::GrammarRegistry;

use thiserror::Error;

use crate::regex_engine::EngineInitError;

/// Grammar loading failures
///
/// Cloneable so one cached failure can be handed to every caller asking for
/// the same scope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("failed to parse grammar {path}: {message}")]
    Parse { path: String, message: String },

    #[error("failed to compile grammar {scope}: {message}")]
    Compile { scope: String, message: String },

    #[error(transparent)]
    Engine(#[from] EngineInitError),
}
