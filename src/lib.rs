//! tmbridge - incremental TextMate highlighting for line-oriented editors
//!
//! This crate compiles TextMate grammars against a backtracking regex
//! engine, tokenizes documents one line at a time while carrying the rule
//! stack across lines, and maps scope stacks to theme colours.
//!
//! ```text
//! GrammarLoader → GrammarRegistry → CompiledGrammar
//!                                        ↓
//! line text + RuleStack → syntax::tokenize_line → scopes → theme::resolve_display_token
//!                                        ↓
//!                         host::TokensProvider → HostEditor
//! ```
//!
//! [`setup::Bridge`] wires languages and themes into a [`host::HostEditor`].

pub mod cli;
pub mod config;
pub mod config_paths;
pub mod document;
pub mod error;
pub mod formatter;
pub mod grammar;
pub mod host;
pub mod language;
pub mod regex_engine;
pub mod setup;
pub mod syntax;
pub mod theme;
pub mod tracing;

// Re-export commonly used types
pub use config::BridgeConfig;
pub use document::Document;
pub use error::SetupError;
pub use grammar::{CompiledGrammar, GrammarRegistry};
pub use host::{HeadlessHost, HostEditor, TokensProvider};
pub use regex_engine::RegexEngine;
pub use setup::Bridge;
pub use syntax::{tokenize_line, RuleStack};
pub use theme::Theme;
