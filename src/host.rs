//! Host editor interface
//!
//! The bridge never draws anything. It talks to an editor through
//! [`HostEditor`]: languages are registered, a language configuration and
//! a [`TokensProvider`] are attached, and themes are defined and switched.
//! The editor then asks the provider for tokens one line at a time, passing
//! back the state the previous line ended in.
//!
//! [`HeadlessHost`] is a complete in-memory host used by the CLI and tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::grammar::CompiledGrammar;
use crate::language::LanguageConfiguration;
use crate::syntax::{tokenize_line, RuleStack};
use crate::theme::{resolve_display_token, ActiveTheme, ResolvedStyle, Theme};

/// Opaque per-line state handed back to the provider for the next line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenizerState {
    pub rule_stack: RuleStack,
}

impl TokenizerState {
    pub fn initial() -> Self {
        Self {
            rule_stack: RuleStack::INITIAL,
        }
    }
}

/// One token as the editor sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledToken {
    /// Char column where the token starts
    pub start_column: usize,
    /// Display token name (empty for default colouring)
    pub scope: String,
    /// Style from the active theme, `None` for default colouring
    pub style: Option<ResolvedStyle>,
    /// Full scope stack, outermost first
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTokens {
    pub tokens: Vec<StyledToken>,
    pub end_state: TokenizerState,
}

/// Line tokenizer installed on a language
///
/// `tokenize` never fails; a grammar problem degrades colouring, it does
/// not stop the editor.
pub trait TokensProvider: Send + Sync {
    fn initial_state(&self) -> TokenizerState {
        TokenizerState::initial()
    }

    fn tokenize(&self, line: &str, state: &TokenizerState) -> ProviderTokens;
}

/// TextMate grammar composed with the scope matcher
pub struct TextMateTokensProvider {
    grammar: Arc<CompiledGrammar>,
    theme: Option<ActiveTheme>,
}

impl TextMateTokensProvider {
    pub fn new(grammar: Arc<CompiledGrammar>, theme: ActiveTheme) -> Self {
        Self {
            grammar,
            theme: Some(theme),
        }
    }

    /// Provider that reports the innermost scope and leaves styling to the host
    pub fn unstyled(grammar: Arc<CompiledGrammar>) -> Self {
        Self {
            grammar,
            theme: None,
        }
    }

    pub fn grammar(&self) -> &Arc<CompiledGrammar> {
        &self.grammar
    }
}

impl TokensProvider for TextMateTokensProvider {
    fn tokenize(&self, line: &str, state: &TokenizerState) -> ProviderTokens {
        let line_tokens = tokenize_line(line, &state.rule_stack, &self.grammar);
        // One snapshot per line, so a theme switch never splits a line
        let theme = self.theme.as_ref().map(ActiveTheme::snapshot);

        let tokens = line_tokens
            .tokens
            .into_iter()
            .map(|token| {
                let (scope, style) = match &theme {
                    Some(theme) => match resolve_display_token(&token.scopes, theme) {
                        Some(display) => (display.scope, Some(display.style)),
                        None => (String::new(), None),
                    },
                    None => (token.scopes.last().cloned().unwrap_or_default(), None),
                };
                StyledToken {
                    start_column: token.start_column,
                    scope,
                    style,
                    scopes: token.scopes,
                }
            })
            .collect();

        ProviderTokens {
            tokens,
            end_state: TokenizerState {
                rule_stack: line_tokens.rule_stack,
            },
        }
    }
}

impl fmt::Debug for TextMateTokensProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextMateTokensProvider")
            .field("scope_name", &self.grammar.scope_name())
            .field("themed", &self.theme.is_some())
            .finish()
    }
}

/// Fallback provider: every line is a single unstyled token
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextProvider;

impl TokensProvider for PlainTextProvider {
    fn tokenize(&self, _line: &str, state: &TokenizerState) -> ProviderTokens {
        ProviderTokens {
            tokens: vec![StyledToken {
                start_column: 0,
                scope: String::new(),
                style: None,
                scopes: Vec::new(),
            }],
            end_state: state.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("theme {0} is not defined")]
    UnknownTheme(String),

    #[error("language {0} is not registered")]
    UnknownLanguage(String),
}

/// Editor surface the bridge drives
pub trait HostEditor: Send + Sync {
    fn register_language(&self, language_id: &str);

    fn set_language_configuration(
        &self,
        language_id: &str,
        configuration: LanguageConfiguration,
    ) -> Result<(), HostError>;

    fn set_tokens_provider(
        &self,
        language_id: &str,
        provider: Arc<dyn TokensProvider>,
    ) -> Result<(), HostError>;

    /// Define (or redefine) a named theme
    fn define_theme(&self, name: &str, theme: Arc<Theme>);

    fn set_theme(&self, name: &str) -> Result<(), HostError>;

    /// Shared handle that always points at the active theme
    fn theme_handle(&self) -> ActiveTheme;
}

#[derive(Default)]
struct HostLanguage {
    configuration: Option<LanguageConfiguration>,
    provider: Option<Arc<dyn TokensProvider>>,
}

#[derive(Default)]
struct HostState {
    languages: HashMap<String, HostLanguage>,
    themes: HashMap<String, Arc<Theme>>,
    active_theme_name: Option<String>,
}

/// In-memory host editor
pub struct HeadlessHost {
    state: RwLock<HostState>,
    active: ActiveTheme,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HostState::default()),
            active: ActiveTheme::default(),
        }
    }

    pub fn is_registered(&self, language_id: &str) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.languages.contains_key(language_id)
    }

    pub fn languages(&self) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = state.languages.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn configuration(&self, language_id: &str) -> Option<LanguageConfiguration> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .languages
            .get(language_id)
            .and_then(|lang| lang.configuration.clone())
    }

    pub fn tokens_provider(&self, language_id: &str) -> Option<Arc<dyn TokensProvider>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .languages
            .get(language_id)
            .and_then(|lang| lang.provider.clone())
    }

    pub fn theme(&self, name: &str) -> Option<Arc<Theme>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.themes.get(name).cloned()
    }

    pub fn theme_names(&self) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = state.themes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Name passed to the last successful `set_theme`
    pub fn active_theme_name(&self) -> Option<String> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.active_theme_name.clone()
    }
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostEditor for HeadlessHost {
    fn register_language(&self, language_id: &str) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state
            .languages
            .entry(language_id.to_string())
            .or_default();
        tracing::debug!("Registered language {}", language_id);
    }

    fn set_language_configuration(
        &self,
        language_id: &str,
        configuration: LanguageConfiguration,
    ) -> Result<(), HostError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let language = state
            .languages
            .get_mut(language_id)
            .ok_or_else(|| HostError::UnknownLanguage(language_id.to_string()))?;
        language.configuration = Some(configuration);
        Ok(())
    }

    fn set_tokens_provider(
        &self,
        language_id: &str,
        provider: Arc<dyn TokensProvider>,
    ) -> Result<(), HostError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let language = state
            .languages
            .get_mut(language_id)
            .ok_or_else(|| HostError::UnknownLanguage(language_id.to_string()))?;
        language.provider = Some(provider);
        Ok(())
    }

    fn define_theme(&self, name: &str, theme: Arc<Theme>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        // Redefining the active theme takes effect immediately
        if state.active_theme_name.as_deref() == Some(name) {
            self.active.set(Arc::clone(&theme));
        }
        state.themes.insert(name.to_string(), theme);
    }

    fn set_theme(&self, name: &str) -> Result<(), HostError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let theme = state
            .themes
            .get(name)
            .cloned()
            .ok_or_else(|| HostError::UnknownTheme(name.to_string()))?;
        self.active.set(theme);
        state.active_theme_name = Some(name.to_string());
        tracing::debug!("Active theme is now {}", name);
        Ok(())
    }

    fn theme_handle(&self) -> ActiveTheme {
        self.active.clone()
    }
}

impl fmt::Debug for HeadlessHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let mut languages: Vec<&String> = state.languages.keys().collect();
        languages.sort();
        f.debug_struct("HeadlessHost")
            .field("languages", &languages)
            .field("active_theme", &state.active_theme_name)
            .finish()
    }
}
