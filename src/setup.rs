//! Language and theme setup
//!
//! [`Bridge`] is the composition root: it owns the regex engine, one grammar
//! registry per language and the theme loader, and wires them into a
//! [`HostEditor`]. Every failure is logged here and returned; nothing below
//! this layer talks to the user.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::{BridgeConfig, ThemeEntry};
use crate::error::SetupError;
use crate::grammar::{single_scope_loader, GrammarLocation, GrammarRegistry};
use crate::host::{HostEditor, PlainTextProvider, TextMateTokensProvider, TokensProvider};
use crate::language::{LanguageConfiguration, LanguageRegistration, LanguageSpec, ProviderKind};
use crate::regex_engine::{FileEngineSource, RegexEngine};
use crate::theme::{FileThemeLoader, Theme, ThemeLoader, DEFAULT_THEME};

/// Shared services for wiring languages and themes into a host
pub struct Bridge {
    engine: Arc<RegexEngine>,
    registries: Mutex<HashMap<String, Arc<GrammarRegistry>>>,
    theme_loader: Box<dyn ThemeLoader>,
}

impl Bridge {
    pub fn new(engine: Arc<RegexEngine>, theme_loader: impl ThemeLoader + 'static) -> Self {
        Self {
            engine,
            registries: Mutex::new(HashMap::new()),
            theme_loader: Box::new(theme_loader),
        }
    }

    /// Built-in engine options, themes read from disk relative to the cwd
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(RegexEngine::with_defaults()), FileThemeLoader::new())
    }

    /// Engine options and theme root taken from `config`
    pub fn from_config(config: &BridgeConfig) -> Self {
        let config_dir = crate::config_paths::config_dir();
        let engine = match &config.engine_options {
            Some(path) => {
                let path = match &config_dir {
                    Some(dir) if path.is_relative() => dir.join(path),
                    _ => path.clone(),
                };
                RegexEngine::new(FileEngineSource::new(path))
            }
            None => RegexEngine::with_defaults(),
        };
        let loader = match config_dir {
            Some(dir) => FileThemeLoader::with_root(dir),
            None => FileThemeLoader::new(),
        };
        Self::new(Arc::new(engine), loader)
    }

    pub fn engine(&self) -> &Arc<RegexEngine> {
        &self.engine
    }

    /// Registry serving the grammar of a set-up language
    pub fn grammar_registry(&self, language_id: &str) -> Option<Arc<GrammarRegistry>> {
        let registries = self.registries.lock().unwrap_or_else(|e| e.into_inner());
        registries.get(language_id).cloned()
    }

    /// Register a language with the host and install its tokens provider
    ///
    /// Calling this again for the same language replaces the earlier setup.
    /// When the grammar is missing or broken the language still works with
    /// the plain-text provider; a broken grammar is also reported as an error.
    pub fn setup_language(
        &self,
        host: &dyn HostEditor,
        language_id: &str,
        scope_name: &str,
        configuration: LanguageConfiguration,
        grammar: GrammarLocation,
    ) -> Result<LanguageRegistration, SetupError> {
        host.register_language(language_id);
        host.set_language_configuration(language_id, configuration.clone())
            .inspect_err(|e| tracing::error!("Setup of {} failed: {}", language_id, e))?;

        tracing::debug!("Loading grammar {} for {} from {}", scope_name, language_id, grammar);
        let registry = Arc::new(GrammarRegistry::new(
            Arc::clone(&self.engine),
            single_scope_loader(scope_name, grammar),
        ));
        {
            let mut registries = self.registries.lock().unwrap_or_else(|e| e.into_inner());
            registries.insert(language_id.to_string(), Arc::clone(&registry));
        }

        let registration = |provider| LanguageRegistration {
            id: language_id.to_string(),
            scope_name: scope_name.to_string(),
            configuration: configuration.clone(),
            provider,
        };

        match registry.load_grammar(scope_name) {
            Ok(Some(grammar)) => {
                let provider: Arc<dyn TokensProvider> =
                    Arc::new(TextMateTokensProvider::new(grammar, host.theme_handle()));
                host.set_tokens_provider(language_id, provider)?;
                tracing::info!("Language {} ready ({})", language_id, scope_name);
                Ok(registration(ProviderKind::TextMate))
            }
            Ok(None) => {
                tracing::warn!(
                    "No grammar for {}, highlighting {} as plain text",
                    scope_name,
                    language_id
                );
                host.set_tokens_provider(language_id, Arc::new(PlainTextProvider))?;
                Ok(registration(ProviderKind::PlainText))
            }
            Err(e) => {
                let error = SetupError::from(e);
                tracing::error!("Setup of {} failed: {}", language_id, error);
                host.set_tokens_provider(language_id, Arc::new(PlainTextProvider))?;
                Err(error)
            }
        }
    }

    /// [`Bridge::setup_language`] for a prepared language
    pub fn setup_language_spec(
        &self,
        host: &dyn HostEditor,
        spec: &LanguageSpec,
    ) -> Result<LanguageRegistration, SetupError> {
        self.setup_language(
            host,
            &spec.id,
            &spec.scope_name,
            spec.configuration.clone(),
            spec.grammar.clone(),
        )
    }

    /// Set up several languages; one failing language does not stop the rest
    pub fn setup_languages(
        &self,
        host: &dyn HostEditor,
        specs: &[LanguageSpec],
    ) -> Vec<Result<LanguageRegistration, SetupError>> {
        specs
            .iter()
            .map(|spec| self.setup_language_spec(host, spec))
            .collect()
    }

    /// Load a theme and define it on the host under `name`
    pub fn register_theme(
        &self,
        host: &dyn HostEditor,
        name: &str,
        url: &str,
    ) -> Result<Arc<Theme>, SetupError> {
        let theme = self
            .theme_loader
            .load(name, url)
            .and_then(|data| Theme::from_data(name, data))
            .map(Arc::new)
            .inspect_err(|e| tracing::warn!("Skipping theme {}: {}", name, e))?;
        host.define_theme(name, Arc::clone(&theme));
        tracing::info!("Registered theme {}", name);
        Ok(theme)
    }

    /// Register every theme that loads; returns the names that made it
    pub fn register_themes(&self, host: &dyn HostEditor, entries: &[ThemeEntry]) -> Vec<String> {
        entries
            .iter()
            .filter(|entry| self.register_theme(host, &entry.name, &entry.url).is_ok())
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Switch the host to `name`, falling back to the built-in default theme
    pub fn activate_theme(&self, host: &dyn HostEditor, name: &str) -> Result<(), SetupError> {
        match host.set_theme(name) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!("Cannot activate theme {}: {}, using {}", name, e, DEFAULT_THEME);
                if host.set_theme(DEFAULT_THEME).is_err() {
                    host.define_theme(DEFAULT_THEME, Arc::new(Theme::default_dark()));
                    host.set_theme(DEFAULT_THEME)?;
                }
                Err(e.into())
            }
        }
    }

    /// Themes and languages from `config`, applied to `host`
    ///
    /// Returns the language registrations that succeeded. Failures are
    /// already logged.
    pub fn apply_config(&self, host: &dyn HostEditor, config: &BridgeConfig) -> Vec<LanguageRegistration> {
        self.register_themes(host, &config.theme_entries());
        let _ = self.activate_theme(host, &config.theme);

        let base_dir = crate::config_paths::config_dir();
        let specs = config.language_specs(base_dir.as_deref());
        self.setup_languages(host, &specs)
            .into_iter()
            .filter_map(Result::ok)
            .collect()
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registries = self.registries.lock().unwrap_or_else(|e| e.into_inner());
        let mut languages: Vec<&String> = registries.keys().collect();
        languages.sort();
        f.debug_struct("Bridge")
            .field("languages", &languages)
            .field("engine_initialized", &self.engine.is_initialized())
            .finish()
    }
}
