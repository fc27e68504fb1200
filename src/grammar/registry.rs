//! Per-scope cache of compiled grammars

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use super::loader::GrammarLoader;
use super::raw::parse_raw_grammar;
use super::{CompiledGrammar, GrammarError};
use crate::regex_engine::RegexEngine;

type GrammarSlot = OnceLock<Result<Option<Arc<CompiledGrammar>>, GrammarError>>;

/// Loads, compiles and caches grammars by scope name
///
/// The loader runs at most once per scope. Concurrent first requests for the
/// same scope wait on one another and share the result; requests for other
/// scopes proceed independently.
pub struct GrammarRegistry {
    engine: Arc<RegexEngine>,
    loader: Box<dyn GrammarLoader>,
    grammars: Mutex<HashMap<String, Arc<GrammarSlot>>>,
}

impl GrammarRegistry {
    pub fn new(engine: Arc<RegexEngine>, loader: impl GrammarLoader + 'static) -> Self {
        Self {
            engine,
            loader: Box::new(loader),
            grammars: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<RegexEngine> {
        &self.engine
    }

    /// Compiled grammar for `scope_name`
    ///
    /// `Ok(None)` means the loader does not know the scope. Parse and compile
    /// failures are cached for that scope only. Engine initialization errors
    /// are not cached here; the engine keeps its own memoized result.
    pub fn load_grammar(
        &self,
        scope_name: &str,
    ) -> Result<Option<Arc<CompiledGrammar>>, GrammarError> {
        let engine = self.engine.initialize()?;

        let slot = {
            let mut grammars = self.grammars.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(grammars.entry(scope_name.to_string()).or_default())
        };

        if let Some(cached) = slot.get() {
            tracing::debug!("Grammar cache hit: {}", scope_name);
            return cached.clone();
        }

        slot.get_or_init(|| {
            tracing::debug!("Grammar cache miss, loading: {}", scope_name);
            let Some(source) = self.loader.load(scope_name) else {
                tracing::warn!("No grammar found for scope {}", scope_name);
                return Ok(None);
            };

            let raw = parse_raw_grammar(&source.text, &source.path)?;
            if raw.scope_name != scope_name {
                tracing::warn!(
                    "Grammar {} declares scope {} but was requested as {}",
                    source.path,
                    raw.scope_name,
                    scope_name
                );
            }
            let compiled = CompiledGrammar::compile(&raw, &engine)?;
            Ok(Some(Arc::new(compiled)))
        })
        .clone()
        .inspect_err(|e| tracing::error!("{}", e))
    }

    /// Whether a load for `scope_name` has completed
    pub fn is_cached(&self, scope_name: &str) -> bool {
        let grammars = self.grammars.lock().unwrap_or_else(|e| e.into_inner());
        grammars
            .get(scope_name)
            .is_some_and(|slot| slot.get().is_some())
    }
}

impl std::fmt::Debug for GrammarRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let grammars = self.grammars.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("GrammarRegistry")
            .field("scopes", &grammars.keys().collect::<Vec<_>>())
            .finish()
    }
}
