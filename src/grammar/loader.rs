//! Grammar sources
//!
//! A [`GrammarLoader`] maps a scope name to grammar text. Loaders never fail
//! loudly: a missing or unreadable grammar is logged and reported as `None`,
//! which the registry treats as "grammar not found".

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Grammar text plus the path it was declared under
///
/// The path picks the parse format (`.json` vs `.yaml`) and shows up in errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarSource {
    pub path: String,
    pub text: String,
}

impl GrammarSource {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// Resolves scope names to grammar sources
pub trait GrammarLoader: Send + Sync {
    fn load(&self, scope_name: &str) -> Option<GrammarSource>;
}

impl<F> GrammarLoader for F
where
    F: Fn(&str) -> Option<GrammarSource> + Send + Sync,
{
    fn load(&self, scope_name: &str) -> Option<GrammarSource> {
        self(scope_name)
    }
}

/// Where one grammar lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarLocation {
    /// File on disk (`file://` URLs accepted)
    Path(PathBuf),
    /// Text compiled into the binary or already in memory
    Embedded { path: String, text: String },
}

impl GrammarLocation {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        GrammarLocation::Path(path.into())
    }

    pub fn embedded(path: impl Into<String>, text: impl Into<String>) -> Self {
        GrammarLocation::Embedded {
            path: path.into(),
            text: text.into(),
        }
    }

    /// Read the grammar; errors are logged and reported as `None`
    pub fn fetch(&self) -> Option<GrammarSource> {
        match self {
            GrammarLocation::Path(path) => grammar_from_path(path),
            GrammarLocation::Embedded { path, text } => {
                Some(GrammarSource::new(path.clone(), text.clone()))
            }
        }
    }
}

impl fmt::Display for GrammarLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarLocation::Path(path) => write!(f, "{}", path.display()),
            GrammarLocation::Embedded { path, .. } => write!(f, "embedded:{}", path),
        }
    }
}

/// Read a grammar file
pub fn grammar_from_path(path: &Path) -> Option<GrammarSource> {
    let path = match path.to_str().and_then(|p| p.strip_prefix("file://")) {
        Some(stripped) => PathBuf::from(stripped),
        None => path.to_path_buf(),
    };

    match std::fs::read_to_string(&path) {
        Ok(text) => {
            tracing::debug!("Read grammar from {}", path.display());
            Some(GrammarSource::new(path.display().to_string(), text))
        }
        Err(e) => {
            tracing::error!("Failed to read grammar {}: {}", path.display(), e);
            None
        }
    }
}

/// Loader that serves exactly one scope from `location`
pub fn single_scope_loader(scope_name: impl Into<String>, location: GrammarLocation) -> ScopeHandlers {
    ScopeHandlers::new().with_location(scope_name, location)
}

type ScopeHandler = Box<dyn Fn() -> Option<GrammarSource> + Send + Sync>;

/// Table of scope name to grammar handler
///
/// Unknown scopes are logged and reported as not found.
#[derive(Default)]
pub struct ScopeHandlers {
    handlers: HashMap<String, ScopeHandler>,
}

impl ScopeHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler<F>(mut self, scope_name: impl Into<String>, handler: F) -> Self
    where
        F: Fn() -> Option<GrammarSource> + Send + Sync + 'static,
    {
        self.insert(scope_name, handler);
        self
    }

    pub fn with_location(self, scope_name: impl Into<String>, location: GrammarLocation) -> Self {
        self.with_handler(scope_name, move || location.fetch())
    }

    pub fn insert<F>(&mut self, scope_name: impl Into<String>, handler: F)
    where
        F: Fn() -> Option<GrammarSource> + Send + Sync + 'static,
    {
        self.handlers.insert(scope_name.into(), Box::new(handler));
    }

    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl GrammarLoader for ScopeHandlers {
    fn load(&self, scope_name: &str) -> Option<GrammarSource> {
        match self.handlers.get(scope_name) {
            Some(handler) => handler(),
            None => {
                tracing::warn!("Unknown scope name: {}", scope_name);
                None
            }
        }
    }
}

impl fmt::Debug for ScopeHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeHandlers")
            .field("scopes", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_handlers_dispatch() {
        let handlers = ScopeHandlers::new()
            .with_handler("source.a", || Some(GrammarSource::new("a.json", "{}")))
            .with_handler("source.b", || None);

        assert_eq!(handlers.load("source.a").unwrap().path, "a.json");
        assert!(handlers.load("source.b").is_none());
        assert!(handlers.load("source.c").is_none());
    }

    #[test]
    fn test_grammar_from_path_accepts_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.tmLanguage.json");
        std::fs::write(&path, "{\"scopeName\": \"source.g\"}").unwrap();

        let url = PathBuf::from(format!("file://{}", path.display()));
        let source = grammar_from_path(&url).unwrap();
        assert!(source.text.contains("source.g"));
        assert!(source.path.ends_with("g.tmLanguage.json"));
    }

    #[test]
    fn test_grammar_from_missing_path_is_none() {
        assert!(grammar_from_path(Path::new("/nonexistent/grammar.json")).is_none());
    }

    #[test]
    fn test_single_scope_loader_ignores_other_scopes() {
        let loader = single_scope_loader(
            "source.x",
            GrammarLocation::embedded("x.json", "{\"scopeName\": \"source.x\"}"),
        );
        assert!(loader.load("source.x").is_some());
        assert!(loader.load("source.y").is_none());
    }

    #[test]
    fn test_single_scope_loader_owns_its_scope_name() {
        let scope = String::from("source.owned");
        let loader = single_scope_loader(
            scope.as_str(),
            GrammarLocation::embedded("owned.json", "{\"scopeName\": \"source.owned\"}"),
        );
        drop(scope);

        let registry = crate::grammar::GrammarRegistry::new(
            std::sync::Arc::new(crate::regex_engine::RegexEngine::with_defaults()),
            loader,
        );
        assert!(registry.load_grammar("source.owned").unwrap().is_some());
    }
}
