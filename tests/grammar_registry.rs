//! Grammar registry and regex engine lifecycle tests

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use common::*;
use tmbridge::grammar::{GrammarError, GrammarRegistry, GrammarSource};
use tmbridge::language::TYPST_GRAMMAR_JSON;
use tmbridge::regex_engine::{EngineInitError, EngineOptions, EngineSource, FileEngineSource};
use tmbridge::RegexEngine;

/// Registry whose loader counts calls and is slow enough for threads to overlap
fn slow_counting_registry(engine: Arc<RegexEngine>) -> (Arc<GrammarRegistry>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let registry = GrammarRegistry::new(engine, move |scope: &str| {
        counter.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        (scope == TYPST_SCOPE).then(|| GrammarSource::new("typst.tmLanguage.json", TYPST_GRAMMAR_JSON))
    });
    (Arc::new(registry), calls)
}

#[test]
fn test_concurrent_first_loads_share_one_grammar() {
    let (registry, calls) = slow_counting_registry(Arc::new(RegexEngine::with_defaults()));
    let barrier = Arc::new(Barrier::new(8));

    let grammars: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                s.spawn(move || {
                    barrier.wait();
                    registry.load_grammar(TYPST_SCOPE).unwrap().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(grammars.iter().all(|g| Arc::ptr_eq(g, &grammars[0])));
}

#[test]
fn test_different_scopes_load_independently() {
    let (registry, calls) = slow_counting_registry(Arc::new(RegexEngine::with_defaults()));

    std::thread::scope(|s| {
        s.spawn(|| assert!(registry.load_grammar(TYPST_SCOPE).unwrap().is_some()));
        s.spawn(|| assert!(registry.load_grammar("source.other").unwrap().is_none()));
    });

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(registry.is_cached(TYPST_SCOPE));
    assert!(registry.is_cached("source.other"));
}

#[test]
fn test_registries_share_one_engine() {
    let engine = Arc::new(RegexEngine::with_defaults());
    let (first, _) = slow_counting_registry(engine.clone());
    let (second, _) = slow_counting_registry(engine.clone());

    assert!(!engine.is_initialized());
    first.load_grammar(TYPST_SCOPE).unwrap();
    assert!(engine.is_initialized());
    second.load_grammar(TYPST_SCOPE).unwrap();
    assert!(Arc::ptr_eq(first.engine(), second.engine()));
}

#[test]
fn test_engine_failure_is_reported_for_every_scope() {
    let engine = Arc::new(RegexEngine::new(FileEngineSource::new(
        "/nonexistent/tmbridge/engine.yaml",
    )));
    let (registry, calls) = slow_counting_registry(engine);

    let err = registry.load_grammar(TYPST_SCOPE).unwrap_err();
    assert!(matches!(err, GrammarError::Engine(EngineInitError::Fetch(_))));
    assert!(matches!(
        registry.load_grammar("source.other"),
        Err(GrammarError::Engine(_))
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!registry.is_cached(TYPST_SCOPE));
}

/// Fails until `failures` runs out
struct FlakySource {
    failures: AtomicUsize,
    attempts: AtomicUsize,
}

impl EngineSource for FlakySource {
    fn load(&self) -> Result<EngineOptions, EngineInitError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(EngineInitError::Fetch("connection reset".to_string()));
        }
        Ok(EngineOptions::default())
    }
}

#[test]
fn test_engine_failure_is_memoized_until_reset() {
    let engine = RegexEngine::new(FlakySource {
        failures: AtomicUsize::new(1),
        attempts: AtomicUsize::new(0),
    });

    let first = engine.initialize().unwrap_err();
    let second = engine.initialize().unwrap_err();
    assert_eq!(first, second);
    assert!(engine.is_initialized());

    engine.reset();
    assert!(!engine.is_initialized());
    assert!(engine.initialize().is_ok());
}

#[test]
fn test_engine_options_from_yaml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.yaml");
    std::fs::write(&path, "backtrack_limit: 5000\n").unwrap();

    let engine = RegexEngine::new(FileEngineSource::new(&path));
    let handle = engine.initialize().unwrap();
    assert_eq!(handle.options().backtrack_limit, 5000);
    assert_eq!(handle.options().delegate_size_limit, None);
}

#[test]
fn test_undecodable_engine_options() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.yaml");
    std::fs::write(&path, "backtrack_limit: [not, a, number]\n").unwrap();

    let engine = RegexEngine::new(FileEngineSource::new(&path));
    assert!(matches!(engine.initialize(), Err(EngineInitError::Decode(_))));
}

#[test]
fn test_builtin_grammar_metadata() {
    let grammar = typst_grammar();
    assert_eq!(grammar.scope_name(), TYPST_SCOPE);
    assert_eq!(grammar.name(), Some("Typst"));
    assert_eq!(grammar.file_types(), ["typ".to_string()]);
    assert!(grammar.rule_count() > 10);
}
