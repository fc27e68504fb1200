//! Regex engine adapter
//!
//! Wraps `fancy-regex` behind the two primitives the grammar interpreter
//! needs: a [`Scanner`] (an ordered set of patterns searched together) and a
//! [`MatchableString`] (a line of text plus column bookkeeping).
//!
//! The engine is initialized lazily, once per [`RegexEngine`]. Its tuning
//! payload comes from a pluggable [`EngineSource`]; a failed initialization is
//! cached and handed to every later caller until [`RegexEngine::reset`] is
//! called.

use std::ops::Range;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use fancy_regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pattern compiled once at initialization to prove the engine works
const SELF_TEST_PATTERN: &str = r#"(['"])(?:(?!\1).)*\1"#;

/// Engine initialization failures (cached and shared by all callers)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineInitError {
    #[error("failed to fetch regex engine payload: {0}")]
    Fetch(String),

    #[error("failed to decode regex engine payload: {0}")]
    Decode(String),

    #[error("regex engine self-test failed: {0}")]
    SelfTest(String),
}

/// A single pattern failed to compile
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pattern {pattern:?}: {message}")]
pub struct PatternError {
    pub pattern: String,
    pub message: String,
}

/// Tuning payload for the backtracking engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Maximum backtracking steps per search before giving up on a pattern
    pub backtrack_limit: usize,
    /// Size limit for the compiled program of delegated (non-fancy) regexes
    pub delegate_size_limit: Option<usize>,
    /// Size limit for the lazy DFA of delegated regexes
    pub delegate_dfa_size_limit: Option<usize>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            backtrack_limit: 1_000_000,
            delegate_size_limit: None,
            delegate_dfa_size_limit: None,
        }
    }
}

/// Where the engine payload comes from
pub trait EngineSource: Send + Sync {
    /// Fetch and decode the engine options
    fn load(&self) -> Result<EngineOptions, EngineInitError>;
}

/// Built-in defaults, never fails
#[derive(Debug, Clone, Default)]
pub struct DefaultEngineSource;

impl EngineSource for DefaultEngineSource {
    fn load(&self) -> Result<EngineOptions, EngineInitError> {
        Ok(EngineOptions::default())
    }
}

/// Engine options read from a YAML file
#[derive(Debug, Clone)]
pub struct FileEngineSource {
    pub path: PathBuf,
}

impl FileEngineSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EngineSource for FileEngineSource {
    fn load(&self) -> Result<EngineOptions, EngineInitError> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| EngineInitError::Fetch(format!("{}: {}", self.path.display(), e)))?;
        serde_yaml::from_str(&content)
            .map_err(|e| EngineInitError::Decode(format!("{}: {}", self.path.display(), e)))
    }
}

type InitCell = OnceLock<Result<EngineHandle, EngineInitError>>;

/// Lazily initialized, memoized regex engine
///
/// Owned by the application's composition root and shared as `Arc<RegexEngine>`.
pub struct RegexEngine {
    source: Box<dyn EngineSource>,
    cell: Mutex<Arc<InitCell>>,
}

impl RegexEngine {
    pub fn new(source: impl EngineSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cell: Mutex::new(Arc::new(OnceLock::new())),
        }
    }

    /// Engine with built-in options
    pub fn with_defaults() -> Self {
        Self::new(DefaultEngineSource)
    }

    /// Initialize the engine (or return the memoized result)
    ///
    /// Concurrent callers block on the same initialization and all observe
    /// the same outcome, success or failure.
    pub fn initialize(&self) -> Result<EngineHandle, EngineInitError> {
        let cell = {
            let guard = self.cell.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(&guard)
        };
        cell.get_or_init(|| self.load_engine()).clone()
    }

    /// Whether an initialization attempt has completed (successfully or not)
    pub fn is_initialized(&self) -> bool {
        let guard = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        guard.get().is_some()
    }

    /// Forget a cached result so the next `initialize` fetches again
    pub fn reset(&self) {
        let mut guard = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(OnceLock::new());
        tracing::debug!("Regex engine reset");
    }

    fn load_engine(&self) -> Result<EngineHandle, EngineInitError> {
        tracing::debug!("Initializing regex engine");
        let options = self.source.load().inspect_err(|e| {
            tracing::error!("Regex engine initialization failed: {}", e);
        })?;

        let handle = EngineHandle {
            options: Arc::new(options),
        };
        handle
            .compile(SELF_TEST_PATTERN)
            .map_err(|e| EngineInitError::SelfTest(e.message))?;

        tracing::info!(
            "Regex engine ready (backtrack limit {})",
            handle.options.backtrack_limit
        );
        Ok(handle)
    }
}

impl Default for RegexEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Cheap, cloneable handle to an initialized engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    options: Arc<EngineOptions>,
}

impl EngineHandle {
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Compile a single grammar pattern
    pub fn compile(&self, source: &str) -> Result<Pattern, PatternError> {
        let (translated, anchored) = translate_pattern(source);
        // `^` and `$` match at line boundaries, as in Oniguruma
        let mut builder = RegexBuilder::new(&format!("(?m){}", translated));
        builder.backtrack_limit(self.options.backtrack_limit);
        if let Some(limit) = self.options.delegate_size_limit {
            builder.delegate_size_limit(limit);
        }
        if let Some(limit) = self.options.delegate_dfa_size_limit {
            builder.delegate_dfa_size_limit(limit);
        }
        let regex = builder.build().map_err(|e| PatternError {
            pattern: source.to_string(),
            message: e.to_string(),
        })?;
        Ok(Pattern {
            source: source.to_string(),
            regex,
            anchored,
        })
    }

    /// Build a scanner over `patterns`, searched in declaration order
    pub fn create_scanner<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Scanner, PatternError> {
        let patterns = patterns
            .iter()
            .map(|p| self.compile(p.as_ref()).map(Some))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Scanner { patterns })
    }

    /// Wrap a line of text for scanning
    pub fn create_matchable_string(&self, text: &str) -> MatchableString {
        MatchableString::new(text)
    }
}

/// Rewrite oniguruma-only syntax into something `fancy-regex` accepts.
///
/// Returns the translated pattern and whether it contained a `\G` anchor.
/// A line start `^` never matches at the very end of the text, as in
/// Oniguruma, so it cannot fire after the newline appended to each line.
fn translate_pattern(source: &str) -> (String, bool) {
    let mut out = String::with_capacity(source.len());
    let mut anchored = false;
    let mut class_depth = 0usize;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('G') if class_depth == 0 => anchored = true,
                Some('h') => out.push_str("[0-9a-fA-F]"),
                Some('H') => out.push_str("[^0-9a-fA-F]"),
                Some('Z') if class_depth == 0 => out.push_str(r"(?=\n?\z)"),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            },
            '[' => {
                class_depth += 1;
                out.push('[');
                // A leading `^` negates and a leading `]` is literal
                if chars.peek() == Some(&'^') {
                    chars.next();
                    out.push('^');
                }
                if chars.peek() == Some(&']') {
                    chars.next();
                    out.push(']');
                }
            }
            ']' if class_depth > 0 => {
                class_depth -= 1;
                out.push(']');
            }
            '^' if class_depth == 0 => out.push_str(r"(?:^(?!\z))"),
            _ => out.push(c),
        }
    }

    (out, anchored)
}

/// A compiled pattern plus its original source text
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
    anchored: bool,
}

impl Pattern {
    /// Source text as written in the grammar
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the pattern only matches at the scan start (`\G`)
    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    /// Search `text` starting at byte offset `start`
    ///
    /// Backtracking blow-ups are logged and reported as no match.
    pub fn find_at(&self, text: &MatchableString, start: usize) -> Option<ScanMatch> {
        let haystack = text.as_str();
        if start > haystack.len() {
            return None;
        }
        let captures = match self.regex.captures_from_pos(haystack, start) {
            Ok(Some(caps)) => caps,
            Ok(None) => return None,
            Err(e) => {
                tracing::trace!("Pattern {:?} failed at {}: {}", self.source, start, e);
                return None;
            }
        };
        let whole = captures.get(0)?;
        if self.anchored && whole.start() != start {
            return None;
        }
        let groups = (0..captures.len())
            .map(|i| captures.get(i).map(|m| m.start()..m.end()))
            .collect();
        Some(ScanMatch { index: 0, captures: groups })
    }
}

/// Result of a scan: which pattern matched, and its capture ranges (bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanMatch {
    /// Index of the matching pattern in the scanner
    pub index: usize,
    /// Capture group byte ranges; index 0 is the whole match
    pub captures: Vec<Option<Range<usize>>>,
}

impl ScanMatch {
    pub fn start(&self) -> usize {
        self.captures[0].as_ref().map_or(0, |r| r.start)
    }

    pub fn end(&self) -> usize {
        self.captures[0].as_ref().map_or(0, |r| r.end)
    }
}

/// Ordered set of patterns searched together
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    /// `None` marks a slot whose pattern failed to compile and never matches
    patterns: Vec<Option<Pattern>>,
}

impl Scanner {
    /// Build from individually compiled patterns (failed slots never match)
    pub fn from_patterns(patterns: Vec<Option<Pattern>>) -> Self {
        Self { patterns }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Find the earliest match at or after `start`
    ///
    /// Ties at the same position go to the first-declared pattern.
    pub fn find_next_match(&self, text: &MatchableString, start: usize) -> Option<ScanMatch> {
        let mut best: Option<ScanMatch> = None;

        for (index, pattern) in self.patterns.iter().enumerate() {
            let Some(pattern) = pattern else { continue };
            let Some(mut found) = pattern.find_at(text, start) else {
                continue;
            };
            found.index = index;
            let is_better = best.as_ref().map_or(true, |b| found.start() < b.start());
            if is_better {
                let done = found.start() == start;
                best = Some(found);
                if done {
                    break;
                }
            }
        }

        best
    }
}

/// A line of text prepared for scanning
#[derive(Debug, Clone)]
pub struct MatchableString {
    text: String,
    is_ascii: bool,
}

impl MatchableString {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            is_ascii: text.is_ascii(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Convert a byte offset into a character column
    pub fn column_of(&self, byte: usize) -> usize {
        let byte = byte.min(self.text.len());
        if self.is_ascii {
            return byte;
        }
        let mut valid = byte;
        while valid > 0 && !self.text.is_char_boundary(valid) {
            valid -= 1;
        }
        self.text[..valid].chars().count()
    }
}
