//! Formatting engine interface
//!
//! The bridge does not own a formatter. It drives one through [`Formatter`]
//! and keeps the playground-style session state around it: the last good
//! output survives a failing run, and the error stays visible until it is
//! dismissed.
//!
//! [`WhitespaceFormatter`] is a small layout-only engine for Typst sources.
//! It never reorders or rewrites content beyond:
//! - tabs in indentation expanded to `tab_spaces`
//! - trailing whitespace removed, exactly one final newline
//! - runs of blank lines capped at `blank_lines_upper_bound`
//! - repeated inner spaces collapsed (`collapse_markup_spaces`)
//! - `#import "...": b, a` items sorted (`reorder_import_items`)
//! - long paragraph lines wrapped at `max_width` (`wrap_text`)
//!
//! Fenced raw blocks are copied verbatim.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Formatting options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    pub max_width: usize,
    pub tab_spaces: usize,
    pub blank_lines_upper_bound: usize,
    pub collapse_markup_spaces: bool,
    pub reorder_import_items: bool,
    pub wrap_text: bool,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            max_width: 80,
            tab_spaces: 2,
            blank_lines_upper_bound: 2,
            collapse_markup_spaces: false,
            reorder_import_items: true,
            wrap_text: false,
        }
    }
}

impl FormatConfig {
    pub fn with_max_width(mut self, max_width: usize) -> Self {
        self.max_width = max_width;
        self
    }

    pub fn with_tab_spaces(mut self, tab_spaces: usize) -> Self {
        self.tab_spaces = tab_spaces;
        self
    }

    pub fn with_blank_lines_upper_bound(mut self, bound: usize) -> Self {
        self.blank_lines_upper_bound = bound;
        self
    }

    pub fn with_collapse_markup_spaces(mut self, collapse: bool) -> Self {
        self.collapse_markup_spaces = collapse;
        self
    }

    pub fn with_reorder_import_items(mut self, reorder: bool) -> Self {
        self.reorder_import_items = reorder;
        self
    }

    pub fn with_wrap_text(mut self, wrap: bool) -> Self {
        self.wrap_text = wrap;
        self
    }

    fn validate(&self) -> Result<(), FormatterError> {
        if self.max_width == 0 {
            return Err(FormatterError::InvalidConfig(
                "max_width must be positive".to_string(),
            ));
        }
        if self.tab_spaces == 0 {
            return Err(FormatterError::InvalidConfig(
                "tab_spaces must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Formatter failures; messages are shown to the user as-is
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatterError {
    #[error("{message} (line {line})")]
    Syntax { line: usize, message: String },

    #[error("{0}")]
    Engine(String),

    #[error("invalid format config: {0}")]
    InvalidConfig(String),

    #[error("formatting is not stable: second pass changed line {line}")]
    NotConverged { line: usize },
}

/// External formatting engine
pub trait Formatter: Send + Sync {
    fn format(&self, source: &str, config: &FormatConfig) -> Result<String, FormatterError>;

    /// Debug dump of the parsed document
    fn parse(&self, source: &str) -> Result<String, FormatterError>;

    /// Debug dump of the layout the formatter would print
    fn format_ir(&self, source: &str, config: &FormatConfig) -> Result<String, FormatterError>;
}

/// Results of one successful formatting run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatOutput {
    pub formatted: String,
    pub ast: String,
    pub ir: String,
}

/// Formatting state for one document
#[derive(Debug, Clone, Default)]
pub struct FormatSession {
    config: FormatConfig,
    output: Option<FormatOutput>,
    error: Option<FormatterError>,
}

impl FormatSession {
    pub fn new(config: FormatConfig) -> Self {
        Self {
            config,
            output: None,
            error: None,
        }
    }

    pub fn config(&self) -> &FormatConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: FormatConfig) {
        self.config = config;
    }

    /// Run `parse`, `format_ir` and `format` on `source`
    ///
    /// On failure the previous output is kept and the error is recorded.
    pub fn run(&mut self, formatter: &dyn Formatter, source: &str) -> Result<(), FormatterError> {
        let result = formatter.parse(source).and_then(|ast| {
            let ir = formatter.format_ir(source, &self.config)?;
            let formatted = formatter.format(source, &self.config)?;
            Ok(FormatOutput { formatted, ast, ir })
        });

        match result {
            Ok(output) => {
                self.output = Some(output);
                self.error = None;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Formatting failed: {}", e);
                self.error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Last successful output
    pub fn output(&self) -> Option<&FormatOutput> {
        self.output.as_ref()
    }

    pub fn error(&self) -> Option<&FormatterError> {
        self.error.as_ref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }
}

/// Format twice and require the second pass to change nothing
///
/// Returns the formatted text on success.
pub fn check_convergence(
    formatter: &dyn Formatter,
    source: &str,
    config: &FormatConfig,
) -> Result<String, FormatterError> {
    let first = formatter.format(source, config)?;
    let second = formatter.format(&first, config)?;
    if first == second {
        return Ok(first);
    }

    let line = first
        .lines()
        .zip(second.lines())
        .position(|(a, b)| a != b)
        .unwrap_or_else(|| first.lines().count().min(second.lines().count()));
    Err(FormatterError::NotConverged { line: line + 1 })
}

/// What a source line is, for layout purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Blank,
    RawFence,
    Raw,
    Heading(usize),
    ListItem,
    Comment,
    Import,
    Code,
    Paragraph,
}

impl LineKind {
    fn classify(content: &str) -> LineKind {
        if content.is_empty() {
            LineKind::Blank
        } else if content.starts_with("```") {
            LineKind::RawFence
        } else if content.starts_with('=') {
            LineKind::Heading(content.chars().take_while(|&c| c == '=').count())
        } else if content.starts_with("- ")
            || content.starts_with("+ ")
            || content.starts_with("/ ")
            || content.split(' ').next().is_some_and(is_enum_marker)
        {
            LineKind::ListItem
        } else if content.starts_with("//") || content.starts_with("/*") {
            LineKind::Comment
        } else if content.starts_with("#import ") {
            LineKind::Import
        } else if content.starts_with('#') {
            LineKind::Code
        } else {
            LineKind::Paragraph
        }
    }
}

/// Source line after indentation and trailing whitespace are normalized
struct Line<'a> {
    number: usize,
    kind: LineKind,
    indent: String,
    content: &'a str,
    /// Code block depth before this line
    depth: usize,
}

/// Layout-only formatter for Typst markup
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceFormatter;

impl WhitespaceFormatter {
    pub fn new() -> Self {
        Self
    }

    fn lines<'a>(&self, source: &'a str, tab_spaces: usize) -> Result<Vec<Line<'a>>, FormatterError> {
        let mut lines = Vec::new();
        let mut raw_start: Option<usize> = None;
        let mut depth = 0usize;

        for (i, text) in source.lines().enumerate() {
            let number = i + 1;
            let text = text.strip_suffix('\r').unwrap_or(text);

            if raw_start.is_some() {
                let kind = if text.trim_start().starts_with("```") {
                    raw_start = None;
                    LineKind::RawFence
                } else {
                    LineKind::Raw
                };
                lines.push(Line {
                    number,
                    kind,
                    indent: String::new(),
                    content: text,
                    depth,
                });
                continue;
            }

            let trimmed = text.trim_end();
            let content = trimmed.trim_start();
            let leading = &trimmed[..trimmed.len() - content.len()];
            let indent: String = leading
                .chars()
                .map(|c| if c == '\t' { " ".repeat(tab_spaces) } else { c.to_string() })
                .collect();

            let kind = LineKind::classify(content);
            if kind == LineKind::RawFence && content.matches("```").count() % 2 == 1 {
                raw_start = Some(number);
            }

            lines.push(Line {
                number,
                kind,
                indent,
                content,
                depth,
            });
            if kind != LineKind::RawFence {
                depth = brace_depth_after(content, depth);
            }
        }

        if let Some(start) = raw_start {
            return Err(FormatterError::Syntax {
                line: start,
                message: "unclosed raw block".to_string(),
            });
        }
        Ok(lines)
    }

    fn format_line(&self, line: &Line<'_>, config: &FormatConfig, out: &mut Vec<String>) {
        match line.kind {
            LineKind::Raw | LineKind::RawFence if line.indent.is_empty() => {
                out.push(line.content.to_string());
                return;
            }
            LineKind::Blank => {
                out.push(String::new());
                return;
            }
            _ => {}
        }

        let mut content = line.content.to_string();
        if config.reorder_import_items && line.kind == LineKind::Import {
            content = sort_import_items(&content);
        }
        if config.collapse_markup_spaces && line.kind != LineKind::RawFence {
            content = collapse_spaces(&content);
        }

        let wrappable = config.wrap_text
            && line.kind == LineKind::Paragraph
            && line.depth == 0
            && content.starts_with(|c: char| c.is_alphanumeric())
            && !content.contains(['`', '$', '"', '{', '}']);
        if wrappable && line.indent.len() + content.chars().count() > config.max_width {
            for piece in wrap_words(&content, config.max_width.saturating_sub(line.indent.len())) {
                out.push(format!("{}{}", line.indent, piece));
            }
        } else {
            out.push(format!("{}{}", line.indent, content));
        }
    }
}

impl Formatter for WhitespaceFormatter {
    fn format(&self, source: &str, config: &FormatConfig) -> Result<String, FormatterError> {
        config.validate()?;
        let lines = self.lines(source, config.tab_spaces)?;

        let mut formatted = Vec::with_capacity(lines.len());
        for line in &lines {
            self.format_line(line, config, &mut formatted);
        }

        let mut output = String::with_capacity(source.len());
        let mut blank_run = 0usize;
        let mut in_raw = false;
        for text in formatted {
            if text.trim_start().starts_with("```") && text.matches("```").count() % 2 == 1 {
                in_raw = !in_raw;
                blank_run = 0;
            } else if !in_raw && text.is_empty() {
                blank_run += 1;
                // Leading blank lines go entirely
                if output.is_empty() || blank_run > config.blank_lines_upper_bound {
                    continue;
                }
            } else {
                blank_run = 0;
            }
            output.push_str(&text);
            output.push('\n');
        }

        let kept = output.trim_end_matches('\n').len();
        output.truncate(kept);
        if !output.is_empty() {
            output.push('\n');
        }
        Ok(output)
    }

    fn parse(&self, source: &str) -> Result<String, FormatterError> {
        let lines = self.lines(source, 2)?;
        let mut dump = String::from("Document\n");
        for line in &lines {
            let _ = writeln!(
                dump,
                "  {:>4}: {:?} indent={} depth={}",
                line.number,
                line.kind,
                line.indent.len(),
                line.depth
            );
        }
        Ok(dump)
    }

    fn format_ir(&self, source: &str, config: &FormatConfig) -> Result<String, FormatterError> {
        config.validate()?;
        let lines = self.lines(source, config.tab_spaces)?;
        let mut ir = String::new();
        for line in &lines {
            let _ = match line.kind {
                LineKind::Blank => writeln!(ir, "hardline"),
                LineKind::Raw | LineKind::RawFence => writeln!(ir, "verbatim({:?})", line.content),
                _ => writeln!(
                    ir,
                    "indent({}, text({:?}))",
                    line.indent.len(),
                    line.content
                ),
            };
        }
        Ok(ir)
    }
}

/// Code block depth after `content`, ignoring strings and line comments
fn brace_depth_after(content: &str, mut depth: usize) -> usize {
    let mut in_string = false;
    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if in_string => {
                chars.next();
            }
            '"' => in_string = !in_string,
            '/' if !in_string && chars.peek() == Some(&'/') => break,
            '{' if !in_string => depth += 1,
            '}' if !in_string => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth
}

/// Collapse runs of spaces outside strings and inline raw
fn collapse_spaces(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut in_string = false;
    let mut in_raw = false;
    let mut prev_space = false;
    for c in content.chars() {
        match c {
            '"' if !in_raw => in_string = !in_string,
            '`' if !in_string => in_raw = !in_raw,
            _ => {}
        }
        if c == ' ' && !in_string && !in_raw {
            if prev_space {
                continue;
            }
            prev_space = true;
        } else {
            prev_space = false;
        }
        out.push(c);
    }
    out
}

/// `#import "pkg": c, a, b` → `#import "pkg": a, b, c`
fn sort_import_items(content: &str) -> String {
    let Some(split) = content.rfind("\":") else {
        return content.to_string();
    };
    let (head, rest) = content.split_at(split + 2);
    let items = rest.trim();
    if items.is_empty() || items == "*" || items.contains(['(', ')', '`', '"']) {
        return content.to_string();
    }

    let mut items: Vec<&str> = items
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect();
    items.sort_unstable();
    format!("{} {}", head, items.join(", "))
}

/// Greedy word wrap that never starts a line with list or heading markers
fn wrap_words(content: &str, width: usize) -> Vec<String> {
    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in content.split(' ').filter(|w| !w.is_empty()) {
        let fits = current.chars().count() + 1 + word.chars().count() <= width;
        let starts_block = word.starts_with(['-', '+', '/', '=', '#']) || is_enum_marker(word);
        if current.is_empty() {
            current.push_str(word);
        } else if fits || starts_block {
            current.push(' ');
            current.push_str(word);
        } else {
            pieces.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// `1.`, `12.` and similar numbered list markers
fn is_enum_marker(word: &str) -> bool {
    word.strip_suffix('.')
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(source: &str, config: FormatConfig) -> String {
        WhitespaceFormatter.format(source, &config).unwrap()
    }

    #[test]
    fn test_trailing_whitespace_and_final_newline() {
        assert_eq!(format("= Title  \nText\t\n\n\n", FormatConfig::default()), "= Title\nText\n");
        assert_eq!(format("", FormatConfig::default()), "");
        assert_eq!(format("\n\n", FormatConfig::default()), "");
    }

    #[test]
    fn test_blank_lines_are_capped() {
        let config = FormatConfig::default().with_blank_lines_upper_bound(1);
        assert_eq!(format("\n\na\n\n\n\nb\n", config), "a\n\nb\n");
    }

    #[test]
    fn test_tabs_expand_in_indentation() {
        let config = FormatConfig::default().with_tab_spaces(4);
        assert_eq!(format("- a\n\t- b\n", config), "- a\n    - b\n");
    }

    #[test]
    fn test_raw_blocks_are_verbatim() {
        let source = "```rust\nfn  main() {\t}  \n\n\n\n```\n";
        let config = FormatConfig::default().with_collapse_markup_spaces(true);
        assert_eq!(format(source, config), source);
    }

    #[test]
    fn test_unclosed_raw_block_is_syntax_error() {
        let err = WhitespaceFormatter
            .format("text\n```\ncode\n", &FormatConfig::default())
            .unwrap_err();
        assert_eq!(
            err,
            FormatterError::Syntax {
                line: 2,
                message: "unclosed raw block".to_string()
            }
        );
        assert_eq!(err.to_string(), "unclosed raw block (line 2)");
    }

    #[test]
    fn test_import_items_sorted() {
        assert_eq!(
            format("#import \"@preview/cetz:0.2.0\": draw, canvas\n", FormatConfig::default()),
            "#import \"@preview/cetz:0.2.0\": canvas, draw\n"
        );
        let keep = FormatConfig::default().with_reorder_import_items(false);
        assert_eq!(format("#import \"a.typ\": z, y\n", keep), "#import \"a.typ\": z, y\n");
        assert_eq!(
            format("#import \"a.typ\": *\n", FormatConfig::default()),
            "#import \"a.typ\": *\n"
        );
    }

    #[test]
    fn test_collapse_spaces_outside_strings() {
        let config = FormatConfig::default().with_collapse_markup_spaces(true);
        assert_eq!(
            format("a   b `x   y` #f(\"p   q\")\n", config),
            "a b `x   y` #f(\"p   q\")\n"
        );
    }

    #[test]
    fn test_wrap_text_at_max_width() {
        let config = FormatConfig::default().with_wrap_text(true).with_max_width(20);
        let out = format("one two three four five six seven eight\n", config);
        assert_eq!(out, "one two three four\nfive six seven eight\n");
        assert!(out.lines().all(|l| l.len() <= 20));
    }

    #[test]
    fn test_wrap_never_starts_a_list_item() {
        let config = FormatConfig::default().with_wrap_text(true).with_max_width(10);
        let out = format("alpha beta - gamma\n", config);
        assert!(out.lines().all(|l| !l.starts_with("- ")));
    }

    #[test]
    fn test_wrap_skips_code_blocks() {
        let config = FormatConfig::default().with_wrap_text(true).with_max_width(10);
        let source = "#let f() = {\n  value and more words here\n}\n";
        assert_eq!(format(source, config), source);
    }

    #[test]
    fn test_invalid_config() {
        let config = FormatConfig::default().with_tab_spaces(0);
        assert!(matches!(
            WhitespaceFormatter.format("x", &config),
            Err(FormatterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_session_keeps_last_output_on_error() {
        let mut session = FormatSession::new(FormatConfig::default());
        session.run(&WhitespaceFormatter, "= Hi  \n").unwrap();
        assert_eq!(session.output().unwrap().formatted, "= Hi\n");
        assert!(session.output().unwrap().ast.contains("Heading(1)"));

        assert!(session.run(&WhitespaceFormatter, "```\n").is_err());
        assert_eq!(session.output().unwrap().formatted, "= Hi\n");
        assert!(session.error().is_some());

        session.dismiss_error();
        assert!(session.error().is_none());
    }

    #[test]
    fn test_check_convergence_reports_unstable_formatter() {
        struct Appender;
        impl Formatter for Appender {
            fn format(&self, source: &str, _: &FormatConfig) -> Result<String, FormatterError> {
                Ok(format!("{}x\n", source))
            }
            fn parse(&self, _: &str) -> Result<String, FormatterError> {
                Ok(String::new())
            }
            fn format_ir(&self, _: &str, _: &FormatConfig) -> Result<String, FormatterError> {
                Ok(String::new())
            }
        }

        let err = check_convergence(&Appender, "a\n", &FormatConfig::default()).unwrap_err();
        assert_eq!(err, FormatterError::NotConverged { line: 3 });
        assert!(check_convergence(&WhitespaceFormatter, "a  \n", &FormatConfig::default()).is_ok());
    }
}
