//! Text buffer with incremental line tokenization
//!
//! Each line caches its tokens and the tokenizer state it ends in. Edits
//! drop the cache of the touched lines only. Re-tokenization resumes at the
//! first line not known to be valid and stops as soon as a recomputed line
//! ends in the same state it ended in before, because every later line then
//! starts exactly as it did when it was cached.

use std::borrow::Cow;
use std::ops::Range;

use ropey::Rope;

use crate::host::{StyledToken, TokenizerState, TokensProvider};

#[derive(Debug, Clone)]
struct LineCache {
    tokens: Vec<StyledToken>,
    end_state: TokenizerState,
    /// Content changed; only `end_state` is kept, for comparison
    stale: bool,
}

/// Text buffer plus per-line token cache
#[derive(Debug, Clone)]
pub struct Document {
    buffer: Rope,
    /// One slot per line; `None` means the line must be tokenized again
    lines: Vec<Option<LineCache>>,
    /// Every line before this index has valid tokens
    first_invalid: usize,
}

impl Document {
    pub fn new() -> Self {
        Self::with_text("")
    }

    pub fn with_text(text: &str) -> Self {
        let buffer = Rope::from(text);
        let lines = vec![None; buffer.len_lines()];
        Self {
            buffer,
            lines,
            first_invalid: 0,
        }
    }

    pub fn text(&self) -> String {
        self.buffer.to_string()
    }

    /// Number of lines (an empty buffer has one line)
    pub fn line_count(&self) -> usize {
        self.buffer.len_lines()
    }

    pub fn len_chars(&self) -> usize {
        self.buffer.len_chars()
    }

    /// Line content without its line ending
    pub fn line(&self, line_idx: usize) -> Option<Cow<'_, str>> {
        if line_idx >= self.buffer.len_lines() {
            return None;
        }

        let line = self.buffer.line(line_idx);
        let len = line.len_chars();
        let trim_len = if len > 0 && line.char(len - 1) == '\n' {
            if len > 1 && line.char(len - 2) == '\r' {
                2
            } else {
                1
            }
        } else {
            0
        };

        let trimmed = line.slice(..len - trim_len);
        match trimmed.as_str() {
            Some(s) => Some(Cow::Borrowed(s)),
            None => Some(Cow::Owned(trimmed.to_string())),
        }
    }

    /// Char offset of (line, column), clamped to the buffer
    pub fn offset(&self, line: usize, column: usize) -> usize {
        if line >= self.buffer.len_lines() {
            return self.buffer.len_chars();
        }
        let line_len = self.line(line).map_or(0, |l| l.chars().count());
        self.buffer.line_to_char(line) + column.min(line_len)
    }

    /// Replace the chars in `range` with `text`
    pub fn replace(&mut self, range: Range<usize>, text: &str) {
        let len = self.buffer.len_chars();
        let start = range.start.min(len);
        let end = range.end.clamp(start, len);

        let first_line = self.buffer.char_to_line(start);
        let last_line = self.buffer.char_to_line(end);
        let lines_before = self.buffer.len_lines();

        if end > start {
            self.buffer.remove(start..end);
        }
        if !text.is_empty() {
            self.buffer.insert(start, text);
        }

        let lines_after = self.buffer.len_lines();
        let touched = last_line - first_line + 1;
        let replacement = (touched + lines_after).saturating_sub(lines_before);

        // The last replaced line keeps its old end state, so a recomputation
        // that ends the same way can stop right there
        let carried = self.lines[last_line].take().map(|mut cache| {
            cache.tokens.clear();
            cache.stale = true;
            cache
        });
        let mut slots = vec![None; replacement.saturating_sub(1)];
        if replacement > 0 {
            slots.push(carried);
        }
        self.lines.splice(first_line..=last_line, slots);
        debug_assert_eq!(self.lines.len(), lines_after);

        self.first_invalid = self.first_invalid.min(first_line);
        tracing::trace!(
            "Edit at lines {}..={} ({} -> {} lines)",
            first_line,
            last_line,
            lines_before,
            lines_after
        );
    }

    pub fn insert(&mut self, char_idx: usize, text: &str) {
        self.replace(char_idx..char_idx, text);
    }

    pub fn delete(&mut self, range: Range<usize>) {
        self.replace(range, "");
    }

    /// Replace the whole buffer
    pub fn set_text(&mut self, text: &str) {
        *self = Self::with_text(text);
    }

    /// Forget every cached line, e.g. after a theme or provider change
    pub fn invalidate_all(&mut self) {
        self.lines.iter_mut().for_each(|slot| *slot = None);
        self.first_invalid = 0;
    }

    /// First line whose tokens are not known to be valid
    pub fn first_invalid_line(&self) -> usize {
        self.first_invalid
    }

    /// Tokenize lines until `up_to` (inclusive) has valid tokens
    ///
    /// Returns how many lines were actually tokenized.
    pub fn ensure_tokenized(&mut self, provider: &dyn TokensProvider, up_to: usize) -> usize {
        let line_count = self.lines.len();
        let last = up_to.min(line_count.saturating_sub(1));
        let mut line_idx = self.first_invalid;
        let mut tokenized = 0;

        while line_idx <= last && line_idx < line_count {
            let begin = match line_idx.checked_sub(1) {
                Some(prev) => self.lines[prev]
                    .as_ref()
                    .map(|cache| cache.end_state.clone())
                    .unwrap_or_else(|| provider.initial_state()),
                None => provider.initial_state(),
            };

            let text = self.line(line_idx).unwrap_or_default();
            let output = provider.tokenize(&text, &begin);
            let settled = self.lines[line_idx]
                .as_ref()
                .is_some_and(|old| old.end_state == output.end_state);

            self.lines[line_idx] = Some(LineCache {
                tokens: output.tokens,
                end_state: output.end_state,
                stale: false,
            });
            tokenized += 1;
            line_idx += 1;

            if settled {
                // Later cached lines start from the same state as before
                while line_idx < line_count
                    && self.lines[line_idx].as_ref().is_some_and(|c| !c.stale)
                {
                    line_idx += 1;
                }
            }
        }

        self.first_invalid = self.first_invalid.max(line_idx.min(line_count));
        tracing::trace!(
            "Tokenized {} lines, valid up to {}",
            tokenized,
            self.first_invalid
        );
        tokenized
    }

    /// Cached tokens of a line, if they are valid
    pub fn tokens(&self, line_idx: usize) -> Option<&[StyledToken]> {
        if line_idx >= self.first_invalid {
            return None;
        }
        self.lines
            .get(line_idx)
            .and_then(|slot| slot.as_ref())
            .map(|cache| cache.tokens.as_slice())
    }

    /// State the line ends in, if its tokens are valid
    pub fn end_state(&self, line_idx: usize) -> Option<&TokenizerState> {
        if line_idx >= self.first_invalid {
            return None;
        }
        self.lines
            .get(line_idx)
            .and_then(|slot| slot.as_ref())
            .map(|cache| &cache.end_state)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
