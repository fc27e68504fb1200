//! Line tokenizer
//!
//! Runs a compiled grammar over one line, starting from the rule stack the
//! previous line ended with. Columns are character columns into the line.

use std::ops::Range;
use std::sync::Arc;

use super::stack::{RuleStack, StackFrame};
use crate::grammar::{expand_scope_name, CompiledGrammar, RuleId, RuleKind};
use crate::regex_engine::{MatchableString, ScanMatch};

/// Consecutive non-advancing pushes tolerated on one line
const MAX_ZERO_WIDTH_PUSHES: usize = 64;

/// A run of text sharing one scope stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Character column where the token starts
    pub start_column: usize,
    /// Scopes, outermost first
    pub scopes: Vec<String>,
}

/// Tokens of one line plus the stack the next line starts from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTokens {
    pub tokens: Vec<Token>,
    pub rule_stack: RuleStack,
}

/// Tokenize `line` (without its line terminator)
pub fn tokenize_line(line: &str, stack: &RuleStack, grammar: &CompiledGrammar) -> LineTokens {
    let mut stack = if stack.is_initial() {
        RuleStack::INITIAL.push(root_frame(grammar))
    } else {
        stack.clone()
    };

    // Grammars are written against newline-terminated lines
    let text = grammar
        .engine()
        .create_matchable_string(&format!("{}\n", line));
    let line_end = text.len();

    let mut acc = TokenAccumulator::default();
    let mut pos = 0;
    stack = check_while_conditions(grammar, &text, stack, &mut acc, &mut pos);

    // (depth, scan position) of frames pushed on this line
    let mut entered: Vec<(usize, usize)> = Vec::new();
    let mut zero_width_pushes = 0;

    loop {
        let Some(top) = stack.top().cloned() else {
            break;
        };
        let Some(found) = next_match(grammar, &text, pos, &top) else {
            acc.produce(&top.content_scopes, line_end);
            break;
        };

        let matched = found.scan;
        let has_advanced = matched.end() > pos;

        match found.target {
            MatchTarget::End => {
                acc.produce(&top.content_scopes, matched.start());
                let popped = stack.clone();
                stack = stack.pop();

                let end_captures: &[Option<String>] = match &grammar.rule(top.rule_id).kind {
                    RuleKind::BeginEnd { end_captures, .. } => end_captures.as_slice(),
                    _ => &[],
                };
                handle_captures(&mut acc, &text, &top.name_scopes, end_captures, &matched.captures);
                acc.produce(&top.name_scopes, matched.end());

                let depth = popped.depth();
                if !has_advanced && entered.contains(&(depth, pos)) {
                    // Pushed and popped without advancing
                    stack = popped;
                    acc.produce(&top.content_scopes, line_end);
                    break;
                }
            }
            MatchTarget::Rule(rule_id) => {
                acc.produce(&top.content_scopes, matched.start());
                let rule = grammar.rule(rule_id);
                let mut name_scopes = top.content_scopes.to_vec();
                if let Some(name) = &rule.name {
                    name_scopes.extend(expand_scope_name(name, text.as_str(), &matched.captures));
                }

                match &rule.kind {
                    RuleKind::BeginEnd {
                        begin_captures,
                        end,
                        ..
                    }
                    | RuleKind::BeginWhile {
                        begin_captures,
                        condition: end,
                        ..
                    } => {
                        handle_captures(&mut acc, &text, &name_scopes, begin_captures, &matched.captures);
                        acc.produce(&name_scopes, matched.end());

                        let mut content_scopes = name_scopes.clone();
                        if let Some(content_name) = &rule.content_name {
                            content_scopes.extend(expand_scope_name(
                                content_name,
                                text.as_str(),
                                &matched.captures,
                            ));
                        }
                        let follow = grammar.resolve_end(end, text.as_str(), &matched.captures);
                        let (end, condition) = match rule.kind {
                            RuleKind::BeginWhile { .. } => (None, Some(follow)),
                            _ => (Some(follow), None),
                        };
                        let before_push = stack.clone();
                        stack = stack.push(StackFrame {
                            rule_id,
                            end,
                            condition,
                            name_scopes: Arc::from(name_scopes),
                            content_scopes: Arc::from(content_scopes),
                        });
                        let depth = stack.depth();
                        entered.retain(|&(d, _)| d < depth);
                        entered.push((depth, pos));

                        if !has_advanced {
                            zero_width_pushes += 1;
                            if top.rule_id == rule_id || zero_width_pushes > MAX_ZERO_WIDTH_PUSHES {
                                if top.rule_id != rule_id {
                                    tracing::warn!(
                                        "{}: runaway zero-width begin chain",
                                        grammar.scope_name()
                                    );
                                }
                                stack = before_push;
                                acc.produce(&top.content_scopes, line_end);
                                break;
                            }
                        }
                    }
                    RuleKind::Match { captures, .. } => {
                        handle_captures(&mut acc, &text, &name_scopes, captures, &matched.captures);
                        acc.produce(&name_scopes, matched.end());
                        if !has_advanced {
                            acc.produce(&top.content_scopes, line_end);
                            break;
                        }
                    }
                    RuleKind::Include { .. } => {}
                }
            }
        }

        if has_advanced {
            zero_width_pushes = 0;
            pos = matched.end();
        }
    }

    let tokens = acc.finish(&text, line.len(), &stack);
    tracing::trace!("Tokenized line into {} tokens", tokens.len());
    LineTokens {
        tokens,
        rule_stack: stack,
    }
}

fn root_frame(grammar: &CompiledGrammar) -> StackFrame {
    let scopes: Arc<[String]> = Arc::from(vec![grammar.scope_name().to_string()]);
    StackFrame {
        rule_id: grammar.root(),
        end: None,
        condition: None,
        name_scopes: scopes.clone(),
        content_scopes: scopes,
    }
}

/// Re-check the `while` conditions of open begin/while frames, outermost
/// first. The first frame whose condition fails is popped together with
/// every frame above it.
fn check_while_conditions(
    grammar: &CompiledGrammar,
    text: &MatchableString,
    stack: RuleStack,
    acc: &mut TokenAccumulator,
    pos: &mut usize,
) -> RuleStack {
    let mut while_stacks = Vec::new();
    let mut current = stack.clone();
    while let Some(frame) = current.top() {
        if frame.condition.is_some() {
            while_stacks.push(current.clone());
        }
        current = current.pop();
    }

    for frame_stack in while_stacks.into_iter().rev() {
        let Some(frame) = frame_stack.top() else {
            continue;
        };
        let found = frame
            .condition
            .as_ref()
            .and_then(|condition| condition.pattern.as_ref())
            .and_then(|pattern| pattern.find_at(text, *pos));
        let Some(found) = found else {
            return frame_stack.pop();
        };

        let while_captures: &[Option<String>] = match &grammar.rule(frame.rule_id).kind {
            RuleKind::BeginWhile { while_captures, .. } => while_captures.as_slice(),
            _ => &[],
        };
        acc.produce(&frame.content_scopes, found.start());
        handle_captures(acc, text, &frame.content_scopes, while_captures, &found.captures);
        acc.produce(&frame.content_scopes, found.end());
        *pos = (*pos).max(found.end());
    }
    stack
}

enum MatchTarget {
    End,
    Rule(RuleId),
}

struct FoundMatch {
    target: MatchTarget,
    scan: ScanMatch,
}

/// Earliest of the frame's child patterns and its end pattern
fn next_match(
    grammar: &CompiledGrammar,
    text: &MatchableString,
    pos: usize,
    top: &StackFrame,
) -> Option<FoundMatch> {
    let child = grammar.scanner(top.rule_id).and_then(|rules| {
        rules
            .scanner
            .find_next_match(text, pos)
            .map(|scan| FoundMatch {
                target: MatchTarget::Rule(rules.rules[scan.index]),
                scan,
            })
    });
    let end = top
        .end
        .as_ref()
        .and_then(|end| end.pattern.as_ref())
        .and_then(|pattern| pattern.find_at(text, pos))
        .map(|scan| FoundMatch {
            target: MatchTarget::End,
            scan,
        });

    let end_last = matches!(
        grammar.rule(top.rule_id).kind,
        RuleKind::BeginEnd {
            apply_end_pattern_last: true,
            ..
        }
    );

    match (child, end) {
        (Some(child), Some(end)) => {
            let end_wins = if end_last {
                end.scan.start() < child.scan.start()
            } else {
                end.scan.start() <= child.scan.start()
            };
            Some(if end_wins { end } else { child })
        }
        (child, end) => child.or(end),
    }
}

/// Emit tokens for named capture groups, nesting groups inside each other
fn handle_captures(
    acc: &mut TokenAccumulator,
    text: &MatchableString,
    base: &[String],
    names: &[Option<String>],
    captures: &[Option<Range<usize>>],
) {
    if names.is_empty() {
        return;
    }
    let Some(Some(whole)) = captures.first() else {
        return;
    };
    let max_end = whole.end;

    let mut open: Vec<(Vec<String>, usize)> = Vec::new();
    for (index, name) in names.iter().enumerate().take(captures.len()) {
        let (Some(name), Some(range)) = (name, &captures[index]) else {
            continue;
        };
        if range.is_empty() {
            continue;
        }
        if range.start > max_end {
            break;
        }

        while let Some((scopes, end)) = open.last() {
            if *end > range.start {
                break;
            }
            acc.produce(scopes, *end);
            open.pop();
        }

        let parent: &[String] = open.last().map_or(base, |(scopes, _)| scopes.as_slice());
        acc.produce(parent, range.start);

        let mut scopes = parent.to_vec();
        scopes.extend(expand_scope_name(name, text.as_str(), captures));
        open.push((scopes, range.end));
    }

    while let Some((scopes, end)) = open.pop() {
        acc.produce(&scopes, end);
    }
}

#[derive(Default)]
struct TokenAccumulator {
    /// (start byte, scopes)
    tokens: Vec<(usize, Vec<String>)>,
    last_end: usize,
}

impl TokenAccumulator {
    /// Close the pending token at byte `end` with `scopes`
    fn produce(&mut self, scopes: &[String], end: usize) {
        if self.last_end >= end {
            return;
        }
        self.tokens.push((self.last_end, scopes.to_vec()));
        self.last_end = end;
    }

    fn finish(mut self, text: &MatchableString, line_len: usize, stack: &RuleStack) -> Vec<Token> {
        // Drop the token covering only the synthetic newline
        if self
            .tokens
            .last()
            .is_some_and(|(start, _)| *start >= line_len)
        {
            self.tokens.pop();
        }
        if self.tokens.is_empty() {
            let scopes = stack
                .top()
                .map(|frame| frame.content_scopes.to_vec())
                .unwrap_or_default();
            return vec![Token {
                start_column: 0,
                scopes,
            }];
        }
        self.tokens
            .into_iter()
            .map(|(start, scopes)| Token {
                start_column: text.column_of(start),
                scopes,
            })
            .collect()
    }
}
