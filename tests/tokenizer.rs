//! Line tokenizer tests against the built-in Typst grammar

mod common;

use common::*;
use tmbridge::syntax::{tokenize_line, RuleStack};

fn scopes(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_tokenizing_twice_gives_identical_results() {
    let grammar = typst_grammar();
    for path in sample_paths() {
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        let first = tokenize_lines(&grammar, &lines);
        let second = tokenize_lines(&grammar, &lines);
        assert_eq!(first, second, "{}", path.display());
    }
}

#[test]
fn test_token_columns_are_well_formed() {
    let grammar = typst_grammar();
    for path in sample_paths() {
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        for (line, result) in lines.iter().zip(tokenize_lines(&grammar, &lines)) {
            let tokens = &result.tokens;
            assert!(!tokens.is_empty(), "{}: {:?}", path.display(), line);
            assert_eq!(tokens[0].start_column, 0);
            assert!(
                tokens.windows(2).all(|w| w[0].start_column < w[1].start_column),
                "{}: {:?} -> {:?}",
                path.display(),
                line,
                tokens
            );
            let width = line.chars().count();
            assert!(tokens.iter().all(|t| t.start_column < width.max(1)));
            assert!(tokens.iter().all(|t| t.scopes[0] == TYPST_SCOPE));
        }
    }
}

#[test]
fn test_block_comment_state_carries_across_lines() {
    let grammar = typst_grammar();
    let results = tokenize_lines(&grammar, &["text /* open", "inside", "close */ text"]);

    assert_ne!(results[0].rule_stack, RuleStack::INITIAL);
    assert_eq!(
        results[0].rule_stack.top().map(|f| f.content_scopes.to_vec()),
        Some(scopes(&["source.typst", "comment.block.typst"]))
    );

    assert_eq!(results[1].tokens.len(), 1);
    assert_eq!(
        results[1].tokens[0].scopes,
        scopes(&["source.typst", "comment.block.typst"])
    );

    let closing = &results[2].tokens;
    assert_eq!(
        scopes_at(closing, 0),
        scopes(&["source.typst", "comment.block.typst"])
    );
    assert_eq!(
        scopes_at(closing, 6),
        scopes(&[
            "source.typst",
            "comment.block.typst",
            "punctuation.definition.comment.typst"
        ])
    );
    assert_eq!(scopes_at(closing, 9), scopes(&["source.typst"]));

    // Back at the top level, same as a line that never saw a comment
    let plain = tokenize_line("text", &RuleStack::INITIAL, &grammar);
    assert_eq!(results[2].rule_stack, plain.rule_stack);
}

#[test]
fn test_same_text_depends_on_start_state() {
    let grammar = typst_grammar();
    let fresh = tokenize_line("inside", &RuleStack::INITIAL, &grammar);
    assert_eq!(fresh.tokens[0].scopes, scopes(&["source.typst"]));

    let opened = tokenize_line("/*", &RuleStack::INITIAL, &grammar);
    let continued = tokenize_line("inside", &opened.rule_stack, &grammar);
    assert!(has_scope(&continued.tokens, "comment.block.typst"));
}

#[test]
fn test_nested_block_comments() {
    let grammar = typst_grammar();
    let results = tokenize_lines(&grammar, &["/* a /* b */ still", "c */ done"]);
    assert!(has_scope(&results[1].tokens, "comment.block.typst"));
    assert_eq!(scopes_at(&results[1].tokens, 5), scopes(&["source.typst"]));
}

#[test]
fn test_function_arguments_span_lines() {
    let grammar = typst_grammar();
    let results = tokenize_lines(&grammar, &["#rect(width: 2pt,", "  fill: red)", "after"]);

    let first = &results[0].tokens;
    assert_eq!(
        scopes_at(first, 1),
        scopes(&[
            "source.typst",
            "meta.function-call.typst",
            "entity.name.function.typst"
        ])
    );
    assert!(has_scope(first, "variable.parameter.typst"));
    assert!(has_scope(first, "constant.numeric.typst"));

    assert_eq!(
        results[1].tokens[0].scopes,
        scopes(&[
            "source.typst",
            "meta.function-call.typst",
            "meta.function.parameters.typst"
        ])
    );
    assert_eq!(results[2].tokens[0].scopes, scopes(&["source.typst"]));
}

#[test]
fn test_raw_block_end_refers_to_opening_fence() {
    let grammar = typst_grammar();
    let results = tokenize_lines(&grammar, &["````typ", "```", "still raw", "````", "text"]);

    assert_eq!(
        scopes_at(&results[0].tokens, 4),
        scopes(&[
            "source.typst",
            "markup.raw.block.typst",
            "fenced_code.block.language.typst"
        ])
    );
    // A shorter fence does not close a longer one
    assert!(has_scope(&results[2].tokens, "markup.raw.block.typst"));
    assert_eq!(results[4].tokens[0].scopes, scopes(&["source.typst"]));
}

#[test]
fn test_heading_ends_at_end_of_line() {
    let grammar = typst_grammar();
    let results = tokenize_lines(&grammar, &["== Section *bold*", "body"]);
    assert_eq!(
        scopes_at(&results[0].tokens, 0),
        scopes(&[
            "source.typst",
            "markup.heading.typst",
            "punctuation.definition.heading.typst"
        ])
    );
    assert!(has_scope(&results[0].tokens, "markup.bold.typst"));
    assert_eq!(results[1].tokens[0].scopes, scopes(&["source.typst"]));
}

#[test]
fn test_empty_line_inside_math_keeps_content_scopes() {
    let grammar = typst_grammar();
    let results = tokenize_lines(&grammar, &["$ x +", "", "y $"]);
    assert_eq!(results[1].tokens.len(), 1);
    assert_eq!(results[1].tokens[0].start_column, 0);
    assert_eq!(
        results[1].tokens[0].scopes,
        scopes(&["source.typst", "string.other.math.typst"])
    );
}

#[test]
fn test_columns_count_characters() {
    let grammar = typst_grammar();
    let result = tokenize_line("Grüße @ref", &RuleStack::INITIAL, &grammar);
    assert_eq!(
        scopes_at(&result.tokens, 6),
        scopes(&[
            "source.typst",
            "markup.other.reference.typst",
            "punctuation.definition.reference.typst"
        ])
    );
    assert!(result.tokens.iter().any(|t| t.start_column == 6));
}

#[test]
fn test_line_start_end_pattern_waits_for_next_line() {
    let grammar = compile_grammar(
        r#"{ "scopeName": "source.indent", "patterns": [
            { "begin": "<<", "end": "^(?!\\s)", "name": "meta.block.indent" }
        ] }"#,
    );
    let results = tokenize_lines(&grammar, &["<<", "  kept", "", "done"]);

    assert_eq!(results[0].rule_stack.depth(), 2);
    assert_eq!(results[1].rule_stack.depth(), 2);
    assert_eq!(
        results[1].tokens[0].scopes,
        scopes(&["source.indent", "meta.block.indent"])
    );
    assert_eq!(results[2].rule_stack.depth(), 2);
    assert_eq!(results[3].rule_stack.depth(), 1);
    assert_eq!(results[3].tokens[0].scopes, scopes(&["source.indent"]));
}

const QUOTE_GRAMMAR: &str = r#"{
    "scopeName": "source.quote",
    "patterns": [{
        "begin": "^(>) ", "while": "^(>) ", "name": "markup.quote.q",
        "beginCaptures": { "1": { "name": "punctuation.definition.quote.q" } },
        "whileCaptures": { "1": { "name": "punctuation.definition.quote.q" } },
        "patterns": [{ "match": "\\*\\w+\\*", "name": "markup.bold.q" }]
    }]
}"#;

#[test]
fn test_begin_while_region_continues_while_condition_matches() {
    let grammar = compile_grammar(QUOTE_GRAMMAR);
    let results = tokenize_lines(&grammar, &["> one", "> *two*", "three"]);

    assert_eq!(results[0].rule_stack.depth(), 2);
    assert_eq!(results[1].rule_stack.depth(), 2);
    assert_eq!(
        scopes_at(&results[1].tokens, 0),
        scopes(&["source.quote", "markup.quote.q", "punctuation.definition.quote.q"])
    );
    assert_eq!(
        scopes_at(&results[1].tokens, 3),
        scopes(&["source.quote", "markup.quote.q", "markup.bold.q"])
    );

    assert_eq!(results[2].rule_stack.depth(), 1);
    assert_eq!(results[2].tokens.len(), 1);
    assert_eq!(results[2].tokens[0].scopes, scopes(&["source.quote"]));
}

#[test]
fn test_begin_while_region_ends_on_empty_line() {
    let grammar = compile_grammar(QUOTE_GRAMMAR);
    let results = tokenize_lines(&grammar, &["> one", "", "> two"]);
    assert_eq!(results[1].rule_stack.depth(), 1);
    // A fresh quote opens on the third line
    assert_eq!(results[2].rule_stack.depth(), 2);
}
