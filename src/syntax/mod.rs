//! Syntax tokenization
//!
//! Line-at-a-time TextMate tokenization:
//! - [`RuleStack`]: the state carried between lines
//! - [`tokenize_line`]: runs a compiled grammar over one line
//!
//! ## Architecture
//!
//! ```text
//! line N text + RuleStack(N-1) → tokenize_line → Vec<Token> + RuleStack(N)
//!                                     ↓
//!                        theme::resolve_display_token → DisplayToken
//! ```

mod stack;
mod tokenizer;

pub use stack::{RuleStack, StackFrame};
pub use tokenizer::{tokenize_line, LineTokens, Token};
