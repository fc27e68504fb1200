//! Scope stack to display token resolution
//!
//! Editors colour one token name per span, but TextMate produces a stack of
//! scopes. The stack is searched from the innermost scope outwards, trying
//! ever shorter dotted prefixes of each scope, and the first candidate the
//! theme actually colours wins.

use super::{ResolvedStyle, Theme};

/// Token name handed to the editor plus the style the theme gives it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayToken {
    pub scope: String,
    pub style: ResolvedStyle,
}

/// Language suffix of the outermost scope (`source.typst` → `typst`)
pub fn base_language<S: AsRef<str>>(scopes: &[S]) -> &str {
    scopes
        .first()
        .map(|s| s.as_ref())
        .and_then(|s| s.rsplit('.').next())
        .unwrap_or("")
}

/// Pick the display token for a scope stack (outermost first)
///
/// For `meta.function.parameters.typst` the candidates are, in order:
/// `meta.function.parameters.typst`, `meta.function.parameters`,
/// `meta.function.typst`, `meta.function`, `meta.typst`, `meta`. A candidate
/// matches when the theme gives it a foreground other than the default
/// foreground. `None` means default colouring.
pub fn resolve_display_token<S: AsRef<str>>(scopes: &[S], theme: &Theme) -> Option<DisplayToken> {
    let first = scopes.first()?.as_ref();
    if first.is_empty() {
        return None;
    }
    let base = base_language(scopes);
    let default_foreground = theme.default_foreground();

    for scope in scopes.iter().rev() {
        let scope = scope.as_ref();
        for (dot, _) in scope.rmatch_indices('.') {
            let prefix = &scope[..dot];

            let qualified = format!("{}.{}", prefix, base);
            let style = theme.match_scope(&qualified);
            if style.foreground != default_foreground {
                return Some(DisplayToken {
                    scope: qualified,
                    style,
                });
            }

            let style = theme.match_scope(prefix);
            if style.foreground != default_foreground {
                return Some(DisplayToken {
                    scope: prefix.to_string(),
                    style,
                });
            }
        }
    }

    None
}
