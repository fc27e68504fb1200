//! Scope trie for theme lookups
//!
//! Each node holds a fully resolved style. Nodes are created by cloning
//! their parent's style, so attributes a rule does not set are inherited
//! from the nearest shorter scope.

use std::collections::HashMap;

use super::{Color, FontStyle, ThemeRule};

/// Style with every attribute filled in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedStyle {
    pub foreground: Color,
    pub background: Color,
    pub font_style: FontStyle,
}

impl Default for ResolvedStyle {
    fn default() -> Self {
        Self {
            foreground: Color::rgb(0x00, 0x00, 0x00),
            background: Color::rgb(0xFF, 0xFF, 0xFF),
            font_style: FontStyle::empty(),
        }
    }
}

impl ResolvedStyle {
    fn overwrite(&mut self, rule: &ThemeRule) {
        if let Some(fg) = rule.foreground {
            self.foreground = fg;
        }
        if let Some(bg) = rule.background {
            self.background = bg;
        }
        if let Some(style) = rule.font_style {
            self.font_style = style;
        }
    }
}

#[derive(Debug, Clone, Default)]
struct TrieNode {
    style: ResolvedStyle,
    children: HashMap<String, TrieNode>,
}

impl TrieNode {
    fn with_style(style: ResolvedStyle) -> Self {
        Self {
            style,
            children: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThemeTrie {
    root: TrieNode,
}

impl ThemeTrie {
    /// Build from rules in application order
    ///
    /// Rules are stably sorted by scope first, so a parent scope is always
    /// inserted before its children and later duplicates win.
    pub fn from_rules(rules: &[ThemeRule]) -> Self {
        let mut sorted: Vec<&ThemeRule> = rules.iter().collect();
        sorted.sort_by(|a, b| a.scope.cmp(&b.scope));

        let mut trie = ThemeTrie::default();
        for rule in sorted {
            trie.insert(rule);
        }
        trie
    }

    fn insert(&mut self, rule: &ThemeRule) {
        let mut node = &mut self.root;
        if !rule.scope.is_empty() {
            for segment in rule.scope.split('.') {
                let inherited = node.style;
                node = node
                    .children
                    .entry(segment.to_string())
                    .or_insert_with(|| TrieNode::with_style(inherited));
            }
        }
        node.style.overwrite(rule);
    }

    /// Style of the longest rule scope that is a dotted prefix of `scope`
    pub fn matches(&self, scope: &str) -> ResolvedStyle {
        let mut node = &self.root;
        if scope.is_empty() {
            return node.style;
        }
        for segment in scope.split('.') {
            match node.children.get(segment) {
                Some(child) => node = child,
                None => break,
            }
        }
        node.style
    }

    /// Style of the empty scope
    pub fn defaults(&self) -> ResolvedStyle {
        self.root.style
    }
}
