//! Persistent rule stack carried from one line to the next

use std::fmt;
use std::sync::Arc;

use crate::grammar::{EndPattern, RuleId};

/// One entered rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub rule_id: RuleId,
    /// End pattern resolved when the frame was pushed (`None` for the root)
    pub end: Option<EndPattern>,
    /// `while` condition checked at the start of each following line
    pub condition: Option<EndPattern>,
    /// Scopes of the frame itself, used for begin and end tokens
    pub name_scopes: Arc<[String]>,
    /// Scopes applied to text between begin and end (adds `contentName`)
    pub content_scopes: Arc<[String]>,
}

struct StackNode {
    frame: StackFrame,
    parent: Option<Arc<StackNode>>,
    depth: usize,
}

/// Immutable linked stack of [`StackFrame`]s
///
/// Push, pop and clone are O(1) and share tails. Two stacks are equal when
/// their frame sequences are equal, whether or not they share nodes.
#[derive(Clone, Default)]
pub struct RuleStack {
    head: Option<Arc<StackNode>>,
}

impl RuleStack {
    /// Stack before the first line of a document
    pub const INITIAL: RuleStack = RuleStack { head: None };

    pub fn is_initial(&self) -> bool {
        self.head.is_none()
    }

    /// Number of frames
    pub fn depth(&self) -> usize {
        self.head.as_ref().map_or(0, |node| node.depth)
    }

    pub fn top(&self) -> Option<&StackFrame> {
        self.head.as_ref().map(|node| &node.frame)
    }

    pub fn push(&self, frame: StackFrame) -> RuleStack {
        RuleStack {
            head: Some(Arc::new(StackNode {
                frame,
                parent: self.head.clone(),
                depth: self.depth() + 1,
            })),
        }
    }

    /// Stack without the top frame (`INITIAL` stays `INITIAL`)
    pub fn pop(&self) -> RuleStack {
        RuleStack {
            head: self.head.as_ref().and_then(|node| node.parent.clone()),
        }
    }

    /// Frames from top to bottom
    pub fn frames(&self) -> impl Iterator<Item = &StackFrame> {
        let mut current = self.head.as_deref();
        std::iter::from_fn(move || {
            let node = current?;
            current = node.parent.as_deref();
            Some(&node.frame)
        })
    }
}

impl PartialEq for RuleStack {
    fn eq(&self, other: &Self) -> bool {
        let mut a = self.head.as_ref();
        let mut b = other.head.as_ref();
        loop {
            match (a, b) {
                (None, None) => return true,
                (Some(x), Some(y)) => {
                    if Arc::ptr_eq(x, y) {
                        return true;
                    }
                    if x.depth != y.depth || x.frame != y.frame {
                        return false;
                    }
                    a = x.parent.as_ref();
                    b = y.parent.as_ref();
                }
                _ => return false,
            }
        }
    }
}

impl Eq for RuleStack {}

impl fmt::Debug for RuleStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rules: Vec<RuleId> = self.frames().map(|frame| frame.rule_id).collect();
        rules.reverse();
        f.debug_struct("RuleStack").field("rules", &rules).finish()
    }
}
