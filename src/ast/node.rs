use std::fmt;
use std::sync::Arc;

use super::expr::FilteredExpr;
use super::span::Spanned;
use crate::registry::{TagHandler, TagState};

/// An ordered run of nodes. Insertion order is render order.
#[derive(Debug, Default)]
pub struct Nodelist {
    pub nodes: Vec<Node>,
}

pub type Node = Spanned<NodeKind>;

/// The kinds of content that can appear in a nodelist.
#[derive(Debug)]
pub enum NodeKind {
    /// Source text between delimiters, after whitespace trimming.
    Literal(String),

    /// `{{ expr | filter }}`, evaluated and stringified at render time.
    Output(FilteredExpr),

    /// A tag without a body, e.g. `{% assign x = 1 %}`.
    Tag(TagNode),

    /// A tag that owns a body up to its `end<name>` marker.
    Block(BlockNode),

    /// Verbatim body of `{% raw %}...{% endraw %}`.
    Raw(String),
}

/// A non-block tag: its name, the argument text as written, and the
/// state its handler produced while parsing.
pub struct TagNode {
    pub name: String,
    pub markup: String,
    pub(crate) handler: Arc<dyn TagHandler>,
    pub(crate) state: TagState,
}

/// A block tag together with its captured body.
///
/// Nodes up to the first branch tag (such as `else`) form `body`; each
/// branch tag starts a new [`Branch`].
pub struct BlockNode {
    pub name: String,
    pub markup: String,
    pub body: Nodelist,
    pub branches: Vec<Branch>,
    pub(crate) handler: Arc<dyn TagHandler>,
    pub(crate) state: TagState,
}

/// An intermediate section of a block, introduced by a branch tag.
pub struct Branch {
    pub name: String,
    pub markup: String,
    pub body: Nodelist,
    pub(crate) state: TagState,
}

impl Branch {
    /// The state the owning handler parsed from this branch's markup.
    pub fn state<T: 'static>(&self) -> Option<&T> {
        self.state.downcast_ref()
    }
}

impl Nodelist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    /// True when rendering this list can only produce whitespace: every
    /// literal is blank, every tag reports itself blank, and every block
    /// either reports itself blank or has only blank bodies.
    pub fn is_blank(&self) -> bool {
        self.nodes.iter().all(|node| match &node.node {
            NodeKind::Literal(text) => text.chars().all(crate::lexer::is_whitespace),
            NodeKind::Output(_) | NodeKind::Raw(_) => false,
            NodeKind::Tag(tag) => tag.handler.is_blank(),
            NodeKind::Block(block) => {
                block.handler.is_blank()
                    || (block.body.is_blank() && block.branches.iter().all(|b| b.body.is_blank()))
            }
        })
    }
}

impl<'a> IntoIterator for &'a Nodelist {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

impl fmt::Debug for TagNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagNode")
            .field("name", &self.name)
            .field("markup", &self.markup)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for BlockNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockNode")
            .field("name", &self.name)
            .field("markup", &self.markup)
            .field("body", &self.body)
            .field("branches", &self.branches)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Branch")
            .field("name", &self.name)
            .field("markup", &self.markup)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}
