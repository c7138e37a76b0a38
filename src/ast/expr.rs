use std::fmt;
use std::sync::Arc;

use super::span::Spanned;
use super::value::Value;
use crate::registry::Filter;

pub type Expr = Spanned<ExprKind>;

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Literal value: 'hello', 42, 1.5, true, nil
    Literal(Value),

    /// Variable lookup: `product.variants[0].title`
    Lookup(Lookup),

    /// Inclusive range: `(1..item.count)`
    Range { start: Box<Expr>, end: Box<Expr> },
}

/// A path into the context: a root name followed by key/index segments.
#[derive(Debug, Clone)]
pub struct Lookup {
    pub root: LookupRoot,
    pub path: Vec<PathSegment>,
}

#[derive(Debug, Clone)]
pub enum LookupRoot {
    /// `name`: resolved through the context.
    Name(String),
    /// `[expr]`: the key is itself computed, then resolved.
    Dynamic(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum PathSegment {
    /// `.key`
    Key(String),
    /// `[expr]`
    Index(Expr),
}

/// An expression followed by zero or more `| filter: args` stages.
///
/// This is the shape of every `{{ ... }}` body and is also available to
/// tag handlers through [`Markup::parse_filtered`](crate::Markup::parse_filtered).
#[derive(Debug, Clone)]
pub struct FilteredExpr {
    pub expr: Expr,
    pub filters: Vec<FilterCall>,
}

/// A single filter stage. The implementation is resolved from the
/// registry when the template is parsed; `None` means the name was not
/// registered at that time.
#[derive(Clone)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expr>,
    pub kwargs: Vec<(String, Expr)>,
    pub(crate) filter: Option<Arc<dyn Filter>>,
}

impl fmt::Debug for FilterCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterCall")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("kwargs", &self.kwargs)
            .field("resolved", &self.filter.is_some())
            .finish()
    }
}

impl FilterCall {
    pub fn is_resolved(&self) -> bool {
        self.filter.is_some()
    }
}

impl Lookup {
    /// The root variable name, when it is not computed.
    pub fn name(&self) -> Option<&str> {
        match &self.root {
            LookupRoot::Name(name) => Some(name),
            LookupRoot::Dynamic(_) => None,
        }
    }
}
