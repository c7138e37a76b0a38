//! The compiled template tree.
//!
//! The tree has two layers:
//!
//! - **Node layer** ([`node`]): [`Nodelist`]s of literals, outputs, tags,
//!   blocks and raw bodies. A template's root is the document nodelist;
//!   blocks own nested nodelists.
//! - **Expression layer** ([`expr`]): variable lookups, literals and
//!   ranges, optionally piped through filters. Expression results are
//!   coerced to text only when an `Output` node writes them.

pub mod expr;
pub mod node;
pub mod span;
pub mod value;

// Convenience re-exports
pub use expr::*;
pub use node::*;
pub use span::{Span, Spanned};
pub use value::{Items, Value};
