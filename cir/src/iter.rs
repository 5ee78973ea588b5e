//! Ways to walk a [`Cir`]: [`Traversal`] for read-only passes, [`Mapper`]
//! for 1:1 graph rewrites, and [`TreeLike`] for reference-following visits
//! starting from a single node.

use std::fmt::Debug;

use crate::Cir;

mod mapper;
mod traverse;
mod tree_like;

pub use mapper::Mapper;
pub use traverse::Traversal;
pub use tree_like::TreeLike;

/// What a failed [`Mapper`] leaves behind: the partially rewritten graph and
/// every error met along the way. Later passes can still walk the carcass to
/// produce more diagnostics in one run.
pub struct Incomplete<T: Debug, E> {
    pub carcass: Cir<T>,
    pub errs: Vec<E>,
}

/// Convenience alias for fallible per-node handlers
pub type Fallible<E> = Result<(), E>;
