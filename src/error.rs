//! Errors reported when a handle no longer resolves to a live node.

use crate::storage::NodeId;

/// Errors returned by the fallible (`try_*`) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The node behind the handle has been disposed.
    #[error("node {0:?} has been disposed")]
    Disposed(NodeId),

    /// The node exists but does not hold a value of the requested type.
    #[error("node {0:?} does not hold a value of the requested type")]
    TypeMismatch(NodeId),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
