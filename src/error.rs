//! Error types for the synchronization layer
//!
//! Most read paths in this crate resolve absence to defaults instead of
//! failing. These variants cover the few places where a caller handed us
//! something we cannot act on.

use thiserror::Error;

use crate::tree::NodeId;

/// Error types for tree, codec and configuration operations
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Cannot move node {node} under {target}")]
    InvalidMove { node: NodeId, target: NodeId },

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
