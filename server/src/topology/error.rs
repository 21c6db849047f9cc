//! Channel Topology Errors

use thiserror::Error;
use vc_common::ChannelId;

/// Errors that can occur during topology queries and edits.
///
/// Every variant is caller-recoverable. Edits that fail leave the topology
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// Channel not found.
    #[error("Channel not found: {0}")]
    ChannelNotFound(ChannelId),

    /// Parent channel of a new channel does not exist.
    #[error("Invalid parent channel: {0}")]
    InvalidParent(ChannelId),

    /// Move would place a channel below itself.
    #[error("Moving channel {channel} below {new_parent} would create a cycle")]
    WouldCreateCycle {
        channel: ChannelId,
        new_parent: ChannelId,
    },

    /// A sibling already uses the name.
    #[error("Channel {parent} already has a sub-channel named {name:?}")]
    DuplicateName { parent: ChannelId, name: String },

    /// Attempted removal of the root channel.
    #[error("The root channel cannot be removed")]
    IsRoot,

    /// ACL entry has no single subject or overlapping allow/deny bits.
    #[error("Malformed ACL entry: {0}")]
    MalformedAclEntry(String),

    /// Group uses a reserved name or lists a user as both added and removed.
    #[error("Malformed group {name:?}: {reason}")]
    MalformedGroup { name: String, reason: String },

    /// Raised by callers that enforce a computed mask.
    #[error("Permission denied")]
    PermissionDenied,

    /// Channel would exceed the configured nesting depth.
    #[error("Channel nesting limit of {limit} exceeded")]
    NestingLimit { limit: usize },

    /// Registry already holds the configured maximum number of channels.
    #[error("Channel count limit of {limit} reached")]
    ChannelLimit { limit: usize },

    /// Persistence collaborator failed or returned an inconsistent tree.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result alias for topology operations.
pub type Result<T> = std::result::Result<T, TopologyError>;

impl From<std::io::Error> for TopologyError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for TopologyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
