//! Channel Topology
//!
//! The channel tree, the link graph, and the synchronized facade that the
//! rest of the server calls into.

mod channel;
mod error;
mod links;
mod service;
mod snapshot;
mod tree;

pub use channel::Channel;
pub use error::{Result, TopologyError};
pub use links::LinkGraph;
pub use service::{EditOutcome, TopologyService};
pub use snapshot::{ChannelView, TopologySnapshot};
pub use tree::{ChannelTree, Removal, ROOT_NAME};
