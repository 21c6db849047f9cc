//! Immutable topology views for bulk enumeration.

use std::collections::BTreeSet;

use serde::Serialize;
use vc_common::{ChannelId, SessionId};

use super::channel::Channel;
use super::links::LinkGraph;
use super::tree::ChannelTree;

/// Read-only copy of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelView {
    pub id: ChannelId,
    pub parent: Option<ChannelId>,
    pub name: String,
    pub description: String,
    pub description_hash: String,
    pub position: i32,
    pub temporary: bool,
    pub max_users: u32,
    pub inherit_acl: bool,
    /// Direct children in display order.
    pub children: Vec<ChannelId>,
    /// Directly linked channels.
    pub links: BTreeSet<ChannelId>,
    pub users: BTreeSet<SessionId>,
}

/// Full topology at one point in time, channels in pre-order with siblings
/// in display order. Two snapshots of the same state are identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologySnapshot {
    pub channels: Vec<ChannelView>,
}

impl ChannelView {
    pub(crate) fn capture(tree: &ChannelTree, links: &LinkGraph, channel: &Channel) -> Self {
        Self {
            id: channel.id,
            parent: channel.parent,
            name: channel.name.clone(),
            description: channel.description().to_string(),
            description_hash: channel.description_hash().to_string(),
            position: channel.position,
            temporary: channel.temporary,
            max_users: channel.max_users,
            inherit_acl: channel.inherit_acl,
            children: tree
                .sorted_children(channel.id)
                .map(|children| children.iter().map(|c| c.id).collect())
                .unwrap_or_default(),
            links: links.neighbours(channel.id),
            users: channel.users().clone(),
        }
    }
}

impl TopologySnapshot {
    pub(crate) fn capture(tree: &ChannelTree, links: &LinkGraph) -> Self {
        let channels = tree
            .ordered_ids()
            .into_iter()
            .filter_map(|id| tree.get(id).ok())
            .map(|channel| ChannelView::capture(tree, links, channel))
            .collect();

        Self { channels }
    }

    pub fn get(&self, id: ChannelId) -> Option<&ChannelView> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> Vec<ChannelId> {
        self.channels.iter().map(|c| c.id).collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
