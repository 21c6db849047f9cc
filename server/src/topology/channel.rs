//! Channel node of the topology arena.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use sha2::{Digest, Sha256};
use vc_common::{ChannelId, SessionId};

use crate::permissions::{AclEntry, Group};

/// A node in the channel tree.
///
/// Relations to other channels are stored as identifiers into the tree's
/// arena, never as references.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Channel ID.
    pub id: ChannelId,
    /// Parent channel; `None` only for the root.
    pub parent: Option<ChannelId>,
    /// Display name, unique among siblings.
    pub name: String,
    /// Sibling ordering index.
    pub position: i32,
    /// Removed automatically once userless and childless.
    pub temporary: bool,
    /// Occupancy cap; 0 falls back to the server default.
    pub max_users: u32,
    /// Whether ACL and group evaluation may consult ancestors.
    pub inherit_acl: bool,
    /// Ordered ACL entries scoped to this channel.
    pub acl: Vec<AclEntry>,
    /// Group definitions scoped to this channel, by name.
    pub groups: BTreeMap<String, Group>,
    description: String,
    description_hash: String,
    children: Vec<ChannelId>,
    users: BTreeSet<SessionId>,
}

impl Channel {
    /// Create a detached channel with default policy.
    #[must_use]
    pub fn new(id: ChannelId, parent: Option<ChannelId>, name: impl Into<String>) -> Self {
        Self {
            id,
            parent,
            name: name.into(),
            position: 0,
            temporary: false,
            max_users: 0,
            inherit_acl: true,
            acl: Vec::new(),
            groups: BTreeMap::new(),
            description: String::new(),
            description_hash: String::new(),
            children: Vec::new(),
            users: BTreeSet::new(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Hex SHA-256 of the description, empty when there is none.
    ///
    /// Clients that already hold a description with this hash can skip
    /// fetching it again.
    pub fn description_hash(&self) -> &str {
        &self.description_hash
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
        self.description_hash = if self.description.is_empty() {
            String::new()
        } else {
            hex::encode(Sha256::digest(self.description.as_bytes()))
        };
    }

    /// Direct children in insertion order.
    pub fn children(&self) -> &[ChannelId] {
        &self.children
    }

    /// Sessions currently present in this channel.
    pub const fn users(&self) -> &BTreeSet<SessionId> {
        &self.users
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// True iff no users occupy the channel.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Total display order: position, then name, then id.
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.position
            .cmp(&other.position)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.id.cmp(&other.id))
    }

    /// Whether `self` sorts before `other` in display order.
    pub fn less_than(&self, other: &Self) -> bool {
        self.display_cmp(other) == Ordering::Less
    }

    pub(crate) fn attach_child(&mut self, child: ChannelId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn detach_child(&mut self, child: ChannelId) {
        self.children.retain(|c| *c != child);
    }

    pub(crate) fn insert_user(&mut self, session: SessionId) {
        self.users.insert(session);
    }

    pub(crate) fn remove_user(&mut self, session: SessionId) -> bool {
        self.users.remove(&session)
    }

    pub(crate) fn take_users(&mut self) -> BTreeSet<SessionId> {
        std::mem::take(&mut self.users)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) => write!(f, "{}[{}:{}]", self.name, self.id, parent),
            None => write!(f, "{}[{}:-1]", self.name, self.id),
        }
    }
}
