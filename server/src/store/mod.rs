//! Topology Persistence
//!
//! The core is populated from a [`TopologyStore`] at startup and hands each
//! committed mutation to it as a [`TopologyDelta`]. The storage format is up
//! to the implementation; `load` must return everything previous `save`
//! calls described.

mod json;
mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};
use vc_common::ChannelId;

use crate::config::TopologyConfig;
use crate::permissions::{AclEntry, Group};
use crate::topology::{Channel, ChannelTree, LinkGraph, Result, TopologyError, ROOT_NAME};

/// Persistence collaborator of the topology service.
///
/// Calls happen while the topology write lock is held, so implementations
/// see deltas in commit order and must not call back into the service.
pub trait TopologyStore: Send + Sync {
    /// Load the full persisted topology.
    fn load(&self) -> Result<PersistedTopology>;

    /// Persist one committed mutation.
    ///
    /// A failed save leaves the stored state behind the live topology; the
    /// service then calls [`TopologyStore::replace`] on its next save.
    fn save(&self, delta: &TopologyDelta) -> Result<()>;

    /// Overwrite the stored state with a full capture of the topology.
    fn replace(&self, topology: &PersistedTopology) -> Result<()>;
}

/// Persisted form of one channel. Occupancy is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: ChannelId,
    pub parent: Option<ChannelId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub temporary: bool,
    #[serde(default)]
    pub max_users: u32,
    pub inherit_acl: bool,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub acl: Vec<AclEntry>,
}

impl From<&Channel> for ChannelRecord {
    fn from(channel: &Channel) -> Self {
        Self {
            id: channel.id,
            parent: channel.parent,
            name: channel.name.clone(),
            description: channel.description().to_string(),
            position: channel.position,
            temporary: channel.temporary,
            max_users: channel.max_users,
            inherit_acl: channel.inherit_acl,
            groups: channel.groups.values().cloned().collect(),
            acl: channel.acl.clone(),
        }
    }
}

impl ChannelRecord {
    fn into_channel(self) -> Result<Channel> {
        for group in &self.groups {
            group.validate()?;
        }
        for entry in &self.acl {
            entry.validate()?;
        }

        let mut channel = Channel::new(self.id, self.parent, self.name);
        channel.set_description(self.description);
        channel.position = self.position;
        channel.temporary = self.temporary;
        channel.max_users = self.max_users;
        channel.inherit_acl = self.inherit_acl;
        channel.groups = self
            .groups
            .into_iter()
            .map(|group| (group.name.clone(), group))
            .collect();
        channel.acl = self.acl;
        Ok(channel)
    }
}

/// Everything needed to rebuild the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTopology {
    pub channels: Vec<ChannelRecord>,
    #[serde(default)]
    pub links: Vec<(ChannelId, ChannelId)>,
}

impl Default for PersistedTopology {
    /// A topology holding only the root channel.
    fn default() -> Self {
        Self {
            channels: vec![ChannelRecord::from(&Channel::new(
                ChannelId::ROOT,
                None,
                ROOT_NAME,
            ))],
            links: Vec::new(),
        }
    }
}

impl PersistedTopology {
    /// Capture the persistent parts of a live topology, channels in id order.
    pub fn capture(tree: &ChannelTree, links: &LinkGraph) -> Self {
        let mut channels: Vec<ChannelRecord> = tree.channels().map(ChannelRecord::from).collect();
        channels.sort_by_key(|record| record.id);
        Self {
            channels,
            links: links.edges(),
        }
    }

    /// Rebuild the tree and link graph, validating structure and policy.
    pub fn restore(self, config: TopologyConfig) -> Result<(ChannelTree, LinkGraph)> {
        let channels = self
            .channels
            .into_iter()
            .map(ChannelRecord::into_channel)
            .collect::<Result<Vec<_>>>()?;
        let tree = ChannelTree::from_channels(config, channels)?;

        for (a, b) in &self.links {
            for end in [a, b] {
                if !tree.contains(*end) {
                    return Err(TopologyError::Storage(format!(
                        "link {a} - {b} refers to missing channel {end}"
                    )));
                }
            }
        }

        Ok((tree, LinkGraph::from_edges(self.links)))
    }

    /// Apply a delta in place.
    pub fn apply(&mut self, delta: &TopologyDelta) -> Result<()> {
        match delta {
            TopologyDelta::ChannelCreated(record) => {
                if self.channels.iter().any(|c| c.id == record.id) {
                    return Err(TopologyError::Storage(format!(
                        "channel {} already stored",
                        record.id
                    )));
                }
                self.channels.push(record.clone());
            }
            TopologyDelta::ChannelsRemoved { ids } => {
                self.channels.retain(|c| !ids.contains(&c.id));
                self.links
                    .retain(|(a, b)| !ids.contains(a) && !ids.contains(b));
            }
            TopologyDelta::ChannelMoved { id, new_parent } => {
                self.record_mut(*id)?.parent = Some(*new_parent);
            }
            TopologyDelta::ChannelUpdated {
                id,
                name,
                description,
                position,
                max_users,
            } => {
                let record = self.record_mut(*id)?;
                record.name.clone_from(name);
                record.description.clone_from(description);
                record.position = *position;
                record.max_users = *max_users;
            }
            TopologyDelta::AclReplaced {
                id,
                inherit_acl,
                groups,
                acl,
            } => {
                let record = self.record_mut(*id)?;
                record.inherit_acl = *inherit_acl;
                record.groups.clone_from(groups);
                record.acl.clone_from(acl);
            }
            TopologyDelta::Linked { a, b } => {
                let edge = ordered(*a, *b);
                if !self.links.contains(&edge) {
                    self.links.push(edge);
                }
            }
            TopologyDelta::Unlinked { edges } => {
                let edges: Vec<_> = edges.iter().map(|(a, b)| ordered(*a, *b)).collect();
                self.links.retain(|edge| !edges.contains(edge));
            }
        }
        Ok(())
    }

    fn record_mut(&mut self, id: ChannelId) -> Result<&mut ChannelRecord> {
        self.channels
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| TopologyError::Storage(format!("channel {id} not stored")))
    }
}

fn ordered(a: ChannelId, b: ChannelId) -> (ChannelId, ChannelId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// One committed mutation, as handed to [`TopologyStore::save`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TopologyDelta {
    ChannelCreated(ChannelRecord),
    /// Removed channels, including reaped temporaries. Links touching
    /// them are gone too.
    ChannelsRemoved { ids: Vec<ChannelId> },
    ChannelMoved {
        id: ChannelId,
        new_parent: ChannelId,
    },
    /// New attribute values after an update.
    ChannelUpdated {
        id: ChannelId,
        name: String,
        description: String,
        position: i32,
        max_users: u32,
    },
    AclReplaced {
        id: ChannelId,
        inherit_acl: bool,
        groups: Vec<Group>,
        acl: Vec<AclEntry>,
    },
    Linked { a: ChannelId, b: ChannelId },
    Unlinked { edges: Vec<(ChannelId, ChannelId)> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::Permissions;
    use vc_common::UserId;

    fn record(id: u32, parent: u32, name: &str) -> ChannelRecord {
        ChannelRecord::from(&Channel::new(
            ChannelId(id),
            Some(ChannelId(parent)),
            name,
        ))
    }

    #[test]
    fn test_default_holds_root_only() {
        let persisted = PersistedTopology::default();
        assert_eq!(persisted.channels.len(), 1);
        assert_eq!(persisted.channels[0].id, ChannelId::ROOT);
        assert!(persisted.channels[0].parent.is_none());

        let (tree, links) = persisted.restore(TopologyConfig::unlimited()).unwrap();
        assert_eq!(tree.channel_count(), 1);
        assert_eq!(links.edge_count(), 0);
    }

    #[test]
    fn test_capture_and_restore_keep_policy() {
        let mut tree = ChannelTree::new(TopologyConfig::unlimited());
        let a = tree.create(ChannelId::ROOT, "A").unwrap();
        let b = tree.create(a, "B").unwrap();
        {
            let channel = tree.get_mut(b).unwrap();
            channel.inherit_acl = false;
            channel.set_description("Quiet room");
            let mut admins = Group::new("admin");
            admins.add.insert(UserId::new());
            channel.groups.insert("admin".into(), admins);
            channel.acl.push(AclEntry::group(
                "admin",
                Permissions::WRITE,
                Permissions::empty(),
            ));
        }
        let links = LinkGraph::from_edges([(a, b)]);

        let persisted = PersistedTopology::capture(&tree, &links);
        let json = serde_json::to_string(&persisted).unwrap();
        let parsed: PersistedTopology = serde_json::from_str(&json).unwrap();
        let (restored, restored_links) = parsed.restore(TopologyConfig::unlimited()).unwrap();

        let channel = restored.get(b).unwrap();
        assert!(!channel.inherit_acl);
        assert_eq!(channel.description(), "Quiet room");
        assert_eq!(
            channel.description_hash(),
            tree.get(b).unwrap().description_hash()
        );
        assert_eq!(channel.groups, tree.get(b).unwrap().groups);
        assert_eq!(channel.acl, tree.get(b).unwrap().acl);
        assert!(restored_links.is_linked(b, a));
    }

    #[test]
    fn test_restore_rejects_dangling_link() {
        let persisted = PersistedTopology {
            links: vec![(ChannelId::ROOT, ChannelId(7))],
            ..PersistedTopology::default()
        };
        assert!(matches!(
            persisted.restore(TopologyConfig::unlimited()),
            Err(TopologyError::Storage(_))
        ));
    }

    #[test]
    fn test_restore_rejects_malformed_acl() {
        let mut persisted = PersistedTopology::default();
        persisted.channels[0].acl.push(AclEntry::group(
            "all",
            Permissions::SPEAK,
            Permissions::SPEAK,
        ));
        assert!(matches!(
            persisted.restore(TopologyConfig::unlimited()),
            Err(TopologyError::MalformedAclEntry(_))
        ));
    }

    #[test]
    fn test_apply_removal_drops_links() {
        let mut persisted = PersistedTopology::default();
        persisted
            .apply(&TopologyDelta::ChannelCreated(record(1, 0, "A")))
            .unwrap();
        persisted
            .apply(&TopologyDelta::ChannelCreated(record(2, 0, "B")))
            .unwrap();
        persisted
            .apply(&TopologyDelta::Linked {
                a: ChannelId(2),
                b: ChannelId(1),
            })
            .unwrap();
        assert_eq!(persisted.links, vec![(ChannelId(1), ChannelId(2))]);

        persisted
            .apply(&TopologyDelta::ChannelsRemoved {
                ids: vec![ChannelId(2)],
            })
            .unwrap();
        assert_eq!(persisted.channels.len(), 2);
        assert!(persisted.links.is_empty());
    }

    #[test]
    fn test_apply_rejects_unknown_channel() {
        let mut persisted = PersistedTopology::default();
        let result = persisted.apply(&TopologyDelta::ChannelMoved {
            id: ChannelId(3),
            new_parent: ChannelId::ROOT,
        });
        assert!(matches!(result, Err(TopologyError::Storage(_))));

        persisted
            .apply(&TopologyDelta::ChannelCreated(record(3, 0, "C")))
            .unwrap();
        assert!(persisted
            .apply(&TopologyDelta::ChannelCreated(record(3, 0, "C")))
            .is_err());
    }
}
