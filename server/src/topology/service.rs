//! Topology Service
//!
//! The single synchronized entry point to the channel tree, link graph and
//! permission evaluation.
//!
//! One reader-writer lock guards the whole topology. Queries take the shared
//! lock and never block each other; mutations take the exclusive lock for
//! their full duration, so readers only ever observe complete states. All
//! operations are synchronous and bounded by the size of the topology.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};
use vc_common::protocol::{CreateChannel, EditRequest, SetAcl, UpdateChannel};
use vc_common::{ChannelId, SessionId, User};

use super::error::{Result, TopologyError};
use super::links::LinkGraph;
use super::snapshot::{ChannelView, TopologySnapshot};
use super::tree::{ChannelTree, Removal};
use crate::config::TopologyConfig;
use crate::permissions::{self, AclEntry, Group, Permissions};
use crate::store::{ChannelRecord, MemoryStore, PersistedTopology, TopologyDelta, TopologyStore};

/// State guarded by the service lock.
struct Topology {
    tree: ChannelTree,
    links: LinkGraph,
    /// Set after a failed save; the next save replaces the whole document.
    store_stale: bool,
}

impl Topology {
    /// Drop link edges touching removed channels.
    fn unlink_removed(&mut self, removed: &[ChannelId]) {
        for id in removed {
            self.links.unlink_all(*id);
        }
    }

    /// Reap temporary channels starting at `start`.
    fn reap(&mut self, start: ChannelId) -> Vec<ChannelId> {
        let reaped = self.tree.reap_temporary(start);
        self.unlink_removed(&reaped);
        reaped
    }
}

/// Result of [`TopologyService::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// A channel was created with this id.
    Created(ChannelId),
    /// The edit was applied.
    Applied,
}

/// Shared channel topology.
///
/// Construct once at startup and share behind an `Arc`.
pub struct TopologyService {
    state: RwLock<Topology>,
    store: Arc<dyn TopologyStore>,
}

impl TopologyService {
    /// Build the topology from the persisted state in `store`.
    ///
    /// Loaded channels hold no users, so temporary channels without children
    /// are reaped here and their removal is persisted.
    pub fn load(config: TopologyConfig, store: Arc<dyn TopologyStore>) -> Result<Self> {
        let (tree, links) = store.load()?.restore(config)?;

        info!(
            channels = tree.channel_count(),
            links = links.edge_count(),
            "Channel topology loaded"
        );

        let service = Self {
            state: RwLock::new(Topology {
                tree,
                links,
                store_stale: false,
            }),
            store,
        };

        {
            let mut state = service.state.write();
            let reaped = state.tree.reap_all_temporary();
            state.unlink_removed(&reaped);
            if !reaped.is_empty() {
                info!(channels = ?reaped, "Temporary channels reaped");
            }
            service.persist_removed(&mut state, reaped);
        }

        Ok(service)
    }

    /// Root-only topology backed by a [`MemoryStore`].
    #[must_use]
    pub fn in_memory(config: TopologyConfig) -> Self {
        Self {
            state: RwLock::new(Topology {
                tree: ChannelTree::new(config),
                links: LinkGraph::new(),
                store_stale: false,
            }),
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// Hand a committed delta to the store. Must be called with the write
    /// lock held so deltas arrive in commit order.
    ///
    /// After a failed save the store no longer matches the live topology,
    /// so the next save replaces the whole document instead.
    fn persist(&self, state: &mut Topology, delta: &TopologyDelta) {
        let result = if state.store_stale {
            self.store
                .replace(&PersistedTopology::capture(&state.tree, &state.links))
        } else {
            self.store.save(delta)
        };

        match result {
            Ok(()) if state.store_stale => {
                state.store_stale = false;
                info!("Channel store resynchronized");
            }
            Ok(()) => {}
            Err(e) => {
                state.store_stale = true;
                warn!(error = %e, "Failed to persist topology change");
            }
        }
    }

    fn persist_removed(&self, state: &mut Topology, ids: Vec<ChannelId>) {
        if !ids.is_empty() {
            self.persist(state, &TopologyDelta::ChannelsRemoved { ids });
        }
    }

    // === Queries ===

    pub fn config(&self) -> TopologyConfig {
        *self.state.read().tree.config()
    }

    pub fn channel_count(&self) -> usize {
        self.state.read().tree.channel_count()
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.state.read().tree.contains(id)
    }

    /// Copy of one channel.
    pub fn channel(&self, id: ChannelId) -> Result<ChannelView> {
        let state = self.state.read();
        let channel = state.tree.get(id)?;
        Ok(ChannelView::capture(&state.tree, &state.links, channel))
    }

    /// Effective permissions of `user` in `channel`.
    ///
    /// Superusers receive every permission without evaluating ACLs.
    pub fn effective_permissions(&self, user: &User, channel: ChannelId) -> Result<Permissions> {
        let state = self.state.read();
        if user.superuser {
            state.tree.get(channel)?;
            return Ok(Permissions::all());
        }
        permissions::effective_permissions(&state.tree, user, channel)
    }

    /// Whether `user` belongs to `group` as seen from `channel`.
    pub fn is_member(&self, user: &User, channel: ChannelId, group: &str) -> Result<bool> {
        permissions::is_member(&self.state.read().tree, user, channel, group)
    }

    /// Whether `user` may join `channel`.
    ///
    /// Requires `ENTER`. A full channel additionally requires `WRITE`; the
    /// user's own presence does not count towards the cap.
    pub fn can_enter(&self, user: &User, channel: ChannelId) -> Result<bool> {
        let state = self.state.read();
        let target = state.tree.get(channel)?;

        let perms = if user.superuser {
            Permissions::all()
        } else {
            permissions::effective_permissions(&state.tree, user, channel)?
        };
        if !perms.has(Permissions::ENTER) {
            return Ok(false);
        }

        let cap = match target.max_users {
            0 => state.tree.config().default_max_users,
            cap => cap,
        };
        let others = target
            .users()
            .iter()
            .filter(|session| **session != user.session)
            .count();
        let full = cap > 0 && others >= cap as usize;

        Ok(!full || perms.has(Permissions::WRITE))
    }

    /// Channels whose listeners hear a speaker in `channel`.
    ///
    /// Per-listener permission filtering is left to the caller.
    pub fn audible_listeners(&self, channel: ChannelId) -> Result<BTreeSet<ChannelId>> {
        self.all_links(channel)
    }

    /// Connected component of `channel` in the link graph, `channel` included.
    pub fn all_links(&self, channel: ChannelId) -> Result<BTreeSet<ChannelId>> {
        let state = self.state.read();
        state.tree.get(channel)?;
        Ok(state.links.all_links(channel))
    }

    /// Direct link test.
    pub fn is_linked(&self, a: ChannelId, b: ChannelId) -> Result<bool> {
        let state = self.state.read();
        state.tree.get(a)?;
        state.tree.get(b)?;
        Ok(state.links.is_linked(a, b))
    }

    pub fn is_empty(&self, channel: ChannelId) -> Result<bool> {
        self.state.read().tree.is_empty(channel)
    }

    pub fn has_any_users_in_or_below(&self, channel: ChannelId) -> Result<bool> {
        self.state.read().tree.has_any_users_in_or_below(channel)
    }

    pub fn is_user_in_or_below(&self, channel: ChannelId, session: SessionId) -> Result<bool> {
        self.state.read().tree.is_user_in_or_below(channel, session)
    }

    pub fn depth(&self, channel: ChannelId) -> Result<usize> {
        self.state.read().tree.depth(channel)
    }

    pub fn subtree_height(&self, channel: ChannelId) -> Result<usize> {
        self.state.read().tree.subtree_height(channel)
    }

    pub fn path(&self, channel: ChannelId) -> Result<String> {
        self.state.read().tree.path(channel)
    }

    pub fn all_children(&self, channel: ChannelId) -> Result<BTreeSet<ChannelId>> {
        self.state.read().tree.all_children(channel)
    }

    pub fn channel_of(&self, session: SessionId) -> Option<ChannelId> {
        self.state.read().tree.channel_of(session)
    }

    pub fn users_in(&self, channel: ChannelId) -> Result<BTreeSet<SessionId>> {
        Ok(self.state.read().tree.get(channel)?.users().clone())
    }

    /// Immutable copy of the whole topology.
    pub fn snapshot(&self) -> TopologySnapshot {
        let state = self.state.read();
        TopologySnapshot::capture(&state.tree, &state.links)
    }

    // === Structural edits ===

    /// Create a permanent channel with default attributes.
    pub fn create(&self, parent: ChannelId, name: &str) -> Result<ChannelId> {
        self.create_channel(&CreateChannel::new(parent, name))
    }

    pub fn create_channel(&self, req: &CreateChannel) -> Result<ChannelId> {
        let mut state = self.state.write();
        let id = state.tree.create_channel(req)?;

        info!(
            channel_id = %id,
            parent = %req.parent,
            name = %req.name,
            temporary = req.temporary,
            "Channel created"
        );
        let record = ChannelRecord::from(state.tree.get(id)?);
        self.persist(&mut state, &TopologyDelta::ChannelCreated(record));

        Ok(id)
    }

    /// Remove a channel and its subtree, along with every link touching it.
    ///
    /// Users inside move to the removed channel's parent.
    pub fn remove_channel(&self, id: ChannelId) -> Result<Removal> {
        let mut state = self.state.write();
        let parent = state.tree.get(id)?.parent;
        let removal = state.tree.remove(id)?;
        state.unlink_removed(&removal.channels);

        info!(
            channel_id = %id,
            removed = removal.channels.len(),
            relocated = removal.relocated.len(),
            "Channel removed"
        );
        self.persist_removed(&mut state, removal.channels.clone());

        if let Some(parent) = parent {
            let reaped = state.reap(parent);
            if !reaped.is_empty() {
                info!(channels = ?reaped, "Temporary channels reaped");
            }
            self.persist_removed(&mut state, reaped);
        }

        Ok(removal)
    }

    pub fn move_channel(&self, id: ChannelId, new_parent: ChannelId) -> Result<()> {
        let mut state = self.state.write();
        let old_parent = state.tree.move_channel(id, new_parent)?;
        if old_parent == new_parent {
            return Ok(());
        }

        info!(
            channel_id = %id,
            from = %old_parent,
            to = %new_parent,
            "Channel moved"
        );
        self.persist(&mut state, &TopologyDelta::ChannelMoved { id, new_parent });

        let reaped = state.reap(old_parent);
        if !reaped.is_empty() {
            info!(channels = ?reaped, "Temporary channels reaped");
        }
        self.persist_removed(&mut state, reaped);

        Ok(())
    }

    pub fn update_channel(&self, req: &UpdateChannel) -> Result<()> {
        let mut state = self.state.write();
        state.tree.update(req)?;

        let channel = state.tree.get(req.id)?;
        info!(channel_id = %req.id, name = %channel.name, "Channel updated");
        let delta = TopologyDelta::ChannelUpdated {
            id: channel.id,
            name: channel.name.clone(),
            description: channel.description().to_string(),
            position: channel.position,
            max_users: channel.max_users,
        };
        self.persist(&mut state, &delta);

        Ok(())
    }

    /// Replace a channel's inheritance flag, groups and ACL entries.
    ///
    /// Every group and entry is validated before anything changes.
    pub fn set_acl(&self, req: SetAcl) -> Result<()> {
        let mut groups = Vec::with_capacity(req.groups.len());
        for spec in req.groups {
            let group = Group::try_from(spec)?;
            if groups.iter().any(|g: &Group| g.name == group.name) {
                return Err(TopologyError::MalformedGroup {
                    name: group.name,
                    reason: "defined more than once".to_string(),
                });
            }
            groups.push(group);
        }
        let acl = req
            .entries
            .into_iter()
            .map(AclEntry::try_from)
            .collect::<Result<Vec<_>>>()?;

        let mut state = self.state.write();
        let channel = state.tree.get_mut(req.channel_id)?;
        channel.inherit_acl = req.inherit_acl;
        channel.groups = groups
            .iter()
            .map(|group| (group.name.clone(), group.clone()))
            .collect();
        channel.acl.clone_from(&acl);

        info!(
            channel_id = %req.channel_id,
            inherit_acl = req.inherit_acl,
            groups = groups.len(),
            entries = acl.len(),
            "Channel ACL replaced"
        );
        self.persist(
            &mut state,
            &TopologyDelta::AclReplaced {
                id: req.channel_id,
                inherit_acl: req.inherit_acl,
                groups,
                acl,
            },
        );

        Ok(())
    }

    /// Link two channels. Self-links and existing links are no-ops.
    pub fn link(&self, a: ChannelId, b: ChannelId) -> Result<()> {
        let mut state = self.state.write();
        state.tree.get(a)?;
        state.tree.get(b)?;

        if state.links.link(a, b) {
            info!(a = %a, b = %b, "Channels linked");
            self.persist(&mut state, &TopologyDelta::Linked { a, b });
        }
        Ok(())
    }

    /// Remove the link `a - b`, or every link of `a` when `b` is `None`.
    pub fn unlink(&self, a: ChannelId, b: Option<ChannelId>) -> Result<()> {
        let mut state = self.state.write();
        state.tree.get(a)?;

        let edges: Vec<_> = match b {
            Some(b) => {
                state.tree.get(b)?;
                if state.links.unlink(a, b) {
                    vec![(a, b)]
                } else {
                    Vec::new()
                }
            }
            None => state
                .links
                .unlink_all(a)
                .into_iter()
                .map(|other| (a, other))
                .collect(),
        };

        if !edges.is_empty() {
            info!(a = %a, removed = edges.len(), "Channels unlinked");
            self.persist(&mut state, &TopologyDelta::Unlinked { edges });
        }
        Ok(())
    }

    // === Occupancy ===

    /// Place a session in a channel, leaving its previous one.
    ///
    /// Does not check `can_enter`; callers enforce permissions.
    pub fn add_user(&self, user: &User, channel: ChannelId) -> Result<()> {
        let mut state = self.state.write();
        let previous = state.tree.add_user(user.session, channel)?;
        debug!(session = %user.session, channel_id = %channel, "User joined channel");

        if let Some(previous) = previous {
            let reaped = state.reap(previous);
            if !reaped.is_empty() {
                info!(channels = ?reaped, "Temporary channels reaped");
            }
            self.persist_removed(&mut state, reaped);
        }
        Ok(())
    }

    /// Remove a disconnected session. Returns the channel it left.
    pub fn remove_user(&self, session: SessionId) -> Option<ChannelId> {
        let mut state = self.state.write();
        let channel = state.tree.remove_user(session)?;
        debug!(session = %session, channel_id = %channel, "User left channel");

        let reaped = state.reap(channel);
        if !reaped.is_empty() {
            info!(channels = ?reaped, "Temporary channels reaped");
        }
        self.persist_removed(&mut state, reaped);

        Some(channel)
    }

    /// Route an inbound edit request to the matching operation.
    pub fn apply(&self, request: EditRequest) -> Result<EditOutcome> {
        match request {
            EditRequest::CreateChannel(req) => self.create_channel(&req).map(EditOutcome::Created),
            EditRequest::RemoveChannel { id } => {
                self.remove_channel(id)?;
                Ok(EditOutcome::Applied)
            }
            EditRequest::MoveChannel { id, new_parent } => {
                self.move_channel(id, new_parent)?;
                Ok(EditOutcome::Applied)
            }
            EditRequest::UpdateChannel(req) => {
                self.update_channel(&req)?;
                Ok(EditOutcome::Applied)
            }
            EditRequest::SetAcl(req) => {
                self.set_acl(req)?;
                Ok(EditOutcome::Applied)
            }
            EditRequest::Link { a, b } => {
                self.link(a, b)?;
                Ok(EditOutcome::Applied)
            }
            EditRequest::Unlink { a, b } => {
                self.unlink(a, b)?;
                Ok(EditOutcome::Applied)
            }
        }
    }
}
