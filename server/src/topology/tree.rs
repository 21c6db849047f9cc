//! Channel Tree and Registry
//!
//! Arena of channels keyed by [`ChannelId`]. Parent/child edges are ids into
//! the arena, so removal never leaves dangling references and cycle checks
//! are a walk over parent ids. Every traversal uses an explicit work-list.

use std::collections::{BTreeSet, HashMap, HashSet};

use vc_common::protocol::{CreateChannel, UpdateChannel};
use vc_common::{ChannelId, SessionId};

use super::channel::Channel;
use super::error::{Result, TopologyError};
use crate::config::TopologyConfig;

/// Name given to the root of a fresh tree.
pub const ROOT_NAME: &str = "Root";

/// Outcome of removing a subtree.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Removal {
    /// Removed channels, the requested one first.
    pub channels: Vec<ChannelId>,
    /// Sessions relocated to the removed channel's parent.
    pub relocated: Vec<SessionId>,
}

/// The authoritative channel hierarchy plus the occupancy table.
#[derive(Debug, Clone)]
pub struct ChannelTree {
    channels: HashMap<ChannelId, Channel>,
    /// Session -> channel it currently occupies.
    locations: HashMap<SessionId, ChannelId>,
    next_id: u32,
    config: TopologyConfig,
}

impl ChannelTree {
    /// Create a tree holding only the root channel.
    #[must_use]
    pub fn new(config: TopologyConfig) -> Self {
        let root = Channel::new(ChannelId::ROOT, None, ROOT_NAME);
        Self {
            channels: HashMap::from([(ChannelId::ROOT, root)]),
            locations: HashMap::new(),
            next_id: ChannelId::ROOT.0 + 1,
            config,
        }
    }

    /// Rebuild a tree from loaded channels.
    ///
    /// Child lists and occupancy are derived here; the input only needs
    /// parent links. Rejects input without a root, with dangling parents,
    /// duplicate ids, clashing sibling names, cycles or an id that leaves no
    /// room for the next one.
    pub fn from_channels(config: TopologyConfig, channels: Vec<Channel>) -> Result<Self> {
        let mut map: HashMap<ChannelId, Channel> = HashMap::with_capacity(channels.len());
        for channel in channels {
            let id = channel.id;
            if map.insert(id, channel).is_some() {
                return Err(TopologyError::Storage(format!("duplicate channel id {id}")));
            }
        }

        match map.get(&ChannelId::ROOT) {
            Some(root) if root.parent.is_none() => {}
            Some(_) => {
                return Err(TopologyError::Storage("root channel has a parent".into()));
            }
            None => return Err(TopologyError::Storage("root channel missing".into())),
        }

        let mut names = HashSet::with_capacity(map.len());
        for channel in map.values() {
            if let Some(parent) = channel.parent {
                if !names.insert((parent, channel.name.as_str())) {
                    return Err(TopologyError::Storage(format!(
                        "channel {parent} has two sub-channels named {:?}",
                        channel.name
                    )));
                }
            }
        }

        let mut ids: Vec<ChannelId> = map.keys().copied().collect();
        ids.sort_unstable();

        for id in &ids {
            if id.is_root() {
                continue;
            }
            let parent = map[id].parent.ok_or_else(|| {
                TopologyError::Storage(format!("channel {id} has no parent"))
            })?;
            let parent_channel = map.get_mut(&parent).ok_or_else(|| {
                TopologyError::Storage(format!("channel {id} refers to missing parent {parent}"))
            })?;
            parent_channel.attach_child(*id);
        }

        // Every channel must reach the root within `len` steps.
        let limit = map.len();
        for id in &ids {
            let mut current = *id;
            let mut steps = 0;
            while let Some(parent) = map[&current].parent {
                steps += 1;
                if steps > limit {
                    return Err(TopologyError::Storage(format!(
                        "channel {id} is part of a parent cycle"
                    )));
                }
                current = parent;
            }
        }

        let next_id = match ids.last() {
            Some(max) => max.0.checked_add(1).ok_or_else(|| {
                TopologyError::Storage(format!("channel id {max} is out of range"))
            })?,
            None => ChannelId::ROOT.0 + 1,
        };

        Ok(Self {
            channels: map,
            locations: HashMap::new(),
            next_id,
            config,
        })
    }

    pub const fn config(&self) -> &TopologyConfig {
        &self.config
    }

    /// Number of registered channels, root included.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.channels.contains_key(&id)
    }

    pub fn get(&self, id: ChannelId) -> Result<&Channel> {
        self.channels
            .get(&id)
            .ok_or(TopologyError::ChannelNotFound(id))
    }

    pub(crate) fn get_mut(&mut self, id: ChannelId) -> Result<&mut Channel> {
        self.channels
            .get_mut(&id)
            .ok_or(TopologyError::ChannelNotFound(id))
    }

    /// All channels in unspecified order.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    // === Structural edits ===

    /// Create a permanent channel with default attributes.
    pub fn create(&mut self, parent: ChannelId, name: &str) -> Result<ChannelId> {
        self.create_channel(&CreateChannel::new(parent, name))
    }

    /// Create a channel and assign it the next free identifier.
    pub fn create_channel(&mut self, req: &CreateChannel) -> Result<ChannelId> {
        if !self.contains(req.parent) {
            return Err(TopologyError::InvalidParent(req.parent));
        }
        self.check_unique_name(req.parent, &req.name, None)?;

        let count_limit = self.config.channel_count_limit;
        if count_limit > 0 && self.channels.len() >= count_limit {
            return Err(TopologyError::ChannelLimit { limit: count_limit });
        }
        self.check_nesting(req.parent, 0)?;

        let id = ChannelId(self.next_id);
        let Some(next_id) = self.next_id.checked_add(1) else {
            return Err(TopologyError::ChannelLimit {
                limit: self.channels.len(),
            });
        };
        self.next_id = next_id;

        let mut channel = Channel::new(id, Some(req.parent), req.name.clone());
        channel.position = req.position;
        channel.temporary = req.temporary;
        channel.max_users = req.max_users;
        channel.set_description(req.description.clone());

        self.channels.insert(id, channel);
        self.get_mut(req.parent)?.attach_child(id);

        Ok(id)
    }

    /// Remove a channel and all of its descendants.
    ///
    /// Users present anywhere in the subtree move to the removed channel's
    /// parent.
    pub fn remove(&mut self, id: ChannelId) -> Result<Removal> {
        let Some(parent) = self.get(id)?.parent else {
            return Err(TopologyError::IsRoot);
        };

        let mut removed = vec![id];
        removed.extend(self.all_children(id)?);

        let mut relocated = Vec::new();
        for channel_id in &removed {
            if let Some(mut channel) = self.channels.remove(channel_id) {
                relocated.extend(channel.take_users());
            }
        }

        if let Some(parent_channel) = self.channels.get_mut(&parent) {
            parent_channel.detach_child(id);
            for session in &relocated {
                parent_channel.insert_user(*session);
            }
        }
        for session in &relocated {
            self.locations.insert(*session, parent);
        }

        Ok(Removal {
            channels: removed,
            relocated,
        })
    }

    /// Re-parent a channel. Returns the previous parent.
    ///
    /// Moving a channel to its current parent is a no-op.
    pub fn move_channel(&mut self, id: ChannelId, new_parent: ChannelId) -> Result<ChannelId> {
        let channel = self.get(id)?;
        self.get(new_parent)?;

        let Some(old_parent) = channel.parent else {
            return Err(TopologyError::WouldCreateCycle {
                channel: id,
                new_parent,
            });
        };
        if old_parent == new_parent {
            return Ok(old_parent);
        }
        if new_parent == id || self.ancestors(new_parent)?.contains(&id) {
            return Err(TopologyError::WouldCreateCycle {
                channel: id,
                new_parent,
            });
        }

        let name = channel.name.clone();
        self.check_unique_name(new_parent, &name, Some(id))?;
        self.check_nesting(new_parent, self.subtree_height(id)?)?;

        self.get_mut(old_parent)?.detach_child(id);
        self.get_mut(new_parent)?.attach_child(id);
        self.get_mut(id)?.parent = Some(new_parent);

        Ok(old_parent)
    }

    /// Apply attribute changes. Renames are checked against siblings first.
    pub fn update(&mut self, req: &UpdateChannel) -> Result<()> {
        let channel = self.get(req.id)?;
        if let (Some(name), Some(parent)) = (&req.name, channel.parent) {
            self.check_unique_name(parent, name, Some(req.id))?;
        }

        let channel = self.get_mut(req.id)?;
        if let Some(name) = &req.name {
            channel.name.clone_from(name);
        }
        if let Some(description) = &req.description {
            channel.set_description(description.clone());
        }
        if let Some(position) = req.position {
            channel.position = position;
        }
        if let Some(max_users) = req.max_users {
            channel.max_users = max_users;
        }
        Ok(())
    }

    /// Remove `start`, then its ancestors, for as long as each one is a
    /// temporary channel without users and without children.
    pub fn reap_temporary(&mut self, start: ChannelId) -> Vec<ChannelId> {
        let mut reaped = Vec::new();
        let mut current = Some(start);

        while let Some(id) = current {
            let Some(channel) = self.channels.get(&id) else {
                break;
            };
            if channel.is_root()
                || !channel.temporary
                || !channel.is_empty()
                || !channel.children().is_empty()
            {
                break;
            }
            current = channel.parent;
            match self.remove(id) {
                Ok(removal) => reaped.extend(removal.channels),
                Err(_) => break,
            }
        }

        reaped
    }

    /// Reap every empty temporary channel without children, cascading up
    /// through temporary ancestors left empty.
    pub fn reap_all_temporary(&mut self) -> Vec<ChannelId> {
        let mut leaves: Vec<ChannelId> = self
            .channels
            .values()
            .filter(|c| c.temporary && c.children().is_empty())
            .map(|c| c.id)
            .collect();
        leaves.sort_unstable();

        let mut reaped = Vec::new();
        for id in leaves {
            reaped.extend(self.reap_temporary(id));
        }
        reaped
    }

    fn check_unique_name(
        &self,
        parent: ChannelId,
        name: &str,
        except: Option<ChannelId>,
    ) -> Result<()> {
        let taken = self
            .get(parent)?
            .children()
            .iter()
            .filter(|child| Some(**child) != except)
            .filter_map(|child| self.channels.get(child))
            .any(|sibling| sibling.name == name);

        if taken {
            return Err(TopologyError::DuplicateName {
                parent,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Reject placing a subtree of height `height` directly below `parent`.
    fn check_nesting(&self, parent: ChannelId, height: usize) -> Result<()> {
        let limit = self.config.nesting_limit;
        if limit > 0 && self.depth(parent)? + 1 + height > limit {
            return Err(TopologyError::NestingLimit { limit });
        }
        Ok(())
    }

    // === Occupancy ===

    /// Place a session in a channel, leaving its previous channel.
    ///
    /// Returns the channel the session left, if it moved.
    pub fn add_user(&mut self, session: SessionId, channel: ChannelId) -> Result<Option<ChannelId>> {
        self.get(channel)?;

        let previous = self.locations.insert(session, channel);
        if let Some(previous) = previous.filter(|p| *p != channel) {
            if let Some(old) = self.channels.get_mut(&previous) {
                old.remove_user(session);
            }
        }
        self.get_mut(channel)?.insert_user(session);

        Ok(previous.filter(|p| *p != channel))
    }

    /// Remove a session from the tree. Returns the channel it was in.
    pub fn remove_user(&mut self, session: SessionId) -> Option<ChannelId> {
        let channel = self.locations.remove(&session)?;
        if let Some(current) = self.channels.get_mut(&channel) {
            current.remove_user(session);
        }
        Some(channel)
    }

    pub fn channel_of(&self, session: SessionId) -> Option<ChannelId> {
        self.locations.get(&session).copied()
    }

    // === Queries ===

    /// True iff no users occupy the channel.
    pub fn is_empty(&self, id: ChannelId) -> Result<bool> {
        Ok(self.get(id)?.is_empty())
    }

    /// True iff the channel or any descendant has users.
    pub fn has_any_users_in_or_below(&self, id: ChannelId) -> Result<bool> {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let channel = self.get(current)?;
            if !channel.is_empty() {
                return Ok(true);
            }
            stack.extend_from_slice(channel.children());
        }
        Ok(false)
    }

    /// True iff the session sits in `id` or one of its descendants.
    pub fn is_user_in_or_below(&self, id: ChannelId, session: SessionId) -> Result<bool> {
        self.get(id)?;
        let Some(mut current) = self.channel_of(session) else {
            return Ok(false);
        };
        loop {
            if current == id {
                return Ok(true);
            }
            match self.channels.get(&current).and_then(|c| c.parent) {
                Some(parent) => current = parent,
                None => return Ok(false),
            }
        }
    }

    /// Strict ancestors, nearest first, ending at the root.
    pub fn ancestors(&self, id: ChannelId) -> Result<Vec<ChannelId>> {
        let mut ancestors = Vec::new();
        let mut current = self.get(id)?.parent;
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.get(parent)?.parent;
        }
        Ok(ancestors)
    }

    /// Distance from the root (root = 0).
    pub fn depth(&self, id: ChannelId) -> Result<usize> {
        Ok(self.ancestors(id)?.len())
    }

    /// Height of the subtree below `id` (leaf = 0).
    pub fn subtree_height(&self, id: ChannelId) -> Result<usize> {
        let mut height = 0;
        let mut stack = vec![(id, 0usize)];
        while let Some((current, level)) = stack.pop() {
            height = height.max(level);
            for child in self.get(current)?.children() {
                stack.push((*child, level + 1));
            }
        }
        Ok(height)
    }

    /// Slash-joined names from the root down to `id`.
    pub fn path(&self, id: ChannelId) -> Result<String> {
        let mut names = vec![self.get(id)?.name.as_str()];
        for ancestor in self.ancestors(id)? {
            names.push(self.get(ancestor)?.name.as_str());
        }
        names.reverse();
        Ok(names.join("/"))
    }

    /// Every descendant of `id`, excluding `id` itself.
    ///
    /// Computed on demand; never cached.
    pub fn all_children(&self, id: ChannelId) -> Result<BTreeSet<ChannelId>> {
        let mut descendants = BTreeSet::new();
        let mut stack = self.get(id)?.children().to_vec();
        while let Some(current) = stack.pop() {
            if descendants.insert(current) {
                stack.extend_from_slice(self.get(current)?.children());
            }
        }
        Ok(descendants)
    }

    /// Channels whose ACLs and groups apply at `id`, outermost first.
    ///
    /// Walks up from `id` and stops at the first channel (inclusive) that
    /// does not inherit from its parent.
    pub fn inheritance_chain(&self, id: ChannelId) -> Result<Vec<ChannelId>> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(channel_id) = current {
            let channel = self.get(channel_id)?;
            chain.push(channel_id);
            if !channel.inherit_acl {
                break;
            }
            current = channel.parent;
        }
        chain.reverse();
        Ok(chain)
    }

    /// Direct children in display order.
    pub fn sorted_children(&self, id: ChannelId) -> Result<Vec<&Channel>> {
        let mut children = self
            .get(id)?
            .children()
            .iter()
            .map(|child| self.get(*child))
            .collect::<Result<Vec<_>>>()?;
        children.sort_by(|a, b| a.display_cmp(b));
        Ok(children)
    }

    /// All channel ids in pre-order, siblings in display order.
    pub fn ordered_ids(&self) -> Vec<ChannelId> {
        let mut ordered = Vec::with_capacity(self.channels.len());
        let mut seen = HashSet::with_capacity(self.channels.len());
        let mut stack = vec![ChannelId::ROOT];

        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            ordered.push(current);
            if let Ok(children) = self.sorted_children(current) {
                stack.extend(children.iter().rev().map(|c| c.id));
            }
        }
        ordered
    }
}

impl Default for ChannelTree {
    fn default() -> Self {
        Self::new(TopologyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> ChannelTree {
        ChannelTree::new(TopologyConfig::unlimited())
    }

    #[test]
    fn test_new_tree_has_only_root() {
        let tree = tree();
        assert_eq!(tree.channel_count(), 1);
        let root = tree.get(ChannelId::ROOT).unwrap();
        assert!(root.is_root());
        assert_eq!(root.name, ROOT_NAME);
    }

    #[test]
    fn test_create_assigns_increasing_ids() {
        let mut tree = tree();
        let a = tree.create(ChannelId::ROOT, "A").unwrap();
        let b = tree.create(ChannelId::ROOT, "B").unwrap();

        assert_eq!(a, ChannelId(1));
        assert_eq!(b, ChannelId(2));
        assert_eq!(tree.get(ChannelId::ROOT).unwrap().children(), &[a, b]);
        assert_eq!(tree.get(a).unwrap().parent, Some(ChannelId::ROOT));
    }

    #[test]
    fn test_ids_are_not_reused_after_removal() {
        let mut tree = tree();
        let a = tree.create(ChannelId::ROOT, "A").unwrap();
        tree.remove(a).unwrap();
        let b = tree.create(ChannelId::ROOT, "A").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_create_rejects_unknown_parent() {
        let mut tree = tree();
        let result = tree.create(ChannelId(42), "Lost");
        assert_eq!(result, Err(TopologyError::InvalidParent(ChannelId(42))));
        assert_eq!(tree.channel_count(), 1);
    }

    #[test]
    fn test_create_rejects_duplicate_sibling_name() {
        let mut tree = tree();
        let lobby = tree.create(ChannelId::ROOT, "Lobby").unwrap();
        let result = tree.create(ChannelId::ROOT, "Lobby");
        assert!(matches!(result, Err(TopologyError::DuplicateName { .. })));

        // Same name below a different parent is fine
        assert!(tree.create(lobby, "Lobby").is_ok());
    }

    #[test]
    fn test_create_copies_attributes() {
        let mut tree = tree();
        let mut req = CreateChannel::new(ChannelId::ROOT, "Raid")
            .temporary()
            .with_max_users(5)
            .with_position(3);
        req.description = "Tonight".into();

        let id = tree.create_channel(&req).unwrap();
        let channel = tree.get(id).unwrap();
        assert!(channel.temporary);
        assert_eq!(channel.max_users, 5);
        assert_eq!(channel.position, 3);
        assert_eq!(channel.description(), "Tonight");
        assert!(!channel.description_hash().is_empty());
    }

    #[test]
    fn test_remove_root_fails() {
        let mut tree = tree();
        assert_eq!(tree.remove(ChannelId::ROOT), Err(TopologyError::IsRoot));
    }

    #[test]
    fn test_remove_cascades_and_relocates_users() {
        let mut tree = tree();
        let a = tree.create(ChannelId::ROOT, "A").unwrap();
        let b = tree.create(a, "B").unwrap();
        let c = tree.create(b, "C").unwrap();
        tree.add_user(SessionId(1), c).unwrap();

        let removal = tree.remove(a).unwrap();

        assert_eq!(removal.channels[0], a);
        assert_eq!(removal.channels.len(), 3);
        assert_eq!(removal.relocated, vec![SessionId(1)]);
        assert!(!tree.contains(a) && !tree.contains(b) && !tree.contains(c));
        assert_eq!(tree.channel_of(SessionId(1)), Some(ChannelId::ROOT));
        assert!(tree.get(ChannelId::ROOT).unwrap().children().is_empty());
        assert!(!tree.is_empty(ChannelId::ROOT).unwrap());
    }

    #[test]
    fn test_move_rejects_cycles() {
        let mut tree = tree();
        let a = tree.create(ChannelId::ROOT, "A").unwrap();
        let b = tree.create(a, "B").unwrap();

        assert!(matches!(
            tree.move_channel(a, b),
            Err(TopologyError::WouldCreateCycle { .. })
        ));
        assert!(matches!(
            tree.move_channel(a, a),
            Err(TopologyError::WouldCreateCycle { .. })
        ));
        assert!(matches!(
            tree.move_channel(ChannelId::ROOT, a),
            Err(TopologyError::WouldCreateCycle { .. })
        ));
        assert_eq!(tree.get(b).unwrap().parent, Some(a));
    }

    #[test]
    fn test_move_reparents() {
        let mut tree = tree();
        let a = tree.create(ChannelId::ROOT, "A").unwrap();
        let b = tree.create(ChannelId::ROOT, "B").unwrap();
        let c = tree.create(a, "C").unwrap();

        assert_eq!(tree.move_channel(c, b).unwrap(), a);
        assert_eq!(tree.get(c).unwrap().parent, Some(b));
        assert!(tree.get(a).unwrap().children().is_empty());
        assert_eq!(tree.get(b).unwrap().children(), &[c]);
        assert_eq!(tree.path(c).unwrap(), "Root/B/C");
    }

    #[test]
    fn test_move_rejects_duplicate_name_in_target() {
        let mut tree = tree();
        let a = tree.create(ChannelId::ROOT, "A").unwrap();
        let b = tree.create(ChannelId::ROOT, "B").unwrap();
        let inner = tree.create(a, "Shared").unwrap();
        tree.create(b, "Shared").unwrap();

        assert!(matches!(
            tree.move_channel(inner, b),
            Err(TopologyError::DuplicateName { .. })
        ));
        assert_eq!(tree.get(inner).unwrap().parent, Some(a));
    }

    #[test]
    fn test_move_unknown_channel() {
        let mut tree = tree();
        assert_eq!(
            tree.move_channel(ChannelId(9), ChannelId::ROOT),
            Err(TopologyError::ChannelNotFound(ChannelId(9)))
        );
    }

    #[test]
    fn test_nesting_limit() {
        let mut tree = ChannelTree::new(TopologyConfig {
            nesting_limit: 2,
            ..TopologyConfig::unlimited()
        });
        let a = tree.create(ChannelId::ROOT, "A").unwrap();
        let b = tree.create(a, "B").unwrap();
        assert_eq!(
            tree.create(b, "C"),
            Err(TopologyError::NestingLimit { limit: 2 })
        );

        // Moving a subtree of height 1 below depth 1 would reach depth 3
        let x = tree.create(ChannelId::ROOT, "X").unwrap();
        tree.create(x, "Y").unwrap();
        assert_eq!(
            tree.move_channel(x, a),
            Err(TopologyError::NestingLimit { limit: 2 })
        );
    }

    #[test]
    fn test_channel_count_limit() {
        let mut tree = ChannelTree::new(TopologyConfig {
            channel_count_limit: 2,
            ..TopologyConfig::unlimited()
        });
        tree.create(ChannelId::ROOT, "A").unwrap();
        assert_eq!(
            tree.create(ChannelId::ROOT, "B"),
            Err(TopologyError::ChannelLimit { limit: 2 })
        );
    }

    #[test]
    fn test_depth_path_and_height() {
        let mut tree = tree();
        let a = tree.create(ChannelId::ROOT, "A").unwrap();
        let b = tree.create(a, "B").unwrap();

        assert_eq!(tree.depth(ChannelId::ROOT).unwrap(), 0);
        assert_eq!(tree.depth(b).unwrap(), 2);
        assert_eq!(tree.path(b).unwrap(), "Root/A/B");
        assert_eq!(tree.subtree_height(ChannelId::ROOT).unwrap(), 2);
        assert_eq!(tree.subtree_height(b).unwrap(), 0);
        assert_eq!(tree.ancestors(b).unwrap(), vec![a, ChannelId::ROOT]);
    }

    #[test]
    fn test_all_children_is_transitive() {
        let mut tree = tree();
        let a = tree.create(ChannelId::ROOT, "A").unwrap();
        let b = tree.create(a, "B").unwrap();
        let c = tree.create(b, "C").unwrap();
        let d = tree.create(ChannelId::ROOT, "D").unwrap();

        let below_a = tree.all_children(a).unwrap();
        assert_eq!(below_a, BTreeSet::from([b, c]));
        assert!(!below_a.contains(&d));
        assert!(tree.all_children(c).unwrap().is_empty());
    }

    #[test]
    fn test_occupancy_queries() {
        let mut tree = tree();
        let a = tree.create(ChannelId::ROOT, "A").unwrap();
        let b = tree.create(a, "B").unwrap();
        let other = tree.create(ChannelId::ROOT, "Other").unwrap();

        assert!(!tree.has_any_users_in_or_below(ChannelId::ROOT).unwrap());

        tree.add_user(SessionId(7), b).unwrap();
        assert!(tree.has_any_users_in_or_below(a).unwrap());
        assert!(tree.is_empty(a).unwrap());
        assert!(!tree.is_empty(b).unwrap());
        assert!(tree.is_user_in_or_below(a, SessionId(7)).unwrap());
        assert!(tree.is_user_in_or_below(b, SessionId(7)).unwrap());
        assert!(!tree.is_user_in_or_below(other, SessionId(7)).unwrap());
        assert!(!tree.is_user_in_or_below(a, SessionId(8)).unwrap());

        // Moving leaves the previous channel
        assert_eq!(tree.add_user(SessionId(7), other).unwrap(), Some(b));
        assert!(tree.is_empty(b).unwrap());
        assert_eq!(tree.remove_user(SessionId(7)), Some(other));
        assert_eq!(tree.channel_of(SessionId(7)), None);
        assert!(tree.is_empty(other).unwrap());
    }

    #[test]
    fn test_inheritance_chain_stops_at_cutoff() {
        let mut tree = tree();
        let a = tree.create(ChannelId::ROOT, "A").unwrap();
        let b = tree.create(a, "B").unwrap();
        let c = tree.create(b, "C").unwrap();

        assert_eq!(
            tree.inheritance_chain(c).unwrap(),
            vec![ChannelId::ROOT, a, b, c]
        );

        tree.get_mut(b).unwrap().inherit_acl = false;
        assert_eq!(tree.inheritance_chain(c).unwrap(), vec![b, c]);
        assert_eq!(tree.inheritance_chain(b).unwrap(), vec![b]);
    }

    #[test]
    fn test_reap_temporary_cascades_upward() {
        let mut tree = tree();
        let outer = tree
            .create_channel(&CreateChannel::new(ChannelId::ROOT, "Outer").temporary())
            .unwrap();
        let inner = tree
            .create_channel(&CreateChannel::new(outer, "Inner").temporary())
            .unwrap();

        tree.add_user(SessionId(1), inner).unwrap();
        assert!(tree.reap_temporary(inner).is_empty());

        tree.remove_user(SessionId(1));
        assert_eq!(tree.reap_temporary(inner), vec![inner, outer]);
        assert_eq!(tree.channel_count(), 1);
    }

    #[test]
    fn test_reap_ignores_permanent_channels() {
        let mut tree = tree();
        let permanent = tree.create(ChannelId::ROOT, "Lobby").unwrap();
        assert!(tree.reap_temporary(permanent).is_empty());
        assert!(tree.reap_temporary(ChannelId::ROOT).is_empty());
        assert!(tree.contains(permanent));
    }

    #[test]
    fn test_update_renames_with_sibling_check() {
        let mut tree = tree();
        let a = tree.create(ChannelId::ROOT, "A").unwrap();
        tree.create(ChannelId::ROOT, "B").unwrap();

        let clash = UpdateChannel {
            id: a,
            name: Some("B".into()),
            position: Some(4),
            ..UpdateChannel::default()
        };
        assert!(matches!(
            tree.update(&clash),
            Err(TopologyError::DuplicateName { .. })
        ));
        // Nothing applied on failure
        assert_eq!(tree.get(a).unwrap().position, 0);

        let rename = UpdateChannel {
            id: a,
            name: Some("Renamed".into()),
            max_users: Some(8),
            ..UpdateChannel::default()
        };
        tree.update(&rename).unwrap();
        assert_eq!(tree.get(a).unwrap().name, "Renamed");
        assert_eq!(tree.get(a).unwrap().max_users, 8);
    }

    #[test]
    fn test_ordered_ids_follow_display_order() {
        let mut tree = tree();
        let b = tree.create(ChannelId::ROOT, "B").unwrap();
        let a = tree.create(ChannelId::ROOT, "A").unwrap();
        let first = tree
            .create_channel(&CreateChannel::new(ChannelId::ROOT, "Z").with_position(-5))
            .unwrap();
        let under_a = tree.create(a, "Inner").unwrap();

        assert_eq!(
            tree.ordered_ids(),
            vec![ChannelId::ROOT, first, a, under_a, b]
        );
    }

    #[test]
    fn test_from_channels_validates_structure() {
        let config = TopologyConfig::unlimited();

        let missing_root = vec![Channel::new(ChannelId(1), Some(ChannelId::ROOT), "A")];
        assert!(matches!(
            ChannelTree::from_channels(config, missing_root),
            Err(TopologyError::Storage(_))
        ));

        let dangling = vec![
            Channel::new(ChannelId::ROOT, None, "Root"),
            Channel::new(ChannelId(1), Some(ChannelId(5)), "A"),
        ];
        assert!(matches!(
            ChannelTree::from_channels(config, dangling),
            Err(TopologyError::Storage(_))
        ));

        let cycle = vec![
            Channel::new(ChannelId::ROOT, None, "Root"),
            Channel::new(ChannelId(1), Some(ChannelId(2)), "A"),
            Channel::new(ChannelId(2), Some(ChannelId(1)), "B"),
        ];
        assert!(matches!(
            ChannelTree::from_channels(config, cycle),
            Err(TopologyError::Storage(_))
        ));

        let same_name = vec![
            Channel::new(ChannelId::ROOT, None, "Root"),
            Channel::new(ChannelId(1), Some(ChannelId::ROOT), "Lobby"),
            Channel::new(ChannelId(2), Some(ChannelId::ROOT), "Lobby"),
        ];
        assert!(matches!(
            ChannelTree::from_channels(config, same_name),
            Err(TopologyError::Storage(_))
        ));

        let max_id = vec![
            Channel::new(ChannelId::ROOT, None, "Root"),
            Channel::new(ChannelId(u32::MAX), Some(ChannelId::ROOT), "Edge"),
        ];
        assert!(matches!(
            ChannelTree::from_channels(config, max_id),
            Err(TopologyError::Storage(_))
        ));
    }

    #[test]
    fn test_create_fails_when_ids_run_out() {
        let channels = vec![
            Channel::new(ChannelId::ROOT, None, "Root"),
            Channel::new(ChannelId(u32::MAX - 1), Some(ChannelId::ROOT), "Edge"),
        ];
        let mut tree = ChannelTree::from_channels(TopologyConfig::unlimited(), channels).unwrap();

        assert_eq!(
            tree.create(ChannelId::ROOT, "Last"),
            Err(TopologyError::ChannelLimit { limit: 2 })
        );
        assert_eq!(tree.channel_count(), 2);
    }

    #[test]
    fn test_reap_all_temporary_keeps_occupied_and_parents_of_permanent() {
        let mut tree = tree();
        let empty = tree
            .create_channel(&CreateChannel::new(ChannelId::ROOT, "Empty").temporary())
            .unwrap();
        let nested = tree
            .create_channel(&CreateChannel::new(empty, "Nested").temporary())
            .unwrap();
        let busy = tree
            .create_channel(&CreateChannel::new(ChannelId::ROOT, "Busy").temporary())
            .unwrap();
        let holder = tree
            .create_channel(&CreateChannel::new(ChannelId::ROOT, "Holder").temporary())
            .unwrap();
        let kept = tree.create(holder, "Kept").unwrap();
        tree.add_user(SessionId(1), busy).unwrap();

        assert_eq!(tree.reap_all_temporary(), vec![nested, empty]);
        assert!(tree.contains(busy));
        assert!(tree.contains(holder) && tree.contains(kept));
    }

    #[test]
    fn test_from_channels_rebuilds_children_and_next_id() {
        let channels = vec![
            Channel::new(ChannelId::ROOT, None, "Root"),
            Channel::new(ChannelId(4), Some(ChannelId::ROOT), "A"),
            Channel::new(ChannelId(9), Some(ChannelId(4)), "B"),
        ];
        let mut tree = ChannelTree::from_channels(TopologyConfig::unlimited(), channels).unwrap();

        assert_eq!(tree.get(ChannelId(4)).unwrap().children(), &[ChannelId(9)]);
        assert_eq!(tree.create(ChannelId::ROOT, "C").unwrap(), ChannelId(10));
    }
}
