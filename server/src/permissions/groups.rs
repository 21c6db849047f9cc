//! Channel groups.
//!
//! A group is a named membership rule scoped to one channel. Membership at
//! a channel starts from the same-named group of the parent (if the group
//! inherits) and applies this channel's explicit removals and additions on
//! top, so the closest definition wins.
//!
//! Built-in groups are computed from live occupancy instead of stored sets:
//! - `all`: every user
//! - `auth`: registered users
//! - `in`: users currently in the channel
//! - `out`: users not currently in the channel
//! - `sub`: users in the channel or any sub-channel
//!
//! A leading `!` negates any group expression.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use vc_common::protocol::GroupSpec;
use vc_common::{ChannelId, User, UserId};

use crate::topology::{ChannelTree, Result, TopologyError};

/// Names that can never be used for stored groups.
pub const RESERVED_GROUP_NAMES: [&str; 5] = ["all", "auth", "in", "out", "sub"];

/// Prefix that negates a group expression.
pub const NEGATION_PREFIX: char = '!';

/// Named per-channel membership rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    /// Start from the parent channel's group of the same name.
    pub inherit: bool,
    /// Let sub-channels see this definition.
    pub inheritable: bool,
    /// Users explicitly added at this channel.
    pub add: BTreeSet<UserId>,
    /// Users explicitly removed at this channel.
    pub remove: BTreeSet<UserId>,
}

impl Group {
    /// Empty inheriting, inheritable group.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inherit: true,
            inheritable: true,
            add: BTreeSet::new(),
            remove: BTreeSet::new(),
        }
    }

    /// Reject reserved names and users listed as both added and removed.
    pub fn validate(&self) -> Result<()> {
        let malformed = |reason: &str| TopologyError::MalformedGroup {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(malformed("empty name"));
        }
        if self.name.starts_with(NEGATION_PREFIX) {
            return Err(malformed("name may not start with '!'"));
        }
        if RESERVED_GROUP_NAMES.contains(&self.name.as_str()) {
            return Err(malformed("reserved name"));
        }
        if let Some(user) = self.add.intersection(&self.remove).next() {
            return Err(malformed(&format!("user {user} is both added and removed")));
        }
        Ok(())
    }
}

impl TryFrom<GroupSpec> for Group {
    type Error = TopologyError;

    fn try_from(spec: GroupSpec) -> Result<Self> {
        let group = Self {
            name: spec.name,
            inherit: spec.inherit,
            inheritable: spec.inheritable,
            add: spec.add.into_iter().collect(),
            remove: spec.remove.into_iter().collect(),
        };
        group.validate()?;
        Ok(group)
    }
}

/// Built-in dynamic groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuiltinGroup {
    All,
    Auth,
    In,
    Out,
    Sub,
}

impl BuiltinGroup {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "all" => Some(Self::All),
            "auth" => Some(Self::Auth),
            "in" => Some(Self::In),
            "out" => Some(Self::Out),
            "sub" => Some(Self::Sub),
            _ => None,
        }
    }

    fn contains(self, tree: &ChannelTree, user: &User, channel: ChannelId) -> Result<bool> {
        Ok(match self {
            Self::All => true,
            Self::Auth => user.is_registered(),
            Self::In => tree.channel_of(user.session) == Some(channel),
            Self::Out => tree.channel_of(user.session) != Some(channel),
            Self::Sub => tree.is_user_in_or_below(channel, user.session)?,
        })
    }
}

/// Whether `user` belongs to `group` as seen from `channel`.
pub fn is_member(tree: &ChannelTree, user: &User, channel: ChannelId, group: &str) -> Result<bool> {
    tree.get(channel)?;

    let mut negated = false;
    let mut name = group;
    while let Some(inner) = name.strip_prefix(NEGATION_PREFIX) {
        negated = !negated;
        name = inner;
    }

    Ok(resolve(tree, user, channel, name)? != negated)
}

fn resolve(tree: &ChannelTree, user: &User, channel: ChannelId, group: &str) -> Result<bool> {
    if let Some(builtin) = BuiltinGroup::parse(group) {
        return builtin.contains(tree, user, channel);
    }

    let Some(user_id) = user.user_id() else {
        // Explicit sets only hold registered identities.
        return Ok(false);
    };

    Ok(effective_definitions(tree, channel, group)?
        .iter()
        .fold(false, |member, definition| {
            if definition.remove.contains(&user_id) {
                false
            } else if definition.add.contains(&user_id) {
                true
            } else {
                member
            }
        }))
}

/// Definitions of `group` that shape membership at `channel`, outermost first.
fn effective_definitions<'a>(
    tree: &'a ChannelTree,
    channel: ChannelId,
    group: &str,
) -> Result<Vec<&'a Group>> {
    let chain = tree.inheritance_chain(channel)?;
    let mut definitions = Vec::new();

    for id in chain.iter().rev() {
        let Some(definition) = tree.get(*id)?.groups.get(group) else {
            continue;
        };
        if *id != channel && !definition.inheritable {
            break;
        }
        definitions.push(definition);
        if !definition.inherit {
            break;
        }
    }

    definitions.reverse();
    Ok(definitions)
}
