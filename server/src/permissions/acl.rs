//! ACL evaluation.
//!
//! Computes the effective permissions for a user in a channel.

use serde::{Deserialize, Serialize};
use vc_common::protocol::AclEntrySpec;
use vc_common::{ChannelId, User, UserId};

use super::bits::Permissions;
use super::groups::is_member;
use crate::topology::{ChannelTree, Result, TopologyError};

/// Who an ACL entry applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclSubject {
    /// A single registered user.
    User(UserId),
    /// Members of a group, resolved at the channel owning the entry.
    Group(String),
}

/// One rule attached to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub subject: AclSubject,
    pub allow: Permissions,
    pub deny: Permissions,
    /// Applies to the channel owning the entry.
    pub apply_here: bool,
    /// Applies to descendants of the channel owning the entry.
    pub apply_subs: bool,
}

impl AclEntry {
    /// Entry for a group, applying here and below.
    #[must_use]
    pub fn group(name: impl Into<String>, allow: Permissions, deny: Permissions) -> Self {
        Self {
            subject: AclSubject::Group(name.into()),
            allow,
            deny,
            apply_here: true,
            apply_subs: true,
        }
    }

    /// Entry for a single user, applying here and below.
    #[must_use]
    pub const fn user(id: UserId, allow: Permissions, deny: Permissions) -> Self {
        Self {
            subject: AclSubject::User(id),
            allow,
            deny,
            apply_here: true,
            apply_subs: true,
        }
    }

    #[must_use]
    pub fn here_only(mut self) -> Self {
        self.apply_here = true;
        self.apply_subs = false;
        self
    }

    #[must_use]
    pub fn subs_only(mut self) -> Self {
        self.apply_here = false;
        self.apply_subs = true;
        self
    }

    /// Reject entries that allow and deny the same bit.
    pub fn validate(&self) -> Result<()> {
        let overlap = self.allow & self.deny;
        if !overlap.is_empty() {
            return Err(TopologyError::MalformedAclEntry(format!(
                "allow and deny overlap: {overlap:?}"
            )));
        }
        if let AclSubject::Group(name) = &self.subject {
            if name.trim_start_matches('!').trim().is_empty() {
                return Err(TopologyError::MalformedAclEntry(
                    "empty group name".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Whether the entry is in effect when evaluating `target` from `owner`.
    const fn applies_at(&self, owner: ChannelId, target: ChannelId) -> bool {
        if owner.0 == target.0 {
            self.apply_here
        } else {
            self.apply_subs
        }
    }

    fn matches(&self, tree: &ChannelTree, user: &User, owner: ChannelId) -> Result<bool> {
        match &self.subject {
            AclSubject::User(id) => Ok(user.user_id() == Some(*id)),
            AclSubject::Group(name) => is_member(tree, user, owner, name),
        }
    }
}

impl TryFrom<AclEntrySpec> for AclEntry {
    type Error = TopologyError;

    fn try_from(spec: AclEntrySpec) -> Result<Self> {
        let subject = match (spec.user, spec.group) {
            (Some(user), None) => AclSubject::User(user),
            (None, Some(group)) => AclSubject::Group(group),
            (Some(_), Some(_)) => {
                return Err(TopologyError::MalformedAclEntry(
                    "entry names both a user and a group".to_string(),
                ));
            }
            (None, None) => {
                return Err(TopologyError::MalformedAclEntry(
                    "entry has no subject".to_string(),
                ));
            }
        };

        let overlap = spec.allow & spec.deny;
        if overlap != 0 {
            return Err(TopologyError::MalformedAclEntry(format!(
                "allow and deny overlap: {overlap:#x}"
            )));
        }

        let entry = Self {
            subject,
            allow: Permissions::from_wire(spec.allow),
            deny: Permissions::from_wire(spec.deny),
            apply_here: spec.apply_here,
            apply_subs: spec.apply_subs,
        };
        entry.validate()?;
        Ok(entry)
    }
}

/// Compute the effective permissions of `user` in `channel`.
///
/// Resolution order:
/// 1. Collect the channel and its ancestors up to the first channel that
///    does not inherit ACLs (inclusive)
/// 2. Walk that chain from the outermost channel inwards
/// 3. Apply each matching entry in stored order; the last entry touching a
///    bit decides it, so closer channels override farther ones and later
///    entries override earlier ones in the same channel
///
/// Group subjects are resolved at the channel owning the entry. There is
/// no administrative bypass here; callers decide that before asking.
pub fn effective_permissions(
    tree: &ChannelTree,
    user: &User,
    channel: ChannelId,
) -> Result<Permissions> {
    let mut granted = Permissions::empty();
    let mut denied = Permissions::empty();

    for owner in tree.inheritance_chain(channel)? {
        for entry in &tree.get(owner)?.acl {
            if !entry.applies_at(owner, channel) || !entry.matches(tree, user, owner)? {
                continue;
            }
            granted = (granted | entry.allow) & !entry.deny;
            denied = (denied | entry.deny) & !entry.allow;
        }
    }

    Ok(granted & !denied)
}
