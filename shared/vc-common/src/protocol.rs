//! Channel edit requests.
//!
//! These are the structural edits the control-protocol layer hands to the
//! channel core. Permission masks travel as raw bits; the server validates
//! and converts them before anything is applied.

use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, UserId};

const fn default_true() -> bool {
    true
}

/// One structural edit of the channel tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditRequest {
    CreateChannel(CreateChannel),
    RemoveChannel { id: ChannelId },
    MoveChannel { id: ChannelId, new_parent: ChannelId },
    UpdateChannel(UpdateChannel),
    SetAcl(SetAcl),
    Link { a: ChannelId, b: ChannelId },
    /// Without `b`, every link of `a` is removed.
    Unlink {
        a: ChannelId,
        #[serde(default)]
        b: Option<ChannelId>,
    },
}

/// Create a channel below `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateChannel {
    pub parent: ChannelId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub position: i32,
    /// Removed automatically once it has no users and no children.
    #[serde(default)]
    pub temporary: bool,
    /// 0 means the server default applies.
    #[serde(default)]
    pub max_users: u32,
}

impl CreateChannel {
    /// Permanent channel with default attributes.
    #[must_use]
    pub fn new(parent: ChannelId, name: impl Into<String>) -> Self {
        Self {
            parent,
            name: name.into(),
            description: String::new(),
            position: 0,
            temporary: false,
            max_users: 0,
        }
    }

    #[must_use]
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    #[must_use]
    pub const fn with_max_users(mut self, max_users: u32) -> Self {
        self.max_users = max_users;
        self
    }

    #[must_use]
    pub const fn with_position(mut self, position: i32) -> Self {
        self.position = position;
        self
    }
}

/// Change channel attributes. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateChannel {
    pub id: ChannelId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub position: Option<i32>,
    #[serde(default)]
    pub max_users: Option<u32>,
}

/// Replace a channel's groups and ACL entries in one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetAcl {
    pub channel_id: ChannelId,
    #[serde(default = "default_true")]
    pub inherit_acl: bool,
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
    #[serde(default)]
    pub entries: Vec<AclEntrySpec>,
}

/// Group definition as sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    /// Start from the parent channel's group of the same name.
    #[serde(default = "default_true")]
    pub inherit: bool,
    /// Let sub-channels see this definition.
    #[serde(default = "default_true")]
    pub inheritable: bool,
    #[serde(default)]
    pub add: Vec<UserId>,
    #[serde(default)]
    pub remove: Vec<UserId>,
}

impl GroupSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inherit: true,
            inheritable: true,
            add: Vec::new(),
            remove: Vec::new(),
        }
    }
}

/// ACL entry as sent by a client. Exactly one of `user` and `group` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntrySpec {
    #[serde(default)]
    pub user: Option<UserId>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub allow: u32,
    #[serde(default)]
    pub deny: u32,
    #[serde(default = "default_true")]
    pub apply_here: bool,
    #[serde(default = "default_true")]
    pub apply_subs: bool,
}
