//! User Types

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a registered user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Generate a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of one connected client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How a session authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum UserIdentity {
    /// Authenticated, registered user.
    Registered(UserId),
    /// Guest without a registered identity.
    Anonymous,
}

/// A connected user as seen by the channel core.
///
/// The core never owns user state; it only reads who the user is and
/// (through its own occupancy table) where the session currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    /// Session ID.
    pub session: SessionId,
    /// Authenticated identity.
    pub identity: UserIdentity,
    /// Server administrator; bypasses ACL evaluation entirely.
    #[serde(default)]
    pub superuser: bool,
}

impl User {
    /// A registered user without administrative rights.
    #[must_use]
    pub const fn registered(session: SessionId, id: UserId) -> Self {
        Self {
            session,
            identity: UserIdentity::Registered(id),
            superuser: false,
        }
    }

    /// A guest session.
    #[must_use]
    pub const fn anonymous(session: SessionId) -> Self {
        Self {
            session,
            identity: UserIdentity::Anonymous,
            superuser: false,
        }
    }

    /// Registered identity, if any.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self.identity {
            UserIdentity::Registered(id) => Some(id),
            UserIdentity::Anonymous => None,
        }
    }

    /// Whether the session belongs to a registered user.
    #[must_use]
    pub const fn is_registered(&self) -> bool {
        matches!(self.identity, UserIdentity::Registered(_))
    }
}
