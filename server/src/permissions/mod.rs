//! Channel permission system.
//!
//! - Permission bits: what a user may do in a channel
//! - Groups: named per-channel membership rules with inheritance
//! - ACL: ordered per-channel rules evaluated down the ancestor chain

pub mod acl;
pub mod bits;
pub mod groups;

pub use acl::{effective_permissions, AclEntry, AclSubject};
pub use bits::Permissions;
pub use groups::{is_member, Group, RESERVED_GROUP_NAMES};
