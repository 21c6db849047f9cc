//! Shared identifier and session types.

mod channel;
mod user;

pub use channel::ChannelId;
pub use user::{SessionId, User, UserId, UserIdentity};
