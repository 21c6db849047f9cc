//! `VoiceChat` Channel Core
//!
//! Channel tree, ACLs, groups and the link graph behind one synchronized
//! facade. Answers "what may this user do here" and "who hears this
//! channel" for the rest of the server.

pub mod config;
pub mod permissions;
pub mod store;
pub mod topology;
