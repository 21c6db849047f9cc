//! Channel permissions using bitflags.
//!
//! Bit layout matches the control protocol so masks can cross the wire
//! unchanged:
//! - Channel (bits 0-11): administration, presence, voice and text
//! - Server (bits 16-20): only meaningful on the root channel

use bitflags::bitflags;

bitflags! {
    /// Channel permissions represented as a 32-bit bitfield.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    #[serde(transparent)]
    pub struct Permissions: u32 {
        // === Channel (bits 0-11) ===
        /// Edit ACLs, groups and attributes of the channel
        const WRITE              = 1 << 0;
        /// Pass through the channel to reach its sub-channels
        const TRAVERSE           = 1 << 1;
        /// Join the channel
        const ENTER              = 1 << 2;
        /// Transmit audio in the channel
        const SPEAK              = 1 << 3;
        /// Mute or deafen other users in the channel
        const MUTE_DEAFEN        = 1 << 4;
        /// Move users out of or into the channel
        const MOVE               = 1 << 5;
        /// Create permanent sub-channels
        const MAKE_CHANNEL       = 1 << 6;
        /// Link the channel with others
        const LINK_CHANNEL       = 1 << 7;
        /// Whisper to the channel from elsewhere
        const WHISPER            = 1 << 8;
        /// Send text messages to the channel
        const TEXT_MESSAGE       = 1 << 9;
        /// Create temporary sub-channels
        const MAKE_TEMP_CHANNEL  = 1 << 10;
        /// Listen to the channel without joining it
        const LISTEN             = 1 << 11;

        // === Server (bits 16-20) ===
        /// Kick users from the server
        const KICK               = 1 << 16;
        /// Ban users from the server
        const BAN                = 1 << 17;
        /// Register other users
        const REGISTER           = 1 << 18;
        /// Register oneself
        const SELF_REGISTER      = 1 << 19;
        /// Reset avatars and comments of other users
        const RESET_USER_CONTENT = 1 << 20;
    }
}

impl Permissions {
    /// Create permissions from a raw wire value.
    ///
    /// Unknown bits are silently dropped for forward compatibility.
    #[must_use]
    pub const fn from_wire(value: u32) -> Self {
        Self::from_bits_truncate(value)
    }

    /// Raw wire value.
    #[must_use]
    pub const fn to_wire(self) -> u32 {
        self.bits()
    }

    /// Check if this permission set includes the specified permission(s).
    ///
    /// # Examples
    ///
    /// ```
    /// use vc_server::permissions::Permissions;
    ///
    /// let perms = Permissions::ENTER | Permissions::SPEAK;
    /// assert!(perms.has(Permissions::SPEAK));
    /// assert!(!perms.has(Permissions::WRITE));
    /// ```
    #[must_use]
    pub const fn has(self, permission: Self) -> bool {
        self.contains(permission)
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_permission_bits() {
        assert_eq!(Permissions::WRITE.bits(), 0x1);
        assert_eq!(Permissions::TRAVERSE.bits(), 0x2);
        assert_eq!(Permissions::ENTER.bits(), 0x4);
        assert_eq!(Permissions::SPEAK.bits(), 0x8);
        assert_eq!(Permissions::MUTE_DEAFEN.bits(), 0x10);
        assert_eq!(Permissions::MOVE.bits(), 0x20);
        assert_eq!(Permissions::MAKE_CHANNEL.bits(), 0x40);
        assert_eq!(Permissions::LINK_CHANNEL.bits(), 0x80);
        assert_eq!(Permissions::WHISPER.bits(), 0x100);
        assert_eq!(Permissions::TEXT_MESSAGE.bits(), 0x200);
        assert_eq!(Permissions::MAKE_TEMP_CHANNEL.bits(), 0x400);
        assert_eq!(Permissions::LISTEN.bits(), 0x800);
    }

    #[test]
    fn test_server_permission_bits() {
        assert_eq!(Permissions::KICK.bits(), 0x10000);
        assert_eq!(Permissions::BAN.bits(), 0x20000);
        assert_eq!(Permissions::REGISTER.bits(), 0x40000);
        assert_eq!(Permissions::SELF_REGISTER.bits(), 0x80000);
        assert_eq!(Permissions::RESET_USER_CONTENT.bits(), 0x100000);
    }

    #[test]
    fn test_from_wire_drops_unknown_bits() {
        let perms = Permissions::from_wire(0x8 | 0x1000 | 0x8000_0000);
        assert_eq!(perms, Permissions::SPEAK);
        assert_eq!(perms.to_wire(), 0x8);
    }

    #[test]
    fn test_default_is_empty() {
        assert!(Permissions::default().is_empty());
    }

    #[test]
    fn test_serde_preserves_flags() {
        let perms = Permissions::ENTER | Permissions::SPEAK;
        let json = serde_json::to_string(&perms).unwrap();
        let back: Permissions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, perms);
    }
}
