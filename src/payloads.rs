//! Outgoing gateway command payloads: IDENTIFY, RESUME, and HEARTBEAT.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Bitflags requesting which categories of event Discord should send
    /// over this connection.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct Intents: u64 {
        /// Guild create/update/delete, role and channel changes.
        const GUILDS = 1;
        /// Guild member add/update/remove.
        const GUILD_MEMBERS = 1 << 1;
        /// Ban add/remove.
        const GUILD_MODERATION = 1 << 2;
        /// Guild emoji and sticker updates.
        const GUILD_EMOJIS_AND_STICKERS = 1 << 3;
        /// Guild integration updates.
        const GUILD_INTEGRATIONS = 1 << 4;
        /// Guild webhook updates.
        const GUILD_WEBHOOKS = 1 << 5;
        /// Guild invite create/delete.
        const GUILD_INVITES = 1 << 6;
        /// Voice state updates.
        const GUILD_VOICE_STATES = 1 << 7;
        /// Presence updates.
        const GUILD_PRESENCES = 1 << 8;
        /// Guild message create/update/delete.
        const GUILD_MESSAGES = 1 << 9;
        /// Guild message reaction add/remove.
        const GUILD_MESSAGE_REACTIONS = 1 << 10;
        /// Guild typing start.
        const GUILD_MESSAGE_TYPING = 1 << 11;
        /// Direct message create/update/delete.
        const DIRECT_MESSAGES = 1 << 12;
        /// Direct message reaction add/remove.
        const DIRECT_MESSAGE_REACTIONS = 1 << 13;
        /// Direct message typing start.
        const DIRECT_MESSAGE_TYPING = 1 << 14;
        /// Message content is included on non-mentioning messages.
        const MESSAGE_CONTENT = 1 << 15;
        /// Guild scheduled event create/update/delete.
        const GUILD_SCHEDULED_EVENTS = 1 << 16;
        /// Auto moderation rule create/update/delete.
        const AUTO_MODERATION_CONFIGURATION = 1 << 20;
        /// Auto moderation action execution.
        const AUTO_MODERATION_EXECUTION = 1 << 21;
    }
}

/// Identifying properties of the client connecting to the gateway.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct IdentifyProperties {
    /// Operating system running the client.
    pub os: String,
    /// Library name presented to Discord.
    pub browser: String,
    /// Library name presented to Discord.
    pub device: String,
}

impl IdentifyProperties {
    /// Construct new identify properties.
    pub fn new(os: impl Into<String>, browser: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            browser: browser.into(),
            device: device.into(),
        }
    }
}

/// Body of an outgoing op 2 IDENTIFY payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Identify {
    /// Authentication token.
    pub token: String,
    /// Requested intents.
    pub intents: Intents,
    /// Client identification properties.
    pub properties: IdentifyProperties,
    /// Whether payloads should be compressed per-message (distinct from
    /// transport-level zlib-stream compression).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress: Option<bool>,
    /// Member-count threshold above which large guilds omit their member
    /// list from GUILD_CREATE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_threshold: Option<u64>,
    /// Shard identifier, when sharding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<(u32, u32)>,
    /// Initial presence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<serde_json::Value>,
}

/// Body of an outgoing op 6 RESUME payload.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Resume {
    /// Authentication token.
    pub token: String,
    /// Session identifier from the original READY.
    pub session_id: String,
    /// Last sequence number observed before the disconnect.
    pub seq: u64,
}

/// Minimum accepted value for [`Identify::large_threshold`].
pub const LARGE_THRESHOLD_MINIMUM: u64 = 50;

/// Maximum accepted value for [`Identify::large_threshold`].
pub const LARGE_THRESHOLD_MAXIMUM: u64 = 250;

#[cfg(test)]
mod tests {
    use super::{Identify, IdentifyProperties, Intents, Resume};
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(Intents: Clone, Copy, Debug, Eq, PartialEq, Send, Sync);
    assert_impl_all!(Identify: Clone, Debug, PartialEq, Send, Sync);
    assert_impl_all!(Resume: Clone, Debug, Eq, PartialEq, Send, Sync);

    #[test]
    fn identify_serializes_without_optional_fields() {
        let identify = Identify {
            token: "Bot abc".into(),
            intents: Intents::empty(),
            properties: IdentifyProperties::new("linux", "shardcore", "shardcore"),
            compress: None,
            large_threshold: None,
            shard: None,
            presence: None,
        };

        let value = serde_json::to_value(&identify).unwrap();
        assert!(value.get("large_threshold").is_none());
        assert!(value.get("shard").is_none());
    }
}
