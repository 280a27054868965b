//! Decoded dispatch events and the event-type filter used to let the
//! gateway skip decoding events a caller has no interest in.

use bitflags::bitflags;

/// A decoded DISPATCH payload.
///
/// The event body is handed back as an opaque JSON value; interpreting the
/// shape of any particular dispatch name is left to the caller's own model
/// layer.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct Event {
    /// Dispatch event name, e.g. `"MESSAGE_CREATE"`.
    pub name: Box<str>,
    /// Sequence number this dispatch carried.
    pub sequence: u64,
    /// Opaque decoded event body.
    pub data: serde_json::Value,
}

bitflags! {
    /// Filter controlling which DISPATCH event types the gateway bothers
    /// decoding at all.
    ///
    /// Event types outside the configured flags are still acknowledged for
    /// sequence-tracking purposes but their body is not decoded into an
    /// [`Event`]; this mirrors Discord's own intents filtering in spirit but
    /// is purely a local CPU optimization, since Discord itself is unaware
    /// of this filter.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct EventTypeFlags: u64 {
        /// `READY`.
        const READY = 1;
        /// `RESUMED`.
        const RESUMED = 1 << 1;
        /// `MESSAGE_CREATE`.
        const MESSAGE_CREATE = 1 << 2;
        /// `MESSAGE_UPDATE`.
        const MESSAGE_UPDATE = 1 << 3;
        /// `MESSAGE_DELETE`.
        const MESSAGE_DELETE = 1 << 4;
        /// `GUILD_CREATE`.
        const GUILD_CREATE = 1 << 5;
        /// `GUILD_UPDATE`.
        const GUILD_UPDATE = 1 << 6;
        /// `GUILD_DELETE`.
        const GUILD_DELETE = 1 << 7;
        /// `INTERACTION_CREATE`.
        const INTERACTION_CREATE = 1 << 8;
        /// `PRESENCE_UPDATE`.
        const PRESENCE_UPDATE = 1 << 9;
        /// `VOICE_STATE_UPDATE`.
        const VOICE_STATE_UPDATE = 1 << 10;
        /// All other currently unnamed dispatch types.
        const OTHER = 1 << 11;
    }
}

impl Default for EventTypeFlags {
    /// Defaults to everything: a caller that hasn't opted into filtering
    /// gets every event, matching the protocol's default behavior.
    fn default() -> Self {
        Self::all()
    }
}

impl EventTypeFlags {
    /// Map a dispatch event name to its flag, falling back to [`Self::OTHER`]
    /// for anything unrecognized.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "READY" => Self::READY,
            "RESUMED" => Self::RESUMED,
            "MESSAGE_CREATE" => Self::MESSAGE_CREATE,
            "MESSAGE_UPDATE" => Self::MESSAGE_UPDATE,
            "MESSAGE_DELETE" => Self::MESSAGE_DELETE,
            "GUILD_CREATE" => Self::GUILD_CREATE,
            "GUILD_UPDATE" => Self::GUILD_UPDATE,
            "GUILD_DELETE" => Self::GUILD_DELETE,
            "INTERACTION_CREATE" => Self::INTERACTION_CREATE,
            "PRESENCE_UPDATE" => Self::PRESENCE_UPDATE,
            "VOICE_STATE_UPDATE" => Self::VOICE_STATE_UPDATE,
            _ => Self::OTHER,
        }
    }
}
