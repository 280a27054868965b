//! Customizable configuration for a [`Connection`](crate::connection::Connection).

use crate::{
    codec::Encoding,
    event::EventTypeFlags,
    payloads::{IdentifyProperties, LARGE_THRESHOLD_MAXIMUM, LARGE_THRESHOLD_MINIMUM},
};

/// Default gateway host used when no override is configured.
pub const DEFAULT_GATEWAY_HOST: &str = "gateway.discord.gg";

/// Discord API version this crate speaks.
pub const API_VERSION: u8 = 10;

/// Configuration used by a [`Connection`](crate::connection::Connection) to
/// identify with the gateway and operate.
///
/// Use [`ConnectionConfig::builder`] to start configuring a connection.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    event_types: EventTypeFlags,
    gateway_host: Box<str>,
    identify_properties: IdentifyProperties,
    intents: crate::payloads::Intents,
    large_threshold: u64,
    presence: Option<serde_json::Value>,
    shard: Option<(u32, u32)>,
    token: Box<str>,
    encoding: Encoding,
    #[cfg(any(feature = "zlib-stock", feature = "zlib-simd"))]
    transport_compression: bool,
}

impl ConnectionConfig {
    /// Create a new default configuration.
    ///
    /// Shortcut for calling [`builder`](Self::builder) and immediately
    /// finalizing the builder.
    pub fn new(token: String, intents: crate::payloads::Intents) -> Self {
        Self::builder(token, intents).build()
    }

    /// Create a builder to customize the configuration.
    pub fn builder(token: String, intents: crate::payloads::Intents) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new(token, intents)
    }

    /// Copy of the event type flags.
    pub const fn event_types(&self) -> EventTypeFlags {
        self.event_types
    }

    /// The host used to connect to the gateway absent an active resume URL.
    pub fn gateway_host(&self) -> &str {
        &self.gateway_host
    }

    /// Immutable reference to the identification properties.
    pub const fn identify_properties(&self) -> &IdentifyProperties {
        &self.identify_properties
    }

    /// Intents requested when identifying.
    pub const fn intents(&self) -> crate::payloads::Intents {
        self.intents
    }

    /// Maximum threshold at which Discord stops sending a guild's member
    /// list in GUILD_CREATE.
    pub const fn large_threshold(&self) -> u64 {
        self.large_threshold
    }

    /// Presence to set when identifying.
    pub const fn presence(&self) -> Option<&serde_json::Value> {
        self.presence.as_ref()
    }

    /// Shard identifier to identify with, if sharding.
    pub const fn shard(&self) -> Option<(u32, u32)> {
        self.shard
    }

    /// Token used to authenticate when identifying.
    pub const fn token(&self) -> &str {
        &self.token
    }

    /// Wire encoding in use.
    pub const fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Whether transport-level zlib-stream compression is requested.
    #[cfg(any(feature = "zlib-stock", feature = "zlib-simd"))]
    pub const fn transport_compression(&self) -> bool {
        self.transport_compression
    }

    /// Whether transport-level zlib-stream compression is requested.
    ///
    /// Always `false` when built without a `zlib-*` feature.
    #[cfg(not(any(feature = "zlib-stock", feature = "zlib-simd")))]
    pub const fn transport_compression(&self) -> bool {
        false
    }
}

/// Builder to customize a [`ConnectionConfig`].
#[derive(Debug)]
#[must_use = "builder must be completed to be used"]
pub struct ConnectionConfigBuilder {
    inner: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    /// Create a new builder.
    ///
    /// Refer to each method to learn their default values. The token is
    /// automatically prefixed with `"Bot "` if not already present.
    pub fn new(mut token: String, intents: crate::payloads::Intents) -> Self {
        if !token.starts_with("Bot ") {
            token.insert_str(0, "Bot ");
        }

        Self {
            inner: ConnectionConfig {
                event_types: EventTypeFlags::default(),
                gateway_host: DEFAULT_GATEWAY_HOST.into(),
                identify_properties: IdentifyProperties::new(
                    std::env::consts::OS,
                    "shardcore",
                    "shardcore",
                ),
                intents,
                large_threshold: LARGE_THRESHOLD_MINIMUM,
                presence: None,
                shard: None,
                token: token.into_boxed_str(),
                encoding: Encoding::Json,
                #[cfg(any(feature = "zlib-stock", feature = "zlib-simd"))]
                transport_compression: false,
            },
        }
    }

    /// Consume the builder, constructing a [`ConnectionConfig`].
    pub fn build(self) -> ConnectionConfig {
        self.inner
    }

    /// Set the event types to decode.
    ///
    /// An optimization: event types not included here still update the
    /// tracked sequence number but are not decoded into an [`Event`].
    ///
    /// [`Event`]: crate::event::Event
    pub const fn event_types(mut self, event_types: EventTypeFlags) -> Self {
        self.inner.event_types = event_types;
        self
    }

    /// Override the host used to connect to the gateway.
    pub fn gateway_host(mut self, host: impl Into<Box<str>>) -> Self {
        self.inner.gateway_host = host.into();
        self
    }

    /// Set the identification properties to identify with.
    pub fn identify_properties(mut self, properties: IdentifyProperties) -> Self {
        self.inner.identify_properties = properties;
        self
    }

    /// Set the maximum number of members in a guild before the member list
    /// is omitted from GUILD_CREATE.
    ///
    /// # Panics
    ///
    /// Panics if the value is below 50 or above 250.
    pub const fn large_threshold(mut self, large_threshold: u64) -> Self {
        assert!(
            large_threshold >= LARGE_THRESHOLD_MINIMUM && large_threshold <= LARGE_THRESHOLD_MAXIMUM,
            "large threshold isn't in the accepted range"
        );

        self.inner.large_threshold = large_threshold;
        self
    }

    /// Set the presence to use when identifying.
    pub fn presence(mut self, presence: serde_json::Value) -> Self {
        self.inner.presence = Some(presence);
        self
    }

    /// Set the shard identifier to identify with.
    pub const fn shard(mut self, current: u32, total: u32) -> Self {
        self.inner.shard = Some((current, total));
        self
    }

    /// Enable or disable transport-level zlib-stream compression.
    ///
    /// Disabled by default, even when a `zlib-*` feature is compiled in: the
    /// caller opts in explicitly, since enabling it also changes the
    /// `encoding`/`compress` query parameters [`connect`](crate::connection::Connection::connect)
    /// puts on the upgrade request. Has no effect unless a `zlib-*` feature
    /// is compiled in.
    #[cfg(any(feature = "zlib-stock", feature = "zlib-simd"))]
    pub const fn transport_compression(mut self, enabled: bool) -> Self {
        self.inner.transport_compression = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionConfig;
    use crate::payloads::Intents;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(ConnectionConfig: Clone, Debug, Send, Sync);

    #[test]
    fn token_gets_bot_prefix() {
        let config = ConnectionConfig::new("abc123".to_owned(), Intents::empty());
        assert_eq!("Bot abc123", config.token());
    }

    #[test]
    fn token_prefix_is_idempotent() {
        let config = ConnectionConfig::new("Bot abc123".to_owned(), Intents::empty());
        assert_eq!("Bot abc123", config.token());
    }

    #[test]
    #[should_panic]
    fn large_threshold_rejects_out_of_range() {
        let _ = ConnectionConfig::builder("token".to_owned(), Intents::empty()).large_threshold(10);
    }
}
