//! The [`Connection`] façade: the public entry point tying together the
//! codec, WebSocket engine, and session state.

use crate::{
    close::CloseClassification,
    codec::{self, GatewayPayload},
    compression::Compression,
    config::{ConnectionConfig, API_VERSION},
    error::{InvalidStateError, InvalidStateErrorType, ReceiveError},
    event::{Event, EventTypeFlags},
    payloads::{Identify, Resume},
    session::{SessionState, SessionView},
    ws::{CloseFrame, WebSocketEngine, WsEvent},
};
use std::collections::VecDeque;

/// Base backoff, in whole seconds, before the exponential term.
const BACKOFF_BASE_SECS: u64 = 1;

/// Upper bound on the backoff, in whole seconds.
const BACKOFF_CAP_SECS: u64 = 60;

/// Gateway opcodes understood by [`Connection::receive`].
mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RESUME: u8 = 6;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// The sans-I/O Discord gateway connection.
///
/// Owns exactly one [`WebSocketEngine`], one [`Compression`] state, and one
/// [`SessionState`]. All public operations are synchronous and total: where
/// a precondition is violated the call either returns an empty buffer (for
/// peer-facing concerns) or an [`InvalidStateError`] (for caller misuse).
#[derive(Debug)]
pub struct Connection {
    config: ConnectionConfig,
    engine: WebSocketEngine,
    compression: Compression,
    session: SessionState,
    hello_received: bool,
    events: VecDeque<Event>,
}

impl Connection {
    /// Construct a new, not-yet-connected [`Connection`].
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            engine: WebSocketEngine::new(),
            compression: Compression::new(),
            session: SessionState::new(),
            hello_received: false,
            events: VecDeque::new(),
        }
    }

    /// Read-only projection of session state safe to observe without the
    /// lock a concurrent caller holds around mutating calls.
    #[must_use]
    pub fn session_view(&self) -> SessionView {
        SessionView::from(&self.session)
    }

    /// Whether a subsequent [`reconnect`](Self::reconnect) call is
    /// permitted.
    #[must_use]
    pub fn should_reconnect(&self) -> bool {
        self.session.should_reconnect()
    }

    /// The `(host, port)` pair the caller should open a transport connection
    /// to.
    #[must_use]
    pub fn destination(&self) -> (String, u16) {
        let host = if self.session.should_resume() {
            self.session
                .resume_gateway_url()
                .map(normalize_host)
                .unwrap_or_else(|| self.config.gateway_host().to_owned())
        } else {
            self.config.gateway_host().to_owned()
        };

        (host, 443)
    }

    /// Begin the WebSocket handshake, returning the bytes of the upgrade
    /// request to transmit.
    pub fn connect(&mut self) -> Vec<u8> {
        let (host, _) = self.destination();
        let path = configure_url(&self.config);
        self.engine.initiate(&host, &path)
    }

    /// Feed inbound transport bytes into the connection, returning the
    /// ordered sequence of byte buffers the caller must transmit.
    ///
    /// Passing an empty slice signals end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiveError`] if the upgrade was rejected, the connection
    /// was closed (locally or by the peer), or a payload failed to decode.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, ReceiveError> {
        let mut outbound = Vec::new();
        let ws_events = self
            .engine
            .feed(bytes, &mut outbound)
            .map_err(|_| ReceiveError::framing())?;

        for ws_event in ws_events {
            match ws_event {
                WsEvent::AcceptedUpgrade => {}
                WsEvent::RejectedUpgrade { status, body } => {
                    return Err(ReceiveError::rejected(status, body));
                }
                WsEvent::Message { data, is_binary } => {
                    self.process_message(data, is_binary, &mut outbound)?;
                }
                WsEvent::CloseReceived { code, .. } => {
                    let class = code.map_or_else(
                        CloseClassification::from_missing_code,
                        CloseClassification::from_code,
                    );
                    self.session.finish_closed(class);

                    let reply = if outbound.is_empty() { None } else { Some(outbound.concat()) };
                    return Err(ReceiveError::closed_by_discord(reply, class));
                }
                WsEvent::ConnectionClosed => {
                    let class = CloseClassification::from_missing_code();
                    self.session.finish_closed(class);
                    return Err(ReceiveError::connection_closed(class));
                }
            }
        }

        Ok(outbound)
    }

    /// Drain queued events in FIFO order.
    pub fn events(&mut self) -> impl Iterator<Item = Event> + '_ {
        self.events.drain(..)
    }

    /// Send an IDENTIFY payload.
    ///
    /// Returns an empty buffer, rather than an error, if the connection is
    /// already closing or closed: the close takes precedence over any
    /// further payload the caller tries to send.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStateError`] if HELLO hasn't been received yet, or
    /// if the session is resumable (in which case call
    /// [`resume`](Self::resume) instead).
    pub fn identify(&mut self) -> Result<Vec<u8>, InvalidStateError> {
        if self.session.closing() || self.session.closed() {
            return Ok(Vec::new());
        }

        if !self.hello_received {
            return Err(InvalidStateError::new(InvalidStateErrorType::IdentifyBeforeHello));
        }

        if self.session.should_resume() {
            return Err(InvalidStateError::new(InvalidStateErrorType::IdentifyWhileResumable));
        }

        let identify = Identify {
            token: self.config.token().to_owned(),
            intents: self.config.intents(),
            properties: self.config.identify_properties().clone(),
            compress: None,
            large_threshold: Some(self.config.large_threshold()),
            shard: self.config.shard(),
            presence: self.config.presence().cloned(),
        };

        let payload = GatewayPayload::new(opcode::IDENTIFY, identify);
        Ok(self.encode_and_frame(&payload))
    }

    /// Send a RESUME payload.
    ///
    /// Returns an empty buffer, rather than an error, if the connection is
    /// already closing or closed: the close takes precedence over any
    /// further payload the caller tries to send.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStateError`] if the prior session isn't resumable.
    pub fn resume(&mut self) -> Result<Vec<u8>, InvalidStateError> {
        if self.session.closing() || self.session.closed() {
            return Ok(Vec::new());
        }

        if !self.session.should_resume() {
            return Err(InvalidStateError::new(InvalidStateErrorType::ResumeNotAvailable));
        }

        let resume = Resume {
            token: self.config.token().to_owned(),
            session_id: self.session.session_id().unwrap_or_default().to_owned(),
            seq: self.session.sequence().unwrap_or_default(),
        };

        let payload = GatewayPayload::new(opcode::RESUME, resume);
        Ok(self.encode_and_frame(&payload))
    }

    /// Emit a heartbeat.
    ///
    /// If the previous heartbeat was never acknowledged, this instead begins
    /// closing the connection with code 4000 ("zombied connection").
    ///
    /// Returns an empty buffer if the connection is already closing or
    /// closed, or if HELLO hasn't been received yet (no heartbeat interval
    /// is known).
    pub fn heartbeat(&mut self) -> Vec<u8> {
        if self.session.closing() || self.session.closed() || self.session.heartbeat_interval().is_none() {
            return Vec::new();
        }

        if !self.session.acknowledged() {
            return self.close(CloseFrame::from((4000, "zombied connection")));
        }

        let payload = GatewayPayload::new(opcode::HEARTBEAT, self.session.sequence());
        self.session.record_heartbeat_sent();
        self.encode_and_frame(&payload)
    }

    /// Begin closing the connection.
    pub fn close(&mut self, frame: impl Into<CloseFrame>) -> Vec<u8> {
        self.session.begin_closing();
        self.engine.send_close(frame.into())
    }

    /// Reset the connection for a fresh attempt, applying the reset
    /// discipline appropriate to the prior close's classification.
    ///
    /// Returns the number of seconds the caller should wait before
    /// reconnecting, including additive jitter in `[0, 1)`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStateError`] if the prior close was
    /// [`CloseClassification::Fatal`].
    pub fn reconnect(&mut self) -> Result<f64, InvalidStateError> {
        if !self.session.should_reconnect() {
            return Err(InvalidStateError::new(InvalidStateErrorType::ReconnectAfterFatal));
        }

        let class = self.session.last_close().unwrap_or_else(CloseClassification::from_missing_code);
        let attempts_before = self.session.reconnect_attempts();

        self.session.reset_for_reconnect(class);
        self.engine = WebSocketEngine::new();
        self.compression.reset();
        self.hello_received = false;

        Ok(backoff_seconds(attempts_before + 1))
    }

    fn process_message(&mut self, data: Vec<u8>, is_binary: bool, outbound: &mut Vec<Vec<u8>>) -> Result<(), ReceiveError> {
        let mut decompressed_storage;
        let bytes: &mut [u8] = if is_binary && self.config.transport_compression() {
            self.compression.clear();
            self.compression.extend(&data);
            match self.compression.message_mut().map_err(ReceiveError::from_compression)? {
                Some(message) => message,
                None => return Ok(()),
            }
        } else {
            decompressed_storage = data;
            decompressed_storage.as_mut_slice()
        };

        let (op, sequence) = codec::peek_opcode(bytes).map_err(ReceiveError::from_decode)?;

        match op {
            opcode::HEARTBEAT => {
                #[cfg(feature = "metrics")]
                metrics::counter!("GatewayEvent", 1, "GatewayEvent" => "Heartbeat");

                let payload = GatewayPayload::new(opcode::HEARTBEAT, self.session.sequence());
                outbound.push(self.encode_and_frame(&payload));
                self.session.record_heartbeat_sent();
            }
            opcode::HEARTBEAT_ACK => {
                #[cfg(feature = "metrics")]
                metrics::counter!("GatewayEvent", 1, "GatewayEvent" => "HeartbeatAck");

                self.session.record_heartbeat_ack();
            }
            opcode::RECONNECT => {
                #[cfg(feature = "metrics")]
                metrics::counter!("GatewayEvent", 1, "GatewayEvent" => "Reconnect");

                outbound.push(self.engine.send_close(CloseFrame::from((4000, "reconnect requested"))));
                self.session.begin_closing();
            }
            opcode::INVALID_SESSION => {
                let payload = codec::decode(bytes).map_err(ReceiveError::from_decode)?;
                let resumable = payload.d.as_bool().unwrap_or(false);
                self.session.record_invalid_session(resumable);

                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "GatewayEvent", 1,
                    "GatewayEvent" => if resumable { "InvalidateSessionTrue" } else { "InvalidateSessionFalse" }
                );

                let close = if resumable {
                    CloseFrame::from((4000, "invalid session, resumable"))
                } else {
                    CloseFrame::from((1000, "invalid session"))
                };
                outbound.push(self.engine.send_close(close));
                self.session.begin_closing();
            }
            opcode::HELLO => {
                if self.hello_received {
                    return Err(ReceiveError::unexpected_hello());
                }

                #[cfg(feature = "metrics")]
                metrics::counter!("GatewayEvent", 1, "GatewayEvent" => "Hello");

                let payload = codec::decode(bytes).map_err(ReceiveError::from_decode)?;
                let interval = payload.d["heartbeat_interval"].as_u64().unwrap_or(0);
                self.session.record_hello(interval);
                self.hello_received = true;
            }
            opcode::DISPATCH => {
                #[cfg(feature = "metrics")]
                metrics::counter!("GatewayEvent", 1, "GatewayEvent" => "Dispatch");

                let payload = codec::decode(bytes).map_err(ReceiveError::from_decode)?;
                let name = payload.t.unwrap_or_default();
                let sequence = sequence.unwrap_or(0);

                let (ready_session, ready_resume) = if name == "READY" {
                    (
                        payload.d["session_id"].as_str().map(ToOwned::to_owned),
                        payload.d["resume_gateway_url"].as_str().map(ToOwned::to_owned),
                    )
                } else {
                    (None, None)
                };

                self.session
                    .record_dispatch(sequence, &name, ready_session.as_deref(), ready_resume.as_deref());

                if self.config.event_types().contains(EventTypeFlags::from_name(&name)) {
                    self.events.push_back(Event {
                        name: name.into_boxed_str(),
                        sequence,
                        data: payload.d,
                    });
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn encode_and_frame<T: serde::Serialize>(&self, payload: &GatewayPayload<T>) -> Vec<u8> {
        let encoded = codec::encode(payload).unwrap_or_default();
        self.engine.send_message(&encoded, false)
    }
}

/// Build the `/?v=..&encoding=..[&compress=..]` path Discord expects on the
/// upgrade request.
fn configure_url(config: &ConnectionConfig) -> String {
    let mut url = format!("/?v={API_VERSION}&encoding={}", config.encoding().query_value());

    if config.transport_compression() {
        url.push_str(crate::compression::COMPRESSION_QUERY);
    }

    url
}

/// Strip a `wss://`/`ws://` scheme and any trailing path/query from a
/// resume URL, leaving a bare host.
fn normalize_host(url: &str) -> String {
    let without_scheme = url
        .strip_prefix("wss://")
        .or_else(|| url.strip_prefix("ws://"))
        .unwrap_or(url);

    without_scheme
        .split(['/', '?'])
        .next()
        .unwrap_or(without_scheme)
        .to_owned()
}

/// Exponential backoff with uniform jitter in `[0, 1)` seconds.
fn backoff_seconds(attempts: u32) -> f64 {
    let exponent = attempts.saturating_sub(1);
    let doubled = BACKOFF_BASE_SECS.saturating_mul(1_u64 << exponent.min(63));
    let base = doubled.min(BACKOFF_CAP_SECS);
    let jitter: f64 = rand::random();

    base as f64 + jitter
}
