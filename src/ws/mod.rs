//! A sans-I/O WebSocket protocol engine: handshake, frame
//! fragmentation/defragmentation, ping/pong, and the close handshake.

pub mod frame;
pub mod handshake;

use self::frame::{FrameDecoder, FrameError, Opcode};
use self::handshake::{build_request, generate_key, parse_response, HandshakeError, HandshakeResponse};

/// Lifecycle state of the WebSocket connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum WsState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// A close frame: a code and a human-readable reason.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct CloseFrame {
    /// WebSocket close code.
    pub code: u16,
    /// Human-readable close reason.
    pub reason: String,
}

impl CloseFrame {
    /// Normal close; the peer should not expect a resume.
    pub const NORMAL: CloseFrameConst = CloseFrameConst { code: 1000, reason: "closing connection" };

    /// Close indicating the client intends to resume this session shortly.
    pub const RESUME: CloseFrameConst = CloseFrameConst { code: 4000, reason: "resuming connection" };
}

/// A `const`-constructible close frame template, convertible into an owned
/// [`CloseFrame`].
#[derive(Clone, Copy, Debug)]
pub struct CloseFrameConst {
    /// WebSocket close code.
    pub code: u16,
    /// Human-readable close reason.
    pub reason: &'static str,
}

impl From<CloseFrameConst> for CloseFrame {
    fn from(value: CloseFrameConst) -> Self {
        Self {
            code: value.code,
            reason: value.reason.to_owned(),
        }
    }
}

impl From<(u16, &str)> for CloseFrame {
    fn from((code, reason): (u16, &str)) -> Self {
        Self { code, reason: reason.to_owned() }
    }
}

/// An event surfaced by feeding bytes into the engine.
#[derive(Debug)]
#[non_exhaustive]
pub enum WsEvent {
    /// The server accepted the WebSocket upgrade.
    AcceptedUpgrade,
    /// The server rejected the WebSocket upgrade.
    RejectedUpgrade { status: u16, body: Vec<u8> },
    /// A complete application message was reassembled.
    Message { data: Vec<u8>, is_binary: bool },
    /// The peer sent a close frame.
    CloseReceived { code: Option<u16>, reason: String },
    /// The underlying transport reached end-of-stream.
    ConnectionClosed,
}

/// Errors produced while feeding bytes into the engine.
#[derive(Debug)]
pub enum WsError {
    /// The handshake response was malformed or failed to validate.
    Handshake(HandshakeError),
    /// A frame header was malformed.
    Frame(FrameError),
}

/// Sans-I/O WebSocket engine.
#[derive(Debug)]
pub struct WebSocketEngine {
    state: WsState,
    client_key: Option<String>,
    decoder: FrameDecoder,
    fragment_opcode: Option<Opcode>,
    fragment_buffer: Vec<u8>,
}

impl WebSocketEngine {
    /// Construct a new engine in the `Connecting` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: WsState::Connecting,
            client_key: None,
            decoder: FrameDecoder::new(),
            fragment_opcode: None,
            fragment_buffer: Vec::new(),
        }
    }

    /// Whether the engine is ready to accept application messages.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.state, WsState::Open)
    }

    /// Whether the close handshake has finished.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self.state, WsState::Closed)
    }

    /// Produce the bytes of the HTTP upgrade request.
    ///
    /// Idempotent while the engine remains `Connecting`: calling this again
    /// before any bytes have been fed reuses the same client nonce, so a
    /// caller that retries the call (without having sent anything yet) gets
    /// back byte-identical bytes rather than a request the eventual response
    /// can't be validated against.
    pub fn initiate(&mut self, host: &str, path_and_query: &str) -> Vec<u8> {
        let key = self.client_key.clone().unwrap_or_else(generate_key);
        let request = build_request(host, path_and_query, &key);
        self.client_key = Some(key);
        request
    }

    /// Feed inbound transport bytes into the engine.
    ///
    /// `outbound` receives any bytes the engine itself must send in direct
    /// response (an auto-answered pong, or an echoed close frame); the
    /// caller is responsible for transmitting those in order.
    ///
    /// # Errors
    ///
    /// Returns [`WsError`] if the handshake response or a frame header is
    /// malformed.
    pub fn feed(&mut self, bytes: &[u8], outbound: &mut Vec<Vec<u8>>) -> Result<Vec<WsEvent>, WsError> {
        let mut events = Vec::new();

        if bytes.is_empty() {
            if self.state != WsState::Closed {
                self.state = WsState::Closed;
                events.push(WsEvent::ConnectionClosed);
            }
            return Ok(events);
        }

        let mut remainder = bytes;

        if self.state == WsState::Connecting {
            let client_key = self.client_key.clone().unwrap_or_default();
            match parse_response(remainder, &client_key).map_err(WsError::Handshake)? {
                HandshakeResponse::Incomplete => return Ok(events),
                HandshakeResponse::Accepted { consumed } => {
                    self.state = WsState::Open;
                    events.push(WsEvent::AcceptedUpgrade);
                    remainder = &remainder[consumed..];
                }
                HandshakeResponse::Rejected { status, body, .. } => {
                    self.state = WsState::Closed;
                    events.push(WsEvent::RejectedUpgrade { status, body });
                    return Ok(events);
                }
            }
        }

        if matches!(self.state, WsState::Closed) {
            return Ok(events);
        }

        self.decoder.feed(remainder);

        loop {
            let frame = match self.decoder.next_frame().map_err(WsError::Frame)? {
                Some(frame) => frame,
                None => break,
            };

            match frame.opcode {
                Opcode::Ping => {
                    outbound.push(frame::encode_client_frame(Opcode::Pong, &frame.payload));
                }
                Opcode::Pong => {}
                Opcode::Close => {
                    let (code, reason) = parse_close_payload(&frame.payload);

                    if self.state == WsState::Open {
                        outbound.push(frame::encode_client_frame(Opcode::Close, &frame.payload));
                    }

                    self.state = WsState::Closed;
                    events.push(WsEvent::CloseReceived { code, reason });
                }
                Opcode::Text | Opcode::Binary => {
                    if frame.fin {
                        events.push(WsEvent::Message {
                            is_binary: frame.opcode == Opcode::Binary,
                            data: frame.payload,
                        });
                    } else {
                        self.fragment_opcode = Some(frame.opcode);
                        self.fragment_buffer = frame.payload;
                    }
                }
                Opcode::Continuation => {
                    self.fragment_buffer.extend_from_slice(&frame.payload);

                    if frame.fin {
                        if let Some(opcode) = self.fragment_opcode.take() {
                            events.push(WsEvent::Message {
                                is_binary: opcode == Opcode::Binary,
                                data: std::mem::take(&mut self.fragment_buffer),
                            });
                        }
                    }
                }
            }
        }

        Ok(events)
    }

    /// Encode an outbound application message as a single data frame.
    #[must_use]
    pub fn send_message(&self, data: &[u8], is_binary: bool) -> Vec<u8> {
        let opcode = if is_binary { Opcode::Binary } else { Opcode::Text };
        frame::encode_client_frame(opcode, data)
    }

    /// Encode and begin the close handshake.
    pub fn send_close(&mut self, close: CloseFrame) -> Vec<u8> {
        self.state = WsState::Closing;

        let mut payload = close.code.to_be_bytes().to_vec();
        payload.extend_from_slice(close.reason.as_bytes());
        frame::encode_client_frame(Opcode::Close, &payload)
    }
}

impl Default for WebSocketEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_close_payload(payload: &[u8]) -> (Option<u16>, String) {
    if payload.len() < 2 {
        return (None, String::new());
    }

    let code = u16::from_be_bytes([payload[0], payload[1]]);
    let reason = String::from_utf8_lossy(&payload[2..]).into_owned();
    (Some(code), reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::handshake::accept_key;

    #[test]
    fn full_handshake_then_message_roundtrip() {
        let mut engine = WebSocketEngine::new();
        let request = engine.initiate("gateway.discord.gg", "/?v=10&encoding=json");
        assert!(String::from_utf8(request).unwrap().contains("Sec-WebSocket-Key"));

        let client_key = engine.client_key.clone().unwrap();
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
            accept_key(&client_key)
        );

        let mut outbound = Vec::new();
        let events = engine.feed(response.as_bytes(), &mut outbound).unwrap();
        assert!(matches!(events[0], WsEvent::AcceptedUpgrade));
        assert!(engine.is_open());

        let server_frame = frame::encode_client_frame(Opcode::Text, br#"{"op":10}"#);
        let events = engine.feed(&server_frame, &mut outbound).unwrap();
        match &events[0] {
            WsEvent::Message { data, is_binary } => {
                assert!(!is_binary);
                assert_eq!(br#"{"op":10}"#, data.as_slice());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn ping_is_auto_answered_with_pong() {
        let mut engine = WebSocketEngine::new();
        engine.state = WsState::Open;

        let ping = frame::encode_client_frame(Opcode::Ping, b"keepalive");
        let mut outbound = Vec::new();
        let events = engine.feed(&ping, &mut outbound).unwrap();

        assert!(events.is_empty());
        assert_eq!(1, outbound.len());
    }

    #[test]
    fn local_close_then_peer_echo_completes_handshake() {
        let mut engine = WebSocketEngine::new();
        engine.state = WsState::Open;

        let _ = engine.send_close(CloseFrame::from(CloseFrame::NORMAL));
        assert!(!engine.is_closed());

        let mut payload = 1000_u16.to_be_bytes().to_vec();
        payload.extend_from_slice(b"bye");
        let echoed_close = frame::encode_client_frame(Opcode::Close, &payload);

        let mut outbound = Vec::new();
        let events = engine.feed(&echoed_close, &mut outbound).unwrap();
        assert!(engine.is_closed());
        assert!(matches!(events[0], WsEvent::CloseReceived { code: Some(1000), .. }));
    }

    #[test]
    fn empty_feed_signals_connection_closed() {
        let mut engine = WebSocketEngine::new();
        engine.state = WsState::Open;

        let mut outbound = Vec::new();
        let events = engine.feed(&[], &mut outbound).unwrap();
        assert!(matches!(events[0], WsEvent::ConnectionClosed));
        assert!(engine.is_closed());
    }
}
