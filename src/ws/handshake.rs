//! The WebSocket opening handshake: upgrade request construction and
//! response parsing.
//!
//! Grounded on the same primitives the wider ecosystem reaches for: an
//! `httparse`-based response parser (as used for HTTP parsing elsewhere in
//! this dependency family) and the `sha1`+`base64` `Sec-WebSocket-Accept`
//! signing scheme used by `axum`'s own websocket upgrade implementation.

use base64::Engine as _;
use rand::RngCore;
use sha1::{Digest, Sha1};
use std::fmt::Write as _;

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Generate a fresh client nonce and base64-encode it for the
/// `Sec-WebSocket-Key` header.
pub fn generate_key() -> String {
    let mut nonce = [0_u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    base64::engine::general_purpose::STANDARD.encode(nonce)
}

/// Compute the expected `Sec-WebSocket-Accept` value for a given client key.
#[must_use]
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Build the bytes of the client's HTTP upgrade request.
#[must_use]
pub fn build_request(host: &str, path_and_query: &str, client_key: &str) -> Vec<u8> {
    let mut request = String::new();
    let _ = write!(
        request,
        "GET {path_and_query} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {client_key}\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n"
    );
    request.into_bytes()
}

/// Outcome of parsing a (possibly still incomplete) HTTP response.
#[derive(Debug)]
pub enum HandshakeResponse {
    /// Not enough bytes have arrived yet to parse a complete response.
    Incomplete,
    /// The server accepted the upgrade. `consumed` is the number of bytes of
    /// the response header; any trailing bytes belong to the WebSocket
    /// stream proper.
    Accepted { consumed: usize },
    /// The server rejected the upgrade.
    Rejected {
        status: u16,
        body: Vec<u8>,
        consumed: usize,
    },
}

/// Error produced while parsing the handshake response.
#[derive(Debug)]
pub enum HandshakeError {
    /// The response was not valid HTTP.
    MalformedResponse,
    /// The response claimed success but the `Sec-WebSocket-Accept` header
    /// didn't match the expected value for our nonce.
    AcceptMismatch,
}

/// Parse a server handshake response, validating `Sec-WebSocket-Accept`
/// against the nonce used to build the request.
///
/// # Errors
///
/// Returns [`HandshakeError`] if the bytes are not valid HTTP, or if a
/// purportedly successful (101) response carries an incorrect accept key.
pub fn parse_response(bytes: &[u8], client_key: &str) -> Result<HandshakeResponse, HandshakeError> {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut response = httparse::Response::new(&mut headers);

    let status = match response
        .parse(bytes)
        .map_err(|_| HandshakeError::MalformedResponse)?
    {
        httparse::Status::Partial => return Ok(HandshakeResponse::Incomplete),
        httparse::Status::Complete(consumed) => {
            let code = response.code.ok_or(HandshakeError::MalformedResponse)?;

            if code == 101 {
                let accept = response
                    .headers
                    .iter()
                    .find(|header| header.name.eq_ignore_ascii_case("sec-websocket-accept"))
                    .map(|header| String::from_utf8_lossy(header.value).into_owned())
                    .ok_or(HandshakeError::MalformedResponse)?;

                if accept != accept_key(client_key) {
                    return Err(HandshakeError::AcceptMismatch);
                }

                return Ok(HandshakeResponse::Accepted { consumed });
            }

            (code, consumed)
        }
    };

    let (code, consumed) = status;
    let body = bytes.get(consumed..).unwrap_or_default().to_vec();

    Ok(HandshakeResponse::Rejected {
        status: code,
        body,
        consumed,
    })
}
