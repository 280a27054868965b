//! Encoding and decoding of gateway payload envelopes.

#[cfg(not(feature = "simd-json"))]
use serde_json::from_slice as from_slice_inner;
#[cfg(feature = "simd-json")]
use simd_json::from_slice as from_slice_inner;

use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Wire encoding used for gateway payloads.
///
/// Fixed at [`Connection`](crate::connection::Connection) construction and
/// never changed for the lifetime of the connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Encoding {
    /// Textual JSON payloads.
    Json,
}

impl Encoding {
    /// The `encoding` query parameter value Discord expects for this
    /// encoding.
    #[must_use]
    pub const fn query_value(self) -> &'static str {
        match self {
            Self::Json => "json",
        }
    }
}

/// The envelope every gateway message is wrapped in.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GatewayPayload<T = serde_json::Value> {
    /// Gateway opcode.
    pub op: u8,
    /// Opcode-specific data.
    pub d: T,
    /// Sequence number, present only on DISPATCH.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    /// Dispatch event name, present only on DISPATCH.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl<T: Serialize> GatewayPayload<T> {
    /// Construct a new payload envelope carrying only an opcode and body.
    pub const fn new(op: u8, d: T) -> Self {
        Self { op, d, s: None, t: None }
    }
}

/// Minimal envelope view used to classify an opcode without decoding the
/// full `d` body.
#[derive(Clone, Copy, Debug, Deserialize)]
struct OpcodeEnvelope {
    op: u8,
    #[serde(default)]
    s: Option<u64>,
}

/// Decoding a gateway payload failed.
#[derive(Debug)]
pub struct PayloadDecodeError {
    pub(crate) kind: PayloadDecodeErrorType,
    pub(crate) source: Option<Box<dyn Error + Send + Sync>>,
}

impl PayloadDecodeError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &PayloadDecodeErrorType {
        &self.kind
    }

    /// Consume the error, returning the source error if there is any.
    #[must_use = "consuming the error and retrieving the source has no effect if left unused"]
    pub fn into_source(self) -> Option<Box<dyn Error + Send + Sync>> {
        self.source
    }
}

impl Display for PayloadDecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            PayloadDecodeErrorType::Deserializing => {
                f.write_str("deserializing gateway payload failed")
            }
            PayloadDecodeErrorType::PayloadInvalid => {
                f.write_str("payload is not a valid gateway envelope")
            }
        }
    }
}

impl Error for PayloadDecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

/// Type of [`PayloadDecodeError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum PayloadDecodeErrorType {
    /// The payload body failed to deserialize as JSON.
    Deserializing,
    /// The payload wasn't a JSON object, or was missing the required `op`
    /// key.
    PayloadInvalid,
}

/// Decode a full gateway payload envelope, `d` left as an untyped value.
///
/// # Errors
///
/// Returns [`PayloadDecodeErrorType::Deserializing`] if the bytes aren't
/// valid JSON, or [`PayloadDecodeErrorType::PayloadInvalid`] if the JSON
/// doesn't contain the required `op` field.
pub fn decode(bytes: &mut [u8]) -> Result<GatewayPayload, PayloadDecodeError> {
    from_slice_inner(bytes).map_err(|source| {
        tracing::debug!("invalid payload: {}", String::from_utf8_lossy(bytes));

        PayloadDecodeError {
            kind: PayloadDecodeErrorType::Deserializing,
            source: Some(Box::new(source)),
        }
    })
}

/// Classify the opcode of a payload without fully decoding `d`.
///
/// This is a fast path for opcodes (HEARTBEAT, RECONNECT, HEARTBEAT_ACK)
/// whose body carries no information the caller needs.
///
/// # Errors
///
/// Returns [`PayloadDecodeErrorType::PayloadInvalid`] if the bytes aren't a
/// JSON object containing an integer `op` field.
pub fn peek_opcode(bytes: &[u8]) -> Result<(u8, Option<u64>), PayloadDecodeError> {
    serde_json::from_slice::<OpcodeEnvelope>(bytes)
        .map(|envelope| (envelope.op, envelope.s))
        .map_err(|_| PayloadDecodeError {
            kind: PayloadDecodeErrorType::PayloadInvalid,
            source: None,
        })
}

/// Encode a gateway payload envelope into its wire bytes.
///
/// # Errors
///
/// Returns [`PayloadDecodeErrorType::Deserializing`] if `T`'s `Serialize`
/// implementation fails, which in practice only happens for types with a
/// custom, fallible implementation.
pub fn encode<T: Serialize>(payload: &GatewayPayload<T>) -> Result<Vec<u8>, PayloadDecodeError> {
    serde_json::to_vec(payload).map_err(|source| PayloadDecodeError {
        kind: PayloadDecodeErrorType::Deserializing,
        source: Some(Box::new(source)),
    })
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, peek_opcode, Encoding, GatewayPayload};
    use static_assertions::assert_impl_all;
    use std::{error::Error, fmt::Debug};

    assert_impl_all!(super::PayloadDecodeErrorType: Debug, Send, Sync);
    assert_impl_all!(super::PayloadDecodeError: Error, Send, Sync);

    #[test]
    fn encoding_query_values() {
        assert_eq!("json", Encoding::Json.query_value());
    }

    #[test]
    fn decode_hello() {
        let mut bytes = br#"{"op":10,"d":{"heartbeat_interval":41250}}"#.to_vec();
        let payload = decode(&mut bytes).unwrap();
        assert_eq!(10, payload.op);
        assert_eq!(41_250, payload.d["heartbeat_interval"].as_u64().unwrap());
    }

    #[test]
    fn decode_dispatch_with_sequence_and_name() {
        let mut bytes = br#"{"op":0,"d":{},"s":7,"t":"RESUMED"}"#.to_vec();
        let payload = decode(&mut bytes).unwrap();
        assert_eq!(Some(7), payload.s);
        assert_eq!(Some("RESUMED".to_owned()), payload.t);
    }

    #[test]
    fn peek_opcode_avoids_full_decode_on_malformed_body() {
        let bytes = br#"{"op":11,"d":null}"#;
        let (op, seq) = peek_opcode(bytes).unwrap();
        assert_eq!(11, op);
        assert_eq!(None, seq);
    }

    #[test]
    fn roundtrip_heartbeat_payload() {
        let payload = GatewayPayload::new(1_u8, Some(5_u64));
        let bytes = encode(&payload).unwrap();
        let mut bytes = bytes;
        let decoded = decode(&mut bytes).unwrap();
        assert_eq!(1, decoded.op);
        assert_eq!(5, decoded.d.as_u64().unwrap());
    }

    #[test]
    fn invalid_json_is_rejected() {
        let mut bytes = b"not json".to_vec();
        assert!(decode(&mut bytes).is_err());
    }
}
