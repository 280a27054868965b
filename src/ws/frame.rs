//! RFC 6455 frame encoding and decoding.
//!
//! Hand-rolled against RFC 6455 directly, since no WebSocket crate in this
//! dependency family exposes framing as a pure, sans-I/O byte-buffer
//! function without also owning the transport.

use rand::RngCore;

/// WebSocket frame opcode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Opcode {
    /// Continuation of a fragmented message.
    Continuation,
    /// A complete or initial-fragment text message.
    Text,
    /// A complete or initial-fragment binary message.
    Binary,
    /// Connection close.
    Close,
    /// Ping control frame.
    Ping,
    /// Pong control frame.
    Pong,
}

impl Opcode {
    const fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

/// A single decoded frame.
#[derive(Debug)]
pub struct Frame {
    /// Whether this frame is the final fragment of a message.
    pub fin: bool,
    /// The frame's opcode.
    pub opcode: Opcode,
    /// The frame's (already unmasked) payload.
    pub payload: Vec<u8>,
}

/// Encode a single, unfragmented, masked client frame.
///
/// Clients MUST mask every frame they send (RFC 6455 section 5.1).
#[must_use]
pub fn encode_client_frame(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 14);

    frame.push(0x80 | opcode.as_u8());

    let mask_bit = 0x80;
    let len = payload.len();

    if len < 126 {
        frame.push(mask_bit | len as u8);
    } else if len <= u16::from(u16::MAX) as usize {
        frame.push(mask_bit | 126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(mask_bit | 127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }

    let mut mask_key = [0_u8; 4];
    rand::thread_rng().fill_bytes(&mut mask_key);
    frame.extend_from_slice(&mask_key);

    frame.extend(
        payload
            .iter()
            .enumerate()
            .map(|(i, byte)| byte ^ mask_key[i % 4]),
    );

    frame
}

/// Errors produced while decoding an inbound frame.
#[derive(Debug)]
pub enum FrameError {
    /// A reserved bit was set, or an unrecognized opcode was used.
    InvalidHeader,
    /// A control frame exceeded the 125-byte payload limit, or was
    /// fragmented (RFC 6455 section 5.5 forbids both).
    InvalidControlFrame,
}

/// Incrementally decode frames out of a byte stream.
///
/// Bytes are fed in via [`feed`](Self::feed); any complete frames are
/// drained from the internal queue with [`next_frame`](Self::next_frame).
/// Partial frames remain buffered until enough bytes arrive.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer additional bytes read from the transport.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Attempt to decode and remove the next complete frame from the
    /// buffer.
    ///
    /// Returns `Ok(None)` if the buffer doesn't yet contain a complete
    /// frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError`] if the buffered bytes are not a valid frame
    /// header.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        if self.buffer.len() < 2 {
            return Ok(None);
        }

        let first = self.buffer[0];
        let second = self.buffer[1];

        let fin = first & 0x80 != 0;
        let reserved = first & 0x70;
        let opcode = Opcode::from_u8(first & 0x0F).ok_or(FrameError::InvalidHeader)?;

        if reserved != 0 {
            return Err(FrameError::InvalidHeader);
        }

        let masked = second & 0x80 != 0;
        let len_field = second & 0x7F;

        let mut offset = 2_usize;
        let payload_len: u64 = match len_field {
            126 => {
                if self.buffer.len() < offset + 2 {
                    return Ok(None);
                }
                let value = u16::from_be_bytes([self.buffer[offset], self.buffer[offset + 1]]);
                offset += 2;
                u64::from(value)
            }
            127 => {
                if self.buffer.len() < offset + 8 {
                    return Ok(None);
                }
                let mut bytes = [0_u8; 8];
                bytes.copy_from_slice(&self.buffer[offset..offset + 8]);
                offset += 8;
                u64::from_be_bytes(bytes)
            }
            small => u64::from(small),
        };

        if opcode.is_control() && (payload_len > 125 || !fin) {
            return Err(FrameError::InvalidControlFrame);
        }

        let mask_key = if masked {
            if self.buffer.len() < offset + 4 {
                return Ok(None);
            }
            let key = [
                self.buffer[offset],
                self.buffer[offset + 1],
                self.buffer[offset + 2],
                self.buffer[offset + 3],
            ];
            offset += 4;
            Some(key)
        } else {
            None
        };

        let payload_len = payload_len as usize;
        let frame_len = offset + payload_len;

        if self.buffer.len() < frame_len {
            return Ok(None);
        }

        let mut payload = self.buffer[offset..frame_len].to_vec();

        if let Some(mask_key) = mask_key {
            for (i, byte) in payload.iter_mut().enumerate() {
                *byte ^= mask_key[i % 4];
            }
        }

        self.buffer.drain(..frame_len);

        Ok(Some(Frame { fin, opcode, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::{encode_client_frame, FrameDecoder, Opcode};

    #[test]
    fn encoded_frame_is_masked_and_roundtrips_through_unmasking() {
        let payload = b"hello";
        let frame = encode_client_frame(Opcode::Binary, payload);

        assert_eq!(0x82, frame[0]);
        assert_eq!(0x80 | payload.len() as u8, frame[1]);

        let mask = [frame[2], frame[3], frame[4], frame[5]];
        let unmasked: Vec<u8> = frame[6..]
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ mask[i % 4])
            .collect();
        assert_eq!(payload, unmasked.as_slice());
    }

    #[test]
    fn decoder_handles_split_feeds() {
        let frame = encode_client_frame(Opcode::Text, b"split me");
        let mut decoder = FrameDecoder::new();

        decoder.feed(&frame[..3]);
        assert!(decoder.next_frame().unwrap().is_none());

        decoder.feed(&frame[3..]);
        let decoded = decoder.next_frame().unwrap().unwrap();
        assert_eq!(Opcode::Text, decoded.opcode);
        assert_eq!(b"split me", decoded.payload.as_slice());
    }

    #[test]
    fn decoder_rejects_fragmented_control_frame() {
        let mut frame = encode_client_frame(Opcode::Ping, b"hi");
        frame[0] &= !0x80; // clear FIN

        let mut decoder = FrameDecoder::new();
        decoder.feed(&frame);
        assert!(decoder.next_frame().is_err());
    }

    #[test]
    fn large_payload_uses_extended_length() {
        let payload = vec![1_u8; 70_000];
        let frame = encode_client_frame(Opcode::Binary, &payload);

        let mut decoder = FrameDecoder::new();
        decoder.feed(&frame);
        let decoded = decoder.next_frame().unwrap().unwrap();
        assert_eq!(payload, decoded.payload);
    }
}
