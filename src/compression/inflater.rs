//! Streaming zlib decompression of gateway messages.
//!
//! Buffers are reused across messages so only a few allocations happen in
//! the hot path. Unlike a typical time-based cache, this inflater has no
//! clock available: shrinking the reusable buffers back down happens
//! deterministically on [`Inflater::reset`] rather than on an elapsed-time
//! heuristic.

use flate2::{Decompress, DecompressError, FlushDecompress};
use std::mem;

/// The "magic number" deciding if a message is done or if another message
/// needs to be read.
///
/// Documented in the [Discord docs].
///
/// [Discord docs]: https://discord.com/developers/docs/topics/gateway#transport-compression-transport-compression-example
const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// Initial buffer size of 32 KiB, used for both the internal buffer and the
/// buffer containing messages to be read.
const INTERNAL_BUFFER_SIZE: usize = 32 * 1024;

/// Streaming decompressor for zlib-stream transport compression.
#[derive(Debug)]
pub struct Inflater {
    /// Zlib decompressor. Carries a persistent dictionary across messages,
    /// which is why it lives for the connection's lifetime rather than
    /// being recreated per message.
    decompress: Decompress,
    /// Buffer for storing compressed data as it arrives. Filled via
    /// [`extend`](Self::extend).
    compressed: Vec<u8>,
    /// Intermediate buffer for a single `decompress_vec` call; decompression
    /// sometimes needs multiple calls so this is copied into `buffer`
    /// afterwards.
    internal_buffer: Vec<u8>,
    /// Buffer handed to the caller once it contains a complete message.
    buffer: Vec<u8>,
}

impl Inflater {
    /// Create a new inflater with an empty persistent decompression state.
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(INTERNAL_BUFFER_SIZE),
            compressed: Vec::new(),
            decompress: Decompress::new(true),
            internal_buffer: Vec::with_capacity(INTERNAL_BUFFER_SIZE),
        }
    }

    /// Mutable reference to the buffer bytes should be copied into.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        self.buffer.as_mut_slice()
    }

    /// Extend the internal compressed buffer with bytes.
    pub fn extend(&mut self, slice: &[u8]) {
        self.compressed.extend_from_slice(slice);
    }

    /// Decompress the next message if a complete payload has been received.
    ///
    /// Returns `None` if an incomplete payload was received.
    ///
    /// # Errors
    ///
    /// Returns `flate2`'s `DecompressError` if the compressed stream is
    /// invalid.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn msg(&mut self) -> Result<Option<&mut [u8]>, DecompressError> {
        let length = self.compressed.len();

        if length < 4 || self.compressed[(length - 4)..] != ZLIB_SUFFIX {
            return Ok(None);
        }

        let before = self.decompress.total_in();
        let mut offset = 0;

        loop {
            self.internal_buffer.clear();

            self.decompress.decompress_vec(
                &self.compressed[offset..],
                &mut self.internal_buffer,
                FlushDecompress::Sync,
            )?;

            offset = (self.decompress.total_in() - before)
                .try_into()
                .unwrap_or_default();
            self.buffer.extend_from_slice(&self.internal_buffer[..]);

            let not_at_capacity = self.internal_buffer.len() < self.internal_buffer.capacity();

            if not_at_capacity || offset > self.compressed.len() {
                break;
            }
        }

        tracing::trace!(
            bytes_in = self.compressed.len(),
            bytes_out = self.buffer.len(),
            "payload lengths",
        );

        self.compressed.clear();

        #[cfg(feature = "metrics")]
        self.inflater_metrics();

        Ok(Some(&mut self.buffer))
    }

    /// Clear all buffers without shrinking their capacity.
    pub fn clear(&mut self) {
        self.compressed.clear();
        self.internal_buffer.clear();
        self.buffer.clear();
    }

    /// Reset the inflater back to its default state, shrinking all buffers
    /// back to their initial capacity.
    ///
    /// Called on every `Connection::reconnect`, which is this inflater's
    /// only trigger for releasing oversized buffers back to the allocator.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Take the buffer, replacing it with a new one.
    pub fn take(&mut self) -> Vec<u8> {
        mem::take(&mut self.buffer)
    }

    /// Log gauges for the inflater's buffer capacity and total bytes seen.
    #[cfg(feature = "metrics")]
    #[allow(clippy::cast_precision_loss)]
    fn inflater_metrics(&self) {
        metrics::gauge!("Inflater-Capacity", self.buffer.capacity() as f64);
        metrics::gauge!("Inflater-In", self.decompress.total_in() as f64);
        metrics::gauge!("Inflater-Out", self.decompress.total_out() as f64);
    }
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Inflater;
    use std::error::Error;

    const MESSAGE: &[u8] = &[
        120, 156, 52, 201, 65, 10, 131, 48, 16, 5, 208, 187, 252, 117, 82, 98, 169, 32, 115, 21,
        35, 50, 53, 67, 27, 136, 81, 226, 216, 82, 66, 238, 222, 110, 186, 123, 240, 42, 20, 148,
        207, 148, 12, 142, 63, 182, 29, 212, 57, 131, 0, 170, 120, 10, 23, 189, 11, 235, 28, 179,
        74, 121, 113, 2, 221, 186, 107, 255, 251, 89, 11, 47, 2, 26, 49, 122, 60, 88, 229, 205, 31,
        187, 151, 96, 87, 142, 217, 14, 253, 16, 60, 76, 245, 88, 227, 82, 182, 195, 131, 220, 197,
        181, 9, 83, 107, 95, 0, 0, 0, 255, 255,
    ];
    const OUTPUT: &[u8] = &[
        123, 34, 116, 34, 58, 110, 117, 108, 108, 44, 34, 115, 34, 58, 110, 117, 108, 108, 44, 34,
        111, 112, 34, 58, 49, 48, 44, 34, 100, 34, 58, 123, 34, 104, 101, 97, 114, 116, 98, 101,
        97, 116, 95, 105, 110, 116, 101, 114, 118, 97, 108, 34, 58, 52, 49, 50, 53, 48, 44, 34, 95,
        116, 114, 97, 99, 101, 34, 58, 91, 34, 91, 92, 34, 103, 97, 116, 101, 119, 97, 121, 45,
        112, 114, 100, 45, 109, 97, 105, 110, 45, 56, 53, 56, 100, 92, 34, 44, 123, 92, 34, 109,
        105, 99, 114, 111, 115, 92, 34, 58, 48, 46, 48, 125, 93, 34, 93, 125, 125,
    ];

    #[test]
    fn inflater() -> Result<(), Box<dyn Error>> {
        let mut inflater = Inflater::new();
        inflater.extend(&MESSAGE[0..MESSAGE.len() - 2]);
        assert_eq!(None, inflater.msg()?);

        inflater.reset();
        inflater.extend(MESSAGE);

        assert!(!inflater.compressed.is_empty());
        assert!(inflater.internal_buffer.is_empty());
        assert!(inflater.buffer.is_empty());
        assert_eq!(Some(OUTPUT), inflater.msg()?.as_deref());

        assert!(inflater.compressed.is_empty());
        assert!(!inflater.buffer.is_empty());
        assert!(!inflater.internal_buffer.is_empty());

        assert_eq!(OUTPUT, inflater.buffer_mut());

        inflater.clear();
        assert!(inflater.compressed.is_empty());
        assert!(inflater.internal_buffer.is_empty());
        assert!(inflater.buffer.is_empty());

        inflater.extend(b"test");
        assert!(!inflater.compressed.is_empty());
        inflater.reset();
        assert!(inflater.compressed.is_empty());

        Ok(())
    }
}
