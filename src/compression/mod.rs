//! Transport-level zlib-stream compression, abstracted over whether a
//! compression feature is compiled in.

#[cfg(any(feature = "zlib-stock", feature = "zlib-simd"))]
mod inflater;

use std::{
    error::Error,
    fmt::{Display, Formatter, Result as FmtResult},
};

#[cfg(any(feature = "zlib-stock", feature = "zlib-simd"))]
use self::inflater::Inflater;
#[cfg(not(any(feature = "zlib-stock", feature = "zlib-simd")))]
use std::mem;

/// Query argument to append to the connect URL when zlib-stream is enabled.
#[cfg(any(feature = "zlib-stock", feature = "zlib-simd"))]
pub const COMPRESSION_QUERY: &str = "&compress=zlib-stream";

/// No query argument, since compression is compiled out.
#[cfg(not(any(feature = "zlib-stock", feature = "zlib-simd")))]
pub const COMPRESSION_QUERY: &str = "";

/// Decompressing a message failed.
#[derive(Debug)]
pub struct CompressionError {
    kind: CompressionErrorType,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl CompressionError {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &CompressionErrorType {
        &self.kind
    }

    /// Consume the error, returning the source error if there is any.
    #[must_use = "consuming the error and retrieving the source has no effect if left unused"]
    pub fn into_source(self) -> Option<Box<dyn Error + Send + Sync>> {
        self.source
    }
}

impl Display for CompressionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.kind {
            CompressionErrorType::Decompressing => f.write_str("a frame could not be decompressed"),
        }
    }
}

impl Error for CompressionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn Error + 'static))
    }
}

/// Type of [`CompressionError`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum CompressionErrorType {
    /// Decompressing a frame failed.
    Decompressing,
}

/// Transport decompression state, living for the lifetime of a
/// [`Connection`](crate::connection::Connection) and discarded/recreated on
/// `reconnect()`.
#[derive(Debug)]
pub struct Compression {
    #[cfg(any(feature = "zlib-stock", feature = "zlib-simd"))]
    inner: Inflater,
    #[cfg(not(any(feature = "zlib-stock", feature = "zlib-simd")))]
    inner: Vec<u8>,
}

impl Compression {
    /// Create a new compression state, backed by a streaming inflater if a
    /// zlib feature is enabled, or a passthrough buffer otherwise.
    #[cfg_attr(
        not(any(feature = "zlib-stock", feature = "zlib-simd")),
        allow(clippy::missing_const_for_fn)
    )]
    pub fn new() -> Self {
        Self {
            #[cfg(any(feature = "zlib-stock", feature = "zlib-simd"))]
            inner: Inflater::new(),
            #[cfg(not(any(feature = "zlib-stock", feature = "zlib-simd")))]
            inner: Vec::new(),
        }
    }

    /// Mutable reference to the buffer bytes should be copied into.
    pub fn buffer_slice_mut(&mut self) -> &mut [u8] {
        #[cfg(any(feature = "zlib-stock", feature = "zlib-simd"))]
        {
            self.inner.buffer_mut()
        }

        #[cfg(not(any(feature = "zlib-stock", feature = "zlib-simd")))]
        self.inner.as_mut_slice()
    }

    /// Clear the inner buffer without releasing its capacity.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Extend the buffer with bytes from an inbound binary WebSocket
    /// message.
    pub fn extend(&mut self, bytes: &[u8]) {
        #[cfg(any(feature = "zlib-stock", feature = "zlib-simd"))]
        self.inner.extend(bytes);

        #[cfg(not(any(feature = "zlib-stock", feature = "zlib-simd")))]
        self.inner.extend_from_slice(bytes);
    }

    /// Mutable reference to the completed message, if compression is
    /// enabled and a message has finished arriving.
    ///
    /// # Errors
    ///
    /// Returns [`CompressionErrorType::Decompressing`] if the compressed
    /// stream was invalid.
    #[cfg_attr(
        not(any(feature = "zlib-stock", feature = "zlib-simd")),
        allow(clippy::unnecessary_wraps, clippy::unused_self)
    )]
    pub fn message_mut(&mut self) -> Result<Option<&mut [u8]>, CompressionError> {
        #[cfg(any(feature = "zlib-stock", feature = "zlib-simd"))]
        {
            self.inner.msg().map_err(|source| CompressionError {
                kind: CompressionErrorType::Decompressing,
                source: Some(Box::new(source)),
            })
        }

        #[cfg(not(any(feature = "zlib-stock", feature = "zlib-simd")))]
        Ok(None)
    }

    /// Reset the compression state for a new gateway session, releasing any
    /// oversized buffers back to the allocator.
    pub fn reset(&mut self) {
        #[cfg(any(feature = "zlib-stock", feature = "zlib-simd"))]
        self.inner.reset();

        #[cfg(not(any(feature = "zlib-stock", feature = "zlib-simd")))]
        self.clear();
    }

    /// Take the buffer, replacing it with a new one.
    pub fn take(&mut self) -> Vec<u8> {
        #[cfg(any(feature = "zlib-stock", feature = "zlib-simd"))]
        {
            self.inner.take()
        }

        #[cfg(not(any(feature = "zlib-stock", feature = "zlib-simd")))]
        {
            mem::take(&mut self.inner)
        }
    }
}

impl Default for Compression {
    fn default() -> Self {
        Self::new()
    }
}
