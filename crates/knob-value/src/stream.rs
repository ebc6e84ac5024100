//! Binary wire stream
//!
//! Little-endian encoding on top of [`bytes`]:
//! - integers and floats in their fixed width
//! - booleans as one byte
//! - strings as a `u32` byte length followed by UTF-8
//! - data types by their registered name

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::data_type::DataType;
use crate::error::StreamError;
use crate::registry::TypeRegistry;

/// Append-only binary writer
#[derive(Debug, Default, Clone)]
pub struct OutputStream {
    buf: BytesMut,
}

impl OutputStream {
    /// Create empty stream
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a boolean as a single byte
    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    /// Write a `u32`
    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    /// Write an `i32`
    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32_le(value);
    }

    /// Write an `i64`
    pub fn write_i64(&mut self, value: i64) {
        self.buf.put_i64_le(value);
    }

    /// Write an `f32`
    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_f32_le(value);
    }

    /// Write an `f64`
    pub fn write_f64(&mut self, value: f64) {
        self.buf.put_f64_le(value);
    }

    /// Write a length-prefixed UTF-8 string
    ///
    /// Payloads beyond `u32::MAX` bytes are cut at that length.
    pub fn write_string(&mut self, value: &str) {
        let len = u32::try_from(value.len()).unwrap_or(u32::MAX);
        self.buf.put_u32_le(len);
        self.buf.put_slice(&value.as_bytes()[..len as usize]);
    }

    /// Write a type identity
    pub fn write_type(&mut self, data_type: DataType) {
        self.write_string(data_type.name());
    }

    /// Number of bytes written so far
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing was written
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish writing and hand out the bytes
    #[must_use]
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Cursor over a received buffer
#[derive(Debug, Clone)]
pub struct InputStream {
    buf: Bytes,
}

impl InputStream {
    /// Wrap received bytes
    #[inline]
    #[must_use]
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Bytes left to read
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, needed: usize) -> Result<(), StreamError> {
        let remaining = self.buf.remaining();
        if remaining < needed {
            return Err(StreamError::UnexpectedEnd { needed, remaining });
        }
        Ok(())
    }

    /// Read a one-byte boolean
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::UnexpectedEnd`] when the buffer is exhausted.
    pub fn read_bool(&mut self) -> Result<bool, StreamError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8() != 0)
    }

    /// Read a `u32`
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::UnexpectedEnd`] when the buffer is exhausted.
    pub fn read_u32(&mut self) -> Result<u32, StreamError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    /// Read an `i32`
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::UnexpectedEnd`] when the buffer is exhausted.
    pub fn read_i32(&mut self) -> Result<i32, StreamError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32_le())
    }

    /// Read an `i64`
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::UnexpectedEnd`] when the buffer is exhausted.
    pub fn read_i64(&mut self) -> Result<i64, StreamError> {
        self.ensure(8)?;
        Ok(self.buf.get_i64_le())
    }

    /// Read an `f32`
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::UnexpectedEnd`] when the buffer is exhausted.
    pub fn read_f32(&mut self) -> Result<f32, StreamError> {
        self.ensure(4)?;
        Ok(self.buf.get_f32_le())
    }

    /// Read an `f64`
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::UnexpectedEnd`] when the buffer is exhausted.
    pub fn read_f64(&mut self) -> Result<f64, StreamError> {
        self.ensure(8)?;
        Ok(self.buf.get_f64_le())
    }

    /// Read a length-prefixed UTF-8 string
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::UnexpectedEnd`] for truncated input and
    /// [`StreamError::InvalidUtf8`] for a malformed payload.
    pub fn read_string(&mut self) -> Result<String, StreamError> {
        let len = self.read_u32()? as usize;
        self.ensure(len)?;
        let raw = self.buf.split_to(len);
        String::from_utf8(raw.to_vec()).map_err(|_| StreamError::InvalidUtf8)
    }

    /// Read a type identity and resolve it against `registry`
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::UnknownType`] when the name is not registered.
    pub fn read_type(&mut self, registry: &TypeRegistry) -> Result<DataType, StreamError> {
        let name = self.read_string()?;
        registry.find(&name).ok_or(StreamError::UnknownType(name))
    }
}

impl From<OutputStream> for InputStream {
    fn from(out: OutputStream) -> Self {
        Self::new(out.freeze())
    }
}
