//! Bounds-checked reads over an in-memory blob
//!
//! MDL headers and MDG streams address their contents by absolute offsets
//! recovered from other fields, so parsing is random-access rather than
//! sequential. Every accessor here validates the range first and returns
//! [`MdlError::TruncatedData`] instead of slicing past the end; the parsers
//! never touch the underlying slice directly.

use crate::error::{MdlError, Result};

/// Read-only view over a byte buffer with bounds-checked accessors
#[derive(Debug, Clone, Copy)]
pub struct Blob<'a> {
    data: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Wrap a byte slice
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Length of the underlying buffer
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow `len` bytes starting at `offset`
    pub fn bytes_at(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = offset
            .checked_add(len)
            .ok_or(MdlError::TruncatedData {
                offset,
                needed: len,
                available: self.data.len(),
            })?;
        self.data.get(offset..end).ok_or(MdlError::TruncatedData {
            offset,
            needed: len,
            available: self.data.len(),
        })
    }

    /// Read a `u8` at `offset`
    pub fn u8_at(&self, offset: usize) -> Result<u8> {
        Ok(self.bytes_at(offset, 1)?[0])
    }

    /// Read an `i8` at `offset`
    pub fn i8_at(&self, offset: usize) -> Result<i8> {
        Ok(self.u8_at(offset)? as i8)
    }

    /// Read a little-endian `u16` at `offset`
    pub fn u16_at(&self, offset: usize) -> Result<u16> {
        let b = self.bytes_at(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian `i16` at `offset`
    pub fn i16_at(&self, offset: usize) -> Result<i16> {
        let b = self.bytes_at(offset, 2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian `u32` at `offset`
    pub fn u32_at(&self, offset: usize) -> Result<u32> {
        let b = self.bytes_at(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a little-endian `i32` at `offset`
    pub fn i32_at(&self, offset: usize) -> Result<i32> {
        let b = self.bytes_at(offset, 4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a little-endian `f32` at `offset`
    pub fn f32_at(&self, offset: usize) -> Result<f32> {
        let b = self.bytes_at(offset, 4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a NUL-terminated string at `offset`, scanning at most `max` bytes
    pub fn cstr_at_max(&self, offset: usize, max: usize) -> Result<String> {
        if offset >= self.data.len() {
            return Err(MdlError::TruncatedData {
                offset,
                needed: 1,
                available: self.data.len(),
            });
        }
        let window = &self.data[offset..self.data.len().min(offset + max)];
        let end = window.iter().position(|&b| b == 0).unwrap_or(window.len());
        Ok(String::from_utf8_lossy(&window[..end]).into_owned())
    }

    /// Read a NUL-terminated string at `offset` (capped at 256 bytes, the
    /// longest name observed in any container)
    pub fn cstr_at(&self, offset: usize) -> Result<String> {
        self.cstr_at_max(offset, 0x100)
    }
}

/// Decode a packed signed byte as a unit-range float (normals)
pub fn snorm_byte(b: u8) -> f32 {
    f32::from(b as i8) / 127.0
}

/// Decode a packed unsigned byte as a 0..1 float (colours)
pub fn unorm_byte(b: u8) -> f32 {
    f32::from(b) / 255.0
}
