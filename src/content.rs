//! File content: a growable byte buffer with offset-checked access.
//!
//! Reads and writes are validated against the current size; a write whose
//! range extends past the end grows the buffer, a write starting past the
//! end fails with `OutOfRange`. Typed helpers store fixed-width integers
//! little-endian.

use crate::error::{Result, VfsError};

/// Fixed-width integers storable through [`Content::write_value`] and
/// [`Content::read_value`]. Encoded little-endian.
pub trait Scalar: Sized + sealed::Sealed {
    const WIDTH: usize;

    fn put_le(self, out: &mut [u8]);
    fn get_le(bytes: &[u8]) -> Self;
}

mod sealed {
    pub trait Sealed {}
}

macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Scalar for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn put_le(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }

                fn get_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_scalar!(u8, u16, u32, u64, i8, i16, i32, i64);

/// Mutable byte buffer backing a file.
#[derive(Debug, Default, Clone)]
pub struct Content {
    data: Vec<u8>,
}

impl Content {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Content { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Read up to `n` bytes starting at `off`. Reading at the very end
    /// yields an empty vector; starting past it is an error.
    pub fn read(&self, off: usize, n: usize) -> Result<Vec<u8>> {
        if off > self.data.len() {
            return Err(VfsError::OutOfRange {
                offset: off,
                len: self.data.len(),
            });
        }
        let take = n.min(self.data.len() - off);
        Ok(self.data[off..off + take].to_vec())
    }

    /// Overwrite `[off, off + buf.len())`, growing the buffer when the
    /// range extends past the current end.
    pub fn write(&mut self, off: usize, buf: &[u8]) -> Result<()> {
        if off > self.data.len() {
            return Err(VfsError::OutOfRange {
                offset: off,
                len: self.data.len(),
            });
        }
        let end = off + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[off..end].copy_from_slice(buf);
        Ok(())
    }

    pub fn append(&mut self, buf: &[u8]) {
        self.data.extend_from_slice(buf);
    }

    /// Resize to `new_len`, zero-filling when growing.
    pub fn truncate(&mut self, new_len: usize) {
        self.data.resize(new_len, 0);
    }

    pub fn replace_all(&mut self, bytes: Vec<u8>) {
        self.data = bytes;
    }

    pub fn assign_text(&mut self, text: &str) {
        self.data = text.as_bytes().to_vec();
    }

    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Character count of the textual decoding.
    pub fn char_count(&self) -> usize {
        String::from_utf8_lossy(&self.data).chars().count()
    }

    pub fn write_value<T: Scalar>(&mut self, off: usize, value: T) -> Result<()> {
        let mut raw = vec![0u8; T::WIDTH];
        value.put_le(&mut raw);
        self.write(off, &raw)
    }

    pub fn read_value<T: Scalar>(&self, off: usize) -> Result<T> {
        let raw = self.read(off, T::WIDTH)?;
        if raw.len() != T::WIDTH {
            return Err(VfsError::OutOfRange {
                offset: off,
                len: self.data.len(),
            });
        }
        Ok(T::get_le(&raw))
    }
}
