//! Seekable byte source and payload field readers.

use std::io::{self, Read, Seek, SeekFrom};

use anyhow::{Result, bail};

use crate::utils::errors::{CodecError, RecordError};

/// Random-access view over a `Read + Seek` stream.
///
/// The total length is measured once at construction. All reads take an
/// absolute offset, so readers never depend on where a previous caller left
/// the underlying stream.
#[derive(Debug)]
pub struct Source<R> {
    inner: R,
    len: u64,
}

impl<R: Read + Seek> Source<R> {
    pub fn new(mut inner: R) -> io::Result<Self> {
        let start = inner.stream_position()?;
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(start))?;

        Ok(Self { inner, len })
    }

    #[inline(always)]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes between `offset` and the end of the stream.
    #[inline(always)]
    pub fn remaining_from(&self, offset: u64) -> u64 {
        self.len.saturating_sub(offset)
    }

    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let available = self.remaining_from(offset);
        if buf.len() as u64 > available {
            bail!(RecordError::Truncated {
                offset,
                declared: buf.len() as u64,
                available,
            });
        }

        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.read_exact(buf)?;

        Ok(())
    }

    pub fn read_array<const N: usize>(&mut self, offset: u64) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    pub fn read_vec(&mut self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let available = self.remaining_from(offset);
        if len > available {
            bail!(RecordError::Truncated {
                offset,
                declared: len,
                available,
            });
        }

        let mut buf = vec![0u8; usize::try_from(len)?];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Reads at most `max` bytes, fewer near the end of the stream.
    pub fn read_up_to(&mut self, offset: u64, max: usize) -> Result<Vec<u8>> {
        let len = self.remaining_from(offset).min(max as u64);
        self.read_vec(offset, len)
    }

    /// Runs `f` and puts the underlying stream back where it was, whether `f`
    /// succeeds or not.
    pub fn with_position<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = self.inner.stream_position()?;
        let result = f(self);
        self.inner.seek(SeekFrom::Start(saved))?;
        result
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Little- or big-endian field reader over a payload slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    big_endian: bool,
}

macro_rules! read_int {
    ($($name:ident: $t:ty),+) => { $(
        #[inline(always)]
        pub fn $name(&mut self) -> Result<$t, CodecError> {
            let raw = self.array::<{ size_of::<$t>() }>()?;
            Ok(if self.big_endian { <$t>::from_be_bytes(raw) } else { <$t>::from_le_bytes(raw) })
        }
    )+ }
}

impl<'a> ByteReader<'a> {
    pub fn le(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            big_endian: false,
        }
    }

    pub fn be(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            big_endian: true,
        }
    }

    #[inline(always)]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::Truncated {
                needed: self.pos + n,
                available: self.bytes.len(),
            });
        }

        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), CodecError> {
        self.bytes(n).map(|_| ())
    }

    /// Everything not yet consumed.
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        out
    }

    read_int!(u8: u8, u16: u16, u32: u32, u64: u64, i16: i16, i32: i32, i64: i64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn source_reads_are_bounded() {
        let mut source = Source::new(Cursor::new((0u8..16).collect::<Vec<_>>())).unwrap();
        assert_eq!(source.len(), 16);
        assert_eq!(source.read_array::<2>(14).unwrap(), [14, 15]);
        assert_eq!(source.read_up_to(12, 64).unwrap(), vec![12, 13, 14, 15]);

        let err = source.read_vec(10, 8).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RecordError>(),
            Some(RecordError::Truncated {
                offset: 10,
                declared: 8,
                available: 6
            })
        ));
    }

    #[test]
    fn with_position_restores_on_error() {
        let mut cursor = Cursor::new(vec![0u8; 32]);
        cursor.set_position(5);
        let mut source = Source::new(cursor).unwrap();

        let result: Result<()> = source.with_position(|s| {
            s.read_array::<4>(20)?;
            s.read_array::<4>(30)?;
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(source.get_ref().position(), 5);
    }

    #[test]
    fn byte_reader_endianness() {
        let data = [0x01, 0x02, 0x03, 0x04, 0xFF];
        assert_eq!(ByteReader::le(&data).u32().unwrap(), 0x0403_0201);
        assert_eq!(ByteReader::be(&data).u32().unwrap(), 0x0102_0304);

        let mut reader = ByteReader::be(&data);
        reader.skip(4).unwrap();
        assert_eq!(reader.u8().unwrap(), 0xFF);
        assert_eq!(
            reader.u16(),
            Err(CodecError::Truncated {
                needed: 7,
                available: 5
            })
        );
    }
}
