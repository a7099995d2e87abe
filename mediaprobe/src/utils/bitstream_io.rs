//! Big-endian bitstream I/O on top of `bitstream-io`.
//!
//! Used for fixed-layout, non-byte-aligned records such as FLAC StreamInfo.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter, UnsignedInteger};

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read + io::Seek> {
    bs: BitReader<R, BigEndian>,
    len: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<R> BitstreamIoReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        // bitstream_io reports EOF itself for small reads
        if n <= 32 {
            match self.bs.read_unsigned_var(n) {
                Ok(val) => Ok(val),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    Err(self.out_of_bounds("get_n", n as u64))
                }
                Err(e) => Err(e),
            }
        } else {
            if n as u64 > self.available()? {
                return Err(self.out_of_bounds("get_n", n as u64));
            }
            self.bs.read_unsigned_var(n)
        }
    }

    #[inline(always)]
    pub fn get_bytes(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if (buf.len() as u64) << 3 > self.available()? {
            return Err(self.out_of_bounds("get_bytes", (buf.len() as u64) << 3));
        }
        self.bs.read_bytes(buf)
    }

    #[inline(always)]
    pub fn available(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits().map(|pos| self.len - pos)
    }

    fn out_of_bounds(&mut self, op: &str, bits: u64) -> io::Error {
        io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "{op}({bits}): out of bounds bits at {}",
                self.bs.position_in_bits().unwrap_or(0)
            ),
        )
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        let len = buf.len() as u64;
        let read = io::Cursor::new(buf);

        Self::new(read, len)
    }
}

/// Big-endian bit writer collecting into a byte vector.
pub struct BitstreamIoWriter {
    bs: BitWriter<Vec<u8>, BigEndian>,
    bits: u64,
}

impl BitstreamIoWriter {
    pub fn new() -> Self {
        Self {
            bs: BitWriter::new(Vec::new()),
            bits: 0,
        }
    }

    #[inline(always)]
    pub fn put_n<U: UnsignedInteger>(&mut self, n: u32, value: U) -> io::Result<()> {
        self.bits += n as u64;
        self.bs.write_unsigned_var(n, value)
    }

    #[inline(always)]
    pub fn put_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.bits += (bytes.len() as u64) << 3;
        self.bs.write_bytes(bytes)
    }

    /// Finishes the stream. Fails unless it ends on a byte boundary.
    pub fn into_bytes(self) -> io::Result<Vec<u8>> {
        if self.bits & 7 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("into_bytes: {} bits is not byte aligned", self.bits),
            ));
        }

        Ok(self.bs.into_writer())
    }
}

impl Default for BitstreamIoWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_fields_roundtrip() -> io::Result<()> {
        let mut writer = BitstreamIoWriter::new();
        writer.put_n(20, 44_100u32)?;
        writer.put_n(4, 0b0011u8)?;
        writer.put_n(36, 0xF_1234_5678u64)?;
        writer.put_bytes(&[0xAB, 0xCD])?;
        assert!(BitstreamIoWriter::new().into_bytes()?.is_empty());

        writer.put_n(4, 0u8)?;
        let bytes = writer.into_bytes()?;
        assert_eq!(bytes.len(), 10);

        let mut reader = BsIoSliceReader::from_slice(&bytes);
        assert_eq!(reader.get_n::<u32>(20)?, 44_100);
        assert_eq!(reader.get_n::<u8>(3)?, 1);
        assert_eq!(reader.get_n::<u8>(1)?, 1);
        assert_eq!(reader.get_n::<u64>(36)?, 0xF_1234_5678);
        let mut two = [0u8; 2];
        reader.get_bytes(&mut two)?;
        assert_eq!(two, [0xAB, 0xCD]);
        assert_eq!(reader.available()?, 4);

        assert!(reader.get_n::<u64>(33).is_err());
        assert!(reader.get_bytes(&mut two).is_err());
        Ok(())
    }

    #[test]
    fn unaligned_writer_is_rejected() {
        let mut writer = BitstreamIoWriter::new();
        writer.put_n(1, 1u8).unwrap();
        assert!(writer.into_bytes().is_err());
    }
}
