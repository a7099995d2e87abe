use anyhow::{Result, bail};

use crate::join_bytes_le;
use crate::structs::node::{FourCC, Node};
use crate::structs::riff::{BW64, DATA, DS64, RF64, RiffChunk, expect_chunk, reader, too_short};

pub const DS64_MIN_LEN: usize = 28;

/// 64-bit sizes for `RF64`/`BW64` files.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ds64 {
    pub riff_size: u64,
    pub data_size: u64,
    pub sample_count: u64,
    pub table: Vec<(FourCC, u64)>,
}

impl Ds64 {
    pub fn decode(node: &Node, payload: &[u8]) -> Result<Self> {
        let big_endian = expect_chunk(node, &DS64)?;
        if payload.len() < DS64_MIN_LEN {
            bail!(too_short("ds64", DS64_MIN_LEN, payload.len()));
        }

        let r = &mut reader(payload, big_endian);
        let mut ds64 = Self {
            riff_size: r.u64()?,
            data_size: r.u64()?,
            sample_count: r.u64()?,
            table: Vec::new(),
        };

        let entries = r.u32()?;
        for _ in 0..entries {
            if r.remaining() < 12 {
                break;
            }
            ds64.table.push((FourCC(r.array()?), r.u64()?));
        }

        Ok(ds64)
    }

    /// The 64-bit size recorded for chunk `id`, if known and non-zero.
    pub fn size_for(&self, id: &[u8; 4]) -> Option<u64> {
        let size = match *id {
            DATA => self.data_size,
            RF64 | BW64 => self.riff_size,
            _ => self
                .table
                .iter()
                .find(|(fourcc, _)| fourcc.0 == *id)
                .map_or(0, |&(_, size)| size),
        };

        (size != 0).then_some(size)
    }
}

impl RiffChunk for Ds64 {
    fn chunk_id(&self) -> &[u8; 4] {
        &DS64
    }

    fn chunk_data(&self) -> Vec<u8> {
        let mut data = join_bytes_le!(
            self.riff_size,
            self.data_size,
            self.sample_count,
            self.table.len() as u32
        );
        for (fourcc, size) in &self.table {
            data.extend(join_bytes_le!(fourcc.0, *size));
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::node::NodeKind;

    #[test]
    fn sizes_by_id() {
        let ds64 = Ds64 {
            riff_size: 5_000_000_036,
            data_size: 5_000_000_000,
            sample_count: 1_250_000_000,
            table: vec![(FourCC(*b"axml"), 0x1_0000_0000)],
        };

        let data = ds64.chunk_data();
        assert_eq!(data.len(), 28 + 12);

        let node = Node {
            kind: NodeKind::RiffChunk {
                list_type: None,
                big_endian: false,
            },
            identifier: DS64.to_vec(),
            header_length: 8,
            data_offset: 20,
            data_length: data.len() as u64,
            trailer_length: 0,
            complete: true,
        };

        let decoded = Ds64::decode(&node, &data).unwrap();
        assert_eq!(decoded, ds64);
        assert_eq!(decoded.size_for(b"data"), Some(5_000_000_000));
        assert_eq!(decoded.size_for(b"RF64"), Some(5_000_000_036));
        assert_eq!(decoded.size_for(b"axml"), Some(0x1_0000_0000));
        assert_eq!(decoded.size_for(b"bext"), None);
    }
}
