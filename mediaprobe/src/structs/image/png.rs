use anyhow::{Result, bail};

use crate::structs::node::Node;
use crate::utils::errors::DecodeError;
use crate::utils::source::ByteReader;

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub const IHDR: [u8; 4] = *b"IHDR";
pub const IDAT: [u8; 4] = *b"IDAT";
pub const IEND: [u8; 4] = *b"IEND";

pub const CHUNK_HEADER_LEN: u64 = 8;
pub const CHUNK_CRC_LEN: u64 = 4;
pub const IMAGE_HEADER_LEN: usize = 13;

/// IHDR payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: u8,
    pub compression: u8,
    pub filter: u8,
    pub interlace: u8,
}

impl ImageHeader {
    pub fn decode(node: &Node, payload: &[u8]) -> Result<Self> {
        if !node.is_fourcc(&IHDR) {
            bail!(DecodeError::UnexpectedRecord {
                expected: "IHDR".to_string(),
                found: node.name(),
            });
        }

        if payload.len() < IMAGE_HEADER_LEN {
            bail!(DecodeError::PayloadTooShort {
                record: "IHDR",
                expected: IMAGE_HEADER_LEN,
                actual: payload.len(),
            });
        }

        let r = &mut ByteReader::be(payload);
        Ok(Self {
            width: r.u32()?,
            height: r.u32()?,
            bit_depth: r.u8()?,
            color_type: r.u8()?,
            compression: r.u8()?,
            filter: r.u8()?,
            interlace: r.u8()?,
        })
    }

    /// Samples per pixel; palette images count as one.
    pub fn channels(&self) -> u32 {
        match self.color_type {
            2 => 3,
            4 => 2,
            6 => 4,
            _ => 1,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IMAGE_HEADER_LEN);
        out.extend_from_slice(&self.width.to_be_bytes());
        out.extend_from_slice(&self.height.to_be_bytes());
        out.extend_from_slice(&[
            self.bit_depth,
            self.color_type,
            self.compression,
            self.filter,
            self.interlace,
        ]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::node::NodeKind;

    #[test]
    fn image_header() {
        let ihdr = ImageHeader {
            width: 320,
            height: 200,
            bit_depth: 8,
            color_type: 6,
            compression: 0,
            filter: 0,
            interlace: 1,
        };
        let payload = ihdr.to_bytes();
        let node = Node {
            kind: NodeKind::PngChunk,
            identifier: IHDR.to_vec(),
            header_length: 8,
            data_offset: 16,
            data_length: 13,
            trailer_length: 4,
            complete: true,
        };

        let decoded = ImageHeader::decode(&node, &payload).unwrap();
        assert_eq!(decoded, ihdr);
        assert_eq!(decoded.channels(), 4);
        assert!(ImageHeader::decode(&node, &payload[..12]).is_err());

        let idat = Node {
            identifier: IDAT.to_vec(),
            ..node
        };
        assert!(ImageHeader::decode(&idat, &payload).is_err());
    }
}
