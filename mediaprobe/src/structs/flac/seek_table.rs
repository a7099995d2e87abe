use anyhow::{Result, bail};
use mprobe_macros::ToBytes;

use crate::byteorder::WriteBytesBe;
use crate::structs::flac::{BlockType, expect_block};
use crate::structs::node::Node;
use crate::utils::errors::DecodeError;
use crate::utils::source::ByteReader;

pub const SEEK_POINT_LEN: usize = 18;

pub const PLACEHOLDER_SAMPLE: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ToBytes)]
pub struct SeekPoint {
    pub sample_number: u64,
    /// Byte offset from the first frame header.
    pub stream_offset: u64,
    pub frame_samples: u16,
}

impl SeekPoint {
    pub fn is_placeholder(&self) -> bool {
        self.sample_number == PLACEHOLDER_SAMPLE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeekTable {
    pub points: Vec<SeekPoint>,
}

impl SeekTable {
    pub fn decode(node: &Node, payload: &[u8]) -> Result<Self> {
        expect_block(node, BlockType::SeekTable)?;
        Self::from_bytes(payload)
    }

    pub fn from_bytes(payload: &[u8]) -> Result<Self> {
        if payload.len() % SEEK_POINT_LEN != 0 {
            bail!(DecodeError::PayloadMisaligned {
                record: "SEEKTABLE",
                unit: SEEK_POINT_LEN,
                actual: payload.len(),
            });
        }

        let reader = &mut ByteReader::be(payload);
        let points = (0..payload.len() / SEEK_POINT_LEN)
            .map(|_| {
                Ok(SeekPoint {
                    sample_number: reader.u64()?,
                    stream_offset: reader.u64()?,
                    frame_samples: reader.u16()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { points })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.points.len() * SEEK_POINT_LEN);
        self.points.write_be(&mut out);
        out
    }

    /// Seek points that refer to a real sample.
    pub fn resolved(&self) -> impl Iterator<Item = &SeekPoint> {
        self.points.iter().filter(|p| !p.is_placeholder())
    }
}
