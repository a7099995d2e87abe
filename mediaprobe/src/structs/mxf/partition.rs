use anyhow::{Result, bail};
use log::trace;

use crate::join_bytes_be;
use crate::structs::mxf::label::{LabelMatch, PartitionKind, UL_LEN, partition_kind};
use crate::structs::node::Node;
use crate::utils::errors::DecodeError;
use crate::utils::source::ByteReader;

pub const PARTITION_PACK_MIN_LEN: usize = 88;

/// Partition pack payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPack {
    pub kind: PartitionKind,
    /// 1 open incomplete, 2 closed incomplete, 3 open complete, 4 closed
    /// complete.
    pub status: u8,
    pub major_version: u16,
    pub minor_version: u16,
    pub kag_size: u32,
    pub this_partition: u64,
    pub previous_partition: u64,
    pub footer_partition: u64,
    pub header_byte_count: u64,
    pub index_byte_count: u64,
    pub index_sid: u32,
    pub body_offset: u64,
    pub body_sid: u32,
    pub operational_pattern: [u8; UL_LEN],
    pub essence_containers: Vec<[u8; UL_LEN]>,
}

impl PartitionPack {
    pub fn decode(node: &Node, payload: &[u8], lm: &LabelMatch) -> Result<Self> {
        let Some(kind) = partition_kind(&node.identifier, lm) else {
            bail!(DecodeError::UnexpectedRecord {
                expected: "PartitionPack".to_string(),
                found: node.name(),
            });
        };

        if payload.len() < PARTITION_PACK_MIN_LEN {
            bail!(DecodeError::PayloadTooShort {
                record: "PartitionPack",
                expected: PARTITION_PACK_MIN_LEN,
                actual: payload.len(),
            });
        }

        let r = &mut ByteReader::be(payload);
        let mut pack = Self {
            kind,
            status: node.identifier[14],
            major_version: r.u16()?,
            minor_version: r.u16()?,
            kag_size: r.u32()?,
            this_partition: r.u64()?,
            previous_partition: r.u64()?,
            footer_partition: r.u64()?,
            header_byte_count: r.u64()?,
            index_byte_count: r.u64()?,
            index_sid: r.u32()?,
            body_offset: r.u64()?,
            body_sid: r.u32()?,
            operational_pattern: r.array()?,
            essence_containers: Vec::new(),
        };

        let count = r.u32()?;
        let size = r.u32()? as usize;
        for _ in 0..count {
            if size < UL_LEN || r.remaining() < size {
                break;
            }
            pack.essence_containers.push(r.array()?);
            r.skip(size - UL_LEN)?;
        }

        trace!(
            "{:?} partition v{}.{}, header {} bytes, {} essence container(s)",
            pack.kind,
            pack.major_version,
            pack.minor_version,
            pack.header_byte_count,
            pack.essence_containers.len()
        );

        Ok(pack)
    }

    /// Payload bytes (the key and length are not included).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = join_bytes_be!(
            self.major_version,
            self.minor_version,
            self.kag_size,
            self.this_partition,
            self.previous_partition,
            self.footer_partition,
            self.header_byte_count,
            self.index_byte_count,
            self.index_sid,
            self.body_offset,
            self.body_sid,
            self.operational_pattern,
            self.essence_containers.len() as u32,
            UL_LEN as u32,
        );
        for ul in &self.essence_containers {
            out.extend_from_slice(ul);
        }
        out
    }

    /// An empty, closed and complete header partition.
    pub fn header() -> Self {
        Self {
            kind: PartitionKind::Header,
            status: 0x04,
            major_version: 1,
            minor_version: 3,
            kag_size: 1,
            this_partition: 0,
            previous_partition: 0,
            footer_partition: 0,
            header_byte_count: 0,
            index_byte_count: 0,
            index_sid: 0,
            body_offset: 0,
            body_sid: 1,
            operational_pattern: [0; UL_LEN],
            essence_containers: Vec::new(),
        }
    }
}
