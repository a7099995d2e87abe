//! FLAC metadata blocks and frame headers.
//!
//! ## Stream Layout
//!
//! `fLaC` marker, one or more metadata blocks (the first is always
//! StreamInfo), then audio frames. Each metadata block starts with a 4-byte
//! header: last-block flag (1 bit), block type (7 bits), payload length
//! (24 bits, big-endian).
//!
//! Frames carry no length field. They begin with the 14-bit sync pattern
//! `11111111111110` and a variable-width header protected by CRC-8.

use std::fmt::{Display, Formatter};

use anyhow::{Result, bail};

use crate::structs::node::{Node, NodeKind};
use crate::utils::errors::DecodeError;

pub mod frame_header;
pub mod picture;
pub mod seek_table;
pub mod stream_info;
pub mod vorbis_comment;

pub const FLAC_MARKER: [u8; 4] = *b"fLaC";

/// The 14-bit frame sync code.
pub const FRAME_SYNC: u16 = 0x3FFE;

pub const BLOCK_HEADER_LEN: u64 = 4;

#[inline(always)]
pub const fn is_frame_sync(b0: u8, b1: u8) -> bool {
    u16::from_be_bytes([b0, b1]) >> 2 == FRAME_SYNC
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    StreamInfo,
    Padding,
    Application,
    SeekTable,
    VorbisComment,
    CueSheet,
    Picture,
    Reserved(u8),
    Invalid,
}

impl From<u8> for BlockType {
    fn from(value: u8) -> Self {
        match value & 0x7F {
            0 => BlockType::StreamInfo,
            1 => BlockType::Padding,
            2 => BlockType::Application,
            3 => BlockType::SeekTable,
            4 => BlockType::VorbisComment,
            5 => BlockType::CueSheet,
            6 => BlockType::Picture,
            127 => BlockType::Invalid,
            n => BlockType::Reserved(n),
        }
    }
}

impl From<BlockType> for u8 {
    fn from(value: BlockType) -> Self {
        match value {
            BlockType::StreamInfo => 0,
            BlockType::Padding => 1,
            BlockType::Application => 2,
            BlockType::SeekTable => 3,
            BlockType::VorbisComment => 4,
            BlockType::CueSheet => 5,
            BlockType::Picture => 6,
            BlockType::Reserved(n) => n,
            BlockType::Invalid => 127,
        }
    }
}

impl Display for BlockType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockType::StreamInfo => write!(f, "STREAMINFO"),
            BlockType::Padding => write!(f, "PADDING"),
            BlockType::Application => write!(f, "APPLICATION"),
            BlockType::SeekTable => write!(f, "SEEKTABLE"),
            BlockType::VorbisComment => write!(f, "VORBIS_COMMENT"),
            BlockType::CueSheet => write!(f, "CUESHEET"),
            BlockType::Picture => write!(f, "PICTURE"),
            BlockType::Reserved(n) => write!(f, "RESERVED({n})"),
            BlockType::Invalid => write!(f, "INVALID"),
        }
    }
}

/// Metadata block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub last: bool,
    pub block_type: BlockType,
    pub length: u32,
}

impl BlockHeader {
    pub fn from_bytes(bytes: &[u8; 4]) -> Self {
        Self {
            last: bytes[0] & 0x80 != 0,
            block_type: BlockType::from(bytes[0]),
            length: u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        let len = self.length.to_be_bytes();
        [
            (self.last as u8) << 7 | u8::from(self.block_type),
            len[1],
            len[2],
            len[3],
        ]
    }
}

/// Fails unless `node` is a metadata block of type `expected`.
pub fn expect_block(node: &Node, expected: BlockType) -> Result<()> {
    match node.kind {
        NodeKind::FlacMetadata { block_type, .. } if BlockType::from(block_type) == expected => {
            Ok(())
        }
        _ => bail!(DecodeError::UnexpectedRecord {
            expected: expected.to_string(),
            found: node.name(),
        }),
    }
}

#[test]
fn test_block_header() {
    let header = BlockHeader::from_bytes(&[0x84, 0x00, 0x01, 0x02]);
    assert!(header.last);
    assert_eq!(header.block_type, BlockType::VorbisComment);
    assert_eq!(header.length, 258);
    assert_eq!(header.to_bytes(), [0x84, 0x00, 0x01, 0x02]);

    assert_eq!(BlockType::from(0x7F), BlockType::Invalid);
    assert_eq!(BlockType::from(0x09), BlockType::Reserved(9));

    assert!(is_frame_sync(0xFF, 0xF8));
    assert!(is_frame_sync(0xFF, 0xF9));
    assert!(!is_frame_sync(0xFF, 0xFC));
    assert!(!is_frame_sync(0x66, 0x4C));
}
