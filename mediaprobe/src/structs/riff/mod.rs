//! RIFF chunk payloads.
//!
//! Every chunk is a FourCC, a 32-bit length and the payload, padded to an
//! even size. Lengths are little-endian except in `RIFX` files. Container
//! chunks (`RIFF`, `RIFX`, `RF64`, `BW64`, `LIST`) start their payload with
//! a list type FourCC followed by child chunks.
//!
//! `RF64` and `BW64` files set 32-bit lengths to `0xFFFFFFFF` and store the
//! real values in a `ds64` chunk.

use anyhow::{Result, bail};

use crate::structs::node::{FourCC, Node, NodeKind};
use crate::utils::errors::DecodeError;
use crate::utils::source::ByteReader;

pub mod avi;
pub mod ds64;
pub mod wave;

pub const RIFF: [u8; 4] = *b"RIFF";
pub const RIFX: [u8; 4] = *b"RIFX";
pub const RF64: [u8; 4] = *b"RF64";
pub const BW64: [u8; 4] = *b"BW64";
pub const LIST: [u8; 4] = *b"LIST";
pub const DS64: [u8; 4] = *b"ds64";
pub const DATA: [u8; 4] = *b"data";
pub const FMT: [u8; 4] = *b"fmt ";

pub const WAVE: [u8; 4] = *b"WAVE";
pub const AVI: [u8; 4] = *b"AVI ";
pub const HDRL: [u8; 4] = *b"hdrl";
pub const STRL: [u8; 4] = *b"strl";
pub const MOVI: [u8; 4] = *b"movi";

pub const AVIH: [u8; 4] = *b"avih";
pub const STRH: [u8; 4] = *b"strh";
pub const STRF: [u8; 4] = *b"strf";
pub const STRN: [u8; 4] = *b"strn";

pub const STREAM_VIDEO: [u8; 4] = *b"vids";
pub const STREAM_AUDIO: [u8; 4] = *b"auds";
pub const STREAM_TEXT: [u8; 4] = *b"txts";

/// Length value meaning "look it up in `ds64`".
pub const SIZE_IN_DS64: u32 = 0xFFFF_FFFF;

pub const CHUNK_HEADER_LEN: u64 = 8;

#[inline(always)]
pub fn is_container(id: &[u8; 4]) -> bool {
    matches!(id, b"RIFF" | b"RIFX" | b"RF64" | b"BW64" | b"LIST")
}

/// A serializable chunk, usually implemented with `#[riff_chunk(b"....")]`.
pub trait RiffChunk {
    fn chunk_id(&self) -> &[u8; 4];

    fn chunk_data(&self) -> Vec<u8>;

    /// Appends header, payload and pad byte.
    fn write_all(&self, dst: &mut Vec<u8>) {
        let data = self.chunk_data();
        dst.extend_from_slice(self.chunk_id());
        dst.extend_from_slice(&(data.len() as u32).to_le_bytes());
        dst.extend_from_slice(&data);
        if data.len() % 2 == 1 {
            dst.push(0);
        }
    }

    fn to_chunk_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_all(&mut out);
        out
    }
}

/// Raw chunk, handy for building streams.
pub struct RawChunk {
    pub id: [u8; 4],
    pub data: Vec<u8>,
}

impl RiffChunk for RawChunk {
    fn chunk_id(&self) -> &[u8; 4] {
        &self.id
    }

    fn chunk_data(&self) -> Vec<u8> {
        self.data.clone()
    }
}

/// Container chunk holding its list type and already serialized children.
pub struct ListChunk {
    pub id: [u8; 4],
    pub list_type: [u8; 4],
    pub children: Vec<u8>,
}

impl ListChunk {
    pub fn new(id: [u8; 4], list_type: [u8; 4]) -> Self {
        Self {
            id,
            list_type,
            children: Vec::new(),
        }
    }

    pub fn push(mut self, chunk: &impl RiffChunk) -> Self {
        chunk.write_all(&mut self.children);
        self
    }
}

impl RiffChunk for ListChunk {
    fn chunk_id(&self) -> &[u8; 4] {
        &self.id
    }

    fn chunk_data(&self) -> Vec<u8> {
        [self.list_type.as_slice(), &self.children].concat()
    }
}

/// Fails unless `node` is a RIFF chunk named `id`. Returns the chunk's byte
/// order.
pub fn expect_chunk(node: &Node, id: &[u8; 4]) -> Result<bool> {
    match node.kind {
        NodeKind::RiffChunk { big_endian, .. } if node.is_fourcc(id) => Ok(big_endian),
        _ => bail!(DecodeError::UnexpectedRecord {
            expected: FourCC::new(id).to_string(),
            found: node.name(),
        }),
    }
}

pub(crate) fn reader(payload: &[u8], big_endian: bool) -> ByteReader<'_> {
    if big_endian {
        ByteReader::be(payload)
    } else {
        ByteReader::le(payload)
    }
}

pub(crate) fn too_short(record: &'static str, expected: usize, actual: usize) -> DecodeError {
    DecodeError::PayloadTooShort {
        record,
        expected,
        actual,
    }
}

/// Stream name from a `strn` chunk, NUL terminated.
pub fn stream_name(node: &Node, payload: &[u8]) -> Result<String> {
    expect_chunk(node, &STRN)?;
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    Ok(String::from_utf8_lossy(&payload[..end]).trim().to_string())
}

#[test]
fn test_write_all_pads() {
    let chunk = RawChunk {
        id: *b"strn",
        data: b"Video\0x".to_vec(),
    };
    let bytes = chunk.to_chunk_bytes();
    assert_eq!(&bytes[..8], b"strn\x07\x00\x00\x00");
    assert_eq!(bytes.len(), 16);
    assert_eq!(bytes[15], 0);

    let list = ListChunk::new(LIST, STRL).push(&chunk);
    let bytes = list.to_chunk_bytes();
    assert_eq!(&bytes[..12], b"LIST\x14\x00\x00\x00strl");
    assert_eq!(bytes.len(), 28);
}
