//! FLAC frame header.
//!
//! | bytes | content                                                  |
//! |-------|----------------------------------------------------------|
//! | 2     | sync (14), reserved (1), blocking strategy (1)           |
//! | 1     | block size code (4), sample rate code (4)                |
//! | 1     | channel assignment (4), sample size code (3), reserved   |
//! | 1-7   | coded frame number (31 bits) or sample number (36 bits)  |
//! | 0-2   | explicit block size - 1 (codes 6, 7)                     |
//! | 0-2   | explicit sample rate (codes 12, 13, 14)                  |
//! | 1     | CRC-8 of everything above                                |

use anyhow::{Result, bail};
use log::trace;

use crate::structs::flac::is_frame_sync;
use crate::structs::node::{Node, NodeKind};
use crate::utils::codes::{
    decode_utf8_varint, encode_utf8_varint, extract_bits, pack_bits, utf8_varint_len,
};
use crate::utils::crc::FLAC_FRAME_HEADER_CRC;
use crate::utils::errors::{CodecError, DecodeError, FlacError};

pub const MIN_FRAME_HEADER_LEN: usize = 6;
pub const MAX_FRAME_HEADER_LEN: usize = 16;

/// Sample rates for codes 1 to 11. Code 0 is rejected.
pub const SAMPLE_RATES: [u32; 12] = [
    0, 88_200, 176_400, 192_000, 8_000, 16_000, 22_050, 24_000, 32_000, 44_100, 48_000, 96_000,
];

/// Sample sizes by code. `None` at 0 defers to StreamInfo, code 3 is reserved.
pub const BITS_PER_SAMPLE: [Option<u8>; 8] = [
    None,
    Some(8),
    Some(12),
    None,
    Some(16),
    Some(20),
    Some(24),
    Some(32),
];

/// Bit offset and width of the fixed fields in the first four bytes.
type Field = (usize, u32);

const RESERVED_AFTER_SYNC: Field = (14, 1);
const BLOCKING_STRATEGY: Field = (15, 1);
const BLOCK_SIZE_CODE: Field = (16, 4);
const SAMPLE_RATE_CODE: Field = (20, 4);
const CHANNEL_CODE: Field = (24, 4);
const SAMPLE_SIZE_CODE: Field = (28, 3);
const RESERVED_AFTER_SAMPLE_SIZE: Field = (31, 1);

fn field(bytes: &[u8], (offset, width): Field) -> Result<u8, CodecError> {
    Ok(extract_bits(bytes, offset, width)? as u8)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingStrategy {
    Fixed,
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAssignment {
    Independent(u8),
    LeftSide,
    RightSide,
    MidSide,
}

impl ChannelAssignment {
    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0..=7 => ChannelAssignment::Independent(code + 1),
            8 => ChannelAssignment::LeftSide,
            9 => ChannelAssignment::RightSide,
            10 => ChannelAssignment::MidSide,
            _ => bail!(FlacError::InvalidChannelAssignment(code)),
        })
    }

    pub fn code(&self) -> u8 {
        match self {
            ChannelAssignment::Independent(n) => n.wrapping_sub(1),
            ChannelAssignment::LeftSide => 8,
            ChannelAssignment::RightSide => 9,
            ChannelAssignment::MidSide => 10,
        }
    }

    pub fn channels(&self) -> u8 {
        match self {
            ChannelAssignment::Independent(n) => *n,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub blocking_strategy: BlockingStrategy,
    pub block_size: u32,
    pub sample_rate: u32,
    pub channel_assignment: ChannelAssignment,
    /// `None` when the stream's StreamInfo value applies.
    pub bits_per_sample: Option<u8>,
    /// Frame number for fixed blocking, first sample number otherwise.
    pub number: u64,
    pub crc8: u8,
}

impl FrameHeader {
    /// Decodes the header carried in a frame node's identifier.
    pub fn decode(node: &Node) -> Result<Self> {
        if node.kind != NodeKind::FlacFrame {
            bail!(DecodeError::UnexpectedRecord {
                expected: "FRAME".to_string(),
                found: node.name(),
            });
        }

        Ok(Self::parse(&node.identifier)?.0)
    }

    /// Parses the frame header at the start of `bytes`.
    ///
    /// Returns the header and its raw bytes, CRC included.
    pub fn parse(bytes: &[u8]) -> Result<(Self, Vec<u8>)> {
        let mut header = Vec::with_capacity(MAX_FRAME_HEADER_LEN);

        Self::take(bytes, &mut header, 4)?;
        if !is_frame_sync(header[0], header[1]) {
            bail!(DecodeError::UnexpectedRecord {
                expected: "FRAME".to_string(),
                found: format!("{:02X}{:02X}", header[0], header[1]),
            });
        }
        if field(&header, RESERVED_AFTER_SYNC)? != 0 {
            bail!(FlacError::ReservedBitSet(1));
        }
        if field(&header, RESERVED_AFTER_SAMPLE_SIZE)? != 0 {
            bail!(FlacError::ReservedBitSet(3));
        }

        let blocking_strategy = match field(&header, BLOCKING_STRATEGY)? {
            0 => BlockingStrategy::Fixed,
            _ => BlockingStrategy::Variable,
        };

        let bs_code = field(&header, BLOCK_SIZE_CODE)?;
        let sr_code = field(&header, SAMPLE_RATE_CODE)?;
        if bs_code == 0 {
            bail!(FlacError::InvalidBlockSizeCode(bs_code));
        }
        if sr_code == 0 || sr_code == 15 {
            bail!(FlacError::InvalidSampleRateCode(sr_code));
        }

        let channel_assignment = ChannelAssignment::from_code(field(&header, CHANNEL_CODE)?)?;
        let bps_code = field(&header, SAMPLE_SIZE_CODE)?;
        if bps_code == 3 {
            bail!(FlacError::InvalidBitsPerSample(bps_code));
        }
        let bits_per_sample = BITS_PER_SAMPLE[bps_code as usize];

        let max_bits = match blocking_strategy {
            BlockingStrategy::Fixed => 31,
            BlockingStrategy::Variable => 36,
        };
        Self::take(bytes, &mut header, 1)?;
        let continuation = utf8_varint_len(header[4])?;
        Self::take(bytes, &mut header, continuation)?;
        let (number, _) = decode_utf8_varint(&header[4..], max_bits)?;

        let block_size = match bs_code {
            1 => 192,
            2..=5 => 576 << (bs_code - 2),
            6 => Self::take(bytes, &mut header, 1)? as u32 + 1,
            7 => Self::take(bytes, &mut header, 2)? as u32 + 1,
            _ => 256 << (bs_code - 8),
        };

        let sample_rate = match sr_code {
            12 => Self::take(bytes, &mut header, 1)? as u32 * 1000,
            13 => Self::take(bytes, &mut header, 2)? as u32,
            14 => Self::take(bytes, &mut header, 2)? as u32 * 10,
            code => SAMPLE_RATES[code as usize],
        };

        let crc8 = Self::take(bytes, &mut header, 1)? as u8;
        let calculated = FLAC_FRAME_HEADER_CRC.checksum(&header[..header.len() - 1]);
        if calculated != crc8 {
            bail!(FlacError::HeaderCrcMismatch {
                calculated,
                read: crc8,
            });
        }

        let fh = Self {
            blocking_strategy,
            block_size,
            sample_rate,
            channel_assignment,
            bits_per_sample,
            number,
            crc8,
        };

        trace!("Frame header: {fh:?}");

        Ok((fh, header))
    }

    /// Appends the next `n` bytes of `bytes` to `header` and returns them as
    /// a big-endian value.
    fn take(bytes: &[u8], header: &mut Vec<u8>, n: usize) -> Result<u64> {
        let start = header.len();
        let Some(next) = bytes.get(start..start + n) else {
            bail!(FlacError::TruncatedFrameHeader(bytes.len()));
        };

        header.extend_from_slice(next);
        Ok(next.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }

    /// Encodes the header with a freshly computed CRC-8, picking the
    /// shortest codes for block size and sample rate.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let (bs_code, bs_extra) = Self::block_size_code(self.block_size)?;
        let (sr_code, sr_extra) = Self::sample_rate_code(self.sample_rate)?;

        let bps_code = match self.bits_per_sample {
            None => 0,
            Some(bits) => match BITS_PER_SAMPLE.iter().position(|&b| b == Some(bits)) {
                Some(code) => code as u8,
                None => bail!(FlacError::InvalidBitsPerSample(bits)),
            },
        };

        let ch_code = self.channel_assignment.code();
        if ch_code > 10 {
            bail!(FlacError::InvalidChannelAssignment(ch_code));
        }

        let max_bits = match self.blocking_strategy {
            BlockingStrategy::Fixed => 31,
            BlockingStrategy::Variable => 36,
        };
        if self.number >> max_bits != 0 {
            bail!(CodecError::ValueTooWide { max_bits });
        }

        let mut fixed = [0xFF, 0xF8, 0, 0];
        for ((offset, width), value) in [
            (BLOCKING_STRATEGY, (self.blocking_strategy == BlockingStrategy::Variable) as u8),
            (BLOCK_SIZE_CODE, bs_code),
            (SAMPLE_RATE_CODE, sr_code),
            (CHANNEL_CODE, ch_code),
            (SAMPLE_SIZE_CODE, bps_code),
        ] {
            pack_bits(&mut fixed, offset, width, value as u64)?;
        }

        let mut out = Vec::with_capacity(MAX_FRAME_HEADER_LEN);
        out.extend_from_slice(&fixed);
        out.extend(encode_utf8_varint(self.number)?);
        out.extend(bs_extra);
        out.extend(sr_extra);
        out.push(FLAC_FRAME_HEADER_CRC.checksum(&out));

        Ok(out)
    }

    fn block_size_code(block_size: u32) -> Result<(u8, Vec<u8>)> {
        Ok(match block_size {
            192 => (1, vec![]),
            576 | 1152 | 2304 | 4608 => (2 + (block_size / 576).trailing_zeros() as u8, vec![]),
            256 | 512 | 1024 | 2048 | 4096 | 8192 | 16384 | 32768 => {
                (8 + (block_size / 256).trailing_zeros() as u8, vec![])
            }
            1..=256 => (6, vec![(block_size - 1) as u8]),
            1..=65536 => (7, ((block_size - 1) as u16).to_be_bytes().to_vec()),
            _ => bail!("Block size {block_size} cannot be coded in a frame header"),
        })
    }

    fn sample_rate_code(sample_rate: u32) -> Result<(u8, Vec<u8>)> {
        if let Some(code) = SAMPLE_RATES[1..].iter().position(|&r| r == sample_rate) {
            return Ok((code as u8 + 1, vec![]));
        }

        Ok(match sample_rate {
            r if r % 1000 == 0 && r / 1000 <= 0xFF => (12, vec![(r / 1000) as u8]),
            r if r <= 0xFFFF => (13, (r as u16).to_be_bytes().to_vec()),
            r if r % 10 == 0 && r / 10 <= 0xFFFF => (14, ((r / 10) as u16).to_be_bytes().to_vec()),
            r => bail!("Sample rate {r} cannot be coded in a frame header"),
        })
    }

    pub fn channels(&self) -> u8 {
        self.channel_assignment.channels()
    }
}
