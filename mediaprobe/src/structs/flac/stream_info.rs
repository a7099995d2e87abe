use std::time::Duration;

use anyhow::{Result, bail};
use log::trace;

use crate::structs::flac::{BlockType, expect_block};
use crate::structs::node::Node;
use crate::utils::bitstream_io::{BitstreamIoWriter, BsIoSliceReader};
use crate::utils::errors::DecodeError;

pub const STREAM_INFO_LEN: usize = 34;

/// Stream parameters from the mandatory first metadata block.
///
/// | field            | bits |
/// |------------------|------|
/// | min block size   | 16   |
/// | max block size   | 16   |
/// | min frame size   | 24   |
/// | max frame size   | 24   |
/// | sample rate      | 20   |
/// | channels - 1     | 3    |
/// | bits/sample - 1  | 5    |
/// | total samples    | 36   |
/// | MD5              | 128  |
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamInfo {
    pub min_block_size: u16,
    pub max_block_size: u16,
    pub min_frame_size: u32,
    pub max_frame_size: u32,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    /// Zero when unknown.
    pub total_samples: u64,
    pub md5: [u8; 16],
}

impl StreamInfo {
    pub fn decode(node: &Node, payload: &[u8]) -> Result<Self> {
        expect_block(node, BlockType::StreamInfo)?;
        Self::from_bytes(payload)
    }

    pub fn from_bytes(payload: &[u8]) -> Result<Self> {
        if payload.len() < STREAM_INFO_LEN {
            bail!(DecodeError::PayloadTooShort {
                record: "STREAMINFO",
                expected: STREAM_INFO_LEN,
                actual: payload.len(),
            });
        }

        let reader = &mut BsIoSliceReader::from_slice(&payload[..STREAM_INFO_LEN]);
        Self::read(reader)
    }

    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let mut si = Self {
            min_block_size: reader.get_n(16)?,
            max_block_size: reader.get_n(16)?,
            min_frame_size: reader.get_n(24)?,
            max_frame_size: reader.get_n(24)?,
            sample_rate: reader.get_n(20)?,
            channels: reader.get_n::<u8>(3)? + 1,
            bits_per_sample: reader.get_n::<u8>(5)? + 1,
            total_samples: reader.get_n(36)?,
            ..Default::default()
        };
        reader.get_bytes(&mut si.md5)?;

        trace!(
            "STREAMINFO: {} Hz, {} ch, {} bit, {} samples",
            si.sample_rate, si.channels, si.bits_per_sample, si.total_samples
        );

        Ok(si)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = BitstreamIoWriter::new();
        writer.put_n(16, self.min_block_size)?;
        writer.put_n(16, self.max_block_size)?;
        writer.put_n(24, self.min_frame_size)?;
        writer.put_n(24, self.max_frame_size)?;
        writer.put_n(20, self.sample_rate)?;
        writer.put_n(3, self.channels.wrapping_sub(1))?;
        writer.put_n(5, self.bits_per_sample.wrapping_sub(1))?;
        writer.put_n(36, self.total_samples)?;
        writer.put_bytes(&self.md5)?;

        Ok(writer.into_bytes()?)
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }

        Duration::from_secs_f64(self.total_samples as f64 / self.sample_rate as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StreamInfo {
        StreamInfo {
            min_block_size: 4096,
            max_block_size: 4096,
            min_frame_size: 14,
            max_frame_size: 12_345,
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
            total_samples: 441_000,
            md5: *b"0123456789abcdef",
        }
    }

    #[test]
    fn roundtrip() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(bytes.len(), STREAM_INFO_LEN);
        assert_eq!(&bytes[..4], &[0x10, 0x00, 0x10, 0x00]);
        // 44100 << 4 | (2-1) << 1 | (16-1) >> 4
        assert_eq!(&bytes[10..13], &[0x0A, 0xC4, 0x42]);

        let si = StreamInfo::from_bytes(&bytes).unwrap();
        assert_eq!(si, sample());
        assert_eq!(si.to_bytes().unwrap(), bytes);
        assert_eq!(si.duration(), Duration::from_secs(10));
    }

    #[test]
    fn roundtrip_extremes() {
        let mut si = sample();
        si.sample_rate = (1 << 20) - 1;
        si.channels = 8;
        si.bits_per_sample = 32;
        si.total_samples = (1 << 36) - 1;
        si.min_frame_size = 0;
        si.max_frame_size = (1 << 24) - 1;

        let bytes = si.to_bytes().unwrap();
        assert_eq!(StreamInfo::from_bytes(&bytes).unwrap(), si);
    }

    #[test]
    fn short_payload() {
        let err = StreamInfo::from_bytes(&[0u8; 20]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DecodeError>(),
            Some(DecodeError::PayloadTooShort { actual: 20, .. })
        ));
    }
}
