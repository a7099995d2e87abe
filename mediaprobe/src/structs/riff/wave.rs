use anyhow::{Result, bail};
use mprobe_macros::{ToBytes, riff_chunk};

use crate::structs::node::Node;
use crate::structs::riff::{FMT, STRF, expect_chunk, reader, too_short};

pub const WAVE_FORMAT_PCM: u16 = 0x0001;
pub const WAVE_FORMAT_ADPCM: u16 = 0x0002;
pub const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
pub const WAVE_FORMAT_ALAW: u16 = 0x0006;
pub const WAVE_FORMAT_MULAW: u16 = 0x0007;
pub const WAVE_FORMAT_MPEG: u16 = 0x0050;
pub const WAVE_FORMAT_MPEGLAYER3: u16 = 0x0055;
pub const WAVE_FORMAT_DOLBY_AC3: u16 = 0x2000;
pub const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

pub const WAVE_FORMAT_LEN: usize = 16;
pub const EXTENSIBLE_LEN: usize = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ToBytes)]
pub struct WaveFormatExtensible {
    pub valid_bits_per_sample: u16,
    pub channel_mask: u32,
    pub sub_format: [u8; 16],
}

/// `WAVEFORMATEX`, optionally followed by the `WAVE_FORMAT_EXTENSIBLE`
/// extension.
#[riff_chunk(b"fmt ")]
#[derive(Debug, Clone, PartialEq, Eq, ToBytes)]
pub struct WaveFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    /// Absent in 16-byte PCM headers.
    pub cb_size: Option<u16>,
    pub extensible: Option<WaveFormatExtensible>,
}

impl WaveFormat {
    pub fn pcm(channels: u16, samples_per_sec: u32, bits_per_sample: u16) -> Self {
        let block_align = channels * bits_per_sample.div_ceil(8);
        Self {
            format_tag: WAVE_FORMAT_PCM,
            channels,
            samples_per_sec,
            avg_bytes_per_sec: samples_per_sec * block_align as u32,
            block_align,
            bits_per_sample,
            cb_size: None,
            extensible: None,
        }
    }

    /// Decodes a `fmt ` chunk or an audio stream's `strf` chunk.
    pub fn decode(node: &Node, payload: &[u8]) -> Result<Self> {
        let big_endian = match expect_chunk(node, &FMT) {
            Ok(big_endian) => big_endian,
            Err(_) => expect_chunk(node, &STRF)?,
        };

        Self::from_bytes(payload, big_endian)
    }

    pub fn from_bytes(payload: &[u8], big_endian: bool) -> Result<Self> {
        if payload.len() < WAVE_FORMAT_LEN {
            bail!(too_short("fmt", WAVE_FORMAT_LEN, payload.len()));
        }

        let reader = &mut reader(payload, big_endian);
        let mut format = Self {
            format_tag: reader.u16()?,
            channels: reader.u16()?,
            samples_per_sec: reader.u32()?,
            avg_bytes_per_sec: reader.u32()?,
            block_align: reader.u16()?,
            bits_per_sample: reader.u16()?,
            cb_size: None,
            extensible: None,
        };

        if reader.remaining() >= 2 {
            let cb_size = reader.u16()?;
            format.cb_size = Some(cb_size);

            if format.format_tag == WAVE_FORMAT_EXTENSIBLE
                && cb_size as usize >= EXTENSIBLE_LEN
                && reader.remaining() >= EXTENSIBLE_LEN
            {
                format.extensible = Some(WaveFormatExtensible {
                    valid_bits_per_sample: reader.u16()?,
                    channel_mask: reader.u32()?,
                    sub_format: reader.array()?,
                });
            }
        }

        Ok(format)
    }

    /// The format tag, resolved through the extensible sub-format GUID.
    pub fn effective_format_tag(&self) -> u16 {
        match &self.extensible {
            Some(ext) if self.format_tag == WAVE_FORMAT_EXTENSIBLE => {
                u16::from_le_bytes([ext.sub_format[0], ext.sub_format[1]])
            }
            _ => self.format_tag,
        }
    }

    pub fn codec_name(&self) -> String {
        match self.effective_format_tag() {
            WAVE_FORMAT_PCM => "pcm".to_string(),
            WAVE_FORMAT_ADPCM => "adpcm".to_string(),
            WAVE_FORMAT_IEEE_FLOAT => "pcm_float".to_string(),
            WAVE_FORMAT_ALAW => "alaw".to_string(),
            WAVE_FORMAT_MULAW => "mulaw".to_string(),
            WAVE_FORMAT_MPEG => "mp2".to_string(),
            WAVE_FORMAT_MPEGLAYER3 => "mp3".to_string(),
            WAVE_FORMAT_DOLBY_AC3 => "ac3".to_string(),
            tag => format!("wav_{tag:04x}"),
        }
    }

    pub fn bit_depth(&self) -> u16 {
        match &self.extensible {
            Some(ext) if ext.valid_bits_per_sample > 0 => ext.valid_bits_per_sample,
            _ => self.bits_per_sample,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::riff::RiffChunk;

    #[test]
    fn pcm_chunk_layout() {
        let fmt = WaveFormat::pcm(2, 48_000, 24);
        let bytes = fmt.to_chunk_bytes();
        assert_eq!(&bytes[..8], b"fmt \x10\x00\x00\x00");
        assert_eq!(
            &bytes[8..],
            &[
                0x01, 0x00, 0x02, 0x00, 0x80, 0xBB, 0x00, 0x00, 0x00, 0x65, 0x04, 0x00, 0x06,
                0x00, 0x18, 0x00
            ]
        );

        let decoded = WaveFormat::from_bytes(&bytes[8..], false).unwrap();
        assert_eq!(decoded, fmt);
        assert_eq!(decoded.codec_name(), "pcm");
    }

    #[test]
    fn extensible_float() {
        let mut sub_format = [0u8; 16];
        sub_format[0] = 0x03;
        let fmt = WaveFormat {
            format_tag: WAVE_FORMAT_EXTENSIBLE,
            cb_size: Some(22),
            extensible: Some(WaveFormatExtensible {
                valid_bits_per_sample: 32,
                channel_mask: 0x3F,
                sub_format,
            }),
            ..WaveFormat::pcm(6, 48_000, 32)
        };

        let data = fmt.chunk_data();
        assert_eq!(data.len(), 40);

        let decoded = WaveFormat::from_bytes(&data, false).unwrap();
        assert_eq!(decoded, fmt);
        assert_eq!(decoded.effective_format_tag(), WAVE_FORMAT_IEEE_FLOAT);
        assert_eq!(decoded.codec_name(), "pcm_float");
        assert_eq!(decoded.bit_depth(), 32);
    }

    #[test]
    fn big_endian_and_short() {
        let be = [
            0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0xAC, 0x44, 0x00, 0x01, 0x58, 0x88, 0x00, 0x02,
            0x00, 0x10,
        ];
        let fmt = WaveFormat::from_bytes(&be, true).unwrap();
        assert_eq!(fmt, WaveFormat::pcm(1, 44_100, 16));

        assert!(WaveFormat::from_bytes(&be[..10], true).is_err());
    }
}
