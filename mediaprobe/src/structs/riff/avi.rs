//! AVI header chunks from the `hdrl` list.

use anyhow::{Result, bail};
use mprobe_macros::{ToBytes, riff_chunk};

use crate::structs::node::{FourCC, Node};
use crate::structs::riff::{
    AVIH, STRF, STRH, STREAM_AUDIO, STREAM_TEXT, STREAM_VIDEO, expect_chunk, reader, too_short,
};
use crate::structs::track::MediaType;

pub const AVI_MAIN_HEADER_LEN: usize = 56;
pub const AVI_STREAM_HEADER_MIN_LEN: usize = 48;
pub const BITMAP_INFO_HEADER_LEN: usize = 40;

/// `avih`
#[riff_chunk(b"avih")]
#[derive(Debug, Clone, PartialEq, Eq, Default, ToBytes)]
pub struct AviMainHeader {
    pub micro_sec_per_frame: u32,
    pub max_bytes_per_sec: u32,
    pub padding_granularity: u32,
    pub flags: u32,
    pub total_frames: u32,
    pub initial_frames: u32,
    pub streams: u32,
    pub suggested_buffer_size: u32,
    pub width: u32,
    pub height: u32,
    pub reserved: [u32; 4],
}

impl AviMainHeader {
    pub fn decode(node: &Node, payload: &[u8]) -> Result<Self> {
        let big_endian = expect_chunk(node, &AVIH)?;
        if payload.len() < AVI_MAIN_HEADER_LEN {
            bail!(too_short("avih", AVI_MAIN_HEADER_LEN, payload.len()));
        }

        let r = &mut reader(payload, big_endian);
        Ok(Self {
            micro_sec_per_frame: r.u32()?,
            max_bytes_per_sec: r.u32()?,
            padding_granularity: r.u32()?,
            flags: r.u32()?,
            total_frames: r.u32()?,
            initial_frames: r.u32()?,
            streams: r.u32()?,
            suggested_buffer_size: r.u32()?,
            width: r.u32()?,
            height: r.u32()?,
            reserved: [r.u32()?, r.u32()?, r.u32()?, r.u32()?],
        })
    }
}

/// `strh`
#[riff_chunk(b"strh")]
#[derive(Debug, Clone, PartialEq, Eq, Default, ToBytes)]
pub struct AviStreamHeader {
    pub fcc_type: [u8; 4],
    pub fcc_handler: [u8; 4],
    pub flags: u32,
    pub priority: u16,
    pub language: u16,
    pub initial_frames: u32,
    pub scale: u32,
    pub rate: u32,
    pub start: u32,
    pub length: u32,
    pub suggested_buffer_size: u32,
    pub quality: u32,
    pub sample_size: u32,
    /// left, top, right, bottom
    pub frame: [i16; 4],
}

impl AviStreamHeader {
    pub fn decode(node: &Node, payload: &[u8]) -> Result<Self> {
        let big_endian = expect_chunk(node, &STRH)?;
        if payload.len() < AVI_STREAM_HEADER_MIN_LEN {
            bail!(too_short("strh", AVI_STREAM_HEADER_MIN_LEN, payload.len()));
        }

        let r = &mut reader(payload, big_endian);
        let mut header = Self {
            fcc_type: r.array()?,
            fcc_handler: r.array()?,
            flags: r.u32()?,
            priority: r.u16()?,
            language: r.u16()?,
            initial_frames: r.u32()?,
            scale: r.u32()?,
            rate: r.u32()?,
            start: r.u32()?,
            length: r.u32()?,
            suggested_buffer_size: r.u32()?,
            quality: r.u32()?,
            sample_size: r.u32()?,
            frame: [0; 4],
        };

        if r.remaining() >= 8 {
            header.frame = [r.i16()?, r.i16()?, r.i16()?, r.i16()?];
        }

        Ok(header)
    }

    pub fn media_type(&self) -> MediaType {
        match self.fcc_type {
            STREAM_VIDEO => MediaType::Video,
            STREAM_AUDIO => MediaType::Audio,
            STREAM_TEXT => MediaType::Data,
            _ => MediaType::Unknown,
        }
    }

    /// `rate / scale`, or `None` when either is zero.
    pub fn rate(&self) -> Option<f64> {
        (self.scale != 0 && self.rate != 0).then(|| self.rate as f64 / self.scale as f64)
    }

    pub fn handler(&self) -> FourCC {
        FourCC(self.fcc_handler)
    }
}

/// `BITMAPINFOHEADER` carried by a video stream's `strf`.
#[riff_chunk(b"strf")]
#[derive(Debug, Clone, PartialEq, Eq, Default, ToBytes)]
pub struct BitmapInfoHeader {
    pub size: u32,
    pub width: i32,
    pub height: i32,
    pub planes: u16,
    pub bit_count: u16,
    pub compression: [u8; 4],
    pub size_image: u32,
    pub x_pels_per_meter: i32,
    pub y_pels_per_meter: i32,
    pub clr_used: u32,
    pub clr_important: u32,
}

impl BitmapInfoHeader {
    pub fn decode(node: &Node, payload: &[u8]) -> Result<Self> {
        let big_endian = expect_chunk(node, &STRF)?;
        if payload.len() < BITMAP_INFO_HEADER_LEN {
            bail!(too_short("strf", BITMAP_INFO_HEADER_LEN, payload.len()));
        }

        let r = &mut reader(payload, big_endian);
        Ok(Self {
            size: r.u32()?,
            width: r.i32()?,
            height: r.i32()?,
            planes: r.u16()?,
            bit_count: r.u16()?,
            compression: r.array()?,
            size_image: r.u32()?,
            x_pels_per_meter: r.i32()?,
            y_pels_per_meter: r.i32()?,
            clr_used: r.u32()?,
            clr_important: r.u32()?,
        })
    }

    /// Compression FourCC, or `raw` for uncompressed RGB.
    pub fn codec_name(&self) -> String {
        match self.compression {
            [0, 0, 0, 0] => "raw".to_string(),
            fourcc => FourCC(fourcc).to_string().trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::node::NodeKind;
    use crate::structs::riff::RiffChunk;

    fn node_for(chunk: &impl RiffChunk, len: usize) -> Node {
        Node {
            kind: NodeKind::RiffChunk {
                list_type: None,
                big_endian: false,
            },
            identifier: chunk.chunk_id().to_vec(),
            header_length: 8,
            data_offset: 8,
            data_length: len as u64,
            trailer_length: 0,
            complete: true,
        }
    }

    #[test]
    fn stream_header_roundtrip() {
        let strh = AviStreamHeader {
            fcc_type: STREAM_VIDEO,
            fcc_handler: *b"H264",
            scale: 1001,
            rate: 30_000,
            length: 300,
            frame: [0, 0, 1920, 1080],
            ..Default::default()
        };

        let data = strh.chunk_data();
        assert_eq!(data.len(), 56);

        let decoded = AviStreamHeader::decode(&node_for(&strh, data.len()), &data).unwrap();
        assert_eq!(decoded, strh);
        assert_eq!(decoded.media_type(), MediaType::Video);
        assert!((decoded.rate().unwrap() - 29.97).abs() < 0.001);

        // 48-byte headers without the frame rectangle
        let short = AviStreamHeader::decode(&node_for(&strh, 48), &data[..48]).unwrap();
        assert_eq!(short.frame, [0; 4]);
        assert_eq!(short.length, 300);
    }

    #[test]
    fn main_and_bitmap_headers() {
        let avih = AviMainHeader {
            micro_sec_per_frame: 40_000,
            total_frames: 250,
            streams: 2,
            width: 720,
            height: 576,
            ..Default::default()
        };
        let data = avih.chunk_data();
        assert_eq!(data.len(), AVI_MAIN_HEADER_LEN);
        assert_eq!(
            AviMainHeader::decode(&node_for(&avih, data.len()), &data).unwrap(),
            avih
        );

        let bih = BitmapInfoHeader {
            size: 40,
            width: 720,
            height: -576,
            planes: 1,
            bit_count: 24,
            compression: *b"MJPG",
            ..Default::default()
        };
        let data = bih.chunk_data();
        assert_eq!(data.len(), BITMAP_INFO_HEADER_LEN);
        let decoded = BitmapInfoHeader::decode(&node_for(&bih, data.len()), &data).unwrap();
        assert_eq!(decoded, bih);
        assert_eq!(decoded.codec_name(), "MJPG");

        assert!(AviMainHeader::decode(&node_for(&bih, data.len()), &data).is_err());
    }
}
