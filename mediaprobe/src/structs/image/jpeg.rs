use anyhow::{Result, bail};

use crate::structs::node::{Node, NodeKind};
use crate::utils::errors::DecodeError;
use crate::utils::source::ByteReader;

pub const MARKER_PREFIX: u8 = 0xFF;

pub const TEM: u8 = 0x01;
pub const SOF0: u8 = 0xC0;
pub const DHT: u8 = 0xC4;
pub const JPG: u8 = 0xC8;
pub const DAC: u8 = 0xCC;
pub const RST0: u8 = 0xD0;
pub const RST7: u8 = 0xD7;
pub const SOI: u8 = 0xD8;
pub const EOI: u8 = 0xD9;
pub const SOS: u8 = 0xDA;
pub const DQT: u8 = 0xDB;
pub const DNL: u8 = 0xDC;
pub const DRI: u8 = 0xDD;
pub const DHP: u8 = 0xDE;
pub const EXP: u8 = 0xDF;
pub const APP0: u8 = 0xE0;
pub const APP15: u8 = 0xEF;
pub const COM: u8 = 0xFE;

pub const FRAME_HEADER_MIN_LEN: usize = 6;

/// Markers without a length field.
#[inline(always)]
pub const fn is_standalone(marker: u8) -> bool {
    matches!(marker, TEM | RST0..=RST7 | SOI | EOI)
}

/// Start-of-frame markers. C4, C8 and CC share the range but are DHT, JPG
/// and DAC.
#[inline(always)]
pub const fn is_start_of_frame(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xCF) && !matches!(marker, DHT | JPG | DAC)
}

pub fn marker_name(marker: u8) -> String {
    let name = match marker {
        TEM => "TEM",
        DHT => "DHT",
        JPG => "JPG",
        DAC => "DAC",
        SOI => "SOI",
        EOI => "EOI",
        SOS => "SOS",
        DQT => "DQT",
        DNL => "DNL",
        DRI => "DRI",
        DHP => "DHP",
        EXP => "EXP",
        COM => "COM",
        m if is_start_of_frame(m) => return format!("SOF{}", m - SOF0),
        m @ RST0..=RST7 => return format!("RST{}", m - RST0),
        m @ APP0..=APP15 => return format!("APP{}", m - APP0),
        m => return format!("{MARKER_PREFIX:02X}{m:02X}"),
    };
    name.to_string()
}

/// SOFn segment: sample precision, dimensions and component count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub marker: u8,
    pub precision: u8,
    pub height: u16,
    pub width: u16,
    pub components: u8,
}

impl FrameHeader {
    pub fn decode(node: &Node, payload: &[u8]) -> Result<Self> {
        let marker = match node.kind {
            NodeKind::JpegSegment { marker } if is_start_of_frame(marker) => marker,
            _ => bail!(DecodeError::UnexpectedRecord {
                expected: "SOFn".to_string(),
                found: node.name(),
            }),
        };

        if payload.len() < FRAME_HEADER_MIN_LEN {
            bail!(DecodeError::PayloadTooShort {
                record: "SOFn",
                expected: FRAME_HEADER_MIN_LEN,
                actual: payload.len(),
            });
        }

        let r = &mut ByteReader::be(payload);
        Ok(Self {
            marker,
            precision: r.u8()?,
            height: r.u16()?,
            width: r.u16()?,
            components: r.u8()?,
        })
    }

    pub fn codec_name(&self) -> &'static str {
        match self.marker {
            0xC2 | 0xC6 | 0xCA | 0xCE => "jpeg_progressive",
            0xC3 | 0xC7 | 0xCB | 0xCF => "jpeg_lossless",
            _ => "jpeg",
        }
    }
}
