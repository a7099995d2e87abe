//! The format-agnostic record value produced by every reader.

use std::fmt::{Debug, Display, Formatter};

/// Four-character code naming RIFF and PNG chunks.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.get(..4)?.try_into().ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl Display for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02X}")?;
            }
        }
        Ok(())
    }
}

impl Debug for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "FourCC({self})")
    }
}

impl From<[u8; 4]> for FourCC {
    fn from(value: [u8; 4]) -> Self {
        Self(value)
    }
}

impl std::str::FromStr for FourCC {
    type Err = String;

    /// Parses up to four ASCII characters, space padded on the right.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 4 || !s.is_ascii() {
            return Err(format!("'{s}' is not a four-character code"));
        }

        let mut bytes = [b' '; 4];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Ok(Self(bytes))
    }
}

/// What kind of record a [`Node`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    FlacMetadata { block_type: u8, last: bool },
    FlacFrame,
    /// `list_type` is set for `RIFF`/`RIFX`/`RF64`/`BW64`/`LIST` containers.
    RiffChunk {
        list_type: Option<FourCC>,
        big_endian: bool,
    },
    MxfKlv,
    JpegSegment { marker: u8 },
    PngChunk,
}

impl NodeKind {
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            NodeKind::RiffChunk {
                list_type: Some(_),
                ..
            }
        )
    }
}

/// One self-describing record located in a stream.
///
/// Holds offsets into the stream it came from, never payload bytes. Use
/// [`RecordReader::read_payload`](crate::process::RecordReader::read_payload)
/// to materialize the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    /// FourCC, Universal Label, JPEG marker pair, FLAC block header or, for
    /// FLAC frames, the complete frame header.
    pub identifier: Vec<u8>,
    pub header_length: u64,
    /// Absolute offset of the payload.
    pub data_offset: u64,
    pub data_length: u64,
    /// Alignment pad or checksum following the payload.
    pub trailer_length: u64,
    pub complete: bool,
}

impl Node {
    /// Absolute offset of the first header byte.
    #[inline(always)]
    pub fn offset(&self) -> u64 {
        self.data_offset - self.header_length
    }

    #[inline(always)]
    pub fn total_size(&self) -> u64 {
        self.header_length
            .saturating_add(self.data_length)
            .saturating_add(self.trailer_length)
    }

    /// Offset just past the record, trailer included.
    ///
    /// Saturates at `u64::MAX` for declared lengths no stream can hold, so a
    /// cursor advanced to it always lands past the end.
    #[inline(always)]
    pub fn end(&self) -> u64 {
        self.data_offset
            .saturating_add(self.data_length)
            .saturating_add(self.trailer_length)
    }

    #[inline(always)]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn fourcc(&self) -> Option<FourCC> {
        match self.kind {
            NodeKind::RiffChunk { .. } | NodeKind::PngChunk => FourCC::from_slice(&self.identifier),
            _ => None,
        }
    }

    /// The list type of a RIFF container, otherwise the chunk id.
    pub fn effective_fourcc(&self) -> Option<FourCC> {
        match self.kind {
            NodeKind::RiffChunk {
                list_type: Some(list_type),
                ..
            } => Some(list_type),
            _ => self.fourcc(),
        }
    }

    pub fn is_fourcc(&self, id: &[u8; 4]) -> bool {
        self.fourcc().is_some_and(|f| f.0 == *id)
    }

    /// Human readable record name.
    pub fn name(&self) -> String {
        match self.kind {
            NodeKind::FlacMetadata { block_type, .. } => {
                crate::structs::flac::BlockType::from(block_type).to_string()
            }
            NodeKind::FlacFrame => "FRAME".to_string(),
            NodeKind::RiffChunk { list_type, .. } => match (self.fourcc(), list_type) {
                (Some(id), Some(list_type)) => format!("{id}:{list_type}"),
                (Some(id), None) => id.to_string(),
                _ => "?".to_string(),
            },
            NodeKind::MxfKlv => crate::structs::mxf::label::name_of(&self.identifier)
                .map(str::to_string)
                .unwrap_or_else(|| {
                    self.identifier
                        .iter()
                        .map(|b| format!("{b:02x}"))
                        .collect::<Vec<_>>()
                        .join(".")
                }),
            NodeKind::JpegSegment { marker } => crate::structs::image::marker_name(marker),
            NodeKind::PngChunk => self.fourcc().map(|f| f.to_string()).unwrap_or_default(),
        }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} @ {} header {} data {}{}{}",
            self.name(),
            self.offset(),
            self.header_length,
            self.data_length,
            if self.trailer_length > 0 {
                format!(" +{}", self.trailer_length)
            } else {
                String::new()
            },
            if self.complete { "" } else { " (incomplete)" }
        )
    }
}
