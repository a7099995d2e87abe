use anyhow::Result;

use crate::structs::flac::{BlockType, expect_block};
use crate::structs::node::Node;
use crate::utils::source::ByteReader;

/// Embedded artwork. The image itself is located, not copied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Picture {
    pub picture_type: u32,
    pub mime_type: String,
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// Zero for non-indexed images.
    pub colors: u32,
    /// Absolute stream offset of the image data.
    pub data_offset: u64,
    pub data_length: u32,
}

impl Picture {
    pub fn decode(node: &Node, payload: &[u8]) -> Result<Self> {
        expect_block(node, BlockType::Picture)?;

        let reader = &mut ByteReader::be(payload);
        let picture_type = reader.u32()?;
        let mime_len = reader.u32()? as usize;
        let mime_type = String::from_utf8_lossy(reader.bytes(mime_len)?).into_owned();
        let desc_len = reader.u32()? as usize;
        let description = String::from_utf8_lossy(reader.bytes(desc_len)?).into_owned();

        let mut picture = Self {
            picture_type,
            mime_type,
            description,
            width: reader.u32()?,
            height: reader.u32()?,
            depth: reader.u32()?,
            colors: reader.u32()?,
            data_length: reader.u32()?,
            ..Default::default()
        };
        picture.data_offset = node.data_offset + reader.position() as u64;
        reader.skip(picture.data_length as usize)?;

        Ok(picture)
    }

    pub fn type_name(&self) -> &'static str {
        match self.picture_type {
            0 => "Other",
            1 => "File icon",
            2 => "Other file icon",
            3 => "Front cover",
            4 => "Back cover",
            5 => "Leaflet page",
            6 => "Media",
            7 => "Lead artist",
            8 => "Artist",
            9 => "Conductor",
            10 => "Band",
            11 => "Composer",
            12 => "Lyricist",
            13 => "Recording location",
            14 => "During recording",
            15 => "During performance",
            16 => "Screen capture",
            17 => "Bright coloured fish",
            18 => "Illustration",
            19 => "Band logotype",
            20 => "Publisher logotype",
            _ => "Reserved",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::node::NodeKind;

    #[test]
    fn locates_image_data() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&3u32.to_be_bytes());
        payload.extend_from_slice(&9u32.to_be_bytes());
        payload.extend_from_slice(b"image/png");
        payload.extend_from_slice(&0u32.to_be_bytes());
        for v in [640u32, 480, 24, 0, 5] {
            payload.extend_from_slice(&v.to_be_bytes());
        }
        payload.extend_from_slice(b"\x89PNG\r");

        let node = Node {
            kind: NodeKind::FlacMetadata {
                block_type: 6,
                last: true,
            },
            identifier: vec![0x86, 0, 0, payload.len() as u8],
            header_length: 4,
            data_offset: 100,
            data_length: payload.len() as u64,
            trailer_length: 0,
            complete: true,
        };

        let picture = Picture::decode(&node, &payload).unwrap();
        assert_eq!(picture.type_name(), "Front cover");
        assert_eq!(picture.mime_type, "image/png");
        assert_eq!((picture.width, picture.height), (640, 480));
        assert_eq!(picture.data_offset, 100 + 4 + 4 + 9 + 4 + 20);
        assert_eq!(picture.data_length, 5);

        let mut short = node.clone();
        short.kind = NodeKind::FlacMetadata {
            block_type: 4,
            last: false,
        };
        assert!(Picture::decode(&short, &payload).is_err());
        assert!(Picture::decode(&node, &payload[..payload.len() - 1]).is_err());
    }
}
