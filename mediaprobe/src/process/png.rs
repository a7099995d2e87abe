use std::io::{Read, Seek};

use anyhow::{Result, anyhow, bail};
use log::Level::Warn;
use log::{debug, trace};

use crate::log_or_err;
use crate::process::tracks::TrackSource;
use crate::process::{NodeFilter, RecordReader, ReaderOptions, SCAN_WINDOW};
use crate::structs::image::png::{
    CHUNK_CRC_LEN, CHUNK_HEADER_LEN, IEND, IHDR, ImageHeader, PNG_SIGNATURE,
};
use crate::structs::node::{FourCC, Node, NodeKind};
use crate::structs::track::{MediaType, Track};
use crate::utils::crc::PNG_CHUNK_CRC;
use crate::utils::errors::PngError;
use crate::utils::source::Source;

/// Cursor over PNG chunks. Each chunk's CRC-32 is checked as it is read.
#[derive(Debug)]
pub struct PngReader<R> {
    source: Source<R>,
    options: ReaderOptions,
    offset: u64,
    first_record: u64,
    end_of_image: Option<u64>,
    tracks: Option<Vec<Track>>,
}

impl<R: Read + Seek> PngReader<R> {
    pub fn new(inner: R, options: ReaderOptions) -> Result<Self> {
        Self::from_source(Source::new(inner)?, options)
    }

    pub fn from_source(mut source: Source<R>, options: ReaderOptions) -> Result<Self> {
        if source.read_up_to(0, PNG_SIGNATURE.len())? != PNG_SIGNATURE {
            bail!(PngError::MissingSignature);
        }

        Ok(Self {
            source,
            options,
            offset: PNG_SIGNATURE.len() as u64,
            first_record: PNG_SIGNATURE.len() as u64,
            end_of_image: None,
            tracks: None,
        })
    }

    /// CRC-32 over the chunk type and data.
    fn chunk_crc(&mut self, node: &Node) -> Result<u32> {
        let mut crc = PNG_CHUNK_CRC.update(PNG_CHUNK_CRC.init, &node.identifier);

        let mut pos = node.data_offset;
        let end = node.data_offset + node.data_length;
        while pos < end {
            let len = (end - pos).min(SCAN_WINDOW as u64);
            crc = PNG_CHUNK_CRC.update(crc, &self.source.read_vec(pos, len)?);
            pos += len;
        }

        Ok(PNG_CHUNK_CRC.finalize(crc))
    }

    pub fn image_header(&mut self) -> Result<Option<ImageHeader>> {
        let filters = [NodeFilter::FourCC(FourCC::new(&IHDR))];
        let first = self.first_record;
        let node = self.read_records(first, CHUNK_HEADER_LEN, &filters).next();

        let Some(node) = node.transpose()? else {
            return Ok(None);
        };
        let payload = self.read_payload(&node)?;
        ImageHeader::decode(&node, &payload).map(Some)
    }
}

impl<R: Read + Seek> RecordReader for PngReader<R> {
    type Stream = R;

    cursor_state!();

    fn try_read_next(&mut self) -> Result<Option<Node>> {
        let offset = self.offset;
        let remaining = self.source.remaining_from(offset);
        let ended = self.end_of_image.is_some_and(|end| offset >= end);
        if ended || remaining == 0 {
            return Ok(None);
        }
        if remaining < CHUNK_HEADER_LEN + CHUNK_CRC_LEN {
            log_or_err!(
                self.options,
                Warn,
                anyhow!("{remaining} trailing bytes at {offset} do not form a chunk")
            );
            return Ok(None);
        }

        let header: [u8; CHUNK_HEADER_LEN as usize] = self.source.read_array(offset)?;
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;

        let node = Node {
            kind: NodeKind::PngChunk,
            identifier: header[4..].to_vec(),
            header_length: CHUNK_HEADER_LEN,
            data_offset: offset + CHUNK_HEADER_LEN,
            data_length: length,
            trailer_length: CHUNK_CRC_LEN,
            complete: length + CHUNK_CRC_LEN <= remaining - CHUNK_HEADER_LEN,
        };

        if node.complete {
            let calculated = self.chunk_crc(&node)?;
            let read = u32::from_be_bytes(self.source.read_array(node.data_offset + length)?);
            if calculated != read {
                log_or_err!(
                    self.options,
                    Warn,
                    anyhow!(PngError::CrcMismatch {
                        chunk: node.name(),
                        calculated,
                        read,
                    })
                );
            }
        }

        if node.is_fourcc(&IEND) {
            self.end_of_image = Some(node.end());
            let trailing = self.source.remaining_from(node.end());
            if trailing > 0 {
                debug!("{trailing} bytes after IEND");
            }
        }

        self.offset = node.end();

        trace!("{node}");
        Ok(Some(node))
    }
}

impl<R: Read + Seek> TrackSource for PngReader<R> {
    fn assemble_tracks(&mut self) -> Result<Vec<Track>> {
        let Some(ihdr) = self.image_header()? else {
            return Ok(Vec::new());
        };

        Ok(vec![Track {
            id: 1,
            media_type: MediaType::Image,
            sample_count: 1,
            width: ihdr.width,
            height: ihdr.height,
            channels: ihdr.channels(),
            bit_depth: ihdr.bit_depth as u32,
            codec: "png".to_string(),
            ..Default::default()
        }])
    }

    fn track_cache(&mut self) -> &mut Option<Vec<Track>> {
        &mut self.tracks
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::structs::image::png::IDAT;

    fn chunk(id: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let crc = PNG_CHUNK_CRC.checksum(&[id.as_slice(), data].concat());
        [
            (data.len() as u32).to_be_bytes().as_slice(),
            id,
            data,
            &crc.to_be_bytes(),
        ]
        .concat()
    }

    fn sample_image() -> Vec<u8> {
        let ihdr = ImageHeader {
            width: 16,
            height: 9,
            bit_depth: 8,
            color_type: 2,
            compression: 0,
            filter: 0,
            interlace: 0,
        };

        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend(chunk(&IHDR, &ihdr.to_bytes()));
        bytes.extend(chunk(&IDAT, &[0x78, 0x9C, 1, 2, 3, 4, 5, 6, 7, 8]));
        bytes.extend(chunk(&IEND, &[]));
        bytes.extend([0; 5]);
        bytes
    }

    #[test]
    fn chunks_and_track() {
        let mut reader =
            PngReader::new(Cursor::new(sample_image()), ReaderOptions::strict()).unwrap();
        let nodes: Vec<_> = reader.nodes().collect::<Result<_>>().unwrap();

        let names: Vec<_> = nodes.iter().map(|n| n.name()).collect();
        assert_eq!(names, ["IHDR", "IDAT", "IEND"]);
        assert_eq!(nodes[0].offset(), 8);
        assert_eq!(nodes[0].trailer_length, 4);
        assert_eq!(nodes[1].offset(), 33);
        assert_eq!(nodes[2].end(), 67);
        assert_eq!(reader.offset(), 67);

        let tracks = reader.get_tracks().unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!((tracks[0].width, tracks[0].height), (16, 9));
        assert_eq!((tracks[0].channels, tracks[0].bit_depth), (3, 8));
        assert_eq!(tracks[0].codec, "png");
        assert_eq!(reader.offset(), 67);
    }

    #[test]
    fn crc_mismatch_is_recoverable() {
        let mut bytes = sample_image();
        bytes[54] ^= 0xFF;

        let mut reader = PngReader::new(Cursor::new(bytes.clone()), Default::default()).unwrap();
        assert_eq!(reader.nodes().count(), 3);

        let mut reader = PngReader::new(Cursor::new(bytes), ReaderOptions::strict()).unwrap();
        let results: Vec<_> = reader.nodes().collect();
        assert_eq!(results.len(), 2);
        let err = results[1].as_ref().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PngError>(),
            Some(PngError::CrcMismatch { chunk, .. }) if chunk == "IDAT"
        ));
    }

    #[test]
    fn missing_signature() {
        let err = PngReader::new(Cursor::new(b"GIF89a".to_vec()), Default::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PngError>(),
            Some(PngError::MissingSignature)
        ));
    }
}
