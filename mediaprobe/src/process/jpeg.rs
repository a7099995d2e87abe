use std::io::{Read, Seek};

use anyhow::{Result, anyhow, bail};
use log::Level::Warn;
use log::{debug, trace};

use crate::log_or_err;
use crate::process::tracks::TrackSource;
use crate::process::{RecordReader, ReaderOptions, SCAN_WINDOW};
use crate::structs::image::jpeg::{
    EOI, FrameHeader, MARKER_PREFIX, RST0, RST7, SOI, SOS, is_standalone, is_start_of_frame,
};
use crate::structs::node::{Node, NodeKind};
use crate::structs::track::{MediaType, Track};
use crate::utils::errors::JpegError;
use crate::utils::source::Source;

/// Bytes inspected per step while skipping fill bytes.
const MARKER_WINDOW: usize = 16;

/// Cursor over JPEG marker segments.
///
/// The SOS node's data spans the scan header and the entropy-coded segment
/// that follows it. Enumeration ends after EOI.
#[derive(Debug)]
pub struct JpegReader<R> {
    source: Source<R>,
    options: ReaderOptions,
    offset: u64,
    first_record: u64,
    /// End of the EOI segment once it has been read.
    end_of_image: Option<u64>,
    tracks: Option<Vec<Track>>,
}

impl<R: Read + Seek> JpegReader<R> {
    pub fn new(inner: R, options: ReaderOptions) -> Result<Self> {
        Self::from_source(Source::new(inner)?, options)
    }

    pub fn from_source(mut source: Source<R>, options: ReaderOptions) -> Result<Self> {
        let mut soi = [0u8; 2];
        let head = source.read_up_to(0, soi.len())?;
        soi[..head.len()].copy_from_slice(&head);
        if soi != [MARKER_PREFIX, SOI] {
            bail!(JpegError::MissingSoi(soi));
        }

        Ok(Self {
            source,
            options,
            offset: 0,
            first_record: 0,
            end_of_image: None,
            tracks: None,
        })
    }

    /// Marker byte at `offset` and the length of the prefix including fill
    /// bytes, `None` when only fill bytes remain.
    fn marker_at(&mut self, offset: u64) -> Result<Option<(u8, u64)>> {
        let mut pos = offset;
        loop {
            let window = self.source.read_up_to(pos, MARKER_WINDOW)?;
            let Some(&first) = window.first() else {
                return Ok(None);
            };
            if pos == offset && first != MARKER_PREFIX {
                bail!(JpegError::ExpectedMarker {
                    offset,
                    found: first,
                });
            }

            if let Some(i) = window.iter().position(|&b| b != MARKER_PREFIX) {
                return Ok(Some((window[i], pos + i as u64 + 1 - offset)));
            }
            pos += window.len() as u64;
        }
    }

    /// Start of the next marker after entropy-coded data, skipping stuffed
    /// zeros, restart markers and fill bytes. Stream end when none follows.
    fn scan_end(&mut self, from: u64) -> Result<u64> {
        let len = self.source.len();
        let mut pos = from;

        while pos < len {
            let window = self.source.read_up_to(pos, SCAN_WINDOW)?;
            let last = pos + window.len() as u64 == len;
            let limit = window.len().saturating_sub(1);

            let found = (0..limit).find(|&i| {
                window[i] == MARKER_PREFIX
                    && !matches!(window[i + 1], 0x00 | RST0..=RST7 | MARKER_PREFIX)
            });

            if let Some(i) = found {
                return Ok(pos + i as u64);
            }
            if last || limit == 0 {
                break;
            }
            pos += limit as u64;
        }

        Ok(len)
    }

    /// Frame headers of every SOFn segment.
    pub fn frame_headers(&mut self) -> Result<Vec<FrameHeader>> {
        let saved = self.offset;
        self.rewind();
        let headers = self.collect_frame_headers();
        self.offset = saved;
        headers
    }

    fn collect_frame_headers(&mut self) -> Result<Vec<FrameHeader>> {
        let mut headers = Vec::new();
        while let Some(node) = self.read_next()? {
            let is_frame =
                matches!(node.kind, NodeKind::JpegSegment { marker } if is_start_of_frame(marker));
            if is_frame && node.is_complete() {
                let payload = self.read_payload(&node)?;
                headers.push(FrameHeader::decode(&node, &payload)?);
            }
        }

        Ok(headers)
    }
}

impl<R: Read + Seek> RecordReader for JpegReader<R> {
    type Stream = R;

    cursor_state!();

    fn try_read_next(&mut self) -> Result<Option<Node>> {
        let offset = self.offset;
        let ended = self.end_of_image.is_some_and(|end| offset >= end);
        if ended || self.source.remaining_from(offset) == 0 {
            return Ok(None);
        }

        let Some((marker, prefix_length)) = self.marker_at(offset)? else {
            log_or_err!(
                self.options,
                Warn,
                anyhow!("Stream ends in fill bytes at {offset}")
            );
            return Ok(None);
        };

        let mut node = Node {
            kind: NodeKind::JpegSegment { marker },
            identifier: vec![MARKER_PREFIX, marker],
            header_length: prefix_length,
            data_offset: offset + prefix_length,
            data_length: 0,
            trailer_length: 0,
            complete: true,
        };

        if !is_standalone(marker) {
            let length_offset = node.data_offset;
            node.header_length += 2;
            node.data_offset += 2;

            if self.source.remaining_from(length_offset) < 2 {
                node.complete = false;
            } else {
                let segment_length = u16::from_be_bytes(self.source.read_array(length_offset)?);
                if segment_length < 2 {
                    bail!(JpegError::InvalidSegmentLength(segment_length));
                }

                node.data_length = segment_length as u64 - 2;
                node.complete = node.data_length <= self.source.remaining_from(node.data_offset);
            }

            if marker == SOS && node.complete {
                let scan_end = self.scan_end(node.data_offset + node.data_length)?;
                node.data_length = scan_end - node.data_offset;
            }
        }

        if marker == EOI {
            self.end_of_image = Some(node.end());
            let trailing = self.source.remaining_from(node.end());
            if trailing > 0 {
                debug!("{trailing} bytes after EOI");
            }
        }

        self.offset = node.end();

        trace!("{node}");
        Ok(Some(node))
    }
}

impl<R: Read + Seek> TrackSource for JpegReader<R> {
    /// One image track per frame header.
    fn assemble_tracks(&mut self) -> Result<Vec<Track>> {
        Ok(self
            .frame_headers()?
            .iter()
            .enumerate()
            .map(|(index, sof)| Track {
                id: index as u32 + 1,
                media_type: MediaType::Image,
                sample_count: 1,
                width: sof.width as u32,
                height: sof.height as u32,
                channels: sof.components as u32,
                bit_depth: sof.precision as u32,
                codec: sof.codec_name().to_string(),
                ..Default::default()
            })
            .collect())
    }

    fn track_cache(&mut self) -> &mut Option<Vec<Track>> {
        &mut self.tracks
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::structs::image::jpeg::{APP0, DQT, SOF0};
    use crate::utils::errors::RecordError;

    fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let length = (payload.len() as u16 + 2).to_be_bytes();
        [&[MARKER_PREFIX, marker], length.as_slice(), payload].concat()
    }

    fn sample_image() -> Vec<u8> {
        let mut bytes = vec![MARKER_PREFIX, SOI];
        bytes.extend(segment(APP0, b"JFIF\0\x01\x02\0\0\x01\0\x01\0\0"));
        bytes.push(MARKER_PREFIX);
        bytes.extend(segment(DQT, &[0x01; 65]));
        bytes.extend(segment(
            SOF0,
            &[8, 0x01, 0xE0, 0x02, 0x80, 3, 1, 0x22, 0, 2, 0x11, 1, 3, 0x11, 1],
        ));
        bytes.extend(segment(SOS, &[3, 1, 0x00, 2, 0x11, 3, 0x11, 0, 63, 0]));
        bytes.extend([0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD0, 0x56]);
        bytes.extend([MARKER_PREFIX, EOI, 0, 0, 0]);
        bytes
    }

    #[test]
    fn segments_and_scan() {
        let mut reader =
            JpegReader::new(Cursor::new(sample_image()), ReaderOptions::default()).unwrap();
        let nodes: Vec<_> = reader.nodes().collect::<Result<_>>().unwrap();

        let names: Vec<_> = nodes.iter().map(|n| n.name()).collect();
        assert_eq!(names, ["SOI", "APP0", "DQT", "SOF0", "SOS", "EOI"]);

        assert_eq!(nodes[0].total_size(), 2);
        assert_eq!((nodes[1].offset(), nodes[1].data_length), (2, 14));

        let dqt = &nodes[2];
        assert_eq!(dqt.offset(), 20);
        assert_eq!(dqt.header_length, 5);
        assert_eq!(dqt.end(), 90);

        let sos = &nodes[4];
        assert_eq!(sos.data_offset, 113);
        assert_eq!(sos.data_length, 17);
        assert_eq!(nodes[5].offset(), 130);
        assert_eq!(reader.offset(), 132);

        let tracks = reader.get_tracks().unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].media_type, MediaType::Image);
        assert_eq!((tracks[0].width, tracks[0].height), (640, 480));
        assert_eq!((tracks[0].channels, tracks[0].bit_depth), (3, 8));
        assert_eq!(tracks[0].codec, "jpeg");
        assert_eq!(reader.offset(), 132);
    }

    #[test]
    fn structural_faults() {
        let err = JpegReader::new(Cursor::new(b"\x89PNG".to_vec()), ReaderOptions::default())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<JpegError>(),
            Some(JpegError::MissingSoi([0x89, b'P']))
        ));

        let mut reader =
            JpegReader::new(Cursor::new(vec![0xFF, SOI, 0x00, 0x01]), Default::default()).unwrap();
        let results: Vec<_> = reader.nodes().collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[1].as_ref().unwrap_err().downcast_ref::<JpegError>(),
            Some(JpegError::ExpectedMarker { offset: 2, found: 0 })
        ));

        let mut reader = JpegReader::new(
            Cursor::new(vec![0xFF, SOI, 0xFF, APP0, 0x00, 0x01]),
            Default::default(),
        )
        .unwrap();
        reader.read_next().unwrap();
        let err = reader.read_next().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<JpegError>(),
            Some(JpegError::InvalidSegmentLength(1))
        ));
    }

    #[test]
    fn truncated_segment_is_incomplete_then_overrun() {
        let bytes = vec![0xFF, SOI, 0xFF, APP0, 0x00, 0x10, b'J', b'F', b'I'];
        let mut reader = JpegReader::new(Cursor::new(bytes), Default::default()).unwrap();
        reader.read_next().unwrap();

        let app0 = reader.read_next().unwrap().unwrap();
        assert!(!app0.is_complete());
        assert_eq!(app0.data_length, 14);

        let err = reader.read_next().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RecordError>(),
            Some(RecordError::Overrun { offset: 20, len: 9 })
        ));
    }
}
