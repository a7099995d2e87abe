use std::io::{Read, Seek};

use anyhow::{Result, anyhow, bail};
use log::Level::Warn;
use log::{debug, trace};

use crate::log_or_err;
use crate::process::tracks::TrackSource;
use crate::process::{RecordReader, ReaderOptions, SCAN_WINDOW};
use crate::structs::flac::frame_header::{BlockingStrategy, FrameHeader, MAX_FRAME_HEADER_LEN};
use crate::structs::flac::seek_table::SeekTable;
use crate::structs::flac::stream_info::StreamInfo;
use crate::structs::flac::vorbis_comment::VorbisComment;
use crate::structs::flac::{BLOCK_HEADER_LEN, BlockHeader, BlockType, FLAC_MARKER, is_frame_sync};
use crate::structs::node::{Node, NodeKind};
use crate::structs::track::{MediaType, Track};
use crate::utils::errors::FlacError;
use crate::utils::source::Source;

/// Cursor over a native FLAC stream.
///
/// Yields metadata blocks, then one node per audio frame. Frames have no
/// length field: a frame ends where the next valid frame header starts.
#[derive(Debug)]
pub struct FlacReader<R> {
    source: Source<R>,
    options: ReaderOptions,
    offset: u64,
    first_record: u64,
    metadata_done: bool,
    tracks: Option<Vec<Track>>,
}

impl<R: Read + Seek> FlacReader<R> {
    pub fn new(inner: R, options: ReaderOptions) -> Result<Self> {
        Self::from_source(Source::new(inner)?, options)
    }

    pub fn from_source(mut source: Source<R>, options: ReaderOptions) -> Result<Self> {
        let mut marker = [0u8; 4];
        let head = source.read_up_to(0, marker.len())?;
        marker[..head.len()].copy_from_slice(&head);
        if marker != FLAC_MARKER {
            bail!(FlacError::MissingMarker(marker));
        }

        Ok(Self {
            source,
            options,
            offset: FLAC_MARKER.len() as u64,
            first_record: FLAC_MARKER.len() as u64,
            metadata_done: false,
            tracks: None,
        })
    }

    /// Metadata blocks up to and including the one flagged last. The cursor
    /// offset is left untouched.
    pub fn metadata_blocks(&mut self) -> Result<Vec<Node>> {
        let saved = self.offset;
        let saved_done = self.metadata_done;
        self.offset = self.first_record;
        self.metadata_done = false;

        let mut blocks = Vec::new();
        let result = loop {
            match self.read_next() {
                Ok(Some(node)) => match node.kind {
                    NodeKind::FlacMetadata { last, .. } => {
                        blocks.push(node);
                        if last {
                            break Ok(());
                        }
                    }
                    _ => break Ok(()),
                },
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        self.offset = saved;
        self.metadata_done = saved_done;
        result.map(|_| blocks)
    }

    fn first_block_of(&mut self, block_type: BlockType) -> Result<Option<(Node, Vec<u8>)>> {
        let node = self.metadata_blocks()?.into_iter().find(|n| {
            matches!(n.kind, NodeKind::FlacMetadata { block_type: t, .. } if BlockType::from(t) == block_type)
        });

        match node {
            Some(node) => {
                let payload = self.read_payload(&node)?;
                Ok(Some((node, payload)))
            }
            None => Ok(None),
        }
    }

    pub fn stream_info(&mut self) -> Result<Option<StreamInfo>> {
        self.first_block_of(BlockType::StreamInfo)?
            .map(|(node, payload)| StreamInfo::decode(&node, &payload))
            .transpose()
    }

    pub fn vorbis_comment(&mut self) -> Result<Option<VorbisComment>> {
        let options = self.options;
        self.first_block_of(BlockType::VorbisComment)?
            .map(|(node, payload)| VorbisComment::decode(&node, &payload, &options))
            .transpose()
    }

    /// The seek table, or `None` when the stream has none.
    pub fn seek_table(&mut self) -> Result<Option<SeekTable>> {
        self.first_block_of(BlockType::SeekTable)?
            .map(|(node, payload)| SeekTable::decode(&node, &payload))
            .transpose()
    }

    fn read_block(&mut self, bytes: [u8; 4]) -> Result<Node> {
        let offset = self.offset;
        let header = BlockHeader::from_bytes(&bytes);
        if header.block_type == BlockType::Invalid {
            bail!(FlacError::InvalidBlockType(offset));
        }

        let available = self.source.remaining_from(offset + BLOCK_HEADER_LEN);
        let node = Node {
            kind: NodeKind::FlacMetadata {
                block_type: header.block_type.into(),
                last: header.last,
            },
            identifier: bytes.to_vec(),
            header_length: BLOCK_HEADER_LEN,
            data_offset: offset + BLOCK_HEADER_LEN,
            data_length: header.length as u64,
            trailer_length: 0,
            complete: header.length as u64 <= available,
        };

        self.metadata_done |= header.last;
        self.offset = node.end();

        Ok(node)
    }

    fn read_frame(&mut self) -> Result<Node> {
        let offset = self.offset;
        let window = self.source.read_up_to(offset, MAX_FRAME_HEADER_LEN)?;
        let (header, identifier) = FrameHeader::parse(&window)?;

        let data_offset = offset + identifier.len() as u64;
        let end = self.next_frame(data_offset, header.blocking_strategy)?;

        let node = Node {
            kind: NodeKind::FlacFrame,
            header_length: identifier.len() as u64,
            identifier,
            data_offset,
            data_length: end - data_offset,
            trailer_length: 0,
            complete: true,
        };

        self.offset = end;

        Ok(node)
    }

    /// Offset of the next frame header from `from` on, or the stream end.
    ///
    /// A candidate must carry the sync code, parse with a matching CRC-8 and
    /// keep the blocking strategy.
    fn next_frame(&mut self, from: u64, strategy: BlockingStrategy) -> Result<u64> {
        let len = self.source.len();
        let mut pos = from;

        while pos < len {
            let window = self.source.read_up_to(pos, SCAN_WINDOW)?;
            let last = (window.len() as u64) < SCAN_WINDOW as u64 || pos + window.len() as u64 == len;
            let limit = if last {
                window.len().saturating_sub(1)
            } else {
                window.len() - MAX_FRAME_HEADER_LEN
            };

            let found = (0..limit).find(|&i| {
                is_frame_sync(window[i], window[i + 1])
                    && FrameHeader::parse(&window[i..])
                        .is_ok_and(|(h, _)| h.blocking_strategy == strategy)
            });

            if let Some(i) = found {
                return Ok(pos + i as u64);
            }
            if last {
                break;
            }
            pos += limit as u64;
        }

        Ok(len)
    }
}

impl<R: Read + Seek> RecordReader for FlacReader<R> {
    type Stream = R;

    cursor_state!();

    fn try_read_next(&mut self) -> Result<Option<Node>> {
        if self.source.remaining_from(self.offset) < BLOCK_HEADER_LEN {
            return Ok(None);
        }

        let bytes: [u8; 4] = self.source.read_array(self.offset)?;
        let node = if is_frame_sync(bytes[0], bytes[1]) {
            self.read_frame()?
        } else if !self.metadata_done {
            self.read_block(bytes)?
        } else {
            // Garbage between the metadata and the first frame, or between
            // frames.
            let start = self.offset;
            let Some(next) = self.resync(start)? else {
                return Ok(None);
            };
            log_or_err!(
                self.options,
                Warn,
                anyhow!("Skipped {} bytes at {start} to the next FLAC frame", next - start)
            );
            self.offset = next;
            self.read_frame()?
        };

        trace!("{node}");
        Ok(Some(node))
    }
}

impl<R: Read + Seek> FlacReader<R> {
    fn resync(&mut self, from: u64) -> Result<Option<u64>> {
        let len = self.source.len();
        for strategy in [BlockingStrategy::Fixed, BlockingStrategy::Variable] {
            let next = self.next_frame(from, strategy)?;
            if next < len {
                return Ok(Some(next));
            }
        }

        Ok(None)
    }
}

impl<R: Read + Seek> TrackSource for FlacReader<R> {
    /// One audio track described by StreamInfo, titled from VorbisComment.
    fn assemble_tracks(&mut self) -> Result<Vec<Track>> {
        let Some(si) = self.stream_info()? else {
            debug!("No STREAMINFO block, no tracks");
            return Ok(Vec::new());
        };

        let name = self
            .vorbis_comment()?
            .and_then(|vc| vc.title().map(str::to_string));

        Ok(vec![Track {
            id: 1,
            name,
            sample_count: si.total_samples,
            duration: si.duration(),
            sample_rate: si.sample_rate as f64,
            media_type: MediaType::Audio,
            codec: "flac".to_string(),
            channels: si.channels as u32,
            bit_depth: si.bits_per_sample as u32,
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
    use std::time::Duration;

    use super::*;
    use crate::structs::flac::frame_header::ChannelAssignment;
    use crate::utils::errors::RecordError;

    fn stream_info() -> StreamInfo {
        StreamInfo {
            min_block_size: 4096,
            max_block_size: 4096,
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
            total_samples: 441_000,
            ..Default::default()
        }
    }

    fn block(block_type: BlockType, last: bool, payload: &[u8]) -> Vec<u8> {
        let header = BlockHeader {
            last,
            block_type,
            length: payload.len() as u32,
        };
        [header.to_bytes().as_slice(), payload].concat()
    }

    fn frame(number: u64, payload_len: usize) -> Vec<u8> {
        let header = FrameHeader {
            blocking_strategy: BlockingStrategy::Fixed,
            block_size: 4096,
            sample_rate: 44_100,
            channel_assignment: ChannelAssignment::Independent(2),
            bits_per_sample: Some(16),
            number,
            crc8: 0,
        };
        let mut bytes = header.to_bytes().unwrap();
        bytes.resize(bytes.len() + payload_len, 0x00);
        bytes
    }

    fn flac(blocks: &[Vec<u8>], frames: &[Vec<u8>]) -> Cursor<Vec<u8>> {
        let mut bytes = FLAC_MARKER.to_vec();
        blocks.iter().chain(frames).for_each(|b| bytes.extend(b));
        Cursor::new(bytes)
    }

    #[test]
    fn single_stream_info_track() {
        let si = stream_info().to_bytes().unwrap();
        let mut reader = FlacReader::new(
            flac(&[block(BlockType::StreamInfo, true, &si)], &[]),
            ReaderOptions::default(),
        )
        .unwrap();

        let tracks = reader.get_tracks().unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].duration, Duration::from_secs(10));
        assert_eq!(tracks[0].sample_rate, 44_100.0);
        assert_eq!(tracks[0].channels, 2);
        assert_eq!(tracks[0].bit_depth, 16);
        assert_eq!(tracks[0].codec, "flac");
        assert_eq!(reader.offset(), 4);
    }

    #[test]
    fn title_from_vorbis_comment() {
        let si = stream_info().to_bytes().unwrap();
        let vc = VorbisComment {
            vendor: "reference libFLAC".to_string(),
            comments: vec![("TITLE".to_string(), "Etude".to_string())],
        }
        .to_bytes();

        let mut reader = FlacReader::new(
            flac(
                &[
                    block(BlockType::StreamInfo, false, &si),
                    block(BlockType::VorbisComment, true, &vc),
                ],
                &[],
            ),
            ReaderOptions::default(),
        )
        .unwrap();

        assert_eq!(reader.get_tracks().unwrap()[0].name.as_deref(), Some("Etude"));
        assert!(reader.seek_table().unwrap().is_none());
    }

    #[test]
    fn blocks_then_frames() {
        let si = stream_info().to_bytes().unwrap();
        let mut reader = FlacReader::new(
            flac(
                &[
                    block(BlockType::StreamInfo, false, &si),
                    block(BlockType::Padding, true, &[0; 10]),
                ],
                &[frame(0, 100), frame(1, 57), frame(2, 3)],
            ),
            ReaderOptions::default(),
        )
        .unwrap();

        let nodes: Vec<_> = reader.nodes().collect::<Result<_>>().unwrap();
        assert_eq!(nodes.len(), 5);
        assert_eq!(nodes[0].name(), "STREAMINFO");
        assert_eq!(nodes[1].name(), "PADDING");
        assert_eq!(nodes[1].data_length, 10);

        let frames = &nodes[2..];
        assert!(frames.iter().all(|n| n.kind == NodeKind::FlacFrame));
        assert_eq!(frames[0].offset(), 4 + 38 + 14);
        assert_eq!(frames[0].data_length, 100);
        assert_eq!(frames[1].data_length, 57);
        assert_eq!(frames[2].data_length, 3);
        assert_eq!(FrameHeader::decode(&frames[1]).unwrap().number, 1);
        assert_eq!(frames[2].end(), reader.source().len());
    }

    #[test]
    fn structural_faults() {
        let err = FlacReader::new(Cursor::new(b"fLa".to_vec()), ReaderOptions::default())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlacError>(),
            Some(FlacError::MissingMarker(m)) if m == b"fLa\0"
        ));

        let mut reader = FlacReader::new(
            flac(&[vec![0x7F, 0, 0, 0]], &[]),
            ReaderOptions::default(),
        )
        .unwrap();
        let err = reader.read_next().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlacError>(),
            Some(FlacError::InvalidBlockType(4))
        ));
    }

    #[test]
    fn truncated_block_is_incomplete_then_overrun() {
        let mut reader = FlacReader::new(
            flac(&[block(BlockType::StreamInfo, true, &[0; 34])[..20].to_vec()], &[]),
            ReaderOptions::default(),
        )
        .unwrap();

        let node = reader.read_next().unwrap().unwrap();
        assert!(!node.is_complete());
        let err = reader.read_next().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RecordError>(),
            Some(RecordError::Overrun { .. })
        ));
    }

    #[test]
    fn garbage_before_frames() {
        let si = stream_info().to_bytes().unwrap();
        let mut frames = vec![vec![0x12; 7]];
        frames.push(frame(0, 20));

        let bytes = flac(&[block(BlockType::StreamInfo, true, &si)], &frames);

        let mut reader = FlacReader::new(bytes.clone(), ReaderOptions::default()).unwrap();
        let nodes: Vec<_> = reader.nodes().collect::<Result<_>>().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].offset(), 4 + 38 + 7);

        let mut strict = FlacReader::new(bytes, ReaderOptions::strict()).unwrap();
        assert!(strict.nodes().any(|n| n.is_err()));
    }
}
