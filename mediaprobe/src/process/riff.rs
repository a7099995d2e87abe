use std::io::{Read, Seek};

use anyhow::{Result, anyhow, bail};
use log::Level::Warn;
use log::{debug, trace};

use crate::log_or_err;
use crate::process::tracks::TrackSource;
use crate::process::{RecordReader, ReaderOptions};
use crate::structs::node::{FourCC, Node, NodeKind};
use crate::structs::riff::avi::{AviMainHeader, AviStreamHeader, BitmapInfoHeader};
use crate::structs::riff::ds64::Ds64;
use crate::structs::riff::wave::WaveFormat;
use crate::structs::riff::{
    AVIH, BW64, CHUNK_HEADER_LEN, DATA, DS64, FMT, LIST, MOVI, RF64, RIFF, RIFX, SIZE_IN_DS64,
    STRF, STRH, STRL, STRN, is_container, stream_name,
};
use crate::structs::track::{MediaType, Track};
use crate::utils::errors::RiffError;
use crate::utils::source::Source;

/// Frame rate assumed when a video stream header carries none.
const DEFAULT_FRAME_RATE: f64 = 25.0;

/// Cursor over RIFF, RIFX, RF64 and BW64 files.
///
/// Containers are entered: the node after a `RIFF` or `LIST` node is its
/// first child.
#[derive(Debug)]
pub struct RiffReader<R> {
    source: Source<R>,
    options: ReaderOptions,
    offset: u64,
    first_record: u64,
    big_endian: bool,
    form: FourCC,
    form_type: FourCC,
    ds64: Option<Ds64>,
    tracks: Option<Vec<Track>>,
}

#[derive(Debug, Default)]
struct AviStream {
    header: Option<AviStreamHeader>,
    video: Option<BitmapInfoHeader>,
    audio: Option<WaveFormat>,
    name: Option<String>,
}

impl<R: Read + Seek> RiffReader<R> {
    pub fn new(inner: R, options: ReaderOptions) -> Result<Self> {
        Self::from_source(Source::new(inner)?, options)
    }

    pub fn from_source(mut source: Source<R>, options: ReaderOptions) -> Result<Self> {
        let mut head = [0u8; 12];
        let read = source.read_up_to(0, head.len())?;
        head[..read.len()].copy_from_slice(&read);

        let form = [head[0], head[1], head[2], head[3]];
        if ![RIFF, RIFX, RF64, BW64].contains(&form) {
            bail!(RiffError::MissingForm(form));
        }

        let mut reader = Self {
            source,
            options,
            offset: 0,
            first_record: 0,
            big_endian: form == RIFX,
            form: FourCC(form),
            form_type: FourCC([head[8], head[9], head[10], head[11]]),
            ds64: None,
            tracks: None,
        };

        // The form's own size lives in ds64, which is its first child.
        if form == RF64 || form == BW64 {
            reader.offset = 12;
            match reader.try_read_next()? {
                Some(node) if node.is_fourcc(&DS64) => {}
                _ => debug!("{} without a leading ds64 chunk", reader.form),
            }
            reader.offset = 0;
        }

        debug!("{} form {}", reader.form, reader.form_type);

        Ok(reader)
    }

    pub fn form_type(&self) -> FourCC {
        self.form_type
    }

    pub fn ds64(&self) -> Option<&Ds64> {
        self.ds64.as_ref()
    }

    fn size(&self, bytes: [u8; 4]) -> u32 {
        if self.big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        }
    }

    /// The 64-bit size for `id` from the cached ds64, or 0.
    fn resolve_size(&mut self, offset: u64, id: &[u8; 4]) -> Result<u64> {
        if let Some(size) = self.ds64.as_ref().and_then(|d| d.size_for(id)) {
            debug!("{} at {offset}: size {size} from ds64", FourCC(*id));
            return Ok(size);
        }

        log_or_err!(
            self.options,
            Warn,
            anyhow!(
                "{} at {offset} defers its size to ds64, which has no entry for it, using 0",
                FourCC(*id)
            )
        );
        Ok(0)
    }

    fn load_ds64(&mut self, node: &Node) -> Result<()> {
        let payload = self.read_payload(node)?;
        let ds64 = Ds64::decode(node, &payload)?;
        debug!(
            "ds64: riff {}, data {}, {} samples, {} table entries",
            ds64.riff_size,
            ds64.data_size,
            ds64.sample_count,
            ds64.table.len()
        );
        self.ds64 = Some(ds64);
        Ok(())
    }
}

impl<R: Read + Seek> RecordReader for RiffReader<R> {
    type Stream = R;

    cursor_state!();

    fn try_read_next(&mut self) -> Result<Option<Node>> {
        let offset = self.offset;
        let remaining = self.source.remaining_from(offset);
        if remaining < CHUNK_HEADER_LEN {
            if remaining > 0 {
                log_or_err!(
                    self.options,
                    Warn,
                    anyhow!("{remaining} trailing bytes at {offset} do not form a chunk")
                );
            }
            return Ok(None);
        }

        let header: [u8; 8] = self.source.read_array(offset)?;
        let id = [header[0], header[1], header[2], header[3]];
        let raw = self.size([header[4], header[5], header[6], header[7]]);
        let deferred = raw == SIZE_IN_DS64;
        let declared = if deferred {
            self.resolve_size(offset, &id)?
        } else {
            raw as u64
        };

        let complete = declared <= remaining - CHUNK_HEADER_LEN;
        let mut trailer_length = declared & 1;

        let node = if is_container(&id) {
            if declared < 4 && !deferred {
                bail!(RiffError::ContainerTooShort {
                    id: FourCC(id).to_string(),
                    length: declared,
                });
            }

            let list_type: [u8; 4] = self.source.read_array(offset + CHUNK_HEADER_LEN)?;
            let node = Node {
                kind: NodeKind::RiffChunk {
                    list_type: Some(FourCC(list_type)),
                    big_endian: self.big_endian,
                },
                identifier: id.to_vec(),
                header_length: CHUNK_HEADER_LEN + 4,
                data_offset: offset + CHUNK_HEADER_LEN + 4,
                data_length: declared.saturating_sub(4),
                trailer_length,
                complete,
            };

            self.offset = node.data_offset;
            node
        } else {
            let data_end = (offset + CHUNK_HEADER_LEN).saturating_add(declared);
            if trailer_length == 1 && data_end == self.source.len() {
                log_or_err!(
                    self.options,
                    Warn,
                    anyhow!("{} at {offset} is missing its pad byte", FourCC(id))
                );
                trailer_length = 0;
            }

            let node = Node {
                kind: NodeKind::RiffChunk {
                    list_type: None,
                    big_endian: self.big_endian,
                },
                identifier: id.to_vec(),
                header_length: CHUNK_HEADER_LEN,
                data_offset: offset + CHUNK_HEADER_LEN,
                data_length: declared,
                trailer_length,
                complete,
            };

            self.offset = node.end();
            node
        };

        if id == DS64 && node.complete {
            self.load_ds64(&node)?;
        }

        trace!("{node}");
        Ok(Some(node))
    }
}

impl<R: Read + Seek> TrackSource for RiffReader<R> {
    /// One track per AVI `strl` list, or a single track for WAVE.
    fn assemble_tracks(&mut self) -> Result<Vec<Track>> {
        let mut format: Option<WaveFormat> = None;
        let mut data: Option<Node> = None;
        let mut main: Option<AviMainHeader> = None;
        let mut streams: Vec<AviStream> = Vec::new();

        self.rewind();
        while let Some(node) = self.read_next()? {
            if node.kind.is_container() {
                match node.effective_fourcc().map(|f| f.0) {
                    // Stream data, one chunk per frame.
                    Some(MOVI) => self.offset = node.end(),
                    Some(STRL) if node.is_fourcc(&LIST) => streams.push(AviStream::default()),
                    _ => {}
                }
                continue;
            }

            let Some(FourCC(id)) = node.fourcc() else {
                continue;
            };
            if id == DATA {
                data = Some(node);
                continue;
            }
            if !node.is_complete() || ![FMT, AVIH, STRH, STRF, STRN].contains(&id) {
                continue;
            }

            let payload = self.read_payload(&node)?;
            match (id, streams.last_mut()) {
                (FMT, _) => format = Some(WaveFormat::decode(&node, &payload)?),
                (AVIH, _) => main = Some(AviMainHeader::decode(&node, &payload)?),
                (STRH, Some(stream)) => stream.header = Some(AviStreamHeader::decode(&node, &payload)?),
                (STRF, Some(stream)) => {
                    match stream.header.as_ref().map(|h| h.media_type()) {
                        Some(MediaType::Video) => {
                            stream.video = Some(BitmapInfoHeader::decode(&node, &payload)?)
                        }
                        Some(MediaType::Audio) => {
                            stream.audio = Some(WaveFormat::decode(&node, &payload)?)
                        }
                        _ => {}
                    }
                }
                (STRN, Some(stream)) => {
                    stream.name = Some(stream_name(&node, &payload)?).filter(|n| !n.is_empty())
                }
                _ => {}
            }
        }

        if !streams.is_empty() {
            let mut tracks = Vec::with_capacity(streams.len());
            for (i, stream) in streams.iter().enumerate() {
                if let Some(track) = avi_track(i as u32 + 1, stream, main.as_ref(), &self.options)? {
                    tracks.push(track);
                }
            }
            return Ok(tracks);
        }

        let Some(format) = format else {
            debug!("{} {} without fmt or strl, no tracks", self.form, self.form_type);
            return Ok(Vec::new());
        };

        let sample_count = match (&self.ds64, format.block_align) {
            (Some(ds64), _) if ds64.sample_count > 0 => ds64.sample_count,
            (_, 0) => 0,
            (_, block_align) => data.map_or(0, |d| d.data_length) / block_align as u64,
        };
        let sample_rate = format.samples_per_sec as f64;

        Ok(vec![Track {
            id: 1,
            sample_count,
            duration: Track::duration_of(sample_count, sample_rate, &self.options)?,
            sample_rate,
            media_type: MediaType::Audio,
            codec: format.codec_name(),
            channels: format.channels as u32,
            bit_depth: format.bit_depth() as u32,
            ..Default::default()
        }])
    }

    fn track_cache(&mut self) -> &mut Option<Vec<Track>> {
        &mut self.tracks
    }
}

fn avi_track(
    id: u32,
    stream: &AviStream,
    main: Option<&AviMainHeader>,
    options: &ReaderOptions,
) -> Result<Option<Track>> {
    let Some(header) = stream.header.as_ref() else {
        return Ok(None);
    };
    let media_type = header.media_type();
    let rate = header.rate();

    let mut track = Track {
        id,
        name: stream.name.clone(),
        sample_count: header.length as u64,
        start_offset: header.start as i64,
        media_type,
        ..Default::default()
    };

    match media_type {
        MediaType::Video => {
            let rate = rate.unwrap_or(DEFAULT_FRAME_RATE);
            track.sample_rate = rate;
            track.duration = Track::duration_of(header.length as u64, rate, options)?;
            match &stream.video {
                Some(bih) => {
                    track.width = bih.width.unsigned_abs();
                    track.height = bih.height.unsigned_abs();
                    track.bit_depth = bih.bit_count as u32;
                    track.codec = bih.codec_name();
                }
                None => {
                    track.width = main.map_or(0, |m| m.width);
                    track.height = main.map_or(0, |m| m.height);
                    track.codec = header.handler().to_string().trim().to_string();
                }
            }
        }
        MediaType::Audio => {
            track.duration = match rate {
                Some(r) => Track::duration_of(header.length as u64, r, options)?,
                None => Default::default(),
            };
            if let Some(format) = &stream.audio {
                track.sample_rate = format.samples_per_sec as f64;
                track.channels = format.channels as u32;
                track.bit_depth = format.bit_depth() as u32;
                track.codec = format.codec_name();
                track.sample_count =
                    (track.duration.as_secs_f64() * track.sample_rate).round() as u64;
            }
        }
        _ => {
            track.sample_rate = rate.unwrap_or_default();
            track.codec = header.handler().to_string().trim().to_string();
        }
    }

    Ok(Some(track))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use super::*;
    use crate::structs::riff::{AVI, ListChunk, RawChunk, RiffChunk, STREAM_AUDIO, STREAM_VIDEO, WAVE};
    use crate::utils::errors::RecordError;

    fn wave(chunks: &[&dyn RiffChunk]) -> Vec<u8> {
        let mut list = ListChunk::new(RIFF, WAVE);
        for chunk in chunks {
            chunk.write_all(&mut list.children);
        }
        list.to_chunk_bytes()
    }

    #[test]
    fn wave_track() {
        let bytes = wave(&[
            &WaveFormat::pcm(2, 48_000, 16),
            &RawChunk {
                id: DATA,
                data: vec![0; 4 * 4800],
            },
        ]);

        let mut reader = RiffReader::new(Cursor::new(bytes), ReaderOptions::default()).unwrap();
        assert_eq!(reader.form_type(), FourCC(WAVE));

        let tracks = reader.get_tracks().unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].sample_count, 4800);
        assert_eq!(tracks[0].duration, Duration::from_millis(100));
        assert_eq!(tracks[0].codec, "pcm");
        assert_eq!((tracks[0].channels, tracks[0].bit_depth), (2, 16));
    }

    #[test]
    fn deferred_size_without_ds64() {
        let mut bytes = wave(&[&WaveFormat::pcm(1, 8000, 8)]);
        bytes.extend_from_slice(b"data\xFF\xFF\xFF\xFF");
        let riff_size = (bytes.len() - 8) as u32;
        bytes[4..8].copy_from_slice(&riff_size.to_le_bytes());

        let mut reader = RiffReader::new(Cursor::new(bytes.clone()), ReaderOptions::default()).unwrap();
        let nodes: Vec<_> = reader.nodes().collect::<Result<_>>().unwrap();
        assert_eq!(nodes.len(), 3);
        assert!(nodes[2].is_fourcc(&DATA));
        assert_eq!(nodes[2].data_length, 0);
        assert!(nodes[2].is_complete());
        assert_eq!(reader.get_tracks().unwrap()[0].sample_count, 0);

        let mut strict = RiffReader::new(Cursor::new(bytes), ReaderOptions::strict()).unwrap();
        assert!(strict.nodes().any(|n| n.is_err()));
    }

    #[test]
    fn rf64_sizes_from_ds64() {
        let ds64 = Ds64 {
            riff_size: 0,
            data_size: 16,
            sample_count: 4,
            table: Vec::new(),
        };
        let mut bytes = wave(&[&ds64, &WaveFormat::pcm(2, 44_100, 16)]);
        bytes.extend_from_slice(b"data\xFF\xFF\xFF\xFF");
        bytes.extend_from_slice(&[0; 16]);

        let riff_size = (bytes.len() - 8) as u64;
        bytes[..4].copy_from_slice(&RF64);
        bytes[4..8].copy_from_slice(&SIZE_IN_DS64.to_le_bytes());
        bytes[20..28].copy_from_slice(&riff_size.to_le_bytes());

        let mut reader = RiffReader::new(Cursor::new(bytes), ReaderOptions::strict()).unwrap();
        assert_eq!(reader.ds64().map(|d| d.riff_size), Some(riff_size));

        let nodes: Vec<_> = reader.nodes().collect::<Result<_>>().unwrap();
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[0].data_length, riff_size - 4);
        assert_eq!(nodes[3].data_length, 16);
        assert_eq!(nodes[3].end(), reader.source().len());
        assert_eq!(reader.get_tracks().unwrap()[0].sample_count, 4);
    }

    #[test]
    fn rf64_oversized_data_ends_in_overrun() {
        let ds64 = Ds64 {
            riff_size: 0,
            data_size: u64::MAX - 3,
            sample_count: 0,
            table: Vec::new(),
        };
        let mut bytes = wave(&[&ds64, &WaveFormat::pcm(2, 44_100, 16)]);
        bytes.extend_from_slice(b"data\xFF\xFF\xFF\xFF");
        bytes.extend_from_slice(&[0; 16]);

        let riff_size = (bytes.len() - 8) as u64;
        bytes[..4].copy_from_slice(&RF64);
        bytes[4..8].copy_from_slice(&SIZE_IN_DS64.to_le_bytes());
        bytes[20..28].copy_from_slice(&riff_size.to_le_bytes());

        let mut reader = RiffReader::new(Cursor::new(bytes), ReaderOptions::default()).unwrap();
        let results: Vec<_> = reader.nodes().take(8).collect();
        assert_eq!(results.len(), 5);

        let data = results[3].as_ref().unwrap();
        assert!(data.is_fourcc(&DATA));
        assert_eq!(data.data_length, u64::MAX - 3);
        assert!(!data.is_complete());
        assert!(matches!(
            results[4].as_ref().unwrap_err().downcast_ref::<RecordError>(),
            Some(RecordError::Overrun { .. })
        ));
    }

    #[test]
    fn rifx_is_big_endian() {
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&1u16.to_be_bytes());
        fmt.extend_from_slice(&6u16.to_be_bytes());
        fmt.extend_from_slice(&48_000u32.to_be_bytes());
        fmt.extend_from_slice(&(48_000u32 * 18).to_be_bytes());
        fmt.extend_from_slice(&18u16.to_be_bytes());
        fmt.extend_from_slice(&24u16.to_be_bytes());

        let mut bytes = b"RIFX".to_vec();
        bytes.extend_from_slice(&(4 + 8 + fmt.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&WAVE);
        bytes.extend_from_slice(&FMT);
        bytes.extend_from_slice(&(fmt.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&fmt);

        let mut reader = RiffReader::new(Cursor::new(bytes), ReaderOptions::default()).unwrap();
        let track = &reader.get_tracks().unwrap()[0];
        assert_eq!(track.channels, 6);
        assert_eq!(track.sample_rate, 48_000.0);
        assert_eq!(track.bit_depth, 24);
    }

    #[test]
    fn pad_bytes() {
        let bytes = wave(&[
            &RawChunk {
                id: *b"junk",
                data: vec![7; 3],
            },
            &RawChunk {
                id: LIST,
                data: b"INFOISFT\x05\x00\x00\x00mprb\x00".to_vec(),
            },
        ]);

        let mut reader = RiffReader::new(Cursor::new(bytes.clone()), ReaderOptions::default()).unwrap();
        let nodes: Vec<_> = reader.nodes().collect::<Result<_>>().unwrap();
        let names: Vec<_> = nodes.iter().map(|n| n.name()).collect();
        assert_eq!(names, ["RIFF:WAVE", "junk", "LIST:INFO", "ISFT"]);
        assert_eq!(nodes[1].trailer_length, 1);
        assert_eq!(nodes[2].offset(), 12 + 12);
        assert_eq!(nodes[3].trailer_length, 1);

        // Drop the final pad byte.
        let mut truncated = bytes;
        truncated.pop();
        let mut reader =
            RiffReader::new(Cursor::new(truncated.clone()), ReaderOptions::default()).unwrap();
        let nodes: Vec<_> = reader.nodes().collect::<Result<_>>().unwrap();
        assert_eq!(nodes[3].trailer_length, 0);

        let mut strict = RiffReader::new(Cursor::new(truncated), ReaderOptions::strict()).unwrap();
        assert!(strict.nodes().any(|n| n.is_err()));
    }

    #[test]
    fn avi_tracks() {
        let video = ListChunk::new(LIST, STRL)
            .push(&AviStreamHeader {
                fcc_type: STREAM_VIDEO,
                fcc_handler: *b"H264",
                scale: 1001,
                rate: 30_000,
                length: 300,
                ..Default::default()
            })
            .push(&BitmapInfoHeader {
                size: 40,
                width: 1280,
                height: -720,
                planes: 1,
                bit_count: 24,
                compression: *b"H264",
                ..Default::default()
            })
            .push(&RawChunk {
                id: STRN,
                data: b"Camera\0".to_vec(),
            });

        let audio = ListChunk::new(LIST, STRL)
            .push(&AviStreamHeader {
                fcc_type: STREAM_AUDIO,
                scale: 1,
                rate: 48_000,
                length: 480_000,
                ..Default::default()
            })
            .push(&RawChunk {
                id: STRF,
                data: WaveFormat::pcm(2, 48_000, 16).chunk_data(),
            });

        let hdrl = ListChunk::new(LIST, *b"hdrl")
            .push(&AviMainHeader {
                width: 1280,
                height: 720,
                streams: 2,
                ..Default::default()
            })
            .push(&video)
            .push(&audio);

        let movi = ListChunk::new(LIST, MOVI).push(&RawChunk {
            id: *b"00dc",
            data: vec![0; 32],
        });

        let bytes = ListChunk::new(RIFF, AVI).push(&hdrl).push(&movi).to_chunk_bytes();
        let mut reader = RiffReader::new(Cursor::new(bytes), ReaderOptions::default()).unwrap();
        let tracks = reader.get_tracks().unwrap().to_vec();
        assert_eq!(tracks.len(), 2);

        assert_eq!(tracks[0].media_type, MediaType::Video);
        assert_eq!(tracks[0].name.as_deref(), Some("Camera"));
        assert_eq!((tracks[0].width, tracks[0].height), (1280, 720));
        assert_eq!(tracks[0].codec, "H264");
        assert!((tracks[0].sample_rate - 29.97).abs() < 0.001);
        assert!((tracks[0].duration.as_secs_f64() - 10.01).abs() < 0.001);

        assert_eq!(tracks[1].id, 2);
        assert_eq!(tracks[1].media_type, MediaType::Audio);
        assert_eq!(tracks[1].duration, Duration::from_secs(10));
        assert_eq!(tracks[1].sample_count, 480_000);
        assert_eq!(tracks[1].codec, "pcm");

        assert_eq!(reader.offset(), 0);
    }

    #[test]
    fn not_riff() {
        let err = RiffReader::new(Cursor::new(b"FORM\0\0\0\0AIFF".to_vec()), ReaderOptions::default())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RiffError>(),
            Some(RiffError::MissingForm(id)) if id == b"FORM"
        ));

        let mut reader = RiffReader::new(
            Cursor::new(b"RIFF\x40\0\0\0WAVE".to_vec()),
            ReaderOptions::default(),
        )
        .unwrap();
        let first = reader.read_next().unwrap().unwrap();
        assert!(!first.is_complete());
        assert!(reader.read_next().unwrap().is_none());
    }
}
