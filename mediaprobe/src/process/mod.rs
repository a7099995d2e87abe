use std::io::{Read, Seek};

use anyhow::{Result, bail};
use log::debug;

use crate::structs::flac::{BlockType, FLAC_MARKER};
use crate::structs::image::png::PNG_SIGNATURE;
use crate::structs::mxf::label::{LabelMatch, SMPTE_DESIGNATOR, UL_LEN};
use crate::structs::node::{FourCC, Node, NodeKind};
use crate::structs::riff::{BW64, RF64, RIFF, RIFX};
use crate::structs::track::Track;
use crate::utils::errors::RecordError;
use crate::utils::source::Source;

/// Implements the state accessors of [`RecordReader`] for a cursor struct
/// with `source`, `options`, `offset` and `first_record` fields.
macro_rules! cursor_state {
    () => {
        fn source(&self) -> &$crate::utils::source::Source<R> {
            &self.source
        }

        fn source_mut(&mut self) -> &mut $crate::utils::source::Source<R> {
            &mut self.source
        }

        fn options(&self) -> &$crate::process::ReaderOptions {
            &self.options
        }

        fn first_record_offset(&self) -> u64 {
            self.first_record
        }

        fn offset(&self) -> u64 {
            self.offset
        }

        fn set_offset(&mut self, offset: u64) {
            self.offset = offset;
        }
    };
}

/// FLAC metadata blocks and frames.
///
/// Provides the [`FlacReader`](flac::FlacReader) cursor.
pub mod flac;

/// JPEG marker segments.
pub mod jpeg;

/// MXF KLV packets, with run-in detection.
///
/// Provides the [`MxfReader`](mxf::MxfReader) cursor.
pub mod mxf;

/// PNG chunks.
pub mod png;

/// RIFF, RIFX, RF64 and BW64 chunks.
///
/// Provides the [`RiffReader`](riff::RiffReader) cursor, which descends into
/// `LIST` containers and resolves 64-bit sizes through `ds64`.
pub mod riff;

/// Lazy, cached track assembly.
pub mod tracks;

pub use tracks::TrackSource;

/// Window used by cursors that scan for the next sync point.
pub(crate) const SCAN_WINDOW: usize = 64 * 1024;

/// Settings shared by every cursor and decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Anomalies logged at this level or more severe become errors.
    ///
    /// - `log::Level::Error`: only fail on Error level messages (default)
    /// - `log::Level::Warn`: fail on Warning level and above (strict mode)
    pub fail_level: log::Level,
    pub label_match: LabelMatch,
    /// Longest MXF run-in searched for the header partition.
    pub max_run_in: u64,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
            label_match: LabelMatch::EXACT,
            max_run_in: 65_535,
        }
    }
}

impl ReaderOptions {
    pub fn strict() -> Self {
        Self {
            fail_level: log::Level::Warn,
            ..Default::default()
        }
    }

    /// Bytes read from the start of a stream to find a key within the
    /// run-in, clamped to the address space.
    pub(crate) fn run_in_window(&self) -> usize {
        usize::try_from(self.max_run_in)
            .unwrap_or(usize::MAX)
            .saturating_add(UL_LEN)
    }
}

/// A lazy cursor yielding one [`Node`] per record.
///
/// Each reader keeps its own offset and reads at absolute positions, so
/// traversals only interfere through [`offset`](Self::offset). Use
/// [`read_records`](Self::read_records) for a traversal that puts the offset
/// back afterwards.
pub trait RecordReader {
    type Stream: Read + Seek;

    fn source(&self) -> &Source<Self::Stream>;

    fn source_mut(&mut self) -> &mut Source<Self::Stream>;

    fn options(&self) -> &ReaderOptions;

    /// Offset of the first record, past any signature or run-in.
    fn first_record_offset(&self) -> u64;

    fn offset(&self) -> u64;

    fn set_offset(&mut self, offset: u64);

    /// Reads the record at the current offset and advances past it.
    ///
    /// `Ok(None)` marks the end of the records.
    fn try_read_next(&mut self) -> Result<Option<Node>>;

    /// [`try_read_next`](Self::try_read_next) after checking that the
    /// previous record did not run past the end of the stream.
    fn read_next(&mut self) -> Result<Option<Node>> {
        let offset = self.offset();
        let len = self.source().len();
        if offset > len {
            bail!(RecordError::Overrun { offset, len });
        }

        self.try_read_next()
    }

    fn rewind(&mut self) {
        let first = self.first_record_offset();
        self.set_offset(first);
    }

    /// Records from the current offset on. Ends after the first fault.
    fn nodes(&mut self) -> Nodes<'_, Self>
    where
        Self: Sized,
    {
        Nodes {
            reader: self,
            done: false,
        }
    }

    /// Records starting within `budget` bytes of `offset` that match any of
    /// `filters` (all records when `filters` is empty).
    ///
    /// The reader's offset is restored when the iterator is dropped.
    fn read_records<'a>(
        &'a mut self,
        offset: u64,
        budget: u64,
        filters: &'a [NodeFilter],
    ) -> Records<'a, Self>
    where
        Self: Sized,
    {
        let saved = self.offset();
        self.set_offset(offset);

        Records {
            reader: self,
            saved,
            end: offset.saturating_add(budget),
            filters,
            done: false,
        }
    }

    fn read_payload(&mut self, node: &Node) -> Result<Vec<u8>> {
        self.source_mut().read_vec(node.data_offset, node.data_length)
    }
}

pub struct Nodes<'a, T> {
    reader: &'a mut T,
    done: bool,
}

impl<T: RecordReader> Iterator for Nodes<'_, T> {
    type Item = Result<Node>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.reader.read_next() {
            Ok(Some(node)) => Some(Ok(node)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

pub struct Records<'a, T: RecordReader> {
    reader: &'a mut T,
    saved: u64,
    end: u64,
    filters: &'a [NodeFilter],
    done: bool,
}

impl<T: RecordReader> Iterator for Records<'_, T> {
    type Item = Result<Node>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.reader.read_next() {
                Ok(Some(node)) if node.offset() < self.end => {
                    if self.filters.is_empty() || self.filters.iter().any(|f| f.matches(&node)) {
                        return Some(Ok(node));
                    }
                }
                Ok(_) => self.done = true,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        None
    }
}

impl<T: RecordReader> Drop for Records<'_, T> {
    fn drop(&mut self) {
        self.reader.set_offset(self.saved);
    }
}

/// Record selector for [`RecordReader::read_records`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeFilter {
    /// Identifier starts with these bytes.
    Prefix(Vec<u8>),
    /// Chunk id or, for RIFF containers, the list type.
    FourCC(FourCC),
    FlacBlock(BlockType),
    FlacFrames,
    Label([u8; UL_LEN], LabelMatch),
    JpegMarker(u8),
}

impl NodeFilter {
    pub fn matches(&self, node: &Node) -> bool {
        match self {
            NodeFilter::Prefix(prefix) => node.identifier.starts_with(prefix),
            NodeFilter::FourCC(fourcc) => {
                node.fourcc() == Some(*fourcc) || node.effective_fourcc() == Some(*fourcc)
            }
            NodeFilter::FlacBlock(block_type) => matches!(
                node.kind,
                NodeKind::FlacMetadata { block_type: t, .. } if BlockType::from(t) == *block_type
            ),
            NodeFilter::FlacFrames => node.kind == NodeKind::FlacFrame,
            NodeFilter::Label(label, lm) => {
                node.kind == NodeKind::MxfKlv && lm.matches(&node.identifier, label)
            }
            NodeFilter::JpegMarker(marker) => {
                matches!(node.kind, NodeKind::JpegSegment { marker: m } if m == *marker)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Flac,
    Riff,
    Mxf,
    Jpeg,
    Png,
}

impl Format {
    /// Guesses the format from the first bytes of a stream. MXF is reported
    /// when the SMPTE designator appears anywhere in `head`, the MXF cursor
    /// then confirms the partition pack.
    pub fn detect(head: &[u8]) -> Option<Self> {
        if head.starts_with(&FLAC_MARKER) {
            Some(Format::Flac)
        } else if [RIFF, RIFX, RF64, BW64].iter().any(|id| head.starts_with(id)) {
            Some(Format::Riff)
        } else if head.starts_with(&PNG_SIGNATURE) {
            Some(Format::Png)
        } else if head.starts_with(&[0xFF, 0xD8]) {
            Some(Format::Jpeg)
        } else if head.windows(4).any(|w| w == SMPTE_DESIGNATOR) {
            Some(Format::Mxf)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Format::Flac => "FLAC",
            Format::Riff => "RIFF",
            Format::Mxf => "MXF",
            Format::Jpeg => "JPEG",
            Format::Png => "PNG",
        };
        f.write_str(s)
    }
}

/// A detected container with its cursor.
#[derive(Debug)]
pub enum MediaReader<R> {
    Flac(flac::FlacReader<R>),
    Riff(riff::RiffReader<R>),
    Mxf(mxf::MxfReader<R>),
    Jpeg(jpeg::JpegReader<R>),
    Png(png::PngReader<R>),
}

macro_rules! dispatch {
    ($self:expr, $r:ident => $body:expr) => {
        match $self {
            MediaReader::Flac($r) => $body,
            MediaReader::Riff($r) => $body,
            MediaReader::Mxf($r) => $body,
            MediaReader::Jpeg($r) => $body,
            MediaReader::Png($r) => $body,
        }
    };
}

impl<R> MediaReader<R> {
    pub fn format(&self) -> Format {
        match self {
            MediaReader::Flac(_) => Format::Flac,
            MediaReader::Riff(_) => Format::Riff,
            MediaReader::Mxf(_) => Format::Mxf,
            MediaReader::Jpeg(_) => Format::Jpeg,
            MediaReader::Png(_) => Format::Png,
        }
    }
}

impl<R: Read + Seek> RecordReader for MediaReader<R> {
    type Stream = R;

    fn source(&self) -> &Source<R> {
        dispatch!(self, r => r.source())
    }

    fn source_mut(&mut self) -> &mut Source<R> {
        dispatch!(self, r => r.source_mut())
    }

    fn options(&self) -> &ReaderOptions {
        dispatch!(self, r => r.options())
    }

    fn first_record_offset(&self) -> u64 {
        dispatch!(self, r => r.first_record_offset())
    }

    fn offset(&self) -> u64 {
        dispatch!(self, r => r.offset())
    }

    fn set_offset(&mut self, offset: u64) {
        dispatch!(self, r => r.set_offset(offset))
    }

    fn try_read_next(&mut self) -> Result<Option<Node>> {
        dispatch!(self, r => r.try_read_next())
    }
}

impl<R: Read + Seek> TrackSource for MediaReader<R> {
    fn assemble_tracks(&mut self) -> Result<Vec<Track>> {
        dispatch!(self, r => r.assemble_tracks())
    }

    fn track_cache(&mut self) -> &mut Option<Vec<Track>> {
        dispatch!(self, r => r.track_cache())
    }
}

/// Detects the container format of `reader` and opens the matching cursor.
pub fn open<R: Read + Seek>(reader: R, options: ReaderOptions) -> Result<MediaReader<R>> {
    let mut source = Source::new(reader)?;
    let head = source.read_up_to(0, options.run_in_window())?;

    let Some(format) = Format::detect(&head) else {
        bail!(RecordError::UnknownFormat);
    };
    debug!("Detected {format} stream, {} bytes", source.len());

    Ok(match format {
        Format::Flac => MediaReader::Flac(flac::FlacReader::from_source(source, options)?),
        Format::Riff => MediaReader::Riff(riff::RiffReader::from_source(source, options)?),
        Format::Mxf => MediaReader::Mxf(mxf::MxfReader::from_source(source, options)?),
        Format::Jpeg => MediaReader::Jpeg(jpeg::JpegReader::from_source(source, options)?),
        Format::Png => MediaReader::Png(png::PngReader::from_source(source, options)?),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::structs::riff::{ListChunk, RawChunk, RiffChunk, WAVE};

    #[test]
    fn detect() {
        assert_eq!(Format::detect(b"fLaC\0\0\0\x22"), Some(Format::Flac));
        assert_eq!(Format::detect(b"RIFX\0\0\0\x04WAVE"), Some(Format::Riff));
        assert_eq!(Format::detect(&PNG_SIGNATURE), Some(Format::Png));
        assert_eq!(Format::detect(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(Format::Jpeg));
        assert_eq!(
            Format::detect(&[0, 0, 0x06, 0x0E, 0x2B, 0x34, 0x02]),
            Some(Format::Mxf)
        );
        assert_eq!(Format::detect(b"OggS"), None);

        let err = open(Cursor::new(b"OggS".to_vec()), ReaderOptions::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RecordError>(),
            Some(RecordError::UnknownFormat)
        ));
    }

    #[test]
    fn records_restore_offset() {
        let bytes = ListChunk::new(RIFF, WAVE)
            .push(&RawChunk {
                id: *b"junk",
                data: vec![0; 3],
            })
            .push(&RawChunk {
                id: *b"data",
                data: vec![1; 4],
            })
            .to_chunk_bytes();

        let mut reader = open(Cursor::new(bytes), ReaderOptions::default()).unwrap();
        assert_eq!(reader.format(), Format::Riff);
        reader.rewind();
        let before = reader.offset();

        let filters = [NodeFilter::FourCC(FourCC(*b"data"))];
        let found: Vec<_> = reader
            .read_records(0, u64::MAX, &filters)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].data_offset, 12 + 8 + 4 + 8);
        assert_eq!(reader.offset(), before);

        let all: Vec<_> = reader.read_records(0, 13, &[]).collect::<Result<_>>().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].name(), "junk");
        assert_eq!(reader.offset(), before);

        let payload = reader.read_payload(&found[0]).unwrap();
        assert_eq!(payload, vec![1; 4]);
    }

    #[test]
    fn nodes_stop_after_fault() {
        let mut bytes = ListChunk::new(RIFF, WAVE)
            .push(&RawChunk {
                id: *b"data",
                data: vec![0; 8],
            })
            .to_chunk_bytes();
        // The data chunk now claims more than the stream holds.
        bytes[16] = 0x40;

        let mut reader = open(Cursor::new(bytes), ReaderOptions::default()).unwrap();
        let results: Vec<_> = reader.nodes().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(!results[1].as_ref().unwrap().is_complete());
        assert!(matches!(
            results[2].as_ref().unwrap_err().downcast_ref::<RecordError>(),
            Some(RecordError::Overrun { .. })
        ));
    }

    #[test]
    fn unbounded_run_in() {
        let options = ReaderOptions {
            max_run_in: u64::MAX,
            ..Default::default()
        };
        assert_eq!(options.run_in_window(), usize::MAX);

        let bytes = ListChunk::new(RIFF, WAVE).to_chunk_bytes();
        let reader = open(Cursor::new(bytes), options).unwrap();
        assert_eq!(reader.format(), Format::Riff);
    }
}
