use std::collections::HashMap;
use std::io::{Read, Seek};

use anyhow::{Result, anyhow, bail};
use log::Level::Warn;
use log::{debug, trace};

use crate::log_or_err;
use crate::process::tracks::TrackSource;
use crate::process::{RecordReader, ReaderOptions};
use crate::structs::mxf::label::{
    self, PartitionKind, SMPTE_DESIGNATOR, UL_LEN, UniversalLabel, partition_kind,
};
use crate::structs::mxf::metadata::{
    DescriptorKind, EssenceDescriptor, InstanceUid, Package, SetKind, Sequence, TimelineTrack,
    set_kind,
};
use crate::structs::mxf::partition::PartitionPack;
use crate::structs::node::{Node, NodeKind};
use crate::structs::track::{MediaType, Track};
use crate::utils::codes::decode_ber_length;
use crate::utils::errors::MxfError;
use crate::utils::source::Source;

/// Key plus the shortest BER length.
const MIN_KLV_LEN: u64 = UL_LEN as u64 + 1;

/// Longest BER length field: 0x88 and eight length bytes.
const MAX_BER_LEN: usize = 9;

const DEFAULT_EDIT_RATE: f64 = 25.0;

/// Cursor over MXF KLV packets.
///
/// Construction locates the header partition pack, skipping a run-in of at
/// most [`ReaderOptions::max_run_in`] bytes.
#[derive(Debug)]
pub struct MxfReader<R> {
    source: Source<R>,
    options: ReaderOptions,
    offset: u64,
    first_record: u64,
    tracks: Option<Vec<Track>>,
}

/// Header metadata sets gathered for track assembly.
#[derive(Debug, Default)]
struct HeaderMetadata {
    packages: Vec<Package>,
    timelines: Vec<TimelineTrack>,
    sequences: HashMap<InstanceUid, Sequence>,
    descriptors: Vec<EssenceDescriptor>,
}

impl<R: Read + Seek> MxfReader<R> {
    pub fn new(inner: R, options: ReaderOptions) -> Result<Self> {
        Self::from_source(Source::new(inner)?, options)
    }

    pub fn from_source(mut source: Source<R>, options: ReaderOptions) -> Result<Self> {
        let run_in = Self::find_header_partition(&mut source, &options)?;
        debug!("MXF run-in: {run_in} bytes");

        Ok(Self {
            source,
            options,
            offset: run_in,
            first_record: run_in,
            tracks: None,
        })
    }

    /// Scans for `06 0E`, then requires the SMPTE designator and a header
    /// partition pack key at that position.
    fn find_header_partition(source: &mut Source<R>, options: &ReaderOptions) -> Result<u64> {
        let head = source.read_up_to(0, options.run_in_window())?;
        if head.len() >= UL_LEN {
            let last = head.len() - UL_LEN;
            let found = (0..=last).find(|&i| {
                head[i] == SMPTE_DESIGNATOR[0]
                    && head[i + 1] == SMPTE_DESIGNATOR[1]
                    && head[i..i + 4] == SMPTE_DESIGNATOR
                    && partition_kind(&head[i..i + UL_LEN], &options.label_match)
                        == Some(PartitionKind::Header)
            });

            if let Some(run_in) = found {
                return Ok(run_in as u64);
            }
        }

        bail!(MxfError::HeaderPartitionNotFound(options.max_run_in))
    }

    /// Bytes before the header partition pack.
    pub fn run_in(&self) -> u64 {
        self.first_record
    }

    pub fn header_partition(&mut self) -> Result<PartitionPack> {
        let saved = self.offset;
        self.offset = self.first_record;
        let node = self.read_next();
        self.offset = saved;

        let Some(node) = node? else {
            bail!(MxfError::HeaderPartitionNotFound(self.options.max_run_in));
        };
        let payload = self.read_payload(&node)?;
        PartitionPack::decode(&node, &payload, &self.options.label_match)
    }

    /// Structural metadata sets up to the first essence element or the next
    /// partition.
    fn header_metadata(&mut self) -> Result<HeaderMetadata> {
        let lm = self.options.label_match;
        let mut metadata = HeaderMetadata::default();

        self.rewind();
        let mut partitions = 0;
        while let Some(node) = self.read_next()? {
            if partition_kind(&node.identifier, &lm).is_some() {
                partitions += 1;
                if partitions > 1 {
                    break;
                }
                continue;
            }
            if label::is_essence_element(&node.identifier) {
                break;
            }

            let kind = set_kind(&node.identifier, &lm);
            if kind == SetKind::Other || kind == SetKind::Preface || !node.is_complete() {
                continue;
            }

            let payload = self.read_payload(&node)?;
            match kind {
                SetKind::MaterialPackage | SetKind::SourcePackage => {
                    metadata.packages.push(Package::decode(&node, &payload, &lm)?)
                }
                SetKind::TimelineTrack => {
                    metadata.timelines.push(TimelineTrack::decode(&node, &payload, &lm)?)
                }
                SetKind::Sequence => {
                    let sequence = Sequence::decode(&node, &payload, &lm)?;
                    metadata.sequences.insert(sequence.instance_uid, sequence);
                }
                SetKind::Descriptor(_) => {
                    metadata.descriptors.push(EssenceDescriptor::decode(&node, &payload, &lm)?)
                }
                SetKind::Preface | SetKind::Other => {}
            }
        }

        debug!(
            "MXF header metadata: {} package(s), {} track(s), {} sequence(s), {} descriptor(s)",
            metadata.packages.len(),
            metadata.timelines.len(),
            metadata.sequences.len(),
            metadata.descriptors.len()
        );

        Ok(metadata)
    }
}

impl<R: Read + Seek> RecordReader for MxfReader<R> {
    type Stream = R;

    cursor_state!();

    fn try_read_next(&mut self) -> Result<Option<Node>> {
        let offset = self.offset;
        let remaining = self.source.remaining_from(offset);
        if remaining < MIN_KLV_LEN {
            if remaining > 0 {
                log_or_err!(
                    self.options,
                    Warn,
                    anyhow!("{remaining} trailing bytes at {offset} do not form a KLV packet")
                );
            }
            return Ok(None);
        }

        let key: [u8; UL_LEN] = self.source.read_array(offset)?;
        if key[..4] != SMPTE_DESIGNATOR {
            bail!(MxfError::InvalidKey {
                offset,
                key: UniversalLabel(key).to_string(),
            });
        }

        let length_bytes = self.source.read_up_to(offset + UL_LEN as u64, MAX_BER_LEN)?;
        let (length, used) = decode_ber_length(&length_bytes)?;
        let header_length = (UL_LEN + used) as u64;

        let node = Node {
            kind: NodeKind::MxfKlv,
            identifier: key.to_vec(),
            header_length,
            data_offset: offset + header_length,
            data_length: length,
            trailer_length: 0,
            complete: length <= remaining - header_length,
        };

        self.offset = node.end();

        trace!("{node}");
        Ok(Some(node))
    }
}

impl<R: Read + Seek> TrackSource for MxfReader<R> {
    /// One track per essence descriptor, matched to its timeline track by
    /// track id.
    fn assemble_tracks(&mut self) -> Result<Vec<Track>> {
        let metadata = self.header_metadata()?;

        metadata
            .descriptors
            .iter()
            .filter(|d| d.kind != DescriptorKind::Multiple)
            .enumerate()
            .map(|(index, d)| metadata.track(index, d, &self.options))
            .collect()
    }

    fn track_cache(&mut self) -> &mut Option<Vec<Track>> {
        &mut self.tracks
    }
}

impl HeaderMetadata {
    fn track(&self, index: usize, d: &EssenceDescriptor, options: &ReaderOptions) -> Result<Track> {
        let id = d.linked_track_id.unwrap_or(index as u32 + 1);

        let timeline = self.timelines.iter().rev().find(|t| t.track_id == id);
        let package = timeline
            .and_then(|t| self.packages.iter().find(|p| p.tracks.contains(&t.instance_uid)))
            .or_else(|| self.packages.iter().find(|p| !p.source));
        let sequence = timeline
            .and_then(|t| t.sequence)
            .and_then(|uid| self.sequences.get(&uid));

        let edit_rate = timeline
            .and_then(|t| t.edit_rate.as_f64())
            .or_else(|| d.sample_rate.and_then(|r| r.as_f64()))
            .unwrap_or(DEFAULT_EDIT_RATE);

        let duration = match (sequence.and_then(|s| s.duration), d.container_duration) {
            (Some(units), _) if units >= 0 => Track::duration_of(units as u64, edit_rate, options)?,
            (None, Some(units)) if units >= 0 => Track::duration_of(
                units as u64,
                d.sample_rate.and_then(|r| r.as_f64()).unwrap_or(edit_rate),
                options,
            )?,
            _ => Default::default(),
        };

        let media_type = match d.media_type() {
            MediaType::Unknown => sequence.map_or(MediaType::Unknown, |s| s.media_type()),
            media_type => media_type,
        };

        let sample_rate = match media_type {
            MediaType::Audio => d.audio_sampling_rate.and_then(|r| r.as_f64()),
            _ => None,
        }
        .or_else(|| d.sample_rate.and_then(|r| r.as_f64()))
        .unwrap_or(edit_rate);

        Ok(Track {
            id,
            name: timeline
                .and_then(|t| t.name.clone())
                .or_else(|| package.and_then(|p| p.name.clone())),
            created: package.and_then(|p| p.created),
            modified: package.and_then(|p| p.modified),
            sample_count: (duration.as_secs_f64() * sample_rate).round() as u64,
            width: d.stored_width.unwrap_or_default(),
            height: d.stored_height.unwrap_or_default(),
            start_offset: timeline.map_or(0, |t| t.origin),
            duration,
            sample_rate,
            media_type,
            codec: d.codec_name(),
            channels: d.channel_count.unwrap_or_default(),
            bit_depth: d.quantization_bits.or(d.component_depth).unwrap_or_default(),
        })
    }
}

impl<R> MxfReader<R> {
    /// Partition kind of a node, `None` for other packets.
    pub fn partition_kind_of(&self, node: &Node) -> Option<PartitionKind> {
        partition_kind(&node.identifier, &self.options.label_match)
    }
}
