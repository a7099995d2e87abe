//! Structural metadata sets: packages, tracks, sequences and essence
//! descriptors.
//!
//! Sets are local sets whose tags below 0x8000 are statically assigned.
//! Dynamic tags (0x8000 and up) would need the primer pack and are skipped.

use anyhow::{Result, bail};
use log::trace;

use crate::structs::mxf::label::{self, LabelMatch, UL_LEN};
use crate::structs::mxf::local_set::{LocalSet, Rational};
use crate::structs::node::{Node, NodeKind};
use crate::structs::timestamp::Timestamp;
use crate::structs::track::MediaType;
use crate::utils::errors::DecodeError;

pub type InstanceUid = [u8; UL_LEN];

pub mod tags {
    pub const INSTANCE_UID: u16 = 0x3C0A;

    pub const PACKAGE_UID: u16 = 0x4401;
    pub const PACKAGE_NAME: u16 = 0x4402;
    pub const PACKAGE_TRACKS: u16 = 0x4403;
    pub const PACKAGE_MODIFIED: u16 = 0x4404;
    pub const PACKAGE_CREATED: u16 = 0x4405;
    pub const PACKAGE_DESCRIPTOR: u16 = 0x4701;

    pub const TRACK_ID: u16 = 0x4801;
    pub const TRACK_NAME: u16 = 0x4802;
    pub const TRACK_SEQUENCE: u16 = 0x4803;
    pub const TRACK_NUMBER: u16 = 0x4804;
    pub const EDIT_RATE: u16 = 0x4B01;
    pub const ORIGIN: u16 = 0x4B02;

    pub const DATA_DEFINITION: u16 = 0x0201;
    pub const DURATION: u16 = 0x0202;
    pub const STRUCTURAL_COMPONENTS: u16 = 0x1001;

    pub const SAMPLE_RATE: u16 = 0x3001;
    pub const CONTAINER_DURATION: u16 = 0x3002;
    pub const ESSENCE_CONTAINER: u16 = 0x3004;
    pub const CODEC: u16 = 0x3005;
    pub const LINKED_TRACK_ID: u16 = 0x3006;
    pub const SUB_DESCRIPTORS: u16 = 0x3F01;

    pub const PICTURE_CODING: u16 = 0x3201;
    pub const STORED_HEIGHT: u16 = 0x3202;
    pub const STORED_WIDTH: u16 = 0x3203;
    pub const COMPONENT_DEPTH: u16 = 0x3301;

    pub const QUANTIZATION_BITS: u16 = 0x3D01;
    pub const AUDIO_SAMPLING_RATE: u16 = 0x3D03;
    pub const SOUND_COMPRESSION: u16 = 0x3D06;
    pub const CHANNEL_COUNT: u16 = 0x3D07;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Cdci,
    Rgba,
    Mpeg,
    Sound,
    Wave,
    Aes3,
    Data,
    Multiple,
    File,
}

impl DescriptorKind {
    pub fn media_type(&self) -> MediaType {
        match self {
            DescriptorKind::Cdci | DescriptorKind::Rgba | DescriptorKind::Mpeg => MediaType::Video,
            DescriptorKind::Sound | DescriptorKind::Wave | DescriptorKind::Aes3 => MediaType::Audio,
            DescriptorKind::Data => MediaType::Data,
            DescriptorKind::Multiple | DescriptorKind::File => MediaType::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetKind {
    Preface,
    MaterialPackage,
    SourcePackage,
    TimelineTrack,
    Sequence,
    Descriptor(DescriptorKind),
    Other,
}

const DESCRIPTORS: [([u8; UL_LEN], DescriptorKind); 9] = [
    (label::CDCI_DESCRIPTOR, DescriptorKind::Cdci),
    (label::RGBA_DESCRIPTOR, DescriptorKind::Rgba),
    (label::MPEG_DESCRIPTOR, DescriptorKind::Mpeg),
    (label::SOUND_DESCRIPTOR, DescriptorKind::Sound),
    (label::WAVE_DESCRIPTOR, DescriptorKind::Wave),
    (label::AES3_DESCRIPTOR, DescriptorKind::Aes3),
    (label::DATA_DESCRIPTOR, DescriptorKind::Data),
    (label::MULTIPLE_DESCRIPTOR, DescriptorKind::Multiple),
    (label::FILE_DESCRIPTOR, DescriptorKind::File),
];

/// Classifies a set key. `ignore_kind` is not applied here since the kind
/// bytes are what tell the sets apart.
pub fn set_kind(key: &[u8], lm: &LabelMatch) -> SetKind {
    let lm = LabelMatch {
        ignore_kind: false,
        ..*lm
    };

    if lm.matches(key, &label::PREFACE) {
        SetKind::Preface
    } else if lm.matches(key, &label::MATERIAL_PACKAGE) {
        SetKind::MaterialPackage
    } else if lm.matches(key, &label::SOURCE_PACKAGE) {
        SetKind::SourcePackage
    } else if lm.matches(key, &label::TIMELINE_TRACK) {
        SetKind::TimelineTrack
    } else if lm.matches(key, &label::SEQUENCE) {
        SetKind::Sequence
    } else {
        DESCRIPTORS
            .iter()
            .find(|(ul, _)| lm.matches(key, ul))
            .map_or(SetKind::Other, |&(_, kind)| SetKind::Descriptor(kind))
    }
}

fn expect_set(node: &Node, expected: &str, ok: bool) -> Result<()> {
    if node.kind != NodeKind::MxfKlv || !ok {
        bail!(DecodeError::UnexpectedRecord {
            expected: expected.to_string(),
            found: node.name(),
        });
    }
    Ok(())
}

/// Media type from a sequence's data definition label.
pub fn media_type_of(data_definition: &[u8; UL_LEN]) -> MediaType {
    match (&data_definition[8..12], data_definition[12]) {
        ([0x01, 0x03, 0x02, 0x02], 0x01) => MediaType::Video,
        ([0x01, 0x03, 0x02, 0x02], 0x02) => MediaType::Audio,
        ([0x01, 0x03, 0x02, 0x02], _) | ([0x01, 0x03, 0x02, 0x01], _) => MediaType::Data,
        _ => MediaType::Unknown,
    }
}

/// Codec name from a picture coding or sound compression label.
pub fn coding_name(ul: &[u8; UL_LEN]) -> Option<&'static str> {
    Some(match (&ul[8..11], ul[11], ul[12], ul[13]) {
        ([0x04, 0x01, 0x02], 0x01, _, _) => "uncompressed",
        ([0x04, 0x01, 0x02], 0x02, 0x01, 0x30..=0x3F) => "h264",
        ([0x04, 0x01, 0x02], 0x02, 0x01, _) => "mpeg2video",
        ([0x04, 0x01, 0x02], 0x02, 0x02, _) => "dv",
        ([0x04, 0x01, 0x02], 0x02, 0x03, 0x01) => "jpeg2000",
        ([0x04, 0x01, 0x02], 0x02, 0x71, _) => "vc3",
        ([0x04, 0x02, 0x02], 0x01, _, _) => "pcm",
        ([0x04, 0x02, 0x02], 0x02, 0x03, 0x01) => "mpeg_audio",
        ([0x04, 0x02, 0x02], 0x02, _, _) => "compressed_audio",
        _ => return None,
    })
}

/// Material or source package.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Package {
    pub instance_uid: InstanceUid,
    pub package_uid: Vec<u8>,
    pub name: Option<String>,
    pub created: Option<Timestamp>,
    pub modified: Option<Timestamp>,
    pub tracks: Vec<InstanceUid>,
    pub descriptor: Option<InstanceUid>,
    pub source: bool,
}

impl Package {
    pub fn decode(node: &Node, payload: &[u8], lm: &LabelMatch) -> Result<Self> {
        let kind = set_kind(&node.identifier, lm);
        expect_set(
            node,
            "Package",
            matches!(kind, SetKind::MaterialPackage | SetKind::SourcePackage),
        )?;

        let mut package = Self {
            source: kind == SetKind::SourcePackage,
            ..Default::default()
        };

        for item in LocalSet::new(payload) {
            let item = item?;
            match item.tag {
                tags::INSTANCE_UID => package.instance_uid = item.ul()?,
                tags::PACKAGE_UID => package.package_uid = item.value.to_vec(),
                tags::PACKAGE_NAME => package.name = Some(item.utf16()),
                tags::PACKAGE_CREATED => package.created = item.timestamp()?,
                tags::PACKAGE_MODIFIED => package.modified = item.timestamp()?,
                tags::PACKAGE_TRACKS => package.tracks = item.ul_batch()?,
                tags::PACKAGE_DESCRIPTOR => package.descriptor = Some(item.ul()?),
                _ => {}
            }
        }

        trace!("Package {:?} with {} track(s)", package.name, package.tracks.len());

        Ok(package)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimelineTrack {
    pub instance_uid: InstanceUid,
    pub track_id: u32,
    pub track_number: u32,
    pub name: Option<String>,
    pub edit_rate: Rational,
    pub origin: i64,
    pub sequence: Option<InstanceUid>,
}

impl TimelineTrack {
    pub fn decode(node: &Node, payload: &[u8], lm: &LabelMatch) -> Result<Self> {
        let kind = set_kind(&node.identifier, lm);
        expect_set(node, "TimelineTrack", kind == SetKind::TimelineTrack)?;

        let mut track = Self::default();
        for item in LocalSet::new(payload) {
            let item = item?;
            match item.tag {
                tags::INSTANCE_UID => track.instance_uid = item.ul()?,
                tags::TRACK_ID => track.track_id = item.u32()?,
                tags::TRACK_NUMBER => track.track_number = item.u32()?,
                tags::TRACK_NAME => track.name = Some(item.utf16()).filter(|n| !n.is_empty()),
                tags::EDIT_RATE => track.edit_rate = item.rational()?,
                tags::ORIGIN => track.origin = item.i64()?,
                tags::TRACK_SEQUENCE => track.sequence = Some(item.ul()?),
                _ => {}
            }
        }

        Ok(track)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sequence {
    pub instance_uid: InstanceUid,
    pub data_definition: [u8; UL_LEN],
    /// `None` when absent or negative (unknown).
    pub duration: Option<i64>,
    pub components: Vec<InstanceUid>,
}

impl Sequence {
    pub fn decode(node: &Node, payload: &[u8], lm: &LabelMatch) -> Result<Self> {
        let kind = set_kind(&node.identifier, lm);
        expect_set(node, "Sequence", kind == SetKind::Sequence)?;

        let mut sequence = Self::default();
        for item in LocalSet::new(payload) {
            let item = item?;
            match item.tag {
                tags::INSTANCE_UID => sequence.instance_uid = item.ul()?,
                tags::DATA_DEFINITION => sequence.data_definition = item.ul()?,
                tags::DURATION => sequence.duration = Some(item.i64()?).filter(|&d| d >= 0),
                tags::STRUCTURAL_COMPONENTS => sequence.components = item.ul_batch()?,
                _ => {}
            }
        }

        Ok(sequence)
    }

    pub fn media_type(&self) -> MediaType {
        media_type_of(&self.data_definition)
    }
}

/// Picture, sound, data or multiple descriptor. Fields a descriptor type
/// does not carry stay `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EssenceDescriptor {
    pub instance_uid: InstanceUid,
    pub kind: DescriptorKind,
    pub linked_track_id: Option<u32>,
    pub sample_rate: Option<Rational>,
    pub container_duration: Option<i64>,
    pub essence_container: Option<[u8; UL_LEN]>,
    pub codec: Option<[u8; UL_LEN]>,
    pub picture_coding: Option<[u8; UL_LEN]>,
    pub stored_width: Option<u32>,
    pub stored_height: Option<u32>,
    pub component_depth: Option<u32>,
    pub audio_sampling_rate: Option<Rational>,
    pub channel_count: Option<u32>,
    pub quantization_bits: Option<u32>,
    pub sound_compression: Option<[u8; UL_LEN]>,
    pub sub_descriptors: Vec<InstanceUid>,
}

impl EssenceDescriptor {
    pub fn new(kind: DescriptorKind) -> Self {
        Self {
            instance_uid: [0; UL_LEN],
            kind,
            linked_track_id: None,
            sample_rate: None,
            container_duration: None,
            essence_container: None,
            codec: None,
            picture_coding: None,
            stored_width: None,
            stored_height: None,
            component_depth: None,
            audio_sampling_rate: None,
            channel_count: None,
            quantization_bits: None,
            sound_compression: None,
            sub_descriptors: Vec::new(),
        }
    }

    pub fn decode(node: &Node, payload: &[u8], lm: &LabelMatch) -> Result<Self> {
        let SetKind::Descriptor(kind) = set_kind(&node.identifier, lm) else {
            bail!(DecodeError::UnexpectedRecord {
                expected: "EssenceDescriptor".to_string(),
                found: node.name(),
            });
        };

        let mut d = Self::new(kind);
        for item in LocalSet::new(payload) {
            let item = item?;
            match item.tag {
                tags::INSTANCE_UID => d.instance_uid = item.ul()?,
                tags::LINKED_TRACK_ID => d.linked_track_id = Some(item.u32()?),
                tags::SAMPLE_RATE => d.sample_rate = Some(item.rational()?),
                tags::CONTAINER_DURATION => d.container_duration = Some(item.i64()?),
                tags::ESSENCE_CONTAINER => d.essence_container = Some(item.ul()?),
                tags::CODEC => d.codec = Some(item.ul()?),
                tags::PICTURE_CODING => d.picture_coding = Some(item.ul()?),
                tags::STORED_WIDTH => d.stored_width = Some(item.u32()?),
                tags::STORED_HEIGHT => d.stored_height = Some(item.u32()?),
                tags::COMPONENT_DEPTH => d.component_depth = Some(item.u32()?),
                tags::AUDIO_SAMPLING_RATE => d.audio_sampling_rate = Some(item.rational()?),
                tags::CHANNEL_COUNT => d.channel_count = Some(item.u32()?),
                tags::QUANTIZATION_BITS => d.quantization_bits = Some(item.u32()?),
                tags::SOUND_COMPRESSION => d.sound_compression = Some(item.ul()?),
                tags::SUB_DESCRIPTORS => d.sub_descriptors = item.ul_batch()?,
                _ => {}
            }
        }

        trace!("{:?} descriptor linked to track {:?}", d.kind, d.linked_track_id);

        Ok(d)
    }

    pub fn media_type(&self) -> MediaType {
        self.kind.media_type()
    }

    pub fn codec_name(&self) -> String {
        let coded = self
            .picture_coding
            .or(self.sound_compression)
            .as_ref()
            .and_then(coding_name);

        match (coded, self.kind) {
            (Some(name), _) => name.to_string(),
            (None, DescriptorKind::Wave | DescriptorKind::Aes3) => "pcm".to_string(),
            (None, DescriptorKind::Mpeg) => "mpeg2video".to_string(),
            (None, DescriptorKind::Cdci | DescriptorKind::Rgba) => "uncompressed".to_string(),
            (None, _) => "unknown".to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::structs::mxf::local_set::encode_item;

    pub(crate) fn klv_node(key: [u8; UL_LEN], len: usize) -> Node {
        Node {
            kind: NodeKind::MxfKlv,
            identifier: key.to_vec(),
            header_length: 20,
            data_offset: 20,
            data_length: len as u64,
            trailer_length: 0,
            complete: true,
        }
    }

    fn rational(n: i32, d: i32) -> Vec<u8> {
        [n.to_be_bytes(), d.to_be_bytes()].concat()
    }

    #[test]
    fn timeline_track_and_sequence() {
        let mut payload = encode_item(tags::INSTANCE_UID, &[0x01; 16]);
        payload.extend(encode_item(tags::TRACK_ID, &2u32.to_be_bytes()));
        payload.extend(encode_item(tags::EDIT_RATE, &rational(25, 1)));
        payload.extend(encode_item(tags::ORIGIN, &(-3i64).to_be_bytes()));
        payload.extend(encode_item(tags::TRACK_SEQUENCE, &[0x02; 16]));
        payload.extend(encode_item(tags::TRACK_NAME, &[0, b'A', 0, b'1']));
        payload.extend(encode_item(0x8001, &[0xFF; 3]));

        let node = klv_node(label::TIMELINE_TRACK, payload.len());
        let track = TimelineTrack::decode(&node, &payload, &LabelMatch::EXACT).unwrap();
        assert_eq!(track.track_id, 2);
        assert_eq!(track.edit_rate, Rational::new(25, 1));
        assert_eq!(track.origin, -3);
        assert_eq!(track.sequence, Some([0x02; 16]));
        assert_eq!(track.name.as_deref(), Some("A1"));

        assert!(Sequence::decode(&node, &payload, &LabelMatch::EXACT).is_err());

        let mut sound_dd = [
            0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x01, 0x03, 0x02, 0x02, 0x02, 0x00,
            0x00, 0x00,
        ];
        let mut payload = encode_item(tags::DATA_DEFINITION, &sound_dd);
        payload.extend(encode_item(tags::DURATION, &250i64.to_be_bytes()));
        let node = klv_node(label::SEQUENCE, payload.len());
        let sequence = Sequence::decode(&node, &payload, &LabelMatch::EXACT).unwrap();
        assert_eq!(sequence.duration, Some(250));
        assert_eq!(sequence.media_type(), MediaType::Audio);

        sound_dd[12] = 0x01;
        assert_eq!(media_type_of(&sound_dd), MediaType::Video);
    }

    #[test]
    fn descriptor_fields() {
        let mut mpeg2 = [0u8; 16];
        mpeg2[8..14].copy_from_slice(&[0x04, 0x01, 0x02, 0x02, 0x01, 0x04]);

        let mut payload = encode_item(tags::LINKED_TRACK_ID, &2u32.to_be_bytes());
        payload.extend(encode_item(tags::SAMPLE_RATE, &rational(30_000, 1001)));
        payload.extend(encode_item(tags::CONTAINER_DURATION, &300i64.to_be_bytes()));
        payload.extend(encode_item(tags::STORED_WIDTH, &1920u32.to_be_bytes()));
        payload.extend(encode_item(tags::STORED_HEIGHT, &1080u32.to_be_bytes()));
        payload.extend(encode_item(tags::PICTURE_CODING, &mpeg2));

        let node = klv_node(label::CDCI_DESCRIPTOR, payload.len());
        let d = EssenceDescriptor::decode(&node, &payload, &LabelMatch::EXACT).unwrap();
        assert_eq!(d.kind, DescriptorKind::Cdci);
        assert_eq!(d.linked_track_id, Some(2));
        assert_eq!((d.stored_width, d.stored_height), (Some(1920), Some(1080)));
        assert_eq!(d.media_type(), MediaType::Video);
        assert_eq!(d.codec_name(), "mpeg2video");

        let node = klv_node(label::WAVE_DESCRIPTOR, 0);
        let d = EssenceDescriptor::decode(&node, &[], &LabelMatch::EXACT).unwrap();
        assert_eq!(d.codec_name(), "pcm");
        assert_eq!(d.media_type(), MediaType::Audio);

        let node = klv_node(label::PREFACE, 0);
        assert!(EssenceDescriptor::decode(&node, &[], &LabelMatch::EXACT).is_err());
    }

    #[test]
    fn set_kinds_with_leniency() {
        let mut key = label::SOURCE_PACKAGE;
        key[7] = 0x02;
        assert_eq!(set_kind(&key, &LabelMatch::EXACT), SetKind::Other);
        assert_eq!(set_kind(&key, &LabelMatch::LENIENT), SetKind::SourcePackage);
    }
}
