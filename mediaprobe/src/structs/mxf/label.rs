//! SMPTE Universal Labels and the label name table.
//!
//! Every key starts with the 4-byte designator `06 0E 2B 34`. Byte 4 is the
//! registry category, byte 7 the registry version and the trailing bytes
//! narrow the kind (partition status, set type, essence track number).

use std::fmt::{Debug, Display, Formatter};

pub const UL_LEN: usize = 16;

pub const SMPTE_DESIGNATOR: [u8; 4] = [0x06, 0x0E, 0x2B, 0x34];

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct UniversalLabel(pub [u8; UL_LEN]);

impl UniversalLabel {
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.get(..UL_LEN)?.try_into().ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; UL_LEN] {
        &self.0
    }

    pub fn is_smpte(&self) -> bool {
        self.0[..4] == SMPTE_DESIGNATOR
    }
}

impl Display for UniversalLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 && i % 4 == 0 {
                write!(f, ".")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl Debug for UniversalLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "UL({self})")
    }
}

/// The four label bytes treated as the kind when `ignore_kind` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KindBytes {
    /// Bytes 8..12, the item designator.
    Item,
    /// Bytes 12..16.
    #[default]
    Trailing,
}

impl KindBytes {
    pub const fn contains(&self, index: usize) -> bool {
        match self {
            KindBytes::Item => matches!(index, 8..=11),
            KindBytes::Trailing => matches!(index, 12..=15),
        }
    }
}

/// Which label bytes to ignore when comparing.
///
/// Encoders disagree on the registry byte (4), the version byte (7) and four
/// kind bytes, either 8..12 or 12..16 as picked by `kind_bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LabelMatch {
    pub ignore_registry: bool,
    pub ignore_version: bool,
    pub ignore_kind: bool,
    pub kind_bytes: KindBytes,
}

impl LabelMatch {
    pub const EXACT: Self = Self {
        ignore_registry: false,
        ignore_version: false,
        ignore_kind: false,
        kind_bytes: KindBytes::Trailing,
    };

    pub const LENIENT: Self = Self {
        ignore_registry: true,
        ignore_version: true,
        ignore_kind: true,
        kind_bytes: KindBytes::Trailing,
    };

    pub const fn ignores(&self, index: usize) -> bool {
        match index {
            4 => self.ignore_registry,
            7 => self.ignore_version,
            _ => self.ignore_kind && self.kind_bytes.contains(index),
        }
    }

    pub fn matches(&self, a: &[u8], b: &[u8]) -> bool {
        a.len() >= UL_LEN
            && b.len() >= UL_LEN
            && (0..UL_LEN).all(|i| self.ignores(i) || a[i] == b[i])
    }
}

const VERSIONLESS: LabelMatch = LabelMatch {
    ignore_version: true,
    ..LabelMatch::EXACT
};

const fn set_key(kind: u8) -> [u8; UL_LEN] {
    [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0D, 0x01, 0x01, 0x01, 0x01, 0x01, kind,
        0x00,
    ]
}

const fn pack_key(b13: u8, b14: u8) -> [u8; UL_LEN] {
    [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, b13, b14,
        0x00,
    ]
}

pub const PARTITION_HEADER: u8 = 0x02;
pub const PARTITION_BODY: u8 = 0x03;
pub const PARTITION_FOOTER: u8 = 0x04;

/// Header partition pack, closed and complete.
pub const HEADER_PARTITION: [u8; UL_LEN] = pack_key(PARTITION_HEADER, 0x04);
pub const BODY_PARTITION: [u8; UL_LEN] = pack_key(PARTITION_BODY, 0x04);
pub const FOOTER_PARTITION: [u8; UL_LEN] = pack_key(PARTITION_FOOTER, 0x04);
pub const PRIMER_PACK: [u8; UL_LEN] = pack_key(0x05, 0x01);
pub const RANDOM_INDEX_PACK: [u8; UL_LEN] = pack_key(0x11, 0x01);

pub const INDEX_TABLE_SEGMENT: [u8; UL_LEN] = [
    0x06, 0x0E, 0x2B, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x10, 0x01, 0x00,
];

pub const FILL: [u8; UL_LEN] = [
    0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x02, 0x03, 0x01, 0x02, 0x10, 0x01, 0x00, 0x00, 0x00,
];

pub const PREFACE: [u8; UL_LEN] = set_key(0x2F);
pub const IDENTIFICATION: [u8; UL_LEN] = set_key(0x30);
pub const CONTENT_STORAGE: [u8; UL_LEN] = set_key(0x18);
pub const ESSENCE_CONTAINER_DATA: [u8; UL_LEN] = set_key(0x23);
pub const MATERIAL_PACKAGE: [u8; UL_LEN] = set_key(0x36);
pub const SOURCE_PACKAGE: [u8; UL_LEN] = set_key(0x37);
pub const EVENT_TRACK: [u8; UL_LEN] = set_key(0x39);
pub const STATIC_TRACK: [u8; UL_LEN] = set_key(0x3A);
pub const TIMELINE_TRACK: [u8; UL_LEN] = set_key(0x3B);
pub const SEQUENCE: [u8; UL_LEN] = set_key(0x0F);
pub const SOURCE_CLIP: [u8; UL_LEN] = set_key(0x11);
pub const TIMECODE_COMPONENT: [u8; UL_LEN] = set_key(0x14);
pub const FILE_DESCRIPTOR: [u8; UL_LEN] = set_key(0x25);
pub const CDCI_DESCRIPTOR: [u8; UL_LEN] = set_key(0x28);
pub const RGBA_DESCRIPTOR: [u8; UL_LEN] = set_key(0x29);
pub const SOUND_DESCRIPTOR: [u8; UL_LEN] = set_key(0x42);
pub const DATA_DESCRIPTOR: [u8; UL_LEN] = set_key(0x43);
pub const MULTIPLE_DESCRIPTOR: [u8; UL_LEN] = set_key(0x44);
pub const AES3_DESCRIPTOR: [u8; UL_LEN] = set_key(0x47);
pub const WAVE_DESCRIPTOR: [u8; UL_LEN] = set_key(0x48);
pub const MPEG_DESCRIPTOR: [u8; UL_LEN] = set_key(0x51);
pub const JPEG2000_SUB_DESCRIPTOR: [u8; UL_LEN] = set_key(0x5A);

/// Generic container essence element prefix (12 bytes).
pub const ESSENCE_ELEMENT_PREFIX: [u8; 12] = [
    0x06, 0x0E, 0x2B, 0x34, 0x01, 0x02, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01,
];

const NAMES: &[(&str, [u8; UL_LEN])] = &[
    ("PrimerPack", PRIMER_PACK),
    ("RandomIndexPack", RANDOM_INDEX_PACK),
    ("IndexTableSegment", INDEX_TABLE_SEGMENT),
    ("KLVFill", FILL),
    ("Preface", PREFACE),
    ("Identification", IDENTIFICATION),
    ("ContentStorage", CONTENT_STORAGE),
    ("EssenceContainerData", ESSENCE_CONTAINER_DATA),
    ("MaterialPackage", MATERIAL_PACKAGE),
    ("SourcePackage", SOURCE_PACKAGE),
    ("EventTrack", EVENT_TRACK),
    ("StaticTrack", STATIC_TRACK),
    ("TimelineTrack", TIMELINE_TRACK),
    ("Sequence", SEQUENCE),
    ("SourceClip", SOURCE_CLIP),
    ("TimecodeComponent", TIMECODE_COMPONENT),
    ("FileDescriptor", FILE_DESCRIPTOR),
    ("CDCIEssenceDescriptor", CDCI_DESCRIPTOR),
    ("RGBAEssenceDescriptor", RGBA_DESCRIPTOR),
    ("GenericSoundEssenceDescriptor", SOUND_DESCRIPTOR),
    ("GenericDataEssenceDescriptor", DATA_DESCRIPTOR),
    ("MultipleDescriptor", MULTIPLE_DESCRIPTOR),
    ("AES3PCMDescriptor", AES3_DESCRIPTOR),
    ("WaveAudioDescriptor", WAVE_DESCRIPTOR),
    ("MPEG2VideoDescriptor", MPEG_DESCRIPTOR),
    ("JPEG2000PictureSubDescriptor", JPEG2000_SUB_DESCRIPTOR),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    Header,
    Body,
    Footer,
}

/// Partition kind of a partition pack key, compared with `lm` except for
/// bytes 13 (kind) and 14 (status).
pub fn partition_kind(label: &[u8], lm: &LabelMatch) -> Option<PartitionKind> {
    if label.len() < UL_LEN {
        return None;
    }

    let same_prefix = (0..13).all(|i| lm.ignores(i) || label[i] == HEADER_PARTITION[i]);
    if !same_prefix || !(0x01..=0x04).contains(&label[14]) {
        return None;
    }

    match label[13] {
        PARTITION_HEADER => Some(PartitionKind::Header),
        PARTITION_BODY => Some(PartitionKind::Body),
        PARTITION_FOOTER => Some(PartitionKind::Footer),
        _ => None,
    }
}

pub fn is_essence_element(label: &[u8]) -> bool {
    label.len() >= UL_LEN
        && (0..12).all(|i| i == 7 || label[i] == ESSENCE_ELEMENT_PREFIX[i])
}

pub fn is_fill(label: &[u8]) -> bool {
    VERSIONLESS.matches(label, &FILL)
}

/// Name of a well-known label, ignoring the version byte.
pub fn name_of(label: &[u8]) -> Option<&'static str> {
    if let Some(kind) = partition_kind(label, &VERSIONLESS) {
        return Some(match kind {
            PartitionKind::Header => "HeaderPartitionPack",
            PartitionKind::Body => "BodyPartitionPack",
            PartitionKind::Footer => "FooterPartitionPack",
        });
    }

    if is_essence_element(label) {
        return Some("EssenceElement");
    }

    NAMES
        .iter()
        .find(|(_, key)| VERSIONLESS.matches(label, key))
        .map(|&(name, _)| name)
}
