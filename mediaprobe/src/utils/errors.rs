/// Returns `$err` when `$level` is at or above the configured fail level,
/// otherwise logs it at `$level` and carries on.
#[macro_export]
macro_rules! log_or_err {
    ($options:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $options.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid leading byte for variable-length integer: {0:#04X}")]
    InvalidLeadingByte(u8),

    #[error("Invalid continuation byte {byte:#04X} at index {index} (expected 0b10xxxxxx)")]
    InvalidContinuation { index: usize, byte: u8 },

    #[error("Variable-length integer exceeds {max_bits} bits")]
    ValueTooWide { max_bits: u32 },

    #[error("Indefinite BER length (0x80) is not allowed")]
    IndefiniteLength,

    #[error("BER length uses {0} length bytes, at most 8 are supported")]
    LengthTooLong(u8),

    #[error("Input ends after {available} bytes, {needed} needed")]
    Truncated { needed: usize, available: usize },

    #[error("Bit range {offset}+{width} exceeds {available} available bits")]
    BitRangeOutOfBounds {
        offset: usize,
        width: u32,
        available: usize,
    },
    #[error("Rice parameter {0} exceeds 31")]
    RiceParameterTooLarge(u32),
}

#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error("Cursor at {offset} is past stream end {len}")]
    Overrun { offset: u64, len: u64 },

    #[error("Record at {offset} declares {declared} bytes, only {available} remain")]
    Truncated {
        offset: u64,
        declared: u64,
        available: u64,
    },

    #[error("Unrecognized stream format")]
    UnknownFormat,
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("Expected {expected} record, found {found}")]
    UnexpectedRecord { expected: String, found: String },

    #[error("{record} payload too short: {actual} bytes, at least {expected} required")]
    PayloadTooShort {
        record: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{record} payload length {actual} is not a multiple of {unit}")]
    PayloadMisaligned {
        record: &'static str,
        unit: usize,
        actual: usize,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum FlacError {
    #[error("Missing fLaC stream marker, read {0:02X?}")]
    MissingMarker([u8; 4]),

    #[error("Invalid metadata block type 127 at {0}")]
    InvalidBlockType(u64),

    #[error("Reserved bit set in frame header at byte {0}")]
    ReservedBitSet(usize),

    #[error("Invalid block size code {0}")]
    InvalidBlockSizeCode(u8),

    #[error("Invalid sample rate code {0}")]
    InvalidSampleRateCode(u8),

    #[error("Reserved channel assignment {0}")]
    InvalidChannelAssignment(u8),

    #[error("Reserved bits-per-sample code {0}")]
    InvalidBitsPerSample(u8),

    #[error("Frame header CRC-8 mismatch. Calculated {calculated:#04X}, Read {read:#04X}")]
    HeaderCrcMismatch { calculated: u8, read: u8 },

    #[error("Frame header ends after {0} bytes")]
    TruncatedFrameHeader(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum RiffError {
    #[error("Missing RIFF form header, read {0:02X?}")]
    MissingForm([u8; 4]),

    #[error("Container {id} declares {length} bytes, too short for its list type")]
    ContainerTooShort { id: String, length: u64 },
}

#[derive(thiserror::Error, Debug)]
pub enum MxfError {
    #[error("No header partition pack within the first {0} bytes")]
    HeaderPartitionNotFound(u64),

    #[error("Local set item at {offset} runs past the set ({length} > {remaining})")]
    MalformedLocalSet {
        offset: usize,
        length: usize,
        remaining: usize,
    },

    #[error("Invalid timestamp {0:02X?}")]
    InvalidTimestamp([u8; 8]),

    #[error("Key at {offset} is not a SMPTE label: {key}")]
    InvalidKey { offset: u64, key: String },
}

#[derive(thiserror::Error, Debug)]
pub enum JpegError {
    #[error("Missing SOI marker, read {0:02X?}")]
    MissingSoi([u8; 2]),

    #[error("Expected marker at {offset}, read {found:#04X}")]
    ExpectedMarker { offset: u64, found: u8 },

    #[error("Segment length {0} is shorter than its own length field")]
    InvalidSegmentLength(u16),
}

#[derive(thiserror::Error, Debug)]
pub enum PngError {
    #[error("Missing PNG signature")]
    MissingSignature,

    #[error("CRC mismatch in {chunk} chunk. Calculated {calculated:#010X}, Read {read:#010X}")]
    CrcMismatch {
        chunk: String,
        calculated: u32,
        read: u32,
    },
}
