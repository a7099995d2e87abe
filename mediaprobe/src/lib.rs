#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Lazy, format-agnostic record enumeration for binary media containers.
//!
//! ### Record Model
//!
//! Every container is read as a sequence of [`Node`]s: a header, a payload
//! and an optional trailer, located by absolute offsets. Nodes are produced
//! on demand by a cursor; payloads are only read when asked for.
//!
//! | Format | Record | Header | Trailer |
//! |--------|--------|--------|---------|
//! | FLAC   | metadata block, frame | 4 bytes, frame header | none |
//! | RIFF   | chunk  | FourCC + 32-bit size | pad byte |
//! | MXF    | KLV packet | 16-byte label + BER length | none |
//! | JPEG   | marker segment | marker + 16-bit length | none |
//! | PNG    | chunk  | 32-bit size + type | CRC-32 |
//!
//! ### Fault Handling
//!
//! Structural faults end enumeration with an error. Recoverable anomalies
//! are logged, or returned as errors when [`ReaderOptions::fail_level`] is
//! raised to `Warn`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! use mediaprobe::{ReaderOptions, RecordReader, TrackSource, open};
//!
//! let file = BufReader::new(File::open("input.wav")?);
//! let mut reader = open(file, ReaderOptions::default())?;
//!
//! for node in reader.nodes() {
//!     let node = node?;
//!     println!("{node}");
//! }
//!
//! for track in reader.get_tracks()? {
//!     println!("{track}");
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Endian-aware serialization used by the `ToBytes` derive.
pub mod byteorder;

/// Format cursors and track assembly.
///
/// - **Detection** ([`process::open`]): Picks the cursor from the leading bytes
/// - **Cursors** ([`process::flac`], [`process::riff`], [`process::mxf`],
///   [`process::jpeg`], [`process::png`]): Lazy [`Node`] enumeration
/// - **Tracks** ([`process::tracks`]): Cached stream summaries
pub mod process;

/// Data structures representing container records.
///
/// - **Nodes** ([`structs::node`]): Format-agnostic record descriptors
/// - **Tracks** ([`structs::track`]): Stream summaries
/// - **FLAC** ([`structs::flac`]): Metadata blocks and frame headers
/// - **RIFF** ([`structs::riff`]): WAVE, AVI and `ds64` payloads
/// - **MXF** ([`structs::mxf`]): Labels, local sets, partitions and header metadata
/// - **Images** ([`structs::image`]): JPEG frame headers and PNG image headers
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading/writing
/// - **Codes** ([`utils::codes`]): Unary, Rice, UTF-8 varint and BER codes
/// - **CRC Validation** ([`utils::crc`]): Error detection
/// - **Error Handling** ([`utils::errors`]): Error types
/// - **Sources** ([`utils::source`]): Bounded reads at absolute offsets
pub mod utils;

pub use process::{MediaReader, ReaderOptions, RecordReader, TrackSource, open};
pub use structs::node::Node;
pub use structs::track::Track;
