//! Utility functions and supporting infrastructure.
//!
//! Provides bitstream I/O, integer codes, CRC validation, error handling and
//! the seekable source shared by every format reader.

pub mod bitstream_io;
pub mod codes;
pub mod crc;
pub mod errors;
pub mod source;
