//! MXF (SMPTE 377) KLV payloads.
//!
//! ## KLV Layout
//!
//! | field  | size        | notes                                    |
//! |--------|-------------|------------------------------------------|
//! | key    | 16 bytes    | Universal Label, starts `06 0E 2B 34`    |
//! | length | 1..=9 bytes | BER: short form below 0x80, else 0x8N+N  |
//! | value  | length      |                                          |
//!
//! A file is a sequence of partitions. The header partition pack comes
//! first, optionally preceded by a run-in of up to 64 KiB. Structural
//! metadata (packages, tracks, sequences, descriptors) follows the primer
//! pack as local sets.

pub mod label;
pub mod local_set;
pub mod metadata;
pub mod partition;
