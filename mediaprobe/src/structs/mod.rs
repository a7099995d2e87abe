//! Data structures representing container records.
//!
//! Contains the format-agnostic [`node::Node`] record descriptor, the
//! [`track::Track`] stream summary, and typed payload decoders for each
//! container family.

pub mod flac;
pub mod image;
pub mod mxf;
pub mod node;
pub mod riff;
pub mod timestamp;
pub mod track;
