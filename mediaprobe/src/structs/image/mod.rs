//! Still image headers: JPEG marker segments and PNG chunks.

pub mod jpeg;
pub mod png;

pub use jpeg::marker_name;
