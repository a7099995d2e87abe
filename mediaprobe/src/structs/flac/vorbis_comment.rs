use anyhow::Result;
use log::Level::Warn;

use crate::log_or_err;
use crate::process::ReaderOptions;
use crate::structs::flac::{BlockType, expect_block};
use crate::structs::node::Node;
use crate::utils::errors::DecodeError;
use crate::utils::source::ByteReader;

/// Vendor string plus `KEY=VALUE` comments, all little-endian length
/// prefixed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VorbisComment {
    pub vendor: String,
    pub comments: Vec<(String, String)>,
}

impl VorbisComment {
    /// Decodes a comment block, skipping malformed entries.
    ///
    /// An entry whose length runs past the payload ends the list. Entries
    /// without `=` are dropped.
    pub fn decode(node: &Node, payload: &[u8], options: &ReaderOptions) -> Result<Self> {
        expect_block(node, BlockType::VorbisComment)?;
        Self::from_bytes(payload, options)
    }

    pub fn from_bytes(payload: &[u8], options: &ReaderOptions) -> Result<Self> {
        let mut vc = Self::default();
        let reader = &mut ByteReader::le(payload);

        let Some(vendor) = Self::read_string(reader) else {
            log_or_err!(options, Warn, anyhow::anyhow!(Self::malformed(payload.len())));
            return Ok(vc);
        };
        vc.vendor = vendor;

        let count = reader.u32().unwrap_or(0);
        for index in 0..count {
            let Some(entry) = Self::read_string(reader) else {
                log_or_err!(
                    options,
                    Warn,
                    anyhow::anyhow!(
                        "VORBIS_COMMENT entry {index} of {count} runs past the payload, ignoring the rest"
                    )
                );
                break;
            };

            match entry.split_once('=') {
                Some((key, value)) => vc.comments.push((key.to_string(), value.to_string())),
                None => log_or_err!(
                    options,
                    Warn,
                    anyhow::anyhow!("VORBIS_COMMENT entry {index} has no '=': {entry:?}")
                ),
            }
        }

        Ok(vc)
    }

    fn read_string(reader: &mut ByteReader) -> Option<String> {
        let len = reader.u32().ok()? as usize;
        let bytes = reader.bytes(len).ok()?;
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    fn malformed(actual: usize) -> DecodeError {
        DecodeError::PayloadTooShort {
            record: "VORBIS_COMMENT",
            expected: 4,
            actual,
        }
    }

    /// First value for `key`, compared case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.comments
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn title(&self) -> Option<&str> {
        self.get("TITLE")
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        fn put(out: &mut Vec<u8>, s: &[u8]) {
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s);
        }

        let mut out = Vec::new();
        put(&mut out, self.vendor.as_bytes());
        out.extend_from_slice(&(self.comments.len() as u32).to_le_bytes());
        for (key, value) in &self.comments {
            put(&mut out, format!("{key}={value}").as_bytes());
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(s: &str) -> Vec<u8> {
        let mut v = (s.len() as u32).to_le_bytes().to_vec();
        v.extend_from_slice(s.as_bytes());
        v
    }

    #[test]
    fn roundtrip() {
        let vc = VorbisComment {
            vendor: "reference libFLAC 1.4.3".into(),
            comments: vec![
                ("TITLE".into(), "Sine=440".into()),
                ("ARTIST".into(), "nobody".into()),
            ],
        };

        let bytes = vc.to_bytes();
        let decoded = VorbisComment::from_bytes(&bytes, &ReaderOptions::default()).unwrap();
        assert_eq!(decoded, vc);
        assert_eq!(decoded.title(), Some("Sine=440"));
        assert_eq!(decoded.get("artist"), Some("nobody"));
    }

    #[test]
    fn tolerates_empty_and_truncated() {
        let options = ReaderOptions::default();

        let mut bytes = entry("");
        bytes.extend_from_slice(&0u32.to_le_bytes());
        let vc = VorbisComment::from_bytes(&bytes, &options).unwrap();
        assert!(vc.vendor.is_empty() && vc.comments.is_empty());

        // count of 3, one valid entry, one without '=', one overrunning
        let mut bytes = entry("v");
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend(entry("GENRE=test"));
        bytes.extend(entry("garbage"));
        bytes.extend_from_slice(&1000u32.to_le_bytes());
        bytes.extend_from_slice(b"TITLE=");
        let vc = VorbisComment::from_bytes(&bytes, &options).unwrap();
        assert_eq!(vc.vendor, "v");
        assert_eq!(vc.comments, vec![("GENRE".to_string(), "test".to_string())]);

        // vendor length past the end
        let vc = VorbisComment::from_bytes(&[0xFF, 0xFF, 0, 0, b'x'], &options).unwrap();
        assert_eq!(vc, VorbisComment::default());

        // strict mode turns the anomaly into a fault
        assert!(VorbisComment::from_bytes(&bytes, &ReaderOptions::strict()).is_err());
    }
}
