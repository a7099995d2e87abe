//! Local sets: a sequence of 2-byte tag, 2-byte length, value items, all
//! big-endian.

use anyhow::{Result, bail};

use crate::structs::mxf::label::UL_LEN;
use crate::structs::timestamp::Timestamp;
use crate::utils::errors::{DecodeError, MxfError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rational {
    pub numerator: i32,
    pub denominator: i32,
}

impl Rational {
    pub const fn new(numerator: i32, denominator: i32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// `None` for a zero numerator or denominator.
    pub fn as_f64(&self) -> Option<f64> {
        (self.numerator != 0 && self.denominator != 0)
            .then(|| self.numerator as f64 / self.denominator as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalItem<'a> {
    pub tag: u16,
    pub value: &'a [u8],
}

impl<'a> LocalItem<'a> {
    fn fixed<const N: usize>(&self, record: &'static str) -> Result<[u8; N]> {
        match self.value.get(..N) {
            Some(bytes) => Ok(bytes.try_into()?),
            None => bail!(DecodeError::PayloadTooShort {
                record,
                expected: N,
                actual: self.value.len(),
            }),
        }
    }

    pub fn u8(&self) -> Result<u8> {
        Ok(self.fixed::<1>("UInt8")?[0])
    }

    pub fn u16(&self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.fixed("UInt16")?))
    }

    pub fn u32(&self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.fixed("UInt32")?))
    }

    pub fn u64(&self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.fixed("UInt64")?))
    }

    pub fn i64(&self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.fixed("Int64")?))
    }

    pub fn rational(&self) -> Result<Rational> {
        let raw: [u8; 8] = self.fixed("Rational")?;
        Ok(Rational {
            numerator: i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]),
            denominator: i32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]),
        })
    }

    /// A Universal Label or a strong reference (UUID), both 16 bytes.
    pub fn ul(&self) -> Result<[u8; UL_LEN]> {
        self.fixed("UL")
    }

    pub fn timestamp(&self) -> Result<Option<Timestamp>> {
        Timestamp::from_mxf_bytes(&self.fixed("Timestamp")?)
    }

    /// UTF-16BE string, trailing NULs dropped.
    pub fn utf16(&self) -> String {
        let units: Vec<u16> = self
            .value
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .take_while(|&u| u != 0)
            .collect();
        String::from_utf16_lossy(&units)
    }

    /// Batch or array of 16-byte references: count, item size, items.
    pub fn ul_batch(&self) -> Result<Vec<[u8; UL_LEN]>> {
        let header: [u8; 8] = self.fixed("Batch")?;
        let count = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let size = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;

        if size != UL_LEN || self.value.len() < 8 + count * UL_LEN {
            bail!(DecodeError::PayloadTooShort {
                record: "Batch",
                expected: 8 + count.saturating_mul(UL_LEN),
                actual: self.value.len(),
            });
        }

        Ok(self.value[8..8 + count * UL_LEN]
            .chunks_exact(UL_LEN)
            .filter_map(|c| c.try_into().ok())
            .collect())
    }
}

/// Iterator over the items of a local set. Yields a fault once when an item
/// runs past the end, then stops.
#[derive(Debug, Clone)]
pub struct LocalSet<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> LocalSet<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }
}

impl<'a> Iterator for LocalSet<'a> {
    type Item = Result<LocalItem<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.bytes.len() - self.pos;
        if remaining == 0 {
            return None;
        }

        let offset = self.pos;
        let fault = |length| -> Option<Self::Item> {
            Some(Err(MxfError::MalformedLocalSet {
                offset,
                length,
                remaining,
            }
            .into()))
        };

        if remaining < 4 {
            self.pos = self.bytes.len();
            return fault(4);
        }

        let b = &self.bytes[offset..];
        let tag = u16::from_be_bytes([b[0], b[1]]);
        let length = u16::from_be_bytes([b[2], b[3]]) as usize;
        if 4 + length > remaining {
            self.pos = self.bytes.len();
            return fault(4 + length);
        }

        self.pos += 4 + length;
        Some(Ok(LocalItem {
            tag,
            value: &b[4..4 + length],
        }))
    }
}

#[cfg(test)]
pub(crate) fn encode_item(tag: u16, value: &[u8]) -> Vec<u8> {
    let mut out = tag.to_be_bytes().to_vec();
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_and_values() {
        let mut bytes = encode_item(0x4801, &7u32.to_be_bytes());
        bytes.extend(encode_item(
            0x4B01,
            &[0, 0, 0x75, 0x30, 0, 0, 0x03, 0xE9],
        ));
        bytes.extend(encode_item(0x4802, &[0, b'V', 0, b'1', 0, 0]));
        let mut batch = 2u32.to_be_bytes().to_vec();
        batch.extend_from_slice(&16u32.to_be_bytes());
        batch.extend_from_slice(&[0xAA; 16]);
        batch.extend_from_slice(&[0xBB; 16]);
        bytes.extend(encode_item(0x4403, &batch));

        let items: Vec<_> = LocalSet::new(&bytes).collect::<Result<_>>().unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].u32().unwrap(), 7);
        let rate = items[1].rational().unwrap();
        assert_eq!(rate, Rational::new(30_000, 1001));
        assert!((rate.as_f64().unwrap() - 29.97).abs() < 0.001);
        assert_eq!(items[2].utf16(), "V1");
        assert_eq!(items[3].ul_batch().unwrap(), vec![[0xAA; 16], [0xBB; 16]]);
        assert!(items[0].u64().is_err());
    }

    #[test]
    fn overrunning_item_faults_once() {
        let mut bytes = encode_item(0x3C0A, &[1; 16]);
        bytes.extend_from_slice(&[0x48, 0x01, 0x00, 0x10, 0x00]);

        let mut set = LocalSet::new(&bytes);
        assert!(set.next().unwrap().is_ok());
        let err = set.next().unwrap().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MxfError>(),
            Some(MxfError::MalformedLocalSet {
                offset: 20,
                length: 20,
                remaining: 5
            })
        ));
        assert!(set.next().is_none());
    }
}
