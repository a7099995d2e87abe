//! Calendar timestamps carried by container metadata.
//!
//! MXF stores dates as 8 bytes: big-endian year, month, day, hour, minute,
//! second and a final byte counting quarter milliseconds (units of 4 ms).

use std::fmt::{Display, Formatter};

use anyhow::{Result, bail};
use log::trace;

use crate::utils::errors::MxfError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub millisecond: u16,
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )?;

        if self.millisecond > 0 {
            write!(f, ".{:03}", self.millisecond)?;
        }

        Ok(())
    }
}

impl Timestamp {
    /// Decodes an MXF timestamp. An all-zero value means "unknown".
    pub fn from_mxf_bytes(buffer: &[u8; 8]) -> Result<Option<Self>> {
        if buffer.iter().all(|&b| b == 0) {
            return Ok(None);
        }

        let timestamp = Timestamp {
            year: u16::from_be_bytes([buffer[0], buffer[1]]),
            month: buffer[2],
            day: buffer[3],
            hour: buffer[4],
            minute: buffer[5],
            second: buffer[6],
            millisecond: buffer[7] as u16 * 4,
        };

        if !(1..=12).contains(&timestamp.month)
            || !(1..=31).contains(&timestamp.day)
            || timestamp.hour > 23
            || timestamp.minute > 59
            || timestamp.second > 60
            || timestamp.millisecond > 999
        {
            bail!(MxfError::InvalidTimestamp(*buffer));
        }

        trace!("MXF timestamp: {timestamp}");

        Ok(Some(timestamp))
    }
}

#[test]
fn test_mxf_timestamp() {
    let ts = Timestamp::from_mxf_bytes(&[0x07, 0xE8, 3, 14, 15, 9, 26, 125])
        .unwrap()
        .unwrap();
    assert_eq!(ts.to_string(), "2024-03-14T15:09:26.500");

    assert!(Timestamp::from_mxf_bytes(&[0; 8]).unwrap().is_none());
    assert!(Timestamp::from_mxf_bytes(&[0x07, 0xE8, 13, 1, 0, 0, 0, 0]).is_err());
}
