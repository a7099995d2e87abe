//! Elementary stream descriptors assembled from container records.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use anyhow::{Result, anyhow};
use log::Level::Warn;

use crate::log_or_err;
use crate::process::ReaderOptions;
use crate::structs::timestamp::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaType {
    Audio,
    Video,
    Image,
    Data,
    #[default]
    Unknown,
}

impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
            MediaType::Image => "image",
            MediaType::Data => "data",
            MediaType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One logical stream described by a container.
///
/// Fields a format does not carry stay at their default.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Track {
    pub id: u32,
    pub name: Option<String>,
    pub created: Option<Timestamp>,
    pub modified: Option<Timestamp>,
    /// Samples for audio, frames for video.
    pub sample_count: u64,
    pub width: u32,
    pub height: u32,
    /// Start position in edit units.
    pub start_offset: i64,
    pub duration: Duration,
    /// Samples per second for audio, frames per second for video.
    pub sample_rate: f64,
    pub media_type: MediaType,
    pub codec: String,
    pub channels: u32,
    pub bit_depth: u32,
}

impl Track {
    /// Duration of `count` units at `rate` per second. Zero when the rate is
    /// unknown, or with a warning when the result does not fit a [`Duration`].
    pub fn duration_of(count: u64, rate: f64, options: &ReaderOptions) -> Result<Duration> {
        if !(rate > 0.0 && rate.is_finite()) {
            return Ok(Duration::ZERO);
        }

        match Duration::try_from_secs_f64(count as f64 / rate) {
            Ok(duration) => Ok(duration),
            Err(e) => {
                log_or_err!(
                    options,
                    Warn,
                    anyhow!("{count} units at {rate} per second: {e}, using 0")
                );
                Ok(Duration::ZERO)
            }
        }
    }
}

impl Display for Track {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {} {}", self.id, self.media_type, self.codec)?;

        if let Some(name) = &self.name {
            write!(f, " \"{name}\"")?;
        }

        match self.media_type {
            MediaType::Audio => write!(
                f,
                ", {} Hz, {} ch, {} bit",
                self.sample_rate, self.channels, self.bit_depth
            )?,
            MediaType::Video => write!(
                f,
                ", {}x{} @ {:.3} fps",
                self.width, self.height, self.sample_rate
            )?,
            MediaType::Image => write!(f, ", {}x{}", self.width, self.height)?,
            _ => {}
        }

        if !self.duration.is_zero() {
            write!(f, ", {:.3} s", self.duration.as_secs_f64())?;
        }

        Ok(())
    }
}

#[test]
fn test_duration_of() {
    let options = ReaderOptions::default();
    let duration = |count, rate| Track::duration_of(count, rate, &options).unwrap();
    assert_eq!(duration(441_000, 44_100.0), Duration::from_secs(10));
    assert_eq!(duration(100, 0.0), Duration::ZERO);
    assert_eq!(duration(50, 25.0), Duration::from_secs(2));

    let tiny_rate = 1.0 / 2_147_483_647.0;
    assert_eq!(duration(i64::MAX as u64, tiny_rate), Duration::ZERO);
    assert!(Track::duration_of(i64::MAX as u64, tiny_rate, &ReaderOptions::strict()).is_err());
}
