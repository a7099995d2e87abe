use anyhow::Result;
use mediaprobe::Track;
use mediaprobe::structs::track::MediaType;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamReport {
    pub format: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<u64>,
    pub tracks: Vec<TrackReport>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackReport {
    id: u32,
    #[serde(rename = "type")]
    media_type: String,
    codec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    /// Seconds.
    duration: f64,
    sample_rate: f64,
    sample_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channels: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bit_depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    modified: Option<String>,
    start_offset: i64,
}

fn non_zero(value: u32) -> Option<u32> {
    (value != 0).then_some(value)
}

impl From<&Track> for TrackReport {
    fn from(track: &Track) -> Self {
        let picture = matches!(track.media_type, MediaType::Video | MediaType::Image);

        Self {
            id: track.id,
            media_type: track.media_type.to_string(),
            codec: track.codec.clone(),
            name: track.name.clone(),
            duration: track.duration.as_secs_f64(),
            sample_rate: track.sample_rate,
            sample_count: track.sample_count,
            width: non_zero(track.width).filter(|_| picture),
            height: non_zero(track.height).filter(|_| picture),
            channels: non_zero(track.channels),
            bit_depth: non_zero(track.bit_depth),
            created: track.created.map(|t| t.to_string()),
            modified: track.modified.map(|t| t.to_string()),
            start_offset: track.start_offset,
        }
    }
}

impl StreamReport {
    pub fn new(format: impl ToString, size: u64, records: Option<u64>, tracks: &[Track]) -> Self {
        Self {
            format: format.to_string(),
            size,
            records,
            tracks: tracks.iter().map(TrackReport::from).collect(),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}

#[test]
fn yaml_report() {
    let track = Track {
        id: 1,
        media_type: MediaType::Audio,
        codec: "flac".to_string(),
        sample_rate: 44_100.0,
        sample_count: 441_000,
        duration: std::time::Duration::from_secs(10),
        channels: 2,
        bit_depth: 16,
        ..Default::default()
    };

    let yaml = StreamReport::new("FLAC", 1234, Some(3), &[track])
        .to_yaml()
        .unwrap();

    assert!(yaml.contains("format: FLAC"));
    assert!(yaml.contains("records: 3"));
    assert!(yaml.contains("type: audio"));
    assert!(yaml.contains("sampleCount: 441000"));
    assert!(yaml.contains("bitDepth: 16"));
    assert!(!yaml.contains("width"));
    assert!(!yaml.contains("name"));
}
