use anyhow::Result;
use log::debug;

use crate::process::RecordReader;
use crate::structs::track::Track;

/// Track assembly on top of a [`RecordReader`].
///
/// [`get_tracks`](Self::get_tracks) assembles once and caches the result in
/// the reader. The reader's offset is restored afterwards, whether assembly
/// succeeds or not.
pub trait TrackSource: RecordReader {
    /// Walks the records relevant to track discovery. Free to move the
    /// offset.
    fn assemble_tracks(&mut self) -> Result<Vec<Track>>;

    fn track_cache(&mut self) -> &mut Option<Vec<Track>>;

    fn get_tracks(&mut self) -> Result<&[Track]> {
        if self.track_cache().is_none() {
            let saved = self.offset();
            let assembled = self.assemble_tracks();
            self.set_offset(saved);

            let tracks = assembled?;
            debug!("Assembled {} track(s)", tracks.len());
            *self.track_cache() = Some(tracks);
        }

        Ok(self.track_cache().get_or_insert_default())
    }
}
