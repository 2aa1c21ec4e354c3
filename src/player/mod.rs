//! Synchronized multi-stem playback.

mod session;
mod track;

pub use session::{
    MultiTrackPlayer, TickOutcome, TrackState, Transport, MAX_RATE, MIN_RATE, TICK_INTERVAL,
};
pub use track::{BufferTrack, TrackHandle};

use crate::{catalog::StemSet, io::paths::STEM_EXTENSION};

/// Builds a session from a catalog hit. Stems that fail to decode are kept
/// as failed tracks so the rest still load.
pub fn load_stems(stems: &StemSet) -> MultiTrackPlayer<BufferTrack> {
    let mut player = MultiTrackPlayer::new();
    for stem in stems.iter() {
        match BufferTrack::from_bytes(stem.bytes.clone(), Some(STEM_EXTENSION)) {
            Ok(track) => player.add_track(stem.name.clone(), track),
            Err(e) => {
                log::warn!("cannot decode stem {}: {e}", stem.name);
                player.add_failed(stem.name.clone(), e.to_string());
            }
        }
    }
    player
}

/// `m:ss`, as shown next to the seek bar.
pub fn format_time(secs: f64) -> String {
    let secs = if secs.is_finite() && secs > 0.0 {
        secs.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Maps a marker drag offset on a bar of `width` pixels to a `[0, 1]` fraction.
pub fn fraction_from_offset(offset: f64, width: f64) -> f64 {
    if width.is_nan() || width <= 0.0 || offset.is_nan() {
        return 0.0;
    }
    (offset / width).clamp(0.0, 1.0)
}
