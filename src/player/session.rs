use crate::{
    error::{Result, SplitterError},
    player::{format_time, track::TrackHandle},
};
use std::time::Duration;

pub const MIN_RATE: f64 = 0.25;
pub const MAX_RATE: f64 = 1.0;

/// How often the host should call [`MultiTrackPlayer::tick`].
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Tolerance when comparing a position against the loop end.
const POSITION_EPSILON: f64 = 1e-6;

enum Slot<T> {
    Live(T),
    Failed(String),
}

struct Track<T> {
    name: String,
    slot: Slot<T>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrackState {
    Loading,
    Ready { duration: f64 },
    Failed { reason: String },
}

/// What a reconciliation tick did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TickOutcome {
    /// Not every track is playing; nothing was touched.
    Idle,
    Synced { position: f64 },
    /// The loop end was reached and every track went back to the loop start.
    Looped { position: f64 },
}

/// Snapshot for drawing the transport bar.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transport {
    pub position: f64,
    pub duration: Option<f64>,
    pub loop_start: f64,
    pub loop_end: f64,
    pub rate: f64,
    pub playing: bool,
}

impl Transport {
    /// `current / total` as `m:ss / m:ss`.
    pub fn time_label(&self) -> String {
        format!(
            "{} / {}",
            format_time(self.position),
            format_time(self.duration.unwrap_or(0.0))
        )
    }
}

/// Keeps N stems on one shared transport.
///
/// Every multi-track operation touches all live tracks inside a single call.
/// The canonical position is the minimum over tracks, so the display and the
/// loop check never run ahead of the slowest stem.
pub struct MultiTrackPlayer<T: TrackHandle> {
    tracks: Vec<Track<T>>,
    /// Loop window as fractions of the session duration.
    loop_start: f64,
    loop_end: f64,
    rate: f64,
    playing: bool,
    position: f64,
}

impl<T: TrackHandle> Default for MultiTrackPlayer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TrackHandle> MultiTrackPlayer<T> {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            loop_start: 0.0,
            loop_end: 1.0,
            rate: 1.0,
            playing: false,
            position: 0.0,
        }
    }

    /// Adds a track, replacing any existing track with the same name.
    pub fn add_track(&mut self, name: impl Into<String>, mut handle: T) {
        handle.set_rate(self.rate);
        self.insert(name.into(), Slot::Live(handle));
    }

    /// Registers a track whose source could not be loaded at all.
    pub fn add_failed(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.insert(name.into(), Slot::Failed(reason.into()));
    }

    fn insert(&mut self, name: String, slot: Slot<T>) {
        match self.tracks.iter_mut().find(|t| t.name == name) {
            Some(t) => t.slot = slot,
            None => self.tracks.push(Track { name, slot }),
        }
    }

    /// Marks a loaded track as broken, e.g. after a decode error surfaced late.
    pub fn mark_failed(&mut self, name: &str, reason: impl Into<String>) {
        let reason = reason.into();
        if let Some(t) = self.tracks.iter_mut().find(|t| t.name == name) {
            log::warn!("track {name} failed: {reason}");
            if let Slot::Live(h) = &mut t.slot {
                h.pause();
            }
            t.slot = Slot::Failed(reason);
        }
    }

    /// Drops a track from the session; this is how a failed track stops blocking play.
    pub fn remove_track(&mut self, name: &str) -> Option<T> {
        let idx = self.tracks.iter().position(|t| t.name == name)?;
        match self.tracks.remove(idx).slot {
            Slot::Live(h) => Some(h),
            Slot::Failed(_) => None,
        }
    }

    pub fn track_names(&self) -> impl Iterator<Item = &str> {
        self.tracks.iter().map(|t| t.name.as_str())
    }

    pub fn track(&self, name: &str) -> Option<&T> {
        self.tracks.iter().find(|t| t.name == name).and_then(|t| match &t.slot {
            Slot::Live(h) => Some(h),
            Slot::Failed(_) => None,
        })
    }

    pub fn track_mut(&mut self, name: &str) -> Option<&mut T> {
        self.tracks
            .iter_mut()
            .find(|t| t.name == name)
            .and_then(|t| match &mut t.slot {
                Slot::Live(h) => Some(h),
                Slot::Failed(_) => None,
            })
    }

    pub fn track_state(&self, name: &str) -> Option<TrackState> {
        let t = self.tracks.iter().find(|t| t.name == name)?;
        Some(match &t.slot {
            Slot::Failed(reason) => TrackState::Failed {
                reason: reason.clone(),
            },
            Slot::Live(h) => match h.duration() {
                Some(duration) => TrackState::Ready { duration },
                None => TrackState::Loading,
            },
        })
    }

    fn live(&self) -> impl Iterator<Item = &T> {
        self.tracks.iter().filter_map(|t| match &t.slot {
            Slot::Live(h) => Some(h),
            Slot::Failed(_) => None,
        })
    }

    fn live_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.tracks.iter_mut().filter_map(|t| match &mut t.slot {
            Slot::Live(h) => Some(h),
            Slot::Failed(_) => None,
        })
    }

    /// Shortest track duration, once every track knows its duration.
    ///
    /// Using the minimum keeps seeks inside every stem even when encoding
    /// left them a few milliseconds apart.
    pub fn duration(&self) -> Option<f64> {
        if self.tracks.is_empty() {
            return None;
        }
        let mut min = f64::INFINITY;
        for t in &self.tracks {
            match &t.slot {
                Slot::Live(h) => min = min.min(h.duration()?),
                Slot::Failed(_) => return None,
            }
        }
        Some(min)
    }

    /// Session duration, or the first track that keeps the group from playing.
    pub fn check_ready(&self) -> Result<f64> {
        if self.tracks.is_empty() {
            return Err(SplitterError::InvalidInput("no tracks loaded".into()));
        }
        for t in &self.tracks {
            match &t.slot {
                Slot::Failed(reason) => {
                    return Err(SplitterError::TrackLoad {
                        track: t.name.clone(),
                        reason: reason.clone(),
                    })
                }
                Slot::Live(h) if h.duration().is_none() => {
                    return Err(SplitterError::TrackLoad {
                        track: t.name.clone(),
                        reason: "duration not known yet".into(),
                    })
                }
                Slot::Live(_) => {}
            }
        }
        self.duration()
            .ok_or_else(|| SplitterError::InvalidInput("no tracks loaded".into()))
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Loop window as `(start, end)` fractions.
    pub fn loop_region(&self) -> (f64, f64) {
        (self.loop_start, self.loop_end)
    }

    fn loop_secs(&self, duration: f64) -> (f64, f64) {
        (self.loop_start * duration, self.loop_end * duration)
    }

    /// Starts every track from the loop start.
    pub fn play(&mut self) -> Result<()> {
        let duration = self.check_ready()?;
        let (start, _) = self.loop_secs(duration);
        let rate = self.rate;

        // Position everything first so all tracks start from the same spot.
        for h in self.live_mut() {
            h.set_rate(rate);
            h.set_position(start);
        }
        for h in self.live_mut() {
            h.play();
        }
        self.position = start;
        self.playing = true;
        Ok(())
    }

    pub fn pause(&mut self) {
        for h in self.live_mut() {
            h.pause();
        }
        self.playing = false;
    }

    /// Moves every track to `secs`, clamped to the session. Returns the applied position.
    pub fn seek(&mut self, secs: f64) -> Result<f64> {
        let duration = self.check_ready()?;
        let target = if secs.is_nan() {
            0.0
        } else {
            secs.clamp(0.0, duration)
        };
        for h in self.live_mut() {
            h.set_position(target);
        }
        self.position = target;
        Ok(target)
    }

    /// Moves the loop start marker; it cannot pass the end marker.
    ///
    /// Once the duration is known every track jumps to the new start, and
    /// keeps playing if the session was playing.
    pub fn set_loop_start(&mut self, fraction: f64) -> f64 {
        self.loop_start = clamp_fraction(fraction).min(self.loop_end);
        let Some(duration) = self.duration() else {
            return self.loop_start;
        };
        let start = self.loop_start * duration;
        let playing = self.playing;
        for h in self.live_mut() {
            h.set_position(start);
        }
        if playing {
            for h in self.live_mut() {
                h.play();
            }
        }
        self.position = start;
        self.loop_start
    }

    /// Moves the loop end marker; it cannot pass the start marker. Never seeks.
    pub fn set_loop_end(&mut self, fraction: f64) -> f64 {
        self.loop_end = clamp_fraction(fraction).max(self.loop_start);
        self.loop_end
    }

    /// Applies one rate to every track. Returns the clamped rate.
    pub fn set_rate(&mut self, rate: f64) -> f64 {
        let rate = if rate.is_nan() {
            MAX_RATE
        } else {
            rate.clamp(MIN_RATE, MAX_RATE)
        };
        self.rate = rate;
        for h in self.live_mut() {
            h.set_rate(rate);
        }
        rate
    }

    /// Sets one track's gain in `[0, 1]`; other tracks and the transport are untouched.
    pub fn set_volume(&mut self, name: &str, volume: f32) -> Result<f32> {
        let volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        let h = self
            .track_mut(name)
            .ok_or_else(|| SplitterError::InvalidInput(format!("no playable track `{name}`")))?;
        h.set_volume(volume);
        Ok(volume)
    }

    /// Periodic reconciliation, to be called every [`TICK_INTERVAL`].
    ///
    /// While all tracks play, publishes the slowest track's position and
    /// sends every track back to the loop start once that position reaches
    /// the loop end.
    pub fn tick(&mut self) -> TickOutcome {
        if self.tracks.is_empty() {
            return TickOutcome::Idle;
        }
        if self.playing && !self.live().any(|h| h.is_playing()) {
            log::debug!("every track has stopped, session paused");
            self.playing = false;
            return TickOutcome::Idle;
        }
        let all_playing = self.tracks.iter().all(|t| match &t.slot {
            Slot::Live(h) => h.is_playing(),
            Slot::Failed(_) => false,
        });
        if !all_playing {
            return TickOutcome::Idle;
        }

        let rate = self.rate;
        for h in self.live_mut() {
            if h.rate() != rate {
                h.set_rate(rate);
            }
        }

        let canonical = self
            .live()
            .map(|h| h.position())
            .fold(f64::INFINITY, f64::min);
        self.position = canonical;

        let Some(duration) = self.duration() else {
            return TickOutcome::Synced {
                position: canonical,
            };
        };
        let (start, end) = self.loop_secs(duration);
        if canonical + POSITION_EPSILON < end {
            return TickOutcome::Synced {
                position: canonical,
            };
        }

        log::debug!("loop end {end:.3}s reached at {canonical:.3}s, back to {start:.3}s");
        for h in self.live_mut() {
            h.set_position(start);
        }
        for h in self.live_mut() {
            h.play();
        }
        self.position = start;
        TickOutcome::Looped { position: start }
    }

    pub fn transport(&self) -> Transport {
        let duration = self.duration();
        let (loop_start, loop_end) = self.loop_secs(duration.unwrap_or(0.0));
        Transport {
            position: self.position,
            duration,
            loop_start,
            loop_end,
            rate: self.rate,
            playing: self.playing,
        }
    }
}

fn clamp_fraction(f: f64) -> f64 {
    if f.is_nan() {
        0.0
    } else {
        f.clamp(0.0, 1.0)
    }
}
