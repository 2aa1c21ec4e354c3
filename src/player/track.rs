use crate::{audio::decode_bytes, error::Result, types::AudioData};
use std::time::Instant;

/// One independently clocked audio source the player keeps in step with the others.
///
/// Positions and durations are in seconds. Implementations are expected to
/// apply calls immediately; the player never yields between tracks.
pub trait TrackHandle {
    /// `None` until the source knows its length.
    fn duration(&self) -> Option<f64>;
    fn position(&self) -> f64;
    fn set_position(&mut self, secs: f64);
    fn play(&mut self);
    fn pause(&mut self);
    fn is_playing(&self) -> bool;
    fn rate(&self) -> f64;
    fn set_rate(&mut self, rate: f64);
    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);
}

/// A decoded stem played against the wall clock.
///
/// Position is `anchor + elapsed * rate`, re-anchored on every seek, pause
/// and rate change. Like a media element it stops reporting "playing" once it
/// reaches its end.
#[derive(Clone, Debug)]
pub struct BufferTrack {
    audio: AudioData,
    duration: f64,
    anchor_pos: f64,
    anchor_at: Option<Instant>,
    rate: f64,
    volume: f32,
}

impl BufferTrack {
    pub fn new(audio: AudioData) -> Self {
        let duration = audio.duration_secs();
        Self {
            audio,
            duration,
            anchor_pos: 0.0,
            anchor_at: None,
            rate: 1.0,
            volume: 1.0,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<Self> {
        Ok(Self::new(decode_bytes(bytes, extension)?))
    }

    pub fn audio(&self) -> &AudioData {
        &self.audio
    }

    /// Index of the frame under the playhead.
    pub fn current_frame(&self) -> usize {
        (self.position() * self.audio.sample_rate as f64) as usize
    }

    fn rebase(&mut self) {
        self.anchor_pos = self.position();
        if self.anchor_at.is_some() {
            self.anchor_at = Some(Instant::now());
        }
    }
}

impl TrackHandle for BufferTrack {
    fn duration(&self) -> Option<f64> {
        Some(self.duration)
    }

    fn position(&self) -> f64 {
        match self.anchor_at {
            Some(at) => (self.anchor_pos + at.elapsed().as_secs_f64() * self.rate).min(self.duration),
            None => self.anchor_pos,
        }
    }

    fn set_position(&mut self, secs: f64) {
        self.anchor_pos = secs.clamp(0.0, self.duration);
        if self.anchor_at.is_some() {
            self.anchor_at = Some(Instant::now());
        }
    }

    fn play(&mut self) {
        self.anchor_pos = self.position();
        self.anchor_at = Some(Instant::now());
    }

    fn pause(&mut self) {
        self.anchor_pos = self.position();
        self.anchor_at = None;
    }

    fn is_playing(&self) -> bool {
        self.anchor_at.is_some() && self.position() < self.duration
    }

    fn rate(&self) -> f64 {
        self.rate
    }

    fn set_rate(&mut self, rate: f64) {
        self.rebase();
        self.rate = rate;
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }
}
