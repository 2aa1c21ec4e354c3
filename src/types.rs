use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioData {
    /// Length in seconds of the interleaved sample buffer.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        let frames = self.samples.len() / self.channels as usize;
        frames as f64 / self.sample_rate as f64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SongSource {
    Uploaded,
    Preloaded,
    Downloaded,
}

/// A song sitting in the input directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    /// Display name: the file name without its audio extension.
    pub id: String,
    pub file_name: String,
    pub source: SongSource,
    pub path: PathBuf,
}

/// One (song, model, stem) output and whether it has been produced yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StemArtifact {
    pub song: String,
    pub model: String,
    pub stem: String,
    pub path: PathBuf,
    pub exists: bool,
}
