use crate::error::{Result, SplitterError};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Extensions stripped from a song identifier before it becomes a directory name.
pub const AUDIO_EXTENSIONS: [&str; 7] = ["mp3", "wav", "flac", "ogg", "m4a", "aac", "opus"];

/// Every stem is written as compressed audio with this extension.
pub const STEM_EXTENSION: &str = "mp3";

/// Removes trailing audio extensions (case-insensitive) from a song identifier.
///
/// Stripping is repeated until no audio extension is left, so applying it
/// twice gives the same result as applying it once.
pub fn strip_audio_extension(song: &str) -> &str {
    let mut current = song;
    while let Some((base, ext)) = current.rsplit_once('.') {
        let is_audio = AUDIO_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(ext));
        if base.is_empty() || !is_audio {
            break;
        }
        current = base;
    }
    current
}

/// Deterministic on-disk layout for separated stems:
/// `<root>/<model>/<song>/<stem>.mp3`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn model_dir(&self, model: &str) -> PathBuf {
        self.root.join(model)
    }

    pub fn song_dir(&self, song: &str, model: &str) -> PathBuf {
        self.model_dir(model).join(strip_audio_extension(song))
    }

    pub fn stem_path(&self, song: &str, stem: &str, model: &str) -> PathBuf {
        self.song_dir(song, model)
            .join(format!("{stem}.{STEM_EXTENSION}"))
    }
}

pub fn tools_cache_dir() -> Result<PathBuf> {
    let proj = ProjectDirs::from("dev", "TrackSplitter", "track-splitter-core")
        .ok_or(SplitterError::Config("cache dir not available".into()))?;
    let mut p = PathBuf::from(proj.cache_dir());
    p.push("tools");
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_single_extension() {
        assert_eq!(strip_audio_extension("demo.mp3"), "demo");
        assert_eq!(strip_audio_extension("demo.MP3"), "demo");
        assert_eq!(strip_audio_extension("demo"), "demo");
    }

    #[test]
    fn strip_is_idempotent() {
        for song in ["a.mp3.mp3", "live.set.wav", "x.flac", ".mp3", "plain"] {
            let once = strip_audio_extension(song);
            assert_eq!(strip_audio_extension(once), once, "{song}");
        }
    }

    #[test]
    fn keeps_non_audio_dots() {
        assert_eq!(strip_audio_extension("Mr. Brightside.mp3"), "Mr. Brightside");
        assert_eq!(strip_audio_extension("v1.2"), "v1.2");
    }
}
