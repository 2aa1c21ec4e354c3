//! Cache probe over the artifact layout: either every stem a model produces
//! is on disk and gets loaded, or the song still needs separating.

use crate::{
    error::Result,
    io::paths::{strip_audio_extension, ArtifactLayout, STEM_EXTENSION},
    model::ModelSpec,
    types::StemArtifact,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::{fs, io::ErrorKind, path::PathBuf};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedStem {
    pub name: String,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

/// All stems of one (song, model) pair, in the model's stem order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StemSet {
    pub song: String,
    pub model: String,
    stems: Vec<LoadedStem>,
}

impl StemSet {
    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stems.iter().map(|s| s.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadedStem> {
        self.stems.iter()
    }

    pub fn get(&self, stem: &str) -> Option<&[u8]> {
        self.stems
            .iter()
            .find(|s| s.name == stem)
            .map(|s| s.bytes.as_slice())
    }

    /// Self-contained `data:` URI for handing a stem to a browser audio element.
    pub fn data_uri(&self, stem: &str) -> Option<String> {
        self.get(stem)
            .map(|bytes| format!("data:audio/mp3;base64,{}", STANDARD.encode(bytes)))
    }

    pub fn into_stems(self) -> Vec<LoadedStem> {
        self.stems
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StemLookup {
    Ready(StemSet),
    /// At least one stem is absent; lists the ones that are.
    Missing { absent: Vec<String> },
}

impl StemLookup {
    pub fn is_ready(&self) -> bool {
        matches!(self, StemLookup::Ready(_))
    }
}

#[derive(Clone, Debug)]
pub struct StemCatalog {
    layout: ArtifactLayout,
}

impl StemCatalog {
    pub fn new(layout: ArtifactLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn artifacts(&self, song: &str, model: &ModelSpec) -> Vec<StemArtifact> {
        model
            .stems
            .iter()
            .map(|stem| {
                let path = self.layout.stem_path(song, stem, &model.name);
                StemArtifact {
                    song: strip_audio_extension(song).to_string(),
                    model: model.name.clone(),
                    stem: stem.clone(),
                    exists: path.is_file(),
                    path,
                }
            })
            .collect()
    }

    pub fn is_complete(&self, song: &str, model: &ModelSpec) -> bool {
        self.artifacts(song, model).iter().all(|a| a.exists)
    }

    /// Loads every stem of `model` for `song`, or reports which are missing.
    /// Never returns a partial set.
    pub fn resolve(&self, song: &str, model: &ModelSpec) -> Result<StemLookup> {
        let artifacts = self.artifacts(song, model);
        let absent: Vec<String> = artifacts
            .iter()
            .filter(|a| !a.exists)
            .map(|a| a.stem.clone())
            .collect();
        if !absent.is_empty() {
            log::debug!("{song}/{}: missing {}", model.name, absent.join(", "));
            return Ok(StemLookup::Missing { absent });
        }

        let mut stems = Vec::with_capacity(artifacts.len());
        for a in artifacts {
            let bytes = match fs::read(&a.path) {
                Ok(b) => b,
                // Removed between the probe and the read.
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Ok(StemLookup::Missing {
                        absent: vec![a.stem],
                    })
                }
                Err(e) => return Err(e.into()),
            };
            stems.push(LoadedStem {
                name: a.stem,
                path: a.path,
                bytes,
            });
        }

        log::debug!("{song}/{}: {} stems cached", model.name, stems.len());
        Ok(StemLookup::Ready(StemSet {
            song: strip_audio_extension(song).to_string(),
            model: model.name.clone(),
            stems,
        }))
    }
}

/// File name offered when a single stem is downloaded: `<song> - <stem>.mp3`.
pub fn download_file_name(song: &str, stem: &str) -> String {
    format!("{} - {stem}.{STEM_EXTENSION}", strip_audio_extension(song))
}
