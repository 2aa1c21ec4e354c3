//! # track-splitter-core
//!
//! Separates songs into stems with an external separator, one job at a
//! time, caches the results in a fixed `<model>/<song>/<stem>.mp3` layout,
//! and plays the stems back on a single synchronized transport.

pub mod audio;
pub mod catalog;
pub mod config;
pub mod error;
pub mod io;
pub mod job;
pub mod library;
pub mod model;
pub mod player;
pub mod tools;
pub mod types;

pub use crate::{
    audio::{decode_bytes, read_audio, write_audio},
    catalog::{download_file_name, LoadedStem, StemCatalog, StemLookup, StemSet},
    config::{SplitterConfig, ToolSource},
    error::{Result, SplitterError},
    io::{
        paths::{strip_audio_extension, ArtifactLayout},
        progress::{
            intercept_split_progress, set_download_progress_callback, set_split_progress_callback,
            JobProgress, SplitProgress,
        },
    },
    job::{JobLock, JobReport, JobStatus, SeparationRunner},
    library::{CommandFetcher, Library, SongFetcher},
    model::{resolve_model, ModelSpec, Registry},
    player::{load_stems, BufferTrack, MultiTrackPlayer, TickOutcome, TrackHandle},
    tools::{ensure_tool, ToolInstall, ToolProvisioner},
    types::{AudioData, Song, SongSource, StemArtifact},
};
