//! Song intake: uploads, URL downloads and the preloaded input directory.

use crate::{
    error::{Result, SplitterError},
    io::paths::strip_audio_extension,
    types::{Song, SongSource},
};
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

impl Song {
    pub fn from_path(path: PathBuf, source: SongSource) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| SplitterError::InvalidInput(format!("not a file: {}", path.display())))?;
        Ok(Self {
            id: strip_audio_extension(&file_name).to_string(),
            file_name,
            source,
            path,
        })
    }
}

/// Reduces an uploaded name to a plain file name that stays inside the input dir.
pub fn sanitize_file_name(name: &str) -> Result<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim().trim_start_matches('.').trim();
    if cleaned.is_empty() {
        return Err(SplitterError::InvalidInput(format!(
            "unusable file name `{name}`"
        )));
    }
    Ok(cleaned.to_string())
}

#[derive(Clone, Debug)]
pub struct Library {
    input_dir: PathBuf,
}

impl Library {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    /// Non-hidden files in the input directory, sorted by name.
    pub fn list_songs(&self) -> Result<Vec<Song>> {
        let entries = match fs::read_dir(&self.input_dir) {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut songs = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if !entry.file_type()?.is_file() {
                continue;
            }
            songs.push(Song::from_path(entry.path(), SongSource::Preloaded)?);
        }
        songs.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(songs)
    }

    pub fn song(&self, file_name: &str) -> Result<Song> {
        let path = self.input_dir.join(sanitize_file_name(file_name)?);
        if !path.is_file() {
            return Err(SplitterError::InvalidInput(format!(
                "no song named `{file_name}` in {}",
                self.input_dir.display()
            )));
        }
        Song::from_path(path, SongSource::Preloaded)
    }

    /// Saves uploaded bytes. An existing file with the same name is kept as is.
    pub fn save_upload(&self, file_name: &str, bytes: &[u8]) -> Result<Song> {
        let name = sanitize_file_name(file_name)?;
        let path = self.input_dir.join(&name);
        if path.exists() {
            log::info!("upload {name} already present, keeping existing file");
        } else {
            fs::create_dir_all(&self.input_dir)?;
            let tmp = self.input_dir.join(format!(".{name}.part"));
            fs::write(&tmp, bytes)?;
            fs::rename(&tmp, &path)?;
            log::info!("saved upload {name} ({} bytes)", bytes.len());
        }
        Song::from_path(path, SongSource::Uploaded)
    }

    pub fn fetch(&self, fetcher: &dyn SongFetcher, url: &str) -> Result<Song> {
        fs::create_dir_all(&self.input_dir)?;
        let url = normalize_video_url(url);
        let path = fetcher.fetch(&url, &self.input_dir)?;
        Song::from_path(path, SongSource::Downloaded)
    }
}

/// Downloads audio from a URL into the input directory and returns the saved file.
pub trait SongFetcher {
    fn fetch(&self, url: &str, input_dir: &Path) -> Result<PathBuf>;
}

/// Rewrites `https://youtu.be/<id>?si=…` share links to the watch URL form.
pub fn normalize_video_url(url: &str) -> String {
    let url = url.trim();
    if !url.contains("youtu.be") {
        return url.to_string();
    }
    let last = url.rsplit('/').next().unwrap_or(url);
    let video = last.split('?').next().unwrap_or(last);
    format!("https://www.youtube.com/watch?v={video}")
}

/// Runs a yt-dlp compatible downloader extracting mp3 audio at 192 kbps.
#[derive(Clone, Debug)]
pub struct CommandFetcher {
    program: PathBuf,
}

impl Default for CommandFetcher {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

impl CommandFetcher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl SongFetcher for CommandFetcher {
    fn fetch(&self, url: &str, input_dir: &Path) -> Result<PathBuf> {
        let template = input_dir.join("%(title)s.%(ext)s");
        log::info!("fetching {url}");
        let output = Command::new(&self.program)
            .args(["-f", "bestaudio/best", "-x", "--audio-format", "mp3"])
            .args(["--audio-quality", "192K"])
            .arg("--add-header")
            .arg(format!("User-Agent:{BROWSER_UA}"))
            .args(["--print", "after_move:filepath"])
            .arg("-o")
            .arg(&template)
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                SplitterError::Fetch(format!("cannot start {}: {e}", self.program.display()))
            })?;

        if !output.status.success() {
            return Err(SplitterError::Fetch(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| SplitterError::Fetch(format!("no file reported for {url}")))?;
        if !path.is_file() {
            return Err(SplitterError::Fetch(format!(
                "downloader reported {} but it does not exist",
                path.display()
            )));
        }
        Ok(path)
    }
}
