//! Runtime configuration.
//!
//! Defaults match the layout the app has always used (`inputs/` and
//! `separated/` next to the working directory). A JSON file can replace any
//! field and `TRACK_SPLITTER_*` environment variables override both.

use crate::{
    error::{Result, SplitterError},
    io::paths::{tools_cache_dir, ArtifactLayout},
};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const ENV_INPUT_DIR: &str = "TRACK_SPLITTER_INPUT_DIR";
pub const ENV_OUTPUT_DIR: &str = "TRACK_SPLITTER_OUTPUT_DIR";
pub const ENV_LOCK_FILE: &str = "TRACK_SPLITTER_LOCK_FILE";
pub const ENV_LOCK_TIMEOUT_SECS: &str = "TRACK_SPLITTER_LOCK_TIMEOUT_SECS";
pub const ENV_SEPARATOR: &str = "TRACK_SPLITTER_SEPARATOR";
pub const ENV_TOOL_DIR: &str = "TRACK_SPLITTER_TOOL_DIR";
pub const ENV_TOOL_URL: &str = "TRACK_SPLITTER_TOOL_URL";

/// Seconds after which a held separation lock counts as abandoned.
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 1000;

/// Where the external decoding tool comes from and where it is unpacked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSource {
    /// `.tar.xz` archive containing the executable somewhere in its tree.
    pub url: String,
    pub binary_name: String,
    pub sha256: Option<String>,
    /// Falls back to the per-user cache dir when unset.
    pub install_dir: Option<PathBuf>,
}

impl Default for ToolSource {
    fn default() -> Self {
        let arch = match env::consts::ARCH {
            "aarch64" => "arm64",
            _ => "amd64",
        };
        Self {
            url: format!(
                "https://johnvansickle.com/ffmpeg/releases/ffmpeg-release-{arch}-static.tar.xz"
            ),
            binary_name: "ffmpeg".into(),
            sha256: None,
            install_dir: None,
        }
    }
}

impl ToolSource {
    pub fn resolved_install_dir(&self) -> Result<PathBuf> {
        match &self.install_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(tools_cache_dir()?.join(&self.binary_name)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub lock_path: PathBuf,
    pub lock_timeout_secs: u64,
    /// Program invoked for separation; receives demucs-style flags.
    pub separator_program: String,
    /// Arguments placed before the generated flags, e.g. `["-m", "demucs"]`
    /// when the program is a Python interpreter.
    pub separator_args: Vec<String>,
    pub device: String,
    pub mp3_bitrate: u32,
    pub tool: ToolSource,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("inputs"),
            output_dir: PathBuf::from("separated"),
            lock_path: env::temp_dir().join("track-splitter.lock"),
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
            separator_program: "demucs".into(),
            separator_args: Vec::new(),
            device: "cpu".into(),
            mp3_bitrate: 320,
            tool: ToolSource::default(),
        }
    }
}

impl SplitterConfig {
    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// Reads a JSON config file, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            SplitterError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut cfg: Self = serde_json::from_str(&text)?;
        log::info!("loaded config from {}", path.display());
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from any key lookup; used with the process environment.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup(ENV_INPUT_DIR) {
            self.input_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_OUTPUT_DIR) {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_LOCK_FILE) {
            self.lock_path = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_LOCK_TIMEOUT_SECS) {
            self.lock_timeout_secs = v.trim().parse().map_err(|_| {
                SplitterError::Config(format!("{ENV_LOCK_TIMEOUT_SECS} must be whole seconds, got `{v}`"))
            })?;
        }
        if let Some(v) = lookup(ENV_SEPARATOR) {
            self.separator_program = v;
        }
        if let Some(v) = lookup(ENV_TOOL_DIR) {
            self.tool.install_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup(ENV_TOOL_URL) {
            self.tool.url = v;
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(&self.output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn overrides_replace_defaults() {
        let vars: HashMap<&str, &str> = [
            (ENV_OUTPUT_DIR, "/srv/stems"),
            (ENV_LOCK_TIMEOUT_SECS, "30"),
            (ENV_SEPARATOR, "/opt/demucs/bin/demucs"),
        ]
        .into_iter()
        .collect();
        let mut cfg = SplitterConfig::default();
        cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.output_dir, PathBuf::from("/srv/stems"));
        assert_eq!(cfg.lock_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.separator_program, "/opt/demucs/bin/demucs");
        assert_eq!(cfg.input_dir, PathBuf::from("inputs"));
    }

    #[test]
    fn bad_timeout_is_a_config_error() {
        let mut cfg = SplitterConfig::default();
        let err = cfg
            .apply_overrides(|k| (k == ENV_LOCK_TIMEOUT_SECS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, SplitterError::Config(_)));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: SplitterConfig = serde_json::from_str(r#"{"mp3_bitrate": 256}"#).unwrap();
        assert_eq!(cfg.mp3_bitrate, 256);
        assert_eq!(cfg.lock_timeout_secs, DEFAULT_LOCK_TIMEOUT_SECS);
        assert_eq!(cfg.tool.binary_name, "ffmpeg");
    }
}
