use crate::{
    config::ToolSource,
    error::{Result, SplitterError},
    io::{
        crypto::digest_matches,
        net::{fetch_to_file, http_client, Fetched},
    },
    tools::search_path::search_path_with,
};

use std::{
    env,
    ffi::OsString,
    fs::{self, File},
    path::{Path, PathBuf},
};
use walkdir::WalkDir;
use xz2::read::XzDecoder;

/// A located, runnable copy of the external tool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolInstall {
    pub executable: PathBuf,
}

impl ToolInstall {
    pub fn bin_dir(&self) -> &Path {
        self.executable.parent().unwrap_or_else(|| Path::new("."))
    }

    /// `PATH` for child processes with the tool directory in front.
    pub fn search_path(&self) -> Result<OsString> {
        search_path_with(self.bin_dir())
    }
}

pub struct ToolProvisioner {
    source: ToolSource,
    install_dir: PathBuf,
}

impl ToolProvisioner {
    pub fn new(source: ToolSource) -> Result<Self> {
        let install_dir = source.resolved_install_dir()?;
        Ok(Self {
            source,
            install_dir,
        })
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    fn executable_name(&self) -> String {
        format!("{}{}", self.source.binary_name, env::consts::EXE_SUFFIX)
    }

    /// Shallowest file named like the tool under `root`, skipping hidden entries.
    fn find_executable(&self, root: &Path) -> Result<Option<PathBuf>> {
        if !root.is_dir() {
            return Ok(None);
        }
        let wanted = self.executable_name();
        let mut best: Option<(usize, PathBuf)> = None;
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_file() && entry.file_name().to_string_lossy() == wanted {
                if best.as_ref().map_or(true, |(d, _)| entry.depth() < *d) {
                    best = Some((entry.depth(), entry.into_path()));
                }
            }
        }
        Ok(best.map(|(_, p)| p))
    }

    pub fn find_installed(&self) -> Result<Option<ToolInstall>> {
        Ok(self
            .find_executable(&self.install_dir)?
            .map(|executable| ToolInstall { executable }))
    }

    /// Returns the installed tool, downloading and unpacking it on first use.
    pub fn ensure_tool(&self) -> Result<ToolInstall> {
        if let Some(found) = self.find_installed()? {
            log::debug!("{} already installed at {}", self.source.binary_name, found.executable.display());
            return Ok(found);
        }

        fs::create_dir_all(&self.install_dir)?;
        log::info!(
            "installing {} into {}",
            self.source.binary_name,
            self.install_dir.display()
        );

        // One download dir per call; concurrent installers never share it.
        let download = tempfile::Builder::new()
            .prefix(".download-")
            .tempdir_in(&self.install_dir)?;
        let archive = download.path().join("archive.tar.xz");
        let client = http_client()
            .map_err(|e| SplitterError::Provisioning(format!("http client: {e}")))?;
        let fetched = fetch_to_file(&client, &self.source.url, &archive).map_err(|e| {
            SplitterError::Provisioning(format!("download of {} failed: {e}", self.source.url))
        })?;

        self.verify(&fetched)?;
        self.install_from_archive(&archive)
    }

    fn verify(&self, fetched: &Fetched) -> Result<()> {
        let Some(expected) = &self.source.sha256 else {
            return Ok(());
        };
        let ok = digest_matches(&fetched.sha256, expected).map_err(|e| {
            SplitterError::Provisioning(format!("configured sha256 `{expected}` is invalid: {e}"))
        })?;
        if !ok {
            return Err(SplitterError::Provisioning(format!(
                "checksum mismatch for {}: expected {expected}, got {}",
                self.source.url, fetched.sha256
            )));
        }
        log::debug!("{} bytes verified against sha256", fetched.bytes);
        Ok(())
    }

    fn install_from_archive(&self, archive: &Path) -> Result<ToolInstall> {
        let staging = tempfile::Builder::new()
            .prefix(".extract-")
            .tempdir_in(&self.install_dir)?;
        unpack_tar_xz(archive, staging.path())?;

        let found = self.find_executable(staging.path())?.ok_or_else(|| {
            SplitterError::Provisioning(format!(
                "no `{}` executable found in {}",
                self.executable_name(),
                self.source.url
            ))
        })?;
        mark_executable(&found)?;

        // Move the unpacked tree into place only once it is known to be usable.
        let relative = found
            .strip_prefix(staging.path())
            .map_err(|e| SplitterError::Provisioning(e.to_string()))?
            .to_path_buf();
        let executable = self.install_dir.join(relative);
        for entry in fs::read_dir(staging.path())? {
            let entry = entry?;
            let dest = self.install_dir.join(entry.file_name());
            if dest.exists() {
                if executable.is_file() {
                    log::debug!("{} was installed concurrently, keeping it", dest.display());
                    continue;
                }
                // Leftover from an earlier, incomplete install.
                if dest.is_dir() {
                    fs::remove_dir_all(&dest)?;
                } else {
                    fs::remove_file(&dest)?;
                }
            }
            if let Err(e) = fs::rename(entry.path(), &dest) {
                if !dest.exists() {
                    return Err(e.into());
                }
                log::debug!("{} was installed concurrently, keeping it", dest.display());
            }
        }

        if !executable.is_file() {
            return Err(SplitterError::Provisioning(format!(
                "{} is missing after install",
                executable.display()
            )));
        }
        log::info!("installed {}", executable.display());
        Ok(ToolInstall { executable })
    }
}

fn unpack_tar_xz(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut tar = tar::Archive::new(XzDecoder::new(file));
    tar.unpack(dest).map_err(|e| {
        SplitterError::Provisioning(format!("corrupt archive {}: {e}", archive.display()))
    })
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Shorthand for `ToolProvisioner::new(source)?.ensure_tool()`.
pub fn ensure_tool(source: &ToolSource) -> Result<ToolInstall> {
    ToolProvisioner::new(source.clone())?.ensure_tool()
}
