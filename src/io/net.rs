use crate::{
    error::{Result, SplitterError},
    io::{crypto::Sha256Stream, progress::emit_download_progress},
};
use reqwest::blocking::Client;
use std::{
    ffi::OsString,
    io::{BufWriter, Read, Write},
    path::Path,
    time::Duration,
};
use tempfile::NamedTempFile;

const CHUNK: usize = 64 * 1024;

/// What landed on disk after a completed download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fetched {
    pub bytes: u64,
    pub sha256: String,
}

pub fn http_client() -> Result<Client> {
    let client = Client::builder()
        .user_agent(concat!("track-splitter/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60 * 60))
        .build()?;
    Ok(client)
}

/// Uniquely named `<dest>.XXXXXX.part` next to `dest`, removed unless persisted.
fn part_file(dest: &Path) -> Result<NamedTempFile> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut prefix: OsString = dest.file_name().unwrap_or_default().to_os_string();
    prefix.push(".");
    Ok(tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".part")
        .tempfile_in(dir)?)
}

/// Streams `url` into `dest`, hashing on the way.
///
/// Bytes go to a private `.part` file first and are renamed only once the
/// body is complete, so `dest` never holds a truncated file and two
/// concurrent downloads never write into the same file.
pub fn fetch_to_file(client: &Client, url: &str, dest: &Path) -> Result<Fetched> {
    let mut resp = client.get(url).send()?.error_for_status()?;

    let expected = resp.content_length();
    let total = expected.unwrap_or(0);
    log::info!("downloading {url} ({total} bytes) to {}", dest.display());
    emit_download_progress(0, total);

    let part = part_file(dest)?;
    let mut out = BufWriter::new(part);
    let mut digest = Sha256Stream::new();
    let mut done: u64 = 0;
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = match resp.read(&mut buf)? {
            0 => break,
            n => n,
        };
        out.write_all(&buf[..n])?;
        digest.update(&buf[..n]);
        done += n as u64;
        emit_download_progress(done, total);
    }
    let part = out.into_inner().map_err(|e| e.into_error())?;
    part.as_file().sync_all()?;

    if let Some(expected) = expected {
        if done != expected {
            return Err(SplitterError::Anyhow(anyhow::anyhow!(
                "{url} ended after {done} of {expected} bytes"
            )));
        }
    }

    part.persist(dest).map_err(|e| e.error)?;
    emit_download_progress(done, done);

    Ok(Fetched {
        bytes: done,
        sha256: digest.finish(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_files_are_private_and_sit_next_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tool.tar.xz");

        let a = part_file(&dest).unwrap();
        let b = part_file(&dest).unwrap();
        assert_ne!(a.path(), b.path());
        for part in [&a, &b] {
            assert_eq!(part.path().parent(), Some(dir.path()));
            let name = part.path().file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.starts_with("tool.tar.xz.") && name.ends_with(".part"), "{name}");
        }

        let (a_path, b_path) = (a.path().to_path_buf(), b.path().to_path_buf());
        drop((a, b));
        assert!(!a_path.exists() && !b_path.exists());
    }
}
