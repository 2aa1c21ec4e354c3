//! Filesystem lease that keeps separation single-flight across the whole host.
//!
//! The lock file holds the acquisition time as an RFC 3339 timestamp. A lock
//! older than the configured timeout is considered abandoned and is removed by
//! the next caller that finds it. Removal happens under a short-lived
//! `<lock>.reclaim` file, so two callers that both saw the same stale lock
//! cannot both replace it.

use crate::error::{Result, SplitterError};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

/// A `.reclaim` file older than this was left by a crashed reclaimer.
const RECLAIM_STALE: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockState {
    Free,
    Held { acquired_at: DateTime<Utc>, age: Duration },
    Stale { acquired_at: DateTime<Utc>, age: Duration },
}

#[derive(Debug)]
pub enum Acquire {
    Acquired(LockGuard),
    /// Someone else holds a fresh lock.
    Busy { age: Duration },
}

#[derive(Clone, Debug)]
pub struct JobLock {
    path: PathBuf,
    timeout: Duration,
}

impl JobLock {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn inspect(&self) -> Result<LockState> {
        self.inspect_at(Utc::now())
    }

    pub fn inspect_at(&self, now: DateTime<Utc>) -> Result<LockState> {
        Ok(self.observe(now)?.0)
    }

    /// Current state plus the raw file content it was judged from.
    fn observe(&self, now: DateTime<Utc>) -> Result<(LockState, String)> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok((LockState::Free, String::new())),
            Err(e) => return Err(e.into()),
        };

        let acquired_at = match parse_timestamp(content.trim()) {
            Some(ts) => ts,
            None => {
                // Half-written or foreign content: date it by mtime instead.
                log::warn!(
                    "lock file {} has unreadable timestamp {:?}, using mtime",
                    self.path.display(),
                    content.trim()
                );
                let modified = match fs::metadata(&self.path) {
                    Ok(m) => m.modified()?,
                    // Released between the read and the stat.
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        return Ok((LockState::Free, String::new()))
                    }
                    Err(e) => return Err(e.into()),
                };
                DateTime::<Utc>::from(modified)
            }
        };

        let age = (now - acquired_at).to_std().unwrap_or(Duration::ZERO);
        let state = if age > self.timeout {
            LockState::Stale { acquired_at, age }
        } else {
            LockState::Held { acquired_at, age }
        };
        Ok((state, content))
    }

    /// True while a fresh lock is held. A stale lock is cleared as a side effect.
    pub fn is_busy(&self) -> Result<bool> {
        let now = Utc::now();
        match self.observe(now)? {
            (LockState::Free, _) => Ok(false),
            (LockState::Held { .. }, _) => Ok(true),
            (LockState::Stale { age, .. }, seen) => Ok(!self.reclaim(&seen, age, now)?),
        }
    }

    pub fn try_acquire(&self) -> Result<Acquire> {
        self.try_acquire_at(Utc::now())
    }

    /// Never blocks: a fresh lock yields [`Acquire::Busy`] and the caller polls again later.
    pub fn try_acquire_at(&self, now: DateTime<Utc>) -> Result<Acquire> {
        match self.observe(now)? {
            (LockState::Held { age, .. }, _) => {
                log::info!("separation lock busy (held for {:.0}s)", age.as_secs_f64());
                return Ok(Acquire::Busy { age });
            }
            (LockState::Stale { age, .. }, seen) => {
                if !self.reclaim(&seen, age, now)? {
                    return Ok(Acquire::Busy { age: Duration::ZERO });
                }
            }
            (LockState::Free, _) => {}
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(f) => f,
            // Lost the race against another acquirer.
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Ok(Acquire::Busy {
                    age: Duration::ZERO,
                })
            }
            Err(e) => return Err(e.into()),
        };
        let stamp = now.to_rfc3339();
        file.write_all(stamp.as_bytes())?;
        file.sync_all()?;

        log::info!("separation lock acquired at {}", self.path.display());
        Ok(Acquire::Acquired(LockGuard {
            path: Some(self.path.clone()),
            stamp,
        }))
    }

    /// Removes the lock file if it still holds `seen`, the content judged stale.
    ///
    /// Returns `false` when another caller is reclaiming or already replaced
    /// the file; the caller then reports busy.
    fn reclaim(&self, seen: &str, age: Duration, now: DateTime<Utc>) -> Result<bool> {
        let Some(_reclaiming) = ReclaimFile::take(&self.path)? else {
            return Ok(false);
        };
        match self.observe(now)? {
            (LockState::Stale { .. }, current) if current == seen => {}
            _ => return Ok(false),
        }

        log::warn!(
            "reclaiming stale separation lock {} ({:.0}s old, timeout {}s)",
            self.path.display(),
            age.as_secs_f64(),
            self.timeout.as_secs()
        );
        remove_if_present(&self.path)?;
        Ok(true)
    }
}

/// `<lock>.reclaim`, held while a stale lock is checked again and removed.
struct ReclaimFile {
    path: PathBuf,
}

impl ReclaimFile {
    fn take(lock: &Path) -> Result<Option<Self>> {
        let mut name = lock.file_name().unwrap_or_default().to_os_string();
        name.push(".reclaim");
        let path = lock.with_file_name(name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Some(Self { path })),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let abandoned = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|m| SystemTime::now().duration_since(m).ok())
                    .is_some_and(|age| age > RECLAIM_STALE);
                if abandoned {
                    log::warn!("removing abandoned {}", path.display());
                    remove_if_present(&path)?;
                }
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for ReclaimFile {
    fn drop(&mut self) {
        if let Err(e) = remove_if_present(&self.path) {
            log::error!("{e}");
        }
    }
}

/// Held lock. The file is removed when the guard is released or dropped,
/// unless it has since been reclaimed and rewritten by another job.
#[derive(Debug)]
#[must_use = "dropping the guard releases the lock"]
pub struct LockGuard {
    path: Option<PathBuf>,
    stamp: String,
}

impl LockGuard {
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Releases now and reports I/O failures that `Drop` would swallow.
    pub fn release(mut self) -> Result<()> {
        match self.path.take() {
            Some(path) => remove_own(&path, &self.stamp),
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = remove_own(&path, &self.stamp) {
                log::error!("failed to release lock {}: {e}", path.display());
            }
        }
    }
}

fn remove_own(path: &Path, stamp: &str) -> Result<()> {
    match fs::read_to_string(path) {
        Ok(content) if content.trim() != stamp => {
            log::warn!(
                "lock {} now belongs to another job, leaving it",
                path.display()
            );
            Ok(())
        }
        Ok(_) => {
            remove_if_present(path)?;
            log::info!("separation lock released");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SplitterError::Lock(format!(
            "cannot remove {}: {e}",
            path.display()
        ))),
    }
}

/// Accepts RFC 3339, or a naive ISO-8601 timestamp read as local time.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc))
}
