use crate::{
    config::SplitterConfig,
    error::{Result, SplitterError},
    io::{
        paths::ArtifactLayout,
        progress::{
            emit_split_progress, intercept_split_progress, parse_progress_line, ProgressTracker,
            SplitProgress,
        },
    },
    job::{
        args::{display_command, SeparationArgs},
        lock::{Acquire, JobLock, LockGuard},
    },
    model::ModelSpec,
    tools::ToolInstall,
};

use std::{
    collections::VecDeque,
    ffi::OsString,
    fs,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

/// Lines of separator stderr kept for the failure message.
const STDERR_TAIL: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobReport {
    pub song: String,
    pub model: String,
    /// Final stem locations, in the order the separator wrote them.
    pub stems: Vec<PathBuf>,
    pub elapsed: Duration,
}

/// Outcome of a separation request. Busy is not a failure: the caller polls again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Completed(JobReport),
    Busy { lock_age: Duration },
}

/// Runs the external separator, one job at a time host-wide.
pub struct SeparationRunner {
    layout: ArtifactLayout,
    lock: JobLock,
    program: OsString,
    program_args: Vec<OsString>,
    device: String,
    mp3_bitrate: u32,
    tool: Option<ToolInstall>,
}

impl SeparationRunner {
    pub fn new(layout: ArtifactLayout, lock: JobLock) -> Self {
        Self {
            layout,
            lock,
            program: "demucs".into(),
            program_args: Vec::new(),
            device: "cpu".into(),
            mp3_bitrate: 320,
            tool: None,
        }
    }

    pub fn from_config(cfg: &SplitterConfig) -> Self {
        Self::new(
            cfg.layout(),
            JobLock::new(&cfg.lock_path, cfg.lock_timeout()),
        )
        .with_program(
            &cfg.separator_program,
            cfg.separator_args.iter().map(OsString::from),
        )
        .with_device(&cfg.device)
        .with_mp3_bitrate(cfg.mp3_bitrate)
    }

    pub fn with_program(
        mut self,
        program: impl Into<OsString>,
        leading_args: impl IntoIterator<Item = OsString>,
    ) -> Self {
        self.program = program.into();
        self.program_args = leading_args.into_iter().collect();
        self
    }

    pub fn with_device(mut self, device: &str) -> Self {
        self.device = device.to_string();
        self
    }

    pub fn with_mp3_bitrate(mut self, kbps: u32) -> Self {
        self.mp3_bitrate = kbps;
        self
    }

    /// Makes the provisioned tool visible to the separator through its `PATH`.
    pub fn with_tool(mut self, tool: ToolInstall) -> Self {
        self.tool = Some(tool);
        self
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn lock(&self) -> &JobLock {
        &self.lock
    }

    /// Same as [`run`](Self::run), with `observer` receiving progress for
    /// this call only. The hook is installed once the lock is held, so a
    /// busy caller never sees another job's events. The previous progress
    /// callback is restored afterwards, whether the job succeeds, fails or panics.
    pub fn run_with_progress(
        &self,
        song_path: &Path,
        model: &ModelSpec,
        observer: impl Fn(&SplitProgress) + Send + Sync + 'static,
    ) -> Result<JobStatus> {
        let (input, song) = resolve_input(song_path)?;
        let guard = match self.lock.try_acquire()? {
            Acquire::Acquired(guard) => guard,
            Acquire::Busy { age } => return Ok(JobStatus::Busy { lock_age: age }),
        };
        let _hook = intercept_split_progress(observer);
        self.run_locked(guard, &input, song, model)
    }

    /// Separates `song_path` with `model`, blocking until the separator exits.
    ///
    /// Stems are written to a staging directory and moved under
    /// `<root>/<model>/<song>/` only after a successful exit, so a reader
    /// never sees a partial set.
    pub fn run(&self, song_path: &Path, model: &ModelSpec) -> Result<JobStatus> {
        let (input, song) = resolve_input(song_path)?;
        let guard = match self.lock.try_acquire()? {
            Acquire::Acquired(guard) => guard,
            Acquire::Busy { age } => return Ok(JobStatus::Busy { lock_age: age }),
        };
        self.run_locked(guard, &input, song, model)
    }

    fn run_locked(
        &self,
        guard: LockGuard,
        input: &Path,
        song: String,
        model: &ModelSpec,
    ) -> Result<JobStatus> {
        let started = Instant::now();
        emit_split_progress(&SplitProgress::Stage("separate"));

        fs::create_dir_all(self.layout.root())?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(self.layout.root())?;

        self.invoke(input, staging.path(), &model.name)?;

        emit_split_progress(&SplitProgress::Stage("write_stems"));
        let stems = self.promote(staging.path(), input, &song, model)?;

        emit_split_progress(&SplitProgress::Finished);
        guard.release()?;

        let elapsed = started.elapsed();
        log::info!(
            "separated {song} with {} in {:.2}s ({} stems)",
            model.name,
            elapsed.as_secs_f64(),
            stems.len()
        );
        Ok(JobStatus::Completed(JobReport {
            song,
            model: model.name.clone(),
            stems,
            elapsed,
        }))
    }

    fn invoke(&self, input: &Path, out_dir: &Path, model: &str) -> Result<()> {
        let mut args = self.program_args.clone();
        args.extend(
            SeparationArgs {
                output_dir: out_dir,
                model,
                device: &self.device,
                mp3_bitrate: self.mp3_bitrate,
                input,
            }
            .to_args(),
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(tool) = &self.tool {
            cmd.env("PATH", tool.search_path()?);
        }

        let program = self.program.to_string_lossy().into_owned();
        log::info!("running {}", display_command(&self.program, &args));

        let mut child = cmd
            .spawn()
            .map_err(|e| SplitterError::Separation(format!("cannot start {program}: {e}")))?;

        let stdout_logger = child.stdout.take().map(|out| {
            thread::spawn(move || {
                let _ = for_each_segment(out, |line| log::debug!("separator: {line}"));
            })
        });

        let tracker = ProgressTracker::new();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);
        if let Some(err) = child.stderr.take() {
            let read = for_each_segment(err, |segment| {
                if let Some((done, total)) = parse_progress_line(segment) {
                    if let Some(p) = tracker.update(done, total) {
                        emit_split_progress(&SplitProgress::Chunks(p));
                    }
                } else {
                    log::debug!("separator: {segment}");
                    if tail.len() == STDERR_TAIL {
                        tail.pop_front();
                    }
                    tail.push_back(segment.to_string());
                }
            });
            reap_on_error(&mut child, read)?;
        }

        let status = child.wait()?;
        if let Some(handle) = stdout_logger {
            let _ = handle.join();
        }

        if !status.success() {
            let detail = Vec::from(tail).join("\n");
            return Err(SplitterError::Separation(format!(
                "{program} exited with {status}{}{detail}",
                if detail.is_empty() { "" } else { ": " }
            )));
        }
        Ok(())
    }

    /// Moves finished stems from the staging tree into the artifact layout.
    fn promote(
        &self,
        staging: &Path,
        input: &Path,
        song: &str,
        model: &ModelSpec,
    ) -> Result<Vec<PathBuf>> {
        let produced_name = input.file_stem().unwrap_or(input.as_os_str());
        let produced = staging.join(&model.name).join(produced_name);
        if !produced.is_dir() {
            return Err(SplitterError::Separation(format!(
                "separator finished but wrote nothing to {}",
                produced.display()
            )));
        }

        let dest_dir = self.layout.song_dir(song, &model.name);
        fs::create_dir_all(&dest_dir)?;

        let mut entries = fs::read_dir(&produced)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.file_name());

        let mut moved = Vec::with_capacity(entries.len());
        for entry in entries {
            if !entry.file_type()?.is_file() {
                continue;
            }
            let dest = dest_dir.join(entry.file_name());
            if dest.exists() {
                fs::remove_file(&dest)?;
            }
            fs::rename(entry.path(), &dest)?;
            moved.push(dest);
        }

        for stem in &model.stems {
            let expected = self.layout.stem_path(song, stem, &model.name);
            if !moved.contains(&expected) {
                log::warn!("separator did not produce {}", expected.display());
            }
        }
        Ok(moved)
    }
}

/// Checked, canonical input path and its file name.
fn resolve_input(song_path: &Path) -> Result<(PathBuf, String)> {
    fs::metadata(song_path).map_err(|_| {
        SplitterError::InvalidInput(format!("File does not exist: {}", song_path.display()))
    })?;
    let input = fs::canonicalize(song_path)?;
    let song = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| SplitterError::InvalidInput(format!("not a file: {}", input.display())))?;
    Ok((input, song))
}

/// Kills and reaps `child` if reading its output failed.
fn reap_on_error<T>(child: &mut Child, read: std::io::Result<T>) -> Result<T> {
    read.map_err(|e| {
        log::error!("lost separator output ({e}), stopping it");
        let _ = child.kill();
        let _ = child.wait();
        e.into()
    })
}

/// Calls `f` for every non-empty chunk of `reader` delimited by `\n` or `\r`.
///
/// Progress bars redraw with a bare carriage return, so both count as line ends.
fn for_each_segment<R: Read>(reader: R, mut f: impl FnMut(&str)) -> std::io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut pending: Vec<u8> = Vec::new();
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        for &b in buf {
            if b == b'\n' || b == b'\r' {
                if !pending.is_empty() {
                    f(String::from_utf8_lossy(&pending).trim_end());
                    pending.clear();
                }
            } else {
                pending.push(b);
            }
        }
        let len = buf.len();
        reader.consume(len);
    }
    if !pending.is_empty() {
        f(String::from_utf8_lossy(&pending).trim_end());
    }
    Ok(())
}
