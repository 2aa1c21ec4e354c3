use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

type DownloadCallback = Arc<dyn Fn(u64, u64) + Send + Sync + 'static>;
type SplitCallback = Arc<dyn Fn(&SplitProgress) + Send + Sync + 'static>;

static DOWNLOAD_PROGRESS_CB: OnceLock<Mutex<Option<DownloadCallback>>> = OnceLock::new();
static SPLIT_HOOKS: OnceLock<Mutex<SplitHooks>> = OnceLock::new();

/// The process-wide split callback plus any scoped overrides, newest last.
#[derive(Default)]
struct SplitHooks {
    global: Option<SplitCallback>,
    scoped: Vec<(u64, SplitCallback)>,
    next_id: u64,
}

impl SplitHooks {
    fn active(&self) -> Option<SplitCallback> {
        self.scoped
            .last()
            .map(|(_, cb)| Arc::clone(cb))
            .or_else(|| self.global.clone())
    }
}

fn split_hooks() -> MutexGuard<'static, SplitHooks> {
    SPLIT_HOOKS
        .get_or_init(|| Mutex::new(SplitHooks::default()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn slot<T>(cell: &'static OnceLock<Mutex<Option<T>>>) -> MutexGuard<'static, Option<T>> {
    cell.get_or_init(|| Mutex::new(None))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn set_download_progress_callback(cb: impl Fn(u64, u64) + Send + Sync + 'static) {
    *slot(&DOWNLOAD_PROGRESS_CB) = Some(Arc::new(cb));
}

pub fn emit_download_progress(done: u64, total: u64) {
    // Clone out so the callback runs without the slot locked.
    let cb = slot(&DOWNLOAD_PROGRESS_CB).clone();
    if let Some(cb) = cb {
        cb(done, total);
    }
}

/// Events emitted while a separation job runs.
#[derive(Clone, Debug, PartialEq)]
pub enum SplitProgress {
    Stage(&'static str),
    Chunks(JobProgress),
    Finished,
}

/// A normalized "N of Total" update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JobProgress {
    pub done: f64,
    pub total: f64,
    /// Whole percent in `0..=100`.
    pub percent: u8,
    pub elapsed: Duration,
    pub remaining: Duration,
}

impl JobProgress {
    pub fn is_complete(&self) -> bool {
        self.done >= self.total
    }

    pub fn status_line(&self) -> String {
        format!(
            "Progress: {}% | Elapsed: {:.2}s | Remaining: {:.2}s",
            self.percent,
            self.elapsed.as_secs_f64(),
            self.remaining.as_secs_f64()
        )
    }
}

/// Turns raw unit counts into [`JobProgress`] with elapsed and estimated time left.
#[derive(Clone, Copy, Debug)]
pub struct ProgressTracker {
    started: Instant,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(started: Instant) -> Self {
        Self { started }
    }

    pub fn update(&self, done: f64, total: f64) -> Option<JobProgress> {
        self.update_at(done, total, Instant::now())
    }

    /// Returns `None` when `total` is unknown (zero, negative or NaN).
    pub fn update_at(&self, done: f64, total: f64, now: Instant) -> Option<JobProgress> {
        if total.is_nan() || total <= 0.0 {
            return None;
        }
        let done = done.clamp(0.0, total);
        let percent = ((done / total) * 100.0).floor().min(100.0) as u8;
        let elapsed = now.saturating_duration_since(self.started);
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 { done / secs } else { 0.0 };
        let remaining = if rate > 0.0 && total > done {
            Duration::from_secs_f64((total - done) / rate)
        } else {
            Duration::ZERO
        };
        Some(JobProgress {
            done,
            total,
            percent,
            elapsed,
            remaining,
        })
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the process-wide separation progress callback.
///
/// While a scoped hook from [`intercept_split_progress`] is active, events
/// go to the hook and this callback takes over again once it is dropped.
pub fn set_split_progress_callback(cb: impl Fn(&SplitProgress) + Send + Sync + 'static) {
    split_hooks().global = Some(Arc::new(cb));
}

pub fn emit_split_progress(progress: &SplitProgress) {
    let cb = split_hooks().active();
    if let Some(cb) = cb {
        cb(progress);
    }
}

/// Routes separation progress to `cb` until the guard is dropped.
///
/// Guards may be dropped in any order: each removes only its own hook, and
/// once none are left the global callback receives events again. Dropping
/// also happens during unwinding.
pub fn intercept_split_progress(
    cb: impl Fn(&SplitProgress) + Send + Sync + 'static,
) -> ProgressHookGuard {
    let mut hooks = split_hooks();
    let id = hooks.next_id;
    hooks.next_id += 1;
    hooks.scoped.push((id, Arc::new(cb)));
    ProgressHookGuard { id }
}

#[must_use = "the hook is removed as soon as the guard is dropped"]
pub struct ProgressHookGuard {
    id: u64,
}

impl Drop for ProgressHookGuard {
    fn drop(&mut self) {
        split_hooks().scoped.retain(|(id, _)| *id != self.id);
    }
}

/// Extracts the `done/total` pair from a tqdm-style progress line such as
/// ` 37%|███▋      | 64.35/175.5 [00:21<00:36,  3.02seconds/s]`.
pub fn parse_progress_line(line: &str) -> Option<(f64, f64)> {
    line.split(|c: char| c == '|' || c.is_whitespace())
        .filter_map(|token| token.split_once('/'))
        .find_map(|(done, total)| {
            let done = done.parse::<f64>().ok()?;
            let total = total.parse::<f64>().ok()?;
            Some((done, total))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tqdm_counts() {
        let line = " 37%|███▋      | 64.35/175.5 [00:21<00:36,  3.02seconds/s]";
        assert_eq!(parse_progress_line(line), Some((64.35, 175.5)));
        assert_eq!(parse_progress_line("100%|██████████| 12/12 [00:04<00:00]"), Some((12.0, 12.0)));
    }

    #[test]
    fn ignores_lines_without_counts() {
        assert_eq!(parse_progress_line("Separating track demo.mp3"), None);
        assert_eq!(parse_progress_line("3.02seconds/s]"), None);
    }

    #[test]
    fn tracker_estimates_remaining_time() {
        let start = Instant::now();
        let tracker = ProgressTracker::started_at(start);
        let p = tracker
            .update_at(25.0, 100.0, start + Duration::from_secs(10))
            .unwrap();
        assert_eq!(p.percent, 25);
        assert_eq!(p.elapsed, Duration::from_secs(10));
        assert!((p.remaining.as_secs_f64() - 30.0).abs() < 1e-6);
        assert!(!p.is_complete());
    }

    #[test]
    fn tracker_rejects_unknown_total() {
        let tracker = ProgressTracker::new();
        assert!(tracker.update(3.0, 0.0).is_none());
        assert!(tracker.update(3.0, f64::NAN).is_none());
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> SplitCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let make = move |tag: &'static str| -> SplitCallback {
            let sink = Arc::clone(&sink);
            Arc::new(move |_: &SplitProgress| sink.lock().unwrap().push(tag.to_string()))
        };
        (seen, make)
    }

    // The only test in this binary that touches the split hooks.
    #[test]
    fn scoped_hooks_restore_the_global_callback_in_any_drop_order() {
        let (seen, make) = recorder();
        let global = make("global");
        set_split_progress_callback(move |p| global(p));

        let job = make("job");
        let first = intercept_split_progress(move |p| job(p));
        let other = make("other");
        let second = intercept_split_progress(move |p| other(p));
        emit_split_progress(&SplitProgress::Finished);

        drop(first);
        emit_split_progress(&SplitProgress::Finished);
        drop(second);
        emit_split_progress(&SplitProgress::Finished);

        assert_eq!(*seen.lock().unwrap(), vec!["other", "other", "global"]);
        split_hooks().global = None;
    }

    #[test]
    fn status_line_format() {
        let p = JobProgress {
            done: 50.0,
            total: 100.0,
            percent: 50,
            elapsed: Duration::from_millis(1500),
            remaining: Duration::from_millis(1500),
        };
        assert_eq!(p.status_line(), "Progress: 50% | Elapsed: 1.50s | Remaining: 1.50s");
    }
}
