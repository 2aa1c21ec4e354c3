pub mod args;
pub mod lock;
pub mod runner;

pub use lock::{Acquire, JobLock, LockGuard, LockState};
pub use runner::{JobReport, JobStatus, SeparationRunner};
