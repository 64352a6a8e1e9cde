//! Configuration and progress types shared by the fetcher and its callers.

pub mod options;
pub mod progress;

pub use options::{FetchOptions, FetchPhase, LockBackoff, ProgressFn};
pub use progress::Progress;
