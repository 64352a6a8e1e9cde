//! Locked, atomic HTTP downloads with bounded concurrency and cancellation.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - [`data`] - Configuration and progress types
//! - [`core`] - Pure transformations of response headers and status codes
//! - [`effects`] - I/O behind the [`HttpClient`] trait and the lock polling helpers
//!
//! # Key Features
//!
//! - **Atomic Placement**: bodies stream into a `.downloading` sibling that is
//!   renamed onto the destination only once complete
//! - **Cross-Process Exclusion**: one `.lock` file per destination, polled with
//!   randomized backoff
//! - **Cancellation**: every wait (gate, lock, network) observes a
//!   [`CancellationToken`](tokio_util::sync::CancellationToken)
//! - **Resizable Admission**: [`Gate`] bounds concurrent downloads and can be
//!   shared between callers

pub mod core;
pub mod data;
pub mod effects;
mod error;
mod gate;

pub use self::core::{FileMetadata, RemoteHeaders, is_redirect, is_success, normalize_etag};
pub use data::{FetchOptions, FetchPhase, LockBackoff, Progress, ProgressFn};
pub use effects::lock::{acquire_exclusive, with_exclusive};
pub use effects::{BoxStream, Fetcher, HttpClient, HttpResponse};
pub use error::{Error, Result};
pub use gate::{Gate, GatePermit};

#[cfg(feature = "reqwest")]
pub use effects::ReqwestClient;
