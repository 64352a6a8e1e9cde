//! Pure transformations: header parsing and status classification.

mod metadata;
mod validation;

pub use metadata::{FileMetadata, RemoteHeaders, normalize_etag};
pub use validation::{is_redirect, is_success};
