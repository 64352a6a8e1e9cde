//! Network and filesystem effects: the HTTP seam, lock polling and the fetcher.

mod fetcher;
mod http;
pub mod lock;

pub use fetcher::Fetcher;
pub use http::{BoxStream, HttpClient, HttpResponse};
#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
