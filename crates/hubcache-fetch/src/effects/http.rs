use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;

use crate::core::RemoteHeaders;

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Status line and streaming body of a GET request.
pub struct HttpResponse<E> {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes, E>>,
}

/// Asynchronous HTTP client abstraction.
///
/// This trait provides the minimal interface the fetcher needs. Implementations
/// handle their own timeouts and connection pooling.
///
/// # Implementations
///
/// - [`ReqwestClient`]: production implementation using `reqwest`
/// - In-memory implementations for testing
pub trait HttpClient: Send + Sync {
    /// Error type for transport failures. HTTP error statuses are not errors
    /// at this level; they are reported through the returned status.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Issue a GET request and return the response body as a stream.
    ///
    /// Redirects may be followed.
    fn stream(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<HttpResponse<Self::Error>, Self::Error>> + Send;

    /// Issue a HEAD request without following redirects, so that a
    /// `Location` header stays visible to the caller.
    fn head(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<RemoteHeaders, Self::Error>> + Send;
}

impl<C: HttpClient> HttpClient for Arc<C> {
    type Error = C::Error;

    fn stream(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<HttpResponse<Self::Error>, Self::Error>> + Send {
        (**self).stream(url, headers)
    }

    fn head(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<RemoteHeaders, Self::Error>> + Send {
        (**self).head(url, headers)
    }
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use super::*;

    /// Production HTTP client implementation using reqwest.
    ///
    /// Holds two clients sharing the same user agent: one following redirects
    /// for bodies, one that never follows them for probes.
    #[derive(Debug, Clone)]
    pub struct ReqwestClient {
        client: reqwest::Client,
        probe_client: reqwest::Client,
    }

    impl ReqwestClient {
        pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
            let client = reqwest::Client::builder().user_agent(user_agent).build()?;
            let probe_client = reqwest::Client::builder()
                .user_agent(user_agent)
                .redirect(reqwest::redirect::Policy::none())
                .build()?;
            Ok(Self {
                client,
                probe_client,
            })
        }
    }

    impl HttpClient for ReqwestClient {
        type Error = reqwest::Error;

        async fn stream(
            &self,
            url: &str,
            headers: &[(String, String)],
        ) -> Result<HttpResponse<Self::Error>, Self::Error> {
            let mut request = self.client.get(url);
            for (key, value) in headers {
                request = request.header(key, value);
            }

            let response = request.send().await?;
            let status = response.status().as_u16();
            let content_length = response.content_length();
            Ok(HttpResponse {
                status,
                content_length,
                body: Box::pin(response.bytes_stream()),
            })
        }

        async fn head(
            &self,
            url: &str,
            headers: &[(String, String)],
        ) -> Result<RemoteHeaders, Self::Error> {
            let mut request = self.probe_client.head(url);
            for (key, value) in headers {
                request = request.header(key, value);
            }

            let response = request.send().await?;
            let mut remote = RemoteHeaders::new(response.status().as_u16());
            for (name, value) in response.headers() {
                if let Ok(value) = value.to_str() {
                    remote.insert(name.as_str(), value);
                }
            }
            Ok(remote)
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;
