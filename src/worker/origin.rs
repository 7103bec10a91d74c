//! Origin media server access.
//!
//! The worker only needs two things from an origin: a metadata-only probe
//! for the declared size, and a full-body download.

use std::future::Future;
use std::time::Duration;

use reqwest::header::CONTENT_LENGTH;
use reqwest::Client;

use crate::error::{CacheError, ErrorCode, Result};
use crate::types::FetchProgress;

/// Byte source for track payloads.
pub trait Origin: Send + Sync + 'static {
    /// Returns the declared payload size without downloading the body.
    ///
    /// `Ok(None)` means the origin did not declare a size.
    fn probe(&self, url: &str) -> impl Future<Output = Result<Option<u64>>> + Send;

    /// Downloads the full body.
    ///
    /// Stops with `SizeLimitExceeded` as soon as more than `limit` bytes
    /// arrive. `on_progress` is called after every received chunk.
    fn fetch(
        &self,
        url: &str,
        limit: u64,
        on_progress: &mut (dyn FnMut(FetchProgress) + Send),
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// [`Origin`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpOrigin {
    client: Client,
    /// Ceiling for connecting and for each body read.
    stall_timeout: Duration,
}

impl HttpOrigin {
    /// Creates an HTTP origin whose connection and reads time out after `stall_timeout`.
    pub fn new(stall_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tunecache/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(stall_timeout)
            .build()
            .map_err(|e| {
                CacheError::with_source(
                    ErrorCode::NetworkFailure,
                    "Failed to create HTTP client",
                    e,
                )
            })?;
        Ok(Self {
            client,
            stall_timeout,
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<reqwest::Response> {
        match tokio::time::timeout(self.stall_timeout, request.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(CacheError::with_source(
                ErrorCode::NetworkFailure,
                format!("Request to {} failed", url),
                e,
            )),
            Err(_) => Err(CacheError::network(format!(
                "no response from {} within {:?}",
                url, self.stall_timeout
            ))),
        }
    }
}

/// Reads the Content-Length header.
///
/// `Response::content_length` reports the body size hint, which is 0 for
/// HEAD responses, so the header is parsed directly.
fn declared_length(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

impl Origin for HttpOrigin {
    fn probe(&self, url: &str) -> impl Future<Output = Result<Option<u64>>> + Send {
        async move {
            let response = self.send(self.client.head(url), url).await?;
            if !response.status().is_success() {
                // Some origins reject HEAD; the body size is re-checked after download.
                log::debug!("HEAD {} returned {}, size unknown", url, response.status());
                return Ok(None);
            }
            Ok(declared_length(&response))
        }
    }

    fn fetch(
        &self,
        url: &str,
        limit: u64,
        on_progress: &mut (dyn FnMut(FetchProgress) + Send),
    ) -> impl Future<Output = Result<Vec<u8>>> + Send {
        async move {
            let mut response = self.send(self.client.get(url), url).await?;

            if !response.status().is_success() {
                return Err(CacheError::network(format!(
                    "HTTP {} for {}",
                    response.status(),
                    url
                )));
            }

            let total = declared_length(&response);
            if let Some(total) = total {
                if total > limit {
                    return Err(CacheError::size_limit_exceeded(total, limit));
                }
            }

            let mut body: Vec<u8> = Vec::with_capacity(total.unwrap_or(0).min(limit) as usize);
            loop {
                let chunk = match tokio::time::timeout(self.stall_timeout, response.chunk()).await {
                    Ok(Ok(Some(chunk))) => chunk,
                    Ok(Ok(None)) => break,
                    Ok(Err(e)) => {
                        return Err(CacheError::with_source(
                            ErrorCode::NetworkFailure,
                            format!("Failed to read body of {}", url),
                            e,
                        ))
                    }
                    Err(_) => {
                        return Err(CacheError::network(format!(
                            "body of {} stalled for {:?}",
                            url, self.stall_timeout
                        )))
                    }
                };

                let received = (body.len() + chunk.len()) as u64;
                if received > limit {
                    return Err(CacheError::size_limit_exceeded(received, limit));
                }
                body.extend_from_slice(&chunk);
                on_progress(FetchProgress::new(received, total));
            }

            Ok(body)
        }
    }
}
