//! reqwest-backed upstream client.
//!
//! # Responsibilities
//! - Own the single shared connection pool
//! - Bound concurrent upstream connections with a semaphore
//! - Enforce the connect / write / read deadlines
//! - Map reqwest failures onto `UpstreamError`
//!
//! # Design Decisions
//! - Redirects are never followed; the client sees the upstream 3xx
//! - Write deadline covers sending the request and receiving the response head
//! - Read deadline applies to every body chunk
//! - The connection slot lives inside the body stream and is freed when it is dropped

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::config::ProxySettings;
use crate::upstream::{BodyStream, UpstreamClient, UpstreamError, UpstreamRequest, UpstreamResponse};

/// Shared upstream client.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    slots: Arc<Semaphore>,
}

impl HttpUpstream {
    pub fn new(settings: &ProxySettings) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.timeout.connect())
            .pool_max_idle_per_host(settings.pool.max_idle_per_host)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| UpstreamError::Build(e.to_string()))?;

        tracing::debug!(
            max_connections = settings.pool.max_connections,
            max_idle_per_host = settings.pool.max_idle_per_host,
            "Upstream client built"
        );

        Ok(Self {
            client,
            slots: Arc::new(Semaphore::new(settings.pool.max_connections)),
        })
    }

    /// Currently free connection slots.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let timeouts = request.timeouts;

        // Waiting for a free slot counts against the connect deadline
        let permit = timeout(timeouts.connect, self.slots.clone().acquire_owned())
            .await
            .map_err(|_| UpstreamError::Timeout)?
            .map_err(|_| UpstreamError::Transport("connection pool closed".into()))?;

        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(request.body);
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }

        let head_deadline = timeouts.connect + timeouts.write + timeouts.read;
        let response = match timeout(head_deadline, builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(classify(e)),
            Err(_) => return Err(UpstreamError::Timeout),
        };

        Ok(UpstreamResponse {
            status: response.status(),
            headers: response.headers().clone(),
            body: guarded_stream(response, timeouts.read, permit),
        })
    }
}

fn classify(error: reqwest::Error) -> UpstreamError {
    if error.is_timeout() {
        UpstreamError::Timeout
    } else if error.is_connect() {
        UpstreamError::Connect(error.to_string())
    } else {
        UpstreamError::Transport(error.to_string())
    }
}

/// Body stream with a per-chunk read deadline that holds the connection slot.
fn guarded_stream(
    response: reqwest::Response,
    read_timeout: Duration,
    permit: OwnedSemaphorePermit,
) -> BodyStream {
    let chunks = response.bytes_stream().boxed();
    stream::unfold(Some((chunks, permit)), move |state| async move {
        let (mut chunks, permit) = state?;
        match timeout(read_timeout, chunks.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some((chunks, permit)))),
            Ok(Some(Err(e))) => Some((Err(classify(e)), None)),
            Ok(None) => None,
            Err(_) => Some((Err(UpstreamError::Timeout), None)),
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::UpstreamTimeouts;
    use axum::http::{HeaderMap, Method};
    use bytes::Bytes;

    fn request(url: String) -> UpstreamRequest {
        UpstreamRequest {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            params: Vec::new(),
            body: Bytes::new(),
            timeouts: UpstreamTimeouts {
                connect: Duration::from_millis(500),
                read: Duration::from_millis(200),
                write: Duration::from_millis(200),
            },
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_connect_error() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpUpstream::new(&ProxySettings::default()).unwrap();
        let err = client.send(request(format!("http://{}/x", addr))).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Connect(_)), "got {:?}", err);
        assert_eq!(client.available_slots(), ProxySettings::default().pool.max_connections);
    }

    #[tokio::test]
    async fn test_silent_upstream_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = HttpUpstream::new(&ProxySettings::default()).unwrap();
        let err = client.send(request(format!("http://{}/slow", addr))).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout), "got {:?}", err);
    }
}
