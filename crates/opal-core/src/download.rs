//! Downloads and the transfer seam.
//!
//! A [`Download`] tracks one fetch from its URL through the states
//! `Pending → Streaming → (Complete | Failed | Aborted)`. The actual
//! byte-moving is behind the [`Transfer`] trait: production uses
//! [`HttpTransfer`]; tests substitute scripted transfers that emit
//! synthetic events deterministically. A transfer reports progress as
//! [`DownloadEvent`]s on a channel the coordinator drains: zero or more
//! `Data` events carrying diagnostic bytes in stream order, then exactly
//! one `Closed` carrying the outcome.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport-level failure of a single download.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// HTTP error (connection, TLS, protocol).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Server returned {status} for {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// The requested URL.
        url: String,
    },

    /// Local IO error while spooling the payload.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle of one download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadState {
    /// Created, transfer not yet observed by the coordinator.
    Pending,
    /// Transfer running; diagnostic data may be arriving.
    Streaming,
    /// Finished; payload available.
    Complete,
    /// Finished unsuccessfully.
    Failed(String),
    /// Cancelled by a forced restart before completion.
    Aborted,
}

impl DownloadState {
    /// Whether the download reached a terminal state.
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Pending | Self::Streaming)
    }
}

/// Identifier distinguishing restarted downloads of the same URL, so a
/// stale task's events cannot be credited to its replacement.
pub type DownloadId = u64;

/// Handler run when a download closes; an `Err` is routed to the
/// coordinator's error sink, never propagated.
pub type CloseHandler = Box<dyn FnOnce(&Download) -> anyhow::Result<()> + Send>;

struct Inner {
    state: DownloadState,
    diagnostics: Vec<u8>,
    payload: Option<Bytes>,
    on_close: Option<CloseHandler>,
}

/// One tracked fetch.
pub struct Download {
    id: DownloadId,
    url: String,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Download {
    /// Create a new download in `Pending` state.
    pub fn new(id: DownloadId, url: &str) -> Self {
        Self {
            id,
            url: url.to_string(),
            inner: Mutex::new(Inner {
                state: DownloadState::Pending,
                diagnostics: Vec::new(),
                payload: None,
                on_close: None,
            }),
        }
    }

    /// This download's id.
    pub fn id(&self) -> DownloadId {
        self.id
    }

    /// The URL being fetched.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current state (snapshot).
    pub fn state(&self) -> DownloadState {
        self.lock().state.clone()
    }

    /// Diagnostic bytes accumulated so far, in stream order.
    pub fn diagnostics(&self) -> Vec<u8> {
        self.lock().diagnostics.clone()
    }

    /// The fetched payload, if the download completed.
    pub fn payload(&self) -> Option<Bytes> {
        self.lock().payload.clone()
    }

    /// Install a handler invoked exactly once when the download closes.
    pub fn set_on_close(&self, handler: CloseHandler) {
        self.lock().on_close = Some(handler);
    }

    pub(crate) fn take_on_close(&self) -> Option<CloseHandler> {
        self.lock().on_close.take()
    }

    pub(crate) fn push_diagnostics(&self, data: &[u8]) {
        let mut inner = self.lock();
        inner.diagnostics.extend_from_slice(data);
        if inner.state == DownloadState::Pending {
            inner.state = DownloadState::Streaming;
        }
    }

    pub(crate) fn finish(&self, result: Result<Bytes, DownloadError>) {
        let mut inner = self.lock();
        match result {
            Ok(payload) => {
                inner.payload = Some(payload);
                inner.state = DownloadState::Complete;
            }
            Err(e) => inner.state = DownloadState::Failed(e.to_string()),
        }
    }

    pub(crate) fn mark_aborted(&self) {
        let mut inner = self.lock();
        if !inner.state.is_finished() {
            inner.state = DownloadState::Aborted;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("download state poisoned")
    }
}

/// One readiness event from a transfer task.
#[derive(Debug)]
pub enum DownloadEvent {
    /// Diagnostic bytes became readable on the transfer's stream.
    Data {
        /// Id of the emitting download.
        id: DownloadId,
        /// URL of the emitting download.
        url: String,
        /// The bytes read.
        chunk: Bytes,
    },
    /// The transfer's stream closed; the download is finished.
    Closed {
        /// Id of the emitting download.
        id: DownloadId,
        /// URL of the emitting download.
        url: String,
        /// The transfer outcome.
        result: Result<Bytes, DownloadError>,
    },
}

/// Sender half of the coordinator's event channel, handed to transfers.
pub type EventSender = mpsc::UnboundedSender<DownloadEvent>;

/// Performs the actual byte transfer for a download.
///
/// Implementations must emit `Data` events in stream order and finish
/// with exactly one `Closed` event carrying the outcome.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Fetch `url`, reporting through `events`.
    async fn run(&self, id: DownloadId, url: String, events: EventSender);
}

/// Production transfer over HTTP(S) with a streamed body.
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    client: reqwest::Client,
}

impl HttpTransfer {
    /// Build a transfer around an existing client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, url: &str, id: DownloadId, events: &EventSender) -> Result<Bytes, DownloadError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        let _ = events.send(DownloadEvent::Data {
            id,
            url: url.to_string(),
            chunk: Bytes::from(format!("GET {url} -> {status}\n")),
        });

        if !status.is_success() {
            return Err(DownloadError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let mut stream = response.bytes_stream();
        let mut payload = Vec::new();
        while let Some(chunk) = stream.next().await {
            payload.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(payload))
    }
}

#[async_trait]
impl Transfer for HttpTransfer {
    async fn run(&self, id: DownloadId, url: String, events: EventSender) {
        let result = self.fetch(&url, id, &events).await;
        // The receiver may be gone if the coordinator was dropped.
        let _ = events.send(DownloadEvent::Closed { id, url, result });
    }
}
