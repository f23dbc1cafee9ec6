//! The download coordinator.
//!
//! Owns the URL → [`Download`] table and drains the event channel the
//! transfer tasks report into. The coordinator never polls: progress is
//! edge-triggered by the events a transfer emits, delivered in stream
//! order per download. Interactive hosts call [`Coordinator::pump`] from
//! their own loop; batch callers block in
//! [`Coordinator::wait_for_downloads`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use opal_schema::InterfaceUri;

use crate::crypto::SignatureCheck;
use crate::download::{Download, DownloadEvent, DownloadId, EventSender, Transfer};
use crate::reporter::Reporter;
use crate::trust::{TrustDb, TrustError, domain_from_uri};

/// Asks the user whether to trust a set of signing keys.
///
/// The interactive CLI implements this with a stdin Y/N prompt; a GUI
/// would pop a dialog; non-interactive callers use [`DenyAll`].
pub trait TrustPrompt {
    /// Whether `fingerprints` may sign feeds for `domain`.
    fn confirm_keys(&self, uri: &InterfaceUri, domain: &str, fingerprints: &[String]) -> bool;
}

/// Refuses every key.
#[derive(Debug, Clone, Copy)]
pub struct DenyAll;

impl TrustPrompt for DenyAll {
    fn confirm_keys(&self, _: &InterfaceUri, _: &str, _: &[String]) -> bool {
        false
    }
}

struct Entry {
    dl: Arc<Download>,
    task: JoinHandle<()>,
}

/// Deduplicates and drives in-flight downloads.
pub struct Coordinator {
    transfer: Arc<dyn Transfer>,
    reporter: Arc<dyn Reporter>,
    table: HashMap<String, Entry>,
    tx: EventSender,
    rx: mpsc::UnboundedReceiver<DownloadEvent>,
    next_id: DownloadId,
    waiting: bool,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("tracked", &self.table.len())
            .field("waiting", &self.waiting)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Build a coordinator around a transfer implementation and a
    /// reporter for progress and asynchronous errors.
    pub fn new(transfer: Arc<dyn Transfer>, reporter: Arc<dyn Reporter>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            transfer,
            reporter,
            table: HashMap::new(),
            tx,
            rx,
            next_id: 0,
            waiting: false,
        }
    }

    /// Allocate a new download for `url`, not yet tracked.
    pub fn new_download(&mut self, url: &str) -> Arc<Download> {
        self.next_id += 1;
        Arc::new(Download::new(self.next_id, url))
    }

    /// Begin tracking `dl` and start its transfer.
    pub fn monitor(&mut self, dl: Arc<Download>) {
        tracing::debug!(url = dl.url(), id = dl.id(), "monitoring download");
        self.reporter.fetching(dl.url());

        let transfer = Arc::clone(&self.transfer);
        let tx = self.tx.clone();
        let (id, url) = (dl.id(), dl.url().to_string());
        let task = tokio::spawn(async move {
            transfer.run(id, url, tx).await;
        });

        self.table.insert(dl.url().to_string(), Entry { dl, task });
    }

    /// The tracked download for `url`, creating and starting one if
    /// absent. This is the sole de-duplication point: repeated requests
    /// for the same URL share one download.
    ///
    /// With `force`, any existing download for the URL (finished or not)
    /// is aborted and replaced by a fresh one.
    pub fn get_download(&mut self, url: &str, force: bool) -> Arc<Download> {
        if let Some(entry) = self.table.get(url) {
            if !force {
                return Arc::clone(&entry.dl);
            }
            let entry = self.table.remove(url).expect("entry vanished");
            tracing::debug!(url, "aborting download for forced restart");
            entry.task.abort();
            entry.dl.mark_aborted();
        }

        let dl = self.new_download(url);
        self.monitor(Arc::clone(&dl));
        dl
    }

    /// Number of downloads currently tracked.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether no downloads are tracked.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Drain and dispatch every event that is already queued, without
    /// blocking. Interactive hosts call this from their own event loop.
    pub fn pump(&mut self) {
        while let Ok(ev) = self.rx.try_recv() {
            self.dispatch(ev);
        }
    }

    /// Block until every tracked download finishes.
    ///
    /// Returns immediately if nothing is tracked. Suitable for
    /// non-interactive callers; there is no timeout.
    ///
    /// # Panics
    ///
    /// Panics if called while another wait is already active. The `&mut`
    /// receiver makes that unrepresentable from safe code; the check
    /// backstops exotic wrappers.
    pub async fn wait_for_downloads(&mut self) {
        assert!(!self.waiting, "wait_for_downloads re-entered");
        if self.table.is_empty() {
            tracing::debug!("no downloads in progress, not waiting");
            return;
        }

        self.waiting = true;
        tracing::debug!(count = self.table.len(), "waiting for downloads");
        while !self.table.is_empty() {
            let Some(ev) = self.rx.recv().await else {
                break;
            };
            self.dispatch(ev);
        }
        self.waiting = false;
    }

    /// Apply one readiness event to the table.
    ///
    /// Events whose id does not match the currently tracked download for
    /// their URL are from an aborted predecessor and are dropped.
    fn dispatch(&mut self, ev: DownloadEvent) {
        match ev {
            DownloadEvent::Data { id, url, chunk } => match self.table.get(&url) {
                Some(entry) if entry.dl.id() == id => {
                    entry.dl.push_diagnostics(&chunk);
                    self.reporter.transfer_data(&url, &chunk);
                }
                _ => tracing::trace!(url, id, "dropping data from stale download"),
            },
            DownloadEvent::Closed { id, url, result } => {
                match self.table.get(&url) {
                    Some(entry) if entry.dl.id() == id => {}
                    _ => {
                        tracing::trace!(url, id, "dropping close from stale download");
                        return;
                    }
                }
                let entry = self.table.remove(&url).expect("entry vanished");

                match &result {
                    Ok(payload) => self.reporter.fetched(&url, payload.len() as u64),
                    Err(e) => self.reporter.failed(&url, &e.to_string()),
                }
                entry.dl.finish(result);

                if let Some(handler) = entry.dl.take_on_close() {
                    if let Err(e) = handler(&entry.dl) {
                        self.report_error(&e);
                    }
                }
            }
        }
    }

    /// A downloaded feed's signatures are valid but none is trusted yet:
    /// ask the user, and on confirmation persist every valid key for the
    /// interface's trust domain, then notify trust observers once.
    ///
    /// Fails without touching the trust store if no signature in
    /// `checks` is cryptographically valid, or if the user declines.
    pub fn confirm_trust_keys(
        &mut self,
        trust: &mut TrustDb,
        prompt: &dyn TrustPrompt,
        uri: &InterfaceUri,
        checks: &[SignatureCheck],
    ) -> Result<(), TrustError> {
        let valid: Vec<&SignatureCheck> = checks.iter().filter(|c| c.valid).collect();
        if valid.is_empty() {
            let listing: String = checks.iter().map(|c| format!("\n- {c}")).collect();
            return Err(TrustError::NoValidSignature(listing));
        }

        let domain = domain_from_uri(uri)?;
        let fingerprints: Vec<String> = valid.iter().map(|c| c.fingerprint.clone()).collect();

        if !prompt.confirm_keys(uri, &domain, &fingerprints) {
            return Err(TrustError::Untrusted);
        }

        for fp in &fingerprints {
            trust.trust_key(fp, &domain)?;
        }
        trust.notify();
        Ok(())
    }

    /// One-way sink for asynchronous errors that have no caller to
    /// return to (e.g. a close handler failing inside event dispatch).
    pub fn report_error(&self, err: &anyhow::Error) {
        tracing::warn!("{err:#}");
        self.reporter.error(&format!("{err:#}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{DownloadError, DownloadState};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted transfer: per-URL chunk/outcome plans, emitted as
    /// synthetic readiness events. URLs with no plan never finish,
    /// modelling a transfer stuck in flight.
    struct StubTransfer {
        plans: Mutex<HashMap<String, Plan>>,
    }

    #[derive(Clone)]
    struct Plan {
        chunks: Vec<Vec<u8>>,
        outcome: Result<Vec<u8>, String>,
    }

    impl StubTransfer {
        fn new() -> Self {
            Self {
                plans: Mutex::new(HashMap::new()),
            }
        }

        fn plan(self, url: &str, chunks: &[&[u8]], outcome: Result<&[u8], &str>) -> Self {
            self.plans.lock().unwrap().insert(
                url.to_string(),
                Plan {
                    chunks: chunks.iter().map(|c| c.to_vec()).collect(),
                    outcome: outcome.map(<[u8]>::to_vec).map_err(str::to_string),
                },
            );
            self
        }
    }

    #[async_trait]
    impl Transfer for StubTransfer {
        async fn run(&self, id: DownloadId, url: String, events: EventSender) {
            let plan = self.plans.lock().unwrap().get(&url).cloned();
            let Some(plan) = plan else {
                futures::future::pending::<()>().await;
                return;
            };
            for chunk in plan.chunks {
                let _ = events.send(DownloadEvent::Data {
                    id,
                    url: url.clone(),
                    chunk: Bytes::from(chunk),
                });
            }
            let result = plan
                .outcome
                .map(Bytes::from)
                .map_err(|msg| DownloadError::Io(std::io::Error::other(msg)));
            let _ = events.send(DownloadEvent::Closed { id, url, result });
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        errors: Mutex<Vec<String>>,
        failures: Mutex<Vec<String>>,
    }

    impl Reporter for RecordingReporter {
        fn fetching(&self, _: &str) {}
        fn transfer_data(&self, _: &str, _: &[u8]) {}
        fn fetched(&self, _: &str, _: u64) {}
        fn failed(&self, url: &str, reason: &str) {
            self.failures.lock().unwrap().push(format!("{url}: {reason}"));
        }
        fn info(&self, _: &str) {}
        fn error(&self, msg: &str) {
            self.errors.lock().unwrap().push(msg.to_string());
        }
    }

    fn coordinator(stub: StubTransfer) -> (Coordinator, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::default());
        (
            Coordinator::new(Arc::new(stub), reporter.clone()),
            reporter,
        )
    }

    const URL: &str = "https://apps.example.net/editor.json";

    #[tokio::test]
    async fn test_get_download_deduplicates() {
        let (mut c, _) = coordinator(StubTransfer::new());
        let first = c.get_download(URL, false);
        let second = c.get_download(URL, false);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(c.len(), 1);
    }

    #[tokio::test]
    async fn test_force_aborts_previous_download() {
        let (mut c, _) = coordinator(StubTransfer::new());
        let first = c.get_download(URL, false);
        let second = c.get_download(URL, true);

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.state(), DownloadState::Aborted);
        assert_eq!(second.state(), DownloadState::Pending);
        assert_eq!(c.len(), 1);
    }

    #[tokio::test]
    async fn test_wait_with_nothing_tracked_returns_immediately() {
        let (mut c, _) = coordinator(StubTransfer::new());
        tokio::time::timeout(Duration::from_millis(100), c.wait_for_downloads())
            .await
            .expect("wait_for_downloads should not block with an empty table");
    }

    #[tokio::test]
    async fn test_download_completes_with_ordered_diagnostics() {
        let stub = StubTransfer::new().plan(URL, &[b"one ", b"two ", b"three"], Ok(b"payload"));
        let (mut c, _) = coordinator(stub);

        let dl = c.get_download(URL, false);
        c.wait_for_downloads().await;

        assert!(c.is_empty());
        assert_eq!(dl.state(), DownloadState::Complete);
        assert_eq!(dl.diagnostics(), b"one two three");
        assert_eq!(dl.payload().unwrap(), Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn test_failed_download_reports_reason() {
        let stub = StubTransfer::new().plan(URL, &[], Err("connection reset"));
        let (mut c, reporter) = coordinator(stub);

        let dl = c.get_download(URL, false);
        c.wait_for_downloads().await;

        match dl.state() {
            DownloadState::Failed(reason) => assert!(reason.contains("connection reset")),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(reporter.failures.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_close_handler_error_goes_to_report_error() {
        let stub = StubTransfer::new().plan(URL, &[], Ok(b"payload"));
        let (mut c, reporter) = coordinator(stub);

        let dl = c.get_download(URL, false);
        dl.set_on_close(Box::new(|_| Err(anyhow!("handler exploded"))));
        c.wait_for_downloads().await;

        // The failure surfaced through the sink; the download itself
        // still completed and the coordinator kept running.
        assert_eq!(dl.state(), DownloadState::Complete);
        let errors = reporter.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("handler exploded"));
    }

    #[tokio::test]
    async fn test_stale_events_are_dropped() {
        let stub = StubTransfer::new().plan(URL, &[b"new"], Ok(b"payload"));
        let (mut c, _) = coordinator(stub);

        let old = c.get_download(URL, false);
        let new = c.get_download(URL, true);

        // Events from the aborted predecessor arrive late.
        c.tx.send(DownloadEvent::Data {
            id: old.id(),
            url: URL.to_string(),
            chunk: Bytes::from_static(b"stale"),
        })
        .unwrap();
        c.tx.send(DownloadEvent::Closed {
            id: old.id(),
            url: URL.to_string(),
            result: Ok(Bytes::from_static(b"stale payload")),
        })
        .unwrap();

        c.wait_for_downloads().await;

        assert_eq!(old.state(), DownloadState::Aborted);
        assert_eq!(new.state(), DownloadState::Complete);
        assert_eq!(new.diagnostics(), b"new");
        assert_eq!(new.payload().unwrap(), Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn test_pump_drains_without_blocking() {
        let stub = StubTransfer::new().plan(URL, &[b"chunk"], Ok(b"payload"));
        let (mut c, _) = coordinator(stub);

        let dl = c.get_download(URL, false);
        // Let the spawned transfer run and queue its events.
        tokio::task::yield_now().await;
        c.pump();

        assert_eq!(dl.state(), DownloadState::Complete);
        assert!(c.is_empty());
    }

    struct AcceptAll;

    impl TrustPrompt for AcceptAll {
        fn confirm_keys(&self, _: &InterfaceUri, _: &str, _: &[String]) -> bool {
            true
        }
    }

    fn check(fp: &str, valid: bool) -> SignatureCheck {
        SignatureCheck {
            fingerprint: fp.to_string(),
            valid,
        }
    }

    #[tokio::test]
    async fn test_confirm_with_no_valid_signature_fails_without_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut trust = TrustDb::load(dir.path().join("trust.json")).unwrap();
        let (mut c, _) = coordinator(StubTransfer::new());

        let uri = InterfaceUri::new(URL);
        let err = c
            .confirm_trust_keys(&mut trust, &AcceptAll, &uri, &[check("aa", false)])
            .unwrap_err();

        assert!(matches!(err, TrustError::NoValidSignature(_)));
        assert_eq!(trust.entries().count(), 0);
    }

    #[tokio::test]
    async fn test_confirm_persists_all_valid_keys_and_notifies_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut trust = TrustDb::load(dir.path().join("trust.json")).unwrap();
        let notifications = Arc::new(AtomicUsize::new(0));
        let seen = notifications.clone();
        trust.on_change(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let (mut c, _) = coordinator(StubTransfer::new());
        let uri = InterfaceUri::new(URL);
        let checks = [check("aa", true), check("bb", false), check("cc", true)];
        c.confirm_trust_keys(&mut trust, &AcceptAll, &uri, &checks)
            .unwrap();

        assert!(trust.is_trusted("aa", "apps.example.net"));
        assert!(trust.is_trusted("cc", "apps.example.net"));
        assert!(!trust.is_trusted("bb", "apps.example.net"));
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_confirm_declined_leaves_trust_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut trust = TrustDb::load(dir.path().join("trust.json")).unwrap();
        let (mut c, _) = coordinator(StubTransfer::new());

        let uri = InterfaceUri::new(URL);
        let err = c
            .confirm_trust_keys(&mut trust, &DenyAll, &uri, &[check("aa", true)])
            .unwrap_err();

        assert!(matches!(err, TrustError::Untrusted));
        assert_eq!(trust.entries().count(), 0);
    }

    #[tokio::test]
    async fn test_http_transfer_against_real_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/feed.json")
            .with_status(200)
            .with_body("feed body")
            .create_async()
            .await;

        let transfer = crate::download::HttpTransfer::new(reqwest::Client::new());
        let reporter = Arc::new(RecordingReporter::default());
        let mut c = Coordinator::new(Arc::new(transfer), reporter);

        let url = format!("{}/feed.json", server.url());
        let dl = c.get_download(&url, false);
        c.wait_for_downloads().await;

        mock.assert_async().await;
        assert_eq!(dl.state(), DownloadState::Complete);
        assert_eq!(dl.payload().unwrap(), Bytes::from_static(b"feed body"));
        let diag = String::from_utf8(dl.diagnostics()).unwrap();
        assert!(diag.contains("200"));
    }

    #[tokio::test]
    async fn test_http_transfer_surfaces_status_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing.json")
            .with_status(404)
            .create_async()
            .await;

        let transfer = crate::download::HttpTransfer::new(reqwest::Client::new());
        let reporter = Arc::new(RecordingReporter::default());
        let mut c = Coordinator::new(Arc::new(transfer), reporter);

        let url = format!("{}/missing.json", server.url());
        let dl = c.get_download(&url, false);
        c.wait_for_downloads().await;

        match dl.state() {
            DownloadState::Failed(reason) => assert!(reason.contains("404")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}
