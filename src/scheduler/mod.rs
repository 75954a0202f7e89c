pub mod queue;

pub use queue::{Backoff, WorkQueue};

use crate::controller::{CertificateRequestSigner, RequeueError, StatusBoard};
use crate::inventory::FileInventory;
use crate::request::{IssueResult, ObjectKey, SigningRequest};
use crate::utils::errors::{Result, VaultIssuerError};
use crate::utils::output::write_issue_result;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Request files (`*.yaml`, `*.yml`) in one directory, indexed by request identity
#[derive(Debug)]
pub struct RequestDirectory {
    dir: PathBuf,
    requests: RwLock<HashMap<ObjectKey, SigningRequest>>,
}

impl RequestDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            requests: RwLock::new(HashMap::new()),
        }
    }

    /// Re-read the directory. Unreadable files are skipped with a warning.
    pub fn scan(&self) -> Result<Vec<ObjectKey>> {
        let mut requests = HashMap::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !is_request_file(&path) {
                continue;
            }

            match load_request(&path) {
                Ok(request) => {
                    if let Some(previous) = requests.insert(request.key(), request) {
                        tracing::warn!(
                            "Duplicate request {} in {}, keeping the last one read",
                            previous.key(),
                            path.display()
                        );
                    }
                }
                Err(e) => tracing::warn!("Skipping {}: {e}", path.display()),
            }
        }

        let mut keys: Vec<_> = requests.keys().cloned().collect();
        keys.sort();
        *self.requests.write().unwrap_or_else(PoisonError::into_inner) = requests;
        Ok(keys)
    }

    pub fn get(&self, key: &ObjectKey) -> Option<SigningRequest> {
        self.requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

fn is_request_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

/// Read one request file, rejecting identities that are not plain path segments
pub fn load_request(path: &Path) -> Result<SigningRequest> {
    let content = fs::read_to_string(path)?;
    let request = SigningRequest::from_yaml(&content)?;
    request
        .key()
        .validate()
        .map_err(|e| VaultIssuerError::InvalidInput(format!("{}: {e}", path.display())))?;
    Ok(request)
}

/// Run one pass, cancelling it once `timeout` elapses or `parent` is cancelled
pub async fn process_with_deadline(
    signer: &CertificateRequestSigner,
    request: &SigningRequest,
    timeout: Duration,
    parent: &CancellationToken,
) -> std::result::Result<Option<IssueResult>, RequeueError> {
    let cancel = parent.child_token();
    let pass = signer.process_signing_request(&cancel, request);
    tokio::pin!(pass);

    tokio::select! {
        biased;
        result = &mut pass => result,
        _ = tokio::time::sleep(timeout) => {
            tracing::warn!("Signing {} exceeded {}s", request.key(), timeout.as_secs());
            cancel.cancel();
            pass.await
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub workers: usize,
    pub sign_timeout: Duration,
    pub resync_interval: Duration,
    pub output_dir: PathBuf,
}

/// Drives the signer from a work queue fed by periodic resyncs
pub struct Controller {
    signer: Arc<CertificateRequestSigner>,
    requests: Arc<RequestDirectory>,
    inventory: Arc<FileInventory>,
    status: Arc<StatusBoard>,
    queue: Arc<WorkQueue<ObjectKey>>,
    options: ControllerOptions,
}

impl Controller {
    pub fn new(
        signer: Arc<CertificateRequestSigner>,
        requests: Arc<RequestDirectory>,
        inventory: Arc<FileInventory>,
        status: Arc<StatusBoard>,
        queue: Arc<WorkQueue<ObjectKey>>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            signer,
            requests,
            inventory,
            status,
            queue,
            options,
        }
    }

    /// Run workers and resync until `shutdown` is cancelled
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(
            "Starting {} workers, resync every {}s",
            self.options.workers,
            self.options.resync_interval.as_secs()
        );

        let mut workers = JoinSet::new();
        for id in 0..self.options.workers {
            let controller = Arc::clone(&self);
            let shutdown = shutdown.clone();
            workers.spawn(async move { controller.worker(id, shutdown).await });
        }

        loop {
            self.resync();
            tokio::select! {
                _ = tokio::time::sleep(self.options.resync_interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        tracing::info!("Shutting down, waiting for workers");
        self.queue.shut_down();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Worker terminated abnormally: {e}");
            }
        }
        Ok(())
    }

    /// Reload issuers and requests, and enqueue every request not yet terminal.
    /// An Issued or Failed request is picked up again once its content changes.
    pub fn resync(&self) {
        if let Err(e) = self.inventory.reload() {
            tracing::warn!("Keeping previous inventory: {e}");
        }

        let keys = match self.requests.scan() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!("Failed to scan requests: {e}");
                return;
            }
        };

        let mut queued = 0;
        for key in keys {
            let Some(request) = self.requests.get(&key) else {
                continue;
            };
            if !self.status.is_terminal(&request) {
                self.queue.add(key);
                queued += 1;
            }
        }
        tracing::debug!("Resync queued {queued} requests");
    }

    async fn worker(&self, id: usize, shutdown: CancellationToken) {
        tracing::debug!("Worker {id} started");
        while let Some(key) = self.queue.get().await {
            self.process_key(&key, &shutdown).await;
            self.queue.done(&key);
        }
        tracing::debug!("Worker {id} stopped");
    }

    /// One pass over `key`, bounded by the sign timeout
    pub async fn process_key(&self, key: &ObjectKey, shutdown: &CancellationToken) {
        let Some(request) = self.requests.get(key) else {
            tracing::debug!("Request {key} no longer exists");
            self.queue.forget(key);
            return;
        };

        let result = process_with_deadline(
            &self.signer,
            &request,
            self.options.sign_timeout,
            shutdown,
        )
        .await;

        match result {
            Ok(Some(issued)) => match write_issue_result(&self.options.output_dir, key, &issued) {
                Ok(dir) => {
                    tracing::info!("Certificate for {key} written to {}", dir.display());
                    self.queue.forget(key);
                }
                Err(e) => {
                    let delay = self.queue.add_rate_limited(key.clone());
                    tracing::error!(
                        "Failed to store certificate for {key}: {e}, retrying in {delay:?}"
                    );
                }
            },
            Ok(None) => self.queue.forget(key),
            Err(e) => {
                let delay = self.queue.add_rate_limited(key.clone());
                tracing::warn!("Requeueing {key} in {delay:?}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{Outcome, ReasonCode, Reporter, RequestPhase};
    use crate::issuer::{
        Issuer, IssuerLister, IssuerSpec, LookupError, ResolvedIssuer, Secret, SecretLister,
    };
    use crate::request::{IssuerRef, DEFAULT_DURATION};
    use crate::utils::output::CERTIFICATE_FILE;
    use crate::vault::{BackendFactory, BackendInitError, SigningBackend, SigningError};
    use async_trait::async_trait;

    const CSR_PEM: &str = include_str!("../../tests/fixtures/request.csr");

    type LookupResult<T> = std::result::Result<T, LookupError>;

    struct Issuers(LookupResult<()>);

    impl Issuers {
        fn lookup(&self, name: &str) -> LookupResult<Issuer> {
            self.0.clone().map(|()| Issuer {
                name: name.to_string(),
                namespace: None,
                spec: IssuerSpec::default(),
            })
        }
    }

    impl IssuerLister for Issuers {
        fn get_issuer(&self, _namespace: &str, name: &str) -> LookupResult<Issuer> {
            self.lookup(name)
        }

        fn get_cluster_issuer(&self, name: &str) -> LookupResult<Issuer> {
            self.lookup(name)
        }
    }

    struct NoSecrets;

    impl SecretLister for NoSecrets {
        fn get_secret(&self, _namespace: &str, name: &str) -> LookupResult<Secret> {
            Err(LookupError::NotFound {
                kind: "Secret",
                name: name.to_string(),
            })
        }
    }

    #[derive(Clone, Copy)]
    enum Backend {
        Issue,
        Hang,
    }

    #[async_trait]
    impl BackendFactory for Backend {
        async fn new_client(
            &self,
            _namespace: &str,
            _secrets: &dyn SecretLister,
            _issuer: &ResolvedIssuer,
        ) -> std::result::Result<Box<dyn SigningBackend>, BackendInitError> {
            Ok(Box::new(*self))
        }
    }

    #[async_trait]
    impl SigningBackend for Backend {
        async fn sign(
            &self,
            _csr_pem: &[u8],
            _duration: Duration,
        ) -> std::result::Result<IssueResult, SigningError> {
            match self {
                Backend::Issue => Ok(IssueResult {
                    certificate: b"CERT".to_vec(),
                    ca: b"CA".to_vec(),
                }),
                Backend::Hang => std::future::pending().await,
            }
        }
    }

    fn signer(
        issuers: LookupResult<()>,
        backend: Backend,
        status: Arc<StatusBoard>,
    ) -> Arc<CertificateRequestSigner> {
        Arc::new(CertificateRequestSigner::new(
            Arc::new(Issuers(issuers)),
            Arc::new(NoSecrets),
            Arc::new(backend),
            status,
        ))
    }

    fn request(name: &str) -> SigningRequest {
        SigningRequest {
            namespace: "default".to_string(),
            name: name.to_string(),
            issuer_ref: IssuerRef {
                name: "vault".to_string(),
                ..Default::default()
            },
            csr: CSR_PEM.as_bytes().to_vec(),
            duration: DEFAULT_DURATION,
        }
    }

    fn write_request(dir: &Path, file: &str, request: &SigningRequest) {
        fs::write(dir.join(file), serde_yaml::to_string(request).unwrap()).unwrap();
    }

    fn not_found() -> LookupResult<()> {
        Err(LookupError::NotFound {
            kind: "Issuer",
            name: "vault".to_string(),
        })
    }

    struct Fixture {
        controller: Controller,
        status: Arc<StatusBoard>,
        queue: Arc<WorkQueue<ObjectKey>>,
        _dir: tempfile::TempDir,
        requests_dir: PathBuf,
        output_dir: PathBuf,
    }

    fn fixture(issuers: LookupResult<()>, backend: Backend) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let requests_dir = dir.path().join("requests");
        let output_dir = dir.path().join("issued");
        fs::create_dir_all(&requests_dir).unwrap();

        let status = Arc::new(StatusBoard::new());
        let queue = WorkQueue::new(Backoff::default());
        let controller = Controller::new(
            signer(issuers, backend, status.clone()),
            Arc::new(RequestDirectory::new(&requests_dir)),
            Arc::new(FileInventory::new(dir.path().join("inventory.yaml"))),
            status.clone(),
            queue.clone(),
            ControllerOptions {
                workers: 1,
                sign_timeout: Duration::from_secs(5),
                resync_interval: Duration::from_secs(60),
                output_dir: output_dir.clone(),
            },
        );

        Fixture {
            controller,
            status,
            queue,
            _dir: dir,
            requests_dir,
            output_dir,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_hanging_pass() {
        let status = Arc::new(StatusBoard::new());
        let signer = signer(Ok(()), Backend::Hang, status.clone());
        let web = request("web");

        let result = process_with_deadline(
            &signer,
            &web,
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await;

        assert!(result.is_err());
        match status.phase(&web.key()) {
            Some(RequestPhase::Pending(report)) => assert_eq!(report.reason, ReasonCode::Pending),
            other => panic!("unexpected phase {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pass_before_deadline() {
        let signer = signer(Ok(()), Backend::Hang, Arc::new(StatusBoard::new()));
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let started = tokio::time::Instant::now();
        let result =
            process_with_deadline(&signer, &request("web"), Duration::from_secs(60), &shutdown)
                .await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[test]
    fn test_scan_skips_unreadable_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        write_request(dir.path(), "web.yaml", &request("web"));
        write_request(dir.path(), "api.yml", &request("api"));
        write_request(dir.path(), "notes.txt", &request("notes"));
        fs::write(dir.path().join("broken.yaml"), "namespace: [not valid").unwrap();

        let mut escaping = request("web");
        escaping.namespace = "../../escaped".to_string();
        write_request(dir.path(), "escaping.yaml", &escaping);

        let requests = RequestDirectory::new(dir.path());
        let keys = requests.scan().unwrap();

        assert_eq!(
            keys,
            vec![ObjectKey::new("default", "api"), ObjectKey::new("default", "web")]
        );
        assert_eq!(requests.get(&ObjectKey::new("default", "web")), Some(request("web")));
        assert!(requests.get(&ObjectKey::new("default", "notes")).is_none());
    }

    #[test]
    fn test_load_request_rejects_path_segments() {
        let dir = tempfile::tempdir().unwrap();
        let mut escaping = request("web");
        escaping.namespace = "../../escaped".to_string();
        write_request(dir.path(), "escaping.yaml", &escaping);

        let err = load_request(&dir.path().join("escaping.yaml")).unwrap_err();
        assert!(matches!(err, VaultIssuerError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_resync_skips_terminal_requests_until_changed() {
        let fx = fixture(Ok(()), Backend::Issue);
        let failed = request("failed");
        let pending = request("pending");
        write_request(&fx.requests_dir, "failed.yaml", &failed);
        write_request(&fx.requests_dir, "pending.yaml", &pending);

        fx.status.record(
            &failed,
            &Outcome::Failed {
                reason: ReasonCode::ErrorSigning,
                message: "denied".to_string(),
            },
        );
        fx.status.record(
            &pending,
            &Outcome::Pending {
                reason: ReasonCode::Pending,
                message: "Referenced Issuer not found".to_string(),
            },
        );

        fx.controller.resync();
        assert_eq!(fx.queue.len(), 1);
        let key = fx.queue.get().await.unwrap();
        assert_eq!(key, pending.key());
        fx.queue.done(&key);

        // Unchanged terminal request stays skipped
        fx.controller.resync();
        assert_eq!(fx.queue.len(), 1);
        assert_eq!(fx.queue.get().await, Some(pending.key()));
        fx.queue.done(&pending.key());

        let mut edited = failed.clone();
        edited.duration = Duration::from_secs(3600);
        write_request(&fx.requests_dir, "failed.yaml", &edited);
        let issued = IssueResult {
            certificate: b"CERT".to_vec(),
            ca: b"CA".to_vec(),
        };
        fx.status.record(&pending, &Outcome::Issued(issued));

        fx.controller.resync();
        assert_eq!(fx.queue.len(), 1);
        assert_eq!(fx.queue.get().await, Some(failed.key()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_key_requeues_with_backoff_on_error() {
        let fx = fixture(
            Err(LookupError::Unavailable("cache not synced".to_string())),
            Backend::Issue,
        );
        let web = request("web");
        write_request(&fx.requests_dir, "web.yaml", &web);
        fx.controller.resync();
        let key = fx.queue.get().await.unwrap();

        fx.controller.process_key(&key, &CancellationToken::new()).await;
        fx.queue.done(&key);

        assert_eq!(fx.queue.failures(&key), 1);
        assert!(fx.queue.is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fx.queue.get().await, Some(key));
    }

    #[tokio::test]
    async fn test_process_key_forgets_after_recorded_outcome() {
        let fx = fixture(not_found(), Backend::Issue);
        let web = request("web");
        write_request(&fx.requests_dir, "web.yaml", &web);
        fx.controller.resync();

        let key = web.key();
        fx.queue.add_rate_limited(key.clone());
        assert_eq!(fx.queue.failures(&key), 1);

        fx.controller.process_key(&key, &CancellationToken::new()).await;

        assert_eq!(fx.queue.failures(&key), 0);
        assert!(matches!(fx.status.phase(&key), Some(RequestPhase::Pending(_))));
    }

    #[tokio::test]
    async fn test_process_key_writes_certificate_and_forgets() {
        let fx = fixture(Ok(()), Backend::Issue);
        let web = request("web");
        write_request(&fx.requests_dir, "web.yaml", &web);
        fx.controller.resync();

        let key = web.key();
        fx.queue.add_rate_limited(key.clone());
        fx.controller.process_key(&key, &CancellationToken::new()).await;

        assert_eq!(fx.queue.failures(&key), 0);
        let written = fx.output_dir.join("default").join("web").join(CERTIFICATE_FILE);
        assert_eq!(fs::read(written).unwrap(), b"CERT");
        assert_eq!(fx.status.phase(&key), Some(RequestPhase::Issued));
    }

    #[tokio::test]
    async fn test_process_key_requeues_when_certificate_cannot_be_written() {
        let fx = fixture(Ok(()), Backend::Issue);
        let web = request("web");
        write_request(&fx.requests_dir, "web.yaml", &web);
        fs::write(&fx.output_dir, "not a directory").unwrap();
        fx.controller.resync();

        let key = web.key();
        fx.controller.process_key(&key, &CancellationToken::new()).await;

        assert_eq!(fx.queue.failures(&key), 1);
    }
}
