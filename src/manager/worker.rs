//! Batch workers: the seam between a coordinating workflow and the code that
//! actually downloads and scans a batch of keys.
//!
//! A coordinator hands a [`ScanRequest`] to a [`BatchWorker`] and gets back
//! the infected keys. Workers run in-process ([`AuditWorker`],
//! [`RescanWorker`]) or as a separate process speaking JSON over
//! stdin/stdout ([`ProcessWorker`]).

use crate::core::{ScanRequest, ScanStatus, WorkflowError, WorkflowResult};
use crate::manager::ScanManager;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default time a process worker may run before it is killed.
pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(900);

/// Scans a batch of keys and reports the infected ones.
#[async_trait]
pub trait BatchWorker: Send + Sync + fmt::Debug {
    /// Scans `request.keys` in `request.bucket`.
    async fn scan_batch(&self, request: ScanRequest) -> WorkflowResult<Vec<String>>;
}

/// An Arc-wrapped worker, as passed to coordinating workflows.
pub type ArcWorker = Arc<dyn BatchWorker>;

/// The kind of work a worker performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMode {
    /// Scan the whole batch at once, reporting infected or mistyped keys.
    Audit,
    /// Rescan and retag each key independently.
    Rescan,
}

impl WorkerMode {
    /// Returns the command-line name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audit => "audit",
            Self::Rescan => "rescan",
        }
    }
}

impl fmt::Display for WorkerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audit" => Ok(Self::Audit),
            "rescan" => Ok(Self::Rescan),
            other => Err(format!("unknown worker mode '{other}'")),
        }
    }
}

/// In-process audit worker: one batch download, one scanner invocation.
#[derive(Debug, Clone)]
pub struct AuditWorker {
    manager: Arc<ScanManager>,
}

impl AuditWorker {
    /// Creates a worker backed by `manager`.
    pub fn new(manager: Arc<ScanManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl BatchWorker for AuditWorker {
    async fn scan_batch(&self, request: ScanRequest) -> WorkflowResult<Vec<String>> {
        self.manager.scan_files(&request.bucket, &request.keys).await
    }
}

/// In-process rescan worker.
///
/// Each key is handled on its own: oversize objects are tagged `SKIPPED`,
/// others are scanned in an isolated scratch directory and tagged `CLEAN` or
/// `INFECTED`. A failure on one key is logged and does not stop the rest;
/// that key keeps its old tag and is retried by a later rescan.
#[derive(Debug, Clone)]
pub struct RescanWorker {
    manager: Arc<ScanManager>,
}

impl RescanWorker {
    /// Creates a worker backed by `manager`.
    pub fn new(manager: Arc<ScanManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl BatchWorker for RescanWorker {
    async fn scan_batch(&self, request: ScanRequest) -> WorkflowResult<Vec<String>> {
        let mut infected = Vec::new();

        for key in &request.keys {
            match self.manager.rescan_key(&request.bucket, key).await {
                Ok(ScanStatus::Infected) => infected.push(key.clone()),
                Ok(status) => {
                    tracing::debug!(bucket = %request.bucket, key = %key, status = %status, "Rescanned");
                }
                Err(e) => {
                    tracing::warn!(
                        bucket = %request.bucket,
                        key = %key,
                        error = %e,
                        "Rescan failed, leaving tag for next run"
                    );
                }
            }
        }

        Ok(infected)
    }
}

/// Error body of a failed worker response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFailure {
    /// Machine-readable failure kind.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

/// Wire form of a worker response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerResponse {
    /// The batch completed.
    Completed {
        /// Infected (or mistyped) keys.
        #[serde(rename = "infectedKeys")]
        infected_keys: Vec<String>,
    },
    /// The batch failed as a whole.
    Failed {
        /// What went wrong.
        error: WorkerFailure,
    },
}

impl WorkerResponse {
    /// Converts a worker outcome into its wire form.
    pub fn from_result(result: WorkflowResult<Vec<String>>) -> Self {
        match result {
            Ok(infected_keys) => Self::Completed { infected_keys },
            Err(e) => Self::Failed {
                error: WorkerFailure {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                },
            },
        }
    }

    /// Converts the wire form back into a worker outcome.
    pub fn into_result(self) -> WorkflowResult<Vec<String>> {
        match self {
            Self::Completed { infected_keys } => Ok(infected_keys),
            Self::Failed { error } => Err(WorkflowError::worker(error.kind, error.message)),
        }
    }
}

/// Handles one JSON-encoded request with `worker`.
///
/// Malformed requests produce a `bad_request` failure response rather than
/// an error, so the caller always has something to write back.
pub async fn serve_request(worker: &dyn BatchWorker, input: &str) -> WorkerResponse {
    let request: ScanRequest = match serde_json::from_str(input) {
        Ok(request) => request,
        Err(e) => {
            return WorkerResponse::Failed {
                error: WorkerFailure {
                    kind: "bad_request".to_string(),
                    message: e.to_string(),
                },
            }
        }
    };

    tracing::info!(
        bucket = %request.bucket,
        keys = request.keys.len(),
        "Worker request received"
    );
    WorkerResponse::from_result(worker.scan_batch(request).await)
}

/// Runs each batch in a child process.
///
/// The child is started as `<program> worker --mode <mode>`, receives the
/// request as JSON on stdin and must print a [`WorkerResponse`] on stdout.
#[derive(Debug, Clone)]
pub struct ProcessWorker {
    program: PathBuf,
    args: Vec<String>,
    mode: WorkerMode,
    timeout: Duration,
}

impl ProcessWorker {
    /// Creates a worker that runs `program` in `mode`.
    pub fn new(program: impl Into<PathBuf>, mode: WorkerMode) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            mode,
            timeout: DEFAULT_WORKER_TIMEOUT,
        }
    }

    /// Sets arguments passed before `worker --mode <mode>`.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the per-batch timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

#[async_trait]
impl BatchWorker for ProcessWorker {
    async fn scan_batch(&self, request: ScanRequest) -> WorkflowResult<Vec<String>> {
        let program = self.program_name();
        let body = serde_json::to_vec(&request)
            .map_err(|e| WorkflowError::worker("encode", e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("worker")
            .arg("--mode")
            .arg(self.mode.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkflowError::worker("spawn", format!("spawn {program}: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkflowError::worker("spawn", format!("{program}: stdin not piped")))?;
        // A child that exits without reading still gets its output decoded.
        if let Err(e) = stdin.write_all(&body).await {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(WorkflowError::worker(
                    "io",
                    format!("write {program} stdin: {e}"),
                ));
            }
        }
        drop(stdin);

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output
                .map_err(|e| WorkflowError::worker("io", format!("wait {program}: {e}")))?,
            Err(_) => {
                return Err(WorkflowError::worker(
                    "timeout",
                    format!("{program} did not finish within {:?}", self.timeout),
                ))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        match serde_json::from_str::<WorkerResponse>(stdout.trim()) {
            Ok(response) => {
                tracing::debug!(
                    program = %program,
                    mode = %self.mode,
                    exit_code = ?output.status.code(),
                    "Worker process finished"
                );
                response.into_result()
            }
            Err(e) => Err(WorkflowError::worker(
                "process",
                format!(
                    "{program} returned no valid response (exit={:?}): {e}; stderr: {}",
                    output.status.code(),
                    stderr.trim()
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::{MockScanner, EICAR};
    use crate::manager::ScanManagerConfig;
    use crate::store::InMemoryStore;

    fn manager(store: Arc<InMemoryStore>, scanner: MockScanner, max: u64) -> Arc<ScanManager> {
        Arc::new(
            ScanManager::builder()
                .with_arc_store(store)
                .with_scanner(scanner)
                .with_config(ScanManagerConfig::default().with_max_file_size(max))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_worker_response_wire_format() {
        let ok: WorkerResponse = serde_json::from_str(r#"{"infectedKeys":["a","b"]}"#).unwrap();
        assert_eq!(ok.into_result().unwrap(), vec!["a", "b"]);

        let failed: WorkerResponse =
            serde_json::from_str(r#"{"error":{"kind":"scan","message":"boom"}}"#).unwrap();
        match failed.into_result() {
            Err(WorkflowError::Worker { kind, message }) => {
                assert_eq!(kind, "scan");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected {other:?}"),
        }

        let encoded = serde_json::to_string(&WorkerResponse::from_result(Ok(vec!["k".into()])))
            .unwrap();
        assert_eq!(encoded, r#"{"infectedKeys":["k"]}"#);
    }

    #[test]
    fn test_worker_mode_parse() {
        assert_eq!("audit".parse::<WorkerMode>().unwrap(), WorkerMode::Audit);
        assert_eq!("rescan".parse::<WorkerMode>().unwrap(), WorkerMode::Rescan);
        assert!("other".parse::<WorkerMode>().is_err());
    }

    #[tokio::test]
    async fn test_audit_worker_does_not_tag() {
        let store = Arc::new(InMemoryStore::new());
        store.insert("b", "bad.txt", EICAR.as_bytes().to_vec());
        store.insert("b", "good.txt", b"fine\n".to_vec());
        let worker = AuditWorker::new(manager(store.clone(), MockScanner::new(), 1024));

        let infected = worker
            .scan_batch(ScanRequest::new("b", vec!["bad.txt".into(), "good.txt".into()]))
            .await
            .unwrap();

        assert_eq!(infected, vec!["bad.txt"]);
        assert_eq!(store.tag_write_count("b", "bad.txt"), 0);
    }

    #[tokio::test]
    async fn test_rescan_worker_tags_each_key() {
        let store = Arc::new(InMemoryStore::new());
        store.insert("b", "bad.txt", EICAR.as_bytes().to_vec());
        store.insert("b", "good.txt", b"fine\n".to_vec());
        store.insert("b", "huge.txt", vec![b'x'; 4096]);
        let scanner = MockScanner::new();
        let worker = RescanWorker::new(manager(store.clone(), scanner, 1024));

        let infected = worker
            .scan_batch(ScanRequest::new(
                "b",
                vec![
                    "bad.txt".into(),
                    "gone.txt".into(),
                    "good.txt".into(),
                    "huge.txt".into(),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(infected, vec!["bad.txt"]);
        assert_eq!(store.status("b", "bad.txt").as_deref(), Some("INFECTED"));
        assert_eq!(store.status("b", "good.txt").as_deref(), Some("CLEAN"));
        assert_eq!(store.status("b", "huge.txt").as_deref(), Some("SKIPPED"));
    }

    #[tokio::test]
    async fn test_serve_request_bad_json() {
        let store = Arc::new(InMemoryStore::new());
        let worker = AuditWorker::new(manager(store, MockScanner::new(), 1024));
        match serve_request(&worker, "not json").await {
            WorkerResponse::Failed { error } => assert_eq!(error.kind, "bad_request"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_serve_request_reports_failure_kind() {
        let store = Arc::new(InMemoryStore::new());
        store.insert("b", "a.txt", b"a".to_vec());
        let worker = AuditWorker::new(manager(store, MockScanner::failing(), 1024));

        let response = serve_request(&worker, r#"{"bucket":"b","keys":["a.txt"]}"#).await;
        match response {
            WorkerResponse::Failed { error } => assert_eq!(error.kind, "scan"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_worker_round_trip() {
        let worker = ProcessWorker::new("sh", WorkerMode::Audit).with_args([
            "-c",
            r#"[ "$1" = "--mode" ] && [ "$2" = "audit" ] || exit 3
grep -q '"keys":\["x/y.pdf"\]' && echo '{"infectedKeys":["x/y.pdf"]}'"#,
        ]);
        let infected = worker
            .scan_batch(ScanRequest::new("b", vec!["x/y.pdf".into()]))
            .await
            .unwrap();
        assert_eq!(infected, vec!["x/y.pdf"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_worker_garbage_output() {
        let worker = ProcessWorker::new("true", WorkerMode::Rescan);
        let err = worker
            .scan_batch(ScanRequest::new("b", vec!["k".into()]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "process");
    }

    #[tokio::test]
    async fn test_process_worker_missing_program() {
        let worker = ProcessWorker::new("/nonexistent/bucket-scan-worker", WorkerMode::Audit);
        let err = worker
            .scan_batch(ScanRequest::new("b", vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "spawn");
    }
}
