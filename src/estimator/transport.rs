//! Transports carrying one estimate request to a worker and its response back.
//!
//! Two implementations share the same single round-trip contract:
//!
//! - [`ProcessTransport`]: a `wavefront_worker` child process speaking JSON
//!   lines on stdin/stdout. The process is spawned lazily, reused across
//!   requests and killed when the transport is dropped or reset.
//! - [`TaskTransport`]: a worker task inside this process fed through an
//!   `mpsc` queue. Each request is computed on the blocking pool and answered
//!   over a `oneshot` channel.
//!
//! Timeouts are not handled here; [`crate::estimator::IsolatedEstimator`]
//! wraps each round trip in a deadline and calls [`WorkerTransport::reset`]
//! after a timeout so a late answer can never be mistaken for the next one.

use crate::estimator::protocol::{handle_request, EstimateRequest, EstimateResponse};
use align_core::frame::FrameStore;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const WORKER_QUEUE_DEPTH: usize = 16;
const WORKER_EXIT_GRACE: Duration = Duration::from_secs(2);

#[async_trait]
pub trait WorkerTransport: Send + Sync {
    /// Send one request and wait for the matching response.
    async fn round_trip(&self, request: &EstimateRequest) -> Result<EstimateResponse>;

    /// Drop any in-flight exchange after a timeout.
    async fn reset(&self) {}

    /// Stop the worker.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Process transport
// ============================================================================

struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl WorkerProcess {
    async fn exchange(&mut self, request: &EstimateRequest) -> Result<EstimateResponse> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .context("failed to write request to worker")?;
        self.stdin.flush().await?;

        loop {
            let Some(line) = self.stdout.next_line().await? else {
                bail!("worker exited before answering");
            };
            let response: EstimateResponse = serde_json::from_str(&line)
                .with_context(|| format!("malformed worker response: {}", line))?;
            if response.request_id == request.request_id {
                return Ok(response);
            }
            debug!(request_id = %response.request_id, "Discarding stale worker response");
        }
    }
}

/// Out-of-process worker reached over stdin/stdout.
pub struct ProcessTransport {
    program: PathBuf,
    args: Vec<String>,
    worker: Mutex<Option<WorkerProcess>>,
}

impl ProcessTransport {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            worker: Mutex::new(None),
        }
    }

    fn spawn_worker(&self) -> Result<WorkerProcess> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn worker {}", self.program.display()))?;
        let stdin = child.stdin.take().context("worker stdin not captured")?;
        let stdout = child.stdout.take().context("worker stdout not captured")?;
        info!(program = %self.program.display(), pid = ?child.id(), "Spawned estimator worker");
        Ok(WorkerProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }
}

#[async_trait]
impl WorkerTransport for ProcessTransport {
    async fn round_trip(&self, request: &EstimateRequest) -> Result<EstimateResponse> {
        let mut guard = self.worker.lock().await;
        if guard.is_none() {
            *guard = Some(self.spawn_worker()?);
        }
        let worker = guard.as_mut().context("worker not running")?;
        let result = worker.exchange(request).await;
        if result.is_err() {
            // Stream state is unknown after a failed exchange.
            *guard = None;
        }
        result
    }

    async fn reset(&self) {
        if let Some(mut worker) = self.worker.lock().await.take() {
            warn!("Killing estimator worker after timeout");
            if let Err(e) = worker.child.kill().await {
                warn!(error = %e, "Failed to kill estimator worker");
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        let Some(worker) = self.worker.lock().await.take() else {
            return Ok(());
        };
        let WorkerProcess {
            mut child, stdin, ..
        } = worker;
        // EOF on stdin asks the worker to exit.
        drop(stdin);
        match tokio::time::timeout(WORKER_EXIT_GRACE, child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(%status, "Estimator worker exited");
            }
            Err(_) => {
                warn!("Estimator worker ignored EOF, killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Task transport
// ============================================================================

type Job = (EstimateRequest, oneshot::Sender<EstimateResponse>);

/// Worker task inside this process.
pub struct TaskTransport {
    tx: mpsc::Sender<Job>,
    handle: SyncMutex<Option<JoinHandle<()>>>,
}

impl TaskTransport {
    /// Spawn the worker task on the current runtime.
    pub fn spawn(store: Arc<dyn FrameStore>) -> Self {
        Self::spawn_with_latency(store, Vec::new())
    }

    /// Spawn a worker whose n-th request waits `latency[n]` before being
    /// computed. Requests past the end of the list are served immediately.
    pub fn spawn_with_latency(store: Arc<dyn FrameStore>, latency: Vec<Duration>) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(WORKER_QUEUE_DEPTH);
        let handle = tokio::spawn(async move {
            let mut served = 0usize;
            while let Some((request, reply)) = rx.recv().await {
                let delay = latency.get(served).copied();
                served += 1;
                let store = store.clone();
                // Each request gets its own task so a stalled one never blocks
                // the retry queued behind it.
                tokio::spawn(async move {
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    let request_id = request.request_id;
                    let response = tokio::task::spawn_blocking(move || {
                        handle_request(&request, store.as_ref())
                    })
                    .await
                    .unwrap_or_else(|e| {
                        EstimateResponse::error(request_id, format!("worker computation failed: {}", e))
                    });
                    // The requester may have timed out and gone away.
                    let _ = reply.send(response);
                });
            }
            debug!("Estimator worker task stopped");
        });
        Self {
            tx,
            handle: SyncMutex::new(Some(handle)),
        }
    }
}

#[async_trait]
impl WorkerTransport for TaskTransport {
    async fn round_trip(&self, request: &EstimateRequest) -> Result<EstimateResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((request.clone(), reply_tx))
            .await
            .map_err(|_| anyhow!("estimator worker task is not running"))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("estimator worker dropped the request"))
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
        Ok(())
    }
}
