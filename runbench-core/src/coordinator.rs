use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use runbench_model::{
    EnvironmentInfo, Run, RunEvent, RunId, RunRequest, RunResult, RunStatus,
    SPAWN_FAILURE_EXIT_CODE,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use crate::broadcaster::EventBroadcaster;
use crate::catalog::{ScriptCatalog, ScriptEntry};
use crate::error::{Result, RunError};
use crate::executor::{ExecEvent, ProcessExecutor};
use crate::store::RunStore;

const STDOUT_ARTIFACT: &str = "stdout.log";
const STDERR_ARTIFACT: &str = "stderr.log";
const PROFILE_ARTIFACT: &str = "profile.cpuprofile";

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Hard wall-clock ceiling for a single run.
    pub run_timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL on the timeout path.
    pub kill_grace: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            run_timeout: Duration::from_secs(300),
            kill_grace: crate::executor::DEFAULT_KILL_GRACE,
        }
    }
}

/// What `observe` hands back: either the final record (run already terminal,
/// no chunk replay on the live channel) or a live receiver whose last frame
/// will be the `complete` event.
#[derive(Debug)]
pub enum RunSubscription {
    Terminal(Box<Run>),
    Live(broadcast::Receiver<RunEvent>),
}

/// Admission, serialization, and lifecycle transitions for runs.
///
/// All state transitions happen on one worker task, which is what guarantees
/// at most one run is Running at any instant. `submit`, `get`, `list` and
/// `observe` may be called concurrently from any number of tasks.
#[derive(Clone)]
pub struct RunCoordinator {
    inner: Arc<CoordinatorInner>,
    queue_tx: mpsc::UnboundedSender<Run>,
    worker: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl std::fmt::Debug for RunCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCoordinator")
            .field("queued", &self.inner.queued.load(Ordering::Relaxed))
            .field("active", &*self.inner.active.lock())
            .finish()
    }
}

struct CoordinatorInner {
    store: RunStore,
    broadcaster: EventBroadcaster,
    executor: ProcessExecutor,
    catalog: Arc<dyn ScriptCatalog>,
    config: CoordinatorConfig,
    queued: AtomicUsize,
    active: Mutex<Option<RunId>>,
}

impl RunCoordinator {
    /// Build the coordinator and start its worker loop. Dropping every clone
    /// of the coordinator closes the queue; the worker finishes the in-flight
    /// run and exits.
    pub fn new(
        store: RunStore,
        catalog: Arc<dyn ScriptCatalog>,
        config: CoordinatorConfig,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(CoordinatorInner {
            store,
            broadcaster: EventBroadcaster::default(),
            executor: ProcessExecutor::new(config.kill_grace),
            catalog,
            config,
            queued: AtomicUsize::new(0),
            active: Mutex::new(None),
        });

        let worker = tokio::spawn(worker_loop(Arc::clone(&inner), queue_rx));

        Self {
            inner,
            queue_tx,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Close the admission queue and wait for the worker to drain it: the
    /// in-flight run (and anything already queued) still reaches a terminal
    /// record. Call with the last live clone, or the queue stays open and
    /// this waits forever.
    pub async fn shutdown(self) {
        let Self {
            inner: _inner,
            queue_tx,
            worker,
        } = self;
        drop(queue_tx);
        let worker = worker.lock().take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                error!(error = %err, "run worker task panicked");
            }
        }
    }

    /// Validate, persist, and enqueue a run. Returns the admitted record
    /// (status Queued) without waiting for execution.
    pub async fn submit(&self, request: RunRequest) -> Result<Run> {
        request.validate()?;
        if !self.inner.catalog.contains(&request.script) {
            return Err(RunError::InvalidRequest {
                field: "script".to_string(),
                reason: format!("unknown script `{}`", request.script),
            });
        }

        let run = Run::admitted(request);
        // Channel first, then record: an observer that reads a non-terminal
        // record must always find a live channel to attach to.
        self.inner.broadcaster.register(run.id);
        if let Err(err) = self.inner.store.save(&run).await {
            self.inner.broadcaster.close(&run.id);
            return Err(err);
        }

        self.inner.queued.fetch_add(1, Ordering::Relaxed);
        self.queue_tx
            .send(run.clone())
            .map_err(|_| RunError::Internal("worker loop has stopped".to_string()))?;

        info!(run = %run.id, script = %run.request.script, "run admitted");
        Ok(run)
    }

    pub async fn get(&self, run_id: &RunId) -> Result<Run> {
        self.inner
            .store
            .get(run_id)
            .await?
            .ok_or(RunError::NotFound(*run_id))
    }

    /// Full run list, newest submission first.
    pub async fn list(&self) -> Result<Vec<Run>> {
        self.inner.store.list().await
    }

    /// Open a live subscription. Subscribing to an already-terminal run
    /// yields only the final record; historical output is served from the
    /// persisted stdout artifact, not the live channel.
    pub async fn observe(&self, run_id: &RunId) -> Result<RunSubscription> {
        // Attach before checking status so a run going terminal in between
        // still delivers its complete frame through the receiver.
        let receiver = self.inner.broadcaster.subscribe(run_id);
        let run = self.get(run_id).await?;
        if run.is_terminal() {
            return Ok(RunSubscription::Terminal(Box::new(run)));
        }
        match receiver {
            Some(rx) => Ok(RunSubscription::Live(rx)),
            // Channel already closed: the run went terminal between the
            // subscribe and the read above.
            None => {
                let run = self.get(run_id).await?;
                if run.is_terminal() {
                    Ok(RunSubscription::Terminal(Box::new(run)))
                } else {
                    Err(RunError::Internal(format!(
                        "live channel unavailable for run {run_id}"
                    )))
                }
            }
        }
    }

    /// Absolute path of a terminal run's captured stdout, if recorded.
    pub async fn stdout_artifact(&self, run_id: &RunId) -> Result<std::path::PathBuf> {
        let run = self.get(run_id).await?;
        run.artifacts
            .stdout_path
            .ok_or(RunError::NotFound(*run_id))
    }

    /// Number of runs admitted but not yet picked up by the worker.
    pub fn queue_depth(&self) -> usize {
        self.inner.queued.load(Ordering::Relaxed)
    }

    /// Id of the run currently holding the execution slot, if any.
    pub fn active_run(&self) -> Option<RunId> {
        *self.inner.active.lock()
    }
}

/// Single consumer of the admission queue; the sole writer of run status.
async fn worker_loop(inner: Arc<CoordinatorInner>, mut queue_rx: mpsc::UnboundedReceiver<Run>) {
    while let Some(run) = queue_rx.recv().await {
        inner.queued.fetch_sub(1, Ordering::Relaxed);
        *inner.active.lock() = Some(run.id);
        execute_run(&inner, run).await;
        *inner.active.lock() = None;
    }
    info!("run worker loop stopped");
}

/// Drive one run from Running to a terminal record. Every failure mode ends
/// in a persisted terminal run; nothing here may take the worker loop down.
async fn execute_run(inner: &CoordinatorInner, mut run: Run) {
    run.status = RunStatus::Running;
    run.timestamps.started = Some(Utc::now());
    run.environment = Some(capture_environment());
    persist(inner, &run).await;
    info!(run = %run.id, script = %run.request.script, "run started");

    let started = Instant::now();

    let Some(entry) = inner.catalog.resolve(&run.request.script).cloned() else {
        // Admission checked the catalog; losing the entry afterwards is
        // equivalent to the binary going missing.
        let reason = format!("script `{}` no longer in catalog", run.request.script);
        finalize(inner, run, started, Outcome::spawn_failure(reason)).await;
        return;
    };

    let profile_path = run
        .request
        .options
        .profile
        .then(|| inner.store.artifact_dir(&run.id).join(PROFILE_ARTIFACT));
    let args = build_args(&entry, &run.request, profile_path.as_deref());

    let handle = inner
        .executor
        .run(&entry.program, &args, &[], inner.config.run_timeout);

    let outcome = match handle {
        Ok(mut handle) => {
            let mut outcome = Outcome::default();
            while let Some(event) = handle.next_event().await {
                match event {
                    ExecEvent::Stdout(text) => {
                        outcome.stdout.push_str(&text);
                        outcome.stdout.push('\n');
                        inner.broadcaster.publish(&run.id, RunEvent::Stdout { text });
                    }
                    ExecEvent::Stderr(text) => {
                        outcome.stderr.push_str(&text);
                        outcome.stderr.push('\n');
                        inner.broadcaster.publish(&run.id, RunEvent::Stderr { text });
                    }
                    ExecEvent::Exited { code } => {
                        outcome.exit_code = code;
                        break;
                    }
                    ExecEvent::TimedOut => {
                        outcome.timed_out = true;
                        break;
                    }
                }
            }
            outcome.profile_path = profile_path;
            outcome
        }
        Err(err) => {
            warn!(run = %run.id, error = %err, "spawn failed");
            Outcome::spawn_failure(err.to_string())
        }
    };

    finalize(inner, run, started, outcome).await;
}

#[derive(Debug, Default)]
struct Outcome {
    stdout: String,
    stderr: String,
    exit_code: i32,
    timed_out: bool,
    spawn_failed: bool,
    profile_path: Option<std::path::PathBuf>,
}

impl Outcome {
    /// Spawn failures surface as a Failed run with the sentinel exit code
    /// and the error text captured as if it were stderr output.
    fn spawn_failure(reason: String) -> Self {
        Self {
            stderr: format!("{reason}\n"),
            exit_code: SPAWN_FAILURE_EXIT_CODE,
            spawn_failed: true,
            ..Self::default()
        }
    }
}

/// Write the terminal record exactly once: artifacts, result, final status,
/// then the `complete` frame, then close the live channel.
async fn finalize(inner: &CoordinatorInner, mut run: Run, started: Instant, outcome: Outcome) {
    if outcome.spawn_failed && !outcome.stderr.is_empty() {
        inner.broadcaster.publish(
            &run.id,
            RunEvent::Stderr {
                text: outcome.stderr.trim_end().to_string(),
            },
        );
    }

    match inner
        .store
        .write_artifact(&run.id, STDOUT_ARTIFACT, outcome.stdout.as_bytes())
        .await
    {
        Ok(path) => run.artifacts.stdout_path = Some(path),
        Err(err) => error!(run = %run.id, error = %err, "failed to write stdout artifact"),
    }

    if run.request.options.trace {
        match inner
            .store
            .write_artifact(&run.id, STDERR_ARTIFACT, outcome.stderr.as_bytes())
            .await
        {
            Ok(path) => run.artifacts.stderr_path = Some(path),
            Err(err) => error!(run = %run.id, error = %err, "failed to write stderr artifact"),
        }
    }

    run.artifacts.profile_path = outcome.profile_path;

    run.timestamps.completed = Some(Utc::now());
    run.result = Some(RunResult {
        exit_code: outcome.exit_code,
        duration_ms: started.elapsed().as_millis() as u64,
        timed_out: outcome.timed_out,
    });
    run.status = if outcome.exit_code == 0 && !outcome.timed_out {
        RunStatus::Completed
    } else {
        RunStatus::Failed
    };

    persist(inner, &run).await;
    info!(
        run = %run.id,
        status = %run.status,
        exit_code = outcome.exit_code,
        timed_out = outcome.timed_out,
        "run finished"
    );

    inner
        .broadcaster
        .publish(&run.id, RunEvent::Complete { run: Box::new(run.clone()) });
    inner.broadcaster.close(&run.id);
}

/// A failed save must not stop the worker from proceeding to the next run.
async fn persist(inner: &CoordinatorInner, run: &Run) {
    if let Err(err) = inner.store.save(run).await {
        error!(run = %run.id, error = %err, "failed to persist run record");
    }
}

fn capture_environment() -> EnvironmentInfo {
    EnvironmentInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        runner_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

/// Translate a submission into the script invocation contract: fixed catalog
/// args, then variant and iteration counts, then the optional diagnostic and
/// profile flags.
fn build_args(
    entry: &ScriptEntry,
    request: &RunRequest,
    profile_path: Option<&std::path::Path>,
) -> Vec<String> {
    let mut args = entry.args.clone();
    args.push("--variant".to_string());
    args.push(request.variant.as_str().to_string());
    args.push("--warmup".to_string());
    args.push(request.options.warmup_iterations.to_string());
    args.push("--iterations".to_string());
    args.push(request.options.measured_iterations.to_string());
    if request.options.trace {
        args.push("--trace".to_string());
    }
    if let Some(path) = profile_path {
        args.push("--profile".to_string());
        args.push(path.to_string_lossy().into_owned());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use runbench_model::{RunOptions, Variant};

    #[test]
    fn build_args_translates_options() {
        let entry = ScriptEntry::new("fib", "node", ["benches/fib.js"]);
        let request = RunRequest::new("fib", Variant::Optimized).with_options(RunOptions {
            trace: true,
            profile: false,
            warmup_iterations: 10,
            measured_iterations: 100,
        });

        let args = build_args(&entry, &request, None);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        assert_eq!(
            args,
            vec![
                "benches/fib.js",
                "--variant",
                "optimized",
                "--warmup",
                "10",
                "--iterations",
                "100",
                "--trace",
            ]
        );
    }

    #[test]
    fn build_args_appends_profile_path() {
        let entry = ScriptEntry::new("fib", "node", ["benches/fib.js"]);
        let request = RunRequest::new("fib", Variant::Baseline).with_options(RunOptions {
            profile: true,
            ..RunOptions::default()
        });

        let args = build_args(&entry, &request, Some(std::path::Path::new("/tmp/p.cpuprofile")));
        let tail: Vec<&str> = args.iter().rev().take(2).rev().map(String::as_str).collect();
        assert_eq!(tail, ["--profile", "/tmp/p.cpuprofile"]);
    }

    #[tokio::test]
    async fn admission_save_failure_leaves_no_live_channel() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = RunStore::open(dir.path()).await.unwrap();
        let catalog = Arc::new(crate::catalog::StaticScriptCatalog::new([ScriptEntry::new(
            "echo",
            "sh",
            ["-c", "echo hi"],
        )]));
        let coordinator = RunCoordinator::new(store, catalog, CoordinatorConfig::default());

        // Turn the records directory into a file so the admission save fails.
        let records = dir.path().join("runs");
        std::fs::remove_dir_all(&records).unwrap();
        std::fs::write(&records, b"").unwrap();

        let err = coordinator
            .submit(RunRequest::new("echo", Variant::Baseline))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Io(_)));
        assert_eq!(coordinator.inner.broadcaster.channel_count(), 0);
    }

    #[test]
    fn environment_snapshot_is_populated() {
        let env = capture_environment();
        assert!(!env.os.is_empty());
        assert!(!env.arch.is_empty());
        assert!(!env.runner_version.is_empty());
    }
}
