use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::{Result, RunError};

/// Default grace period between the polite termination signal and the
/// forceful kill.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

const CHUNK_CHANNEL_CAPACITY: usize = 256;

/// Event emitted by a running process. Output chunks preserve per-stream
/// order; exactly one of `Exited` or `TimedOut` closes the sequence, and no
/// chunk follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    Stdout(String),
    Stderr(String),
    Exited { code: i32 },
    TimedOut,
}

impl ExecEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecEvent::Exited { .. } | ExecEvent::TimedOut)
    }
}

/// Handle onto a spawned process. Consume with [`ExecHandle::next_event`]
/// until the terminal event; the sequence is not restartable.
pub struct ExecHandle {
    events: mpsc::Receiver<ExecEvent>,
}

impl std::fmt::Debug for ExecHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecHandle").finish_non_exhaustive()
    }
}

impl ExecHandle {
    /// Next event, or `None` once the terminal event has been yielded.
    pub async fn next_event(&mut self) -> Option<ExecEvent> {
        self.events.recv().await
    }
}

/// Spawns exactly one external process per run and enforces a wall-clock
/// ceiling on its lifetime.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    kill_grace: Duration,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_KILL_GRACE)
    }
}

impl ProcessExecutor {
    pub fn new(kill_grace: Duration) -> Self {
        Self { kill_grace }
    }

    /// Spawn `program` and stream its output. A spawn failure (missing
    /// binary, permission error) is returned synchronously; everything after
    /// a successful spawn, including the timeout kill, is reported through
    /// the handle.
    pub fn run(
        &self,
        program: &str,
        args: &[String],
        envs: &[(String, String)],
        time_limit: Duration,
    ) -> Result<ExecHandle> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| RunError::Spawn(format!("{program}: {err}")))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);

        if let Some(stdout) = stdout {
            tokio::spawn(read_lines(stdout, chunk_tx.clone(), ExecEvent::Stdout));
        }
        if let Some(stderr) = stderr {
            tokio::spawn(read_lines(stderr, chunk_tx, ExecEvent::Stderr));
        }

        let kill_grace = self.kill_grace;
        tokio::spawn(async move {
            drive(child, chunk_rx, event_tx, time_limit, kill_grace).await;
        });

        Ok(ExecHandle { events: event_rx })
    }
}

/// Forward one stdio stream line-by-line into the shared chunk queue. The
/// sender drops on EOF, which is how the driver learns the stream is done.
async fn read_lines<R>(
    stream: R,
    chunks: mpsc::Sender<ExecEvent>,
    tag: fn(String) -> ExecEvent,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if chunks.send(tag(line)).await.is_err() {
            // Driver stopped listening (timeout path); stop reading.
            break;
        }
    }
}

/// Single-writer merge of both stream readers plus the deadline. Both pipes
/// closing means the child has exited (or closed its stdio), so the exit
/// status is reaped afterwards without losing buffered output.
async fn drive(
    mut child: Child,
    mut chunks: mpsc::Receiver<ExecEvent>,
    events: mpsc::Sender<ExecEvent>,
    time_limit: Duration,
    kill_grace: Duration,
) {
    let deadline = sleep(time_limit);
    tokio::pin!(deadline);

    let timed_out = loop {
        tokio::select! {
            chunk = chunks.recv() => match chunk {
                Some(event) => {
                    if events.send(event).await.is_err() {
                        // Consumer went away; nothing left to report to.
                        let _ = child.kill().await;
                        return;
                    }
                }
                None => break false,
            },
            _ = &mut deadline => break true,
        }
    };

    if timed_out {
        drop(chunks);
        escalate_kill(&mut child, kill_grace).await;
        let _ = events.send(ExecEvent::TimedOut).await;
        return;
    }

    let code = match child.wait().await {
        Ok(status) => exit_code(&status),
        Err(err) => {
            warn!(error = %err, "failed to reap child process");
            runbench_model::SPAWN_FAILURE_EXIT_CODE
        }
    };
    let _ = events.send(ExecEvent::Exited { code }).await;
}

/// Polite termination first, forceful kill after the grace period.
async fn escalate_kill(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        debug!(pid, "sending SIGTERM to timed-out process");
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        if timeout(grace, child.wait()).await.is_ok() {
            return;
        }
        debug!(pid, "process ignored SIGTERM, escalating to SIGKILL");
    }
    #[cfg(not(unix))]
    let _ = grace;

    if let Err(err) = child.kill().await {
        warn!(error = %err, "failed to kill timed-out process");
    }
}

fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    // Killed by a signal; report the shell convention.
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    runbench_model::SPAWN_FAILURE_EXIT_CODE
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: Duration = Duration::from_secs(30);

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    async fn collect(mut handle: ExecHandle) -> Vec<ExecEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let executor = ProcessExecutor::default();
        let handle = executor
            .run("sh", &sh("echo one; echo two"), &[], LONG)
            .unwrap();
        let events = collect(handle).await;
        assert_eq!(
            events,
            vec![
                ExecEvent::Stdout("one".to_string()),
                ExecEvent::Stdout("two".to_string()),
                ExecEvent::Exited { code: 0 },
            ]
        );
    }

    #[tokio::test]
    async fn reports_nonzero_exit() {
        let executor = ProcessExecutor::default();
        let handle = executor.run("sh", &sh("exit 3"), &[], LONG).unwrap();
        let events = collect(handle).await;
        assert_eq!(events, vec![ExecEvent::Exited { code: 3 }]);
    }

    #[tokio::test]
    async fn tags_stderr_separately() {
        let executor = ProcessExecutor::default();
        let handle = executor
            .run("sh", &sh("echo oops >&2"), &[], LONG)
            .unwrap();
        let events = collect(handle).await;
        assert_eq!(
            events,
            vec![
                ExecEvent::Stderr("oops".to_string()),
                ExecEvent::Exited { code: 0 },
            ]
        );
    }

    #[tokio::test]
    async fn spawn_failure_is_synchronous() {
        let executor = ProcessExecutor::default();
        let err = executor
            .run("definitely-not-a-real-binary-xyz", &[], &[], LONG)
            .unwrap_err();
        assert!(matches!(err, RunError::Spawn(_)));
    }

    #[tokio::test]
    async fn timeout_kills_and_reports_partial_output() {
        let executor = ProcessExecutor::new(Duration::from_millis(200));
        let handle = executor
            .run(
                "sh",
                &sh("echo started; sleep 30"),
                &[],
                Duration::from_millis(300),
            )
            .unwrap();
        let events = collect(handle).await;
        assert_eq!(events.first(), Some(&ExecEvent::Stdout("started".to_string())));
        assert_eq!(events.last(), Some(&ExecEvent::TimedOut));
    }

    #[tokio::test]
    async fn terminal_event_is_last() {
        let executor = ProcessExecutor::default();
        let handle = executor
            .run("sh", &sh("echo a; echo b >&2; echo c"), &[], LONG)
            .unwrap();
        let events = collect(handle).await;
        assert!(events.last().unwrap().is_terminal());
        assert_eq!(
            events
                .iter()
                .filter(|event| event.is_terminal())
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn passes_environment_to_child() {
        let executor = ProcessExecutor::default();
        let envs = vec![("RUNBENCH_MARKER".to_string(), "42".to_string())];
        let handle = executor
            .run("sh", &sh("echo $RUNBENCH_MARKER"), &envs, LONG)
            .unwrap();
        let events = collect(handle).await;
        assert_eq!(events[0], ExecEvent::Stdout("42".to_string()));
    }
}
