use crate::DebugDump;
use parking_lot::Mutex;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tunguard_types::{CommandResult, TunguardError, TunguardResult, EXIT_CODE_UNAVAILABLE};

/// How long captured pipes may keep draining after the child is gone.
/// Grandchildren holding the pipe open must not extend the deadline.
const PIPE_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Runs external programs under a hard deadline. Callers own any retry policy.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommandRunner {
    debug: DebugDump,
}

impl CommandRunner {
    pub fn new(debug: DebugDump) -> Self {
        Self { debug }
    }

    pub async fn run(
        &self,
        path: &Path,
        timeout: Duration,
        args: &[String],
    ) -> TunguardResult<CommandResult> {
        let shown = path.display().to_string();

        let mut child = match Command::new(path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                info!("run {:?} exit={}", shown, EXIT_CODE_UNAVAILABLE);
                return Err(TunguardError::CommandSpawn {
                    path: shown,
                    reason: e.to_string(),
                });
            }
        };

        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let stdout_task = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(drain(pipe, stdout_buf.clone())));
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(drain(pipe, stderr_buf.clone())));

        let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => (status.code().unwrap_or(EXIT_CODE_UNAVAILABLE), false),
            Ok(Err(e)) => {
                warn!("wait on {:?} failed: {}", shown, e);
                (EXIT_CODE_UNAVAILABLE, false)
            }
            Err(_) => {
                warn!("{:?} exceeded {:?}, killing", shown, timeout);
                let _ = child.start_kill();
                let _ = tokio::time::timeout(PIPE_DRAIN_GRACE, child.wait()).await;
                (EXIT_CODE_UNAVAILABLE, true)
            }
        };

        finish_drain(stdout_task).await;
        finish_drain(stderr_task).await;

        let result = CommandResult {
            exit_code,
            stdout: collect(&stdout_buf),
            stderr: collect(&stderr_buf),
        };

        info!("run {:?} exit={}", shown, result.exit_code);
        self.debug.dump("command_stdout", &result.stdout);
        self.debug.dump("command_stderr", &result.stderr);

        if timed_out {
            return Err(TunguardError::CommandTimeout {
                path: shown,
                timeout,
                output: result,
            });
        }
        if !result.success() {
            return Err(TunguardError::CommandFailed {
                path: shown,
                output: result,
            });
        }
        Ok(result)
    }
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R, sink: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => sink.lock().extend_from_slice(&chunk[..n]),
        }
    }
}

async fn finish_drain(task: Option<JoinHandle<()>>) {
    if let Some(mut task) = task {
        if tokio::time::timeout(PIPE_DRAIN_GRACE, &mut task).await.is_err() {
            task.abort();
        }
    }
}

fn collect(buf: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8_lossy(&buf.lock()).trim().to_string()
}
