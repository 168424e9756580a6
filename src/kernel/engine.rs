//! Persistent sandboxed Python kernel
//!
//! One kernel process lives per session. Code fragments are executed against
//! a cumulative namespace, so variables and imports persist across calls.
//! The host talks to an embedded driver script over a line-framed JSON
//! protocol: one request line in, one reply line out. A hard timeout
//! interrupts a runaway cell with SIGINT; a dead process is reported as a
//! [`KernelError`], never panicked on.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::kernel::notebook::{write_notebook, NotebookCell};
use crate::kernel::outcome::ExecutionResult;
use crate::metrics::CODE_EXECUTIONS;

/// Driver script run by the kernel process.
///
/// Reads one JSON request per line on stdin, executes the code against the
/// shared namespace, and replies with one JSON line carrying the combined
/// stream output and the traceback text on failure.
const PY_DRIVER: &str = r#"
import io, json, sys, traceback

ns = {}
for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    req = json.loads(line)
    captured = io.StringIO()
    real_out, real_err = sys.stdout, sys.stderr
    sys.stdout = sys.stderr = captured
    status, error = "ok", ""
    try:
        exec(compile(req["code"], "<cell>", "exec"), ns)
    except BaseException:
        status = "error"
        error = traceback.format_exc()
    finally:
        sys.stdout, sys.stderr = real_out, real_err
    reply = {"status": status, "output": captured.getvalue(), "error": error}
    print(json.dumps(reply), flush=True)
"#;

/// Grace period for draining the driver's late reply after an interrupt
const INTERRUPT_GRACE: Duration = Duration::from_secs(2);

/// Error type for kernel operations
///
/// These are infra-level failures of the kernel process itself, distinct
/// from errors raised by the executed code (which come back as
/// `Sign::Error` results).
#[derive(Debug)]
pub enum KernelError {
    Spawn(std::io::Error),
    Io(std::io::Error),
    Protocol(String),
    Closed,
}

impl std::fmt::Display for KernelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelError::Spawn(e) => write!(f, "Failed to spawn kernel process: {}", e),
            KernelError::Io(e) => write!(f, "Kernel I/O error: {}", e),
            KernelError::Protocol(msg) => write!(f, "Kernel protocol error: {}", msg),
            KernelError::Closed => write!(f, "Kernel process has exited"),
        }
    }
}

impl std::error::Error for KernelError {}

impl From<std::io::Error> for KernelError {
    fn from(e: std::io::Error) -> Self {
        KernelError::Io(e)
    }
}

/// Reply line from the driver script
#[derive(Debug, Deserialize)]
struct DriverReply {
    status: String,
    output: String,
    error: String,
}

/// The execution engine seam
///
/// The orchestrator only needs `execute`; lifecycle and notebook export stay
/// on the concrete kernel type.
#[async_trait]
pub trait Runner: Send {
    async fn execute(&mut self, code: &str) -> Result<ExecutionResult, KernelError>;
}

/// Persistent Python interpreter bound to one session
pub struct PyKernel {
    child: Child,
    stdin: ChildStdin,
    replies: Lines<BufReader<ChildStdout>>,
    working_dir: PathBuf,
    max_exe_time: Duration,
    cells: Vec<NotebookCell>,
}

impl PyKernel {
    /// Spawn a kernel process working inside `working_dir`
    pub fn spawn(working_dir: &Path, max_exe_time: Duration) -> Result<Self, KernelError> {
        let mut child = Command::new("python3")
            .arg("-u")
            .arg("-c")
            .arg(PY_DRIVER)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(KernelError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| KernelError::Protocol("kernel stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| KernelError::Protocol("kernel stdout unavailable".to_string()))?;

        debug!(working_dir = %working_dir.display(), "kernel spawned");

        Ok(Self {
            child,
            stdin,
            replies: BufReader::new(stdout).lines(),
            working_dir: working_dir.to_path_buf(),
            max_exe_time,
            cells: Vec::new(),
        })
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn set_max_exe_time(&mut self, max_exe_time: Duration) {
        self.max_exe_time = max_exe_time;
    }

    /// Execute a code fragment against the cumulative namespace
    pub async fn run(&mut self, code: &str) -> Result<ExecutionResult, KernelError> {
        let request = serde_json::to_string(&serde_json::json!({ "code": code }))
            .map_err(|e| KernelError::Protocol(e.to_string()))?;
        self.stdin.write_all(request.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;

        let line = match timeout(self.max_exe_time, self.replies.next_line()).await {
            Ok(read) => read?.ok_or(KernelError::Closed)?,
            Err(_) => {
                let result = self.interrupt().await;
                self.cells.push(NotebookCell::new(
                    code,
                    vec![result.human_message.clone()],
                ));
                CODE_EXECUTIONS.with_label_values(&["timeout"]).inc();
                return Ok(result);
            }
        };

        let reply: DriverReply = serde_json::from_str(&line)
            .map_err(|e| KernelError::Protocol(format!("bad reply line: {}", e)))?;

        let result = if reply.status == "ok" {
            CODE_EXECUTIONS.with_label_values(&["success"]).inc();
            ExecutionResult::success(reply.output)
        } else {
            CODE_EXECUTIONS.with_label_values(&["error"]).inc();
            let raw = if reply.output.is_empty() {
                reply.error.clone()
            } else {
                format!("{}\n{}", reply.output, reply.error)
            };
            ExecutionResult::error(reply.error, raw)
        };

        self.cells
            .push(NotebookCell::new(code, vec![result.raw_output.clone()]));
        Ok(result)
    }

    /// Interrupt a runaway cell and report it as a timeout error
    async fn interrupt(&mut self) -> ExecutionResult {
        if let Some(pid) = self.child.id() {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
                warn!(error = %e, "failed to interrupt kernel");
            }
        }
        // The driver answers the interrupted cell with a KeyboardInterrupt
        // reply; drain it so the protocol stays in sync.
        let _ = timeout(INTERRUPT_GRACE, self.replies.next_line()).await;

        ExecutionResult::error(
            format!(
                "Execution timed out after {} seconds and was interrupted.",
                self.max_exe_time.as_secs()
            ),
            "",
        )
    }

    /// Flatten the execution history into a portable notebook document
    pub fn export_notebook(&self, path: &Path) -> std::io::Result<()> {
        write_notebook(path, &self.cells)
    }

    pub fn cells(&self) -> &[NotebookCell] {
        &self.cells
    }

    /// Release the kernel process. A new kernel must be spawned to resume
    /// work in the session.
    pub async fn shutdown(&mut self) {
        let _ = self.child.start_kill();
        let _ = timeout(Duration::from_secs(5), self.child.wait()).await;
    }
}

#[async_trait]
impl Runner for PyKernel {
    async fn execute(&mut self, code: &str) -> Result<ExecutionResult, KernelError> {
        self.run(code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::outcome::Sign;

    fn spawn_kernel(dir: &Path) -> PyKernel {
        PyKernel::spawn(dir, Duration::from_secs(10)).expect("python3 must be on PATH")
    }

    #[tokio::test]
    #[ignore = "Requires python3 on PATH"]
    async fn test_state_persists_across_cells() {
        let dir = tempfile::tempdir().unwrap();
        let mut kernel = spawn_kernel(dir.path());

        let first = kernel.run("x = 21").await.unwrap();
        assert_eq!(first.sign, Sign::Success);

        let second = kernel.run("print(x * 2)").await.unwrap();
        assert_eq!(second.sign, Sign::Success);
        assert_eq!(second.raw_output.trim(), "42");

        kernel.shutdown().await;
    }

    #[tokio::test]
    #[ignore = "Requires python3 on PATH"]
    async fn test_runtime_error_carries_traceback() {
        let dir = tempfile::tempdir().unwrap();
        let mut kernel = spawn_kernel(dir.path());

        let result = kernel.run("1 / 0").await.unwrap();
        assert_eq!(result.sign, Sign::Error);
        assert!(result.human_message.contains("ZeroDivisionError"));

        // The kernel survives the error and keeps serving.
        let after = kernel.run("print('alive')").await.unwrap();
        assert_eq!(after.sign, Sign::Success);

        kernel.shutdown().await;
    }

    #[tokio::test]
    #[ignore = "Requires python3 on PATH"]
    async fn test_timeout_interrupts_cell() {
        let dir = tempfile::tempdir().unwrap();
        let mut kernel = PyKernel::spawn(dir.path(), Duration::from_secs(1)).unwrap();

        let result = kernel.run("import time\ntime.sleep(30)").await.unwrap();
        assert_eq!(result.sign, Sign::Error);
        assert!(result.human_message.contains("timed out"));

        kernel.shutdown().await;
    }

    #[tokio::test]
    #[ignore = "Requires python3 on PATH"]
    async fn test_cells_recorded_for_notebook() {
        let dir = tempfile::tempdir().unwrap();
        let mut kernel = spawn_kernel(dir.path());

        kernel.run("print('one')").await.unwrap();
        kernel.run("print('two')").await.unwrap();
        assert_eq!(kernel.cells().len(), 2);

        let path = dir.path().join("notebook.ipynb");
        kernel.export_notebook(&path).unwrap();
        assert!(path.exists());

        kernel.shutdown().await;
    }
}
