use std::process::Stdio;
use std::time::{Duration, Instant};

use codebench_core::{ErrorKind, SandboxConfig};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-stream cap on captured output.
pub const MAX_CAPTURE_BYTES: u64 = 1 << 20;

const SOLUTION_FILE: &str = "solution.py";
const SYNTAX_MARKERS: &[&str] = &["SyntaxError", "IndentationError", "TabError"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_memory_bytes: Option<u64>,
    pub max_cpu_seconds: Option<u64>,
}

/// Result of running one program against one stdin payload.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub error_kind: Option<ErrorKind>,
    pub duration: Duration,
}

impl ExecutionOutput {
    fn timed_out(timeout: Duration, duration: Duration) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: format!("Timeout after {}ms", timeout.as_millis()),
            error_kind: Some(ErrorKind::Timeout),
            duration,
        }
    }

    fn launch_failed(err: std::io::Error, duration: Duration) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: err.to_string(),
            error_kind: Some(ErrorKind::Runtime),
            duration,
        }
    }
}

/// Classify the stderr of a failed run.
pub fn classify(stderr: &str) -> ErrorKind {
    match SYNTAX_MARKERS.iter().any(|m| stderr.contains(m)) {
        true => ErrorKind::Syntax,
        false => ErrorKind::Runtime,
    }
}

/// Runs untrusted programs in a throwaway working directory with a scrubbed
/// environment and a wall-clock limit.
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    interpreter: String,
    timeout: Duration,
    limits: ResourceLimits,
}

impl Default for SandboxExecutor {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl SandboxExecutor {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout: DEFAULT_TIMEOUT,
            limits: ResourceLimits::default(),
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(config.interpreter.clone())
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_limits(ResourceLimits {
                max_memory_bytes: config.max_memory_bytes,
                max_cpu_seconds: config.max_cpu_seconds,
            })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Never fails: launch problems are reported as a runtime failure.
    pub async fn execute_one(&self, code: &str, stdin: &str) -> ExecutionOutput {
        let start = Instant::now();
        match self.try_execute(code, stdin, start).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Sandbox launch failed ({}): {}", self.interpreter, e);
                ExecutionOutput::launch_failed(e, start.elapsed())
            }
        }
    }

    async fn try_execute(
        &self,
        code: &str,
        stdin: &str,
        start: Instant,
    ) -> std::io::Result<ExecutionOutput> {
        let workdir = TempDir::new()?;
        let script = workdir.path().join(SOLUTION_FILE);
        tokio::fs::write(&script, code).await?;

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(&script)
            .current_dir(workdir.path())
            .env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default())
            .env("PYTHONPATH", "")
            .env("HOME", workdir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        isolate(&mut cmd, self.limits);

        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut child = cmd.spawn()?;
        let pid = child.id();

        let mut writer = child.stdin.take().map(|mut pipe| {
            let input = stdin.as_bytes().to_vec();
            tokio::spawn(async move {
                // Program may exit without reading; a broken pipe is fine.
                let _ = pipe.write_all(&input).await;
            })
        });
        let mut stdout_reader = child.stdout.take().map(spawn_reader);
        let mut stderr_reader = child.stderr.take().map(spawn_reader);

        // Exit, stdin delivery and pipe collection all share one deadline.
        let finished = tokio::time::timeout_at(deadline, async {
            let status = child.wait().await?;
            // Anything the program left behind may still hold the pipes open.
            kill_process_group(pid);
            if let Some(task) = writer.as_mut() {
                let _ = task.await;
            }
            let stdout = collect(stdout_reader.as_mut()).await;
            let stderr = collect(stderr_reader.as_mut()).await;
            Ok::<_, std::io::Error>((status, stdout, stderr))
        })
        .await;

        let (status, stdout, stderr) = match finished {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => {
                kill_process_group(pid);
                return Err(e);
            }
            Err(_) => {
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill timed-out process: {}", e);
                }
                for task in [stdout_reader, stderr_reader].into_iter().flatten() {
                    task.abort();
                }
                if let Some(task) = writer {
                    task.abort();
                }
                tracing::debug!("Execution timed out after {:?}", self.timeout);
                return Ok(ExecutionOutput::timed_out(self.timeout, start.elapsed()));
            }
        };
        let duration = start.elapsed();

        if status.success() {
            return Ok(ExecutionOutput {
                success: true,
                stdout,
                stderr,
                error_kind: None,
                duration,
            });
        }

        Ok(ExecutionOutput {
            success: false,
            error_kind: Some(classify(&stderr)),
            stdout,
            stderr,
            duration,
        })
    }
}

/// Keeps the first [`MAX_CAPTURE_BYTES`] and discards the rest, so a chatty
/// program can neither exhaust memory nor block on a full pipe.
fn spawn_reader<R>(mut pipe: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = (&mut pipe).take(MAX_CAPTURE_BYTES).read_to_end(&mut buf).await;
        let _ = tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await;
        buf
    })
}

async fn collect(reader: Option<&mut JoinHandle<Vec<u8>>>) -> String {
    match reader {
        Some(task) => String::from_utf8_lossy(&task.await.unwrap_or_default()).into_owned(),
        None => String::new(),
    }
}

#[cfg(unix)]
fn isolate(cmd: &mut Command, limits: ResourceLimits) {
    unsafe {
        cmd.pre_exec(move || {
            // Own process group, so the whole tree can be killed at once.
            if libc::setpgid(0, 0) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            set_rlimits(limits)
        });
    }
}

#[cfg(not(unix))]
fn isolate(_cmd: &mut Command, limits: ResourceLimits) {
    if limits != ResourceLimits::default() {
        tracing::warn!("Resource limits are not supported on this platform");
    }
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    unsafe {
        let _ = libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(unix)]
fn set_rlimits(limits: ResourceLimits) -> std::io::Result<()> {
    let set = |resource, value: u64| {
        let limit = libc::rlimit {
            rlim_cur: value as libc::rlim_t,
            rlim_max: value as libc::rlim_t,
        };
        match unsafe { libc::setrlimit(resource, &limit) } {
            0 => Ok(()),
            _ => Err(std::io::Error::last_os_error()),
        }
    };

    if let Some(secs) = limits.max_cpu_seconds {
        set(libc::RLIMIT_CPU, secs)?;
    }
    if let Some(bytes) = limits.max_memory_bytes {
        set(libc::RLIMIT_AS, bytes)?;
    }
    Ok(())
}
