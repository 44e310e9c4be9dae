//! LaTeX renderer — compile a complete LaTeX document to PDF.
//!
//! The source is written into the output directory and handed to an
//! external engine (`tectonic` by default) as a plain argument vector:
//!
//! ```text
//! <engine> <output_dir>/paper.tex --outdir <output_dir>
//! ```
//!
//! A zero exit status is not trusted on its own: the PDF must exist
//! afterwards or the job fails verification. Nothing is retried and
//! nothing is cleaned up on failure.
//!
//! With [`OutputNaming::Fixed`] every job reuses `paper.tex`/`paper.pdf`, so
//! jobs on one renderer are serialized. [`OutputNaming::PerJob`] derives
//! unique names from the job ID and a digest of the source and lets jobs
//! overlap.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use paperclaw_config::{OutputNaming, RenderConfig};
use paperclaw_core::error::RenderError;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Stem used for artifacts in fixed naming mode.
pub const FIXED_STEM: &str = "paper";

/// Default wall-clock bound for one engine run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// One planned render: where the source goes and where the PDF must appear.
#[derive(Debug, Clone)]
pub struct RenderJob {
    /// Monotonic per renderer, starting at 1.
    pub id: u64,
    pub output_dir: PathBuf,
    pub source_path: PathBuf,
    pub pdf_path: PathBuf,
    pub timeout: Duration,
}

/// A verified PDF.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    /// Absolute path of the PDF.
    pub path: PathBuf,
    pub job_id: u64,
    /// Size of the PDF when it was verified.
    pub bytes: u64,
    pub elapsed: Duration,
    pub stdout: String,
    pub stderr: String,
}

/// Compiles LaTeX sources by running an external engine.
///
/// Cloning is cheap; clones share the job counter and the fixed-slot lock.
#[derive(Debug, Clone)]
pub struct LatexRenderer {
    engine: String,
    output_dir: PathBuf,
    timeout: Duration,
    naming: OutputNaming,
    next_job: Arc<AtomicU64>,
    fixed_slot: Arc<Mutex<()>>,
}

impl LatexRenderer {
    /// A renderer with the default timeout and fixed artifact names.
    pub fn new(engine: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine: engine.into(),
            output_dir: output_dir.into(),
            timeout: DEFAULT_TIMEOUT,
            naming: OutputNaming::Fixed,
            next_job: Arc::new(AtomicU64::new(0)),
            fixed_slot: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(&config.engine, &config.output_dir)
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_naming(config.naming)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_naming(mut self, naming: OutputNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn naming(&self) -> OutputNaming {
        self.naming
    }

    /// Render `source` to PDF and return the verified document.
    pub async fn render(&self, source: &str) -> Result<RenderedDocument, RenderError> {
        let _slot = match self.naming {
            OutputNaming::Fixed => Some(self.fixed_slot.lock().await),
            OutputNaming::PerJob => None,
        };

        let job = self.plan(source)?;
        self.run(&job, source).await
    }

    /// Allocate a job ID and resolve the artifact paths for `source`.
    pub fn plan(&self, source: &str) -> Result<RenderJob, RenderError> {
        let id = self.next_job.fetch_add(1, Ordering::Relaxed) + 1;
        let output_dir =
            std::path::absolute(&self.output_dir).map_err(|source| RenderError::Workspace {
                path: self.output_dir.clone(),
                source,
            })?;

        let stem = match self.naming {
            OutputNaming::Fixed => FIXED_STEM.to_string(),
            OutputNaming::PerJob => format!("{FIXED_STEM}-{id:06}-{}", short_digest(source)),
        };

        Ok(RenderJob {
            id,
            source_path: output_dir.join(format!("{stem}.tex")),
            pdf_path: output_dir.join(format!("{stem}.pdf")),
            output_dir,
            timeout: self.timeout,
        })
    }

    async fn run(&self, job: &RenderJob, source: &str) -> Result<RenderedDocument, RenderError> {
        let started_at = Instant::now();

        tokio::fs::create_dir_all(&job.output_dir)
            .await
            .map_err(|source| RenderError::Workspace {
                path: job.output_dir.clone(),
                source,
            })?;

        tokio::fs::write(&job.source_path, source.as_bytes())
            .await
            .map_err(|source| RenderError::Workspace {
                path: job.source_path.clone(),
                source,
            })?;
        debug!(job_id = job.id, path = %job.source_path.display(), bytes = source.len(), "LaTeX source written");

        // A PDF left over from an earlier job must not satisfy verification.
        match tokio::fs::remove_file(&job.pdf_path).await {
            Ok(()) => debug!(job_id = job.id, path = %job.pdf_path.display(), "Removed previous PDF"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(RenderError::Workspace {
                    path: job.pdf_path.clone(),
                    source,
                });
            }
        }

        info!(
            job_id = job.id,
            engine = %self.engine,
            source = %job.source_path.display(),
            outdir = %job.output_dir.display(),
            "Running typesetting engine"
        );

        let mut command = Command::new(&self.engine);
        command
            .arg(&job.source_path)
            .arg("--outdir")
            .arg(&job.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = run_bounded(&self.engine, command, job.timeout).await.inspect_err(|err| {
            warn!(
                job_id = job.id,
                engine = %self.engine,
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                error = %err,
                "Typesetting engine did not complete"
            );
        })?;

        if !output.status.success() {
            let exit_code = output.status.code();
            warn!(
                job_id = job.id,
                engine = %self.engine,
                exit_code = exit_code.unwrap_or(-1),
                stdout = %output.stdout,
                stderr = %output.stderr,
                "Typesetting engine failed"
            );
            return Err(RenderError::Compilation {
                engine: self.engine.clone(),
                exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        let bytes = match tokio::fs::metadata(&job.pdf_path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => {
                let found = list_dir(&job.output_dir).await;
                warn!(
                    job_id = job.id,
                    expected = %job.pdf_path.display(),
                    found = ?found,
                    "Engine exited cleanly but no PDF was produced"
                );
                return Err(RenderError::Verification {
                    expected: job.pdf_path.clone(),
                    found,
                });
            }
        };

        let elapsed = started_at.elapsed();
        info!(
            job_id = job.id,
            path = %job.pdf_path.display(),
            bytes,
            elapsed_ms = elapsed.as_millis() as u64,
            "PDF generated"
        );

        Ok(RenderedDocument {
            path: job.pdf_path.clone(),
            job_id: job.id,
            bytes,
            elapsed,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Check that the engine can be launched, returning its version banner.
    pub async fn probe(&self) -> Result<String, RenderError> {
        let mut command = Command::new(&self.engine);
        command
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = run_bounded(&self.engine, command, self.timeout).await?;
        if !output.status.success() {
            return Err(RenderError::Compilation {
                engine: self.engine.clone(),
                exit_code: output.status.code(),
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(output.stdout.lines().next().unwrap_or_default().trim().to_string())
    }
}

struct EngineOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// Spawn `command` and collect its exit status and output.
///
/// `timeout` bounds the wait and the draining of both pipes together. The
/// engine runs in its own process group; once the engine exits, or the
/// deadline passes, everything left in that group is killed so no helper
/// process keeps writing into the output directory or holding the pipes.
async fn run_bounded(
    engine: &str,
    mut command: Command,
    timeout: Duration,
) -> Result<EngineOutput, RenderError> {
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(|source| RenderError::Invocation {
        engine: engine.to_string(),
        source,
    })?;
    let group = ProcessGroup::new(child.id());

    let stdout = read_pipe(child.stdout.take());
    let stderr = read_pipe(child.stderr.take());
    let exited = async {
        let status = child.wait().await;
        group.kill();
        status
    };

    let outcome = tokio::time::timeout(timeout, async {
        let (status, stdout, stderr) = tokio::join!(exited, stdout, stderr);
        status.map(|status| EngineOutput {
            status,
            stdout,
            stderr,
        })
    })
    .await;

    match outcome {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(RenderError::Invocation {
            engine: engine.to_string(),
            source,
        }),
        Err(_) => {
            group.kill();
            if let Err(err) = child.kill().await {
                warn!(engine, error = %err, "Failed to kill timed-out engine");
            }
            Err(RenderError::Timeout {
                engine: engine.to_string(),
                timeout,
            })
        }
    }
}

/// The process group an engine was started in.
///
/// Killed again on drop, so a cancelled render leaves nothing behind.
struct ProcessGroup {
    #[cfg_attr(not(unix), allow(dead_code))]
    pid: Option<u32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    #[cfg(unix)]
    fn kill(&self) {
        let Some(pgid) = self.pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
            return;
        };
        // SAFETY: kill(2) takes plain integers and touches no memory of ours.
        if unsafe { libc::kill(-pgid, libc::SIGKILL) } != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                debug!(pgid, error = %err, "Failed to kill engine process group");
            }
        }
    }

    #[cfg(not(unix))]
    fn kill(&self) {}
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(err) = pipe.read_to_end(&mut buf).await {
        debug!(error = %err, "Engine output stream ended early");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Sorted file names in `dir`; empty if it cannot be read.
async fn list_dir(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    names
}

fn short_digest(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    hex::encode(&digest[..4])
}
