//! Out-of-process inference runtime
//!
//! Each model runs in its own worker process, spawned as
//! `<program> <args...> <artifact>`. The worker talks JSON lines:
//!
//! 1. On startup it prints `{"ready":true,"names":[...]}` (or `{"error":"..."}`)
//! 2. For each request line `{"image":"<base64>"}` it prints one
//!    classification or detection output, or `{"error":"..."}`
//!
//! The worker stays alive while the model is resident and is killed when the
//! cache drops it. A worker that exits, or whose request line was cut off by a
//! cancelled caller, reports itself unhealthy so the cache starts a new one.

use super::{InferenceModel, ModelOutput, ModelRuntime};
use crate::error::ModelError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Worker executable used when none is configured
pub const DEFAULT_PROGRAM: &str = "gymvision-infer";

#[derive(Debug, Deserialize)]
struct ReadyLine {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct InferRequest<'a> {
    image: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WorkerReply {
    Failed { error: String },
    Output(ModelOutput),
}

/// Runtime backed by an external worker executable
#[derive(Debug, Clone)]
pub struct CommandRuntime {
    program: PathBuf,
    args: Vec<String>,
    load_timeout: Duration,
}

impl CommandRuntime {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, load_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            load_timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Resolve the worker executable: a path is used as-is, a bare name is
    /// searched on `PATH`
    fn locate_program(&self) -> Option<PathBuf> {
        if self.program.is_absolute() || self.program.components().count() > 1 {
            return self.program.is_file().then(|| self.program.clone());
        }

        let search_path = std::env::var_os("PATH")?;
        std::env::split_paths(&search_path)
            .map(|dir| dir.join(&self.program))
            .find(|candidate| candidate.is_file())
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.load_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[async_trait]
impl ModelRuntime for CommandRuntime {
    fn name(&self) -> &'static str {
        "command"
    }

    fn check_available(&self) -> Result<(), ModelError> {
        match self.locate_program() {
            Some(_) => Ok(()),
            None => Err(ModelError::RuntimeUnavailable(format!(
                "inference worker '{}' not found",
                self.program.display()
            ))),
        }
    }

    async fn load(&self, model: &str, path: &Path) -> Result<Arc<dyn InferenceModel>, ModelError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ModelError::RuntimeUnavailable(format!(
                        "inference worker '{}' not found",
                        self.program.display()
                    ))
                } else {
                    ModelError::unavailable(model, format!("worker spawn failed: {}", e))
                }
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ModelError::unavailable(model, "worker stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ModelError::unavailable(model, "worker stdout not captured"))?;
        let mut lines = BufReader::new(stdout).lines();

        let line = match tokio::time::timeout(self.load_timeout, lines.next_line()).await {
            Err(_) => {
                return Err(ModelError::Timeout {
                    model: model.to_string(),
                    timeout_ms: self.timeout_ms(),
                })
            }
            Ok(Err(e)) => {
                return Err(ModelError::unavailable(model, format!("worker read failed: {}", e)))
            }
            Ok(Ok(None)) => {
                return Err(ModelError::unavailable(model, "worker exited before reporting ready"))
            }
            Ok(Ok(Some(line))) => line,
        };

        let ready: ReadyLine = serde_json::from_str(&line)
            .map_err(|e| ModelError::unavailable(model, format!("malformed ready line: {}", e)))?;
        if let Some(error) = ready.error {
            return Err(ModelError::unavailable(model, error));
        }
        if !ready.ready {
            return Err(ModelError::unavailable(model, "worker did not report ready"));
        }

        debug!(model, classes = ready.names.len(), "Inference worker ready");

        Ok(Arc::new(WorkerModel {
            model: model.to_string(),
            broken: AtomicBool::new(false),
            io: Mutex::new(WorkerIo {
                _child: child,
                stdin,
                lines,
                awaiting_reply: false,
            }),
        }))
    }
}

struct WorkerIo {
    /// Held so the worker is killed when the model is dropped
    _child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    /// A request was written but its reply never read (caller cancelled)
    awaiting_reply: bool,
}

/// One resident model served by a worker process
struct WorkerModel {
    model: String,
    /// Set while a request line is being written and whenever the pipe
    /// fails; stdin may hold a partial line, so the worker is unusable
    broken: AtomicBool,
    io: Mutex<WorkerIo>,
}

impl WorkerModel {
    fn mark_broken(&self, reason: &str) -> ModelError {
        self.broken.store(true, Ordering::Release);
        ModelError::unavailable(&self.model, reason)
    }

    async fn read_line(&self, io: &mut WorkerIo) -> Result<String, ModelError> {
        match io.lines.next_line().await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(self.mark_broken("worker exited")),
            Err(e) => Err(self.mark_broken(&format!("worker read failed: {}", e))),
        }
    }
}

#[async_trait]
impl InferenceModel for WorkerModel {
    async fn infer(&self, image: &[u8]) -> Result<ModelOutput, ModelError> {
        let mut io = self.io.lock().await;

        if self.broken.load(Ordering::Acquire) {
            return Err(ModelError::unavailable(
                &self.model,
                "worker is in an unknown state and must be restarted",
            ));
        }

        if io.awaiting_reply {
            warn!(model = %self.model, "Discarding reply to an abandoned request");
            self.read_line(&mut io).await?;
            io.awaiting_reply = false;
        }

        let encoded = STANDARD.encode(image);
        let mut request = serde_json::to_string(&InferRequest { image: &encoded })
            .map_err(|e| ModelError::inference(&self.model, e.to_string()))?;
        request.push('\n');

        // Cleared only once the whole line is written; a cancelled write
        // leaves the worker broken
        self.broken.store(true, Ordering::Release);
        if let Err(e) = io.stdin.write_all(request.as_bytes()).await {
            return Err(self.mark_broken(&format!("worker write failed: {}", e)));
        }
        if let Err(e) = io.stdin.flush().await {
            return Err(self.mark_broken(&format!("worker write failed: {}", e)));
        }
        io.awaiting_reply = true;
        self.broken.store(false, Ordering::Release);

        let line = self.read_line(&mut io).await?;
        io.awaiting_reply = false;

        match serde_json::from_str::<WorkerReply>(&line) {
            Ok(WorkerReply::Output(output)) => Ok(output),
            Ok(WorkerReply::Failed { error }) => Err(ModelError::inference(&self.model, error)),
            Err(e) => Err(ModelError::inference(
                &self.model,
                format!("malformed worker reply: {}", e),
            )),
        }
    }

    fn is_healthy(&self) -> bool {
        !self.broken.load(Ordering::Acquire)
    }
}
