//! Subprocess execution transport.
//!
//! Runs the actor through an external CLI: the structured input is
//! written as UTF-8 JSON to the child's stdin, and the child prints a
//! single UTF-8 JSON array of dataset items on stdout. A non-zero exit
//! with a structured `{name, message, ...}` diagnostic on stderr signals
//! failure.
//!
//! Failures are classified so the runner can react correctly: a missing
//! executable, unparsable stdout, or a missing-dependency signature is an
//! `Infra` error (the CLI environment is broken and will stay broken); a
//! clean non-zero exit is an `Outcome` error; an elapsed hard deadline is
//! a `Timeout`.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use actor_client::ActorInput;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{ActorTransport, TransportKind};
use crate::error::TransportError;

#[derive(Debug, Clone)]
pub struct SubprocessConfig {
    /// The CLI executable to invoke.
    pub program: PathBuf,
    pub actor_id: String,
    pub token: String,
    pub base_url: String,
    /// Soft run deadline passed to the CLI.
    pub run_timeout: Duration,
    /// Extra process-level buffer on top of `run_timeout`, so a
    /// completion signal can still win the race against the hard kill.
    pub grace: Duration,
}

impl SubprocessConfig {
    pub fn new(program: impl Into<PathBuf>, actor_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            actor_id: actor_id.into(),
            token: token.into(),
            base_url: "https://api.apify.com/v2".to_string(),
            run_timeout: Duration::from_secs(300),
            grace: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// The process-level deadline: the soft run timeout plus the grace
    /// buffer.
    pub fn hard_deadline(&self) -> Duration {
        self.run_timeout + self.grace
    }

    /// CLI arguments for one invocation. Both the soft and hard
    /// deadlines are passed down so the child can enforce them itself;
    /// the parent-side kill is the backstop.
    fn cli_args(&self, max_items: usize) -> Vec<String> {
        vec![
            "--token".to_string(),
            self.token.clone(),
            "--actor".to_string(),
            self.actor_id.clone(),
            "--timeout-secs".to_string(),
            self.run_timeout.as_secs().to_string(),
            "--hard-timeout-secs".to_string(),
            self.hard_deadline().as_secs().to_string(),
            "--max-items".to_string(),
            max_items.to_string(),
            "--base-url".to_string(),
            self.base_url.clone(),
        ]
    }
}

pub struct SubprocessTransport {
    config: SubprocessConfig,
}

impl SubprocessTransport {
    pub fn new(config: SubprocessConfig) -> Self {
        Self { config }
    }
}

/// Structured diagnostic printed by the CLI on failure.
#[derive(Debug, Deserialize)]
struct Diagnostic {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "statusCode")]
    status_code: Option<u16>,
}

/// Check stderr text for signatures of a broken CLI environment.
fn is_missing_dependency(text: &str) -> bool {
    let text = text.to_lowercase();
    text.contains("cannot find module")
        || text.contains("module_not_found")
        || text.contains("enoent")
        || text.contains("command not found")
        || text.contains("is not recognized")
}

#[async_trait]
impl ActorTransport for SubprocessTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Subprocess
    }

    async fn run(
        &self,
        input: &ActorInput,
        max_items: usize,
    ) -> std::result::Result<Vec<Value>, TransportError> {
        let hard_deadline = self.config.hard_deadline();

        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.config.cli_args(max_items))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| TransportError::Infra {
            reason: if e.kind() == std::io::ErrorKind::NotFound {
                format!("executable not found: {}", self.config.program.display())
            } else {
                format!("failed to spawn {}: {e}", self.config.program.display())
            },
        })?;

        let payload = serde_json::to_vec(input).map_err(|e| TransportError::Infra {
            reason: format!("failed to encode input: {e}"),
        })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| TransportError::Infra {
                    reason: format!("failed to write input: {e}"),
                })?;
            // Close stdin so the child sees EOF.
            drop(stdin);
        }

        let output = match tokio::time::timeout(hard_deadline, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| TransportError::Infra {
                reason: format!("failed to collect output: {e}"),
            })?,
            Err(_) => {
                tracing::warn!(
                    program = %self.config.program.display(),
                    ?hard_deadline,
                    "Subprocess hard deadline elapsed, killing"
                );
                return Err(TransportError::Timeout {
                    elapsed: hard_deadline,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = match serde_json::from_str::<Diagnostic>(stderr.trim()) {
                Ok(diag) => {
                    let name = diag.name.unwrap_or_else(|| "Error".to_string());
                    let message = diag.message.unwrap_or_default();
                    match diag.status_code {
                        Some(code) => format!("{name} ({code}): {message}"),
                        None => format!("{name}: {message}"),
                    }
                }
                Err(_) => stderr.trim().to_string(),
            };
            if is_missing_dependency(&detail) {
                return Err(TransportError::Infra { reason: detail });
            }
            return Err(TransportError::Outcome { detail });
        }

        let items: Vec<Value> =
            serde_json::from_slice(&output.stdout).map_err(|e| TransportError::Infra {
                reason: format!("unparsable subprocess output: {e}"),
            })?;

        tracing::debug!(count = items.len(), "Subprocess run returned items");
        Ok(items)
    }
}
