//! Remote shutdown of a registered host.
//!
//! The command is a template from the config (e.g.
//! `shutdown /s /f /t 0 /m '\\{address}'`), split into argv with shell-words
//! before `{address}` and `{id}` are substituted, so each value stays a single
//! argument. A template may still hand its arguments to a shell (`sh -c ...`),
//! so addresses are limited to host name and IP characters before rendering.
//! Stored status is not touched: the next ping reports the host down.

use crate::models::{HostId, HostRecord};
use crate::store::{HostStore, StoreError};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Forced, zero-delay shutdown of a remote Windows host.
pub const DEFAULT_SHUTDOWN_COMMAND: &str = r"shutdown /s /f /t 0 /m '\\{address}'";

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("no host {id} registered at address {address}")]
    NotFound { address: String, id: HostId },
    #[error("invalid shutdown command template: {0}")]
    InvalidCommand(String),
    #[error("address {0:?} contains characters not allowed in a shutdown command")]
    UnsafeAddress(String),
    #[error("failed to launch shutdown command: {0}")]
    Launch(#[source] std::io::Error),
    #[error("shutdown command failed with exit code {code}")]
    CommandFailed { code: i32, output: String },
    #[error("shutdown command did not finish within {0:?}")]
    TimedOut(Duration),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    /// All of stdout, then all of stderr. The streams are captured separately,
    /// so lines are not interleaved in the order the process wrote them.
    pub output: String,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ShutdownError>;
}

/// Runs commands as child processes. Both pipes are drained and the child is
/// reaped before returning; on timeout the child is killed when dropped.
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ShutdownError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| ShutdownError::TimedOut(limit))?,
            None => cmd.output().await,
        }
        .map_err(ShutdownError::Launch)?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput { code: output.status.code(), output: combined })
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownOutcome {
    pub host: HostRecord,
    pub output: String,
}

pub struct ShutdownInvoker {
    store: Arc<dyn HostStore>,
    runner: Arc<dyn CommandRunner>,
    template: String,
}

impl ShutdownInvoker {
    pub fn new(store: Arc<dyn HostStore>, runner: Arc<dyn CommandRunner>, template: impl Into<String>) -> Self {
        Self { store, runner, template: template.into() }
    }

    pub async fn shutdown(&self, address: &str, id: HostId) -> Result<ShutdownOutcome, ShutdownError> {
        let not_found = || ShutdownError::NotFound { address: address.to_string(), id };
        let host = self
            .store
            .get_by_address_and_id(address, id)?
            .filter(|h| !h.address.trim().is_empty())
            .ok_or_else(not_found)?;

        let argv = render_command(&self.template, &host)?;
        let Some((program, args)) = argv.split_first() else {
            return Err(ShutdownError::InvalidCommand(self.template.clone()));
        };

        info!(id = host.id, address = %host.address, program = %program, "issuing remote shutdown");
        let result = self.runner.run(program, args).await?;
        for line in result.output.lines() {
            debug!(id = host.id, "{line}");
        }

        match result.code {
            Some(0) => Ok(ShutdownOutcome { host, output: result.output }),
            code => {
                let code = code.unwrap_or(-1);
                warn!(id = host.id, address = %host.address, code, "remote shutdown failed");
                Err(ShutdownError::CommandFailed { code, output: result.output })
            }
        }
    }
}

fn is_command_safe_address(address: &str) -> bool {
    address
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '[' | ']' | '%'))
}

fn render_command(template: &str, host: &HostRecord) -> Result<Vec<String>, ShutdownError> {
    if !is_command_safe_address(&host.address) {
        return Err(ShutdownError::UnsafeAddress(host.address.clone()));
    }
    let words = shell_words::split(template).map_err(|e| ShutdownError::InvalidCommand(format!("{template}: {e}")))?;
    if words.is_empty() {
        return Err(ShutdownError::InvalidCommand("empty command".into()));
    }
    let id = host.id.to_string();
    Ok(words
        .into_iter()
        .map(|w| w.replace("{address}", &host.address).replace("{id}", &id))
        .collect())
}
