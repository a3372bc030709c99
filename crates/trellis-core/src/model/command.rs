//! Subprocess-backed model client.
//!
//! Wraps a local model CLI (`claude` by default). The prompt is written to
//! the child's stdin; the response is read from stdout. Conversation
//! affinity rides on the CLI's own session mechanism: the thread handle is
//! a UUID we mint, passed on every call via `thread_flag` so the CLI
//! creates or resumes the matching session.

use std::process::Stdio;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::ModelClient;

/// Environment variable used to hand the user's API key to the child.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Model client that shells out to a CLI.
#[derive(Debug, Clone)]
pub struct CommandModelClient {
    /// Executable to spawn (e.g. "claude").
    pub command: String,
    /// Fixed arguments prepended to every invocation (e.g. ["-p"]).
    pub args: Vec<String>,
    /// Flag carrying the thread handle (e.g. "--session-id"). `None`
    /// disables thread addressing entirely.
    pub thread_flag: Option<String>,
}

impl CommandModelClient {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: vec!["-p".to_string()],
            thread_flag: Some("--session-id".to_string()),
        }
    }
}

#[async_trait]
impl ModelClient for CommandModelClient {
    fn name(&self) -> &str {
        "command"
    }

    async fn create_thread(&self) -> Result<String> {
        // The CLI materializes the session on first use; minting the
        // handle locally keeps thread creation free of a model call.
        Ok(Uuid::new_v4().to_string())
    }

    async fn generate(
        &self,
        thread_handle: &str,
        prompt: &str,
        api_key: Option<&str>,
    ) -> Result<String> {
        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.args(&self.args);
        if let Some(flag) = &self.thread_flag {
            cmd.arg(flag).arg(thread_handle);
        }
        if let Some(key) = api_key {
            cmd.env(API_KEY_ENV, key);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn model command {:?}", self.command))?;

        let mut stdin = child
            .stdin
            .take()
            .context("model command has no stdin handle")?;
        stdin
            .write_all(prompt.as_bytes())
            .await
            .context("failed to write prompt to model command")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("failed to wait for model command")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            bail!(
                "model command {:?} exited with {}: {}",
                self.command,
                output.status,
                tail
            );
        }

        let text =
            String::from_utf8(output.stdout).context("model command produced non-UTF-8 output")?;
        Ok(text)
    }
}
