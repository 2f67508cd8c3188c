//! Claude CLI as an [`AgentRuntime`].

use std::{process::Stdio, time::Duration};

use async_trait::async_trait;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use futures::{StreamExt, stream};
use relay_core::{AgentConnection, AgentRuntime, Message, MessageStream, RuntimeError, RuntimeOptions};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    sync::mpsc,
};

use super::protocol::ProtocolPeer;
use crate::command::CommandBuilder;

/// Default executable name.
pub const DEFAULT_CLAUDE_COMMAND: &str = "claude";

const MESSAGE_BUFFER: usize = 64;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Spawns one `claude` process per connection.
#[derive(Debug, Clone)]
pub struct ClaudeCliRuntime {
    command: String,
}

impl ClaudeCliRuntime {
    /// Use `command` as the base command line, for example `claude` or `npx claude`.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for ClaudeCliRuntime {
    fn default() -> Self {
        Self::new(DEFAULT_CLAUDE_COMMAND)
    }
}

impl AgentRuntime for ClaudeCliRuntime {
    fn connection(&self, options: RuntimeOptions) -> Box<dyn AgentConnection> {
        Box::new(ClaudeCliConnection {
            command: build_command(&self.command, &options),
            options,
            child: None,
            peer: None,
            rx: None,
        })
    }
}

/// Command line for a connection.
#[must_use]
pub fn build_command(base: &str, options: &RuntimeOptions) -> CommandBuilder {
    let mut builder = CommandBuilder::new(base).extend_params([
        "--print",
        "--verbose",
        "--output-format",
        "stream-json",
        "--input-format",
        "stream-json",
    ]);
    if let Some(session_id) = &options.resume_session_id {
        builder = builder.flag_value("--resume", session_id);
    }
    if let Some(prompt) = &options.system_prompt {
        builder = builder.flag_value("--system-prompt", prompt);
    }
    if !options.allowed_tools.is_empty() {
        builder = builder.flag_value("--allowedTools", options.allowed_tools.join(","));
    }
    if !options.setting_sources.is_empty() {
        let sources: Vec<&str> = options.setting_sources.iter().map(|s| s.as_str()).collect();
        builder = builder.flag_value("--setting-sources", sources.join(","));
    }
    builder
}

/// A live `claude` process.
///
/// Dropping the connection kills the process group.
pub struct ClaudeCliConnection {
    command: CommandBuilder,
    options: RuntimeOptions,
    child: Option<AsyncGroupChild>,
    peer: Option<ProtocolPeer>,
    rx: Option<mpsc::Receiver<Result<Message, RuntimeError>>>,
}

impl ClaudeCliConnection {
    fn peer(&self) -> Result<&ProtocolPeer, RuntimeError> {
        self.peer.as_ref().ok_or(RuntimeError::NotConnected)
    }
}

#[async_trait]
impl AgentConnection for ClaudeCliConnection {
    async fn connect(&mut self) -> Result<(), RuntimeError> {
        if self.child.is_some() {
            return Ok(());
        }

        let (executable, args) = self.command.build()?.into_resolved()?;
        let mut command = Command::new(&executable);
        command
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.options.working_dir {
            command.current_dir(dir);
        }

        tracing::debug!(executable = %executable.display(), ?args, "Spawning runtime");
        let mut child = command
            .group_spawn()
            .map_err(|e| RuntimeError::SpawnFailed(format!("{}: {e}", executable.display())))?;

        let inner = child.inner();
        let (Some(stdin), Some(stdout)) = (inner.stdin.take(), inner.stdout.take()) else {
            if let Err(e) = child.start_kill() {
                tracing::debug!("Failed to kill runtime without pipes: {e}");
            }
            return Err(RuntimeError::SpawnFailed("runtime pipes unavailable".to_string()));
        };
        if let Some(stderr) = inner.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "relay_executor::runtime_stderr", "{line}");
                }
            });
        }

        let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);
        let (peer, _reader) = ProtocolPeer::spawn(stdin, stdout, tx);
        self.child = Some(child);
        self.peer = Some(peer.clone());
        self.rx = Some(rx);

        peer.initialize().await?;
        Ok(())
    }

    async fn submit(&self, prompt: &str) -> Result<(), RuntimeError> {
        self.peer()?.send_user_message(prompt).await?;
        Ok(())
    }

    fn receive_messages(&mut self) -> Result<MessageStream, RuntimeError> {
        if self.peer.is_none() {
            return Err(RuntimeError::NotConnected);
        }
        let mut rx = self.rx.take().ok_or(RuntimeError::StreamTaken)?;
        Ok(stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed())
    }

    async fn interrupt(&self) -> Result<(), RuntimeError> {
        self.peer()?.interrupt().await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), RuntimeError> {
        if let Some(peer) = self.peer.take() {
            if let Err(e) = peer.close().await {
                tracing::debug!("Failed to close runtime input: {e}");
            }
        }
        self.rx = None;

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(status) => {
                let status = status?;
                tracing::debug!(%status, "Runtime exited");
            }
            Err(_) => {
                tracing::warn!("Runtime did not exit after {SHUTDOWN_GRACE:?}; killing");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

impl Drop for ClaudeCliConnection {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.start_kill() {
                tracing::debug!("Failed to kill runtime on drop: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use relay_core::SettingSource;

    use super::*;

    #[test]
    fn test_command_line() {
        let options = RuntimeOptions {
            working_dir: None,
            resume_session_id: Some("s1".into()),
            system_prompt: Some("be brief".into()),
            allowed_tools: vec!["Read".into(), "Bash".into()],
            setting_sources: SettingSource::ALL.to_vec(),
        };
        let parts = build_command("claude", &options).build().unwrap();
        assert_eq!(parts.program, "claude");
        assert_eq!(
            parts.args,
            vec![
                "--print",
                "--verbose",
                "--output-format",
                "stream-json",
                "--input-format",
                "stream-json",
                "--resume",
                "s1",
                "--system-prompt",
                "be brief",
                "--allowedTools",
                "Read,Bash",
                "--setting-sources",
                "project,user,local",
            ]
        );
    }

    #[test]
    fn test_fresh_session_omits_resume() {
        let parts = build_command("claude", &RuntimeOptions::default()).build().unwrap();
        assert!(!parts.args.iter().any(|a| a == "--resume"));
        assert!(!parts.args.iter().any(|a| a == "--allowedTools"));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let runtime = ClaudeCliRuntime::new("relay-test-missing-claude-binary");
        let mut connection = runtime.connection(RuntimeOptions::default());
        let err = connection.connect().await.unwrap_err();
        assert_eq!(err.kind(), "executable_not_found");
        assert_eq!(connection.submit("hi").await.unwrap_err().kind(), "not_connected");
    }
}
