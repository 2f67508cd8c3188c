//! Claude CLI control protocol handler.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use relay_core::{Message, RuntimeError};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::{Mutex, mpsc},
    task::JoinHandle,
};

use super::types::{CliMessage, ControlRequest, ControlResponse, Outgoing};

/// Protocol error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Input stream already closed")]
    InputClosed,
}

impl From<ProtocolError> for RuntimeError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(e) => Self::Io(e),
            ProtocolError::Json(e) => Self::Protocol(e.to_string()),
            ProtocolError::InputClosed => Self::Closed("stdin closed".to_string()),
        }
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Writes requests to the CLI and relays its output.
///
/// Cloning shares the same input pipe, so a clone can interrupt while the
/// reader task is running.
#[derive(Clone)]
pub struct ProtocolPeer {
    stdin: Arc<Mutex<Option<BoxedWriter>>>,
    next_request: Arc<AtomicU64>,
}

impl ProtocolPeer {
    /// Spawn a protocol peer.
    ///
    /// Starts a background task that reads stdout, answers control requests
    /// and forwards relayed messages to `tx`. The task ends after the result
    /// message, at end of input, or when `tx` is closed.
    pub fn spawn<W, R>(
        stdin: W,
        stdout: R,
        tx: mpsc::Sender<Result<Message, RuntimeError>>,
    ) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let peer = Self {
            stdin: Arc::new(Mutex::new(Some(Box::new(stdin)))),
            next_request: Arc::new(AtomicU64::new(1)),
        };

        let reader_peer = peer.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = reader_peer.read_loop(stdout, &tx).await {
                tracing::error!("Protocol reader loop error: {e}");
                let _ = tx.send(Err(e.into())).await;
            }
        });

        (peer, handle)
    }

    async fn read_loop<R>(
        &self,
        stdout: R,
        tx: &mpsc::Sender<Result<Message, RuntimeError>>,
    ) -> Result<(), ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(stdout);
        let mut buffer = String::new();

        loop {
            buffer.clear();
            if reader.read_line(&mut buffer).await? == 0 {
                let _ = tx
                    .send(Err(RuntimeError::Closed(
                        "runtime exited before sending a result".to_string(),
                    )))
                    .await;
                return Ok(());
            }

            let line = buffer.trim();
            if line.is_empty() {
                continue;
            }

            let parsed = match serde_json::from_str::<CliMessage>(line) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!("Skipping unparseable runtime output: {e}");
                    continue;
                }
            };

            match parsed {
                CliMessage::ControlRequest { request_id, request } => {
                    let subtype = request.get("subtype").and_then(|s| s.as_str()).unwrap_or("unknown");
                    tracing::debug!(subtype, "Declining control request from runtime");
                    self.send_error(request_id, format!("unsupported control request: {subtype}"))
                        .await?;
                }
                CliMessage::ControlResponse { response } => {
                    tracing::trace!(%response, "Control response");
                }
                other => {
                    let Some(message) = other.into_message() else {
                        continue;
                    };
                    let done = message.is_result();
                    if tx.send(Ok(message)).await.is_err() {
                        tracing::debug!("Message receiver dropped; stopping reader");
                        return Ok(());
                    }
                    if done {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn send_error(&self, request_id: String, error: String) -> Result<(), ProtocolError> {
        self.send_json(&Outgoing::ControlResponse {
            response: ControlResponse::Error { request_id, error },
        })
        .await
    }

    async fn send_json(&self, message: &Outgoing) -> Result<(), ProtocolError> {
        let json = serde_json::to_string(message)?;
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(ProtocolError::InputClosed)?;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    fn request_id(&self) -> String {
        format!("req_{}", self.next_request.fetch_add(1, Ordering::Relaxed))
    }

    /// Send the user turn.
    ///
    /// # Errors
    /// Returns error if write fails.
    pub async fn send_user_message(&self, prompt: &str) -> Result<(), ProtocolError> {
        self.send_json(&Outgoing::user(prompt)).await
    }

    /// Initialize the protocol.
    ///
    /// # Errors
    /// Returns error if write fails.
    pub async fn initialize(&self) -> Result<(), ProtocolError> {
        self.send_json(&Outgoing::ControlRequest {
            request_id: self.request_id(),
            request: ControlRequest::Initialize { hooks: None },
        })
        .await
    }

    /// Send interrupt request.
    ///
    /// # Errors
    /// Returns error if write fails.
    pub async fn interrupt(&self) -> Result<(), ProtocolError> {
        self.send_json(&Outgoing::ControlRequest {
            request_id: self.request_id(),
            request: ControlRequest::Interrupt {},
        })
        .await
    }

    /// Close the input pipe. Later writes fail with [`ProtocolError::InputClosed`].
    ///
    /// # Errors
    /// Returns error if the shutdown fails.
    pub async fn close(&self) -> Result<(), ProtocolError> {
        if let Some(mut stdin) = self.stdin.lock().await.take() {
            stdin.shutdown().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};

    use super::*;

    struct Harness {
        peer: ProtocolPeer,
        rx: mpsc::Receiver<Result<Message, RuntimeError>>,
        cli_out: tokio::io::DuplexStream,
        cli_in: tokio::io::Lines<BufReader<tokio::io::DuplexStream>>,
        reader: JoinHandle<()>,
    }

    fn harness() -> Harness {
        let (peer_stdin, cli_stdin) = duplex(4096);
        let (cli_stdout, peer_stdout) = duplex(4096);
        let (tx, rx) = mpsc::channel(16);
        let (peer, reader) = ProtocolPeer::spawn(peer_stdin, peer_stdout, tx);
        Harness {
            peer,
            rx,
            cli_out: cli_stdout,
            cli_in: BufReader::new(cli_stdin).lines(),
            reader,
        }
    }

    async fn next_written(h: &mut Harness) -> Value {
        let line = h.cli_in.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_relays_until_result_and_skips_garbage() {
        let mut h = harness();
        h.cli_out
            .write_all(
                concat!(
                    "{\"type\":\"system\",\"subtype\":\"init\"}\n",
                    "not json\n",
                    "\n",
                    "{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"4\"}]}}\n",
                    "{\"type\":\"result\",\"subtype\":\"success\",\"session_id\":\"s1\"}\n",
                    "{\"type\":\"assistant\",\"message\":{\"content\":[]}}\n",
                )
                .as_bytes(),
            )
            .await
            .unwrap();

        let kinds: Vec<&str> = [
            h.rx.recv().await.unwrap().unwrap(),
            h.rx.recv().await.unwrap().unwrap(),
            h.rx.recv().await.unwrap().unwrap(),
        ]
        .iter()
        .map(Message::kind)
        .collect();
        assert_eq!(kinds, vec!["system", "assistant", "result"]);

        h.reader.await.unwrap();
        assert!(h.rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_control_requests_are_declined() {
        let mut h = harness();
        h.cli_out
            .write_all(b"{\"type\":\"control_request\",\"request_id\":\"cli_1\",\"request\":{\"subtype\":\"can_use_tool\"}}\n")
            .await
            .unwrap();

        let written = next_written(&mut h).await;
        assert_eq!(written["type"], "control_response");
        assert_eq!(written["response"]["subtype"], "error");
        assert_eq!(written["response"]["request_id"], "cli_1");
    }

    #[tokio::test]
    async fn test_requests_written_in_order() {
        let mut h = harness();
        h.peer.initialize().await.unwrap();
        h.peer.send_user_message("2+2?").await.unwrap();
        h.peer.interrupt().await.unwrap();

        let init = next_written(&mut h).await;
        assert_eq!(init["request"]["subtype"], "initialize");
        let user = next_written(&mut h).await;
        assert_eq!(user["message"]["content"], "2+2?");
        let interrupt = next_written(&mut h).await;
        assert_eq!(interrupt["request"]["subtype"], "interrupt");
        assert_ne!(init["request_id"], interrupt["request_id"]);

        h.peer.close().await.unwrap();
        assert!(matches!(
            h.peer.interrupt().await,
            Err(ProtocolError::InputClosed)
        ));
    }

    #[tokio::test]
    async fn test_eof_before_result_is_an_error() {
        let mut h = harness();
        drop(h.cli_out);
        let err = h.rx.recv().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), "closed");
    }
}
