//! Scripted in-process runtime for tests.

use std::{
    io,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::StreamExt;
use relay_core::{AgentConnection, AgentRuntime, Message, MessageStream, RuntimeError, RuntimeOptions};
use tokio::sync::Notify;

/// One step of a scripted message stream.
#[derive(Debug)]
pub enum Step {
    /// Emit a message.
    Message(Message),
    /// Emit an error and end the stream.
    Fail(RuntimeError),
    /// Sleep before the next step.
    Sleep(Duration),
    /// Never make progress again.
    Pending,
    /// Block until the connection is interrupted.
    UntilInterrupted,
}

impl Clone for Step {
    fn clone(&self) -> Self {
        match self {
            Self::Message(m) => Self::Message(m.clone()),
            Self::Fail(e) => Self::Fail(clone_error(e)),
            Self::Sleep(d) => Self::Sleep(*d),
            Self::Pending => Self::Pending,
            Self::UntilInterrupted => Self::UntilInterrupted,
        }
    }
}

fn clone_error(err: &RuntimeError) -> RuntimeError {
    match err {
        RuntimeError::SpawnFailed(s) => RuntimeError::SpawnFailed(s.clone()),
        RuntimeError::ExecutableNotFound(s) => RuntimeError::ExecutableNotFound(s.clone()),
        RuntimeError::Io(e) => RuntimeError::Io(io::Error::new(e.kind(), e.to_string())),
        RuntimeError::Protocol(s) => RuntimeError::Protocol(s.clone()),
        RuntimeError::NotConnected => RuntimeError::NotConnected,
        RuntimeError::StreamTaken => RuntimeError::StreamTaken,
        RuntimeError::Closed(s) => RuntimeError::Closed(s.clone()),
    }
}

#[derive(Default)]
struct Shared {
    options: Mutex<Vec<RuntimeOptions>>,
    submitted: Mutex<Vec<String>>,
    interrupts: AtomicUsize,
    disconnected: AtomicBool,
    dropped: AtomicBool,
    blocked: Notify,
}

/// An [`AgentRuntime`] replaying fixed scripts.
///
/// Each connection takes the next queued script; the last one is reused.
pub struct ScriptedRuntime {
    scripts: Mutex<Vec<Vec<Step>>>,
    fail_connect: bool,
    fail_submit: bool,
    shared: Arc<Shared>,
}

impl ScriptedRuntime {
    #[must_use]
    pub fn new(steps: Vec<Step>) -> Self {
        Self::with_scripts(vec![steps])
    }

    /// One script per connection, in order.
    #[must_use]
    pub fn with_scripts(scripts: Vec<Vec<Step>>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            fail_connect: false,
            fail_submit: false,
            shared: Arc::default(),
        }
    }

    /// Make `connect` fail with [`RuntimeError::SpawnFailed`].
    #[must_use]
    pub const fn fail_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Make `submit` fail with [`RuntimeError::Closed`].
    #[must_use]
    pub const fn fail_submit(mut self) -> Self {
        self.fail_submit = true;
        self
    }

    /// Options of the most recent connection.
    #[must_use]
    pub fn last_options(&self) -> Option<RuntimeOptions> {
        lock(&self.shared.options).last().cloned()
    }

    /// Prompts submitted so far, across connections.
    #[must_use]
    pub fn submitted(&self) -> Vec<String> {
        lock(&self.shared.submitted).clone()
    }

    /// Number of interrupts delivered.
    #[must_use]
    pub fn interrupts(&self) -> usize {
        self.shared.interrupts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn disconnected(&self) -> bool {
        self.shared.disconnected.load(Ordering::SeqCst)
    }

    /// Whether a connection has been dropped.
    #[must_use]
    pub fn dropped(&self) -> bool {
        self.shared.dropped.load(Ordering::SeqCst)
    }

    /// Resolves once a stream reaches [`Step::UntilInterrupted`].
    pub async fn wait_until_streaming(&self) {
        self.shared.blocked.notified().await;
    }

    fn next_script(&self) -> Vec<Step> {
        let mut scripts = lock(&self.scripts);
        if scripts.len() > 1 {
            scripts.remove(0)
        } else {
            scripts.first().cloned().unwrap_or_default()
        }
    }
}

impl AgentRuntime for ScriptedRuntime {
    fn connection(&self, options: RuntimeOptions) -> Box<dyn AgentConnection> {
        lock(&self.shared.options).push(options);
        Box::new(ScriptedConnection {
            steps: Some(self.next_script()),
            fail_connect: self.fail_connect,
            fail_submit: self.fail_submit,
            connected: false,
            interrupted: Arc::new(Notify::new()),
            shared: Arc::clone(&self.shared),
        })
    }
}

struct ScriptedConnection {
    steps: Option<Vec<Step>>,
    fail_connect: bool,
    fail_submit: bool,
    connected: bool,
    interrupted: Arc<Notify>,
    shared: Arc<Shared>,
}

#[async_trait]
impl AgentConnection for ScriptedConnection {
    async fn connect(&mut self) -> Result<(), RuntimeError> {
        if self.fail_connect {
            return Err(RuntimeError::SpawnFailed("scripted connect failure".into()));
        }
        self.connected = true;
        Ok(())
    }

    async fn submit(&self, prompt: &str) -> Result<(), RuntimeError> {
        if !self.connected {
            return Err(RuntimeError::NotConnected);
        }
        if self.fail_submit {
            return Err(RuntimeError::Closed("scripted submit failure".into()));
        }
        lock(&self.shared.submitted).push(prompt.to_string());
        Ok(())
    }

    fn receive_messages(&mut self) -> Result<MessageStream, RuntimeError> {
        if !self.connected {
            return Err(RuntimeError::NotConnected);
        }
        let steps = self.steps.take().ok_or(RuntimeError::StreamTaken)?;
        let interrupted = Arc::clone(&self.interrupted);
        let shared = Arc::clone(&self.shared);

        Ok(async_stream::stream! {
            for step in steps {
                match step {
                    Step::Message(message) => yield Ok(message),
                    Step::Fail(err) => {
                        yield Err(err);
                        return;
                    }
                    Step::Sleep(duration) => tokio::time::sleep(duration).await,
                    Step::Pending => std::future::pending::<()>().await,
                    Step::UntilInterrupted => {
                        shared.blocked.notify_one();
                        interrupted.notified().await;
                    }
                }
            }
        }
        .boxed())
    }

    async fn interrupt(&self) -> Result<(), RuntimeError> {
        if !self.connected {
            return Err(RuntimeError::NotConnected);
        }
        self.shared.interrupts.fetch_add(1, Ordering::SeqCst);
        self.interrupted.notify_one();
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), RuntimeError> {
        self.connected = false;
        self.shared.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        self.shared.dropped.store(true, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
