#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use netshell::config::ClientConfig;
use netshell::error::ShellError;
use netshell::session::{ReadChunk, SessionParameters, Transport};

/// One call observed by a [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Send(String),
    Disconnect,
}

/// Shared log of transport calls with the instant each happened.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<(Call, Instant)>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0
            .lock()
            .expect("call log lock")
            .push((call, Instant::now()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0
            .lock()
            .expect("call log lock")
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    pub fn timed(&self) -> Vec<(Call, Instant)> {
        self.0.lock().expect("call log lock").clone()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.calls().iter().filter(|call| *call == wanted).count()
    }

    pub fn connects(&self) -> usize {
        self.count(&Call::Connect)
    }

    pub fn disconnects(&self) -> usize {
        self.count(&Call::Disconnect)
    }
}

/// How the scripted device answers.
#[derive(Debug, Clone)]
pub struct DeviceBehavior {
    /// Output queued when the session opens.
    pub banner: Option<String>,
    /// Echo each command followed by this prompt; `None` stays silent.
    pub prompt: Option<String>,
    /// Reply to a bare line ending (a nudge).
    pub nudge_reply: Option<String>,
    /// Close the stream after this many sends.
    pub close_after_sends: Option<usize>,
    pub connect_error: Option<String>,
    pub connect_delay: Duration,
    pub send_delay: Duration,
    pub disconnect_error: bool,
}

impl Default for DeviceBehavior {
    fn default() -> Self {
        Self {
            banner: Some("host# ".to_string()),
            prompt: Some("host# ".to_string()),
            nudge_reply: None,
            close_after_sends: None,
            connect_error: None,
            connect_delay: Duration::ZERO,
            send_delay: Duration::ZERO,
            disconnect_error: false,
        }
    }
}

/// In-memory transport playing a [`DeviceBehavior`]. An empty queue reads as
/// idle immediately, so timeout paths run without real waiting.
pub struct ScriptedTransport {
    behavior: DeviceBehavior,
    log: CallLog,
    queue: VecDeque<ReadChunk>,
    sends: usize,
}

impl ScriptedTransport {
    pub fn new(behavior: DeviceBehavior) -> (Self, CallLog) {
        let log = CallLog::default();
        let transport = Self {
            behavior,
            log: log.clone(),
            queue: VecDeque::new(),
            sends: 0,
        };
        (transport, log)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&mut self, _params: &SessionParameters) -> Result<(), ShellError> {
        self.log.push(Call::Connect);
        if !self.behavior.connect_delay.is_zero() {
            tokio::time::sleep(self.behavior.connect_delay).await;
        }
        if let Some(reason) = self.behavior.connect_error.clone() {
            return Err(ShellError::ConnectionError(reason));
        }
        self.sends = 0;
        if let Some(banner) = self.behavior.banner.clone() {
            self.queue.push_back(ReadChunk::Data(banner));
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ShellError> {
        self.log.push(Call::Disconnect);
        self.queue.clear();
        if self.behavior.disconnect_error {
            return Err(ShellError::TransportIoError("socket already gone".to_string()));
        }
        Ok(())
    }

    async fn send(&mut self, data: &str) -> Result<(), ShellError> {
        self.log.push(Call::Send(data.to_string()));
        if !self.behavior.send_delay.is_zero() {
            tokio::time::sleep(self.behavior.send_delay).await;
        }
        self.sends += 1;

        let echo = data.trim_end_matches('\r');
        if echo.is_empty() {
            if let Some(reply) = self.behavior.nudge_reply.clone() {
                self.queue.push_back(ReadChunk::Data(reply));
            }
        } else if let Some(prompt) = self.behavior.prompt.as_ref() {
            self.queue
                .push_back(ReadChunk::Data(format!("{echo}\n{prompt}")));
        }

        if self.behavior.close_after_sends == Some(self.sends) {
            self.queue.push_back(ReadChunk::Closed);
        }
        Ok(())
    }

    async fn read_available(&mut self, _idle: Duration) -> Result<ReadChunk, ShellError> {
        Ok(self.queue.pop_front().unwrap_or(ReadChunk::Idle))
    }
}

pub fn params() -> SessionParameters {
    SessionParameters::new("10.0.0.1", 22, "root", "secret")
}

pub fn config() -> ClientConfig {
    ClientConfig {
        prompt_patterns: vec![r"host# ".to_string()],
        pass_timeout_ms: 20,
        max_pass_ms: 1_000,
        connect_timeout_ms: 500,
        ..ClientConfig::default()
    }
}
