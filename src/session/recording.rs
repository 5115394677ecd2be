use super::*;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Batch recording granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub enum BatchRecordLevel {
    /// Disable recording.
    Off,
    /// Record lifecycle events only.
    KeyEventsOnly,
    /// Record lifecycle events and every raw output chunk.
    #[default]
    Full,
}

/// A single recorded batch event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BatchRecordEntry {
    pub ts_ms: u128,
    pub event: BatchEvent,
}

/// Events a batch can record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchEvent {
    ConnectionEstablished {
        device_addr: String,
        transport: TransportKind,
    },
    /// Output exactly as the transport delivered it.
    RawChunk { data: String },
    /// Something was written to the shell. Nudges carry an empty command.
    CommandSent { index: usize, command: String },
    /// A pass ended; `before_command` is `None` for the final pass.
    PassFinished {
        before_command: Option<usize>,
        outcome: String,
    },
    BatchFinished {
        success: bool,
        commands: usize,
        output_len: usize,
        #[serde(default)]
        error: Option<String>,
    },
    ConnectionClosed { reason: String },
}

/// In-memory batch recorder.
///
/// Clones share the same entry list, so a recorder handed to a client can be
/// inspected by the caller afterwards.
#[derive(Debug, Clone)]
pub struct BatchRecorder {
    level: BatchRecordLevel,
    entries: Arc<std::sync::Mutex<Vec<BatchRecordEntry>>>,
}

impl BatchRecorder {
    pub fn new(level: BatchRecordLevel) -> Self {
        Self {
            level,
            entries: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn level(&self) -> BatchRecordLevel {
        self.level
    }

    /// Record a lifecycle event.
    pub fn record_event(&self, event: BatchEvent) -> Result<(), ShellError> {
        if self.level == BatchRecordLevel::Off {
            return Ok(());
        }
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| ShellError::RecordingError(format!("record lock error: {e}")))?;
        guard.push(BatchRecordEntry {
            ts_ms: now_ms(),
            event,
        });
        Ok(())
    }

    /// Record raw shell output when the level is `Full`.
    pub fn record_raw_chunk(&self, data: String) -> Result<(), ShellError> {
        if self.level != BatchRecordLevel::Full {
            return Ok(());
        }
        self.record_event(BatchEvent::RawChunk { data })
    }

    /// Snapshot all records.
    pub fn entries(&self) -> Result<Vec<BatchRecordEntry>, ShellError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| ShellError::RecordingError(format!("record lock error: {e}")))?;
        Ok(guard.clone())
    }

    pub fn clear(&self) -> Result<(), ShellError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| ShellError::RecordingError(format!("record lock error: {e}")))?;
        guard.clear();
        Ok(())
    }

    /// Export records as JSONL, one entry per line.
    pub fn to_jsonl(&self) -> Result<String, ShellError> {
        self.entries()?
            .iter()
            .map(|entry| {
                serde_json::to_string(entry)
                    .map_err(|e| ShellError::RecordingError(format!("record encode error: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|lines| lines.join("\n"))
    }

    /// Restore a recorder from JSONL. Blank lines are skipped.
    pub fn from_jsonl(jsonl: &str) -> Result<Self, ShellError> {
        let parsed = jsonl
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(idx, line)| {
                serde_json::from_str::<BatchRecordEntry>(line).map_err(|e| {
                    ShellError::RecordingError(format!("record decode error on line {}: {e}", idx + 1))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            level: BatchRecordLevel::Full,
            entries: Arc::new(std::sync::Mutex::new(parsed)),
        })
    }
}

impl Default for BatchRecorder {
    fn default() -> Self {
        Self::new(BatchRecordLevel::Full)
    }
}

/// Offline transport that plays back a `Full` recording.
///
/// Output recorded before the first send is delivered after `connect`; the
/// output recorded after the n-th send is delivered after the n-th call to
/// `send`. Each send must carry the command that was recorded at that point,
/// so a replay fails loudly when the batch diverges from the recording.
#[derive(Debug, Clone)]
pub struct ReplayTransport {
    connect_output: VecDeque<ReadChunk>,
    exchanges: VecDeque<(String, VecDeque<ReadChunk>)>,
    current: VecDeque<ReadChunk>,
    connected: bool,
}

impl ReplayTransport {
    pub fn from_recorder(recorder: &BatchRecorder) -> Result<Self, ShellError> {
        let mut connect_output = VecDeque::new();
        let mut exchanges: VecDeque<(String, VecDeque<ReadChunk>)> = VecDeque::new();

        for entry in recorder.entries()? {
            let chunk = match entry.event {
                BatchEvent::CommandSent { command, .. } => {
                    exchanges.push_back((command, VecDeque::new()));
                    continue;
                }
                BatchEvent::RawChunk { data } => ReadChunk::Data(data),
                BatchEvent::PassFinished { ref outcome, .. } if outcome == "stream_ended" => {
                    ReadChunk::Closed
                }
                _ => continue,
            };
            match exchanges.back_mut() {
                Some((_, output)) => output.push_back(chunk),
                None => connect_output.push_back(chunk),
            }
        }

        Ok(Self {
            connect_output,
            exchanges,
            current: VecDeque::new(),
            connected: false,
        })
    }

    pub fn from_jsonl(jsonl: &str) -> Result<Self, ShellError> {
        Self::from_recorder(&BatchRecorder::from_jsonl(jsonl)?)
    }

    /// Sends the recording still expects.
    pub fn remaining_sends(&self) -> usize {
        self.exchanges.len()
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    async fn connect(&mut self, _params: &SessionParameters) -> Result<(), ShellError> {
        self.current = std::mem::take(&mut self.connect_output);
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ShellError> {
        self.connected = false;
        self.current.clear();
        Ok(())
    }

    async fn send(&mut self, data: &str) -> Result<(), ShellError> {
        if !self.connected {
            return Err(ShellError::NotConnectedError);
        }
        let Some((expected, output)) = self.exchanges.pop_front() else {
            return Err(ShellError::RecordingError(format!(
                "unexpected send {data:?}: recording has no more commands"
            )));
        };
        let sent = data.trim_end_matches(['\r', '\n']);
        if sent != expected {
            return Err(ShellError::RecordingError(format!(
                "send mismatch: recorded {expected:?}, got {sent:?}"
            )));
        }
        self.current.extend(output);
        Ok(())
    }

    async fn read_available(&mut self, _idle: Duration) -> Result<ReadChunk, ShellError> {
        if !self.connected {
            return Err(ShellError::NotConnectedError);
        }
        Ok(self.current.pop_front().unwrap_or(ReadChunk::Idle))
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Replay
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
