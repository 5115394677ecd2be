use super::*;

/// How one automaton pass ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum MatchOutcome {
    /// At least one prompt rule fired; carries the text collected in this pass.
    Matched(String),
    /// The idle window (or the pass ceiling) elapsed without a prompt.
    TimedOut,
    /// The remote side closed the stream.
    StreamEnded,
}

impl MatchOutcome {
    /// Short name used in logs and recordings.
    pub fn label(&self) -> &'static str {
        match self {
            MatchOutcome::Matched(_) => "matched",
            MatchOutcome::TimedOut => "timed_out",
            MatchOutcome::StreamEnded => "stream_ended",
        }
    }
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchOutcome::Matched(text) => write!(f, "matched {} bytes", text.len()),
            MatchOutcome::TimedOut => write!(f, "timed out waiting for prompt"),
            MatchOutcome::StreamEnded => write!(f, "stream ended"),
        }
    }
}

/// Append-only output buffer for exactly one batch.
#[derive(Debug, Default)]
pub struct OutputAccumulator {
    buffer: String,
}

impl OutputAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn into_string(self) -> String {
        self.buffer
    }
}

/// Reads shell output and classifies it against a [`MatchRules`] set.
///
/// One automaton lives for one batch. Text that arrived after the last prompt
/// of a pass stays pending and is examined first by the next pass.
pub struct PromptAutomaton<'a> {
    rules: &'a MatchRules,
    max_pass: Duration,
    pending: String,
    recorder: Option<&'a BatchRecorder>,
}

impl<'a> PromptAutomaton<'a> {
    pub fn new(rules: &'a MatchRules, max_pass: Duration) -> Self {
        Self {
            rules,
            max_pass,
            pending: String::new(),
            recorder: None,
        }
    }

    /// Records every chunk read into `recorder`.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Option<&'a BatchRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Output received but not yet claimed by a prompt match.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Removes and returns the pending tail.
    pub fn take_pending(&mut self) -> String {
        std::mem::take(&mut self.pending)
    }

    /// Runs one pass: reads until the timeout or end-of-stream rule fires, or
    /// until a prompt rule with [`MatchAction::Finish`] matches.
    ///
    /// Text up to and including each prompt match is appended to `output`.
    /// A pass that matched at least one prompt and then went idle is
    /// `Matched`; a closed stream is always `StreamEnded`.
    pub async fn run_pass<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        output: &mut OutputAccumulator,
    ) -> Result<MatchOutcome, ShellError> {
        let started = Instant::now();
        let idle = self.rules.idle_timeout();
        let mut matched = String::new();
        let mut prompt_seen = false;

        loop {
            while let Some(hit) = self.rules.find_prompt(&self.pending) {
                let text = self.pending.drain(..hit.end).collect::<String>();
                output.append(&text);
                matched.push_str(&text);
                prompt_seen = true;
                if hit.action == MatchAction::Finish {
                    trace!("Prompt rule {} finished the pass", hit.rule);
                    return Ok(MatchOutcome::Matched(matched));
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= self.max_pass {
                debug!("Pass ceiling of {:?} reached", self.max_pass);
                break;
            }
            let wait = idle.min(self.max_pass - elapsed);

            match transport.read_available(wait).await? {
                ReadChunk::Data(data) => {
                    trace!("{:?}", data);
                    if let Some(recorder) = self.recorder {
                        let _ = recorder.record_raw_chunk(data.clone());
                    }
                    self.pending.push_str(&data);
                }
                ReadChunk::Idle => {
                    trace!("Timeout rule fired after {:?} idle", wait);
                    break;
                }
                ReadChunk::Closed => {
                    trace!("End-of-stream rule fired");
                    return Ok(MatchOutcome::StreamEnded);
                }
            }
        }

        if prompt_seen {
            Ok(MatchOutcome::Matched(matched))
        } else {
            Ok(MatchOutcome::TimedOut)
        }
    }
}
