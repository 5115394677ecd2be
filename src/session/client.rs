use super::*;

/// The transport of one running batch.
///
/// Dropping it before [`BatchSession::close`] ran means the batch future was
/// cancelled; the session is then closed on a spawned task that still owns
/// the mutex guard, so the next batch cannot connect first.
struct BatchSession<T: Transport + 'static> {
    transport: Option<OwnedMutexGuard<T>>,
    device_addr: String,
    recorder: Option<BatchRecorder>,
}

impl<T: Transport + 'static> BatchSession<T> {
    fn transport(&mut self) -> Result<&mut T, ShellError> {
        self.transport
            .as_deref_mut()
            .ok_or(ShellError::NotConnectedError)
    }

    async fn close(&mut self) -> Result<(), ShellError> {
        debug!("{} Closing session", self.device_addr);
        let result = match self.transport.as_deref_mut() {
            Some(transport) => transport.disconnect().await,
            None => Ok(()),
        };
        self.transport = None;
        result
    }
}

impl<T: Transport + 'static> Drop for BatchSession<T> {
    fn drop(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };
        warn!(
            "{} Batch cancelled, closing session in the background",
            self.device_addr
        );
        let device_addr = std::mem::take(&mut self.device_addr);
        let recorder = self.recorder.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = transport.disconnect().await {
                        warn!("{} Failed to close cancelled session: {}", device_addr, e);
                    }
                    if let Some(recorder) = recorder {
                        let _ = recorder.record_event(BatchEvent::ConnectionClosed {
                            reason: "batch cancelled".to_string(),
                        });
                    }
                });
            }
            Err(_) => error!(
                "{} No runtime to close the cancelled session on",
                device_addr
            ),
        }
    }
}

impl<T: Transport + 'static> CliClient<T> {
    /// Builds a client for one device.
    ///
    /// The configuration is validated and the match rules compiled here, so a
    /// bad pattern is reported before any batch runs. Session parameters are
    /// checked at the start of every batch instead.
    pub fn new(
        params: SessionParameters,
        config: ClientConfig,
        transport: T,
    ) -> Result<Self, ShellError> {
        config.validate()?;
        let rules = MatchRules::from_config(&config)?;
        Ok(Self {
            params,
            config,
            rules,
            transport: Arc::new(Mutex::new(transport)),
            recorder: None,
        })
    }

    /// Records every batch into `recorder`.
    #[must_use]
    pub fn with_recorder(mut self, recorder: BatchRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn params(&self) -> &SessionParameters {
        &self.params
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn recorder(&self) -> Option<&BatchRecorder> {
        self.recorder.as_ref()
    }

    /// Runs `commands` in order over a fresh session and returns the output.
    ///
    /// The returned text is everything the shell produced from connect to the
    /// prompt after the last command, login banner and echoes included. On
    /// any failure after validation the transport is still closed exactly
    /// once and the first error is returned; partial output is discarded.
    pub async fn execute_command<S>(&self, commands: &[S]) -> Result<String, ShellError>
    where
        S: AsRef<str> + Sync,
    {
        if commands.is_empty() {
            return Err(ShellError::EmptyCommandsError);
        }
        if let Some(idx) = commands.iter().position(|c| c.as_ref().trim().is_empty()) {
            return Err(ShellError::BlankCommandError(idx));
        }
        let device_addr = self.params.device_addr();
        debug!("{} Validating session parameters", device_addr);
        self.params.validate()?;

        let transport = self.transport.clone().lock_owned().await;
        let started = Instant::now();
        info!(
            "{} Starting batch of {} commands over {}",
            device_addr,
            commands.len(),
            transport.kind()
        );
        let mut session = BatchSession {
            transport: Some(transport),
            device_addr: device_addr.clone(),
            recorder: self.recorder.clone(),
        };

        let mut output = OutputAccumulator::new();
        let result = match session.transport() {
            Ok(transport) => self.run_batch(transport, commands, &mut output).await,
            Err(e) => Err(e),
        };

        if let Err(e) = session.close().await {
            warn!("{} Failed to close session: {}", device_addr, e);
        }
        drop(session);

        let reason = match &result {
            Ok(()) => "batch complete".to_string(),
            Err(e) => format!("batch failed: {e}"),
        };
        self.record(BatchEvent::ConnectionClosed { reason });
        self.record(BatchEvent::BatchFinished {
            success: result.is_ok(),
            commands: commands.len(),
            output_len: output.len(),
            error: result.as_ref().err().map(|e| e.to_string()),
        });

        match result {
            Ok(()) => {
                info!(
                    "{} Batch finished in {:?}, {} bytes of output",
                    device_addr,
                    started.elapsed(),
                    output.len()
                );
                Ok(output.into_string())
            }
            Err(e) => {
                error!("{} Batch failed after {:?}: {}", device_addr, started.elapsed(), e);
                if !output.is_empty() {
                    debug!("{} Discarding {} bytes of partial output", device_addr, output.len());
                }
                Err(e)
            }
        }
    }

    /// Loads a script with this client's comment and placeholder markers and
    /// runs it as one batch.
    pub async fn execute_shell_script(
        &self,
        path: impl AsRef<Path>,
        substitutions: &HashMap<String, String>,
    ) -> Result<String, ShellError> {
        let path = path.as_ref();
        let commands = load_script(path, substitutions, &ScriptSyntax::from(&self.config))?;
        debug!("Running script {:?} with {} commands", path, commands.len());
        self.execute_command(commands.as_slice()).await
    }

    async fn run_batch<S>(
        &self,
        transport: &mut T,
        commands: &[S],
        output: &mut OutputAccumulator,
    ) -> Result<(), ShellError>
    where
        S: AsRef<str> + Sync,
    {
        let device_addr = self.params.device_addr();
        debug!("{} Connecting over {}", device_addr, transport.kind());
        match tokio::time::timeout(self.config.connect_timeout(), transport.connect(&self.params))
            .await
        {
            Ok(result) => result?,
            Err(_) => return Err(ShellError::ConnectTimeout(self.config.connect_timeout_ms)),
        }
        debug!("{} Session established", device_addr);
        self.record(BatchEvent::ConnectionEstablished {
            device_addr: device_addr.clone(),
            transport: transport.kind(),
        });

        let mut automaton = PromptAutomaton::new(&self.rules, self.config.max_pass())
            .with_recorder(self.recorder.as_ref());

        let mut previous: Option<&str> = None;
        for (index, command) in commands.iter().enumerate() {
            let command = command.as_ref();
            let text = self
                .synchronize(transport, &mut automaton, output, index, command)
                .await?;
            if let Some(previous) = previous {
                self.check_device_error(previous, &text)?;
            }

            debug!("{} Sending command[{}] {:?}", device_addr, index, command);
            transport
                .send(&format!("{}{}", command, self.config.line_ending))
                .await?;
            self.record(BatchEvent::CommandSent {
                index,
                command: command.to_string(),
            });
            previous = Some(command);
        }

        let outcome = automaton.run_pass(transport, output).await?;
        self.record(BatchEvent::PassFinished {
            before_command: None,
            outcome: outcome.label().to_string(),
        });
        match outcome {
            MatchOutcome::Matched(text) => {
                if let Some(previous) = previous {
                    self.check_device_error(previous, &text)?;
                }
            }
            other => return Err(ShellError::FinalPassError(other)),
        }

        output.append(&automaton.take_pending());
        Ok(())
    }

    /// Drains output until the shell shows a prompt, within the retry policy.
    ///
    /// Returns the text of the pass that matched. A closed stream is not
    /// retried.
    async fn synchronize(
        &self,
        transport: &mut T,
        automaton: &mut PromptAutomaton<'_>,
        output: &mut OutputAccumulator,
        index: usize,
        command: &str,
    ) -> Result<String, ShellError> {
        let policy = self.config.retry;
        let mut last = MatchOutcome::TimedOut;

        for attempt in 1..=policy.attempts {
            let outcome = automaton.run_pass(transport, output).await?;
            self.record(BatchEvent::PassFinished {
                before_command: Some(index),
                outcome: outcome.label().to_string(),
            });

            match outcome {
                MatchOutcome::Matched(text) => return Ok(text),
                MatchOutcome::StreamEnded => {
                    last = MatchOutcome::StreamEnded;
                    break;
                }
                MatchOutcome::TimedOut => {
                    debug!(
                        "{} No prompt before command[{}] (attempt {}/{})",
                        self.params.device_addr(),
                        index,
                        attempt,
                        policy.attempts
                    );
                    last = MatchOutcome::TimedOut;
                    if policy.nudge && attempt < policy.attempts {
                        transport.send(&self.config.line_ending).await?;
                        self.record(BatchEvent::CommandSent {
                            index,
                            command: String::new(),
                        });
                    }
                }
            }
        }

        Err(ShellError::SyncError {
            index,
            command: command.to_string(),
            outcome: last,
        })
    }

    fn check_device_error(&self, command: &str, text: &str) -> Result<(), ShellError> {
        match self.rules.find_error(text) {
            Some(line) => Err(ShellError::DeviceError {
                command: command.to_string(),
                line: line.trim().to_string(),
            }),
            None => Ok(()),
        }
    }

    fn record(&self, event: BatchEvent) {
        if let Some(recorder) = self.recorder.as_ref() {
            let _ = recorder.record_event(event);
        }
    }
}
