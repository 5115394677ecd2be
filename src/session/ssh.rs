use super::*;

/// Interactive shell over SSH with password authentication.
///
/// `connect` opens the TCP session, authenticates, requests a PTY and a
/// shell, then spawns an I/O task that bridges the russh channel to a pair of
/// tokio channels. Output arrives as UTF-8 text chunks.
pub struct SshTransport {
    security_options: ConnectionSecurityOptions,
    inactivity_timeout: Duration,
    session: Option<SshSession>,
}

struct SshSession {
    client: Client,
    sender: Sender<String>,
    recv: Receiver<String>,
    device_addr: String,
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new(ConnectionSecurityOptions::default())
    }
}

impl SshTransport {
    pub fn new(security_options: ConnectionSecurityOptions) -> Self {
        Self {
            security_options,
            inactivity_timeout: Duration::from_secs(60),
            session: None,
        }
    }

    /// Overrides how long an idle SSH connection is kept open by russh.
    #[must_use]
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    /// Checks if the underlying SSH connection is still active.
    pub fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| !s.client.is_closed())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn connect(&mut self, params: &SessionParameters) -> Result<(), ShellError> {
        let device_addr = params.device_addr();

        let config = Config {
            preferred: self.security_options.preferred(),
            inactivity_timeout: Some(self.inactivity_timeout),
            ..Default::default()
        };

        let client = Client::connect_with_config(
            (params.host().to_string(), params.port()),
            params.username(),
            AuthMethod::with_password(params.password()),
            self.security_options.server_check.clone(),
            config,
        )
        .await?;
        debug!("{} TCP connection successful", device_addr);

        let mut channel = client.get_channel().await?;
        channel
            .request_pty(false, "xterm", 800, 600, 0, 0, &[])
            .await?;
        channel.request_shell(false).await?;
        debug!("{} Shell request successful", device_addr);

        let (sender_to_shell, mut receiver_from_user) = mpsc::channel::<String>(256);
        let (sender_to_user, receiver_from_shell) = mpsc::channel::<String>(256);

        let io_task_device_addr = device_addr.clone();
        tokio::spawn(async move {
            let mut text_decoder = Utf8Decoder::default();
            loop {
                tokio::select! {
                    data = receiver_from_user.recv() => {
                        let Some(data) = data else {
                            debug!("{} Input sender dropped. Closing task.", io_task_device_addr);
                            let _ = channel.eof().await;
                            break;
                        };
                        if let Err(e) = channel.data(data.as_bytes()).await {
                            debug!("{} Failed to send data to shell: {:?}", io_task_device_addr, e);
                            break;
                        }
                    },
                    msg = channel.wait() => {
                        match msg {
                            Some(ChannelMsg::Data { ref data }) => {
                                let text = text_decoder.decode(data);
                                if text.is_empty() {
                                    continue;
                                }
                                if sender_to_user.send(text).await.is_err() {
                                    debug!("{} Shell output receiver dropped. Closing task.", io_task_device_addr);
                                    break;
                                }
                            }
                            Some(ChannelMsg::ExitStatus { exit_status }) => {
                                debug!("{} Shell exited with status code: {}", io_task_device_addr, exit_status);
                                let _ = channel.eof().await;
                                break;
                            }
                            Some(ChannelMsg::Eof) | None => {
                                debug!("{} Shell sent EOF.", io_task_device_addr);
                                break;
                            }
                            Some(_) => {}
                        }
                    }
                }
            }
            debug!("{} SSH I/O task ended.", io_task_device_addr);
        });

        self.session = Some(SshSession {
            client,
            sender: sender_to_shell,
            recv: receiver_from_shell,
            device_addr,
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ShellError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        debug!("{} Closing SSH connection...", session.device_addr);

        // Stop receiving first so the I/O task cannot block on a full channel.
        session.recv.close();
        drop(session.sender);

        if !session.client.is_closed() {
            session.client.disconnect().await?;
        }
        debug!("{} SSH connection closed", session.device_addr);
        Ok(())
    }

    async fn send(&mut self, data: &str) -> Result<(), ShellError> {
        if !self.is_connected() {
            return Err(ShellError::NotConnectedError);
        }
        let session = self.session.as_mut().ok_or(ShellError::NotConnectedError)?;
        session
            .sender
            .send(data.to_string())
            .await
            .map_err(|e| ShellError::TransportIoError(format!("ssh send failed: {e}")))
    }

    async fn read_available(&mut self, idle: Duration) -> Result<ReadChunk, ShellError> {
        let session = self.session.as_mut().ok_or(ShellError::NotConnectedError)?;
        Ok(transport::recv_with_idle(&mut session.recv, idle).await)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Ssh
    }
}
