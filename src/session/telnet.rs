use super::*;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

const OPT_ECHO: u8 = 1;
const OPT_SUPPRESS_GO_AHEAD: u8 = 3;

static LOGIN_PROMPT: Lazy<Regex> =
    Lazy::new(|| match Regex::new(r"(?i)(login|username)\s*:\s*$") {
        Ok(re) => re,
        Err(err) => panic!("invalid LOGIN_PROMPT regex: {err}"),
    });

static PASSWORD_PROMPT: Lazy<Regex> = Lazy::new(|| match Regex::new(r"(?i)password\s*:\s*$") {
    Ok(re) => re,
    Err(err) => panic!("invalid PASSWORD_PROMPT regex: {err}"),
});

/// Splits a raw Telnet byte stream into shell data and negotiation replies.
///
/// Only suppress-go-ahead and remote echo are accepted; every other option is
/// refused. Sequences cut at a read boundary are carried into the next call.
#[derive(Debug, Default)]
struct TelnetDecoder {
    carry: Vec<u8>,
}

impl TelnetDecoder {
    fn decode(&mut self, input: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut raw = std::mem::take(&mut self.carry);
        raw.extend_from_slice(input);

        let mut data = Vec::with_capacity(raw.len());
        let mut replies = Vec::new();
        let mut i = 0;

        while i < raw.len() {
            if raw[i] != IAC {
                data.push(raw[i]);
                i += 1;
                continue;
            }
            let Some(&command) = raw.get(i + 1) else {
                break;
            };
            match command {
                IAC => {
                    data.push(IAC);
                    i += 2;
                }
                DO | DONT | WILL | WONT => {
                    let Some(&option) = raw.get(i + 2) else {
                        break;
                    };
                    replies.extend_from_slice(&Self::negotiate(command, option));
                    i += 3;
                }
                SB => {
                    let end = raw[i + 2..]
                        .windows(2)
                        .position(|w| w == [IAC, SE])
                        .map(|pos| i + 2 + pos + 2);
                    let Some(end) = end else {
                        break;
                    };
                    i = end;
                }
                _ => i += 2,
            }
        }

        if i < raw.len() {
            self.carry = raw[i..].to_vec();
        }
        (data, replies)
    }

    fn negotiate(command: u8, option: u8) -> Vec<u8> {
        match command {
            DO if option == OPT_SUPPRESS_GO_AHEAD => vec![IAC, WILL, option],
            DO => vec![IAC, WONT, option],
            WILL if option == OPT_ECHO || option == OPT_SUPPRESS_GO_AHEAD => {
                vec![IAC, DO, option]
            }
            WILL => vec![IAC, DONT, option],
            _ => Vec::new(),
        }
    }
}

/// Doubles every IAC byte so user data is never read as a command.
fn escape_iac(data: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(data.len());
    for &byte in data {
        if byte == IAC {
            escaped.push(IAC);
        }
        escaped.push(byte);
    }
    escaped
}

/// Interactive shell over plain Telnet with a username/password login dialog.
pub struct TelnetTransport {
    stream: Option<TcpStream>,
    decoder: TelnetDecoder,
    text_decoder: Utf8Decoder,
    /// Shell output that arrived together with the password prompt.
    pending: String,
    login_step: Duration,
}

impl Default for TelnetTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TelnetTransport {
    pub fn new() -> Self {
        Self {
            stream: None,
            decoder: TelnetDecoder::default(),
            text_decoder: Utf8Decoder::default(),
            pending: String::new(),
            login_step: Duration::from_secs(5),
        }
    }

    /// How long to wait for each login prompt.
    #[must_use]
    pub fn with_login_step(mut self, step: Duration) -> Self {
        self.login_step = step;
        self
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), ShellError> {
        let stream = self.stream.as_mut().ok_or(ShellError::NotConnectedError)?;
        stream
            .write_all(bytes)
            .await
            .map_err(|e| ShellError::TransportIoError(format!("telnet write failed: {e}")))?;
        stream
            .flush()
            .await
            .map_err(|e| ShellError::TransportIoError(format!("telnet flush failed: {e}")))
    }

    /// Reads one TCP segment, answers negotiation and returns the shell text.
    async fn read_segment(&mut self, idle: Duration) -> Result<ReadChunk, ShellError> {
        let stream = self.stream.as_mut().ok_or(ShellError::NotConnectedError)?;
        let mut buf = [0u8; 4096];
        let n = match tokio::time::timeout(idle, stream.read(&mut buf)).await {
            Err(_) => return Ok(ReadChunk::Idle),
            Ok(Ok(0)) => return Ok(ReadChunk::Closed),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                return Err(ShellError::TransportIoError(format!("telnet read failed: {e}")));
            }
        };

        let (data, replies) = self.decoder.decode(&buf[..n]);
        if !replies.is_empty() {
            trace!("Telnet negotiation reply {:?}", replies);
            self.write_raw(&replies).await?;
        }
        Ok(ReadChunk::Data(self.text_decoder.decode(&data)))
    }

    /// Reads until `prompt` matches the accumulated text. Returns the text
    /// after the match.
    async fn wait_for(&mut self, prompt: &Regex, what: &str) -> Result<String, ShellError> {
        let mut seen = String::new();
        loop {
            match self.read_segment(self.login_step).await? {
                ReadChunk::Data(text) => {
                    seen.push_str(&text);
                    let trimmed = seen.trim_end_matches(['\r', '\n']);
                    if let Some(found) = prompt.find(trimmed) {
                        return Ok(seen[found.end()..].to_string());
                    }
                }
                ReadChunk::Idle => {
                    return Err(ShellError::ConnectionError(format!(
                        "no {what} prompt from telnet server"
                    )));
                }
                ReadChunk::Closed => {
                    return Err(ShellError::ConnectionError(format!(
                        "telnet server closed the connection waiting for {what} prompt"
                    )));
                }
            }
        }
    }

    async fn login(&mut self, params: &SessionParameters) -> Result<(), ShellError> {
        self.wait_for(&LOGIN_PROMPT, "login").await?;
        self.write_raw(&escape_iac(format!("{}\r\n", params.username()).as_bytes()))
            .await?;
        let rest = self.wait_for(&PASSWORD_PROMPT, "password").await?;
        self.write_raw(&escape_iac(format!("{}\r\n", params.password()).as_bytes()))
            .await?;
        self.pending = rest;
        Ok(())
    }
}

#[async_trait]
impl Transport for TelnetTransport {
    async fn connect(&mut self, params: &SessionParameters) -> Result<(), ShellError> {
        let device_addr = params.device_addr();
        let stream = TcpStream::connect((params.host(), params.port()))
            .await
            .map_err(|e| ShellError::ConnectionError(format!("{}: {e}", device_addr)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| ShellError::TransportIoError(e.to_string()))?;
        debug!("{} TCP connection successful", device_addr);

        self.stream = Some(stream);
        self.decoder = TelnetDecoder::default();
        self.text_decoder = Utf8Decoder::default();
        self.pending.clear();

        self.login(params).await?;
        debug!("{} Telnet login sent", device_addr);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ShellError> {
        self.pending.clear();
        if let Some(mut stream) = self.stream.take()
            && let Err(e) = stream.shutdown().await
        {
            debug!("Telnet shutdown failed: {}", e);
        }
        Ok(())
    }

    async fn send(&mut self, data: &str) -> Result<(), ShellError> {
        self.write_raw(&escape_iac(data.as_bytes())).await
    }

    async fn read_available(&mut self, idle: Duration) -> Result<ReadChunk, ShellError> {
        if !self.pending.is_empty() {
            return Ok(ReadChunk::Data(std::mem::take(&mut self.pending)));
        }
        let deadline = Instant::now() + idle;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.read_segment(remaining).await? {
                // A segment that carried only negotiation does not count as output.
                ReadChunk::Data(text) if text.is_empty() => continue,
                chunk => return Ok(chunk),
            }
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Telnet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn decoder_strips_negotiation_and_answers_it() {
        let mut decoder = TelnetDecoder::default();
        let input = [
            IAC, DO, OPT_SUPPRESS_GO_AHEAD, b'o', b'k', IAC, WILL, OPT_ECHO, IAC, DO, 24,
        ];

        let (data, replies) = decoder.decode(&input);

        assert_eq!(data, b"ok");
        assert_eq!(
            replies,
            vec![
                IAC, WILL, OPT_SUPPRESS_GO_AHEAD, IAC, DO, OPT_ECHO, IAC, WONT, 24
            ]
        );
    }

    #[test]
    fn decoder_carries_split_sequences() {
        let mut decoder = TelnetDecoder::default();

        let (first, replies) = decoder.decode(&[b'a', IAC]);
        assert_eq!(first, b"a");
        assert!(replies.is_empty());

        let (second, _) = decoder.decode(&[IAC, b'b', IAC, SB, 24, 1]);
        assert_eq!(second, vec![IAC, b'b']);

        let (third, _) = decoder.decode(&[IAC, SE, b'c']);
        assert_eq!(third, b"c");
    }

    #[test]
    fn escape_doubles_iac() {
        assert_eq!(escape_iac(&[b'x', IAC, b'y']), vec![b'x', IAC, IAC, b'y']);
        assert_eq!(escape_iac(b"plain"), b"plain".to_vec());
    }

    #[tokio::test]
    async fn logs_in_and_reads_shell_output() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = [0u8; 64];
            socket
                .write_all(&[IAC, WILL, OPT_ECHO])
                .await
                .expect("write negotiation");
            socket.write_all(b"box login: ").await.expect("write login");
            let mut received = Vec::new();
            while !received.ends_with(b"root\r\n") {
                let n = socket.read(&mut buf).await.expect("read user");
                received.extend_from_slice(&buf[..n]);
            }
            socket.write_all(b"Password: ").await.expect("write password");
            let mut received = Vec::new();
            while !received.ends_with(b"secret\r\n") {
                let n = socket.read(&mut buf).await.expect("read password");
                received.extend_from_slice(&buf[..n]);
            }
            socket.write_all(b"\r\nbox# ").await.expect("write prompt");
            let n = socket.read(&mut buf).await.expect("read command");
            buf[..n].to_vec()
        });

        let params = SessionParameters::new("127.0.0.1", port, "root", "secret");
        let mut transport = TelnetTransport::new().with_login_step(Duration::from_secs(2));
        transport.connect(&params).await.expect("telnet login");

        let mut seen = String::new();
        while !seen.contains("box# ") {
            match transport
                .read_available(Duration::from_secs(2))
                .await
                .expect("read")
            {
                ReadChunk::Data(text) => seen.push_str(&text),
                other => panic!("unexpected read result: {other:?}"),
            }
        }

        transport.send("uptime\r").await.expect("send");
        let command = server.await.expect("server task");
        assert_eq!(command, b"uptime\r");
        transport.disconnect().await.expect("disconnect");
    }

    #[tokio::test]
    async fn character_split_across_segments_is_reassembled() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            socket.write_all(b"caf\xC3").await.expect("write head");
            tokio::time::sleep(Duration::from_millis(100)).await;
            socket.write_all(b"\xA9# ").await.expect("write tail");
            socket
        });

        let mut transport = TelnetTransport::new();
        transport.stream = Some(
            TcpStream::connect(("127.0.0.1", port))
                .await
                .expect("connect"),
        );

        let mut seen = String::new();
        while !seen.ends_with("# ") {
            match transport
                .read_available(Duration::from_secs(2))
                .await
                .expect("read")
            {
                ReadChunk::Data(text) => seen.push_str(&text),
                other => panic!("unexpected read result: {other:?}"),
            }
        }

        assert_eq!(seen, "café# ");
        drop(server.await.expect("server task"));
        transport.disconnect().await.expect("disconnect");
    }
}
