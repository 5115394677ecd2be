use super::*;

/// Transport family, used in logs and recordings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Ssh,
    Telnet,
    Replay,
    /// Any transport supplied outside this crate.
    Custom,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ssh => write!(f, "ssh"),
            Self::Telnet => write!(f, "telnet"),
            Self::Replay => write!(f, "replay"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// Result of waiting for output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadChunk {
    /// Text that arrived from the shell.
    Data(String),
    /// Nothing arrived within the idle window.
    Idle,
    /// The remote side closed the stream.
    Closed,
}

/// Bidirectional character stream to a remote interactive shell.
///
/// Session sequencing lives in [`CliClient`]; implementations only open the
/// stream, move bytes, and close it. `disconnect` must be safe to call on a
/// transport whose `connect` failed or never ran.
#[async_trait]
pub trait Transport: Send {
    /// Opens and authenticates the session and starts an interactive shell.
    async fn connect(&mut self, params: &SessionParameters) -> Result<(), ShellError>;

    /// Releases every resource held by the session.
    async fn disconnect(&mut self) -> Result<(), ShellError>;

    /// Writes `data` to the shell.
    async fn send(&mut self, data: &str) -> Result<(), ShellError>;

    /// Waits up to `idle` for the next piece of output.
    async fn read_available(&mut self, idle: Duration) -> Result<ReadChunk, ShellError>;

    fn kind(&self) -> TransportKind {
        TransportKind::Custom
    }
}

/// Waits on an mpsc receiver fed by a background I/O task.
pub(super) async fn recv_with_idle(
    recv: &mut Receiver<String>,
    idle: Duration,
) -> ReadChunk {
    match tokio::time::timeout(idle, recv.recv()).await {
        Ok(Some(data)) => ReadChunk::Data(data),
        Ok(None) => ReadChunk::Closed,
        Err(_) => ReadChunk::Idle,
    }
}

/// Turns a byte stream into text without splitting multi-byte characters.
///
/// An incomplete sequence at the end of a chunk is held back until the next
/// chunk; bytes that can never form a character become U+FFFD.
#[derive(Debug, Default)]
pub(super) struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    pub(super) fn decode(&mut self, input: &[u8]) -> String {
        let mut raw = std::mem::take(&mut self.carry);
        raw.extend_from_slice(input);

        let mut text = String::with_capacity(raw.len());
        let mut rest = raw.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, invalid) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &invalid[len..];
                        }
                        None => {
                            self.carry = invalid.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_character_is_held_until_complete() {
        let mut decoder = Utf8Decoder::default();

        assert_eq!(decoder.decode(b"caf\xC3"), "caf");
        assert_eq!(decoder.decode(b"\xA9# "), "\u{e9}# ");
    }

    #[test]
    fn four_byte_character_survives_three_reads() {
        let mut decoder = Utf8Decoder::default();
        let crab = "\u{1F980}".as_bytes();

        let mut text = decoder.decode(&crab[..1]);
        text.push_str(&decoder.decode(&crab[1..3]));
        text.push_str(&decoder.decode(&crab[3..]));

        assert_eq!(text, "\u{1F980}");
    }

    #[test]
    fn invalid_bytes_are_replaced_and_decoding_continues() {
        let mut decoder = Utf8Decoder::default();

        assert_eq!(decoder.decode(b"a\xFFb\xC3"), "a\u{FFFD}b");
        assert_eq!(decoder.decode(b"\xA9"), "\u{e9}");
    }
}
