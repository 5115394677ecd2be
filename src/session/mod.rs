//! Remote shell sessions and batch command execution.
//!
//! This module owns the whole life of a batch: parameter validation, opening a
//! transport, synchronising with the shell prompt before every command,
//! collecting output, and closing the transport again whatever happened.
//!
//! # Main Components
//!
//! - [`CliClient`] - Runs command batches and scripts against one device
//! - [`Transport`] - Connect/send/read capability implemented by
//!   [`SshTransport`], [`TelnetTransport`] and [`ReplayTransport`]
//! - [`PromptAutomaton`] - Reads output and classifies it against the match rules
//! - [`BatchRecorder`] - Optional timestamped record of what a batch did

use async_ssh2_tokio::client::{AuthMethod, Client};
use async_ssh2_tokio::{Config, ServerCheckMethod};
use async_trait::async_trait;
use log::{debug, error, info, trace, warn};
use russh::{ChannelMsg, Preferred};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::config::{self, ClientConfig};
use crate::error::ShellError;
use crate::prompt::{MatchAction, MatchRules};
use crate::script::{ScriptSyntax, load_script};

pub use expect::{MatchOutcome, OutputAccumulator, PromptAutomaton};
pub use params::SessionParameters;
pub use recording::{BatchEvent, BatchRecordEntry, BatchRecordLevel, BatchRecorder, ReplayTransport};
pub use security::{ConnectionSecurityOptions, SecurityLevel};
pub use ssh::SshTransport;
pub use telnet::TelnetTransport;
pub use transport::{ReadChunk, Transport, TransportKind};
use transport::Utf8Decoder;

/// Drives batches of commands through one remote shell.
///
/// The client owns its transport behind a mutex. Each call to
/// [`CliClient::execute_command`] holds that mutex from connect to close, so
/// concurrent callers on the same client run one after another. A batch whose
/// future is dropped part way still closes its session, on a background task
/// that keeps the mutex until the close is done.
pub struct CliClient<T: Transport + 'static> {
    params: SessionParameters,
    config: ClientConfig,
    rules: MatchRules,
    transport: Arc<Mutex<T>>,
    recorder: Option<BatchRecorder>,
}

mod client;
mod expect;
mod params;
mod recording;
mod security;
mod ssh;
mod telnet;
mod transport;
