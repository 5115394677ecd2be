//! # netshell - Prompt-driven command batches over remote shells
//!
//! `netshell` drives the interactive shell of a remote host or network device
//! the way an operator would: open a session, wait for the prompt, send a
//! command, wait for the prompt again, and so on until the batch is done. The
//! session is always closed afterwards, even when a step fails.
//!
//! ## Features
//!
//! - **Prompt automaton**: ordered regex prompt rules plus end-of-stream and idle-timeout rules
//! - **Batch lifecycle**: one transport per batch, serialized per client, guaranteed teardown
//! - **Scripts**: plain-text command files with comments and `${name}` placeholders
//! - **Transports**: SSH (russh), Telnet, offline replay, or any [`session::Transport`]
//! - **Recording**: JSONL record of a batch that can be replayed without a device
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netshell::config::ClientConfig;
//! use netshell::session::{CliClient, SessionParameters, SshTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let params = SessionParameters::new("192.168.1.1", 22, "admin", "password");
//!     let client = CliClient::new(params, ClientConfig::default(), SshTransport::default())?;
//!
//!     let output = client
//!         .execute_command(&["uname -a", "uptime"])
//!         .await?;
//!     println!("{output}");
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`session::CliClient`] - Runs command batches and scripts
//! - [`prompt::MatchRules`] - Compiled prompt and error patterns
//! - [`command::CommandLine`] - One command line with placeholder substitution
//! - [`script::load_script`] - Reads script files into command lists
//! - [`error::ShellError`] - Error types, grouped by [`error::ErrorKind`]
//! - [`config`] - Client configuration and SSH algorithm tables

pub mod command;
pub mod config;
pub mod error;
pub mod prompt;
pub mod script;
pub mod session;
