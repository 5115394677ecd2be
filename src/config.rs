//! Client configuration and SSH algorithm preference tables.
//!
//! [`ClientConfig`] is built once and handed to a [`crate::session::CliClient`];
//! it is never mutated afterwards, so two clients never observe each other's
//! settings. The algorithm tables are selected by
//! [`crate::session::SecurityLevel`] when an SSH transport connects.

use std::time::Duration;

use russh::keys::{Algorithm, EcdsaCurve, HashAlg};
use russh::{cipher, compression, kex, mac};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ShellError;

/// Prompt patterns recognised when no others are configured.
///
/// Covers common root and user prompts of Linux shells and network devices.
pub const DEFAULT_PROMPT_PATTERNS: &[&str] = &[r"~\]#", r"~#", r"#", r":~#", r"/$", r">"];

/// Default marker that starts a comment line in a script.
pub const DEFAULT_COMMENT_MARKER: &str = "#";

/// Default placeholder prefix; placeholders are written `${name}`.
pub const DEFAULT_PLACEHOLDER_MARKER: &str = "$";

/// How the controller re-synchronises with the shell before each send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RetryPolicy {
    /// Drain passes allowed before a command is declared unsendable.
    pub attempts: u32,
    /// Send a bare line ending between attempts to provoke a fresh prompt.
    pub nudge: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            nudge: false,
        }
    }
}

/// Immutable configuration for one client instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ClientConfig {
    /// Budget for opening, authenticating and starting the shell.
    pub connect_timeout_ms: u64,
    /// Idle window of one automaton pass (the timeout rule).
    pub pass_timeout_ms: u64,
    /// Ceiling on one pass, even while output keeps arriving.
    pub max_pass_ms: u64,
    /// Prompt regexes, in priority order.
    pub prompt_patterns: Vec<String>,
    /// Keep draining after a prompt matches instead of ending the pass.
    pub rearm_on_prompt: bool,
    /// Regexes that mark device error output.
    pub error_patterns: Vec<String>,
    /// Appended to every command sent.
    pub line_ending: String,
    /// Script comment marker.
    pub comment_marker: String,
    /// Script placeholder prefix.
    pub placeholder_marker: String,
    /// Pre-send synchronisation policy.
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 30_000,
            pass_timeout_ms: 1_000,
            max_pass_ms: 60_000,
            prompt_patterns: DEFAULT_PROMPT_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rearm_on_prompt: true,
            error_patterns: Vec::new(),
            line_ending: "\r".to_string(),
            comment_marker: DEFAULT_COMMENT_MARKER.to_string(),
            placeholder_marker: DEFAULT_PLACEHOLDER_MARKER.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ShellError> {
        let config: ClientConfig = serde_json::from_str(json)
            .map_err(|e| ShellError::InvalidConfig(format!("decode error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ShellError> {
        if self.pass_timeout_ms == 0 {
            return Err(ShellError::InvalidConfig(
                "pass_timeout_ms must be positive".to_string(),
            ));
        }
        if self.max_pass_ms < self.pass_timeout_ms {
            return Err(ShellError::InvalidConfig(
                "max_pass_ms must not be shorter than pass_timeout_ms".to_string(),
            ));
        }
        if self.retry.attempts == 0 {
            return Err(ShellError::InvalidConfig(
                "retry.attempts must be at least 1".to_string(),
            ));
        }
        if self.comment_marker.is_empty() {
            return Err(ShellError::InvalidConfig(
                "comment_marker must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn pass_timeout(&self) -> Duration {
        Duration::from_millis(self.pass_timeout_ms)
    }

    pub fn max_pass(&self) -> Duration {
        Duration::from_millis(self.max_pass_ms)
    }
}

/// Modern key exchange algorithms.
pub const SECURE_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_G16_SHA512,
    kex::DH_G14_SHA256,
];

/// Modern key exchange plus group-exchange and SHA-1 group 14.
pub const BALANCED_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_G16_SHA512,
    kex::DH_G14_SHA256,
    kex::DH_GEX_SHA256,
    kex::DH_G14_SHA1,
];

/// Every key exchange algorithm russh knows, for legacy devices.
pub const LEGACY_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_GEX_SHA1,
    kex::DH_GEX_SHA256,
    kex::DH_G1_SHA1,
    kex::DH_G14_SHA1,
    kex::DH_G14_SHA256,
    kex::DH_G15_SHA512,
    kex::DH_G16_SHA512,
    kex::DH_G17_SHA512,
    kex::DH_G18_SHA512,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::NONE,
];

pub static SECURE_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
];

pub static BALANCED_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
    cipher::AES_256_CBC,
    cipher::AES_128_CBC,
];

/// Includes CBC and unencrypted modes for very old devices.
pub static LEGACY_CIPHERS: &[cipher::Name] = &[
    cipher::CLEAR,
    cipher::NONE,
    cipher::AES_128_CTR,
    cipher::AES_192_CTR,
    cipher::AES_256_CTR,
    cipher::AES_256_GCM,
    cipher::AES_128_CBC,
    cipher::AES_192_CBC,
    cipher::AES_256_CBC,
    cipher::CHACHA20_POLY1305,
];

pub const SECURE_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
];

pub const BALANCED_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA1,
];

pub const LEGACY_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::NONE,
    mac::HMAC_SHA1,
    mac::HMAC_SHA256,
    mac::HMAC_SHA512,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512_ETM,
];

pub const DEFAULT_COMPRESSION_ALGORITHMS: &[compression::Name] = &[
    compression::NONE,
    compression::ZLIB,
    compression::ZLIB_LEGACY,
];

pub const SECURE_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
];

pub const BALANCED_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa { hash: None },
];

pub const LEGACY_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Dsa,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Ed25519,
    Algorithm::Rsa { hash: None },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::SkEcdsaSha2NistP256,
    Algorithm::SkEd25519,
];
