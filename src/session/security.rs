use super::*;

/// SSH algorithm tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// Modern algorithms only.
    #[default]
    Secure,
    /// Adds SHA-1 group exchange, CBC ciphers and SHA-1 MACs.
    Balanced,
    /// Everything russh supports, including unencrypted modes.
    LegacyCompatible,
}

impl SecurityLevel {
    /// Host-key check a level uses unless overridden.
    fn default_server_check(self) -> ServerCheckMethod {
        match self {
            SecurityLevel::Secure | SecurityLevel::Balanced => {
                ServerCheckMethod::DefaultKnownHostsFile
            }
            SecurityLevel::LegacyCompatible => ServerCheckMethod::NoCheck,
        }
    }
}

/// Algorithm policy and host-key checking used by [`SshTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSecurityOptions {
    pub level: SecurityLevel,
    pub server_check: ServerCheckMethod,
}

impl Default for ConnectionSecurityOptions {
    fn default() -> Self {
        Self::new(SecurityLevel::Secure)
    }
}

impl ConnectionSecurityOptions {
    pub fn new(level: SecurityLevel) -> Self {
        Self {
            level,
            server_check: level.default_server_check(),
        }
    }

    pub fn secure_default() -> Self {
        Self::new(SecurityLevel::Secure)
    }

    pub fn balanced() -> Self {
        Self::new(SecurityLevel::Balanced)
    }

    /// Old devices rarely have stable host keys, so this profile skips the check.
    pub fn legacy_compatible() -> Self {
        Self::new(SecurityLevel::LegacyCompatible)
    }

    #[must_use]
    pub fn with_server_check(mut self, server_check: ServerCheckMethod) -> Self {
        self.server_check = server_check;
        self
    }

    pub(super) fn preferred(&self) -> Preferred {
        let (kex, key, cipher, mac) = match self.level {
            SecurityLevel::Secure => (
                config::SECURE_KEX_ORDER,
                config::SECURE_KEY_TYPES,
                config::SECURE_CIPHERS,
                config::SECURE_MAC_ALGORITHMS,
            ),
            SecurityLevel::Balanced => (
                config::BALANCED_KEX_ORDER,
                config::BALANCED_KEY_TYPES,
                config::BALANCED_CIPHERS,
                config::BALANCED_MAC_ALGORITHMS,
            ),
            SecurityLevel::LegacyCompatible => (
                config::LEGACY_KEX_ORDER,
                config::LEGACY_KEY_TYPES,
                config::LEGACY_CIPHERS,
                config::LEGACY_MAC_ALGORITHMS,
            ),
        };
        Preferred {
            kex: Cow::Borrowed(kex),
            key: Cow::Borrowed(key),
            cipher: Cow::Borrowed(cipher),
            mac: Cow::Borrowed(mac),
            compression: Cow::Borrowed(config::DEFAULT_COMPRESSION_ALGORITHMS),
        }
    }
}
