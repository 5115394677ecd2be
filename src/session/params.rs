use super::*;

/// Connection and credential data for one remote device.
///
/// Fields are private and only reachable through [`SessionParameters::validate`]
/// plus the getters the transports use after validation succeeded. The type
/// can be deserialized from configuration but is never serialized.
#[derive(Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct SessionParameters {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl SessionParameters {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Succeeds iff host, username and password are non-empty and port is not zero.
    pub fn validate(&self) -> Result<(), ShellError> {
        if self.host.trim().is_empty() {
            return Err(ShellError::InvalidParameterError("host"));
        }
        if self.port == 0 {
            return Err(ShellError::InvalidParameterError("port"));
        }
        if self.username.is_empty() {
            return Err(ShellError::InvalidParameterError("username"));
        }
        if self.password.is_empty() {
            return Err(ShellError::InvalidParameterError("password"));
        }
        Ok(())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    /// `user@host:port`, used to tag log lines and recordings.
    pub fn device_addr(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

impl fmt::Debug for SessionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionParameters")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
