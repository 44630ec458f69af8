use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A one-time code from the MFA device: exactly six ASCII digits
#[derive(Clone, PartialEq, Eq)]
pub struct MfaCode(String);

impl MfaCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MfaCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.to_string()))
        } else {
            Err("MFA code must be exactly 6 digits".to_string())
        }
    }
}

impl fmt::Debug for MfaCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MfaCode(******)")
    }
}

/// The IAM user behind the profile's current key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaDevice {
    pub serial_number: String,
}

/// Temporary credentials issued in exchange for an MFA code
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("failed to run `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("`{command}` returned an unexpected response")]
    InvalidResponse {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("session expiration '{0}' is not a valid timestamp")]
    InvalidExpiration(String),

    #[error("{0}")]
    Service(String),

    #[error("token service returned no credentials")]
    MissingCredentials,

    #[error("no MFA device registered for user {user_name}")]
    NoMfaDevice { user_name: String },
}

/// Remote identity and token service used to mint MFA sessions
#[async_trait::async_trait]
pub trait TokenExchange: Send + Sync {
    /// Look up the IAM user the profile's current key belongs to
    async fn caller_identity(&self, profile: &str) -> Result<CallerIdentity, ExchangeError>;

    /// List the MFA devices registered for a user
    async fn list_mfa_devices(
        &self,
        profile: &str,
        user_name: &str,
    ) -> Result<Vec<MfaDevice>, ExchangeError>;

    /// Trade an MFA code for temporary session credentials
    async fn session_token(
        &self,
        profile: &str,
        serial_number: &str,
        code: &MfaCode,
        duration_seconds: u32,
    ) -> Result<SessionCredentials, ExchangeError>;

    /// Get the exchange type name for display purposes
    fn exchange_type(&self) -> &'static str;
}
