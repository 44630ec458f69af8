//! In-memory exchange that replays scripted results

use chrono::{TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

use super::token_exchange::{
    CallerIdentity, ExchangeError, MfaCode, MfaDevice, SessionCredentials, TokenExchange,
};

/// Exchange double: each call pops the next scripted result for its operation
///
/// A call with nothing scripted fails, so an unexpected call shows up as a
/// rotation failure instead of a hang or a panic inside the engine.
#[derive(Default)]
pub struct ScriptedExchange {
    identities: Mutex<VecDeque<Result<CallerIdentity, ExchangeError>>>,
    devices: Mutex<VecDeque<Result<Vec<MfaDevice>, ExchangeError>>>,
    sessions: Mutex<VecDeque<Result<SessionCredentials, ExchangeError>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script one complete successful exchange issuing `session`
    pub fn succeeding(session: SessionCredentials) -> Self {
        let exchange = Self::new();
        exchange.push_identity(Ok(CallerIdentity {
            user_name: "alice".to_string(),
        }));
        exchange.push_devices(Ok(vec![MfaDevice {
            serial_number: "arn:aws:iam::123456789012:mfa/alice".to_string(),
        }]));
        exchange.push_session(Ok(session));
        exchange
    }

    pub fn push_identity(&self, result: Result<CallerIdentity, ExchangeError>) {
        self.identities.lock().unwrap().push_back(result);
    }

    pub fn push_devices(&self, result: Result<Vec<MfaDevice>, ExchangeError>) {
        self.devices.lock().unwrap().push_back(result);
    }

    pub fn push_session(&self, result: Result<SessionCredentials, ExchangeError>) {
        self.sessions.lock().unwrap().push_back(result);
    }

    /// Operations called so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn unscripted(operation: &str) -> ExchangeError {
    ExchangeError::Service(format!("no scripted result for {operation}"))
}

/// Session credentials with a fixed expiration for assertions
pub fn session(access_key_id: &str) -> SessionCredentials {
    SessionCredentials {
        access_key_id: access_key_id.to_string(),
        secret_access_key: format!("{access_key_id}-secret/+="),
        session_token: format!("{access_key_id}-token=="),
        expiration: Utc.with_ymd_and_hms(2026, 10, 20, 7, 0, 0).unwrap(),
    }
}

#[async_trait::async_trait]
impl TokenExchange for ScriptedExchange {
    async fn caller_identity(&self, profile: &str) -> Result<CallerIdentity, ExchangeError> {
        self.record(format!("caller_identity {profile}"));
        self.identities
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("caller_identity")))
    }

    async fn list_mfa_devices(
        &self,
        profile: &str,
        user_name: &str,
    ) -> Result<Vec<MfaDevice>, ExchangeError> {
        self.record(format!("list_mfa_devices {profile} {user_name}"));
        self.devices
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("list_mfa_devices")))
    }

    async fn session_token(
        &self,
        profile: &str,
        serial_number: &str,
        code: &MfaCode,
        duration_seconds: u32,
    ) -> Result<SessionCredentials, ExchangeError> {
        self.record(format!(
            "session_token {profile} {serial_number} {} {duration_seconds}",
            code.as_str()
        ));
        self.sessions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("session_token")))
    }

    fn exchange_type(&self) -> &'static str {
        "scripted"
    }
}
