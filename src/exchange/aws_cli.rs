use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

use super::token_exchange::{
    CallerIdentity, ExchangeError, MfaCode, MfaDevice, SessionCredentials, TokenExchange,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetUserResponse {
    user: IamUser,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IamUser {
    user_name: String,
}

#[derive(Debug, Deserialize)]
struct ListMfaDevicesResponse {
    #[serde(rename = "MFADevices")]
    mfa_devices: Vec<MfaDeviceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MfaDeviceEntry {
    serial_number: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetSessionTokenResponse {
    credentials: StsCredentials,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: String,
}

/// Parse the expiration the CLI prints, e.g. `2026-10-20T07:00:00+00:00`
pub(crate) fn parse_expiration(value: &str) -> Result<DateTime<Utc>, ExchangeError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ExchangeError::InvalidExpiration(value.to_string()))
}

/// Token exchange backed by the `aws` command line tool
pub struct AwsCliExchange {
    program: PathBuf,
    credentials_file: Option<PathBuf>,
}

impl AwsCliExchange {
    /// Create a new exchange running `program`
    ///
    /// When `credentials_file` is set the CLI is pointed at it, so it reads
    /// the same file the rotation writes.
    pub fn new(program: impl Into<PathBuf>, credentials_file: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            credentials_file,
        }
    }

    /// Run one `aws` operation and decode its JSON output
    ///
    /// `operation` is the service and command (`["iam", "get-user"]`); it is
    /// the only part of the invocation that ends up in error messages.
    async fn run<T: DeserializeOwned>(
        &self,
        profile: &str,
        operation: [&str; 2],
        args: &[&str],
    ) -> Result<T, ExchangeError> {
        let command = format!("aws {}", operation.join(" "));
        debug!("Running {} for profile {}", command, profile);

        let mut cmd = Command::new(&self.program);
        cmd.args(operation)
            .args(args)
            .args(["--profile", profile, "--output", "json"]);
        if let Some(ref path) = self.credentials_file {
            cmd.env("AWS_SHARED_CREDENTIALS_FILE", path);
        }

        let output = cmd.output().await.map_err(|source| ExchangeError::Spawn {
            command: command.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(ExchangeError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|source| ExchangeError::InvalidResponse { command, source })
    }
}

#[async_trait::async_trait]
impl TokenExchange for AwsCliExchange {
    async fn caller_identity(&self, profile: &str) -> Result<CallerIdentity, ExchangeError> {
        let response: GetUserResponse = self.run(profile, ["iam", "get-user"], &[]).await?;

        Ok(CallerIdentity {
            user_name: response.user.user_name,
        })
    }

    async fn list_mfa_devices(
        &self,
        profile: &str,
        user_name: &str,
    ) -> Result<Vec<MfaDevice>, ExchangeError> {
        let response: ListMfaDevicesResponse = self
            .run(
                profile,
                ["iam", "list-mfa-devices"],
                &["--user-name", user_name],
            )
            .await?;

        Ok(response
            .mfa_devices
            .into_iter()
            .map(|device| MfaDevice {
                serial_number: device.serial_number,
            })
            .collect())
    }

    async fn session_token(
        &self,
        profile: &str,
        serial_number: &str,
        code: &MfaCode,
        duration_seconds: u32,
    ) -> Result<SessionCredentials, ExchangeError> {
        let duration = duration_seconds.to_string();
        let response: GetSessionTokenResponse = self
            .run(
                profile,
                ["sts", "get-session-token"],
                &[
                    "--serial-number",
                    serial_number,
                    "--token-code",
                    code.as_str(),
                    "--duration-seconds",
                    &duration,
                ],
            )
            .await?;

        let creds = response.credentials;
        Ok(SessionCredentials {
            expiration: parse_expiration(&creds.expiration)?,
            access_key_id: creds.access_key_id,
            secret_access_key: creds.secret_access_key,
            session_token: creds.session_token,
        })
    }

    fn exchange_type(&self) -> &'static str {
        "AWS CLI"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_get_user_response() {
        let json = r#"{
            "User": {
                "Path": "/",
                "UserName": "alice",
                "UserId": "AIDAEXAMPLE",
                "Arn": "arn:aws:iam::123456789012:user/alice",
                "CreateDate": "2020-01-01T00:00:00+00:00"
            }
        }"#;

        let response: GetUserResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.user.user_name, "alice");
    }

    #[test]
    fn test_parse_list_mfa_devices_response() {
        let json = r#"{
            "MFADevices": [
                {
                    "UserName": "alice",
                    "SerialNumber": "arn:aws:iam::123456789012:mfa/alice",
                    "EnableDate": "2020-01-01T00:00:00+00:00"
                }
            ]
        }"#;

        let response: ListMfaDevicesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.mfa_devices.len(), 1);
        assert_eq!(
            response.mfa_devices[0].serial_number,
            "arn:aws:iam::123456789012:mfa/alice"
        );

        let empty: ListMfaDevicesResponse =
            serde_json::from_str(r#"{"MFADevices": []}"#).unwrap();
        assert!(empty.mfa_devices.is_empty());
    }

    #[test]
    fn test_parse_get_session_token_response() {
        let json = r#"{
            "Credentials": {
                "AccessKeyId": "ASIAEXAMPLE",
                "SecretAccessKey": "secret/with+chars",
                "SessionToken": "FwoGZXIvYXdzEBc=",
                "Expiration": "2026-10-20T07:00:00+00:00"
            }
        }"#;

        let response: GetSessionTokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.credentials.access_key_id, "ASIAEXAMPLE");
        assert_eq!(response.credentials.secret_access_key, "secret/with+chars");
        assert_eq!(response.credentials.session_token, "FwoGZXIvYXdzEBc=");
    }

    #[test]
    fn test_parse_expiration() {
        let expected = Utc.with_ymd_and_hms(2026, 10, 20, 7, 0, 0).unwrap();
        assert_eq!(parse_expiration("2026-10-20T07:00:00+00:00").unwrap(), expected);
        assert_eq!(parse_expiration("2026-10-20T07:00:00Z").unwrap(), expected);
        assert_eq!(parse_expiration("2026-10-20T09:00:00+02:00").unwrap(), expected);
        assert!(matches!(
            parse_expiration("tomorrow"),
            Err(ExchangeError::InvalidExpiration(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let exchange = AwsCliExchange::new("/nonexistent/bin/aws", None);
        let result = exchange.caller_identity("default").await;

        match result {
            Err(ExchangeError::Spawn { command, .. }) => assert_eq!(command, "aws iam get-user"),
            other => panic!("Expected spawn error, got {:?}", other),
        }
    }
}
