#![allow(deprecated)] // ProfileFiles moved to aws-runtime but is still re-exported here

use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use aws_config::{BehaviorVersion, ConfigLoader, Region, SdkConfig};
use aws_sdk_iam::Client as IamClient;
use aws_sdk_sts::Client as StsClient;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::{debug, info};

use super::token_exchange::{
    CallerIdentity, ExchangeError, MfaCode, MfaDevice, SessionCredentials, TokenExchange,
};
use super::DEFAULT_AWS_REGION;

/// Extract the user name from an IAM user ARN
///
/// `arn:aws:iam::123456789012:user/division/alice` yields `alice`.
fn user_name_from_arn(arn: &str) -> Option<&str> {
    let (_, resource) = arn.split_once(":user/")?;
    resource.rsplit('/').next().filter(|name| !name.is_empty())
}

/// Token exchange backed by the AWS SDK (STS and IAM)
pub struct AwsSdkExchange {
    region: Option<String>,
    credentials_file: Option<PathBuf>,
}

impl AwsSdkExchange {
    pub fn new(region: Option<String>, credentials_file: Option<PathBuf>) -> Self {
        Self {
            region,
            credentials_file,
        }
    }

    fn loader(&self, profile: &str) -> ConfigLoader {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).profile_name(profile);

        if let Some(ref path) = self.credentials_file {
            loader = loader.profile_files(
                ProfileFiles::builder()
                    .include_default_config_file(true)
                    .with_file(ProfileFileKind::Credentials, path.clone())
                    .build(),
            );
        }

        loader
    }

    /// Load SDK config for a profile
    ///
    /// Loaded per call: the credentials file changes between the checkpoint
    /// and the exchange, and the SDK must see the promoted permanent key.
    /// Priority for the region: explicit setting -> env/config file -> DEFAULT_AWS_REGION
    async fn load_config(&self, profile: &str) -> SdkConfig {
        if let Some(ref region) = self.region {
            return self
                .loader(profile)
                .region(Region::new(region.clone()))
                .load()
                .await;
        }

        let loaded = self.loader(profile).load().await;
        match loaded.region() {
            Some(region) => {
                debug!("Using region: {}", region);
                loaded
            }
            None => {
                debug!(
                    "No region configured, using default {} for IAM and STS",
                    DEFAULT_AWS_REGION
                );
                self.loader(profile)
                    .region(Region::new(DEFAULT_AWS_REGION))
                    .load()
                    .await
            }
        }
    }
}

#[async_trait::async_trait]
impl TokenExchange for AwsSdkExchange {
    async fn caller_identity(&self, profile: &str) -> Result<CallerIdentity, ExchangeError> {
        debug!("Calling AWS STS GetCallerIdentity");
        let client = StsClient::new(&self.load_config(profile).await);

        let response = client.get_caller_identity().send().await.map_err(|e| {
            ExchangeError::Service(format!(
                "GetCallerIdentity failed: {}",
                aws_sdk_sts::error::DisplayErrorContext(&e)
            ))
        })?;

        let arn = response.arn().unwrap_or_default();
        let user_name = user_name_from_arn(arn).ok_or_else(|| {
            ExchangeError::Service(format!("caller '{}' is not an IAM user", arn))
        })?;

        Ok(CallerIdentity {
            user_name: user_name.to_string(),
        })
    }

    async fn list_mfa_devices(
        &self,
        profile: &str,
        user_name: &str,
    ) -> Result<Vec<MfaDevice>, ExchangeError> {
        debug!("Calling AWS IAM ListMFADevices for {}", user_name);
        let client = IamClient::new(&self.load_config(profile).await);

        let response = client
            .list_mfa_devices()
            .user_name(user_name)
            .send()
            .await
            .map_err(|e| {
                ExchangeError::Service(format!(
                    "ListMFADevices failed: {}",
                    aws_sdk_iam::error::DisplayErrorContext(&e)
                ))
            })?;

        Ok(response
            .mfa_devices()
            .iter()
            .map(|device| MfaDevice {
                serial_number: device.serial_number().to_string(),
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
        info!("Calling AWS STS GetSessionToken");
        let client = StsClient::new(&self.load_config(profile).await);

        let duration = i32::try_from(duration_seconds).map_err(|_| {
            ExchangeError::Service(format!("duration {} is out of range", duration_seconds))
        })?;

        let response = client
            .get_session_token()
            .serial_number(serial_number)
            .token_code(code.as_str())
            .duration_seconds(duration)
            .send()
            .await
            .map_err(|e| {
                ExchangeError::Service(format!(
                    "GetSessionToken failed: {}",
                    aws_sdk_sts::error::DisplayErrorContext(&e)
                ))
            })?;

        let sts_creds = response
            .credentials()
            .ok_or(ExchangeError::MissingCredentials)?;

        let expiration = sts_creds.expiration();
        let expiration = DateTime::<Utc>::from_timestamp(expiration.secs(), expiration.subsec_nanos())
            .ok_or_else(|| ExchangeError::InvalidExpiration(expiration.secs().to_string()))?;

        Ok(SessionCredentials {
            access_key_id: sts_creds.access_key_id().to_string(),
            secret_access_key: sts_creds.secret_access_key().to_string(),
            session_token: sts_creds.session_token().to_string(),
            expiration,
        })
    }

    fn exchange_type(&self) -> &'static str {
        "AWS SDK"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_name_from_arn() {
        assert_eq!(
            user_name_from_arn("arn:aws:iam::123456789012:user/alice"),
            Some("alice")
        );
        assert_eq!(
            user_name_from_arn("arn:aws:iam::123456789012:user/division/team/bob"),
            Some("bob")
        );
        assert_eq!(
            user_name_from_arn("arn:aws-us-gov:iam::123456789012:user/carol"),
            Some("carol")
        );
    }

    #[test]
    fn test_user_name_from_non_user_arn() {
        assert_eq!(
            user_name_from_arn("arn:aws:sts::123456789012:assumed-role/Admin/session"),
            None
        );
        assert_eq!(user_name_from_arn("arn:aws:iam::123456789012:root"), None);
        assert_eq!(user_name_from_arn("arn:aws:iam::123456789012:user/"), None);
    }
}
