//! Token exchange implementations
//!
//! The rotation engine talks to the identity and token service only through
//! [`TokenExchange`]. Two implementations are provided: one that shells out to
//! the AWS CLI and one that uses the AWS SDK directly.

mod aws_cli;
mod aws_sdk;
#[cfg(test)]
pub(crate) mod scripted;
mod token_exchange;

pub use aws_cli::AwsCliExchange;
pub use aws_sdk::AwsSdkExchange;
pub use token_exchange::{
    CallerIdentity, ExchangeError, MfaCode, MfaDevice, SessionCredentials, TokenExchange,
};

/// Default AWS region for IAM and STS calls when no region is configured
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Exchange type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeKind {
    #[default]
    Cli,
    Sdk,
}

impl std::str::FromStr for ExchangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cli" | "aws-cli" => Ok(ExchangeKind::Cli),
            "sdk" => Ok(ExchangeKind::Sdk),
            _ => Err(format!("Unknown exchange type: {}. Supported: cli, sdk", s)),
        }
    }
}

/// Type alias for exchange trait object
pub type Exchange = Box<dyn TokenExchange>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_kind_from_str() {
        assert_eq!("cli".parse::<ExchangeKind>().unwrap(), ExchangeKind::Cli);
        assert_eq!("AWS-CLI".parse::<ExchangeKind>().unwrap(), ExchangeKind::Cli);
        assert_eq!("Sdk".parse::<ExchangeKind>().unwrap(), ExchangeKind::Sdk);
        assert!("vault".parse::<ExchangeKind>().is_err());
    }

    #[test]
    fn test_exchange_kind_default_is_cli() {
        assert_eq!(ExchangeKind::default(), ExchangeKind::Cli);
    }
}
