//! MFA Session Rotator Library
//!
//! Rotates MFA-authenticated session credentials for a profile in the AWS
//! shared credentials file, keeping the long-lived key that mints them.

pub mod cli;
pub mod config;
pub mod exchange;
pub mod profile;
pub mod progress;
pub mod rotation;
pub mod store;

pub use config::Config;
pub use exchange::{ExchangeKind, TokenExchange};
pub use rotation::{RotationError, RotationRequest, Rotator};
pub use store::CredentialStore;
