use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::exchange::ExchangeKind;
use crate::profile::{DEFAULT_BACKUP_SUFFIX, DEFAULT_PERMANENT_SUFFIX};

/// Environment variable the AWS tools use to relocate the credentials file
pub const CREDENTIALS_FILE_ENV: &str = "AWS_SHARED_CREDENTIALS_FILE";

/// Shortest session STS will issue, in seconds (15 minutes)
pub const MIN_DURATION_SECONDS: u32 = 900;

/// Longest session STS will issue for an IAM user, in seconds (36 hours)
pub const MAX_DURATION_SECONDS: u32 = 129_600;

pub const DEFAULT_DURATION_SECONDS: u32 = 43_200;

pub const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_duration_seconds")]
    pub duration_seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_permanent_suffix")]
    pub permanent_suffix: String,
    #[serde(default = "default_backup_suffix")]
    pub backup_suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// `cli` or `sdk`
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_aws_cli")]
    pub aws_cli: String,
    pub region: Option<String>,
}

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

fn default_duration_seconds() -> u32 {
    DEFAULT_DURATION_SECONDS
}

fn default_permanent_suffix() -> String {
    DEFAULT_PERMANENT_SUFFIX.to_string()
}

fn default_backup_suffix() -> String {
    DEFAULT_BACKUP_SUFFIX.to_string()
}

fn default_backend() -> String {
    "cli".to_string()
}

fn default_aws_cli() -> String {
    "aws".to_string()
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            duration_seconds: default_duration_seconds(),
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            permanent_suffix: default_permanent_suffix(),
            backup_suffix: default_backup_suffix(),
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            aws_cli: default_aws_cli(),
            region: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Self = toml::from_str(&contents).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the rotation could not run with
    pub fn validate(&self) -> Result<()> {
        check_duration(self.rotation.duration_seconds)
            .map_err(anyhow::Error::msg)
            .context("Invalid rotation.duration_seconds")?;

        let permanent = &self.profile.permanent_suffix;
        let backup = &self.profile.backup_suffix;
        if permanent.is_empty() || backup.is_empty() {
            anyhow::bail!("profile.permanent_suffix and profile.backup_suffix must not be empty");
        }
        if permanent == backup {
            anyhow::bail!("profile.permanent_suffix and profile.backup_suffix must differ");
        }

        self.exchange
            .backend
            .parse::<ExchangeKind>()
            .map_err(anyhow::Error::msg)
            .context("Invalid exchange.backend")?;

        Ok(())
    }
}

/// Check a session duration against the range STS accepts
pub fn check_duration(seconds: u32) -> Result<u32, String> {
    if (MIN_DURATION_SECONDS..=MAX_DURATION_SECONDS).contains(&seconds) {
        Ok(seconds)
    } else {
        Err(format!(
            "duration must be from {} to {} seconds, got {}",
            MIN_DURATION_SECONDS, MAX_DURATION_SECONDS, seconds
        ))
    }
}

/// Get the AWS credentials file path
/// Respects AWS_SHARED_CREDENTIALS_FILE environment variable if set
pub fn default_credentials_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CREDENTIALS_FILE_ENV) {
        return Some(PathBuf::from(path));
    }

    dirs::home_dir().map(|home| home.join(".aws").join("credentials"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.rotation.profile, "default");
        assert_eq!(config.rotation.duration_seconds, 43_200);
        assert_eq!(config.profile.permanent_suffix, "-permanent");
        assert_eq!(config.profile.backup_suffix, "-backup");
        assert_eq!(config.exchange.backend, "cli");
        assert_eq!(config.exchange.aws_cli, "aws");
        assert!(config.exchange.region.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "[rotation]\nduration_seconds = 3600\n\n[exchange]\nbackend = \"sdk\"\nregion = \"eu-west-1\"\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.rotation.duration_seconds, 3600);
        assert_eq!(config.rotation.profile, "default");
        assert_eq!(config.exchange.backend, "sdk");
        assert_eq!(config.exchange.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.profile.backup_suffix, "-backup");
    }

    #[test]
    fn test_from_file_rejects_bad_duration() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[rotation]\nduration_seconds = 60\n").unwrap();

        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_from_file_missing() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Config::from_file(temp_dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_validate_suffixes() {
        let mut config = Config::default();
        config.profile.backup_suffix = "-permanent".to_string();
        assert!(config.validate().is_err());

        config.profile.backup_suffix = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_backend() {
        let mut config = Config::default();
        config.exchange.backend = "vault".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_check_duration_bounds() {
        assert!(check_duration(899).is_err());
        assert_eq!(check_duration(900), Ok(900));
        assert_eq!(check_duration(43_200), Ok(43_200));
        assert_eq!(check_duration(129_600), Ok(129_600));
        assert!(check_duration(129_601).is_err());
        assert!(check_duration(500).is_err());
    }
}
