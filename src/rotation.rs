//! MFA session rotation
//!
//! One rotation moves a profile through these states:
//!
//! ```text
//! Start -> PermanentResolved -> SessionBackedUp? -> PermanentInstalled
//!       -> TokenExchanged -> SessionInstalled -> Done
//! ```
//!
//! The store is saved once the permanent key is back in the active section
//! (the checkpoint). Any exchange failure after the checkpoint copies the
//! backup section back into the active one and ends in `Reverted`.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config;
use crate::exchange::{ExchangeError, MfaCode, SessionCredentials, TokenExchange};
use crate::profile::{
    self, copy_managed, holds_session, resolve_permanent, KeyPair, PermanentSource,
    ProfileSections, SESSION_EXPIRATION, SESSION_KEYS, SESSION_TOKEN,
};
use crate::progress::Progress;
use crate::store::{CredentialStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
    Start,
    PermanentResolved,
    SessionBackedUp,
    PermanentInstalled,
    TokenExchanged,
    SessionInstalled,
    Done,
    Reverted,
}

impl fmt::Display for RotationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RotationState::Start => "start",
            RotationState::PermanentResolved => "permanent_resolved",
            RotationState::SessionBackedUp => "session_backed_up",
            RotationState::PermanentInstalled => "permanent_installed",
            RotationState::TokenExchanged => "token_exchanged",
            RotationState::SessionInstalled => "session_installed",
            RotationState::Done => "done",
            RotationState::Reverted => "reverted",
        };
        f.write_str(name)
    }
}

/// What happened to the active section after a failed exchange
#[derive(Debug)]
pub enum RevertOutcome {
    Restored,
    NoBackup,
    Failed(StoreError),
}

impl fmt::Display for RevertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevertOutcome::Restored => f.write_str("previous session restored"),
            RevertOutcome::NoBackup => {
                f.write_str("no previous session to restore, permanent key left active")
            }
            RevertOutcome::Failed(e) => {
                write!(f, "restoring the previous session failed: {e}")?;
                if let Some(source) = std::error::Error::source(e) {
                    write!(f, ": {source}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RotationError {
    #[error("credentials file {} does not exist", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("no credentials file given and no home directory to find one in")]
    NoCredentialsPath,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no permanent key for profile '{profile}': [{permanent}] is missing and [{profile}] holds no long-lived key")]
    NoPermanentKey { profile: String, permanent: String },

    #[error("token exchange failed ({revert})")]
    Exchange {
        #[source]
        source: ExchangeError,
        revert: RevertOutcome,
    },
}

#[derive(Debug, Clone)]
pub struct RotationRequest {
    pub profile: String,
    pub code: MfaCode,
    pub duration_seconds: u32,
    /// Explicit credentials file; falls back to the AWS default location
    pub credentials_file: Option<PathBuf>,
}

/// Resolve the credentials file and make sure it exists
pub fn resolve_credentials_path(explicit: Option<&Path>) -> Result<PathBuf, RotationError> {
    existing_credentials_path(
        explicit
            .map(Path::to_path_buf)
            .or_else(config::default_credentials_path),
    )
}

fn existing_credentials_path(candidate: Option<PathBuf>) -> Result<PathBuf, RotationError> {
    match candidate {
        Some(path) if path.is_file() => Ok(path),
        Some(path) => Err(RotationError::ConfigNotFound(path)),
        None => Err(RotationError::NoCredentialsPath),
    }
}

pub struct Rotator<'a> {
    exchange: &'a dyn TokenExchange,
    progress: Progress,
    permanent_suffix: String,
    backup_suffix: String,
}

impl<'a> Rotator<'a> {
    pub fn new(exchange: &'a dyn TokenExchange, progress: Progress) -> Self {
        Self {
            exchange,
            progress,
            permanent_suffix: profile::DEFAULT_PERMANENT_SUFFIX.to_string(),
            backup_suffix: profile::DEFAULT_BACKUP_SUFFIX.to_string(),
        }
    }

    /// Use custom suffixes for the permanent and backup sections
    pub fn with_suffixes(mut self, permanent: &str, backup: &str) -> Self {
        self.permanent_suffix = permanent.to_string();
        self.backup_suffix = backup.to_string();
        self
    }

    fn enter(&self, state: RotationState) {
        debug!(%state, "Rotation state changed");
    }

    /// Rotate the session of one profile
    ///
    /// Returns the new session; its `expiration` is what the caller shows.
    pub async fn rotate(
        &self,
        request: &RotationRequest,
    ) -> Result<SessionCredentials, RotationError> {
        self.enter(RotationState::Start);

        let path = resolve_credentials_path(request.credentials_file.as_deref())?;
        let sections = ProfileSections::new(
            &request.profile,
            &self.permanent_suffix,
            &self.backup_suffix,
        );
        info!(
            "Rotating profile {} in {} via {}",
            request.profile,
            path.display(),
            self.exchange.exchange_type()
        );

        self.progress.step("Parsing the credentials file...");
        let mut store = self.progress.report(CredentialStore::load(&path))?;

        self.progress.step("Installing the permanent access key...");
        self.progress
            .report(self.checkpoint(&mut store, &sections, &path))?;
        self.enter(RotationState::PermanentInstalled);

        self.progress.step("Looking up user and MFA device...");
        let serial_number = match self
            .progress
            .report(self.resolve_mfa_device(&request.profile).await)
        {
            Ok(serial_number) => serial_number,
            Err(e) => return Err(self.revert(&mut store, &sections, &path, e)),
        };

        self.progress.step("Getting a session token...");
        let exchanged = self
            .exchange
            .session_token(
                &request.profile,
                &serial_number,
                &request.code,
                request.duration_seconds,
            )
            .await;
        let session = match self.progress.report(exchanged) {
            Ok(session) => session,
            Err(e) => return Err(self.revert(&mut store, &sections, &path, e)),
        };
        self.enter(RotationState::TokenExchanged);

        self.progress.step("Saving the session credentials...");
        self.install_session(&mut store, &sections, &session);
        self.enter(RotationState::SessionInstalled);
        self.progress.report(store.save(&path))?;

        self.enter(RotationState::Done);
        info!(
            "Profile {} now holds a session expiring at {}",
            request.profile,
            session.expiration.to_rfc3339()
        );
        Ok(session)
    }

    /// Promote the permanent key into the active section and save
    ///
    /// A session currently in the active section is copied to the backup
    /// section first, so it is on disk before any remote call is made.
    fn checkpoint(
        &self,
        store: &mut CredentialStore,
        sections: &ProfileSections,
        path: &Path,
    ) -> Result<(), RotationError> {
        let permanent = match resolve_permanent(store, sections)? {
            PermanentSource::Permanent(pair) => pair,
            PermanentSource::BootstrapFromActive(pair) => {
                info!(
                    "No [{}] section yet, seeding it from [{}]",
                    sections.permanent, sections.active
                );
                pair.write(store, &sections.permanent);
                pair
            }
            PermanentSource::Unresolvable => {
                return Err(RotationError::NoPermanentKey {
                    profile: sections.active.clone(),
                    permanent: sections.permanent.clone(),
                });
            }
        };
        self.enter(RotationState::PermanentResolved);

        if holds_session(store, &sections.active) {
            store.remove_section(&sections.backup);
            copy_managed(store, &sections.active, &sections.backup);
            debug!("Backed up [{}] to [{}]", sections.active, sections.backup);
            self.enter(RotationState::SessionBackedUp);
        }

        permanent.write(store, &sections.active);
        for key in SESSION_KEYS {
            store.remove(&sections.active, key);
        }

        store.save(path)?;
        Ok(())
    }

    async fn resolve_mfa_device(&self, profile: &str) -> Result<String, ExchangeError> {
        let identity = self.exchange.caller_identity(profile).await?;
        debug!("Caller is IAM user {}", identity.user_name);

        let devices = self
            .exchange
            .list_mfa_devices(profile, &identity.user_name)
            .await?;

        devices
            .into_iter()
            .next()
            .map(|device| device.serial_number)
            .ok_or(ExchangeError::NoMfaDevice {
                user_name: identity.user_name,
            })
    }

    fn install_session(
        &self,
        store: &mut CredentialStore,
        sections: &ProfileSections,
        session: &SessionCredentials,
    ) {
        if let Ok(current) = KeyPair::read(store, &sections.active) {
            if current.is_long_lived() {
                current.write(store, &sections.permanent);
            }
        }

        for key in SESSION_KEYS {
            store.remove(&sections.active, key);
        }
        KeyPair {
            access_key_id: session.access_key_id.clone(),
            secret_access_key: session.secret_access_key.clone(),
        }
        .write(store, &sections.active);
        store.set(&sections.active, SESSION_TOKEN, &session.session_token);
        store.set(
            &sections.active,
            SESSION_EXPIRATION,
            &session.expiration.to_rfc3339(),
        );
        store.remove_section(&sections.backup);
    }

    /// Put the backed-up session back after a failed exchange
    ///
    /// Attempted once; the exchange failure is returned whatever happens here.
    fn revert(
        &self,
        store: &mut CredentialStore,
        sections: &ProfileSections,
        path: &Path,
        source: ExchangeError,
    ) -> RotationError {
        warn!(
            "Token exchange for profile {} failed: {}",
            sections.active, source
        );

        let revert = if store.has_section(&sections.backup) {
            self.progress.step("Restoring the previous session...");
            copy_managed(store, &sections.backup, &sections.active);
            store.remove_section(&sections.backup);
            match self.progress.report(store.save(path)) {
                Ok(()) => {
                    self.enter(RotationState::Reverted);
                    RevertOutcome::Restored
                }
                Err(e) => RevertOutcome::Failed(e),
            }
        } else {
            RevertOutcome::NoBackup
        };

        warn!("Revert of profile {}: {}", sections.active, revert);
        RotationError::Exchange { source, revert }
    }
}
