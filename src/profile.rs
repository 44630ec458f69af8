//! Profile layout in the shared credentials file
//!
//! A profile `P` is spread over up to three sections: `P` holds whatever
//! downstream tools should use, `P-permanent` holds the long-lived key that
//! mints sessions, and `P-backup` is a copy of `P` taken right before a
//! rotation so a failed rotation can be undone.

use crate::store::{CredentialStore, StoreError};

pub const ACCESS_KEY_ID: &str = "aws_access_key_id";
pub const SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
pub const SESSION_TOKEN: &str = "aws_session_token";
/// Older SDKs and tools wrote the session token under this name
pub const LEGACY_SECURITY_TOKEN: &str = "aws_security_token";
pub const SESSION_EXPIRATION: &str = "aws_session_expiration";

/// Attributes that only make sense alongside a session
pub const SESSION_KEYS: [&str; 3] = [SESSION_TOKEN, LEGACY_SECURITY_TOKEN, SESSION_EXPIRATION];

/// Everything backup and revert carry between sections
pub const MANAGED_KEYS: [&str; 5] = [
    ACCESS_KEY_ID,
    SECRET_ACCESS_KEY,
    SESSION_TOKEN,
    LEGACY_SECURITY_TOKEN,
    SESSION_EXPIRATION,
];

/// Prefix of long-lived IAM user access key ids; session keys start with `ASIA`
pub const LONG_LIVED_KEY_PREFIX: &str = "AKIA";

pub const DEFAULT_PERMANENT_SUFFIX: &str = "-permanent";
pub const DEFAULT_BACKUP_SUFFIX: &str = "-backup";

/// Whether an access key id belongs to long-lived key material
pub fn is_long_lived_key(access_key_id: &str) -> bool {
    access_key_id.starts_with(LONG_LIVED_KEY_PREFIX)
}

/// Section names of one profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSections {
    pub active: String,
    pub permanent: String,
    pub backup: String,
}

impl ProfileSections {
    pub fn new(profile: &str, permanent_suffix: &str, backup_suffix: &str) -> Self {
        Self {
            active: profile.to_string(),
            permanent: format!("{profile}{permanent_suffix}"),
            backup: format!("{profile}{backup_suffix}"),
        }
    }

    pub fn with_default_suffixes(profile: &str) -> Self {
        Self::new(profile, DEFAULT_PERMANENT_SUFFIX, DEFAULT_BACKUP_SUFFIX)
    }
}

/// An access key id and its secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl KeyPair {
    pub fn read(store: &CredentialStore, section: &str) -> Result<Self, StoreError> {
        Ok(Self {
            access_key_id: store.get(section, ACCESS_KEY_ID)?.to_string(),
            secret_access_key: store.get(section, SECRET_ACCESS_KEY)?.to_string(),
        })
    }

    pub fn write(&self, store: &mut CredentialStore, section: &str) {
        store.set(section, ACCESS_KEY_ID, &self.access_key_id);
        store.set(section, SECRET_ACCESS_KEY, &self.secret_access_key);
    }

    pub fn is_long_lived(&self) -> bool {
        is_long_lived_key(&self.access_key_id)
    }
}

/// Where the permanent key for this rotation comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermanentSource {
    /// `P-permanent` exists
    Permanent(KeyPair),
    /// First run: the active section still holds a long-lived key
    BootstrapFromActive(KeyPair),
    /// Neither a permanent section nor a long-lived key in the active one
    Unresolvable,
}

/// Locate the permanent key without touching the store
///
/// A permanent section that lacks either key is an error rather than a
/// reason to fall back to the active section.
pub fn resolve_permanent(
    store: &CredentialStore,
    sections: &ProfileSections,
) -> Result<PermanentSource, StoreError> {
    if store.has_section(&sections.permanent) {
        return KeyPair::read(store, &sections.permanent).map(PermanentSource::Permanent);
    }

    match store.get(&sections.active, ACCESS_KEY_ID) {
        Ok(access_key_id) if is_long_lived_key(access_key_id) => {
            KeyPair::read(store, &sections.active).map(PermanentSource::BootstrapFromActive)
        }
        _ => Ok(PermanentSource::Unresolvable),
    }
}

/// Whether a section currently holds a session rather than a raw key
pub fn holds_session(store: &CredentialStore, section: &str) -> bool {
    store.has_key(section, SESSION_TOKEN) || store.has_key(section, LEGACY_SECURITY_TOKEN)
}

/// Make `to` carry exactly the managed attributes `from` has
///
/// Managed keys missing from `from` are removed from `to`; other keys in
/// `to` are left alone.
pub fn copy_managed(store: &mut CredentialStore, from: &str, to: &str) {
    store.add_section(to);
    for key in MANAGED_KEYS {
        match store.get(from, key).map(str::to_string) {
            Ok(value) => store.set(to, key, &value),
            Err(_) => {
                store.remove(to, key);
            }
        }
    }
}
