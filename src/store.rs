//! Credential store adapter
//!
//! Loads the shared credentials file into an ordered set of named sections and
//! writes the whole set back. Only the sections and keys a caller touches are
//! changed; everything else is written back in its original order.

use ini::{EscapePolicy, Ini, ParseOption, Properties, WriteOption};
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credentials file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to parse credentials file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ini::ParseError,
    },

    #[error("section [{section}] appears more than once in {}", .path.display())]
    DuplicateSection { path: PathBuf, section: String },

    #[error("key '{key}' not found in section [{section}]")]
    MissingKey { section: String, key: String },

    #[error("failed to access credentials file {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// In-memory view of a credentials file
#[derive(Debug, Clone)]
pub struct CredentialStore {
    ini: Ini,
}

impl CredentialStore {
    /// Load a store from disk
    ///
    /// Values are taken verbatim: secrets and session tokens may contain
    /// characters that quote or escape handling would otherwise rewrite.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }

        let options = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..ParseOption::default()
        };

        let ini = Ini::load_from_file_opt(path, options).map_err(|e| match e {
            ini::Error::Io(source) if source.kind() == io::ErrorKind::NotFound => {
                StoreError::NotFound(path.to_path_buf())
            }
            ini::Error::Io(source) => StoreError::Io {
                path: path.to_path_buf(),
                source,
            },
            ini::Error::Parse(source) => StoreError::Parse {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let store = Self { ini };

        let mut seen = HashSet::new();
        if let Some(section) = store
            .section_names()
            .into_iter()
            .find(|name| !seen.insert(name.clone()))
        {
            return Err(StoreError::DuplicateSection {
                path: path.to_path_buf(),
                section,
            });
        }

        debug!(
            "Loaded {} section(s) from {}",
            store.section_names().len(),
            path.display()
        );
        Ok(store)
    }

    /// Write the full store to disk
    ///
    /// The content goes to a temporary file next to `path` which is then
    /// renamed over it, so a failed write leaves the previous file in place.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let io_err = |source: io::Error| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;

        let options = WriteOption {
            escape_policy: EscapePolicy::Nothing,
            kv_separator: " = ",
            ..WriteOption::default()
        };
        self.ini.write_to_opt(&mut tmp, options).map_err(io_err)?;
        tmp.flush().map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))
                .map_err(io_err)?;
        }

        tmp.persist(path).map_err(|e| io_err(e.error))?;

        debug!("Saved credentials to {}", path.display());
        Ok(())
    }

    /// Read a value, failing if the section or the key is absent
    pub fn get(&self, section: &str, key: &str) -> Result<&str, StoreError> {
        self.ini
            .section(Some(section))
            .and_then(|props| props.get(key))
            .ok_or_else(|| StoreError::MissingKey {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.ini.section(Some(section)).is_some()
    }

    pub fn has_key(&self, section: &str, key: &str) -> bool {
        self.ini
            .section(Some(section))
            .is_some_and(|props| props.contains_key(key))
    }

    /// Set a value, creating the section if needed
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ini.with_section(Some(section)).set(key, value);
    }

    /// Remove a key; returns the previous value if there was one
    pub fn remove(&mut self, section: &str, key: &str) -> Option<String> {
        self.ini
            .section_mut(Some(section))
            .and_then(|props| props.remove(key))
    }

    /// Add an empty section if it does not exist yet
    pub fn add_section(&mut self, section: &str) {
        self.ini
            .entry(Some(section.to_string()))
            .or_insert(Properties::new());
    }

    pub fn remove_section(&mut self, section: &str) -> bool {
        self.ini.delete(Some(section)).is_some()
    }

    /// Names of all named sections, in file order
    pub fn section_names(&self) -> Vec<String> {
        self.ini.sections().flatten().map(str::to_string).collect()
    }
}
