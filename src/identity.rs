//! Active identity persistence.
//!
//! The selected user survives restarts as a small JSON file in the config
//! directory. Only the store reads and writes that file; everything else
//! receives an [`Identity`] value from the session that owns it.

use crate::api::User;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// File name of the persisted identity inside the config directory.
pub const IDENTITY_FILE: &str = "identity.json";

/// Errors from reading or writing the identity file.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Failed to access identity file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize identity: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The user every remote operation is performed on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub name: String,
}

impl Identity {
    pub fn new(user_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            user_id,
            name: name.into(),
        }
    }
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self::new(user.id, user.name.clone())
    }
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Self::new(user.id, user.name)
    }
}

/// Reads and writes the persisted identity.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    /// Store backed by `identity.json` inside `config_dir`.
    pub fn new(config_dir: &Path) -> Self {
        Self {
            path: config_dir.join(IDENTITY_FILE),
        }
    }

    /// Store backed by an explicit file path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted identity.
    ///
    /// A missing file is `Ok(None)`. A file that does not parse is logged,
    /// removed and also reported as `Ok(None)`, so a damaged file never locks
    /// the user out.
    pub fn load(&self) -> Result<Option<Identity>, IdentityError> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        match serde_json::from_slice::<Identity>(&content) {
            Ok(identity) => {
                tracing::debug!(user_id = %identity.user_id, "Loaded saved identity");
                Ok(Some(identity))
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Saved identity is corrupt, discarding"
                );
                if let Err(e) = std::fs::remove_file(&self.path) {
                    tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove corrupt identity file");
                }
                Ok(None)
            }
        }
    }

    /// Persist `identity`, or remove the file when `None`.
    pub fn save(&self, identity: Option<&Identity>) -> Result<(), IdentityError> {
        match identity {
            Some(identity) => {
                let json = serde_json::to_vec_pretty(identity)?;
                self.write_atomic(&json)
            }
            None => match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(self.io_error(e)),
            },
        }
    }

    /// Write to a randomly named sibling, sync, then rename over the target.
    fn write_atomic(&self, content: &[u8]) -> Result<(), IdentityError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let temp_path = self
            .path
            .with_extension(format!("tmp.{}", Uuid::new_v4().simple()));

        let write = || -> std::io::Result<()> {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            file.write_all(content)?;
            file.sync_all()?;
            drop(file);

            #[cfg(windows)]
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }

            std::fs::rename(&temp_path, &self.path)
        };

        write().map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            self.io_error(e)
        })
    }

    fn io_error(&self, source: std::io::Error) -> IdentityError {
        IdentityError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
