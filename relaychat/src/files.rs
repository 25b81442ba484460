//! Local storage for received private files.
//!
//! Layout under the shared root (default `./shared`):
//!
//! ```text
//! shared/
//!   <sender>/
//!     <stem>-<yyyy-MM-dd_HH_mm_ss>-encrypted.<ext>
//!     <stem>-<yyyy-MM-dd_HH_mm_ss>-decrypted.<ext>
//! ```

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local};

/// Timestamp layout used in stored file names.
pub const FILE_TIME_FORMAT: &str = "%Y-%m-%d_%H_%M_%S";

/// Extension used when the original name has none.
const DEFAULT_EXTENSION: &str = "bin";

/// Errors from shared-directory operations.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    /// The sender name cannot be used as a directory name.
    #[error("sender name {0:?} is not a valid directory name")]
    InvalidSender(String),

    /// A filesystem call failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Paths written for one received file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Ciphertext as received.
    pub encrypted: PathBuf,
    /// Decrypted contents.
    pub decrypted: PathBuf,
}

/// Root directory for received files.
#[derive(Debug, Clone)]
pub struct SharedDir {
    root: PathBuf,
}

impl SharedDir {
    /// Use `root` as the shared directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The shared root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the shared root if it does not exist.
    ///
    /// # Errors
    ///
    /// [`FileError::Io`] if the directory cannot be created.
    pub async fn ensure(&self) -> Result<(), FileError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| FileError::Io {
                path: self.root.clone(),
                source,
            })
    }

    /// Directory for files received from `sender`.
    ///
    /// # Errors
    ///
    /// [`FileError::InvalidSender`] if `sender` is empty or is anything
    /// other than a single plain path component.
    pub fn sender_dir(&self, sender: &str) -> Result<PathBuf, FileError> {
        let mut components = Path::new(sender).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if name == sender => Ok(self.root.join(name)),
            _ => Err(FileError::InvalidSender(sender.to_string())),
        }
    }

    /// Write both halves of a received file into the sender's directory.
    ///
    /// # Errors
    ///
    /// [`FileError`] if the sender is invalid or a write fails. The
    /// encrypted copy may exist even if writing the decrypted copy failed.
    pub async fn store_received(
        &self,
        sender: &str,
        file_name: &str,
        encrypted: &[u8],
        decrypted: &[u8],
        at: DateTime<Local>,
    ) -> Result<StoredFile, FileError> {
        let dir = self.sender_dir(sender)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| FileError::Io {
                path: dir.clone(),
                source,
            })?;

        let (encrypted_name, decrypted_name) = stored_names(file_name, at);
        let stored = StoredFile {
            encrypted: dir.join(encrypted_name),
            decrypted: dir.join(decrypted_name),
        };
        write(&stored.encrypted, encrypted).await?;
        write(&stored.decrypted, decrypted).await?;
        Ok(stored)
    }
}

async fn write(path: &Path, contents: &[u8]) -> Result<(), FileError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| FileError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Final path component of a peer-supplied file name, falling back to
/// `"file"` when nothing usable remains.
#[must_use]
pub fn display_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("file")
        .to_string()
}

fn stored_names(file_name: &str, at: DateTime<Local>) -> (String, String) {
    let name = display_name(file_name);
    let path = Path::new(&name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or(DEFAULT_EXTENSION);
    let ts = at.format(FILE_TIME_FORMAT);
    (
        format!("{stem}-{ts}-encrypted.{ext}"),
        format!("{stem}-{ts}-decrypted.{ext}"),
    )
}
