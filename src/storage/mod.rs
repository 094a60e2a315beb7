pub mod baidu;

use std::path::Path;
use thiserror::Error;

/// Extensions of the documents that get published. Everything else in the
/// watched folder is ignored.
pub const SUPPORTED_EXTENSIONS: [&str; 2] = [".docx", ".xlsx"];

/// A file or directory entry in the remote store, as returned by a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    /// Store-side id, used to request download links
    pub fs_id: u64,
    /// Bare file name (no directory part)
    pub name: String,
    /// Absolute remote path, used for deletion
    pub path: String,
    pub is_directory: bool,
    /// Creation time on the server, Unix seconds
    pub creation_timestamp: i64,
    pub size: u64,
}

impl RemoteFile {
    /// True for regular files whose name ends in a supported extension.
    pub fn is_document(&self) -> bool {
        !self.is_directory
            && SUPPORTED_EXTENSIONS
                .iter()
                .any(|ext| self.name.ends_with(ext))
    }

    /// Seconds elapsed between creation and `now`. Negative if the server
    /// clock is ahead of ours.
    pub fn age(&self, now: i64) -> i64 {
        now - self.creation_timestamp
    }

    /// Whether the file was created within `window_secs` of `now`.
    pub fn is_fresh(&self, now: i64, window_secs: u64) -> bool {
        self.age(now) <= window_secs as i64
    }

    /// Post title: the file name without directory and extension.
    pub fn title(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.name.clone())
    }
}

/// Keep only the publishable documents of a listing, in listing order.
pub fn folder_documents(files: Vec<RemoteFile>) -> Vec<RemoteFile> {
    files.into_iter().filter(RemoteFile::is_document).collect()
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: ureq::Error,
    },

    #[error("Baidu Pan API error on {endpoint}: errno {errno}")]
    Api { endpoint: String, errno: i64 },

    #[error("unexpected response from {endpoint}: {detail}")]
    Malformed { endpoint: String, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// xpan errnos meaning the access token is no longer accepted.
pub const EXPIRED_TOKEN_ERRNOS: [i64; 2] = [111, -6];

impl StorageError {
    /// Whether the call failed because the access token expired or was
    /// revoked.
    pub fn is_expired_token(&self) -> bool {
        matches!(self, StorageError::Api { errno, .. } if EXPIRED_TOKEN_ERRNOS.contains(errno))
    }
}

/// The operations the watcher needs from a remote file store.
///
/// Implementations do not filter or retry; callers decide which entries
/// matter and what to do when a call fails.
pub trait RemoteStorage {
    /// List the entries under `folder`, descending into subfolders when
    /// `recursive` is set.
    fn list(&self, folder: &str, recursive: bool) -> Result<Vec<RemoteFile>, StorageError>;

    /// Write the content of `file` to the local path `dest`.
    fn download(&self, file: &RemoteFile, dest: &Path) -> Result<(), StorageError>;

    /// Remove the remote file at `path`.
    fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// Obtain fresh credentials after a call reported an expired token.
    /// Returns false when the store has no way to renew them.
    fn renew_token(&self) -> Result<bool, StorageError> {
        Ok(false)
    }
}
