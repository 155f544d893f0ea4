//! Write-once local archive for removed attachments.
//!
//! Layout: `<root>/<owner>/<fingerprint>-<filename>`, where the fingerprint is
//! the hex of the first three bytes of the SHA-256 of the content. A second
//! write of the same (owner, content, filename) is a no-op.

use std::fs::{self, File, FileTimes, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::StorageError;
use crate::model::message::UNKNOWN_OWNER;

/// Number of digest bytes used as a filename prefix.
const FINGERPRINT_BYTES: usize = 3;

/// Longest owner directory name we create.
const MAX_OWNER_LEN: usize = 200;

/// Content-addressed attachment archive rooted at a fixed directory.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist `bytes` for `owner` under `filename`, stamped with `timestamp`.
    ///
    /// Returns the archive path, whether it was just written or already there.
    pub fn persist(
        &self,
        bytes: &[u8],
        owner: &str,
        filename: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<PathBuf, StorageError> {
        let base = base_name(filename)
            .ok_or_else(|| StorageError::EmptyFilename(filename.to_string()))?;

        let dir = self.root.join(sanitize_owner(owner));
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;

        let path = dir.join(format!("{}-{base}", fingerprint(bytes)));

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn!(path = %path.display(), "Attachment already exists, not overwriting");
                return Ok(path);
            }
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        file.write_all(bytes)
            .and_then(|()| file.flush())
            .map_err(|e| StorageError::io(&path, e))?;

        set_file_times(&file, &path, timestamp);
        info!(path = %path.display(), size = bytes.len(), "Saved attachment");
        Ok(path)
    }
}

/// Hex of the leading digest bytes of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest[..FINGERPRINT_BYTES]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Last path component of `filename`, accepting both `/` and `\` separators.
///
/// Control characters are replaced with `_`. Returns `None` when nothing
/// usable remains (`""`, `"dir/"`, `".."`).
fn base_name(filename: &str) -> Option<String> {
    let last = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if last.is_empty() || last == "." || last == ".." {
        return None;
    }
    Some(
        last.chars()
            .map(|c| if c.is_control() { '_' } else { c })
            .collect(),
    )
}

/// Directory name for an owner address.
fn sanitize_owner(owner: &str) -> String {
    let sanitized: String = owner
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '@' || c == '+' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_OWNER_LEN)
        .collect();

    if sanitized.chars().all(|c| c == '.') {
        UNKNOWN_OWNER.to_string()
    } else {
        sanitized
    }
}

/// Stamp access and modification times. Failure is not fatal.
fn set_file_times(file: &File, path: &Path, timestamp: DateTime<Utc>) {
    let time = SystemTime::from(timestamp);
    let times = FileTimes::new().set_accessed(time).set_modified(time);
    if let Err(e) = file.set_times(times) {
        warn!(path = %path.display(), error = %e, "Could not set attachment timestamps");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fingerprint_is_three_bytes_of_sha256() {
        // SHA-256("abc") = ba7816bf...
        assert_eq!(fingerprint(b"abc"), "ba7816");
    }

    #[test]
    fn test_base_name_strips_directories() {
        assert_eq!(base_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(base_name("C:\\Users\\x\\a.pdf").as_deref(), Some("a.pdf"));
        assert_eq!(base_name("report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(base_name("tab\there.txt").as_deref(), Some("tab_here.txt"));
    }

    #[test]
    fn test_base_name_rejects_empty() {
        assert_eq!(base_name(""), None);
        assert_eq!(base_name("dir/"), None);
        assert_eq!(base_name("a/.."), None);
    }

    #[test]
    fn test_sanitize_owner() {
        assert_eq!(sanitize_owner("user@example.com"), "user@example.com");
        assert_eq!(sanitize_owner("a/b@x.org"), "a_b@x.org");
        assert_eq!(sanitize_owner(".."), UNKNOWN_OWNER);
        assert_eq!(sanitize_owner(""), UNKNOWN_OWNER);
    }

    #[test]
    fn test_persist_sets_modification_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(dir.path());
        let when = Utc.with_ymd_and_hms(2020, 5, 17, 8, 30, 0).unwrap();

        let path = store.persist(b"data", "a@b.c", "x.bin", when).unwrap();
        let modified = fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(modified, SystemTime::from(when));
        assert!(path.starts_with(dir.path().join("a@b.c")));
    }

    #[test]
    fn test_persist_empty_filename_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(dir.path());
        let err = store.persist(b"data", "a@b.c", "/", Utc::now()).unwrap_err();
        assert!(matches!(err, StorageError::EmptyFilename(_)));
    }
}
