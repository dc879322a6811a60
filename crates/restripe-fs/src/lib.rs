//! # restripe-fs
//!
//! Filesystem primitives used by the restripe rewrite-in-place engine.
//!
//! ## Artifact Naming
//!
//! ```text
//! data/video.mkv            # original
//! data/video.mkv.balance    # in-flight copy, owned by one replace operation
//! data/video.mkv.recovered  # emergency copy after a failed commit rename
//! ```
//!
//! The `.balance` suffix is reserved: files bearing it are never rebalance
//! targets and are the only thing stale-cleanup scans ever delete.

pub mod attrs;
pub mod checksum;
pub mod copy;
pub mod platform;
pub mod walk;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub use attrs::{AttributeMismatch, AttributeSnapshot};
pub use checksum::{ChecksumAlgorithm, ChecksumError, Digester};
pub use copy::copy_file;
pub use platform::{FileIdentity, Ownership};
pub use walk::{find_temp_artifacts, gather_regular_files};

/// Suffix of the sibling file holding an in-progress copy.
pub const TEMP_SUFFIX: &str = ".balance";

/// Suffix used when the commit rename fails after the original was removed.
pub const RECOVERY_SUFFIX: &str = ".recovered";

/// `<path>.balance`
pub fn temp_path_for(path: &Path) -> PathBuf {
    with_suffix(path, TEMP_SUFFIX)
}

/// `<path>.recovered`
pub fn recovery_path_for(path: &Path) -> PathBuf {
    with_suffix(path, RECOVERY_SUFFIX)
}

/// True when `path` is one of our own in-flight copies.
pub fn is_temp_artifact(path: &Path) -> bool {
    path.as_os_str()
        .to_string_lossy()
        .ends_with(TEMP_SUFFIX)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    // Append to the raw OsStr so non-UTF-8 names survive.
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_and_recovery_paths() {
        let p = Path::new("/data/movies/a.mkv");
        assert_eq!(temp_path_for(p), PathBuf::from("/data/movies/a.mkv.balance"));
        assert_eq!(
            recovery_path_for(p),
            PathBuf::from("/data/movies/a.mkv.recovered")
        );
    }

    #[test]
    fn test_is_temp_artifact() {
        assert!(is_temp_artifact(Path::new("/x/y.txt.balance")));
        assert!(is_temp_artifact(Path::new(".balance")));
        assert!(!is_temp_artifact(Path::new("/x/y.txt")));
        assert!(!is_temp_artifact(Path::new("/x/y.balance.txt")));
        assert!(!is_temp_artifact(Path::new("/x/y.txt.recovered")));
    }

    #[cfg(unix)]
    #[test]
    fn test_suffix_preserves_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let raw = OsStr::from_bytes(b"/tmp/bad\xffname");
        let temp = temp_path_for(Path::new(raw));
        assert!(temp.as_os_str().as_bytes().ends_with(b"\xffname.balance"));
    }
}
