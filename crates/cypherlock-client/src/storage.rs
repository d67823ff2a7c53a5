//! The client's lock store: a directory of passphrase-sealed lock files
//! plus the cached keylist and the sealed user secret.
//!
//! Lock files are named `<validFrom>-<validTo>.oracle`. Unlocking scans the
//! directory for the first file (in name order) whose window covers "now";
//! duplicate covering files are tolerated, so lock creation never needs to
//! garbage-collect.

use std::{fs, path::PathBuf};

use cypherlock_proto::RatchetList;

use crate::LockStoreError;

const KEYLIST_FILE: &str = "keylist";
const SECRET_FILE: &str = "secret";

/// Storage backend for client data.
pub trait LockStore {
    /// Store a lock file under its window name.
    fn store_lock(&self, filename: &str, data: &[u8]) -> Result<(), LockStoreError>;

    /// Return the first stored lock whose window covers `now`.
    fn get_lock(&self, now: u64) -> Result<Vec<u8>, LockStoreError>;

    /// Cache a verified keylist.
    fn store_keylist(&self, keys: &RatchetList) -> Result<(), LockStoreError>;

    /// Read the cached keylist.
    fn get_keylist(&self) -> Result<RatchetList, LockStoreError>;

    /// Store the sealed user secret.
    fn store_secret(&self, data: &[u8]) -> Result<(), LockStoreError>;

    /// Read the sealed user secret.
    fn get_secret(&self) -> Result<Vec<u8>, LockStoreError>;
}

/// Parse a lock filename into its validity window.
pub fn parse_lock_filename(name: &str) -> Option<(u64, u64)> {
    let stem = name.strip_suffix(".oracle")?;
    let (from, to) = stem.split_once('-')?;
    if from.is_empty() || to.is_empty() || to.contains('-') {
        return None;
    }
    Some((from.parse().ok()?, to.parse().ok()?))
}

/// File-backed lock store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileLockStore {
    path: PathBuf,
}

impl FileLockStore {
    /// Create a store rooted at `path`. The directory is created on first
    /// write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileLockStore { path: path.into() }
    }

    fn write_file(&self, filename: &str, data: &[u8]) -> Result<(), LockStoreError> {
        fs::create_dir_all(&self.path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o700))?;
        }
        let file = self.path.join(filename);
        fs::write(&file, data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&file, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn read_file(&self, filename: &str) -> Result<Vec<u8>, LockStoreError> {
        Ok(fs::read(self.path.join(filename))?)
    }
}

impl LockStore for FileLockStore {
    fn store_lock(&self, filename: &str, data: &[u8]) -> Result<(), LockStoreError> {
        self.write_file(filename, data)
    }

    fn get_lock(&self, now: u64) -> Result<Vec<u8>, LockStoreError> {
        let mut names: Vec<String> = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();

        for name in names {
            if name == KEYLIST_FILE || name == SECRET_FILE {
                continue;
            }
            if let Some((valid_from, valid_to)) = parse_lock_filename(&name) {
                if valid_from <= now && now <= valid_to {
                    return self.read_file(&name);
                }
            }
        }
        Err(LockStoreError::NoMatchingLock)
    }

    fn store_keylist(&self, keys: &RatchetList) -> Result<(), LockStoreError> {
        self.write_file(KEYLIST_FILE, keys.bytes())
    }

    fn get_keylist(&self) -> Result<RatchetList, LockStoreError> {
        let data = self.read_file(KEYLIST_FILE)?;
        RatchetList::parse(&data).map_err(|_| LockStoreError::MalformedKeylist)
    }

    fn store_secret(&self, data: &[u8]) -> Result<(), LockStoreError> {
        self.write_file(SECRET_FILE, data)
    }

    fn get_secret(&self) -> Result<Vec<u8>, LockStoreError> {
        self.read_file(SECRET_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_roundtrip() {
        assert_eq!(parse_lock_filename("1000-2000.oracle"), Some((1000, 2000)));
        assert_eq!(parse_lock_filename("0-0.oracle"), Some((0, 0)));
        assert_eq!(
            parse_lock_filename(&format!("{}-{}.oracle", u64::MAX, u64::MAX)),
            Some((u64::MAX, u64::MAX))
        );
        assert_eq!(
            parse_lock_filename(&cypherlock_proto::lock_filename(77, 88)),
            Some((77, 88))
        );
    }

    #[test]
    fn malformed_filenames_are_rejected() {
        for name in [
            "keylist",
            "secret",
            "1000-2000",
            "1000.oracle",
            "-2000.oracle",
            "1000-.oracle",
            "a-b.oracle",
            "1-2-3.oracle",
            "1000-2000.oracle.bak",
        ] {
            assert_eq!(parse_lock_filename(name), None, "{name} must be rejected");
        }
    }

    #[test]
    fn get_lock_picks_a_covering_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLockStore::new(dir.path());

        store.store_lock("100-200.oracle", b"early").unwrap();
        store.store_lock("200-300.oracle", b"late").unwrap();
        store.store_keylist_raw_for_test();

        assert_eq!(store.get_lock(150).unwrap(), b"early");
        assert_eq!(store.get_lock(250).unwrap(), b"late");
        // Boundary instants are inclusive on both ends; name order decides.
        assert_eq!(store.get_lock(200).unwrap(), b"early");
        assert!(matches!(store.get_lock(50), Err(LockStoreError::NoMatchingLock)));
        assert!(matches!(store.get_lock(400), Err(LockStoreError::NoMatchingLock)));
    }

    #[test]
    fn duplicate_covering_locks_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLockStore::new(dir.path());
        store.store_lock("100-200.oracle", b"a").unwrap();
        store.store_lock("100-300.oracle", b"b").unwrap();
        // Name order: "100-200.oracle" < "100-300.oracle".
        assert_eq!(store.get_lock(150).unwrap(), b"a");
    }

    #[test]
    fn secret_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLockStore::new(dir.path());
        store.store_secret(b"sealed").unwrap();
        assert_eq!(store.get_secret().unwrap(), b"sealed");
    }

    impl FileLockStore {
        /// Drop a non-lock file into the directory so scans must skip it.
        fn store_keylist_raw_for_test(&self) {
            self.write_file(KEYLIST_FILE, b"not a lock").unwrap();
        }
    }
}
