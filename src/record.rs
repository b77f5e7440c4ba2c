//! On-disk password record
//!
//! The record is exactly two bcrypt hashes, fake first, then real:
//! - fake: 60 bytes
//! - real: 60 bytes
//!
//! An all-zero hash means the password has not been set yet.

use crate::error::{ErrorCategory, ErrorKind, Result, SilendaError};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Length of a bcrypt hash string
pub const HASH_LEN: usize = 60;

/// Length of the serialized record
pub const RECORD_LEN: usize = 2 * HASH_LEN;

/// Name of the record file inside the work directory
pub const RECORD_FILE_NAME: &str = ".silenda";

#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash([u8; HASH_LEN]);

impl PasswordHash {
    pub const UNSET: Self = Self([0u8; HASH_LEN]);

    /// Hash `secret` with bcrypt at the given cost.
    pub fn make(secret: &str, cost: u32) -> Result<Self> {
        let hashed = bcrypt::hash(secret, cost).map_err(|e| {
            SilendaError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PasswordHashFailure,
                "failed to hash password",
                e,
            )
        })?;
        let bytes: [u8; HASH_LEN] = hashed.as_bytes().try_into().map_err(|_| {
            SilendaError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                format!("bcrypt produced a {}-byte hash", hashed.len()),
            )
        })?;

        Ok(Self(bytes))
    }

    /// Whether `secret` matches. An unset or malformed hash matches nothing.
    pub fn verify(&self, secret: &str) -> bool {
        if self.is_unset() {
            return false;
        }
        match std::str::from_utf8(&self.0) {
            Ok(hashed) => bcrypt::verify(secret, hashed).unwrap_or(false),
            Err(_) => false,
        }
    }

    pub fn is_unset(&self) -> bool {
        *self == Self::UNSET
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

impl Default for PasswordHash {
    fn default() -> Self {
        Self::UNSET
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unset() {
            f.write_str("PasswordHash(unset)")
        } else {
            f.write_str("PasswordHash(..)")
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordRecord {
    pub fake: PasswordHash,
    pub real: PasswordHash,
}

impl PasswordRecord {
    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[..HASH_LEN].copy_from_slice(self.fake.as_bytes());
        out[HASH_LEN..].copy_from_slice(self.real.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != RECORD_LEN {
            return Err(SilendaError::with_kind(
                ErrorCategory::User,
                ErrorKind::RecordCorrupt,
                format!(
                    "password record is {} bytes, expected {}",
                    bytes.len(),
                    RECORD_LEN
                ),
            ));
        }
        let mut fake = [0u8; HASH_LEN];
        let mut real = [0u8; HASH_LEN];
        fake.copy_from_slice(&bytes[..HASH_LEN]);
        real.copy_from_slice(&bytes[HASH_LEN..]);

        Ok(Self {
            fake: PasswordHash(fake),
            real: PasswordHash(real),
        })
    }

    /// Read the record at `path`, creating an empty one if there is none.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => Self::from_bytes(&bytes)
                .map_err(|e| e.with_context(format!("failed to load {}", path.display()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let record = Self::default();
                record.save(path)?;
                tracing::info!(path = %path.display(), "created empty password record");
                Ok(record)
            }
            Err(e) => Err(SilendaError::io(
                format!("failed to read from {}", path.display()),
                e,
            )),
        }
    }

    /// Replace the record at `path` atomically (tempfile + fsync + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut temp_file = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| SilendaError::io("failed to create tempfile", e))?;

        temp_file
            .write_all(&self.to_bytes())
            .map_err(|e| SilendaError::io("failed to write to tempfile", e))?;
        // Flush and fsync() such that the rename later, if it succeeds, will
        // always point to a complete record.
        temp_file
            .flush()
            .map_err(|e| SilendaError::io("failed to flush tempfile", e))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| SilendaError::io("failed to sync file prior to rename", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            temp_file
                .as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|e| SilendaError::io("failed to set tempfile permissions", e))?;
        }

        temp_file.persist(path).map_err(|e| {
            let msg = format!("failed to rename to target file {}", path.display());
            SilendaError::io(msg, e.error)
        })?;
        Ok(())
    }
}
