//! Platform-specific capabilities, selected once at startup

use crate::error::{ErrorCategory, ErrorKind, Result, SilendaError};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

pub trait Platform: Send + Sync {
    /// Whether `name` inside `dir` should be left out of listings.
    fn is_hidden(&self, dir: &Path, name: &OsStr) -> bool;

    /// The executable image of the hardware agent for this platform.
    fn agent_payload(&self) -> Result<Vec<u8>>;
}

/// The platform the process is running on
///
/// The agent image is supplied from outside (a file path chosen at startup)
/// rather than compiled into the binary.
#[derive(Debug, Clone, Default)]
pub struct HostPlatform {
    agent_path: Option<PathBuf>,
}

impl HostPlatform {
    pub fn new(agent_path: Option<PathBuf>) -> Self {
        Self { agent_path }
    }
}

impl Platform for HostPlatform {
    fn is_hidden(&self, dir: &Path, name: &OsStr) -> bool {
        is_hidden(dir, name)
    }

    fn agent_payload(&self) -> Result<Vec<u8>> {
        let supported = cfg!(any(
            target_os = "linux",
            target_os = "macos",
            target_os = "windows"
        ));
        let path = match &self.agent_path {
            Some(path) if supported => path,
            _ => {
                return Err(SilendaError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::DeviceUnsupported,
                    "unsupported platform",
                ));
            }
        };

        fs::read(path).map_err(|e| {
            SilendaError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::DeviceUnsupported,
                format!("failed to read agent {}", path.display()),
                e,
            )
        })
    }
}

#[cfg(windows)]
fn is_hidden(dir: &Path, name: &OsStr) -> bool {
    use std::os::windows::fs::MetadataExt;

    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;

    match fs::metadata(dir.join(name)) {
        Ok(meta) => meta.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0,
        // Unreadable entries are not worth showing.
        Err(_) => true,
    }
}

#[cfg(not(windows))]
fn is_hidden(_dir: &Path, name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    #[cfg(unix)]
    fn test_dot_files_are_hidden() {
        let platform = HostPlatform::default();
        let dir = Path::new("/tmp");

        assert!(platform.is_hidden(dir, OsStr::new(".silenda")));
        assert!(!platform.is_hidden(dir, OsStr::new("notes.txt")));
    }

    #[test]
    fn test_no_agent_is_unsupported() {
        let err = HostPlatform::new(None).agent_payload().unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::DeviceUnsupported));
    }

    #[test]
    fn test_missing_agent_file_is_unsupported() {
        let temp_dir = TempDir::new().unwrap();
        let platform = HostPlatform::new(Some(temp_dir.path().join("agent")));

        let err = platform.agent_payload().unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::DeviceUnsupported));
    }

    #[test]
    #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
    fn test_agent_payload_read_from_path() {
        let temp_dir = TempDir::new().unwrap();
        let agent = temp_dir.path().join("agent");
        fs::write(&agent, b"\x7fELF").unwrap();

        let platform = HostPlatform::new(Some(agent));
        assert_eq!(platform.agent_payload().unwrap(), b"\x7fELF");
    }
}
