//! Runtime configuration

use crate::device::DEFAULT_TIMEOUT;
use crate::record::RECORD_FILE_NAME;
use std::path::PathBuf;
use std::time::Duration;

/// bcrypt cost for newly set passwords
pub const DEFAULT_HASH_COST: u32 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    /// Holds the password record and the temporary agent file.
    pub work_dir: PathBuf,
    /// Directory the file browser starts in.
    pub base_dir: PathBuf,
    /// Agent program for this platform, if one was supplied.
    pub agent_path: Option<PathBuf>,
    pub hash_cost: u32,
    pub device_timeout: Duration,
}

impl Config {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        Self {
            base_dir: work_dir.clone(),
            work_dir,
            agent_path: None,
            hash_cost: DEFAULT_HASH_COST,
            device_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn record_path(&self) -> PathBuf {
        self.work_dir.join(RECORD_FILE_NAME)
    }
}
