//! Overwrite-then-truncate for superseded files
//!
//! The caller still owns the file and is responsible for unlinking it.

use crate::error::{Result, SilendaError};
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

/// Size of each zero-fill write
const WIPE_CHUNK_LEN: usize = 64 * 1024;

/// Length the file is left at after wiping
const WIPED_LEN: u64 = 1;

/// Overwrite every byte of `file` with zeros, truncate it and sync it to disk.
pub fn wipe_file(file: &mut File) -> Result<()> {
    file.seek(SeekFrom::Start(0))
        .map_err(|e| SilendaError::io("failed to seek to start of file", e))?;
    let size = file
        .metadata()
        .map_err(|e| SilendaError::io("failed to stat file", e))?
        .len();

    let zeros = vec![0u8; WIPE_CHUNK_LEN];
    let mut remaining = size;
    while remaining > 0 {
        let n = remaining.min(WIPE_CHUNK_LEN as u64) as usize;
        file.write_all(&zeros[..n])
            .map_err(|e| SilendaError::io("failed to overwrite file", e))?;
        remaining -= n as u64;
    }
    file.flush()
        .map_err(|e| SilendaError::io("failed to flush overwritten file", e))?;
    // Push the zeros out before the truncate can drop the blocks.
    file.sync_data()
        .map_err(|e| SilendaError::io("failed to sync overwritten file", e))?;

    file.set_len(WIPED_LEN)
        .map_err(|e| SilendaError::io("failed to truncate file", e))?;
    file.sync_all()
        .map_err(|e| SilendaError::io("failed to sync truncated file", e))?;

    tracing::debug!(bytes = size, "wiped file");
    Ok(())
}
