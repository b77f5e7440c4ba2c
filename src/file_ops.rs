//! In-place file encoding and decoding
//!
//! A container replaces the plaintext file in the same directory:
//! - marker: 8 bytes
//! - name length: 2 bytes (little-endian u16), covering the IV of the name block too
//! - name block: IV + encrypted original file name
//! - content block: IV + encrypted file content, to end of file
//!
//! Superseded files are wiped before they are unlinked.

use crate::cipher::{BLOCK_LEN, CipherEngine};
use crate::error::{ErrorCategory, ErrorKind, Result, SilendaError};
use crate::wipe::wipe_file;
use std::ffi::{OsStr, OsString};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

/// Magic bytes at the start of every container
pub const MARKER: [u8; 8] = [0xd7, 0x21, 0xa6, 0xfa, 0xa1, 0x15, 0x2d, 0xc8];

/// Marker plus the name-block length
const HEADER_LEN: usize = MARKER.len() + 2;

/// Suffix given to freshly created containers
const CONTAINER_SUFFIX: &str = ".sl";

/// Encode the file at `path` into a new container beside it
///
/// The original is wiped and removed only after the container has been
/// fully written, synced and persisted. Returns the container path.
pub fn encode_file(engine: &CipherEngine, path: &Path) -> Result<PathBuf> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| open_error(path, e))?;
    let dir = parent_dir(path);
    let name = path.file_name().ok_or_else(|| {
        SilendaError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidFileName,
            format!("{} has no file name", path.display()),
        )
    })?;

    let mut name_block = Vec::new();
    engine.encode(&mut &name_to_bytes(name)?[..], &mut name_block)?;
    let name_len = u16::try_from(name_block.len()).map_err(|_| {
        SilendaError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidFileName,
            "file name too long to encode",
        )
    })?;

    let mut temp = tempfile::Builder::new()
        .prefix("")
        .suffix(CONTAINER_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| SilendaError::io("failed to create container file", e))?;
    {
        let mut out = BufWriter::new(temp.as_file_mut());
        out.write_all(&MARKER)
            .and_then(|()| out.write_all(&name_len.to_le_bytes()))
            .and_then(|()| out.write_all(&name_block))
            .map_err(|e| SilendaError::io("failed to write container header", e))?;
        engine
            .encode(&mut BufReader::new(&file), &mut out)
            .map_err(|e| e.with_context(format!("failed to encode {}", path.display())))?;
        out.flush()
            .map_err(|e| SilendaError::io("failed to flush container", e))?;
    }
    // The container must be durable before the plaintext goes away.
    temp.as_file()
        .sync_all()
        .map_err(|e| SilendaError::io("failed to sync container", e))?;
    let (_, container) = temp.keep().map_err(|e| {
        SilendaError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to keep container file",
            e,
        )
    })?;

    discard_original(file, path, &container)?;

    tracing::debug!(container = %container.display(), "encoded file");
    Ok(container)
}

/// Decode the container at `path`, restoring the original file beside it
///
/// The container is wiped and removed only after the plaintext has been
/// fully written. Returns the recovered file name.
pub fn decode_file(engine: &CipherEngine, path: &Path) -> Result<Vec<u8>> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| open_error(path, e))?;
    let dir = parent_dir(path);

    let name = {
        let mut reader = BufReader::new(&file);
        let name = read_name(engine, &mut reader)
            .map_err(|e| e.with_context(format!("failed to decode {}", path.display())))?;
        let dest = dir.join(checked_file_name(&name)?);

        let out = create_secure(&dest)?;
        if let Err(e) = write_plaintext(engine, &mut reader, &out) {
            drop(out);
            // Nothing else can have written here, we created it.
            let _ = fs::remove_file(&dest);
            return Err(e.with_context(format!("failed to decode {}", path.display())));
        }
        name
    };

    wipe_file(&mut file)?;
    drop(file);
    fs::remove_file(path)
        .map_err(|e| SilendaError::io(format!("failed to remove {}", path.display()), e))?;

    tracing::debug!(container = %path.display(), "decoded file");
    Ok(name)
}

/// Recover the original file name without modifying the container
pub fn decode_file_name(engine: &CipherEngine, path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| open_error(path, e))?;
    read_name(engine, &mut BufReader::new(file))
        .map_err(|e| e.with_context(format!("failed to decode name of {}", path.display())))
}

fn read_name<R: Read>(engine: &CipherEngine, reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut header)
        .map_err(|e| truncated_or_io("header", e))?;

    if header[..MARKER.len()] != MARKER {
        return Err(SilendaError::with_kind(
            ErrorCategory::User,
            ErrorKind::MarkerMismatch,
            "input unrecognized as silenda container",
        ));
    }

    let name_len = u16::from_le_bytes([header[MARKER.len()], header[MARKER.len() + 1]]) as usize;
    if name_len < BLOCK_LEN {
        return Err(SilendaError::with_kind(
            ErrorCategory::User,
            ErrorKind::TruncatedInput,
            "name block shorter than its IV",
        ));
    }

    let mut name = Vec::new();
    engine.decode(Some((name_len - BLOCK_LEN) as u64), reader, &mut name)?;
    if name.len() != name_len - BLOCK_LEN {
        return Err(SilendaError::with_kind(
            ErrorCategory::User,
            ErrorKind::TruncatedInput,
            "input likely truncated while reading file name",
        ));
    }

    Ok(name)
}

/// Wipe and unlink the plaintext whose container already exists at `container`.
fn discard_original(mut file: File, path: &Path, container: &Path) -> Result<()> {
    let leftover = |e: SilendaError| {
        e.with_context(format!(
            "container {} written but {} was not removed",
            container.display(),
            path.display()
        ))
    };

    wipe_file(&mut file).map_err(&leftover)?;
    drop(file);
    fs::remove_file(path).map_err(|e| {
        leftover(SilendaError::io(
            format!("failed to remove {}", path.display()),
            e,
        ))
    })
}

fn write_plaintext<R: Read>(engine: &CipherEngine, reader: &mut R, out: &File) -> Result<()> {
    let mut writer = BufWriter::new(out);
    engine.decode(None, reader, &mut writer)?;
    writer
        .flush()
        .map_err(|e| SilendaError::io("failed to flush decoded file", e))?;
    out.sync_all()
        .map_err(|e| SilendaError::io("failed to sync decoded file", e))
}

/// Create a new file with mode 0o600 on Unix, refusing to replace an existing one
fn create_secure(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options
        .open(path)
        .map_err(|e| SilendaError::io(format!("failed to create {}", path.display()), e))
}

/// Accept only names that stay inside the container's directory
fn checked_file_name(name: &[u8]) -> Result<OsString> {
    let os_name = bytes_to_name(name)?;
    let mut components = Path::new(&os_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(c)), None) if c == os_name.as_os_str() => Ok(os_name),
        _ => Err(SilendaError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidFileName,
            "container holds an unusable file name",
        )),
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

#[cfg(unix)]
fn name_to_bytes(name: &OsStr) -> Result<Vec<u8>> {
    use std::os::unix::ffi::OsStrExt;
    Ok(name.as_bytes().to_vec())
}

#[cfg(not(unix))]
fn name_to_bytes(name: &OsStr) -> Result<Vec<u8>> {
    name.to_str()
        .map(|s| s.as_bytes().to_vec())
        .ok_or_else(|| {
            SilendaError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidFileName,
                "file name is not valid unicode",
            )
        })
}

#[cfg(unix)]
fn bytes_to_name(name: &[u8]) -> Result<OsString> {
    use std::os::unix::ffi::OsStrExt;
    Ok(OsStr::from_bytes(name).to_os_string())
}

#[cfg(not(unix))]
fn bytes_to_name(name: &[u8]) -> Result<OsString> {
    String::from_utf8(name.to_vec())
        .map(OsString::from)
        .map_err(|e| {
            SilendaError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::InvalidFileName,
                "container holds a non-unicode file name",
                e,
            )
        })
}

fn truncated_or_io(what: &str, err: io::Error) -> SilendaError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        SilendaError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::TruncatedInput,
            format!("input likely truncated while reading {}", what),
            err,
        )
    } else {
        SilendaError::io(format!("failed to read {}", what), err)
    }
}

fn open_error(path: &Path, err: io::Error) -> SilendaError {
    SilendaError::io(format!("failed to open {}", path.display()), err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine() -> CipherEngine {
        CipherEngine::new(&[0x5au8; 16]).unwrap()
    }

    fn only_entry(dir: &Path) -> PathBuf {
        let entries: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1, "expected one entry, got {:?}", entries);
        entries.into_iter().next().unwrap()
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("notes.txt");
        let content = b"Hello, silenda!";
        fs::write(&plain_path, content).unwrap();

        let engine = engine();
        let container = encode_file(&engine, &plain_path).unwrap();
        assert!(!plain_path.exists());
        assert!(container.exists());
        assert_eq!(container.parent(), Some(temp_dir.path()));
        assert_eq!(fs::read(&container).unwrap()[..MARKER.len()], MARKER);

        let name = decode_file(&engine, &container).unwrap();
        assert_eq!(name, b"notes.txt");
        assert!(!container.exists());
        assert_eq!(fs::read(&plain_path).unwrap(), content);
    }

    #[test]
    fn test_empty_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("empty");
        fs::write(&plain_path, b"").unwrap();

        let engine = engine();
        let container = encode_file(&engine, &plain_path).unwrap();
        decode_file(&engine, &container).unwrap();

        assert_eq!(fs::read(&plain_path).unwrap(), b"");
    }

    #[test]
    fn test_large_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("large.bin");
        let content: Vec<u8> = (0..300_000u32).map(|i| (i % 253) as u8).collect();
        fs::write(&plain_path, &content).unwrap();

        let engine = engine();
        let container = encode_file(&engine, &plain_path).unwrap();
        decode_file(&engine, &container).unwrap();

        assert_eq!(fs::read(&plain_path).unwrap(), content);
    }

    #[test]
    fn test_name_length_counts_iv() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("abc");
        fs::write(&plain_path, b"xyz").unwrap();

        let container = encode_file(&engine(), &plain_path).unwrap();
        let bytes = fs::read(&container).unwrap();

        let name_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!(name_len, BLOCK_LEN + 3);
        assert_eq!(bytes.len(), HEADER_LEN + name_len + BLOCK_LEN + 3);
    }

    #[test]
    fn test_same_content_encodes_differently() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine();

        let first = temp_dir.path().join("a");
        fs::create_dir(&first).unwrap();
        fs::write(first.join("same.txt"), b"identical content").unwrap();
        let c1 = fs::read(encode_file(&engine, &first.join("same.txt")).unwrap()).unwrap();

        let second = temp_dir.path().join("b");
        fs::create_dir(&second).unwrap();
        fs::write(second.join("same.txt"), b"identical content").unwrap();
        let c2 = fs::read(encode_file(&engine, &second.join("same.txt")).unwrap()).unwrap();

        assert_eq!(c1.len(), c2.len());
        assert_eq!(c1[..HEADER_LEN], c2[..HEADER_LEN]);
        assert_ne!(c1[HEADER_LEN..], c2[HEADER_LEN..]);
    }

    #[test]
    fn test_decode_file_name_is_non_destructive() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("report.pdf");
        fs::write(&plain_path, b"%PDF").unwrap();

        let engine = engine();
        let container = encode_file(&engine, &plain_path).unwrap();
        let before = fs::read(&container).unwrap();

        assert_eq!(decode_file_name(&engine, &container).unwrap(), b"report.pdf");
        assert_eq!(fs::read(&container).unwrap(), before);
        assert!(!plain_path.exists());
    }

    #[test]
    fn test_corrupt_marker_fails_without_side_effects() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("keep.txt");
        fs::write(&plain_path, b"content").unwrap();

        let engine = engine();
        let container = encode_file(&engine, &plain_path).unwrap();
        let mut bytes = fs::read(&container).unwrap();
        bytes[0] ^= 0xff;
        fs::write(&container, &bytes).unwrap();

        let err = decode_file_name(&engine, &container).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::MarkerMismatch));

        let err = decode_file(&engine, &container).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::MarkerMismatch));
        assert_eq!(fs::read(&container).unwrap(), bytes);
        assert_eq!(only_entry(temp_dir.path()), container);
    }

    #[test]
    fn test_truncated_header() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("short.sl");
        fs::write(&path, &MARKER[..5]).unwrap();

        let err = decode_file(&engine(), &path).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::TruncatedInput));
        assert!(path.exists());
    }

    #[test]
    fn test_name_block_shorter_than_iv() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.sl");
        let mut bytes = MARKER.to_vec();
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 64]);
        fs::write(&path, &bytes).unwrap();

        let err = decode_file_name(&engine(), &path).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::TruncatedInput));
    }

    #[test]
    fn test_rejects_name_escaping_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("evil.sl");
        let engine = engine();

        let mut name_block = Vec::new();
        engine
            .encode(&mut &b"../escaped.txt"[..], &mut name_block)
            .unwrap();
        let mut bytes = MARKER.to_vec();
        bytes.extend_from_slice(&(name_block.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&name_block);
        engine.encode(&mut &b"payload"[..], &mut bytes).unwrap();
        fs::write(&path, &bytes).unwrap();

        let err = decode_file(&engine, &path).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::InvalidFileName));
        assert!(path.exists());
        assert!(!temp_dir.path().parent().unwrap().join("escaped.txt").exists());
    }

    #[test]
    fn test_decode_refuses_to_overwrite_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("dup.txt");
        fs::write(&plain_path, b"old").unwrap();

        let engine = engine();
        let container = encode_file(&engine, &plain_path).unwrap();
        fs::write(&plain_path, b"newer").unwrap();

        let err = decode_file(&engine, &container).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::Io));
        assert!(container.exists());
        assert_eq!(fs::read(&plain_path).unwrap(), b"newer");
    }

    #[test]
    #[cfg(unix)]
    fn test_cleanup_failure_names_container() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("plain.txt");
        let container = temp_dir.path().join("kept.sl");
        fs::write(&path, "secret").unwrap();
        let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        fs::remove_file(&path).unwrap();

        let err = discard_original(file, &path, &container).unwrap_err();

        assert!(err.message().contains(&container.display().to_string()));
        assert!(err.message().contains(&path.display().to_string()));
        assert_eq!(err.category, ErrorCategory::User);
    }

    #[test]
    fn test_encode_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.txt");

        let err = encode_file(&engine(), &missing).unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::Io));
        assert_eq!(err.category, ErrorCategory::User);
        assert!(fs::read_dir(temp_dir.path()).unwrap().next().is_none());
    }
}
