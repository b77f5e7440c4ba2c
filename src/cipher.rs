//! Streaming AES-128-CTR
//!
//! Every encoded stream is self-describing:
//! - iv: 16 bytes, freshly generated per call
//! - ciphertext: same length as the plaintext
//!
//! The IV is used as the initial 128-bit big-endian counter block. Nothing
//! is authenticated; integrity of the container is limited to its marker.

use crate::error::{ErrorCategory, ErrorKind, Result, SilendaError};
use aes::Aes128;
use ctr::cipher::{KeyInit, KeyIvInit, StreamCipher};
use rand::RngCore;
use rand::rngs::OsRng;
use std::io::{self, Read, Write};
use zeroize::Zeroizing;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Length of the session key in bytes
pub const KEY_LEN: usize = 16;

/// Cipher block length, which is also the IV length
pub const BLOCK_LEN: usize = 16;

/// Size of the buffer used when streaming
const CHUNK_LEN: usize = 8 * 1024;

pub struct CipherEngine {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl CipherEngine {
    /// Key a new engine. Anything but a 16-byte key is rejected.
    pub fn new(key: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = key.try_into().map_err(|_| {
            SilendaError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::CipherInit,
                format!("cipher key must be {} bytes, got {}", KEY_LEN, key.len()),
            )
        })?;
        Aes128::new_from_slice(&key).map_err(|_| {
            SilendaError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::CipherInit,
                "failed to initialize block cipher",
            )
        })?;

        Ok(Self {
            key: Zeroizing::new(key),
        })
    }

    /// Encrypt everything `input` yields into `output`, prefixed by a random IV.
    ///
    /// Returns the number of plaintext bytes consumed.
    pub fn encode<R: Read, W: Write>(&self, input: &mut R, output: &mut W) -> Result<u64> {
        let mut iv = [0u8; BLOCK_LEN];
        OsRng.fill_bytes(&mut iv);

        self.encode_with_iv(&iv, input, output)
    }

    /// Encrypt with a caller-provided IV.
    ///
    /// This function is ONLY for testing purposes to generate deterministic output.
    /// NEVER use this in production - always use `encode()` which generates a random IV.
    pub fn encode_with_iv<R: Read, W: Write>(
        &self,
        iv: &[u8; BLOCK_LEN],
        input: &mut R,
        output: &mut W,
    ) -> Result<u64> {
        let mut keystream = self.keystream(iv)?;
        output
            .write_all(iv)
            .map_err(|e| SilendaError::io("failed to write IV", e))?;

        xor_stream(&mut keystream, input, output)
    }

    /// Read an IV from `input`, then decrypt at most `limit` further bytes
    /// (everything up to end of input when `limit` is `None`).
    ///
    /// Returns the number of plaintext bytes written.
    pub fn decode<R: Read, W: Write>(
        &self,
        limit: Option<u64>,
        input: &mut R,
        output: &mut W,
    ) -> Result<u64> {
        let mut iv = [0u8; BLOCK_LEN];
        input.read_exact(&mut iv).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                SilendaError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::TruncatedInput,
                    "input likely truncated while reading IV",
                    e,
                )
            } else {
                SilendaError::io("failed to read IV", e)
            }
        })?;
        let mut keystream = self.keystream(&iv)?;

        match limit {
            Some(limit) => xor_stream(&mut keystream, &mut input.take(limit), output),
            None => xor_stream(&mut keystream, input, output),
        }
    }

    fn keystream(&self, iv: &[u8; BLOCK_LEN]) -> Result<Aes128Ctr> {
        Aes128Ctr::new_from_slices(self.key.as_slice(), iv).map_err(|_| {
            SilendaError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::CipherInit,
                "failed to initialize CTR keystream",
            )
        })
    }
}

fn xor_stream<R: Read, W: Write>(
    keystream: &mut Aes128Ctr,
    input: &mut R,
    output: &mut W,
) -> Result<u64> {
    let mut buf = Zeroizing::new(vec![0u8; CHUNK_LEN]);
    let mut total = 0u64;

    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(SilendaError::io("failed to read cipher input", e)),
        };
        keystream.apply_keystream(&mut buf[..n]);
        output
            .write_all(&buf[..n])
            .map_err(|e| SilendaError::io("failed to write cipher output", e))?;
        total += n as u64;
    }

    Ok(total)
}
