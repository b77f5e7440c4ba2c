//! Password reading functionality

use crate::error::{ErrorCategory, ErrorKind, Result, SilendaError};
use std::io::{self, BufRead, IsTerminal, Write};
use zeroize::Zeroizing;

/// Trait for reading passwords from various sources
pub trait PasswordReader {
    /// Read a password. Passwords are UTF-8 since the complexity policy
    /// is defined over characters.
    ///
    /// Returns the password wrapped in `Zeroizing` to ensure it is securely
    /// wiped from memory when dropped.
    fn read_password(&mut self) -> Result<Zeroizing<String>>;
}

/// Reads passwords from any io::BufRead source, one line per call
///
/// The line ending is not part of the password. A final line without one
/// is accepted.
pub struct ReaderPasswordReader {
    reader: Box<dyn BufRead>,
}

impl ReaderPasswordReader {
    pub fn new(reader: Box<dyn BufRead>) -> Self {
        Self { reader }
    }
}

impl PasswordReader for ReaderPasswordReader {
    fn read_password(&mut self) -> Result<Zeroizing<String>> {
        let mut data = Zeroizing::new(Vec::new());
        let n = self.reader.read_until(b'\n', &mut data).map_err(|e| {
            SilendaError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("error reading password: {}", e),
                e,
            )
        })?;
        if n == 0 {
            return Err(SilendaError::new(
                ErrorCategory::User,
                "no password left on input",
            ));
        }

        if data.ends_with(b"\n") {
            data.pop();
            if data.ends_with(b"\r") {
                data.pop();
            }
        }

        let text = std::str::from_utf8(&data).map_err(|e| {
            SilendaError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                "password is not valid UTF-8",
                e,
            )
        })?;
        Ok(Zeroizing::new(text.to_owned()))
    }
}

/// Reads a password from terminal with no echo
pub struct TerminalPasswordReader {
    prompt: &'static str,
}

impl TerminalPasswordReader {
    pub fn new(prompt: &'static str) -> Self {
        Self { prompt }
    }
}

impl Default for TerminalPasswordReader {
    fn default() -> Self {
        Self::new("Password (silenda): ")
    }
}

impl PasswordReader for TerminalPasswordReader {
    fn read_password(&mut self) -> Result<Zeroizing<String>> {
        if !io::stdin().is_terminal() {
            return Err(SilendaError::with_kind(
                ErrorCategory::User,
                ErrorKind::Io,
                "cannot read password from terminal - stdin is not a terminal",
            ));
        }

        io::stderr().write_all(self.prompt.as_bytes()).map_err(|e| {
            SilendaError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to write prompt: {}", e),
                e,
            )
        })?;
        io::stderr().flush().map_err(|e| {
            SilendaError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to flush prompt: {}", e),
                e,
            )
        })?;

        // Read password *without echo*
        let password = rpassword::read_password().map_err(|e| {
            SilendaError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failure reading password: {}", e),
                e,
            )
        })?;

        Ok(Zeroizing::new(password))
    }
}
