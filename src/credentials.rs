//! Real and fake passwords, login and lockout
//!
//! Entering the fake password, or failing to enter either password
//! [`MAX_TRIES`] times, fires the destroy trigger. Both look exactly like a
//! wrong password to the caller.

use crate::cipher::KEY_LEN;
use crate::device::DestroyTrigger;
use crate::error::{ErrorCategory, ErrorKind, Result, SilendaError};
use crate::record::{PasswordHash, PasswordRecord};
use md5::{Digest, Md5};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use zeroize::Zeroizing;

/// Failed logins after which the token is destroyed
pub const MAX_TRIES: u32 = 3;

/// Minimum number of characters in the real password
pub const MIN_PASSWORD_LEN: usize = 6;

pub struct CredentialStore {
    path: PathBuf,
    cost: u32,
    trigger: Arc<dyn DestroyTrigger>,
    state: Mutex<State>,
}

struct State {
    record: PasswordRecord,
    token: Zeroizing<[u8; KEY_LEN]>,
    tries: u32,
}

impl CredentialStore {
    /// Load the record at `path` (creating an empty one if needed).
    pub fn open(
        path: impl Into<PathBuf>,
        cost: u32,
        trigger: Arc<dyn DestroyTrigger>,
    ) -> Result<Self> {
        let path = path.into();
        let record = PasswordRecord::load_or_create(&path)?;

        Ok(Self {
            path,
            cost,
            trigger,
            state: Mutex::new(State {
                record,
                token: Zeroizing::new([0u8; KEY_LEN]),
                tries: 0,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Both passwords have been set.
    pub fn ready(&self) -> bool {
        let state = self.state();
        !state.record.fake.is_unset() && !state.record.real.is_unset()
    }

    pub fn is_logged(&self) -> bool {
        *self.state().token != [0u8; KEY_LEN]
    }

    /// Failed logins so far in this process.
    pub fn tries(&self) -> u32 {
        self.state().tries
    }

    pub fn set_fake(&self, candidate: &str) -> Result<()> {
        let mut state = self.state();
        if state.record.real.verify(candidate) {
            return Err(SilendaError::with_kind(
                ErrorCategory::User,
                ErrorKind::PasswordSameAsReal,
                "fake password is the same as the real one",
            ));
        }

        let mut record = state.record.clone();
        record.fake = PasswordHash::make(candidate, self.cost)?;
        self.commit(&mut state, record)?;
        tracing::info!("fake password updated");
        Ok(())
    }

    pub fn set_real(&self, candidate: &str) -> Result<()> {
        let mut state = self.state();
        if state.record.fake.verify(candidate) {
            return Err(SilendaError::with_kind(
                ErrorCategory::User,
                ErrorKind::PasswordSameAsFake,
                "real password is the same as the fake one",
            ));
        }
        check_complexity(candidate)?;

        let mut record = state.record.clone();
        record.real = PasswordHash::make(candidate, self.cost)?;
        self.commit(&mut state, record)?;
        tracing::info!("real password updated");
        Ok(())
    }

    /// Authenticate with `candidate`, deriving the session key on success.
    ///
    /// The fake password is checked first and wins over everything else.
    /// Every unsuccessful outcome yields the same error.
    pub fn login(&self, candidate: &str) -> Result<()> {
        let mut state = self.state();

        if state.record.fake.verify(candidate) {
            self.fire();
            return Err(login_failed());
        }

        if state.record.real.verify(candidate) {
            state.token.copy_from_slice(&Md5::digest(candidate.as_bytes()));
            tracing::info!("logged in");
            return Ok(());
        }

        // Never reset, not even by a successful login.
        state.tries += 1;
        if state.tries >= MAX_TRIES {
            self.fire();
        }
        Err(login_failed())
    }

    /// The key derived from the real password, once logged in.
    pub fn session_key(&self) -> Option<Zeroizing<[u8; KEY_LEN]>> {
        let state = self.state();
        if *state.token == [0u8; KEY_LEN] {
            return None;
        }
        Some(state.token.clone())
    }

    /// Persist `record`, then make it current.
    fn commit(&self, state: &mut State, record: PasswordRecord) -> Result<()> {
        record
            .save(&self.path)
            .map_err(|e| e.with_context("failed to update password record"))?;
        state.record = record;
        Ok(())
    }

    fn fire(&self) {
        // The outcome is not reported anywhere.
        let _ = self.trigger.destroy();
    }
}

/// At least [`MIN_PASSWORD_LEN`] characters with an uppercase letter, a
/// lowercase letter and a digit.
pub fn check_complexity(candidate: &str) -> Result<()> {
    let (mut upper, mut lower, mut digit) = (false, false, false);
    let mut count = 0;

    for c in candidate.chars() {
        count += 1;
        if c.is_uppercase() {
            upper = true;
        } else if c.is_lowercase() {
            lower = true;
        } else if c.is_numeric() {
            digit = true;
        }
    }

    if count < MIN_PASSWORD_LEN || !upper || !lower || !digit {
        return Err(SilendaError::with_kind(
            ErrorCategory::User,
            ErrorKind::PasswordTooSimple,
            format!(
                "password needs at least {} characters including an uppercase letter, \
                 a lowercase letter and a digit",
                MIN_PASSWORD_LEN
            ),
        ));
    }
    Ok(())
}

fn login_failed() -> SilendaError {
    SilendaError::with_kind(
        ErrorCategory::User,
        ErrorKind::AuthenticationFailed,
        "invalid password",
    )
}
