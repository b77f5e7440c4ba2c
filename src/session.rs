//! Typed operations for the front end
//!
//! A [`Session`] lives for one run of the application and owns all mutable
//! state: the credential store and, after login, the cipher engine.

use crate::cipher::CipherEngine;
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::device::{AgentTrigger, DestroyTrigger};
use crate::error::{ErrorCategory, ErrorKind, Result, SilendaError};
use crate::file_ops;
use crate::platform::{HostPlatform, Platform};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const UNKNOWN_ERROR: &str = "unknown error";
pub const PERMISSION_ERROR: &str = "permission denied";
pub const PASSWORD_ERROR: &str = "invalid password";
pub const PASSWORD_SAME: &str = "real and fake passwords are the same";
pub const PASSWORD_SIMPLE: &str = "password is too simple";
pub const NOT_LOGGED_IN: &str = "not logged in";
pub const NO_DEVICE: &str = "silenda device not found";

/// Visible entries of a directory, names sorted
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Listing {
    pub dirs: Vec<String>,
    pub files: Vec<String>,
}

pub struct Session {
    config: Config,
    platform: Arc<dyn Platform>,
    trigger: Arc<dyn DestroyTrigger>,
    store: CredentialStore,
    engine: Mutex<Option<CipherEngine>>,
}

impl Session {
    /// Set up a session for the host platform.
    pub fn open(config: Config) -> Result<Self> {
        let platform: Arc<dyn Platform> = Arc::new(HostPlatform::new(config.agent_path.clone()));
        let trigger: Arc<dyn DestroyTrigger> = Arc::new(
            AgentTrigger::new(platform.clone(), &config.work_dir)
                .with_timeout(config.device_timeout),
        );
        Self::with_parts(config, platform, trigger)
    }

    pub fn with_parts(
        config: Config,
        platform: Arc<dyn Platform>,
        trigger: Arc<dyn DestroyTrigger>,
    ) -> Result<Self> {
        let store = CredentialStore::open(config.record_path(), config.hash_cost, trigger.clone())?;

        Ok(Self {
            config,
            platform,
            trigger,
            store,
            engine: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ready(&self) -> bool {
        self.store.ready()
    }

    pub fn is_logged(&self) -> bool {
        self.store.is_logged() && self.engine().is_some()
    }

    pub fn set_fake(&self, password: &str) -> Result<()> {
        self.store.set_fake(password)
    }

    pub fn set_real(&self, password: &str) -> Result<()> {
        self.store.set_real(password)
    }

    pub fn login(&self, password: &str) -> Result<()> {
        self.store.login(password)?;
        let key = self.store.session_key().ok_or_else(|| {
            SilendaError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "logged in without a session key",
            )
        })?;
        *self.engine() = Some(CipherEngine::new(&key[..])?);
        Ok(())
    }

    /// Succeeds iff a hardware token is attached.
    pub fn has_device(&self) -> Result<()> {
        self.trigger.probe()
    }

    /// Returns the path of the new container.
    pub fn encode_file(&self, path: &Path) -> Result<PathBuf> {
        self.with_engine(|engine| file_ops::encode_file(engine, path))
    }

    /// Returns the restored file name.
    pub fn decode_file(&self, path: &Path) -> Result<String> {
        let name = self.with_engine(|engine| file_ops::decode_file(engine, path))?;
        Ok(String::from_utf8_lossy(&name).into_owned())
    }

    /// Returns the file name stored in a container, leaving it untouched.
    pub fn decode_file_name(&self, path: &Path) -> Result<String> {
        let name = self.with_engine(|engine| file_ops::decode_file_name(engine, path))?;
        String::from_utf8(name).map_err(|e| {
            SilendaError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::InvalidFileName,
                "stored file name is not valid UTF-8",
                e,
            )
        })
    }

    pub fn list_dir(&self, dir: &Path) -> Result<Listing> {
        let entries = fs::read_dir(dir)
            .map_err(|e| SilendaError::io(format!("failed to list {}", dir.display()), e))?;

        let mut listing = Listing::default();
        for entry in entries {
            let entry = entry
                .map_err(|e| SilendaError::io(format!("failed to list {}", dir.display()), e))?;
            let name = entry.file_name();
            if self.platform.is_hidden(dir, &name) {
                continue;
            }
            let file_type = entry
                .file_type()
                .map_err(|e| SilendaError::io("failed to read entry type", e))?;

            let name = name.to_string_lossy().into_owned();
            if file_type.is_dir() {
                listing.dirs.push(name);
            } else if file_type.is_file() {
                listing.files.push(name);
            }
        }
        listing.dirs.sort();
        listing.files.sort();

        Ok(listing)
    }

    fn engine(&self) -> MutexGuard<'_, Option<CipherEngine>> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_engine<T>(&self, op: impl FnOnce(&CipherEngine) -> Result<T>) -> Result<T> {
        let guard = self.engine();
        let engine = guard.as_ref().ok_or_else(|| {
            SilendaError::with_kind(ErrorCategory::User, ErrorKind::NotLoggedIn, "not logged in")
        })?;
        op(engine)
    }
}

/// The message shown to the user for `err`
pub fn user_message(err: &SilendaError) -> &'static str {
    match err.kind {
        Some(ErrorKind::PasswordTooSimple) => PASSWORD_SIMPLE,
        Some(ErrorKind::PasswordSameAsReal | ErrorKind::PasswordSameAsFake) => PASSWORD_SAME,
        Some(ErrorKind::AuthenticationFailed) => PASSWORD_ERROR,
        Some(ErrorKind::NotLoggedIn) => NOT_LOGGED_IN,
        Some(ErrorKind::DeviceUnsupported | ErrorKind::DeviceUnavailable) => NO_DEVICE,
        _ if err.is_permission_denied() => PERMISSION_ERROR,
        _ => UNKNOWN_ERROR,
    }
}
