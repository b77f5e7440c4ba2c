//! Silenda - file encryption behind a real and a duress password

#![forbid(unsafe_code)]

pub mod cipher;
pub mod config;
pub mod credentials;
pub mod device;
pub mod error;
pub mod file_ops;
pub mod passphrase;
pub mod platform;
pub mod record;
pub mod session;
pub mod wipe;
