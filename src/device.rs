//! Hardware token agent
//!
//! The agent is an external program that talks to the token. Each call
//! writes it to a fresh temp file, runs it once under a hard timeout and
//! removes it again:
//! - `<agent> read` prints device status; empty output means no device
//! - `<agent> write <code>` issues the destroy command

use crate::error::{ErrorCategory, ErrorKind, Result, SilendaError};
use crate::platform::Platform;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempPath;

/// Command code that makes the token destroy itself
pub const DESTROY_CODE: &str = "0xac";

/// How long the agent may run
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Prefix of the materialized agent file
const AGENT_PREFIX: &str = "usb.";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Attempts at spawning a just-written agent
const SPAWN_ATTEMPTS: u32 = 5;

pub trait DestroyTrigger: Send + Sync {
    /// Succeeds iff a token answered.
    fn probe(&self) -> Result<()>;

    /// Tell the token to destroy itself.
    fn destroy(&self) -> Result<()>;
}

pub struct AgentTrigger {
    platform: Arc<dyn Platform>,
    work_dir: PathBuf,
    timeout: Duration,
}

impl AgentTrigger {
    pub fn new(platform: Arc<dyn Platform>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            work_dir: work_dir.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let payload = self.platform.agent_payload()?;
        let agent = materialize(&self.work_dir, &payload)?;

        let output = run_with_timeout(&agent, args, self.timeout);
        if let Err(e) = agent.close() {
            tracing::warn!(error = %e, "failed to remove agent file");
        }
        output
    }
}

impl DestroyTrigger for AgentTrigger {
    fn probe(&self) -> Result<()> {
        let output = self.run(&["read"])?;
        if output.is_empty() {
            return Err(SilendaError::with_kind(
                ErrorCategory::User,
                ErrorKind::DeviceUnavailable,
                "unknown device",
            ));
        }
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        self.run(&["write", DESTROY_CODE]).map(|_| ())
    }
}

/// Write the agent to a closed, executable temp file in `dir`
fn materialize(dir: &Path, payload: &[u8]) -> Result<TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix(AGENT_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| device_io("failed to create agent file", e))?;
    file.write_all(payload)
        .and_then(|()| file.flush())
        .map_err(|e| device_io("failed to write agent file", e))?;

    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(Permissions::from_mode(0o700))
            .map_err(|e| device_io("failed to make agent executable", e))?;
    }

    Ok(file.into_temp_path())
}

fn run_with_timeout(program: &Path, args: &[&str], timeout: Duration) -> Result<Vec<u8>> {
    let program = std::path::absolute(program)
        .map_err(|e| device_io("failed to resolve agent path", e))?;
    let deadline = Instant::now() + timeout;

    let mut child = spawn(&program, args)?;
    let mut stdout = child.stdout.take().ok_or_else(|| {
        SilendaError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "agent stdout was not captured",
        )
    })?;
    let reader = thread::spawn(move || {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).map(|_| buf)
    });

    let status = wait_until(&mut child, deadline)?;
    let output = reader
        .join()
        .map_err(|_| {
            SilendaError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "agent output reader panicked",
            )
        })?
        .map_err(|e| device_io("failed to read agent output", e))?;

    if !status.success() {
        return Err(SilendaError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::DeviceUnavailable,
            format!("agent failed: {}", status),
        ));
    }

    tracing::debug!(bytes = output.len(), "agent finished");
    Ok(output)
}

fn spawn(program: &Path, args: &[&str]) -> Result<Child> {
    let mut attempt = 1;
    loop {
        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(child) => return Ok(child),
            // A child forked elsewhere in this process may still hold the
            // freshly written agent open (ETXTBSY).
            Err(e) if e.kind() == io::ErrorKind::ExecutableFileBusy && attempt < SPAWN_ATTEMPTS => {
                attempt += 1;
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(device_io("failed to spawn agent", e)),
        }
    }
}

fn wait_until(child: &mut Child, deadline: Instant) -> Result<ExitStatus> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SilendaError::with_kind(
                    ErrorCategory::Internal,
                    ErrorKind::DeviceUnavailable,
                    "agent timed out",
                ));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                return Err(device_io("failed to wait for agent", e));
            }
        }
    }
}

fn device_io(msg: &str, err: io::Error) -> SilendaError {
    SilendaError::with_kind_and_source(
        ErrorCategory::Internal,
        ErrorKind::DeviceUnavailable,
        msg,
        err,
    )
}
