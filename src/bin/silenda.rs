//! Silenda CLI - file encryption behind a real and a duress password
//!
//! Command-line front end over the session operations. Entering the fake
//! password anywhere a password is asked for destroys the attached token.

use clap::{Parser, Subcommand};
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

use silenda::config::Config;
use silenda::credentials::MAX_TRIES;
use silenda::error::{ErrorCategory, ErrorKind, Result, SilendaError};
use silenda::passphrase::{PasswordReader, ReaderPasswordReader, TerminalPasswordReader};
use silenda::session::{self, Session};

#[derive(Parser)]
#[command(name = "silenda")]
#[command(version)]
#[command(about = "File encryption behind a real and a duress password.", long_about = None)]
struct Cli {
    /// Read passwords from stdin, one per line, instead of from terminal
    #[arg(long, global = true)]
    password_stdin: bool,

    /// Directory holding the password record (defaults to the executable's directory)
    #[arg(long, global = true, env = "SILENDA_WORK_DIR", value_name = "DIR")]
    work_dir: Option<PathBuf>,

    /// Hardware agent program for this platform
    #[arg(long, global = true, env = "SILENDA_AGENT", value_name = "FILE")]
    agent: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether passwords are set and a device is attached
    Status,

    /// Set the fake (duress) password
    SetFake,

    /// Set the real password
    SetReal,

    /// Check for an attached device
    Probe,

    /// Encrypt a file in place
    #[command(alias = "e")]
    Encrypt {
        /// Path to the file to encrypt
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Decrypt a container in place
    #[command(alias = "d")]
    Decrypt {
        /// Path to the container to decrypt
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the original name stored in a container
    Peek {
        /// Path to the container
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// List visible entries of a directory
    #[command(alias = "ls")]
    List {
        /// Directory to list (defaults to the current directory)
        #[arg(value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Log in and show the stored names of containers
        #[arg(long)]
        reveal: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "silenda=warn".into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        tracing::debug!(error = ?e, "command failed");
        eprintln!("Error: {}", session::user_message(&e));
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let work_dir = match cli.work_dir {
        Some(dir) => dir,
        None => executable_dir()?,
    };
    let mut config = Config::new(work_dir);
    config.base_dir =
        env::current_dir().map_err(|e| SilendaError::io("failed to get current directory", e))?;
    config.agent_path = cli.agent;

    let session = Session::open(config)?;
    let mut reader = get_password_reader(cli.password_stdin);

    match cli.command {
        Commands::Status => {
            println!("ready: {}", session.ready());
            let device = if session.has_device().is_ok() {
                "present"
            } else {
                "absent"
            };
            println!("device: {}", device);
        }
        Commands::SetFake => {
            let password = reader.read_password()?;
            session.set_fake(&password)?;
        }
        Commands::SetReal => {
            let password = reader.read_password()?;
            session.set_real(&password)?;
        }
        Commands::Probe => session.has_device()?,
        Commands::Encrypt { file } => {
            login(&session, &mut *reader)?;
            let container = session.encode_file(&file)?;
            println!("{}", container.display());
        }
        Commands::Decrypt { file } => {
            login(&session, &mut *reader)?;
            println!("{}", session.decode_file(&file)?);
        }
        Commands::Peek { file } => {
            login(&session, &mut *reader)?;
            println!("{}", session.decode_file_name(&file)?);
        }
        Commands::List { dir, reveal } => {
            let dir = dir.unwrap_or_else(|| session.config().base_dir.clone());
            if reveal {
                login(&session, &mut *reader)?;
            }
            list(&session, &dir, reveal)?;
        }
    }

    Ok(())
}

fn login(session: &Session, reader: &mut dyn PasswordReader) -> Result<()> {
    if !session.ready() {
        return Err(SilendaError::with_kind(
            ErrorCategory::User,
            ErrorKind::NotLoggedIn,
            "passwords have not been set up",
        ));
    }

    // Failures are counted per process.
    let mut failed = None;
    for attempt in 1..=MAX_TRIES {
        let password = match reader.read_password() {
            Ok(password) => password,
            Err(e) => return Err(failed.unwrap_or(e)),
        };
        match session.login(&password) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind == Some(ErrorKind::AuthenticationFailed) => {
                tracing::debug!(attempt, "login failed");
                if attempt < MAX_TRIES {
                    eprintln!("{}, try again", session::PASSWORD_ERROR);
                }
                failed = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(failed.unwrap_or_else(|| {
        SilendaError::with_kind(
            ErrorCategory::User,
            ErrorKind::AuthenticationFailed,
            "invalid password",
        )
    }))
}

fn list(session: &Session, dir: &Path, reveal: bool) -> Result<()> {
    let listing = session.list_dir(dir)?;
    for name in &listing.dirs {
        println!("{}/", name);
    }
    for name in &listing.files {
        let stored = if reveal {
            session.decode_file_name(&dir.join(name)).ok()
        } else {
            None
        };
        match stored {
            Some(stored) => println!("{}\t{}", name, stored),
            None => println!("{}", name),
        }
    }
    Ok(())
}

fn executable_dir() -> Result<PathBuf> {
    let exe = env::current_exe().map_err(|e| SilendaError::io("failed to locate executable", e))?;
    Ok(exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

fn get_password_reader(use_stdin: bool) -> Box<dyn PasswordReader> {
    if use_stdin {
        Box::new(ReaderPasswordReader::new(Box::new(io::stdin().lock())))
    } else {
        Box::new(TerminalPasswordReader::default())
    }
}
