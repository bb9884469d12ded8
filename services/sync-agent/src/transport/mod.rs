//! Device transport: interactive CLI sessions over SSH or Telnet.
//!
//! Sessions are driven read-until-prompt: each command is written followed
//! by a newline and output is read until the vendor prompt appears on the
//! last line.

mod prompt;
mod scripted;
mod ssh;
mod telnet;

use async_trait::async_trait;
use netsync_reconcile::CollectionError;
use thiserror::Error;

use crate::config::TransportConfig;
use crate::platform::{Access, VendorProfile};

pub use prompt::PromptSession;
pub use scripted::ScriptedTransport;
pub use ssh::SshConnector;
pub use telnet::TelnetConnector;

/// Output fragments that mean the device rejected a command.
pub const ERROR_MARKERS: &[&str] = &["% Invalid", "% Incomplete", "% Ambiguous", "Error:"];

/// Transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    #[error("authentication to {host} failed: {reason}")]
    Authentication { host: String, reason: String },

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("session closed by peer")]
    Closed,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("command '{command}' rejected: {output}")]
    Rejected { command: String, output: String },

    #[error("missing credentials: {0}")]
    Credentials(String),
}

impl From<TransportError> for CollectionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connect { .. } | TransportError::Closed => {
                CollectionError::Unreachable(err.to_string())
            }
            TransportError::Authentication { .. } | TransportError::Credentials(_) => {
                CollectionError::Authentication(err.to_string())
            }
            TransportError::Timeout(_) => CollectionError::Timeout(err.to_string()),
            TransportError::Io(_) | TransportError::Rejected { .. } => {
                CollectionError::NoData(err.to_string())
            }
        }
    }
}

/// An open CLI session.
#[async_trait]
pub trait Session: Send {
    /// Run a command and return its output, without echo or prompt.
    async fn run(&mut self, command: &str) -> Result<String, TransportError>;

    /// Leave the CLI and release the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Run a command and fail if the device reports an error.
pub async fn run_checked(
    session: &mut (dyn Session + '_),
    command: &str,
) -> Result<String, TransportError> {
    let output = session.run(command).await?;
    if let Some(line) = output
        .lines()
        .find(|line| ERROR_MARKERS.iter().any(|marker| line.trim_start().starts_with(marker)))
    {
        return Err(TransportError::Rejected {
            command: command.to_string(),
            output: line.trim().to_string(),
        });
    }
    Ok(output)
}

/// Opens sessions to devices.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect and log in to `host`, returning a session at the CLI prompt.
    async fn open(
        &self,
        host: &str,
        profile: &VendorProfile,
    ) -> Result<Box<dyn Session>, TransportError>;
}

/// Transport that picks SSH or Telnet from the vendor profile.
pub struct DeviceTransport {
    ssh: SshConnector,
    telnet: TelnetConnector,
}

impl DeviceTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            ssh: SshConnector::new(config.clone()),
            telnet: TelnetConnector::new(config.clone()),
        }
    }
}

#[async_trait]
impl Transport for DeviceTransport {
    async fn open(
        &self,
        host: &str,
        profile: &VendorProfile,
    ) -> Result<Box<dyn Session>, TransportError> {
        match profile.access {
            Access::Ssh => self.ssh.open(host, profile).await,
            Access::Telnet => self.telnet.open(host, profile).await,
        }
    }
}
