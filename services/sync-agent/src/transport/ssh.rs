//! SSH sessions through the system OpenSSH client.
//!
//! The client runs in batch mode with a forced TTY so the device presents
//! its interactive CLI. Authentication is key-based.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::prompt::PromptSession;
use super::{Session, TransportError};
use crate::config::TransportConfig;
use crate::platform::VendorProfile;

/// Opens SSH sessions.
pub struct SshConnector {
    config: TransportConfig,
}

impl SshConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Arguments passed to `ssh`.
    pub(crate) fn args(&self, host: &str, port: u16) -> Vec<String> {
        let mut args = vec![
            "-tt".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout.as_secs().max(1)),
            "-p".to_string(),
            port.to_string(),
        ];
        if let Some(key) = &self.config.ssh_key {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args.push(format!("{}@{}", self.config.ssh_user, host));
        args
    }

    pub async fn open(
        &self,
        host: &str,
        profile: &VendorProfile,
    ) -> Result<Box<dyn Session>, TransportError> {
        debug!(host = %host, port = profile.port(), "Opening SSH session");

        let mut child = Command::new("ssh")
            .args(self.args(host, profile.port()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Connect {
                host: host.to_string(),
                reason: format!("failed to spawn ssh: {e}"),
            })?;

        let (Some(stdin), Some(stdout), Some(mut stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(TransportError::Io("ssh stdio not captured".to_string()));
        };

        let mut session = PromptSession::new(
            Box::new(stdout),
            Box::new(stdin),
            profile.prompt().clone(),
            self.config.command_timeout,
        )
        .with_child(child)
        .with_exit_command(profile.exit_command());

        match session.read_until_prompt(self.config.connect_timeout).await {
            Ok(_banner) => {}
            Err(err) => {
                let mut diagnostics = String::new();
                let _ = tokio::time::timeout(
                    std::time::Duration::from_secs(1),
                    stderr.read_to_string(&mut diagnostics),
                )
                .await;
                if let Some(mut child) = session.take_child() {
                    let _ = child.kill().await;
                }
                let err = classify_failure(host, err, &diagnostics);
                warn!(host = %host, error = %err, "SSH session failed");
                return Err(err);
            }
        }

        for command in profile.setup_commands() {
            session.run(command).await?;
        }

        Ok(Box::new(session))
    }
}

/// Map an ssh client failure to a transport error using its stderr.
pub(crate) fn classify_failure(host: &str, err: TransportError, stderr: &str) -> TransportError {
    let lower = stderr.to_ascii_lowercase();
    let reason = stderr.trim().lines().last().unwrap_or_default().to_string();
    if lower.contains("permission denied") || lower.contains("authentication failed") {
        TransportError::Authentication {
            host: host.to_string(),
            reason,
        }
    } else if lower.contains("timed out") {
        TransportError::Timeout(format!("connect to {host}"))
    } else if !reason.is_empty() {
        TransportError::Connect {
            host: host.to_string(),
            reason,
        }
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_args() {
        let connector = SshConnector::new(TransportConfig {
            ssh_user: "svc".into(),
            ssh_key: Some(PathBuf::from("/etc/netsync/id_ed25519")),
            connect_timeout: Duration::from_secs(15),
            ..TransportConfig::default()
        });
        let args = connector.args("10.0.0.1", 22);
        assert_eq!(args[0], "-tt");
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"ConnectTimeout=15".to_string()));
        assert!(args.contains(&"/etc/netsync/id_ed25519".to_string()));
        assert_eq!(args.last().unwrap(), "svc@10.0.0.1");
    }

    #[test]
    fn test_classify_failure() {
        let err = classify_failure(
            "10.0.0.1",
            TransportError::Closed,
            "svc@10.0.0.1: Permission denied (publickey).\n",
        );
        assert!(matches!(err, TransportError::Authentication { .. }));

        let err = classify_failure(
            "10.0.0.1",
            TransportError::Closed,
            "ssh: connect to host 10.0.0.1 port 22: Connection timed out",
        );
        assert!(matches!(err, TransportError::Timeout(_)));

        let err = classify_failure(
            "10.0.0.1",
            TransportError::Closed,
            "ssh: connect to host 10.0.0.1 port 22: Connection refused",
        );
        assert!(matches!(err, TransportError::Connect { .. }));

        assert_eq!(
            classify_failure("h", TransportError::Closed, ""),
            TransportError::Closed
        );
    }
}
