//! Telnet sessions.
//!
//! Option negotiation is minimal: every option the device offers or asks
//! for is refused, which leaves a plain NVT byte stream.

use std::sync::LazyLock;

use regex::Regex;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::prompt::PromptSession;
use super::{Session, TransportError};
use crate::config::TransportConfig;
use crate::platform::VendorProfile;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

static USERNAME_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(username|login)\s*:\s*$").expect("valid login regex"));

static PASSWORD_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)password\s*:\s*$").expect("valid password regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Data,
    Iac,
    Verb(u8),
    Sub,
    SubIac,
}

/// Strips Telnet commands from the stream and refuses every option.
#[derive(Debug, Default)]
pub struct Negotiator {
    state: State,
}

impl Negotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed received bytes. Returns the payload and the replies to send.
    pub fn feed(&mut self, input: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let mut data = Vec::with_capacity(input.len());
        let mut replies = Vec::new();

        for &byte in input {
            self.state = match (self.state, byte) {
                (State::Data, IAC) => State::Iac,
                (State::Data, b) => {
                    data.push(b);
                    State::Data
                }
                (State::Iac, IAC) => {
                    data.push(IAC);
                    State::Data
                }
                (State::Iac, verb @ (DO | DONT | WILL | WONT)) => State::Verb(verb),
                (State::Iac, SB) => State::Sub,
                (State::Iac, _) => State::Data,
                (State::Verb(verb), option) => {
                    match verb {
                        DO => replies.extend_from_slice(&[IAC, WONT, option]),
                        WILL => replies.extend_from_slice(&[IAC, DONT, option]),
                        _ => {}
                    }
                    State::Data
                }
                (State::Sub, IAC) => State::SubIac,
                (State::Sub, _) => State::Sub,
                (State::SubIac, SE) => State::Data,
                (State::SubIac, _) => State::Sub,
            };
        }

        (data, replies)
    }
}

/// Opens Telnet sessions with username/password login.
pub struct TelnetConnector {
    config: TransportConfig,
}

impl TelnetConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    pub async fn open(
        &self,
        host: &str,
        profile: &VendorProfile,
    ) -> Result<Box<dyn Session>, TransportError> {
        self.open_at(host, profile.port(), profile).await
    }

    pub(crate) async fn open_at(
        &self,
        host: &str,
        port: u16,
        profile: &VendorProfile,
    ) -> Result<Box<dyn Session>, TransportError> {
        let (Some(user), Some(password)) = (&self.config.telnet_user, &self.config.telnet_password)
        else {
            return Err(TransportError::Credentials(
                "NETSYNC_TELNET_USER and NETSYNC_TELNET_PASSWORD are required".to_string(),
            ));
        };

        debug!(host = %host, port, "Opening Telnet session");
        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| TransportError::Timeout(format!("connect to {host}:{port}")))?
            .map_err(|e| TransportError::Connect {
                host: host.to_string(),
                reason: e.to_string(),
            })?;

        let (reader, writer) = stream.into_split();
        let mut session = PromptSession::new(
            Box::new(reader),
            Box::new(writer),
            profile.prompt().clone(),
            self.config.command_timeout,
        )
        .with_negotiator(Negotiator::new())
        .with_exit_command(profile.exit_command());

        let prompt = profile.prompt().clone();
        let patterns = [&*USERNAME_PROMPT, &*PASSWORD_PROMPT, &prompt];
        let mut sent_user = false;
        let mut sent_password = false;

        loop {
            let (text, matched) = session
                .read_until_any(&patterns, self.config.connect_timeout)
                .await?;
            match matched {
                0 if !sent_user => {
                    session.send_line(user).await?;
                    sent_user = true;
                }
                1 if !sent_password => {
                    session.send_line(password).await?;
                    sent_password = true;
                }
                2 => break,
                _ => {
                    let reason = text
                        .lines()
                        .rev()
                        .find(|l| l.trim_start().starts_with('%'))
                        .unwrap_or("credentials rejected")
                        .trim()
                        .to_string();
                    warn!(host = %host, reason = %reason, "Telnet login rejected");
                    return Err(TransportError::Authentication {
                        host: host.to_string(),
                        reason,
                    });
                }
            }
        }

        for command in profile.setup_commands() {
            session.run(command).await?;
        }

        Ok(Box::new(session))
    }
}
