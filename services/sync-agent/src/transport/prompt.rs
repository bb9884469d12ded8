//! Read-until-prompt session over any byte stream.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Child;
use tracing::{debug, trace};

use super::telnet::Negotiator;
use super::{Session, TransportError};

type Reader = Box<dyn AsyncRead + Unpin + Send>;
type Writer = Box<dyn AsyncWrite + Unpin + Send>;

/// Interactive CLI session that reads until the device prompt.
pub struct PromptSession {
    reader: Reader,
    writer: Writer,
    prompt: Regex,
    command_timeout: Duration,
    /// Complete lines read so far.
    lines: String,
    /// Bytes after the last newline, decoded only once the line ends.
    pending: Vec<u8>,
    /// Telnet option handling, when the stream is a raw Telnet socket.
    negotiator: Option<Negotiator>,
    /// Local client process (SSH), killed on drop.
    child: Option<Child>,
    /// Command used to leave the CLI.
    exit_command: &'static str,
}

impl PromptSession {
    pub fn new(reader: Reader, writer: Writer, prompt: Regex, command_timeout: Duration) -> Self {
        Self {
            reader,
            writer,
            prompt,
            command_timeout,
            lines: String::new(),
            pending: Vec::new(),
            negotiator: None,
            child: None,
            exit_command: "quit",
        }
    }

    pub(crate) fn with_negotiator(mut self, negotiator: Negotiator) -> Self {
        self.negotiator = Some(negotiator);
        self
    }

    pub(crate) fn with_child(mut self, child: Child) -> Self {
        self.child = Some(child);
        self
    }

    pub(crate) fn take_child(&mut self) -> Option<Child> {
        self.child.take()
    }

    pub(crate) fn with_exit_command(mut self, command: &'static str) -> Self {
        self.exit_command = command;
        self
    }

    /// Write a line terminated by a newline.
    pub async fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        trace!(line = %line, "Sending line");
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    /// Read until the prompt shows up on the last line.
    pub async fn read_until_prompt(&mut self, timeout: Duration) -> Result<String, TransportError> {
        let prompt = self.prompt.clone();
        let (text, _) = self.read_until_any(&[&prompt], timeout).await?;
        Ok(text)
    }

    /// Read until one of `patterns` matches the last (possibly unterminated)
    /// line. Returns the text read and the index of the pattern that matched.
    pub async fn read_until_any(
        &mut self,
        patterns: &[&Regex],
        timeout: Duration,
    ) -> Result<(String, usize), TransportError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut chunk = [0u8; 4096];

        loop {
            let last_line = decode(&self.pending);
            if let Some(index) = patterns.iter().position(|p| p.is_match(last_line.trim_end())) {
                let mut text = std::mem::take(&mut self.lines);
                text.push_str(&last_line);
                self.pending.clear();
                return Ok((text, index));
            }

            let read = tokio::time::timeout_at(deadline, self.reader.read(&mut chunk))
                .await
                .map_err(|_| TransportError::Timeout(format!("prompt after {timeout:?}")))?
                .map_err(|e| TransportError::Io(e.to_string()))?;
            if read == 0 {
                return Err(TransportError::Closed);
            }

            match self.negotiator.as_mut() {
                Some(negotiator) => {
                    let (data, replies) = negotiator.feed(&chunk[..read]);
                    if !replies.is_empty() {
                        self.writer
                            .write_all(&replies)
                            .await
                            .map_err(|e| TransportError::Io(e.to_string()))?;
                    }
                    self.pending.extend_from_slice(&data);
                }
                None => self.pending.extend_from_slice(&chunk[..read]),
            }
            self.take_complete_lines();
        }
    }

    /// Move every newline-terminated line from `pending` into `lines`.
    ///
    /// A newline byte never occurs inside a multibyte UTF-8 sequence, so each
    /// complete line decodes on its own.
    fn take_complete_lines(&mut self) {
        if let Some(end) = self.pending.iter().rposition(|b| *b == b'\n') {
            let rest = self.pending.split_off(end + 1);
            let complete = std::mem::replace(&mut self.pending, rest);
            self.lines.push_str(&decode(&complete));
        }
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace('\r', "")
}

/// Drop the echoed command line and the trailing prompt.
pub(crate) fn strip_echo_and_prompt(raw: &str, command: &str, prompt: &Regex) -> String {
    let mut lines: Vec<&str> = raw.lines().collect();
    if lines.last().is_some_and(|l| prompt.is_match(l.trim_end())) {
        lines.pop();
    }
    if lines.first().is_some_and(|l| l.trim_end().ends_with(command.trim())) {
        lines.remove(0);
    }
    lines.join("\n")
}

#[async_trait]
impl Session for PromptSession {
    async fn run(&mut self, command: &str) -> Result<String, TransportError> {
        debug!(command = %command, "Running command");
        self.send_line(command).await?;
        let raw = self.read_until_prompt(self.command_timeout).await?;
        Ok(strip_echo_and_prompt(&raw, command, &self.prompt))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let exit = self.exit_command;
        let _ = self.send_line(exit).await;
        let _ = self.writer.shutdown().await;
        if let Some(mut child) = self.child.take() {
            let waited = tokio::time::timeout(Duration::from_secs(2), child.wait()).await;
            if waited.is_err() {
                let _ = child.kill().await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;

    fn session_over(script: &'static [u8]) -> PromptSession {
        let (client, mut server) = tokio::io::duplex(8192);
        tokio::spawn(async move {
            let mut sink = [0u8; 256];
            let _ = server.write_all(script).await;
            // Keep the server side open while the client reads.
            let _ = server.read(&mut sink).await;
            let _ = server.read(&mut sink).await;
        });
        let (reader, writer) = tokio::io::split(client);
        PromptSession::new(
            Box::new(reader),
            Box::new(writer),
            Platform::Ios.profile().prompt().clone(),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn test_run_strips_echo_and_prompt() {
        let mut session = session_over(
            b"sw1#show vlan brief\r\nVLAN Name Status Ports\r\n1    default active\r\nsw1#",
        );
        let output = session.run("show vlan brief").await.unwrap();
        assert_eq!(output, "VLAN Name Status Ports\n1    default active");
    }

    #[tokio::test]
    async fn test_closed_stream() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let (reader, writer) = tokio::io::split(client);
        let mut session = PromptSession::new(
            Box::new(reader),
            Box::new(writer),
            Platform::Ios.profile().prompt().clone(),
            Duration::from_secs(1),
        );
        let err = session.read_until_prompt(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err, TransportError::Closed);
    }

    #[tokio::test]
    async fn test_timeout_without_prompt() {
        let mut session = session_over(b"still booting...");
        let err = session
            .read_until_prompt(Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_multibyte_text_split_across_reads() {
        let (client, mut server) = tokio::io::duplex(64);
        let text = "Name: Büro\r\nsw1#".as_bytes();
        let split = text.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let (reader, writer) = tokio::io::split(client);
        let mut session = PromptSession::new(
            Box::new(reader),
            Box::new(writer),
            Platform::Ios.profile().prompt().clone(),
            Duration::from_secs(2),
        );

        let reading = tokio::spawn(async move {
            let output = session.read_until_prompt(Duration::from_secs(2)).await;
            (session, output)
        });
        server.write_all(&text[..split]).await.unwrap();
        server.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        server.write_all(&text[split..]).await.unwrap();

        let (_session, output) = reading.await.unwrap();
        assert_eq!(output.unwrap(), "Name: Büro\nsw1#");
    }

    #[test]
    fn test_strip_keeps_output_without_echo() {
        let prompt = Platform::Ios.profile().prompt().clone();
        assert_eq!(strip_echo_and_prompt("a\nb\nsw1#", "show x", &prompt), "a\nb");
    }
}
