//! Scripted transport with canned command output.
//!
//! Used by tests in place of real devices. Commands without a canned
//! response return empty output. A command given several outputs answers
//! with them in turn and repeats the last one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{Session, Transport, TransportError};
use crate::platform::VendorProfile;

#[derive(Clone, Default)]
struct Script {
    outputs: HashMap<(String, String), Vec<String>>,
    open_failures: HashMap<String, TransportError>,
    command_failures: HashMap<(String, String), TransportError>,
}

#[derive(Default)]
struct Shared {
    script: Script,
    commands: Mutex<HashMap<String, Vec<String>>>,
    /// Times each scripted command has answered.
    served: Mutex<HashMap<(String, String), usize>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

/// Transport answering from a host → command → output table.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    shared: Arc<Shared>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn script_mut(&mut self) -> &mut Script {
        if Arc::get_mut(&mut self.shared).is_none() {
            self.shared = Arc::new(Shared {
                script: self.shared.script.clone(),
                ..Shared::default()
            });
        }
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => &mut shared.script,
            None => unreachable!("freshly allocated transport state is unique"),
        }
    }

    /// Canned output for `command` on `host`.
    pub fn with_command(
        mut self,
        host: impl Into<String>,
        command: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        self.with_command_sequence(host, command, [output])
    }

    /// Outputs for successive runs of `command` on `host`.
    pub fn with_command_sequence<S: Into<String>>(
        mut self,
        host: impl Into<String>,
        command: impl Into<String>,
        outputs: impl IntoIterator<Item = S>,
    ) -> Self {
        self.script_mut().outputs.insert(
            (host.into(), command.into()),
            outputs.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Make `open` fail for `host`.
    pub fn fail_open(mut self, host: impl Into<String>, error: TransportError) -> Self {
        self.script_mut().open_failures.insert(host.into(), error);
        self
    }

    /// Make `command` fail on `host`.
    pub fn fail_command(
        mut self,
        host: impl Into<String>,
        command: impl Into<String>,
        error: TransportError,
    ) -> Self {
        self.script_mut()
            .command_failures
            .insert((host.into(), command.into()), error);
        self
    }

    /// Sessions opened so far.
    pub fn opens(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    /// Sessions closed so far.
    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Commands sent to `host`, in order.
    pub fn commands(&self, host: &str) -> Vec<String> {
        self.shared
            .commands
            .lock()
            .map(|c| c.get(host).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(
        &self,
        host: &str,
        _profile: &VendorProfile,
    ) -> Result<Box<dyn Session>, TransportError> {
        if let Some(err) = self.shared.script.open_failures.get(host) {
            return Err(err.clone());
        }
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            host: host.to_string(),
            shared: Arc::clone(&self.shared),
            closed: false,
        }))
    }
}

struct ScriptedSession {
    host: String,
    shared: Arc<Shared>,
    closed: bool,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn run(&mut self, command: &str) -> Result<String, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if let Ok(mut commands) = self.shared.commands.lock() {
            commands
                .entry(self.host.clone())
                .or_default()
                .push(command.to_string());
        }
        let key = (self.host.clone(), command.to_string());
        if let Some(err) = self.shared.script.command_failures.get(&key) {
            return Err(err.clone());
        }
        let Some(outputs) = self.shared.script.outputs.get(&key) else {
            return Ok(String::new());
        };
        let turn = match self.shared.served.lock() {
            Ok(mut served) => {
                let count = served.entry(key).or_default();
                *count += 1;
                *count - 1
            }
            Err(_) => 0,
        };
        Ok(outputs
            .get(turn)
            .or_else(|| outputs.last())
            .cloned()
            .unwrap_or_default())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.closed {
            self.closed = true;
            self.shared.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
