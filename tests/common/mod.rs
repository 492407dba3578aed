//! Shared test doubles
//!
//! `FakeSession` records every command a step issues and answers from a
//! scripted response table, so step logic can be exercised without a target
//! host.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use notebook_provision::{
    Application, CommandOutput, ProvisionConfig, ProvisionError, RemoteCommand, Session,
    VersionPins,
};

/// One command a step handed to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    /// Whether the command went through `sudo`.
    pub sudo: bool,
    /// The composed shell line.
    pub line: String,
}

/// A scripted reaction to commands whose shell line contains `needle`.
enum Reaction {
    Output(CommandOutput),
    Transport,
}

/// In-memory [`Session`] with scripted responses.
///
/// The first response whose needle occurs in the composed shell line wins;
/// commands with no matching response succeed with empty output. Uploaded
/// files are recorded as `put <local> <remote>` lines.
pub struct FakeSession {
    commands: Mutex<Vec<RecordedCommand>>,
    responses: Mutex<Vec<(String, Reaction)>>,
    existing_paths: Mutex<HashSet<String>>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            responses: Mutex::new(Vec::new()),
            existing_paths: Mutex::new(HashSet::new()),
        }
    }

    /// Mark a remote path as existing for `exists` probes.
    pub fn with_existing_path(self, path: &str) -> Self {
        self.existing_paths.lock().unwrap().insert(path.to_string());
        self
    }

    /// Answer matching commands with the given stdout.
    pub fn respond(self, needle: &str, stdout: &str) -> Self {
        self.responses.lock().unwrap().push((
            needle.to_string(),
            Reaction::Output(CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code: Some(0),
                success: true,
            }),
        ));
        self
    }

    /// Answer matching commands with a nonzero exit.
    pub fn fail_on(self, needle: &str, stderr: &str) -> Self {
        self.responses.lock().unwrap().push((
            needle.to_string(),
            Reaction::Output(CommandOutput {
                stdout: String::new(),
                stderr: stderr.to_string(),
                exit_code: Some(1),
                success: false,
            }),
        ));
        self
    }

    /// Answer matching commands with a transport-level error.
    pub fn drop_connection_on(self, needle: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push((needle.to_string(), Reaction::Transport));
        self
    }

    /// Snapshot of everything executed so far.
    pub fn recorded(&self) -> Vec<RecordedCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Shell lines only, for order assertions.
    pub fn lines(&self) -> Vec<String> {
        self.recorded().into_iter().map(|c| c.line).collect()
    }

    fn dispatch(&self, sudo: bool, cmd: &RemoteCommand) -> Result<CommandOutput, ProvisionError> {
        let line = cmd.to_shell_string();
        self.commands.lock().unwrap().push(RecordedCommand {
            sudo,
            line: line.clone(),
        });
        let responses = self.responses.lock().unwrap();
        for (needle, reaction) in responses.iter() {
            if line.contains(needle.as_str()) {
                return match reaction {
                    Reaction::Output(out) => Ok(out.clone()),
                    Reaction::Transport => {
                        Err(ProvisionError::session(format!("connection lost: {}", line)))
                    }
                };
            }
        }
        Ok(CommandOutput::empty_success())
    }
}

impl Session for FakeSession {
    fn run(&self, cmd: &RemoteCommand) -> Result<CommandOutput, ProvisionError> {
        self.dispatch(false, cmd)
    }

    fn sudo(&self, cmd: &RemoteCommand) -> Result<CommandOutput, ProvisionError> {
        self.dispatch(true, cmd)
    }

    fn put(&self, local: &Path, remote: &str) -> Result<(), ProvisionError> {
        self.commands.lock().unwrap().push(RecordedCommand {
            sudo: false,
            line: format!("put {} {}", local.display(), remote),
        });
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool, ProvisionError> {
        Ok(self.existing_paths.lock().unwrap().contains(path))
    }
}

/// A configuration with every pin supplied, detached from the environment.
pub fn test_config(application: Application) -> ProvisionConfig {
    ProvisionConfig {
        os_user: "datalab-user".to_string(),
        application,
        pins: VersionPins {
            pip: Some("9.0.3".to_string()),
            numpy: Some("1.14.3".to_string()),
            keras: Some("2.1.6".to_string()),
            tornado: Some("5.0.2".to_string()),
            ipykernel: Some("4.8.2".to_string()),
        },
    }
}
