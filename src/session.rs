//! Remote execution session
//!
//! Every provisioning step receives an explicit `&dyn Session` — there is no
//! process-wide connection singleton. The trait covers the four things the
//! steps need from a target host: run a command as the login user, run one as
//! root, upload a file, and test a path for existence.
//!
//! Commands are built as argument lists (`RemoteCommand::new`) and quoted
//! before they ever touch a shell. The explicit `RemoteCommand::shell`
//! constructor exists for the handful of operations that are genuinely shell
//! pipelines (repo file appends, `curl | tee` vendor setups); callers are
//! expected to pass parameters through `shell_quote` rather than raw
//! interpolation.

use crate::error::{ProvisionError, Result};
use crate::process_guard::{ChildRegistry, CommandProcessGroup};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// A command destined for the target host.
///
/// Either an argument vector (preferred) or an explicit shell script for
/// operations that need pipes and redirection.
#[derive(Debug, Clone)]
pub struct RemoteCommand {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<String>,
    is_shell: bool,
}

impl RemoteCommand {
    /// Build a command from a program name; arguments are added with
    /// [`arg`](Self::arg)/[`args`](Self::args) and quoted individually.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            is_shell: false,
        }
    }

    /// Build a command from a full shell script.
    ///
    /// The script is passed to the remote shell verbatim. Interpolated values
    /// must go through [`shell_quote`].
    pub fn shell(script: impl Into<String>) -> Self {
        Self {
            program: script.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            is_shell: true,
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the remote invocation.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run the command from a remote working directory.
    pub fn current_dir(mut self, dir: impl Into<String>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Compose the single shell string handed to the transport.
    ///
    /// Argument-vector commands have every argument quoted; shell commands
    /// are emitted as written. Environment assignments and the working
    /// directory prefix apply to both forms.
    pub fn to_shell_string(&self) -> String {
        let mut out = String::new();
        if let Some(dir) = &self.cwd {
            out.push_str("cd ");
            out.push_str(&shell_quote(dir));
            out.push_str(" && ");
        }
        for (key, value) in &self.env {
            out.push_str(key);
            out.push('=');
            out.push_str(&shell_quote(value));
            out.push(' ');
        }
        if self.is_shell {
            out.push_str(&self.program);
        } else {
            out.push_str(&shell_quote(&self.program));
            for arg in &self.args {
                out.push(' ');
                out.push_str(&shell_quote(arg));
            }
        }
        out
    }

    /// Short form for log lines.
    pub fn describe(&self) -> String {
        if self.is_shell {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// POSIX single-quote escaping.
///
/// Strings made of safe characters pass through untouched; everything else is
/// wrapped in single quotes with embedded quotes rewritten as `'\''`.
pub fn shell_quote(value: &str) -> String {
    fn is_safe(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | '@' | '%' | '+' | ',')
    }
    if !value.is_empty() && value.chars().all(is_safe) {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

/// Output from a remote command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Standard output from the command.
    pub stdout: String,
    /// Standard error from the command.
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    /// Whether the command exited successfully (exit code 0).
    pub success: bool,
}

impl CommandOutput {
    /// A synthetic success with empty output (dry-run, no-op paths).
    pub fn empty_success() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        }
    }

    /// Check that the command succeeded and return an error if not.
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(ProvisionError::command(
                context,
                self.exit_code,
                self.stderr.trim(),
            ))
        }
    }

    /// Stdout with trailing whitespace stripped.
    pub fn trimmed_stdout(&self) -> &str {
        self.stdout.trim_end()
    }
}

/// Remote-execution boundary used by every provisioning step.
pub trait Session {
    /// Run a command as the login user.
    fn run(&self, cmd: &RemoteCommand) -> Result<CommandOutput>;

    /// Run a command as the superuser.
    fn sudo(&self, cmd: &RemoteCommand) -> Result<CommandOutput>;

    /// Upload a local file to the target host.
    fn put(&self, local: &Path, remote: &str) -> Result<()>;

    /// Test whether a remote path exists.
    fn exists(&self, path: &str) -> Result<bool> {
        let out = self.run(&RemoteCommand::new("test").arg("-e").arg(path))?;
        Ok(out.success)
    }

    /// Whether this session logs commands instead of executing them.
    fn is_dry_run(&self) -> bool {
        false
    }

    /// Reboot the target and wait for it to come back.
    ///
    /// The reboot command is allowed to fail (the connection drops mid-write);
    /// the wait polls with a trivial command until the host answers or the
    /// deadline passes.
    fn reboot(&self, wait: Duration) -> Result<()> {
        if let Err(e) = self.sudo(&RemoteCommand::new("shutdown").args(["-r", "now"])) {
            debug!("Reboot command dropped the connection (expected): {}", e);
        }
        if self.is_dry_run() {
            return Ok(());
        }
        std::thread::sleep(Duration::from_secs(10));
        let deadline = Instant::now() + wait;
        loop {
            if let Ok(out) = self.run(&RemoteCommand::new("true")) {
                if out.success {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(ProvisionError::session(
                    "host did not come back after reboot",
                ));
            }
            std::thread::sleep(Duration::from_secs(5));
        }
    }
}

/// SSH-backed session over the system `ssh`/`scp` binaries.
///
/// Children are spawned in their own process group and tracked by the global
/// [`ChildRegistry`] so a dying driver cannot leave remote installs orphaned
/// locally.
#[derive(Debug, Clone)]
pub struct SshSession {
    host: String,
    user: String,
    port: u16,
    identity: Option<PathBuf>,
    dry_run: bool,
}

impl SshSession {
    /// Create a session for `user@host` on the default SSH port.
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port: 22,
            identity: None,
            dry_run: false,
        }
    }

    /// Override the SSH port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Use an identity file instead of the agent.
    pub fn with_identity(mut self, identity: impl Into<PathBuf>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Log commands instead of executing them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn common_ssh_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            // Bounds every connect attempt, so post-reboot polling re-checks
            // its deadline instead of hanging on one dead connection
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
        ];
        if let Some(identity) = &self.identity {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args
    }

    fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Spawn a local child, registered with the global child registry for
    /// cleanup on driver exit.
    fn run_local(&self, mut cmd: Command, context: &str) -> Result<CommandOutput> {
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .in_new_process_group();

        let child = cmd
            .spawn()
            .map_err(|e| ProvisionError::session(format!("failed to spawn {}: {}", context, e)))?;
        let pid = child.id();

        {
            let registry = ChildRegistry::global();
            let mut guard = registry
                .lock()
                .map_err(|_| ProvisionError::state("child registry mutex poisoned"))?;
            guard.register(pid);
        }

        let output = child.wait_with_output();

        {
            let registry = ChildRegistry::global();
            if let Ok(mut guard) = registry.lock() {
                guard.unregister(pid);
            }
        }

        let output = output
            .map_err(|e| ProvisionError::session(format!("failed waiting for {}: {}", context, e)))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            success: output.status.success(),
        })
    }

    fn exec_remote(&self, remote: String, context: &str) -> Result<CommandOutput> {
        if self.dry_run {
            info!("[dry-run] {}: {}", self.target(), remote);
            return Ok(CommandOutput::empty_success());
        }
        debug!("{}: {}", self.target(), remote);
        let mut cmd = Command::new("ssh");
        cmd.args(self.common_ssh_args())
            .arg("-p")
            .arg(self.port.to_string())
            .arg(self.target())
            .arg("--")
            .arg(remote);
        self.run_local(cmd, context)
    }
}

impl Session for SshSession {
    fn run(&self, cmd: &RemoteCommand) -> Result<CommandOutput> {
        self.exec_remote(cmd.to_shell_string(), &cmd.describe())
    }

    fn sudo(&self, cmd: &RemoteCommand) -> Result<CommandOutput> {
        let wrapped = format!("sudo -E sh -c {}", shell_quote(&cmd.to_shell_string()));
        self.exec_remote(wrapped, &cmd.describe())
    }

    fn put(&self, local: &Path, remote: &str) -> Result<()> {
        if self.dry_run {
            info!("[dry-run] put {} -> {}:{}", local.display(), self.target(), remote);
            return Ok(());
        }
        let mut cmd = Command::new("scp");
        // scp spells the port flag differently than ssh
        cmd.args(self.common_ssh_args())
            .arg("-P")
            .arg(self.port.to_string())
            .arg(local)
            .arg(format!("{}:{}", self.target(), remote));
        let out = self.run_local(cmd, "scp upload")?;
        out.ensure_success(&format!("upload {} to {}", local.display(), remote))
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn exists(&self, path: &str) -> Result<bool> {
        if self.dry_run {
            // Pretend nothing is provisioned so a dry run previews every step
            return Ok(false);
        }
        let out = self.run(&RemoteCommand::new("test").arg("-e").arg(path))?;
        Ok(out.success)
    }
}
