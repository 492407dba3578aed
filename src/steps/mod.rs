//! The provisioning catalogue
//!
//! One module per capability family. Each step struct carries its own
//! parameters and implements [`ProvisionStep`](crate::step::ProvisionStep);
//! marker names match the sentinel files long-lived hosts already carry, so a
//! host provisioned by an earlier driver generation is not re-provisioned.

pub mod gpu;
pub mod jvm;
pub mod misc;
pub mod ml;
pub mod nodejs;
pub mod proxy;
pub mod python;
pub mod r;
pub mod rstudio;

use crate::error::Result;
use crate::session::{shell_quote, RemoteCommand, Session};

/// `<python> -m pip install <packages> --no-cache-dir` as root.
pub(crate) fn pip_install(python: &str, packages: &[&str]) -> RemoteCommand {
    RemoteCommand::new(python)
        .args(["-m", "pip", "install"])
        .args(packages.iter().copied())
        .arg("--no-cache-dir")
}

/// Append a line to a remote file as root.
pub(crate) fn append_line(session: &dyn Session, file: &str, line: &str) -> Result<()> {
    session
        .sudo(&RemoteCommand::shell(format!(
            "echo {} >> {}",
            shell_quote(line),
            shell_quote(file)
        )))?
        .ensure_success(&format!("append to {}", file))
}

/// Delete lines matching a sed address from a remote file as root.
pub(crate) fn sed_delete(session: &dyn Session, file: &str, address: &str) -> Result<()> {
    session
        .sudo(
            &RemoteCommand::new("sed")
                .arg("-i")
                .arg(format!("/{}/d", address))
                .arg(file),
        )?
        .ensure_success(&format!("edit {}", file))
}

/// Download a URL to a remote path as root.
pub(crate) fn fetch(session: &dyn Session, url: &str, dest: &str) -> Result<()> {
    session
        .sudo(&RemoteCommand::new("wget").arg(url).arg("-O").arg(dest))?
        .ensure_success(&format!("download {}", url))
}
