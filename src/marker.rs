//! Marker files
//!
//! A provisioning step that completed leaves a zero-byte sentinel under
//! `~/.ensure_dir/` on the target host. The presence of the sentinel is the
//! whole idempotency mechanism: markers carry no version, so they cannot
//! detect that a step's parameters changed after the marker was written.

use crate::error::Result;
use crate::session::{RemoteCommand, Session};

/// Directory under the user's home that holds every marker.
pub const ENSURE_DIR: &str = ".ensure_dir";

/// Marker path for a step name, e.g. `/home/datalab-user/.ensure_dir/r_ensured`.
pub fn marker_path(os_user: &str, step_name: &str) -> String {
    format!("/home/{}/{}/{}_ensured", os_user, ENSURE_DIR, step_name)
}

/// Check whether a marker exists on the target.
pub fn marker_exists(session: &dyn Session, path: &str) -> Result<bool> {
    session.exists(path)
}

/// Write a marker, creating the ensure directory if this is the first step
/// to complete on the host.
pub fn write_marker(session: &dyn Session, path: &str) -> Result<()> {
    if let Some(dir) = path.rsplit_once('/').map(|(dir, _)| dir) {
        session
            .sudo(&RemoteCommand::new("mkdir").arg("-p").arg(dir))?
            .ensure_success("create marker directory")?;
    }
    session
        .sudo(&RemoteCommand::new("touch").arg(path))?
        .ensure_success("write marker")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_path_shape() {
        assert_eq!(
            marker_path("datalab-user", "r_kernel"),
            "/home/datalab-user/.ensure_dir/r_kernel_ensured"
        );
        assert_eq!(
            marker_path("jovyan", "sbt"),
            "/home/jovyan/.ensure_dir/sbt_ensured"
        );
    }
}
