//! Livy dependencies and GitLab certificate trust

use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::session::{RemoteCommand, Session};
use crate::step::ProvisionStep;
use crate::steps::pip_install;

/// Python libraries the Livy integration needs.
#[derive(Debug, Clone, Default)]
pub struct InstallLivyDependencies;

impl ProvisionStep for InstallLivyDependencies {
    fn name(&self) -> &'static str {
        "livy_dependencies"
    }

    fn provision(&self, session: &dyn Session, _config: &ProvisionConfig) -> Result<()> {
        session
            .sudo(&pip_install(
                "python3.5",
                &[
                    "cloudpickle",
                    "requests",
                    "requests-kerberos",
                    "flake8",
                    "flaky",
                    "pytest",
                ],
            ))?
            .ensure_success("install livy dependencies")?;
        Ok(())
    }
}

/// Move an uploaded GitLab certificate into the system CA trust.
///
/// Unconditional: trust anchors may be rotated, so there is no marker.
#[derive(Debug, Clone)]
pub struct InstallGitlabCert {
    /// Certificate file name, already uploaded to the user's home directory.
    pub certfile: String,
}

impl ProvisionStep for InstallGitlabCert {
    fn name(&self) -> &'static str {
        "gitlab_cert"
    }

    fn marker(&self, _config: &ProvisionConfig) -> Option<String> {
        None
    }

    fn provision(&self, session: &dyn Session, config: &ProvisionConfig) -> Result<()> {
        session
            .sudo(&RemoteCommand::new("mv").arg("-f").arg(format!(
                "{}/{}",
                config.home_dir(),
                self.certfile
            )).arg(format!(
                "/etc/pki/ca-trust/source/anchors/{}",
                self.certfile
            )))?
            .ensure_success("move certificate into trust anchors")?;
        session
            .sudo(&RemoteCommand::new("update-ca-trust"))?
            .ensure_success("update ca trust")?;
        Ok(())
    }
}
