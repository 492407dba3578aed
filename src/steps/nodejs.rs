//! Node.js from the nodesource repository

use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::session::{RemoteCommand, Session};
use crate::step::ProvisionStep;

#[derive(Debug, Clone, Default)]
pub struct InstallNodejs;

impl ProvisionStep for InstallNodejs {
    fn name(&self) -> &'static str {
        "nodejs"
    }

    fn provision(&self, session: &dyn Session, _config: &ProvisionConfig) -> Result<()> {
        // Vendor setup script registers the nodesource yum repo
        session
            .sudo(&RemoteCommand::shell(
                "curl -sL https://rpm.nodesource.com/setup_6.x | bash -",
            ))?
            .ensure_success("register nodesource repo")?;
        session
            .sudo(&RemoteCommand::new("yum").args(["-y", "install", "nodejs"]))?
            .ensure_success("install nodejs")?;
        Ok(())
    }
}
