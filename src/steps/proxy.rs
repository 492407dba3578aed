//! HTTP proxy wiring for the target host
//!
//! Unconditional step: proxy settings are rewritten on every run so a changed
//! proxy endpoint actually lands, which is exactly what a marker would
//! prevent.

use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::session::{RemoteCommand, Session};
use crate::step::ProvisionStep;
use crate::steps::{append_line, sed_delete};

/// Point `/etc/profile` exports and yum at an HTTP proxy.
#[derive(Debug, Clone)]
pub struct EnableProxy {
    pub proxy_host: String,
    pub proxy_port: u16,
}

impl EnableProxy {
    fn proxy_url(&self) -> String {
        format!("http://{}:{}", self.proxy_host, self.proxy_port)
    }
}

impl ProvisionStep for EnableProxy {
    fn name(&self) -> &'static str {
        "proxy"
    }

    fn marker(&self, _config: &ProvisionConfig) -> Option<String> {
        None
    }

    fn provision(&self, session: &dyn Session, _config: &ProvisionConfig) -> Result<()> {
        let proxy = self.proxy_url();

        sed_delete(session, "/etc/profile", "^export http_proxy")?;
        sed_delete(session, "/etc/profile", "^export https_proxy")?;
        append_line(session, "/etc/profile", &format!("export http_proxy={}", proxy))?;
        append_line(session, "/etc/profile", &format!("export https_proxy={}", proxy))?;

        if session.exists("/etc/yum.conf")? {
            sed_delete(session, "/etc/yum.conf", "^proxy=")?;
        }
        append_line(session, "/etc/yum.conf", &format!("proxy={}", proxy))?;

        session
            .sudo(&RemoteCommand::new("yum").args(["clean", "all"]))?
            .ensure_success("yum clean all")
    }
}
