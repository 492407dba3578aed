//! RStudio Server
//!
//! Installs the vendor RPM, patches the shipped systemd unit so rserver runs
//! with the notebook user's environment and the CUDA library path, seeds
//! `.Renviron`/`.Rprofile` with Spark and proxy settings, and sets the user
//! password. Password setting also happens on already-provisioned hosts via
//! the `refresh` hook so rotated credentials land.

use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::session::{shell_quote, RemoteCommand, Session};
use crate::step::ProvisionStep;
use crate::steps::{append_line, sed_delete};

const RSTUDIO_UNIT: &str = "/lib/systemd/system/rstudio-server.service";

/// Install and configure RStudio Server.
#[derive(Debug, Clone)]
pub struct InstallRstudio {
    /// SPARK_HOME written into the user's `.Renviron`.
    pub local_spark_path: String,
    /// Password set for the notebook user.
    pub rstudio_pass: String,
    /// RStudio Server version, selects the vendor RPM.
    pub rstudio_version: String,
}

impl InstallRstudio {
    fn rpm_url(&self) -> String {
        format!(
            "https://download2.rstudio.org/server/centos6/x86_64/rstudio-server-rhel-{}-x86_64.rpm",
            self.rstudio_version
        )
    }

    fn set_password(&self, session: &dyn Session, config: &ProvisionConfig) -> Result<()> {
        session
            .sudo(&RemoteCommand::shell(format!(
                "echo {} | chpasswd",
                shell_quote(&format!("{}:{}", config.os_user, self.rstudio_pass))
            )))?
            .ensure_success("set rstudio password")
    }
}

impl ProvisionStep for InstallRstudio {
    fn name(&self) -> &'static str {
        "rstudio"
    }

    fn provision(&self, session: &dyn Session, config: &ProvisionConfig) -> Result<()> {
        let user = &config.os_user;
        let home = config.home_dir();

        session
            .sudo(
                &RemoteCommand::new("yum")
                    .args(["-y", "install", "--nogpgcheck"])
                    .arg(self.rpm_url()),
            )?
            .ensure_success("install rstudio-server rpm")?;

        session
            .sudo(&RemoteCommand::new("mkdir").args(["-p", "/mnt/var"]))?
            .ensure_success("create /mnt/var")?;
        session
            .sudo(&RemoteCommand::new("chown").arg(format!("{0}:{0}", user)).arg("/mnt/var"))?
            .ensure_success("chown /mnt/var")?;

        // Patch the vendor unit in place: user environment, CUDA library
        // path, and no-auth mode (auth is fronted by the platform proxy)
        session
            .sudo(
                &RemoteCommand::new("sed")
                    .arg("-i")
                    .arg(format!("/Type=forking/a Environment=USER={}", user))
                    .arg(RSTUDIO_UNIT),
            )?
            .ensure_success("patch unit user env")?;
        session
            .sudo(
                &RemoteCommand::new("sed")
                    .arg("-i")
                    .arg(
                        "/ExecStart/s|=/usr/lib/rstudio-server/bin/rserver|=/bin/bash -c \"export LD_LIBRARY_PATH=$LD_LIBRARY_PATH:/opt/cudnn/lib64:/usr/local/cuda/lib64; /usr/lib/rstudio-server/bin/rserver --auth-none 1|g",
                    )
                    .arg(RSTUDIO_UNIT),
            )?
            .ensure_success("patch unit exec line")?;
        session
            .sudo(
                &RemoteCommand::new("sed")
                    .arg("-i")
                    .arg("/ExecStart/s|$|\"|g")
                    .arg(RSTUDIO_UNIT),
            )?
            .ensure_success("close unit exec quote")?;
        session
            .sudo(&RemoteCommand::new("systemctl").arg("daemon-reload"))?
            .ensure_success("systemctl daemon-reload")?;

        let renviron = format!("{}/.Renviron", home);
        session
            .sudo(&RemoteCommand::new("touch").arg(&renviron))?
            .ensure_success("create .Renviron")?;
        session
            .sudo(&RemoteCommand::new("chown").arg(format!("{0}:{0}", user)).arg(&renviron))?
            .ensure_success("chown .Renviron")?;
        append_line(
            session,
            &renviron,
            &format!("SPARK_HOME=\"{}\"", self.local_spark_path),
        )?;

        let rprofile = format!("{}/.Rprofile", home);
        session
            .sudo(&RemoteCommand::new("touch").arg(&rprofile))?
            .ensure_success("create .Rprofile")?;
        session
            .sudo(&RemoteCommand::new("chown").arg(format!("{0}:{0}", user)).arg(&rprofile))?
            .ensure_success("chown .Rprofile")?;
        append_line(
            session,
            &rprofile,
            "library(SparkR, lib.loc = c(file.path(Sys.getenv(\"SPARK_HOME\"), \"R\", \"lib\")))",
        )?;

        // Proxy settings from the login environment flow into R sessions
        let http_proxy = session.run(&RemoteCommand::shell("echo $http_proxy"))?;
        let https_proxy = session.run(&RemoteCommand::shell("echo $https_proxy"))?;
        append_line(
            session,
            &rprofile,
            &format!("Sys.setenv(http_proxy = \"{}\")", http_proxy.trimmed_stdout()),
        )?;
        append_line(
            session,
            &rprofile,
            &format!("Sys.setenv(https_proxy = \"{}\")", https_proxy.trimmed_stdout()),
        )?;

        session
            .sudo(&RemoteCommand::new("rstudio-server").arg("start"))?
            .ensure_success("start rstudio-server")?;
        self.set_password(session, config)?;

        // SPARK_HOME may be commented out by Spark reconfiguration between
        // boots; rc.local re-enables it
        sed_delete(session, "/etc/rc.local", "exit 0")?;
        append_line(
            session,
            "/etc/rc.local",
            &format!("sed -i 's/^#SPARK_HOME/SPARK_HOME/' {}/.Renviron", home),
        )?;
        append_line(session, "/etc/rc.local", "exit 0")?;
        Ok(())
    }

    fn refresh(&self, session: &dyn Session, config: &ProvisionConfig) -> Result<()> {
        self.set_password(session, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpm_url() {
        let step = InstallRstudio {
            local_spark_path: "/opt/spark".to_string(),
            rstudio_pass: "secret".to_string(),
            rstudio_version: "1.1.463".to_string(),
        };
        assert_eq!(
            step.rpm_url(),
            "https://download2.rstudio.org/server/centos6/x86_64/rstudio-server-rhel-1.1.463-x86_64.rpm"
        );
    }
}
