//! R runtime and Jupyter R kernel
//!
//! `EnsureR` installs the interpreter and the CRAN/IRkernel library set;
//! `EnsureRLocalKernel` registers the kernel with Jupyter and wires SparkR,
//! rendering the kernel spec from the bundled template.

use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::session::{RemoteCommand, Session};
use crate::step::ProvisionStep;
use crate::templates::r_kernel_spec;
use log::warn;
use std::fs;

/// Default CRAN repository outside mirrored regions.
pub const CRAN_REPOSITORY: &str = "https://cloud.r-project.org";

/// Region whose hosts cannot reach CRAN directly and use the mirror instead.
const MIRRORED_REGION: &str = "cn-north-1";

/// Install R, system build prerequisites, and the notebook R library set.
#[derive(Debug, Clone)]
pub struct EnsureR {
    /// CRAN packages requested by the driver, installed one by one.
    pub r_libs: Vec<String>,
    /// Cloud region of the target host.
    pub region: String,
    /// Region-local CRAN mirror, used only for [`MIRRORED_REGION`].
    pub r_mirror: String,
}

impl EnsureR {
    fn repository(&self) -> &str {
        if self.region == MIRRORED_REGION {
            &self.r_mirror
        } else {
            CRAN_REPOSITORY
        }
    }

    fn r_eval(expr: String) -> RemoteCommand {
        RemoteCommand::new("R").arg("-e").arg(expr)
    }
}

impl ProvisionStep for EnsureR {
    fn name(&self) -> &'static str {
        "r"
    }

    fn provision(&self, session: &dyn Session, config: &ProvisionConfig) -> Result<()> {
        let repo = self.repository();

        session
            .sudo(&RemoteCommand::new("yum").args(["-y", "install", "cmake"]))?
            .ensure_success("install cmake")?;
        session
            .sudo(&RemoteCommand::new("yum").args(["-y", "install", "libcur*"]))?
            .ensure_success("install curl libraries")?;

        // The stock repos carry an R without devel headers; pin the CentOS
        // base build log repo alongside them.
        let repo_file = "[base]\n\
                         name=CentOS-7-Base\n\
                         baseurl=http://buildlogs.centos.org/centos/7/os/x86_64-20140704-1/\n\
                         gpgcheck=1\n\
                         gpgkey=file:///etc/pki/rpm-gpg/RPM-GPG-KEY-CentOS-7\n\
                         priority=1\n\
                         exclude=php mysql";
        crate::steps::append_line(session, "/etc/yum.repos.d/CentOS-base.repo", repo_file)?;

        session
            .sudo(&RemoteCommand::new("yum").args([
                "-y",
                "install",
                "R",
                "R-core",
                "R-core-devel",
                "R-devel",
                "--nogpgcheck",
            ]))?
            .ensure_success("install R")?;
        session
            .sudo(&RemoteCommand::new("R").args(["CMD", "javareconf"]))?
            .ensure_success("R javareconf")?;

        // rzmq needs a ZeroMQ that the distro does not ship
        session
            .sudo(&RemoteCommand::shell(
                "cd /root && git clone https://github.com/zeromq/zeromq4-x.git && \
                 cd zeromq4-x && mkdir build && cd build && cmake .. && make install && ldconfig",
            ))?
            .ensure_success("build zeromq")?;

        for lib in &self.r_libs {
            session
                .sudo(&Self::r_eval(format!(
                    "install.packages('{}', repos='{}')",
                    lib, repo
                )))?
                .ensure_success(&format!("install R package {}", lib))?;
        }

        session
            .sudo(&Self::r_eval(format!(
                "library('devtools');install.packages(repos='{}',c('rzmq','repr','digest','stringr','RJSONIO','functional','plyr'))",
                repo
            )))?
            .ensure_success("install IRkernel prerequisites")?;
        session
            .sudo(&Self::r_eval(
                "library('devtools');install_github('IRkernel/repr');install_github('IRkernel/IRdisplay');install_github('IRkernel/IRkernel');"
                    .to_string(),
            ))?
            .ensure_success("install IRkernel")?;
        session
            .sudo(&Self::r_eval(format!(
                "library('devtools');install_version('keras', version = '{}', repos = '{}');",
                config.pins.keras()?,
                repo
            )))?
            .ensure_success("install keras for R")?;
        session
            .sudo(&Self::r_eval(format!(
                "install.packages('RJDBC',repos='{}',dep=TRUE)",
                repo
            )))?
            .ensure_success("install RJDBC")?;
        Ok(())
    }
}

/// Register the IRkernel with Jupyter and install SparkR from the local Spark.
#[derive(Debug, Clone)]
pub struct EnsureRLocalKernel {
    pub spark_version: String,
    /// Jupyter kernels directory, e.g. `/home/<user>/.local/share/jupyter/kernels`.
    pub kernels_dir: String,
}

impl ProvisionStep for EnsureRLocalKernel {
    fn name(&self) -> &'static str {
        "r_kernel"
    }

    fn provision(&self, session: &dyn Session, config: &ProvisionConfig) -> Result<()> {
        let user = &config.os_user;
        let local_dir = format!("{}/.local", config.home_dir());

        session
            .sudo(
                &RemoteCommand::new("chown")
                    .arg("-R")
                    .arg(format!("{0}:{0}", user))
                    .arg(&local_dir),
            )?
            .ensure_success("chown .local")?;
        session
            .run(&RemoteCommand::new("R").arg("-e").arg("IRkernel::installspec()"))?
            .ensure_success("IRkernel installspec")?;
        session
            .sudo(&RemoteCommand::new("ln").args(["-s", "/opt/spark/", "/usr/local/spark"]))?
            .ensure_success("link spark")?;

        // devtools::check is best-effort; SparkR installs without it
        let check = session.sudo(
            &RemoteCommand::new("R")
                .arg("-e")
                .arg("install.packages('roxygen2',repos='https://cloud.r-project.org'); devtools::check('.')")
                .current_dir("/usr/local/spark/R/lib/SparkR"),
        )?;
        if !check.success {
            warn!("SparkR package check failed, continuing: {}", check.stderr.trim());
        }

        session
            .sudo(
                &RemoteCommand::new("R")
                    .arg("-e")
                    .arg("devtools::install('.')")
                    .current_dir("/usr/local/spark/R/lib/SparkR"),
            )?
            .ensure_success("install SparkR")?;

        let r_version = query_r_version(session)?;
        let spec = r_kernel_spec(&r_version, &self.spark_version)?;

        let local_spec = std::env::temp_dir().join(format!("r_kernel_{}.json", user));
        fs::write(&local_spec, &spec)?;
        session.put(&local_spec, "/tmp/r_kernel.json")?;
        let _ = fs::remove_file(&local_spec);

        session
            .sudo(&RemoteCommand::new("mkdir").arg("-p").arg(format!("{}/ir", self.kernels_dir)))?
            .ensure_success("create kernel directory")?;
        session
            .sudo(&RemoteCommand::new("cp").arg("-f").arg("/tmp/r_kernel.json").arg(format!(
                "{}/ir/kernel.json",
                self.kernels_dir
            )))?
            .ensure_success("install kernel spec")?;
        session
            .sudo(&RemoteCommand::new("ln").args(["-s", "/usr/lib64/R/", "/usr/lib/R"]))?
            .ensure_success("link R libdir")?;
        session
            .sudo(
                &RemoteCommand::new("chown")
                    .arg("-R")
                    .arg(format!("{0}:{0}", user))
                    .arg(&local_dir),
            )?
            .ensure_success("chown .local")?;
        Ok(())
    }
}

/// Installed R version, from `R --version` output.
fn query_r_version(session: &dyn Session) -> Result<String> {
    let out = session.sudo(&RemoteCommand::new("R").arg("--version"))?;
    out.ensure_success("query R version")?;
    parse_r_version(&out.stdout)
        .ok_or_else(|| ProvisionError::session("could not parse R --version output"))
}

/// Pull the version number out of `R version 3.4.1 (2017-06-30) ...`.
fn parse_r_version(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        if fields.next() == Some("R") && fields.next() == Some("version") {
            fields.next().map(str::to_string)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_selection() {
        let step = EnsureR {
            r_libs: vec![],
            region: "us-west-2".to_string(),
            r_mirror: "https://mirrors.example.cn/CRAN".to_string(),
        };
        assert_eq!(step.repository(), CRAN_REPOSITORY);

        let mirrored = EnsureR {
            region: "cn-north-1".to_string(),
            ..step
        };
        assert_eq!(mirrored.repository(), "https://mirrors.example.cn/CRAN");
    }

    #[test]
    fn test_parse_r_version() {
        let output = "R version 3.4.1 (2017-06-30) -- \"Single Candle\"\nCopyright (C) 2017\n";
        assert_eq!(parse_r_version(output).as_deref(), Some("3.4.1"));
        assert_eq!(parse_r_version("no version here"), None);
    }
}
