//! JVM toolchain: JDK, Scala, Maven, SBT

use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::session::{RemoteCommand, Session};
use crate::step::ProvisionStep;
use crate::steps::fetch;

/// OpenJDK 8 runtime and compiler.
#[derive(Debug, Clone, Default)]
pub struct EnsureJreJdk;

impl ProvisionStep for EnsureJreJdk {
    fn name(&self) -> &'static str {
        "jre_jdk"
    }

    fn provision(&self, session: &dyn Session, _config: &ProvisionConfig) -> Result<()> {
        session
            .sudo(&RemoteCommand::new("yum").args(["-y", "install", "java-1.8.0-openjdk"]))?
            .ensure_success("install jre")?;
        session
            .sudo(&RemoteCommand::new("yum").args(["-y", "install", "java-1.8.0-openjdk-devel"]))?
            .ensure_success("install jdk")?;
        Ok(())
    }
}

/// Scala from a vendor RPM link.
#[derive(Debug, Clone)]
pub struct EnsureScala {
    /// Base URL the RPM lives under, trailing slash included.
    pub scala_link: String,
    pub scala_version: String,
}

impl EnsureScala {
    fn rpm_url(&self) -> String {
        format!("{}scala-{}.rpm", self.scala_link, self.scala_version)
    }
}

impl ProvisionStep for EnsureScala {
    fn name(&self) -> &'static str {
        "scala"
    }

    fn provision(&self, session: &dyn Session, _config: &ProvisionConfig) -> Result<()> {
        fetch(session, &self.rpm_url(), "/tmp/scala.rpm")?;
        session
            .sudo(&RemoteCommand::new("rpm").args(["-i", "/tmp/scala.rpm"]))?
            .ensure_success("install scala rpm")?;
        Ok(())
    }
}

/// Apache Maven from the binary tarball, symlinked into the PATH.
#[derive(Debug, Clone)]
pub struct InstallMaven {
    pub maven_version: String,
}

impl Default for InstallMaven {
    fn default() -> Self {
        Self {
            maven_version: "3.3.9".to_string(),
        }
    }
}

impl ProvisionStep for InstallMaven {
    fn name(&self) -> &'static str {
        "maven"
    }

    fn provision(&self, session: &dyn Session, _config: &ProvisionConfig) -> Result<()> {
        let version = &self.maven_version;
        let url = format!(
            "http://apache.volia.net/maven/maven-3/{0}/binaries/apache-maven-{0}-bin.tar.gz",
            version
        );
        fetch(session, &url, "/tmp/maven.tar.gz")?;
        session
            .sudo(&RemoteCommand::new("tar").args(["-zxvf", "/tmp/maven.tar.gz", "-C", "/opt/"]))?
            .ensure_success("unpack maven")?;
        session
            .sudo(&RemoteCommand::new("ln").args([
                "-fs".to_string(),
                format!("/opt/apache-maven-{}/bin/mvn", version),
                "/usr/bin/mvn".to_string(),
            ]))?
            .ensure_success("link mvn")?;
        Ok(())
    }
}

/// SBT from the bintray RPM repository.
#[derive(Debug, Clone, Default)]
pub struct EnsureSbt;

impl ProvisionStep for EnsureSbt {
    fn name(&self) -> &'static str {
        "sbt"
    }

    fn provision(&self, session: &dyn Session, _config: &ProvisionConfig) -> Result<()> {
        session
            .sudo(&RemoteCommand::shell(
                "curl https://bintray.com/sbt/rpm/rpm | tee /etc/yum.repos.d/bintray-sbt-rpm.repo",
            ))?
            .ensure_success("register sbt repo")?;
        session
            .sudo(&RemoteCommand::new("yum").args(["-y", "install", "sbt"]))?
            .ensure_success("install sbt")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scala_rpm_url() {
        let step = EnsureScala {
            scala_link: "https://downloads.lightbend.com/scala/2.12.8/".to_string(),
            scala_version: "2.12.8".to_string(),
        };
        assert_eq!(
            step.rpm_url(),
            "https://downloads.lightbend.com/scala/2.12.8/scala-2.12.8.rpm"
        );
    }

    #[test]
    fn test_maven_default_version() {
        assert_eq!(InstallMaven::default().maven_version, "3.3.9");
    }
}
