//! Python runtimes and library sets
//!
//! Four steps: a pinned CPython built from source, the python35u toolchain
//! with the notebook kernel libraries, the application-gated scientific
//! stack, and matplotlib.

use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::session::{RemoteCommand, Session};
use crate::step::ProvisionStep;
use crate::steps::pip_install;
use log::warn;

/// Build a specific CPython release from source via `make altinstall`.
#[derive(Debug, Clone)]
pub struct EnsurePython3SpecificVersion {
    /// Requested version; `x.y` is padded to `x.y.0`.
    pub python3_version: String,
}

impl EnsurePython3SpecificVersion {
    fn full_version(&self) -> String {
        pad_python_version(&self.python3_version)
    }
}

/// Pad a short `x.y` version to the `x.y.z` form the source tarballs use.
fn pad_python_version(version: &str) -> String {
    if version.len() < 4 {
        format!("{}.0", version)
    } else {
        version.to_string()
    }
}

impl ProvisionStep for EnsurePython3SpecificVersion {
    fn name(&self) -> &'static str {
        "python3_specific_version"
    }

    fn provision(&self, session: &dyn Session, _config: &ProvisionConfig) -> Result<()> {
        let version = self.full_version();

        session
            .sudo(&RemoteCommand::new("yum").args([
                "-y",
                "install",
                "yum-utils",
                "python34",
                "openssl-devel",
            ]))?
            .ensure_success("install build prerequisites")?;
        session
            .sudo(&RemoteCommand::new("yum").args([
                "-y",
                "groupinstall",
                "development",
                "--nogpgcheck",
            ]))?
            .ensure_success("install development group")?;

        session
            .sudo(&RemoteCommand::new("wget").arg(format!(
                "https://www.python.org/ftp/python/{0}/Python-{0}.tgz",
                version
            )))?
            .ensure_success("download python source")?;
        session
            .sudo(&RemoteCommand::shell(format!(
                "tar xzf Python-{0}.tgz && cd Python-{0} && ./configure --prefix=/usr/local && make altinstall",
                version
            )))?
            .ensure_success("build python")?;
        Ok(())
    }
}

/// IUS python35u toolchain plus the notebook kernel libraries.
#[derive(Debug, Clone, Default)]
pub struct EnsurePython3Libraries;

impl ProvisionStep for EnsurePython3Libraries {
    fn name(&self) -> &'static str {
        "python3_libraries"
    }

    fn provision(&self, session: &dyn Session, config: &ProvisionConfig) -> Result<()> {
        session
            .sudo(&RemoteCommand::new("yum").args([
                "-y",
                "install",
                "https://centos7.iuscommunity.org/ius-release.rpm",
            ]))?
            .ensure_success("install ius release rpm")?;
        session
            .sudo(&RemoteCommand::new("yum").args([
                "-y",
                "install",
                "python35u",
                "python35u-pip",
                "python35u-devel",
            ]))?
            .ensure_success("install python35u")?;

        let pip_pin = format!("pip=={}", config.pins.pip()?);
        session
            .sudo(&pip_install("python3.5", &["-U", &pip_pin, "setuptools"]))?
            .ensure_success("pin pip and setuptools")?;
        session
            .sudo(&pip_install("python3.5", &["boto3"]))?
            .ensure_success("install boto3")?;
        session
            .sudo(&pip_install(
                "python3.5",
                &["fabvenv", "fabric-virtualenv", "future"],
            ))?
            .ensure_success("install fabric helpers")?;

        // ipython 7.x needs a newer interpreter on some hosts; fall back to
        // the 5.x line when the first pin refuses to install
        let tornado = format!("tornado=={}", config.pins.tornado()?);
        let ipykernel = format!("ipykernel=={}", config.pins.ipykernel()?);
        let first = session.sudo(&pip_install(
            "python3.5",
            &[&tornado, "ipython==7.9.0", &ipykernel],
        ))?;
        if !first.success {
            warn!("ipython 7.9.0 install failed, falling back to 5.0.0");
            session
                .sudo(&pip_install(
                    "python3.5",
                    &[&tornado, "ipython==5.0.0", &ipykernel],
                ))?
                .ensure_success("install ipython kernel stack")?;
        }
        Ok(())
    }
}

/// Application-gated scientific Python libraries.
#[derive(Debug, Clone, Default)]
pub struct EnsureAdditionalPythonLibs;

impl ProvisionStep for EnsureAdditionalPythonLibs {
    fn name(&self) -> &'static str {
        "additional_python_libs"
    }

    fn provision(&self, session: &dyn Session, config: &ProvisionConfig) -> Result<()> {
        session
            .sudo(&RemoteCommand::new("yum").args(["clean", "all"]))?
            .ensure_success("yum clean all")?;
        session
            .sudo(&RemoteCommand::new("yum").args([
                "-y",
                "install",
                "zlib-devel",
                "libjpeg-turbo-devel",
                "--nogpgcheck",
            ]))?
            .ensure_success("install image library headers")?;

        if config.application.wants_scipy_stack() {
            let numpy = format!("NumPy=={}", config.pins.numpy()?);
            session
                .sudo(&pip_install(
                    "python3.5",
                    &[&numpy, "SciPy", "pandas", "Sympy", "Pillow", "sklearn"],
                ))?
                .ensure_success("install scientific stack")?;
        }
        if config.application.wants_gpu_stack() {
            session
                .sudo(&pip_install("python3.8", &["opencv-python", "h5py"]))?
                .ensure_success("install gpu extras")?;
        }
        Ok(())
    }
}

/// matplotlib, with the numpy re-pin GPU applications need.
#[derive(Debug, Clone, Default)]
pub struct EnsureMatplot;

impl ProvisionStep for EnsureMatplot {
    fn name(&self) -> &'static str {
        "matplot"
    }

    fn provision(&self, session: &dyn Session, config: &ProvisionConfig) -> Result<()> {
        session
            .sudo(&pip_install("python3.5", &["matplotlib==2.0.2"]))?
            .ensure_success("install matplotlib")?;
        if config.application.wants_gpu_stack() {
            let numpy = format!("numpy=={}", config.pins.numpy()?);
            session
                .sudo(&pip_install("python3.8", &["-U", &numpy]))?
                .ensure_success("re-pin numpy")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_python_version() {
        assert_eq!(pad_python_version("3.7"), "3.7.0");
        assert_eq!(pad_python_version("3.7.4"), "3.7.4");
        assert_eq!(pad_python_version("3.10"), "3.10");
    }
}
