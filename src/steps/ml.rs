//! ML frameworks: OpenCV, Caffe2, CNTK, Keras, Theano, MXNet

use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::session::{RemoteCommand, Session};
use crate::step::ProvisionStep;
use crate::steps::{append_line, pip_install};
use log::warn;

/// OpenCV 3.2.0 built from source.
#[derive(Debug, Clone, Default)]
pub struct InstallOpencv;

impl ProvisionStep for InstallOpencv {
    fn name(&self) -> &'static str {
        "opencv"
    }

    fn provision(&self, session: &dyn Session, config: &ProvisionConfig) -> Result<()> {
        let home = config.home_dir();
        let numpy_pin = format!("numpy=={}", config.pins.numpy()?);

        session
            .sudo(&RemoteCommand::new("yum").args([
                "-y",
                "install",
                "cmake",
                "python34",
                "python34-devel",
                "python34-pip",
                "gcc",
                "gcc-c++",
            ]))?
            .ensure_success("install opencv build prerequisites")?;
        session
            .sudo(&pip_install("python3.4", &[&numpy_pin]))?
            .ensure_success("install numpy for python3.4")?;
        session
            .sudo(&pip_install("python3.5", &[&numpy_pin]))?
            .ensure_success("install numpy for python3.5")?;

        session
            .run(&RemoteCommand::new("git").args(["clone", "https://github.com/opencv/opencv.git"]))?
            .ensure_success("clone opencv")?;
        session
            .run(
                &RemoteCommand::shell("git checkout 3.2.0 && mkdir release")
                    .current_dir(format!("{}/opencv", home)),
            )?
            .ensure_success("checkout opencv release tag")?;
        session
            .run(
                &RemoteCommand::shell(
                    "cmake -DINSTALL_TESTS=OFF -D CUDA_GENERATION=Auto -D CMAKE_BUILD_TYPE=RELEASE \
                     -D CMAKE_INSTALL_PREFIX=$(python2 -c \"import sys; print(sys.prefix)\") \
                     -D PYTHON_EXECUTABLE=$(which python2) .. && make -j$(nproc)",
                )
                .current_dir(format!("{}/opencv/release", home)),
            )?
            .ensure_success("build opencv")?;
        session
            .sudo(
                &RemoteCommand::new("make")
                    .arg("install")
                    .current_dir(format!("{}/opencv/release", home)),
            )?
            .ensure_success("install opencv")?;
        Ok(())
    }
}

/// Caffe2 built from the pytorch tree with a source-built CMake.
#[derive(Debug, Clone)]
pub struct InstallCaffe2 {
    pub caffe2_version: String,
    pub cmake_version: String,
}

impl InstallCaffe2 {
    /// CMake download URLs group releases by `major.minor`.
    fn cmake_series(&self) -> String {
        let mut parts = self.cmake_version.split('.');
        match (parts.next(), parts.next()) {
            (Some(major), Some(minor)) => format!("{}.{}", major, minor),
            _ => self.cmake_version.clone(),
        }
    }
}

impl ProvisionStep for InstallCaffe2 {
    fn name(&self) -> &'static str {
        "caffe2"
    }

    fn provision(&self, session: &dyn Session, config: &ProvisionConfig) -> Result<()> {
        let home = config.home_dir();
        let numpy_pin = format!("numpy=={}", config.pins.numpy()?);

        session
            .sudo(&RemoteCommand::new("yum").args([
                "update-minimal",
                "--security",
                "-y",
            ]))?
            .ensure_success("apply security updates")?;
        session
            .sudo(&RemoteCommand::new("yum").args([
                "-y",
                "install",
                "--nogpgcheck",
                "automake",
                "cmake3",
                "gcc",
                "gcc-c++",
                "kernel-devel",
                "leveldb-devel",
                "lmdb-devel",
                "libtool",
                "protobuf-devel",
                "graphviz",
            ]))?
            .ensure_success("install caffe2 prerequisites")?;
        session
            .sudo(&pip_install(
                "python3.5",
                &[
                    "flask",
                    "graphviz",
                    "hypothesis",
                    "jupyter",
                    "matplotlib==2.0.2",
                    &numpy_pin,
                    "protobuf",
                    "pydot",
                    "python-nvd3",
                    "pyyaml",
                    "requests",
                    "scikit-image",
                    "scipy",
                    "setuptools",
                    "tornado",
                    "future",
                ],
            ))?
            .ensure_success("install caffe2 python deps")?;

        session
            .sudo(&RemoteCommand::shell("cp /opt/cudnn/include/* /opt/cuda-8.0/include/"))?
            .ensure_success("copy cudnn headers")?;
        session
            .sudo(&RemoteCommand::shell("cp /opt/cudnn/lib64/* /opt/cuda-8.0/lib64/"))?
            .ensure_success("copy cudnn libraries")?;

        let cmake_tarball = format!("{}/cmake-{}.tar.gz", home, self.cmake_version);
        session
            .sudo(&RemoteCommand::new("wget").arg(format!(
                "https://cmake.org/files/v{}/cmake-{}.tar.gz",
                self.cmake_series(),
                self.cmake_version
            )).arg("-O").arg(&cmake_tarball))?
            .ensure_success("download cmake")?;
        session
            .sudo(&RemoteCommand::new("tar").arg("-zxvf").arg(&cmake_tarball).current_dir(&home))?
            .ensure_success("unpack cmake")?;
        session
            .sudo(
                &RemoteCommand::shell("./bootstrap --prefix=/usr/local && make && make install")
                    .current_dir(format!("{}/cmake-{}", home, self.cmake_version)),
            )?
            .ensure_success("build cmake")?;
        session
            .sudo(&RemoteCommand::new("ln").args([
                "-s".to_string(),
                "/usr/local/bin/cmake".to_string(),
                format!("/bin/cmake{}", self.cmake_version),
            ]))?
            .ensure_success("link cmake")?;

        session
            .sudo(&RemoteCommand::new("git").args(["clone", "https://github.com/pytorch/pytorch.git"]).current_dir(&home))?
            .ensure_success("clone pytorch")?;
        let pytorch_dir = format!("{}/pytorch", home);
        session
            .sudo(&RemoteCommand::new("git").args(["submodule", "update", "--init"]).current_dir(&pytorch_dir))?
            .ensure_success("init pytorch submodules")?;

        // Release tags occasionally lag the requested version; build master
        // when the checkout misses
        let checkout = session.sudo(
            &RemoteCommand::shell(format!(
                "git checkout v{} && git submodule update --recursive",
                self.caffe2_version
            ))
            .current_dir(&pytorch_dir),
        )?;
        if !checkout.success {
            warn!(
                "caffe2 tag v{} not found, building default branch",
                self.caffe2_version
            );
        }

        session
            .sudo(
                &RemoteCommand::shell(format!(
                    "mkdir build && cd build && cmake{} .. && make \"-j$(nproc)\" install",
                    self.cmake_version
                ))
                .current_dir(&pytorch_dir),
            )?
            .ensure_success("build caffe2")?;
        Ok(())
    }
}

/// CNTK from the vendor GPU wheel.
#[derive(Debug, Clone)]
pub struct InstallCntk {
    pub cntk_version: String,
}

impl ProvisionStep for InstallCntk {
    fn name(&self) -> &'static str {
        "cntk"
    }

    fn provision(&self, session: &dyn Session, _config: &ProvisionConfig) -> Result<()> {
        append_line(session, "/etc/yum.conf", "exclude=*.i386 *.i686")?;
        session
            .sudo(&RemoteCommand::new("yum").args(["clean", "all"]))?
            .ensure_success("yum clean all")?;
        session
            .sudo(&RemoteCommand::new("yum").args(["update-minimal", "--security", "-y"]))?
            .ensure_success("apply security updates")?;
        session
            .sudo(&RemoteCommand::new("yum").args([
                "-y",
                "install",
                "--nogpgcheck",
                "openmpi",
                "openmpi-devel",
            ]))?
            .ensure_success("install openmpi")?;
        let wheel = format!(
            "https://cntk.ai/PythonWheel/GPU/cntk-{}-cp35-cp35m-linux_x86_64.whl",
            self.cntk_version
        );
        session
            .sudo(&pip_install("python3.5", &[&wheel]))?
            .ensure_success("install cntk")?;
        Ok(())
    }
}

/// Keras pinned to a driver-selected version.
#[derive(Debug, Clone)]
pub struct InstallKeras {
    pub keras_version: String,
}

impl ProvisionStep for InstallKeras {
    fn name(&self) -> &'static str {
        "keras"
    }

    fn provision(&self, session: &dyn Session, _config: &ProvisionConfig) -> Result<()> {
        let pin = format!("keras=={}", self.keras_version);
        session
            .sudo(&pip_install("python3.5", &[&pin]))?
            .ensure_success("install keras")?;
        Ok(())
    }
}

/// Theano pinned to a driver-selected version.
#[derive(Debug, Clone)]
pub struct InstallTheano {
    pub theano_version: String,
}

impl ProvisionStep for InstallTheano {
    fn name(&self) -> &'static str {
        "theano"
    }

    fn provision(&self, session: &dyn Session, _config: &ProvisionConfig) -> Result<()> {
        let pin = format!("Theano=={}", self.theano_version);
        session
            .sudo(&pip_install("python3.8", &[&pin]))?
            .ensure_success("install theano")?;
        Ok(())
    }
}

/// MXNet with CUDA 8 support.
#[derive(Debug, Clone)]
pub struct InstallMxnet {
    pub mxnet_version: String,
}

impl ProvisionStep for InstallMxnet {
    fn name(&self) -> &'static str {
        "mxnet"
    }

    fn provision(&self, session: &dyn Session, _config: &ProvisionConfig) -> Result<()> {
        let pin = format!("mxnet-cu80=={}", self.mxnet_version);
        session
            .sudo(&pip_install("python3.5", &[&pin, "opencv-python"]))?
            .ensure_success("install mxnet")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmake_series() {
        let step = InstallCaffe2 {
            caffe2_version: "0.8.1".to_string(),
            cmake_version: "3.9.6".to_string(),
        };
        assert_eq!(step.cmake_series(), "3.9");
    }
}
