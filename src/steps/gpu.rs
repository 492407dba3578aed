//! NVIDIA driver, CUDA, cuDNN, TensorFlow, and the TensorBoard unit
//!
//! The longest action sequence in the catalogue. The host reboots once early
//! on (nouveau cannot be unloaded live), so the driver must tolerate the
//! session dropping and returning.

use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::session::{RemoteCommand, Session};
use crate::step::ProvisionStep;
use crate::steps::append_line;
use crate::templates::tensorboard_unit;
use std::fs;
use std::time::Duration;

/// How long to wait for the host to come back after the nouveau-unload reboot.
const REBOOT_WAIT: Duration = Duration::from_secs(150);

/// Install the full GPU stack and start TensorBoard.
#[derive(Debug, Clone)]
pub struct InstallTensor {
    pub cuda_version: String,
    /// CUDA installer file name as published by the vendor.
    pub cuda_file_name: String,
    pub cudnn_version: String,
    pub cudnn_file_name: String,
    pub tensorflow_version: String,
    pub nvidia_version: String,
}

impl ProvisionStep for InstallTensor {
    fn name(&self) -> &'static str {
        "tensor"
    }

    fn provision(&self, session: &dyn Session, config: &ProvisionConfig) -> Result<()> {
        let user = &config.os_user;
        let home = config.home_dir();

        self.install_nvidia_driver(session, &home)?;
        self.install_cuda(session, config)?;
        self.install_cudnn(session)?;
        self.install_tensorflow(session, &home)?;
        self.start_tensorboard(session, user)?;
        Ok(())
    }
}

impl InstallTensor {
    fn install_nvidia_driver(&self, session: &dyn Session, home: &str) -> Result<()> {
        // nouveau holds the GPU until the next boot
        append_line(
            session,
            "/etc/modprobe.d/blacklist-nouveau.conf",
            "blacklist nouveau",
        )?;
        append_line(
            session,
            "/etc/modprobe.d/blacklist-nouveau.conf",
            "options nouveau modeset=0",
        )?;
        session
            .sudo(&RemoteCommand::new("dracut").arg("--force"))?
            .ensure_success("rebuild initramfs")?;
        session.reboot(REBOOT_WAIT)?;

        session
            .sudo(&RemoteCommand::shell(
                "yum -y install libglvnd-opengl libglvnd-devel dkms gcc \
                 kernel-devel-$(uname -r) kernel-headers-$(uname -r)",
            ))?
            .ensure_success("install kernel headers")?;

        let run_file = format!("{}/NVIDIA-Linux-x86_64-{}.run", home, self.nvidia_version);
        session
            .sudo(&RemoteCommand::new("wget").arg(format!(
                "http://us.download.nvidia.com/XFree86/Linux-x86_64/{0}/NVIDIA-Linux-x86_64-{0}.run",
                self.nvidia_version
            )).arg("-O").arg(&run_file))?
            .ensure_success("download nvidia driver")?;
        session
            .sudo(&RemoteCommand::new("/bin/bash").arg(&run_file).args(["-s", "--dkms"]))?
            .ensure_success("install nvidia driver")?;
        session
            .sudo(&RemoteCommand::new("rm").arg("-f").arg(&run_file))?
            .ensure_success("remove driver installer")?;
        Ok(())
    }

    fn install_cuda(&self, session: &dyn Session, config: &ProvisionConfig) -> Result<()> {
        let pip_pin = format!("pip=={}", config.pins.pip()?);
        let numpy_pin = format!("numpy=={}", config.pins.numpy()?);
        session
            .sudo(&crate::steps::pip_install(
                "python3.5",
                &["--upgrade", &pip_pin, "wheel", &numpy_pin],
            ))?
            .ensure_success("upgrade pip and numpy")?;

        session
            .sudo(&RemoteCommand::new("wget").arg("-P").arg("/opt").arg(format!(
                "https://developer.nvidia.com/compute/cuda/{}/prod/local_installers/{}",
                self.cuda_version, self.cuda_file_name
            )))?
            .ensure_success("download cuda installer")?;
        session
            .sudo(
                &RemoteCommand::new("sh")
                    .arg(format!("/opt/{}", self.cuda_file_name))
                    .args(["--silent", "--toolkit"]),
            )?
            .ensure_success("install cuda toolkit")?;
        // Root volumes are small on notebook hosts; CUDA lives on /opt with a
        // compatibility link back
        session
            .sudo(&RemoteCommand::new("mv").arg(format!("/usr/local/cuda-{}", self.cuda_version)).arg("/opt/"))?
            .ensure_success("relocate cuda")?;
        session
            .sudo(&RemoteCommand::new("ln").arg("-s").arg(format!("/opt/cuda-{}", self.cuda_version)).arg(format!(
                "/usr/local/cuda-{}",
                self.cuda_version
            )))?
            .ensure_success("link cuda")?;
        session
            .sudo(&RemoteCommand::new("rm").arg("-f").arg(format!("/opt/{}", self.cuda_file_name)))?
            .ensure_success("remove cuda installer")?;
        Ok(())
    }

    fn install_cudnn(&self, session: &dyn Session) -> Result<()> {
        session
            .run(&RemoteCommand::new("wget").arg(format!(
                "http://developer.download.nvidia.com/compute/redist/cudnn/v{}/{}",
                self.cudnn_version, self.cudnn_file_name
            )).arg("-O").arg(format!("/tmp/{}", self.cudnn_file_name)))?
            .ensure_success("download cudnn")?;
        session
            .run(&RemoteCommand::new("tar").args([
                "xvzf".to_string(),
                format!("/tmp/{}", self.cudnn_file_name),
                "-C".to_string(),
                "/tmp".to_string(),
            ]))?
            .ensure_success("unpack cudnn")?;
        session
            .sudo(&RemoteCommand::new("mkdir").args(["-p", "/opt/cudnn/include", "/opt/cudnn/lib64"]))?
            .ensure_success("create cudnn dirs")?;
        session
            .sudo(&RemoteCommand::new("mv").args(["/tmp/cuda/include/cudnn.h", "/opt/cudnn/include"]))?
            .ensure_success("install cudnn header")?;
        session
            .sudo(&RemoteCommand::shell("mv /tmp/cuda/lib64/libcudnn* /opt/cudnn/lib64"))?
            .ensure_success("install cudnn libraries")?;
        session
            .sudo(&RemoteCommand::shell(
                "chmod a+r /opt/cudnn/include/cudnn.h /opt/cudnn/lib64/libcudnn*",
            ))?
            .ensure_success("set cudnn permissions")?;
        session
            .run(&RemoteCommand::shell(
                "echo 'export LD_LIBRARY_PATH=\"$LD_LIBRARY_PATH:/opt/cudnn/lib64:/usr/local/cuda/lib64\"' >> ~/.bashrc",
            ))?
            .ensure_success("export library path")?;
        Ok(())
    }

    fn install_tensorflow(&self, session: &dyn Session, home: &str) -> Result<()> {
        let wheel35 = format!(
            "tensorflow_gpu-{}-cp35-cp35m-linux_x86_64.whl",
            self.tensorflow_version
        );
        session
            .sudo(&RemoteCommand::new("wget").arg(format!(
                "https://storage.googleapis.com/tensorflow/linux/gpu/tensorflow_gpu-{}-cp27-none-linux_x86_64.whl",
                self.tensorflow_version
            )))?
            .ensure_success("download tensorflow cp27 wheel")?;
        session
            .sudo(&RemoteCommand::new("wget").arg(format!(
                "https://storage.googleapis.com/tensorflow/linux/gpu/{}",
                wheel35
            )))?
            .ensure_success("download tensorflow cp35 wheel")?;
        session
            .sudo(&crate::steps::pip_install("python3.8", &["--upgrade", &wheel35]))?
            .ensure_success("install tensorflow")?;
        session
            .sudo(&RemoteCommand::shell(format!("rm -rf {}/tensorflow_gpu-*", home)))?
            .ensure_success("remove wheels")?;
        Ok(())
    }

    fn start_tensorboard(&self, session: &dyn Session, user: &str) -> Result<()> {
        session
            .sudo(&RemoteCommand::new("mkdir").args(["-p", "/var/log/tensorboard"]))?
            .ensure_success("create tensorboard log dir")?;
        session
            .sudo(
                &RemoteCommand::new("chown")
                    .arg(format!("{0}:{0}", user))
                    .args(["-R", "/var/log/tensorboard"]),
            )?
            .ensure_success("chown tensorboard log dir")?;

        let unit = tensorboard_unit(user)?;
        let local_unit = std::env::temp_dir().join(format!("tensorboard_{}.service", user));
        fs::write(&local_unit, &unit)?;
        session.put(&local_unit, "/tmp/tensorboard.service")?;
        let _ = fs::remove_file(&local_unit);

        session
            .sudo(&RemoteCommand::new("chmod").args(["644", "/tmp/tensorboard.service"]))?
            .ensure_success("set unit permissions")?;
        session
            .sudo(&RemoteCommand::new("cp").args([
                "/tmp/tensorboard.service",
                "/etc/systemd/system/",
            ]))?
            .ensure_success("install tensorboard unit")?;
        session
            .sudo(&RemoteCommand::new("systemctl").arg("daemon-reload"))?
            .ensure_success("systemctl daemon-reload")?;
        session
            .sudo(&RemoteCommand::new("systemctl").args(["enable", "tensorboard"]))?
            .ensure_success("enable tensorboard")?;
        session
            .sudo(&RemoteCommand::new("systemctl").args(["start", "tensorboard"]))?
            .ensure_success("start tensorboard")?;
        Ok(())
    }
}
