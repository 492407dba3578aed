use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// notebook-provision - provision RHEL-family notebook hosts over SSH
#[derive(Parser)]
#[command(name = "notebook-provision")]
#[command(about = "Provision a RHEL-family host for data-science notebook workloads")]
#[command(version)]
pub struct Cli {
    /// Target host to provision
    #[arg(long, global = true, default_value = "localhost")]
    pub host: String,

    /// SSH port on the target host
    #[arg(long, global = true, default_value_t = 22)]
    pub port: u16,

    /// SSH login user (also the notebook OS user unless --os-user is given)
    #[arg(long, global = true, default_value = "datalab-user")]
    pub user: String,

    /// Notebook OS user owning the provisioned environment
    #[arg(long, global = true)]
    pub os_user: Option<String>,

    /// SSH identity file
    #[arg(long, global = true)]
    pub identity: Option<PathBuf>,

    /// Dry-run mode: log every remote command without executing it.
    ///
    /// Marker checks report "not provisioned" in this mode so the preview
    /// covers the full action sequence of each step.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Effective notebook OS user.
    pub fn effective_os_user(&self) -> &str {
        self.os_user.as_deref().unwrap_or(&self.user)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a provisioning step
    Step {
        #[command(subcommand)]
        step: StepCommands,
    },
    /// OS package operations
    Pkg {
        #[command(subcommand)]
        pkg: PkgCommands,
    },
    /// Validate a saved provisioning configuration file
    Validate {
        /// Path to configuration file to validate
        config: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum StepCommands {
    /// Point the host at an HTTP proxy (always runs)
    Proxy {
        /// Proxy host name
        #[arg(long)]
        proxy_host: String,
        /// Proxy port
        #[arg(long)]
        proxy_port: u16,
    },
    /// Install the R runtime and notebook R libraries
    R {
        /// CRAN package to install (repeatable)
        #[arg(long = "lib")]
        r_libs: Vec<String>,
        /// Cloud region of the target host
        #[arg(long, default_value = "us-east-1")]
        region: String,
        /// Region-local CRAN mirror
        #[arg(long, default_value = "")]
        r_mirror: String,
    },
    /// Register the Jupyter R kernel and install SparkR
    RKernel {
        /// Spark version substituted into the kernel spec
        #[arg(long)]
        spark_version: String,
        /// Jupyter kernels directory on the target
        #[arg(long)]
        kernels_dir: String,
    },
    /// Install and configure RStudio Server
    Rstudio {
        /// SPARK_HOME for the notebook user
        #[arg(long)]
        spark_path: String,
        /// Password for the notebook user
        #[arg(long)]
        password: String,
        /// RStudio Server version
        #[arg(long)]
        version: String,
    },
    /// Build a pinned CPython from source
    Python3 {
        /// Python version (x.y or x.y.z)
        #[arg(long)]
        version: String,
    },
    /// Install the python35u toolchain and kernel libraries
    Python3Libs,
    /// Install the application-gated scientific Python stack
    PythonExtras,
    /// Install matplotlib
    Matplot,
    /// Install OpenJDK 8
    JreJdk,
    /// Install Scala from a vendor RPM
    Scala {
        /// Base URL the RPM lives under (trailing slash included)
        #[arg(long)]
        link: String,
        /// Scala version
        #[arg(long)]
        version: String,
    },
    /// Install Apache Maven
    Maven {
        /// Maven version
        #[arg(long, default_value = "3.3.9")]
        version: String,
    },
    /// Install SBT
    Sbt,
    /// Install Node.js
    Nodejs,
    /// Install the GPU stack: NVIDIA driver, CUDA, cuDNN, TensorFlow
    Tensor {
        #[arg(long)]
        cuda_version: String,
        #[arg(long)]
        cuda_file: String,
        #[arg(long)]
        cudnn_version: String,
        #[arg(long)]
        cudnn_file: String,
        #[arg(long)]
        tensorflow_version: String,
        #[arg(long)]
        nvidia_version: String,
    },
    /// Build OpenCV 3.2.0 from source
    Opencv,
    /// Build Caffe2 from the pytorch tree
    Caffe2 {
        #[arg(long)]
        version: String,
        #[arg(long)]
        cmake_version: String,
    },
    /// Install CNTK
    Cntk {
        #[arg(long)]
        version: String,
    },
    /// Install Keras
    Keras {
        #[arg(long)]
        version: String,
    },
    /// Install Theano
    Theano {
        #[arg(long)]
        version: String,
    },
    /// Install MXNet
    Mxnet {
        #[arg(long)]
        version: String,
    },
    /// Install Livy Python dependencies
    Livy,
    /// Install a GitLab certificate into the CA trust (always runs)
    GitlabCert {
        /// Certificate file name, already uploaded to the user's home
        #[arg(long)]
        certfile: String,
    },
}

#[derive(Subcommand)]
pub enum PkgCommands {
    /// Install OS packages and report a per-package status list as JSON
    Install {
        /// Package specs, `name` or `name=version`
        #[arg(required = true)]
        specs: Vec<String>,
    },
    /// Remove OS packages
    Remove {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// List available OS packages as a name-to-version JSON map
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_os_user_defaults_to_login_user() {
        let cli = Cli::parse_from(["notebook-provision", "step", "sbt"]);
        assert_eq!(cli.effective_os_user(), "datalab-user");
    }

    #[test]
    fn test_effective_os_user_override() {
        let cli = Cli::parse_from([
            "notebook-provision",
            "--user",
            "ec2-user",
            "--os-user",
            "jovyan",
            "step",
            "sbt",
        ]);
        assert_eq!(cli.effective_os_user(), "jovyan");
    }

    #[test]
    fn test_pkg_install_requires_specs() {
        assert!(Cli::try_parse_from(["notebook-provision", "pkg", "install"]).is_err());
    }
}
