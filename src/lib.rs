//! notebook-provision library
//!
//! Provisioning functions that configure a RHEL-family host for data-science
//! notebook workloads over an explicit remote session. Every capability is an
//! idempotent step gated by a marker file on the target; OS package
//! installation instead classifies its outcome per package and never aborts a
//! batch.

pub mod cli;
pub mod config;
pub mod error;
pub mod marker;
pub mod os_packages;
pub mod process_guard;
pub mod session;
pub mod step;
pub mod steps;
pub mod templates;

// Re-export main types for convenience
pub use config::{Application, ProvisionConfig, VersionPins};
pub use error::{ProvisionError, Result};
pub use marker::{marker_path, write_marker};
pub use os_packages::{
    get_available_os_pkgs, install_os_pkgs, remove_os_pkgs, PkgRequest, PkgStatus, PkgStatusKind,
};
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use session::{shell_quote, CommandOutput, RemoteCommand, Session, SshSession};
pub use step::{run_step, ProvisionStep, StepOutcome};
pub use steps::gpu::InstallTensor;
pub use steps::jvm::{EnsureJreJdk, EnsureSbt, EnsureScala, InstallMaven};
pub use steps::misc::{InstallGitlabCert, InstallLivyDependencies};
pub use steps::ml::{InstallCaffe2, InstallCntk, InstallKeras, InstallMxnet, InstallOpencv, InstallTheano};
pub use steps::nodejs::InstallNodejs;
pub use steps::proxy::EnableProxy;
pub use steps::python::{
    EnsureAdditionalPythonLibs, EnsureMatplot, EnsurePython3Libraries,
    EnsurePython3SpecificVersion,
};
pub use steps::r::{EnsureR, EnsureRLocalKernel};
pub use steps::rstudio::InstallRstudio;
pub use templates::{r_kernel_spec, tensorboard_unit, Template};
