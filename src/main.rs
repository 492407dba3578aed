//! notebook-provision - Main entry point
//!
//! Thin driver over the library: builds the SSH session, loads the shared
//! configuration from the environment, and dispatches the requested step or
//! package operation. Exit codes are the driver's concern; the library only
//! ever returns errors.

use log::{error, info, warn};
use notebook_provision::cli::{Cli, Commands, PkgCommands, StepCommands};
use notebook_provision::steps;
use notebook_provision::{
    install_os_pkgs, remove_os_pkgs, run_step, PkgRequest, ProcessGuard, ProvisionConfig,
    ProvisionStep, SshSession, StepOutcome,
};

/// Initialize the logger with appropriate settings
fn init_logger() {
    use env_logger::Builder;
    use std::io::Write;

    Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}:{}] {}",
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env() // Allows RUST_LOG env var to override
        .init();
}

fn build_session(cli: &Cli) -> SshSession {
    let mut session =
        SshSession::new(&cli.host, &cli.user).with_port(cli.port).with_dry_run(cli.dry_run);
    if let Some(identity) = &cli.identity {
        session = session.with_identity(identity);
    }
    session
}

fn build_step(step: StepCommands) -> Box<dyn ProvisionStep> {
    match step {
        StepCommands::Proxy {
            proxy_host,
            proxy_port,
        } => Box::new(steps::proxy::EnableProxy {
            proxy_host,
            proxy_port,
        }),
        StepCommands::R {
            r_libs,
            region,
            r_mirror,
        } => Box::new(steps::r::EnsureR {
            r_libs,
            region,
            r_mirror,
        }),
        StepCommands::RKernel {
            spark_version,
            kernels_dir,
        } => Box::new(steps::r::EnsureRLocalKernel {
            spark_version,
            kernels_dir,
        }),
        StepCommands::Rstudio {
            spark_path,
            password,
            version,
        } => Box::new(steps::rstudio::InstallRstudio {
            local_spark_path: spark_path,
            rstudio_pass: password,
            rstudio_version: version,
        }),
        StepCommands::Python3 { version } => Box::new(steps::python::EnsurePython3SpecificVersion {
            python3_version: version,
        }),
        StepCommands::Python3Libs => Box::new(steps::python::EnsurePython3Libraries),
        StepCommands::PythonExtras => Box::new(steps::python::EnsureAdditionalPythonLibs),
        StepCommands::Matplot => Box::new(steps::python::EnsureMatplot),
        StepCommands::JreJdk => Box::new(steps::jvm::EnsureJreJdk),
        StepCommands::Scala { link, version } => Box::new(steps::jvm::EnsureScala {
            scala_link: link,
            scala_version: version,
        }),
        StepCommands::Maven { version } => Box::new(steps::jvm::InstallMaven {
            maven_version: version,
        }),
        StepCommands::Sbt => Box::new(steps::jvm::EnsureSbt),
        StepCommands::Nodejs => Box::new(steps::nodejs::InstallNodejs),
        StepCommands::Tensor {
            cuda_version,
            cuda_file,
            cudnn_version,
            cudnn_file,
            tensorflow_version,
            nvidia_version,
        } => Box::new(steps::gpu::InstallTensor {
            cuda_version,
            cuda_file_name: cuda_file,
            cudnn_version,
            cudnn_file_name: cudnn_file,
            tensorflow_version,
            nvidia_version,
        }),
        StepCommands::Opencv => Box::new(steps::ml::InstallOpencv),
        StepCommands::Caffe2 {
            version,
            cmake_version,
        } => Box::new(steps::ml::InstallCaffe2 {
            caffe2_version: version,
            cmake_version,
        }),
        StepCommands::Cntk { version } => Box::new(steps::ml::InstallCntk {
            cntk_version: version,
        }),
        StepCommands::Keras { version } => Box::new(steps::ml::InstallKeras {
            keras_version: version,
        }),
        StepCommands::Theano { version } => Box::new(steps::ml::InstallTheano {
            theano_version: version,
        }),
        StepCommands::Mxnet { version } => Box::new(steps::ml::InstallMxnet {
            mxnet_version: version,
        }),
        StepCommands::Livy => Box::new(steps::misc::InstallLivyDependencies),
        StepCommands::GitlabCert { certfile } => {
            Box::new(steps::misc::InstallGitlabCert { certfile })
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_logger();
    info!("notebook-provision starting up");

    // Clean up ssh/scp children if we are interrupted mid-provision
    if let Err(e) = notebook_provision::process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    let _guard = ProcessGuard::new();

    let cli = Cli::parse_args();

    if let Commands::Validate { config } = &cli.command {
        match ProvisionConfig::load_from_file(config) {
            Ok(_) => {
                println!("configuration file is valid: {}", config.display());
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let session = build_session(&cli);
    let config = ProvisionConfig::from_env(cli.effective_os_user())?;

    match cli.command {
        Commands::Step { step } => {
            let step = build_step(step);
            match run_step(&session, &config, step.as_ref())? {
                StepOutcome::Provisioned => info!("Step completed"),
                StepOutcome::AlreadyProvisioned => info!("Step already provisioned, skipped"),
            }
        }
        Commands::Pkg { pkg } => match pkg {
            PkgCommands::Install { specs } => {
                let requests: Vec<PkgRequest> =
                    specs.iter().map(|spec| PkgRequest::parse(spec)).collect();
                let statuses = install_os_pkgs(&session, &requests);
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            }
            PkgCommands::Remove { names } => {
                remove_os_pkgs(&session, &names)?;
                info!("Removed {} package(s)", names.len());
            }
            PkgCommands::List => {
                let available = notebook_provision::get_available_os_pkgs(&session)?;
                println!("{}", serde_json::to_string_pretty(&available)?);
            }
        },
        Commands::Validate { .. } => unreachable!("handled above"),
    }

    Ok(())
}
