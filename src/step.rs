//! Provisioning step contract and runner
//!
//! This module provides the ONLY sanctioned way to execute provisioning
//! steps. All step execution MUST go through [`run_step`] to ensure:
//!
//! - the marker file is consulted before any remote action,
//! - the marker is written only after the step fully succeeded,
//! - already-provisioned hosts still get their `refresh` hook.
//!
//! A step that fails leaves no marker behind; re-running it starts the action
//! sequence from the top. There is no partial retry and no rollback.

use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::marker::{marker_exists, marker_path, write_marker};
use crate::session::Session;
use log::info;

/// An idempotent unit of remote configuration work.
///
/// Implementors carry their own parameters (download links, versions,
/// passwords) as struct fields; shared parameters come in through the
/// [`ProvisionConfig`].
pub trait ProvisionStep {
    /// Step name; also the stem of the marker file (`<name>_ensured`).
    fn name(&self) -> &'static str;

    /// Marker path gating this step, or `None` for steps that always run.
    fn marker(&self, config: &ProvisionConfig) -> Option<String> {
        Some(marker_path(&config.os_user, self.name()))
    }

    /// Execute the action sequence on the target host.
    fn provision(&self, session: &dyn Session, config: &ProvisionConfig) -> Result<()>;

    /// Hook run instead of `provision` when the marker already exists.
    ///
    /// Most steps do nothing here; RStudio re-applies the user password so a
    /// rotated credential reaches an already-provisioned host.
    fn refresh(&self, session: &dyn Session, config: &ProvisionConfig) -> Result<()> {
        let _ = (session, config);
        Ok(())
    }
}

/// Outcome of running a step through [`run_step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The marker was present; only the refresh hook ran.
    AlreadyProvisioned,
    /// The action sequence ran to completion and the marker was written.
    Provisioned,
}

/// Execute a provisioning step with marker gating.
pub fn run_step(
    session: &dyn Session,
    config: &ProvisionConfig,
    step: &dyn ProvisionStep,
) -> Result<StepOutcome> {
    let marker = step.marker(config);

    if let Some(path) = &marker {
        if marker_exists(session, path)? {
            info!("Step '{}' already provisioned ({})", step.name(), path);
            step.refresh(session, config)?;
            return Ok(StepOutcome::AlreadyProvisioned);
        }
    }

    info!("Running step '{}'", step.name());
    step.provision(session, config)?;

    if let Some(path) = &marker {
        write_marker(session, path)?;
    }
    info!("Step '{}' provisioned", step.name());
    Ok(StepOutcome::Provisioned)
}
