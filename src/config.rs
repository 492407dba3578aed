//! Provisioning configuration
//!
//! Shared parameters that every step can consult: the notebook OS user, the
//! application flavour being provisioned, and the version pins the external
//! driver supplies through the environment. Step-specific parameters
//! (download links, passwords, toolkit versions) live on the step structs
//! themselves.
//!
//! Configurations serialize to JSON so a driver can snapshot exactly what a
//! host was provisioned with.

use crate::error::{ProvisionError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use strum::{Display, EnumIter, EnumString};

/// Notebook application flavour, as supplied by the external driver.
///
/// Gates the application-specific branches: the SciPy stack goes on Jupyter
/// and Zeppelin hosts, the OpenCV/h5py extras and numpy re-pins go on Tensor
/// and DeepLearning hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Application {
    #[default]
    Jupyter,
    Zeppelin,
    Tensor,
    DeepLearning,
    Rstudio,
}

impl Application {
    /// Hosts that get the general-purpose scientific Python stack.
    pub fn wants_scipy_stack(&self) -> bool {
        matches!(self, Self::Jupyter | Self::Zeppelin)
    }

    /// Hosts that get GPU-oriented Python extras and numpy re-pins.
    pub fn wants_gpu_stack(&self) -> bool {
        matches!(self, Self::Tensor | Self::DeepLearning)
    }
}

/// Version pins read from the environment.
///
/// The variable names are the contract with the external driver and are kept
/// verbatim; a pin a step needs but the driver did not supply surfaces as a
/// configuration error naming the variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionPins {
    pub pip: Option<String>,
    pub numpy: Option<String>,
    pub keras: Option<String>,
    pub tornado: Option<String>,
    pub ipykernel: Option<String>,
}

/// Environment variable names for each pin, in declaration order.
const PIN_VARS: &[(&str, fn(&VersionPins) -> &Option<String>)] = &[
    ("conf_pip_version", |p| &p.pip),
    ("notebook_numpy_version", |p| &p.numpy),
    ("notebook_keras_version", |p| &p.keras),
    ("notebook_tornado_version", |p| &p.tornado),
    ("notebook_ipykernel_version", |p| &p.ipykernel),
];

impl VersionPins {
    /// Read every pin that is present in the environment.
    pub fn from_env() -> Self {
        Self {
            pip: std::env::var("conf_pip_version").ok(),
            numpy: std::env::var("notebook_numpy_version").ok(),
            keras: std::env::var("notebook_keras_version").ok(),
            tornado: std::env::var("notebook_tornado_version").ok(),
            ipykernel: std::env::var("notebook_ipykernel_version").ok(),
        }
    }

    fn require<'a>(field: &'a Option<String>, var: &str) -> Result<&'a str> {
        field
            .as_deref()
            .ok_or_else(|| ProvisionError::config(format!("missing {}", var)))
    }

    pub fn pip(&self) -> Result<&str> {
        Self::require(&self.pip, "conf_pip_version")
    }

    pub fn numpy(&self) -> Result<&str> {
        Self::require(&self.numpy, "notebook_numpy_version")
    }

    pub fn keras(&self) -> Result<&str> {
        Self::require(&self.keras, "notebook_keras_version")
    }

    pub fn tornado(&self) -> Result<&str> {
        Self::require(&self.tornado, "notebook_tornado_version")
    }

    pub fn ipykernel(&self) -> Result<&str> {
        Self::require(&self.ipykernel, "notebook_ipykernel_version")
    }
}

/// Shared provisioning configuration passed to every step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// OS user owning the notebook environment (e.g. `datalab-user`).
    pub os_user: String,
    /// Application flavour being provisioned.
    pub application: Application,
    /// Version pins supplied by the driver.
    pub pins: VersionPins,
}

impl ProvisionConfig {
    /// Build a configuration from CLI-supplied user plus the environment.
    pub fn from_env(os_user: impl Into<String>) -> Result<Self> {
        let application = match std::env::var("application") {
            Ok(raw) => raw.parse().map_err(|_| {
                ProvisionError::config(format!("unknown application '{}'", raw))
            })?,
            Err(_) => Application::default(),
        };
        let config = Self {
            os_user: os_user.into(),
            application,
            pins: VersionPins::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// The user name ends up in home-directory paths and `chown` invocations,
    /// so it gets the strict check. Pins are validated for shape only when
    /// present; absence is caught by the step that needs them.
    pub fn validate(&self) -> Result<()> {
        let user = self.os_user.trim();
        if user.is_empty() {
            return Err(ProvisionError::config("os user must be specified"));
        }
        if !user
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        {
            return Err(ProvisionError::config(
                "os user must start with a lowercase letter or underscore",
            ));
        }
        if !user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ProvisionError::config(
                "os user may only contain letters, digits, underscores, and hyphens",
            ));
        }

        for (var, get) in PIN_VARS {
            if let Some(value) = get(&self.pins) {
                if value.trim().is_empty() || value.chars().any(char::is_whitespace) {
                    return Err(ProvisionError::config(format!(
                        "{} has an invalid value '{}'",
                        var, value
                    )));
                }
            }
        }
        Ok(())
    }

    /// Home directory of the notebook user on the target host.
    pub fn home_dir(&self) -> String {
        format!("/home/{}", self.os_user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ProvisionConfig {
        ProvisionConfig {
            os_user: "datalab-user".to_string(),
            application: Application::Tensor,
            pins: VersionPins {
                pip: Some("21.1.1".to_string()),
                numpy: Some("1.14.3".to_string()),
                keras: Some("2.1.6".to_string()),
                tornado: Some("5.1.1".to_string()),
                ipykernel: Some("4.8.2".to_string()),
            },
        }
    }

    #[test]
    fn test_application_parses_driver_values() {
        assert_eq!("jupyter".parse::<Application>().unwrap(), Application::Jupyter);
        assert_eq!(
            "deeplearning".parse::<Application>().unwrap(),
            Application::DeepLearning
        );
        assert!("notebook".parse::<Application>().is_err());
    }

    #[test]
    fn test_application_gating() {
        assert!(Application::Jupyter.wants_scipy_stack());
        assert!(Application::Zeppelin.wants_scipy_stack());
        assert!(!Application::Tensor.wants_scipy_stack());

        assert!(Application::Tensor.wants_gpu_stack());
        assert!(Application::DeepLearning.wants_gpu_stack());
        assert!(!Application::Rstudio.wants_gpu_stack());
    }

    #[test]
    fn test_validate_accepts_sane_config() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_user() {
        let mut config = sample_config();
        config.os_user = String::new();
        assert!(config.validate().is_err());

        config.os_user = "Datalab".to_string();
        assert!(config.validate().is_err());

        config.os_user = "datalab user".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_pin_with_whitespace() {
        let mut config = sample_config();
        config.pins.numpy = Some("1.14 .3".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_pin_names_env_var() {
        let pins = VersionPins::default();
        let err = pins.numpy().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: missing notebook_numpy_version"
        );
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provision.json");

        let config = sample_config();
        config.save_to_file(&path).unwrap();
        let loaded = ProvisionConfig::load_from_file(&path).unwrap();

        assert_eq!(loaded.os_user, config.os_user);
        assert_eq!(loaded.application, config.application);
        assert_eq!(loaded.pins.keras.as_deref(), Some("2.1.6"));
    }

    #[test]
    fn test_home_dir() {
        assert_eq!(sample_config().home_dir(), "/home/datalab-user");
    }
}
