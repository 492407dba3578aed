//! Template rendering
//!
//! Two files get parameter-substituted and uploaded to the target host: the
//! Jupyter R kernel spec and the TensorBoard systemd unit. Tokens are bare
//! uppercase words (`R_VER`, `SP_VER`, `OS_USR`); each template declares its
//! token set so rendering can prove that nothing survived substitution.

use crate::error::{ProvisionError, Result};
use std::fs;
use std::path::Path;

/// Jupyter R kernel spec template, tokens `R_VER` and `SP_VER`.
pub const R_KERNEL_TEMPLATE: &str = include_str!("../templates/r_kernel.json");

/// TensorBoard systemd unit template, token `OS_USR`.
pub const TENSORBOARD_UNIT_TEMPLATE: &str = include_str!("../templates/tensorboard.service");

/// A template together with the tokens it is required to consume.
#[derive(Debug, Clone, Copy)]
pub struct Template<'a> {
    text: &'a str,
    tokens: &'a [&'a str],
}

impl<'a> Template<'a> {
    /// Wrap template text with its declared token set.
    pub fn new(text: &'a str, tokens: &'a [&'a str]) -> Self {
        Self { text, tokens }
    }

    /// Substitute `subs` into the template.
    ///
    /// Fails if any declared token survives in the output — either because no
    /// substitution was supplied for it or because a supplied value
    /// reintroduced it.
    pub fn render(&self, subs: &[(&str, &str)]) -> Result<String> {
        let mut out = self.text.to_string();
        for (token, value) in subs {
            out = out.replace(token, value);
        }
        for token in self.tokens {
            if out.contains(token) {
                return Err(ProvisionError::template(format!(
                    "token {} not substituted",
                    token
                )));
            }
        }
        Ok(out)
    }
}

/// Render the R kernel spec for a concrete R and Spark version.
pub fn r_kernel_spec(r_version: &str, spark_version: &str) -> Result<String> {
    Template::new(R_KERNEL_TEMPLATE, &["R_VER", "SP_VER"])
        .render(&[("R_VER", r_version), ("SP_VER", spark_version)])
}

/// Render the TensorBoard unit for the notebook user.
pub fn tensorboard_unit(os_user: &str) -> Result<String> {
    Template::new(TENSORBOARD_UNIT_TEMPLATE, &["OS_USR"]).render(&[("OS_USR", os_user)])
}

/// Render a template file from disk against a token set.
pub fn render_file(path: &Path, tokens: &[&str], subs: &[(&str, &str)]) -> Result<String> {
    let text = fs::read_to_string(path)?;
    Template::new(&text, tokens).render(subs)
}
