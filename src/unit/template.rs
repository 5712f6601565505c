// Deployment template: resource shape, environment defaults and secret names a
// unit expects from the deployment that hosts it.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::DefinitionError;

/// Environment value marking a variable the deployment must supply.
pub const ENV_VAR_REQUIRED: &str = "ENV_VAR_REQUIRED";

pub const VALID_SHAPES: &[&str] = &[
    "cpu.small",
    "cpu.medium",
    "cpu.large",
    "gpu.t4",
    "gpu.a10",
    "gpu.a10.2xlarge",
    "gpu.a100-40gb",
    "gpu.a100-80gb",
];

static NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap_or_else(|e| panic!("invalid name pattern: {e}"))
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_shape: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub secret: Vec<String>,
}

/// Outcome of applying a template to the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateReport {
    pub defaulted: Vec<String>,
    pub missing_env: Vec<String>,
    pub missing_secrets: Vec<String>,
}

impl DeploymentTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource_shape(mut self, shape: impl Into<String>) -> Self {
        self.resource_shape = Some(shape.into());
        self
    }

    pub fn env(mut self, name: impl Into<String>, default: impl Into<String>) -> Self {
        self.env.insert(name.into(), default.into());
        self
    }

    pub fn required_env(self, name: impl Into<String>) -> Self {
        self.env(name, ENV_VAR_REQUIRED)
    }

    pub fn secret(mut self, name: impl Into<String>) -> Self {
        self.secret.push(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.resource_shape.is_none() && self.env.is_empty() && self.secret.is_empty()
    }

    pub fn validate(&self, unit: &str) -> Result<(), DefinitionError> {
        let fail = |reason: String| DefinitionError::Template {
            unit: unit.to_string(),
            reason,
        };

        if let Some(shape) = &self.resource_shape {
            if !VALID_SHAPES.contains(&shape.as_str()) {
                warn!(
                    component = "template",
                    event = "nonstandard_shape",
                    unit = unit,
                    shape = shape.as_str(),
                    "resource shape is not a standard one, make sure the deployment platform supports it"
                );
            }
        }
        for name in self.env.keys() {
            if !NAME.is_match(name) {
                return Err(fail(format!("invalid environment variable name `{name}`")));
            }
        }
        for name in &self.secret {
            if !NAME.is_match(name) {
                return Err(fail(format!("invalid secret name `{name}`")));
            }
        }
        Ok(())
    }

    /// Exports non-required env defaults that are not already set and warns
    /// about required variables and secrets that are absent. Idempotent.
    pub fn apply(&self, unit: &str) -> TemplateReport {
        let mut report = TemplateReport::default();

        for (name, value) in &self.env {
            if std::env::var_os(name).is_some() {
                continue;
            }
            if value == ENV_VAR_REQUIRED {
                warn!(
                    component = "template",
                    event = "env_missing",
                    unit = unit,
                    name = name.as_str(),
                    "required environment variable is not set, the unit may not work"
                );
                report.missing_env.push(name.clone());
            } else {
                std::env::set_var(name, value);
                info!(
                    component = "template",
                    event = "env_defaulted",
                    unit = unit,
                    name = name.as_str(),
                    "environment variable set to template default"
                );
                report.defaulted.push(name.clone());
            }
        }

        for name in &self.secret {
            if std::env::var_os(name).is_none() {
                warn!(
                    component = "template",
                    event = "secret_missing",
                    unit = unit,
                    name = name.as_str(),
                    "secret is not present in the environment, the unit may not work"
                );
                report.missing_secrets.push(name.clone());
            }
        }

        report
    }
}
