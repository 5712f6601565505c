use serde::{Deserialize, Serialize};
use tracing::warn;

use super::codec::CodecError;

/// Version of the state blob layout. A mismatch cannot be bridged.
pub const STATE_FORMAT: u32 = 1;
pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const SCHEMA_DIALECT: &str = crate::schema::openapi::OPENAPI_VERSION;

/// Versions in effect when an artifact was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprints {
    #[serde(default)]
    pub runtime_version: Option<String>,
    pub state_format: u32,
    #[serde(default)]
    pub schema_dialect: Option<String>,
}

impl Fingerprints {
    pub fn current() -> Self {
        Self {
            runtime_version: Some(RUNTIME_VERSION.to_string()),
            state_format: STATE_FORMAT,
            schema_dialect: Some(SCHEMA_DIALECT.to_string()),
        }
    }

    /// Compares against the running versions. Returns the warnings emitted;
    /// only a state format mismatch is an error.
    pub fn check(&self, artifact: &str) -> Result<Vec<String>, CodecError> {
        if self.state_format != STATE_FORMAT {
            return Err(CodecError::IncompatibleFormat {
                found: self.state_format,
                expected: STATE_FORMAT,
            });
        }

        let mut warnings = Vec::new();
        match self.runtime_version.as_deref() {
            None => warnings.push(format!(
                "`{artifact}` was created without runtime version information, it may not load correctly"
            )),
            Some(v) if v != RUNTIME_VERSION => warnings.push(format!(
                "`{artifact}` was created with runtime {v}, running {RUNTIME_VERSION}"
            )),
            Some(_) => {}
        }
        match self.schema_dialect.as_deref() {
            Some(d) if d != SCHEMA_DIALECT => warnings.push(format!(
                "`{artifact}` publishes schema dialect {d}, running {SCHEMA_DIALECT}"
            )),
            _ => {}
        }

        for w in &warnings {
            warn!(component = "codec", event = "fingerprint_mismatch", artifact = artifact, "{}", w);
        }
        Ok(warnings)
    }
}
