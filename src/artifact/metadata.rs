use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::fingerprint::Fingerprints;
use crate::instance::HostedInstance;
use crate::unit::DeploymentTemplate;

/// Human-inspectable record stored as `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub name: String,
    pub model: String,
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub photon_type: String,
    pub requirement_dependency: Vec<String>,
    pub system_dependency: Vec<String>,
    pub deployment_template: DeploymentTemplate,
    pub image: String,
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    pub exposed_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_liveness_tcp_port: Option<u16>,
    #[serde(default)]
    pub vcs_url: Option<String>,
    pub openapi_schema: Value,
    pub unit: UnitRecord,
    pub fingerprints: Fingerprints,
}

/// Where the unit's members live inside the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub type_name: String,
    pub state_file: String,
    pub state_crc32: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// Why no source snapshot was stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    #[serde(default)]
    pub extra_files: Vec<String>,
}

impl ArtifactMetadata {
    pub(crate) fn describe(instance: &Arc<HostedInstance>, unit: UnitRecord) -> Self {
        let def = instance.definition();
        Self {
            name: instance.name().to_string(),
            model: instance.model().to_string(),
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            photon_type: def.type_name().to_string(),
            requirement_dependency: def.requirement_dependency(),
            system_dependency: def.system_dependency(),
            deployment_template: def.deployment_template(),
            image: def.image(),
            args: def.args(),
            cmd: def.cmd(),
            exposed_port: def.exposed_port(),
            health_check_liveness_tcp_port: def.health_check_liveness_tcp_port(),
            vcs_url: def.vcs_url(),
            openapi_schema: instance.openapi_document(),
            unit,
            fingerprints: Fingerprints::current(),
        }
    }
}
