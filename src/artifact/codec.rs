use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::archive::{extract_entry, ArchiveReader, ArchiveWriter};
use super::fingerprint::STATE_FORMAT;
use super::metadata::{ArtifactMetadata, UnitRecord};
use super::{FILES_DIR, METADATA_FILE, SOURCE_DIR, STATE_FILE};
use crate::instance::{Captured, Captures, Catalog, HostedInstance};
use crate::logfile;
use crate::unit::SourceRef;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("artifact i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact is corrupt: {0}")]
    Corrupt(String),

    #[error("artifact has no `{0}` member")]
    MissingMember(String),

    #[error("artifact member `{member}` is malformed: {source}")]
    Malformed {
        member: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("state checksum mismatch: recorded {recorded:08x}, computed {computed:08x}")]
    Checksum { recorded: u32, computed: u32 },

    #[error("state format {found} cannot be read by this runtime, which expects {expected}")]
    IncompatibleFormat { found: u32, expected: u32 },

    #[error("state belongs to unit `{found}` but metadata names `{expected}`")]
    UnitMismatch { expected: String, found: String },

    #[error("unit type `{0}` is not registered in the catalog")]
    UnknownUnit(String),

    #[error("state references binding `{0}` which is not registered in the catalog")]
    UnresolvedBinding(String),

    #[error("state holds opaque `{0}` without a registered reconstructor")]
    UnknownOpaque(String),

    #[error("cannot capture state: {0}")]
    Capture(String),
}

/// Serialized form of an instance's state graph.
#[derive(Debug, Serialize, Deserialize)]
struct StateBlob {
    format: u32,
    unit: String,
    initialized: bool,
    slots: BTreeMap<String, Captured>,
    captures: Captures,
}

/// An immutable archive produced by [`save`].
#[derive(Debug, Clone)]
pub struct Artifact {
    metadata: ArtifactMetadata,
    bytes: Bytes,
}

impl Artifact {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self, CodecError> {
        let bytes = bytes.into();
        let reader = ArchiveReader::read(Cursor::new(&bytes[..]))?;
        let metadata = read_metadata(&reader)?;
        Ok(Self { metadata, bytes })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        Self::from_bytes(fs::read(path)?)
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), CodecError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &self.bytes)?;
        Ok(())
    }

    fn reader(&self) -> Result<ArchiveReader, CodecError> {
        ArchiveReader::read(Cursor::new(&self.bytes[..]))
    }

    /// Source snapshot bytes, if one was stored.
    pub fn source(&self) -> Result<Option<Vec<u8>>, CodecError> {
        let Some(file) = &self.metadata.unit.source_file else {
            return Ok(None);
        };
        let reader = self.reader()?;
        let member = format!("{SOURCE_DIR}/{file}");
        reader
            .get(&member)
            .map(|e| Some(e.data.clone()))
            .ok_or(CodecError::MissingMember(member))
    }

    /// Writes the bundled files under `dest`, preserving relative paths and
    /// permission bits.
    pub fn extract_files(&self, dest: impl AsRef<Path>) -> Result<Vec<PathBuf>, CodecError> {
        let dest = dest.as_ref();
        let reader = self.reader()?;
        let mut written = Vec::new();
        for (rel, entry) in reader.under(FILES_DIR) {
            written.push(extract_entry(dest, rel, entry)?);
        }
        info!(
            component = "codec",
            event = "files_extracted",
            artifact = self.metadata.name.as_str(),
            count = written.len(),
            dest = %dest.display(),
            "bundled files extracted"
        );
        Ok(written)
    }
}

fn read_metadata(reader: &ArchiveReader) -> Result<ArtifactMetadata, CodecError> {
    let entry = reader
        .get(METADATA_FILE)
        .ok_or_else(|| CodecError::MissingMember(METADATA_FILE.to_string()))?;
    serde_json::from_slice(&entry.data).map_err(|source| CodecError::Malformed {
        member: METADATA_FILE.to_string(),
        source,
    })
}

/// Reads only the metadata record of the artifact at `path`.
pub fn load_metadata(path: impl AsRef<Path>) -> Result<ArtifactMetadata, CodecError> {
    Artifact::open(path).map(|a| a.metadata)
}

fn snapshot_source(source: Option<&SourceRef>, unit: &str) -> Result<(String, Vec<u8>), String> {
    match source {
        Some(SourceRef::File(path)) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| format!("source path {} has no file name", path.display()))?;
            fs::read(path)
                .map(|data| (name, data))
                .map_err(|e| format!("cannot read source {}: {e}", path.display()))
        }
        Some(SourceRef::Text { name, text }) => Ok((name.clone(), text.clone().into_bytes())),
        None => Err(format!("unit `{unit}` has no resolvable source")),
    }
}

/// Packs `instance` into an artifact.
pub fn save(instance: &Arc<HostedInstance>) -> Result<Artifact, CodecError> {
    let def = instance.definition();
    let unit = def.type_name().to_string();

    let blob = StateBlob {
        format: STATE_FORMAT,
        unit: unit.clone(),
        initialized: instance.is_initialized(),
        slots: instance.state().snapshot(),
        captures: instance.captures(),
    };
    let state = {
        let _suspended = logfile::suspend();
        serde_json::to_vec(&blob).map_err(|e| CodecError::Capture(e.to_string()))?
    };
    let state_crc32 = crc32fast::hash(&state);

    let mut writer = ArchiveWriter::new(Vec::new());
    writer.add_bytes(STATE_FILE, &state, 0o644)?;

    let (source_file, source_error) = match snapshot_source(def.source(), &unit) {
        Ok((name, data)) => {
            writer.add_bytes(&format!("{SOURCE_DIR}/{name}"), &data, 0o644)?;
            (Some(name), None)
        }
        Err(reason) => {
            warn!(
                component = "codec",
                event = "source_unavailable",
                unit = unit.as_str(),
                reason = reason.as_str(),
                "source snapshot skipped"
            );
            (None, Some(reason))
        }
    };

    let mut extra_files = Vec::new();
    for extra in def.extra_files() {
        let name = format!("{FILES_DIR}/{}", extra.archive_path.trim_matches('/'));
        let written = writer.add_path(&name, &extra.source)?;
        extra_files.extend(
            written
                .into_iter()
                .filter_map(|n| n.strip_prefix(&format!("{FILES_DIR}/")).map(str::to_string)),
        );
    }

    let record = UnitRecord {
        type_name: unit.clone(),
        state_file: STATE_FILE.to_string(),
        state_crc32,
        source_file,
        source_error,
        extra_files,
    };
    let metadata = ArtifactMetadata::describe(instance, record);
    let encoded = serde_json::to_vec_pretty(&metadata).map_err(|e| CodecError::Capture(e.to_string()))?;
    writer.add_bytes(METADATA_FILE, &encoded, 0o644)?;

    let bytes = writer.finish()?;
    info!(
        component = "codec",
        event = "saved",
        unit = unit.as_str(),
        name = metadata.name.as_str(),
        id = %metadata.id,
        size = bytes.len(),
        "artifact saved"
    );

    Ok(Artifact {
        metadata,
        bytes: Bytes::from(bytes),
    })
}

/// Packs `instance` and writes the artifact to `path`.
pub fn save_to(instance: &Arc<HostedInstance>, path: impl AsRef<Path>) -> Result<Artifact, CodecError> {
    let artifact = save(instance)?;
    artifact.write_to(path)?;
    Ok(artifact)
}

fn verify_resolvable<'a>(
    values: impl Iterator<Item = &'a Captured>,
    catalog: &Catalog,
) -> Result<(), CodecError> {
    for value in values {
        match value {
            Captured::Binding { name } if !catalog.has_binding(name) => {
                return Err(CodecError::UnresolvedBinding(name.clone()))
            }
            Captured::Opaque { tag, .. } if !catalog.has_reconstructor(tag) => {
                return Err(CodecError::UnknownOpaque(tag.clone()))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Rebuilds a hosted instance from `artifact`. The unit type is resolved in
/// `catalog`.
pub fn load(artifact: &Artifact, catalog: Arc<Catalog>) -> Result<Arc<HostedInstance>, CodecError> {
    let metadata = &artifact.metadata;
    metadata.fingerprints.check(&metadata.name)?;

    let reader = artifact.reader()?;
    let state_file = &metadata.unit.state_file;
    let state = reader
        .get(state_file)
        .ok_or_else(|| CodecError::MissingMember(state_file.clone()))?;
    let computed = crc32fast::hash(&state.data);
    if computed != metadata.unit.state_crc32 {
        return Err(CodecError::Checksum {
            recorded: metadata.unit.state_crc32,
            computed,
        });
    }

    let blob: StateBlob = serde_json::from_slice(&state.data).map_err(|source| CodecError::Malformed {
        member: state_file.clone(),
        source,
    })?;
    if blob.format != STATE_FORMAT {
        return Err(CodecError::IncompatibleFormat {
            found: blob.format,
            expected: STATE_FORMAT,
        });
    }
    if blob.unit != metadata.unit.type_name {
        return Err(CodecError::UnitMismatch {
            expected: metadata.unit.type_name.clone(),
            found: blob.unit,
        });
    }

    let definition = catalog
        .unit(&blob.unit)
        .ok_or_else(|| CodecError::UnknownUnit(blob.unit.clone()))?;
    verify_resolvable(
        blob.slots.values().chain(blob.captures.values().flat_map(|c| c.values())),
        &catalog,
    )?;

    let instance = HostedInstance::builder(definition)
        .name(metadata.name.clone())
        .model(metadata.model.clone())
        .catalog(catalog)
        .restored(blob.slots, blob.captures, blob.initialized)
        .build();
    if blob.initialized {
        instance.apply_deployment_template();
    }

    info!(
        component = "codec",
        event = "loaded",
        unit = instance.definition().type_name(),
        name = instance.name(),
        id = %metadata.id,
        initialized = blob.initialized,
        "artifact loaded"
    );
    Ok(instance)
}
