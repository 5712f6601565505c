//! Artifact codec: packs a hosted instance (state, source snapshot, bundled
//! files and metadata) into a gzip-compressed tar archive and rebuilds it.

mod archive;
pub mod codec;
pub mod fingerprint;
pub mod metadata;

#[cfg(test)]
mod codec_test;

pub use codec::{load, load_metadata, save, save_to, Artifact, CodecError};
pub use fingerprint::{Fingerprints, RUNTIME_VERSION, SCHEMA_DIALECT, STATE_FORMAT};
pub use metadata::{ArtifactMetadata, UnitRecord};

pub const METADATA_FILE: &str = "metadata.json";
pub const STATE_FILE: &str = "obj.state";
pub const SOURCE_DIR: &str = "src";
pub const FILES_DIR: &str = "files";
