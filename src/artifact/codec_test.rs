use std::fs;
use std::sync::Arc;

use serde_json::Value;

use super::archive::{ArchiveReader, ArchiveWriter};
use super::*;
use crate::instance::{Catalog, HostedInstance, Opaque};
use crate::unit::{EntryPoint, Reply, UnitDefinition};

struct Weights(Vec<u8>);

impl Opaque for Weights {
    const TAG: &'static str = "weights.v1";

    fn encode(&self) -> anyhow::Result<Vec<u8>> {
        Ok(self.0.clone())
    }

    fn decode(blob: &[u8]) -> anyhow::Result<Self> {
        Ok(Weights(blob.to_vec()))
    }
}

fn counter(extra: Option<&std::path::Path>) -> Arc<UnitDefinition> {
    let mut builder = UnitDefinition::builder("Counter")
        .requirement_dependency(["numpy"])
        .source_text("counter.rs", "// counter unit\n")
        .init(|ctx| {
            ctx.state().set("loaded", &true)?;
            Ok(())
        })
        .entry_point(
            EntryPoint::blocking("bump", |ctx, _args| {
                let n = ctx
                    .state()
                    .update::<u64, _, _>("count", |n| {
                        *n += 1;
                        *n
                    })
                    .map_err(anyhow::Error::from)?;
                Ok(Reply::json(n))
            })
            .capture("step", 1),
        );
    if let Some(dir) = extra {
        builder = builder.extra_file("assets", dir);
    }
    builder.build().unwrap()
}

fn catalog_with(def: &Arc<UnitDefinition>) -> Arc<Catalog> {
    let catalog = Catalog::new();
    catalog.register(Arc::clone(def));
    Arc::new(catalog)
}

/// Rewrites the metadata and state members of `artifact`.
fn repack(
    artifact: &Artifact,
    edit_metadata: impl FnOnce(&mut Value),
    edit_state: impl FnOnce(&mut Value),
) -> Artifact {
    let reader = ArchiveReader::read(artifact.as_bytes()).unwrap();
    let mut metadata: Value = serde_json::from_slice(&reader.get(METADATA_FILE).unwrap().data).unwrap();
    let mut state: Value = serde_json::from_slice(&reader.get(STATE_FILE).unwrap().data).unwrap();
    edit_metadata(&mut metadata);
    edit_state(&mut state);

    let mut writer = ArchiveWriter::new(Vec::new());
    writer
        .add_bytes(STATE_FILE, &serde_json::to_vec(&state).unwrap(), 0o644)
        .unwrap();
    writer
        .add_bytes(METADATA_FILE, &serde_json::to_vec(&metadata).unwrap(), 0o644)
        .unwrap();
    Artifact::from_bytes(writer.finish().unwrap()).unwrap()
}

#[tokio::test]
async fn save_and_load_restore_state_and_captures() {
    let def = counter(None);
    let instance = HostedInstance::builder(Arc::clone(&def)).name("my-counter").build();
    instance.ensure_initialized().await.unwrap();
    instance.call("/bump", crate::unit::HttpMethod::Post, Value::Null).await.unwrap();
    instance.call("/bump", crate::unit::HttpMethod::Post, Value::Null).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/counter.photon");
    let saved = save_to(&instance, &path).unwrap();

    let opened = Artifact::open(&path).unwrap();
    assert_eq!(opened.metadata(), saved.metadata());
    assert_eq!(opened.metadata().photon_type, "Counter");
    assert_eq!(opened.metadata().requirement_dependency, ["numpy"]);
    assert_eq!(opened.metadata().unit.source_file.as_deref(), Some("counter.rs"));
    assert_eq!(opened.source().unwrap().as_deref(), Some(&b"// counter unit\n"[..]));
    assert!(opened.metadata().openapi_schema["paths"].get("/bump").is_some());

    let loaded = load(&opened, catalog_with(&def)).unwrap();
    assert_eq!(loaded.name(), "my-counter");
    assert!(loaded.is_initialized());
    assert_eq!(loaded.state().require::<u64>("count").unwrap(), 2);
    assert_eq!(loaded.state().require::<bool>("loaded").unwrap(), true);
    assert_eq!(loaded.captures(), instance.captures());

    let reply = loaded.call("/bump", crate::unit::HttpMethod::Post, Value::Null).await.unwrap();
    assert_eq!(reply.as_json(), Some(&serde_json::json!(3)));
}

#[test]
fn uninitialized_instance_stays_uninitialized() {
    let def = counter(None);
    let artifact = save(&HostedInstance::new(Arc::clone(&def))).unwrap();
    let loaded = load(&artifact, catalog_with(&def)).unwrap();
    assert!(!loaded.is_initialized());
    assert!(!loaded.state().contains("loaded"));
}

#[test]
fn missing_source_is_recorded_not_fatal() {
    let def = UnitDefinition::builder("Anonymous").build().unwrap();
    let artifact = save(&HostedInstance::new(def)).unwrap();

    assert_eq!(artifact.metadata().unit.source_file, None);
    assert!(artifact.metadata().unit.source_error.is_some());
    assert_eq!(artifact.source().unwrap(), None);
}

#[cfg(unix)]
#[test]
fn bundled_files_keep_dotfiles_and_modes() {
    use std::os::unix::fs::PermissionsExt;

    let src = tempfile::tempdir().unwrap();
    fs::create_dir_all(src.path().join("nested")).unwrap();
    fs::write(src.path().join(".env"), "KEY=1\n").unwrap();
    fs::write(src.path().join("nested/run.sh"), "#!/bin/sh\n").unwrap();
    fs::set_permissions(src.path().join("nested/run.sh"), fs::Permissions::from_mode(0o755)).unwrap();

    let def = counter(Some(src.path()));
    let artifact = save(&HostedInstance::new(def)).unwrap();
    assert_eq!(artifact.metadata().unit.extra_files, ["assets/.env", "assets/nested/run.sh"]);

    let dest = tempfile::tempdir().unwrap();
    let written = artifact.extract_files(dest.path()).unwrap();
    assert_eq!(written.len(), 2);
    assert_eq!(fs::read_to_string(dest.path().join("assets/.env")).unwrap(), "KEY=1\n");
    let mode = fs::metadata(dest.path().join("assets/nested/run.sh")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[test]
fn listed_extra_files_match_member_names() {
    let src = tempfile::tempdir().unwrap();
    fs::write(src.path().join("a.txt"), "a").unwrap();

    let def = UnitDefinition::builder("Dotted")
        .extra_file("./assets", src.path())
        .build()
        .unwrap();
    let artifact = save(&HostedInstance::new(def)).unwrap();
    assert_eq!(artifact.metadata().unit.extra_files, ["assets/a.txt"]);

    let dest = tempfile::tempdir().unwrap();
    artifact.extract_files(dest.path()).unwrap();
    assert_eq!(fs::read_to_string(dest.path().join("assets/a.txt")).unwrap(), "a");
}

#[test]
fn garbage_is_corrupt() {
    assert!(matches!(
        Artifact::from_bytes(&b"definitely not gzip"[..]),
        Err(CodecError::Corrupt(_))
    ));
}

#[test]
fn oversized_member_header_is_corrupt() {
    use std::io::Write;

    let mut header = tar::Header::new_gnu();
    header.set_path(crate::artifact::METADATA_FILE).unwrap();
    header.set_size(1 << 44);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();

    let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    gz.write_all(header.as_bytes()).unwrap();
    gz.write_all(&[b'{'; 512]).unwrap();
    let bytes = gz.finish().unwrap();

    assert!(matches!(Artifact::from_bytes(bytes), Err(CodecError::Corrupt(_))));
}

#[test]
fn tampered_state_fails_checksum() {
    let def = counter(None);
    let artifact = save(&HostedInstance::new(Arc::clone(&def))).unwrap();
    let tampered = repack(&artifact, |_| {}, |state| state["initialized"] = Value::Bool(true));

    assert!(matches!(
        load(&tampered, catalog_with(&def)),
        Err(CodecError::Checksum { .. })
    ));
}

#[test]
fn state_format_mismatch_is_fatal() {
    let def = counter(None);
    let artifact = save(&HostedInstance::new(Arc::clone(&def))).unwrap();
    let future = repack(&artifact, |m| m["fingerprints"]["state_format"] = 99.into(), |_| {});

    match load(&future, catalog_with(&def)) {
        Err(CodecError::IncompatibleFormat { found, expected }) => {
            assert_eq!(found, 99);
            assert_eq!(expected, STATE_FORMAT);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn runtime_version_mismatch_only_warns() {
    let def = counter(None);
    let artifact = save(&HostedInstance::new(Arc::clone(&def))).unwrap();
    let state = ArchiveReader::read(artifact.as_bytes()).unwrap().get(STATE_FILE).unwrap().data.clone();
    let crc = crc32fast::hash(&serde_json::to_vec(&serde_json::from_slice::<Value>(&state).unwrap()).unwrap());
    let older = repack(
        &artifact,
        |m| {
            m["fingerprints"]["runtime_version"] = "0.0.1-old".into();
            m["unit"]["state_crc32"] = crc.into();
        },
        |_| {},
    );

    let warnings = older.metadata().fingerprints.check("older").unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(load(&older, catalog_with(&def)).is_ok());

    let mut unversioned = Fingerprints::current();
    unversioned.runtime_version = None;
    assert_eq!(unversioned.check("bare").unwrap().len(), 1);
}

#[test]
fn unknown_unit_type_is_reported() {
    let artifact = save(&HostedInstance::new(counter(None))).unwrap();
    assert!(matches!(
        load(&artifact, Arc::new(Catalog::new())),
        Err(CodecError::UnknownUnit(name)) if name == "Counter"
    ));
}

#[test]
fn unresolvable_references_are_reported() {
    let def = counter(None);

    let instance = HostedInstance::new(Arc::clone(&def));
    instance.state().bind("tok", "tokenizer");
    let artifact = save(&instance).unwrap();
    assert!(matches!(
        load(&artifact, catalog_with(&def)),
        Err(CodecError::UnresolvedBinding(name)) if name == "tokenizer"
    ));

    let catalog = catalog_with(&def);
    catalog.bind("tokenizer", Arc::new(()));
    assert!(load(&artifact, Arc::clone(&catalog)).is_ok());

    let instance = HostedInstance::new(Arc::clone(&def));
    instance.state().put_opaque("w", &Weights(vec![1, 2])).unwrap();
    let artifact = save(&instance).unwrap();
    assert!(matches!(
        load(&artifact, catalog_with(&def)),
        Err(CodecError::UnknownOpaque(tag)) if tag == "weights.v1"
    ));

    let catalog = catalog_with(&def);
    catalog.register_opaque::<Weights>();
    let loaded = load(&artifact, catalog).unwrap();
    assert_eq!(loaded.state().opaque::<Weights>("w").unwrap().map(|w| w.0), Some(vec![1, 2]));
}
