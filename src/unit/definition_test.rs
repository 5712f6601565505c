use std::time::Duration;

use super::definition::{BASE_IMAGE, DEFAULT_HANDLER_MAX_CONCURRENCY, DEFAULT_HANDLER_TIMEOUT};
use super::*;

fn noop(name: &str) -> EntryPoint {
    EntryPoint::blocking(name.to_string(), |_ctx, _args| Ok(Reply::json(serde_json::Value::Null)))
}

#[test]
fn dependencies_merge_root_first() {
    let base = UnitDefinition::builder("Base")
        .requirement_dependency(["numpy", "torch"])
        .system_dependency(["ffmpeg", "git"])
        .build()
        .unwrap();
    let derived = UnitDefinition::builder("Derived")
        .extends(&base)
        .requirement_dependency(["torch", "pillow"])
        .system_dependency(["git", "curl"])
        .build()
        .unwrap();

    assert_eq!(derived.requirement_dependency(), ["numpy", "torch", "torch", "pillow"]);
    assert_eq!(derived.system_dependency(), ["ffmpeg", "git", "curl"]);
}

#[test]
fn unset_settings_inherit_from_nearest_ancestor() {
    let root = UnitDefinition::builder("Root")
        .image("custom:1")
        .exposed_port(9000)
        .handler_max_concurrency(4)
        .build()
        .unwrap();
    let mid = UnitDefinition::builder("Mid")
        .extends(&root)
        .exposed_port(9100)
        .build()
        .unwrap();
    let leaf = UnitDefinition::builder("Leaf").extends(&mid).build().unwrap();

    assert_eq!(leaf.image(), "custom:1");
    assert_eq!(leaf.exposed_port(), 9100);
    assert_eq!(leaf.handler_max_concurrency(), 4);
    assert_eq!(leaf.handler_timeout(), DEFAULT_HANDLER_TIMEOUT);
    assert!(leaf.is_a("Root"));
    assert_eq!(
        leaf.ancestors().iter().map(|d| d.type_name()).collect::<Vec<_>>(),
        ["Root", "Mid", "Leaf"]
    );
}

#[test]
fn defaults_without_declarations() {
    let def = UnitDefinition::builder("Plain").build().unwrap();
    assert_eq!(def.image(), BASE_IMAGE);
    assert_eq!(def.handler_max_concurrency(), DEFAULT_HANDLER_MAX_CONCURRENCY);
    assert_eq!(def.declared_port(), None);
    assert_eq!(def.cmd(), None);
    assert!(def.deployment_template().is_empty());
    assert!(def.routes().is_empty());
}

#[test]
fn system_paths_are_reserved() {
    let err = UnitDefinition::builder("Bad")
        .entry_point(noop("health").path("/healthz"))
        .build()
        .unwrap_err();
    assert!(matches!(err, DefinitionError::ReservedPath { ref path, .. } if path == "/healthz"));
}

#[test]
fn mount_at_root_is_rejected() {
    let err = UnitDefinition::builder("Bad")
        .entry_point(EntryPoint::mount("sub", |_ctx| Ok(Mounted::Router(axum::Router::new()))).path(""))
        .build()
        .unwrap_err();
    assert_eq!(err, DefinitionError::RootMount { entry_point: "sub".to_string() });
}

#[test]
fn mount_and_route_on_same_type_conflict() {
    let err = UnitDefinition::builder("Bad")
        .entry_point(noop("sub"))
        .entry_point(EntryPoint::mount("sub", |_ctx| Ok(Mounted::Router(axum::Router::new()))))
        .build()
        .unwrap_err();
    assert!(matches!(err, DefinitionError::MountConflict { .. }));
}

#[test]
fn invalid_paths_are_rejected() {
    let err = UnitDefinition::builder("Bad")
        .entry_point(noop("x").path("a/../b"))
        .build()
        .unwrap_err();
    assert!(matches!(err, DefinitionError::InvalidPath { .. }));
}

#[test]
fn unsupported_parameter_type_names_parameter_and_entry_point() {
    let err = UnitDefinition::builder("Bad")
        .entry_point(noop("upload").param::<std::fs::File>("handle"))
        .build()
        .unwrap_err();
    match err {
        DefinitionError::UnsupportedParam { entry_point, param, .. } => {
            assert_eq!(entry_point, "upload");
            assert_eq!(param, "handle");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn duplicate_parameter_is_rejected() {
    let err = UnitDefinition::builder("Bad")
        .entry_point(noop("x").param::<i64>("a").param::<String>("a"))
        .build()
        .unwrap_err();
    assert!(matches!(err, DefinitionError::DuplicateParam { .. }));
}

#[test]
fn default_must_match_declared_type() {
    let err = UnitDefinition::builder("Bad")
        .entry_point(noop("x").param_typed("n", crate::schema::ParamType::Integer, Some("ten".into())))
        .build()
        .unwrap_err();
    assert!(matches!(err, DefinitionError::InvalidDefault { .. }));
}

#[test]
fn zero_concurrency_is_rejected() {
    let err = UnitDefinition::builder("Bad").handler_max_concurrency(0).build().unwrap_err();
    assert_eq!(err, DefinitionError::ZeroConcurrency { unit: "Bad".to_string() });
}

#[test]
fn template_names_are_validated() {
    let err = UnitDefinition::builder("Bad")
        .deployment_template(DeploymentTemplate::new().env("1BAD", "x"))
        .build()
        .unwrap_err();
    assert!(matches!(err, DefinitionError::Template { .. }));

    let err = UnitDefinition::builder("Bad")
        .deployment_template(DeploymentTemplate::new().secret("has-dash"))
        .build()
        .unwrap_err();
    assert!(matches!(err, DefinitionError::Template { .. }));
}

#[test]
fn nonstandard_shape_is_accepted() {
    let def = UnitDefinition::builder("Odd")
        .deployment_template(DeploymentTemplate::new().resource_shape("tpu.huge"))
        .build()
        .unwrap();
    assert_eq!(def.deployment_template().resource_shape.as_deref(), Some("tpu.huge"));
}

#[test]
fn extra_files_must_be_relative() {
    let err = UnitDefinition::builder("Bad")
        .extra_file("/etc/passwd", "/etc/passwd")
        .build()
        .unwrap_err();
    assert!(matches!(err, DefinitionError::InvalidExtraFile { .. }));

    let err = UnitDefinition::builder("Bad")
        .extra_file("../escape", "x")
        .build()
        .unwrap_err();
    assert!(matches!(err, DefinitionError::InvalidExtraFile { .. }));
}

#[test]
fn extra_file_paths_drop_current_dir_components() {
    let def = UnitDefinition::builder("Assets")
        .extra_file("./assets/./nested/", "x")
        .build()
        .unwrap();
    assert_eq!(def.extra_files()[0].archive_path, "assets/nested");

    let err = UnitDefinition::builder("Bad").extra_file("./", "x").build().unwrap_err();
    assert!(matches!(err, DefinitionError::InvalidExtraFile { .. }));
}

#[test]
fn template_apply_is_idempotent() {
    let template = DeploymentTemplate::new()
        .env("PHOTON_TEST_TEMPLATE_DEFAULTED", "on")
        .required_env("PHOTON_TEST_TEMPLATE_REQUIRED")
        .secret("PHOTON_TEST_TEMPLATE_SECRET");

    let first = template.apply("Tpl");
    assert_eq!(first.defaulted, ["PHOTON_TEST_TEMPLATE_DEFAULTED"]);
    assert_eq!(first.missing_env, ["PHOTON_TEST_TEMPLATE_REQUIRED"]);
    assert_eq!(first.missing_secrets, ["PHOTON_TEST_TEMPLATE_SECRET"]);
    assert_eq!(std::env::var("PHOTON_TEST_TEMPLATE_DEFAULTED").as_deref(), Ok("on"));

    let second = template.apply("Tpl");
    assert!(second.defaulted.is_empty());
    assert_eq!(second.missing_env, first.missing_env);
}

#[test]
fn settings_are_recorded() {
    let def = UnitDefinition::builder("Packaged")
        .cmd(["serve", "--fast"])
        .args(["-v"])
        .health_check_liveness_tcp_port(8765)
        .timeout_graceful_shutdown(Duration::from_secs(9))
        .vcs_url("https://example.org/repo.git")
        .build()
        .unwrap();
    assert_eq!(def.cmd(), Some(vec!["serve".to_string(), "--fast".to_string()]));
    assert_eq!(def.args(), ["-v"]);
    assert_eq!(def.health_check_liveness_tcp_port(), Some(8765));
    assert_eq!(def.timeout_graceful_shutdown(), Some(Duration::from_secs(9)));
    assert_eq!(def.vcs_url().as_deref(), Some("https://example.org/repo.git"));
}
