use serde_json::{json, Map, Value};

use super::*;
use crate::unit::{DefinitionError, HttpMethod};

fn obj(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn schema(allow_extra: bool) -> RequestSchema {
    RequestSchema::synthesize(
        "predict",
        HttpMethod::Post,
        vec![
            Param {
                name: "prompt".to_string(),
                ty: ParamType::String,
                default: None,
            },
            Param {
                name: "steps".to_string(),
                ty: ParamType::Integer,
                default: Some(json!(20)),
            },
        ],
        allow_extra,
    )
    .unwrap()
}

#[test]
fn title_follows_entry_point_and_method() {
    assert_eq!(schema(false).title, "PredictPostInput");
    assert_eq!(schema(false).required().collect::<Vec<_>>(), ["prompt"]);
}

#[test]
fn missing_required_field_is_named() {
    let errors = schema(false).validate(obj(json!({"steps": 3})), InputSource::Body).unwrap_err();
    assert_eq!(errors, vec![FieldError::new(["body", "prompt"], "Field required", "missing")]);
}

#[test]
fn omitted_optional_field_gets_default() {
    let fields = schema(false)
        .validate(obj(json!({"prompt": "cat"})), InputSource::Body)
        .unwrap();
    assert_eq!(Value::Object(fields), json!({"prompt": "cat", "steps": 20}));
}

#[test]
fn every_error_is_reported() {
    let errors = schema(false)
        .validate(obj(json!({"prompt": 5, "steps": "many"})), InputSource::Body)
        .unwrap_err();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].kind, "string_type");
    assert_eq!(errors[1].kind, "int_type");
}

#[test]
fn unknown_fields_dropped_unless_extra_allowed() {
    let input = json!({"prompt": "cat", "seed": 7});
    let strict = schema(false).validate(obj(input.clone()), InputSource::Body).unwrap();
    assert!(!strict.contains_key("seed"));

    let open = schema(true).validate(obj(input), InputSource::Body).unwrap();
    assert_eq!(open.get("seed"), Some(&json!(7)));
}

#[test]
fn query_values_are_parsed() {
    let fields = fields_from_query("prompt=a%20cat&steps=5");
    let out = schema(false).validate(fields, InputSource::Query).unwrap();
    assert_eq!(out.get("steps"), Some(&json!(5)));
    assert_eq!(out.get("prompt"), Some(&json!("a cat")));

    let errors = schema(false)
        .validate(fields_from_query("prompt=x&steps=five"), InputSource::Query)
        .unwrap_err();
    assert_eq!(errors[0].loc, ["query", "steps"]);
    assert_eq!(errors[0].kind, "int_parsing");
}

#[test]
fn repeated_query_keys_become_a_list() {
    let fields = fields_from_query("tag=a&tag=b&tag=c");
    assert_eq!(fields.get("tag"), Some(&json!(["a", "b", "c"])));
}

#[test]
fn integral_floats_coerce_to_integers() {
    assert_eq!(ParamType::Integer.coerce(json!(3.0), false), Ok(json!(3)));
    assert!(ParamType::Integer.coerce(json!(3.5), false).is_err());
    assert_eq!(ParamType::Number.coerce(json!(3), false), Ok(json!(3)));
    assert_eq!(
        ParamType::array(ParamType::Integer).coerce(json!("4"), true),
        Ok(json!([4]))
    );
}

#[test]
fn optional_accepts_null() {
    let ty = <Option<String> as Describe>::param_type();
    assert_eq!(ty.coerce(Value::Null, false), Ok(Value::Null));
    assert_eq!(ty.json_schema(), json!({"type": "string", "nullable": true}));
}

#[test]
fn body_decoding() {
    assert!(fields_from_body(b"  ").unwrap().is_empty());
    assert_eq!(fields_from_body(b"[1]").unwrap_err()[0].kind, "model_attributes_type");
    assert_eq!(fields_from_body(b"{oops").unwrap_err()[0].kind, "json_invalid");
}

#[test]
fn json_schema_lists_defaults_and_required() {
    let schema = schema(true).json_schema();
    assert_eq!(schema["title"], "PredictPostInput");
    assert_eq!(schema["required"], json!(["prompt"]));
    assert_eq!(schema["properties"]["steps"]["default"], json!(20));
    assert_eq!(schema["properties"]["prompt"]["title"], "Prompt");
    assert_eq!(schema["additionalProperties"], json!(true));
}

#[test]
fn foreign_return_type_is_rejected() {
    let err = ResponseSchema::synthesize("stream", HttpMethod::Post, ParamType::Foreign("TcpStream".into())).unwrap_err();
    assert!(matches!(err, DefinitionError::UnsupportedReturn { .. }));

    let ok = ResponseSchema::synthesize("stream", HttpMethod::Get, ParamType::String).unwrap();
    assert_eq!(ok.json_schema().unwrap()["title"], "StreamGetOutput");
    assert!(ok.check(&json!("x")).is_ok());
    assert!(ok.check(&json!(1)).is_err());
}
