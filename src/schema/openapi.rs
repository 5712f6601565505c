// OpenAPI 3 document of a unit's route table. Mount handlers are never
// invoked to build it; mounted paths are listed by prefix only.

use serde_json::{json, Map, Value};

use super::request::RequestSchema;
use super::response::ResponseSchema;
use crate::unit::{EntryPointDescriptor, HttpMethod, RouteTable};

pub const OPENAPI_VERSION: &str = "3.0.2";

pub fn document(title: &str, description: Option<&str>, version: &str, table: &RouteTable) -> Value {
    let mut paths = Map::new();
    let mut schemas = Map::new();

    for (path, methods) in table.paths() {
        let mut item = Map::new();
        for (method, desc) in methods {
            item.insert(method.lower().to_string(), operation(path, *method, desc, &mut schemas));
        }
        paths.insert(path.to_string(), Value::Object(item));
    }

    if !schemas.is_empty() {
        schemas.insert("ValidationError".to_string(), validation_error_schema());
        schemas.insert(
            "HTTPValidationError".to_string(),
            json!({
                "title": "HTTPValidationError",
                "type": "object",
                "properties": {
                    "detail": {
                        "title": "Detail",
                        "type": "array",
                        "items": {"$ref": "#/components/schemas/ValidationError"},
                    },
                },
            }),
        );
    }

    let mounts: Vec<&str> = table.mounts().map(|(p, _)| p).collect();

    let mut info = json!({"title": title, "version": version});
    if let (Some(text), Value::Object(map)) = (description, &mut info) {
        map.insert("description".to_string(), Value::String(text.to_string()));
    }

    let mut doc = json!({
        "openapi": OPENAPI_VERSION,
        "info": info,
        "paths": paths,
        "components": {"schemas": schemas},
    });
    if let (false, Value::Object(map)) = (mounts.is_empty(), &mut doc) {
        map.insert("x-mounts".to_string(), json!(mounts));
    }
    doc
}

fn operation(path: &str, method: HttpMethod, desc: &EntryPointDescriptor, schemas: &mut Map<String, Value>) -> Value {
    let mut op = Map::new();
    op.insert("summary".to_string(), Value::String(super::capitalize(&desc.name.replace('_', " "))));
    op.insert(
        "operationId".to_string(),
        Value::String(format!("{}_{}_{}", desc.name, path.trim_matches('/').replace('/', "_"), method.lower())),
    );
    if let Some(doc) = &desc.doc {
        op.insert("description".to_string(), Value::String(doc.clone()));
    }

    let mut responses = Map::new();
    responses.insert("200".to_string(), success_response(&desc.response, schemas));

    if let Some(request) = &desc.request {
        if method.reads_query() {
            op.insert("parameters".to_string(), Value::Array(request.query_parameters()));
        } else {
            op.insert("requestBody".to_string(), request_body(request, desc.example.as_ref(), schemas));
        }
        responses.insert(
            "422".to_string(),
            json!({
                "description": "Validation Error",
                "content": {"application/json": {"schema": {"$ref": "#/components/schemas/HTTPValidationError"}}},
            }),
        );
    } else if desc.use_raw_args && !method.reads_query() {
        let mut content = json!({"schema": {}});
        if let (Some(example), Value::Object(map)) = (&desc.example, &mut content) {
            map.insert("example".to_string(), example.clone());
        }
        op.insert(
            "requestBody".to_string(),
            json!({"content": {"application/json": content}}),
        );
    }

    op.insert("responses".to_string(), Value::Object(responses));
    Value::Object(op)
}

fn request_body(request: &RequestSchema, example: Option<&Value>, schemas: &mut Map<String, Value>) -> Value {
    schemas.insert(request.title.clone(), request.json_schema());
    let mut media = json!({"schema": {"$ref": format!("#/components/schemas/{}", request.title)}});
    if let (Some(example), Value::Object(map)) = (example, &mut media) {
        map.insert("example".to_string(), example.clone());
    }
    json!({
        "content": {"application/json": media},
        "required": request.required().next().is_some(),
    })
}

fn success_response(response: &ResponseSchema, schemas: &mut Map<String, Value>) -> Value {
    match (response, response.json_schema()) {
        (ResponseSchema::Typed { title, .. }, Some(schema)) => {
            schemas.insert(title.clone(), schema);
            json!({
                "description": "Successful Response",
                "content": {"application/json": {"schema": {"$ref": format!("#/components/schemas/{title}")}}},
            })
        }
        _ => json!({"description": "Successful Response"}),
    }
}

fn validation_error_schema() -> Value {
    json!({
        "title": "ValidationError",
        "type": "object",
        "required": ["loc", "msg", "type"],
        "properties": {
            "loc": {"title": "Location", "type": "array", "items": {"anyOf": [{"type": "string"}, {"type": "integer"}]}},
            "msg": {"title": "Message", "type": "string"},
            "type": {"title": "Error Type", "type": "string"},
        },
    })
}
