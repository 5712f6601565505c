use serde::Serialize;
use serde_json::{json, Map, Value};

use super::capitalize;
use super::types::ParamType;
use crate::unit::{DefinitionError, HttpMethod};

/// One declared parameter of an entry point.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: ParamType,
    /// A parameter without default is required.
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Body,
    Query,
}

impl InputSource {
    pub fn loc(&self) -> &'static str {
        match self {
            InputSource::Body => "body",
            InputSource::Query => "query",
        }
    }
}

/// A validation failure, rendered the way FastAPI-style clients expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    pub fn new<I, S>(loc: I, msg: impl Into<String>, kind: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            loc: loc.into_iter().map(Into::into).collect(),
            msg: msg.into(),
            kind: kind.into(),
        }
    }
}

/// Record type of the named parameters one entry point accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSchema {
    pub title: String,
    pub fields: Vec<Param>,
    pub allow_extra: bool,
}

impl RequestSchema {
    pub fn synthesize(
        entry_point: &str,
        method: HttpMethod,
        fields: Vec<Param>,
        allow_extra: bool,
    ) -> Result<Self, DefinitionError> {
        for (i, param) in fields.iter().enumerate() {
            if fields[..i].iter().any(|p| p.name == param.name) {
                return Err(DefinitionError::DuplicateParam {
                    entry_point: entry_point.to_string(),
                    param: param.name.clone(),
                });
            }
            if !param.ty.is_representable() {
                return Err(DefinitionError::UnsupportedParam {
                    entry_point: entry_point.to_string(),
                    param: param.name.clone(),
                    ty: param.ty.to_string(),
                });
            }
            if let Some(default) = &param.default {
                if !param.ty.accepts(default) {
                    return Err(DefinitionError::InvalidDefault {
                        entry_point: entry_point.to_string(),
                        param: param.name.clone(),
                        ty: param.ty.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            title: format!("{}{}Input", capitalize(entry_point), capitalize(method.lower())),
            fields,
            allow_extra,
        })
    }

    pub fn field(&self, name: &str) -> Option<&Param> {
        self.fields.iter().find(|p| p.name == name)
    }

    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|p| p.default.is_none())
            .map(|p| p.name.as_str())
    }

    /// Checks `input` against the declared fields, fills defaults and coerces
    /// values. All field errors are collected, not just the first.
    pub fn validate(
        &self,
        mut input: Map<String, Value>,
        source: InputSource,
    ) -> Result<Map<String, Value>, Vec<FieldError>> {
        let from_query = source == InputSource::Query;
        let mut errors = Vec::new();
        let mut out = Map::new();

        for param in &self.fields {
            let loc = [source.loc(), param.name.as_str()];
            match input.remove(&param.name) {
                Some(value) => match param.ty.coerce(value, from_query) {
                    Ok(v) => {
                        out.insert(param.name.clone(), v);
                    }
                    Err((msg, kind)) => errors.push(FieldError::new(loc, msg, kind)),
                },
                None => match &param.default {
                    Some(default) => {
                        out.insert(param.name.clone(), default.clone());
                    }
                    None => errors.push(FieldError::new(loc, "Field required", "missing")),
                },
            }
        }

        if self.allow_extra {
            out.extend(input);
        }

        if errors.is_empty() {
            Ok(out)
        } else {
            Err(errors)
        }
    }

    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.fields {
            let mut schema = param.ty.json_schema();
            if let Value::Object(map) = &mut schema {
                map.insert("title".to_string(), Value::String(capitalize(&param.name)));
                if let Some(default) = &param.default {
                    map.insert("default".to_string(), default.clone());
                }
            }
            properties.insert(param.name.clone(), schema);
        }
        let required: Vec<&str> = self.required().collect();

        let mut schema = json!({
            "title": self.title,
            "type": "object",
            "properties": properties,
        });
        if let Value::Object(map) = &mut schema {
            if !required.is_empty() {
                map.insert("required".to_string(), json!(required));
            }
            if self.allow_extra {
                map.insert("additionalProperties".to_string(), Value::Bool(true));
            }
        }
        schema
    }

    /// Query parameters for GET entry points, in OpenAPI form.
    pub fn query_parameters(&self) -> Vec<Value> {
        self.fields
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "in": "query",
                    "required": p.default.is_none(),
                    "schema": p.ty.json_schema(),
                })
            })
            .collect()
    }
}

/// Fields of a query string. Repeated keys collect into an array.
pub fn fields_from_query(query: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = Value::String(value.into_owned());
        match fields.get_mut(key.as_ref()) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                fields.insert(key.into_owned(), value);
            }
        }
    }
    fields
}

/// Fields of a JSON body. An empty body carries no fields.
pub fn fields_from_body(body: &[u8]) -> Result<Map<String, Value>, Vec<FieldError>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(vec![FieldError::new(
            ["body"],
            "Input should be a valid dictionary",
            "model_attributes_type",
        )]),
        Err(e) => Err(vec![FieldError::new(
            ["body"],
            format!("JSON decode error: {e}"),
            "json_invalid",
        )]),
    }
}
