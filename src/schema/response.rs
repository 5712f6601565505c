use serde_json::Value;

use super::capitalize;
use super::types::ParamType;
use crate::unit::{DefinitionError, HttpMethod};

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseSchema {
    Typed { title: String, ty: ParamType },
    /// The handler owns the response; nothing is validated or documented.
    Raw,
}

impl ResponseSchema {
    pub fn synthesize(entry_point: &str, method: HttpMethod, ty: ParamType) -> Result<Self, DefinitionError> {
        if !ty.is_representable() {
            return Err(DefinitionError::UnsupportedReturn {
                entry_point: entry_point.to_string(),
                ty: ty.to_string(),
            });
        }
        Ok(ResponseSchema::Typed {
            title: format!("{}{}Output", capitalize(entry_point), capitalize(method.lower())),
            ty,
        })
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, ResponseSchema::Raw)
    }

    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            ResponseSchema::Raw => Ok(()),
            ResponseSchema::Typed { ty, .. } if ty.accepts(value) => Ok(()),
            ResponseSchema::Typed { ty, .. } => Err(format!("expected {ty}")),
        }
    }

    pub fn json_schema(&self) -> Option<Value> {
        match self {
            ResponseSchema::Raw => None,
            ResponseSchema::Typed { title, ty } => {
                let mut schema = ty.json_schema();
                if let Value::Object(map) = &mut schema {
                    map.insert("title".to_string(), Value::String(title.clone()));
                }
                Some(schema)
            }
        }
    }
}
