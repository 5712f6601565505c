use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use serde_json::{json, Map, Value};

/// Type of a declared parameter or return value, as far as the wire format
/// can represent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Integer,
    Number,
    Boolean,
    String,
    Array(Box<ParamType>),
    Object,
    Any,
    Optional(Box<ParamType>),
    /// A type with no JSON representation, named for diagnostics.
    Foreign(String),
}

impl ParamType {
    pub fn array(item: ParamType) -> Self {
        ParamType::Array(Box::new(item))
    }

    pub fn optional(inner: ParamType) -> Self {
        ParamType::Optional(Box::new(inner))
    }

    pub fn is_representable(&self) -> bool {
        match self {
            ParamType::Foreign(_) => false,
            ParamType::Array(inner) | ParamType::Optional(inner) => inner.is_representable(),
            _ => true,
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, ParamType::Optional(_) | ParamType::Any)
    }

    pub fn json_schema(&self) -> Value {
        match self {
            ParamType::Integer => json!({"type": "integer"}),
            ParamType::Number => json!({"type": "number"}),
            ParamType::Boolean => json!({"type": "boolean"}),
            ParamType::String => json!({"type": "string"}),
            ParamType::Array(item) => json!({"type": "array", "items": item.json_schema()}),
            ParamType::Object => json!({"type": "object"}),
            ParamType::Any => json!({}),
            ParamType::Optional(inner) => {
                let mut schema = inner.json_schema();
                if let Value::Object(map) = &mut schema {
                    map.insert("nullable".to_string(), Value::Bool(true));
                }
                schema
            }
            ParamType::Foreign(_) => json!({}),
        }
    }

    /// Strict membership test, no coercion.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ParamType::Any, _) => true,
            (ParamType::Optional(_), Value::Null) => true,
            (ParamType::Optional(inner), v) => inner.accepts(v),
            (ParamType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (ParamType::Number, Value::Number(_)) => true,
            (ParamType::Boolean, Value::Bool(_)) => true,
            (ParamType::String, Value::String(_)) => true,
            (ParamType::Object, Value::Object(_)) => true,
            (ParamType::Array(item), Value::Array(items)) => items.iter().all(|v| item.accepts(v)),
            _ => false,
        }
    }

    /// Validates `value`, converting it where a lossless conversion exists.
    /// Query-string values arrive as text and are parsed into scalars.
    pub fn coerce(&self, value: Value, from_query: bool) -> Result<Value, (String, &'static str)> {
        match (self, value) {
            (ParamType::Any, v) => Ok(v),
            (ParamType::Optional(_), Value::Null) => Ok(Value::Null),
            (ParamType::Optional(inner), v) => inner.coerce(v, from_query),
            (ParamType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Value::Number(n)),
            (ParamType::Integer, Value::Number(n)) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(json!(f as i64)),
                _ => Err(("Input should be a valid integer".to_string(), "int_from_float")),
            },
            (ParamType::Integer, Value::String(s)) if from_query => s
                .trim()
                .parse::<i64>()
                .map(|i| json!(i))
                .map_err(|_| ("Input should be a valid integer".to_string(), "int_parsing")),
            (ParamType::Number, Value::Number(n)) => Ok(Value::Number(n)),
            (ParamType::Number, Value::String(s)) if from_query => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| ("Input should be a valid number".to_string(), "float_parsing")),
            (ParamType::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
            (ParamType::Boolean, Value::String(s)) if from_query => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
                _ => Err(("Input should be a valid boolean".to_string(), "bool_parsing")),
            },
            (ParamType::String, Value::String(s)) => Ok(Value::String(s)),
            (ParamType::Object, Value::Object(m)) => Ok(Value::Object(m)),
            (ParamType::Array(item), Value::Array(items)) => items
                .into_iter()
                .map(|v| item.coerce(v, from_query))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (ParamType::Array(item), v) if from_query => item.coerce(v, true).map(|v| Value::Array(vec![v])),
            (ty, _) => Err((format!("Input should be a valid {}", ty.noun()), ty.error_kind())),
        }
    }

    fn noun(&self) -> &'static str {
        match self {
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::String => "string",
            ParamType::Array(_) => "list",
            ParamType::Object => "dictionary",
            _ => "value",
        }
    }

    fn error_kind(&self) -> &'static str {
        match self {
            ParamType::Integer => "int_type",
            ParamType::Number => "float_type",
            ParamType::Boolean => "bool_type",
            ParamType::String => "string_type",
            ParamType::Array(_) => "list_type",
            ParamType::Object => "dict_type",
            _ => "value_error",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Integer => f.write_str("integer"),
            ParamType::Number => f.write_str("number"),
            ParamType::Boolean => f.write_str("boolean"),
            ParamType::String => f.write_str("string"),
            ParamType::Array(item) => write!(f, "array<{item}>"),
            ParamType::Object => f.write_str("object"),
            ParamType::Any => f.write_str("any"),
            ParamType::Optional(inner) => write!(f, "optional<{inner}>"),
            ParamType::Foreign(name) => f.write_str(name),
        }
    }
}

/// Maps a Rust type to its [`ParamType`].
pub trait Describe {
    fn param_type() -> ParamType;
}

macro_rules! describe {
    ($variant:ident: $($t:ty),+) => {
        $(impl Describe for $t {
            fn param_type() -> ParamType {
                ParamType::$variant
            }
        })+
    };
}

describe!(Integer: i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
describe!(Number: f32, f64);
describe!(Boolean: bool);
describe!(String: String, &str, PathBuf);
describe!(Any: Value, ());
describe!(Object: Map<String, Value>);

impl<T: Describe> Describe for Vec<T> {
    fn param_type() -> ParamType {
        ParamType::array(T::param_type())
    }
}

impl<T: Describe> Describe for Option<T> {
    fn param_type() -> ParamType {
        ParamType::optional(T::param_type())
    }
}

impl<T: Describe> Describe for HashMap<String, T> {
    fn param_type() -> ParamType {
        ParamType::Object
    }
}

impl<T: Describe> Describe for BTreeMap<String, T> {
    fn param_type() -> ParamType {
        ParamType::Object
    }
}

impl Describe for std::fs::File {
    fn param_type() -> ParamType {
        ParamType::Foreign("std::fs::File".to_string())
    }
}

impl Describe for std::net::TcpStream {
    fn param_type() -> ParamType {
        ParamType::Foreign("std::net::TcpStream".to_string())
    }
}
