// Request and response schemas synthesized from entry-point declarations, and
// the OpenAPI document assembled from them.

pub mod openapi;
pub mod request;
pub mod response;
pub mod types;

#[cfg(test)]
mod request_test;

pub use request::{fields_from_body, fields_from_query, FieldError, InputSource, Param, RequestSchema};
pub use response::ResponseSchema;
pub use types::{Describe, ParamType};

/// `run` -> `Run`, `some_path` -> `Some_path`.
pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
