// Invocation path of one entry point: initialize, take a permit for
// blocking handlers, validate arguments, run under the handler timeout and
// check the result against the response schema.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{error, warn};

use super::{Context, HostedInstance};
use crate::governor::{GovernorError, InitError};
use crate::metrics;
use crate::schema::{fields_from_body, fields_from_query, FieldError, InputSource, ResponseSchema};
use crate::unit::{Args, EntryPointDescriptor, Handler, HandlerError, HttpMethod, RawRequest, Reply};

/// Arguments as they reach the dispatcher.
#[derive(Debug, Clone)]
pub enum Input {
    /// Straight from the serving layer.
    Http(RawRequest),
    /// Direct in-process invocation with already-decoded fields.
    Fields(Map<String, Value>),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no entry point at {method} {path}")]
    NotFound { path: String, method: HttpMethod },

    #[error("request validation failed")]
    Validation(Vec<FieldError>),

    #[error(transparent)]
    Init(#[from] InitError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error("entry point `{entry_point}` did not finish within {timeout:?}")]
    Timeout { entry_point: String, timeout: Duration },

    #[error("entry point `{entry_point}` panicked")]
    Panicked { entry_point: String },

    #[error("entry point `{entry_point}` returned a value outside its response schema: {reason}")]
    Response { entry_point: String, reason: String },

    #[error("entry point `{entry_point}` is a mount and cannot be invoked")]
    NotInvocable { entry_point: String },

    #[error(transparent)]
    Governor(#[from] GovernorError),
}

impl DispatchError {
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::NotFound { .. } => 404,
            DispatchError::Validation(_) => 422,
            DispatchError::Handler(HandlerError::Http { status, .. }) => *status,
            DispatchError::Handler(HandlerError::BadArgument { .. }) => 422,
            DispatchError::Init(_) | DispatchError::Governor(_) => 503,
            DispatchError::Timeout { .. } => 504,
            DispatchError::NotInvocable { .. } => 405,
            DispatchError::Handler(HandlerError::Internal(_))
            | DispatchError::Panicked { .. }
            | DispatchError::Response { .. } => 500,
        }
    }

    /// JSON body sent to clients.
    pub fn body(&self) -> Value {
        match self {
            DispatchError::NotFound { .. } => json!({"detail": "Not Found"}),
            DispatchError::Validation(errors) => json!({"detail": errors}),
            DispatchError::Handler(HandlerError::Http { detail, .. }) => json!({"detail": detail}),
            DispatchError::Handler(HandlerError::BadArgument { name, reason }) => json!({
                "detail": [FieldError::new(["body", name.as_str()], reason.as_str(), "value_error")]
            }),
            DispatchError::Handler(HandlerError::Internal(_))
            | DispatchError::Panicked { .. }
            | DispatchError::Response { .. } => json!({"detail": "Internal Server Error"}),
            other => json!({"detail": other.to_string()}),
        }
    }
}

impl HostedInstance {
    /// Invokes the entry point at `path` in-process.
    pub async fn call(self: &Arc<Self>, path: &str, method: HttpMethod, args: Value) -> Result<Reply, DispatchError> {
        let desc = self
            .routes()
            .find(path, method)
            .cloned()
            .ok_or_else(|| DispatchError::NotFound {
                path: path.to_string(),
                method,
            })?;
        let fields = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(DispatchError::Validation(vec![FieldError::new(
                    ["body"],
                    "Input should be a valid dictionary",
                    "model_attributes_type",
                )]))
            }
        };
        self.dispatch(&desc, Input::Fields(fields)).await
    }

    pub async fn dispatch(self: &Arc<Self>, desc: &Arc<EntryPointDescriptor>, input: Input) -> Result<Reply, DispatchError> {
        self.ensure_initialized().await?;
        let timeout = self.definition().handler_timeout();
        let ctx = Context::new(Arc::clone(self), Some(desc.scope()));

        let reply = match &desc.handler {
            Handler::Blocking(f) => {
                let permit = self.permits().acquire().await?;
                metrics::set_permits_in_use(self.name(), self.permits().in_use());
                let args = decode(desc, input)?;
                let f = Arc::clone(f);
                let task = tokio::task::spawn_blocking(move || {
                    let result = f(&ctx, args);
                    drop(permit);
                    let instance = ctx.instance();
                    metrics::set_permits_in_use(instance.name(), instance.permits().in_use());
                    result
                });
                match tokio::time::timeout(timeout, task).await {
                    Err(_) => return Err(self.timed_out(desc, timeout)),
                    Ok(Err(join)) => {
                        error!(
                            component = "dispatch",
                            event = "handler_panicked",
                            unit = self.name(),
                            entry_point = desc.name.as_str(),
                            error = %join,
                            "blocking handler panicked"
                        );
                        return Err(DispatchError::Panicked {
                            entry_point: desc.name.clone(),
                        });
                    }
                    Ok(Ok(result)) => result?,
                }
            }
            Handler::Suspending(f) => {
                let args = decode(desc, input)?;
                let fut = AssertUnwindSafe(f(ctx, args)).catch_unwind();
                match tokio::time::timeout(timeout, fut).await {
                    Err(_) => return Err(self.timed_out(desc, timeout)),
                    Ok(Err(_)) => {
                        error!(
                            component = "dispatch",
                            event = "handler_panicked",
                            unit = self.name(),
                            entry_point = desc.name.as_str(),
                            "suspending handler panicked"
                        );
                        return Err(DispatchError::Panicked {
                            entry_point: desc.name.clone(),
                        });
                    }
                    Ok(Ok(result)) => result?,
                }
            }
            Handler::Mount(_) => {
                return Err(DispatchError::NotInvocable {
                    entry_point: desc.name.clone(),
                })
            }
        };

        encode(desc, reply)
    }

    fn timed_out(&self, desc: &EntryPointDescriptor, timeout: Duration) -> DispatchError {
        warn!(
            component = "dispatch",
            event = "handler_timeout",
            unit = self.name(),
            entry_point = desc.name.as_str(),
            timeout_ms = timeout.as_millis() as u64,
            "handler exceeded its timeout"
        );
        DispatchError::Timeout {
            entry_point: desc.name.clone(),
            timeout,
        }
    }
}

fn decode(desc: &EntryPointDescriptor, input: Input) -> Result<Args, DispatchError> {
    match input {
        Input::Http(raw) if desc.use_raw_args => Ok(Args::from_raw(raw)),
        Input::Fields(fields) if desc.use_raw_args => {
            let method = desc.methods.first().copied().unwrap_or(HttpMethod::Post);
            Ok(Args::from_raw(RawRequest::from_json(method, &desc.path, &Value::Object(fields))))
        }
        input => {
            let Some(schema) = &desc.request else {
                return Ok(Args::default());
            };
            let (fields, source) = match input {
                Input::Http(raw) => match HttpMethod::parse(&raw.method) {
                    Some(m) if m.reads_query() => (
                        fields_from_query(raw.query.as_deref().unwrap_or_default()),
                        InputSource::Query,
                    ),
                    _ => (fields_from_body(&raw.body).map_err(DispatchError::Validation)?, InputSource::Body),
                },
                Input::Fields(fields) => (fields, InputSource::Body),
            };
            schema
                .validate(fields, source)
                .map(Args::new)
                .map_err(DispatchError::Validation)
        }
    }
}

fn encode(desc: &EntryPointDescriptor, reply: Reply) -> Result<Reply, DispatchError> {
    match (&desc.response, reply) {
        (ResponseSchema::Typed { .. }, Reply::Json(value)) => {
            desc.response.check(&value).map_err(|reason| DispatchError::Response {
                entry_point: desc.name.clone(),
                reason,
            })?;
            Ok(Reply::Json(value))
        }
        (_, reply) => Ok(reply),
    }
}
