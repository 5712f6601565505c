// Routes of a hosted unit: one handler per (path, method), mounts nested
// under their prefix, and the default entry point as catch-all.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, FromRequest, Request},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{on, MethodRouter},
    Json, Router,
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::openapi::OpenApiController;
use crate::http::Controller;
use crate::instance::{DispatchError, HostedInstance, Input};
use crate::unit::{EntryPointDescriptor, HttpMethod, Mounted, RawRequest, RawResponse, Reply};

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("mount `{path}` of unit `{unit}` failed: {source}")]
    Mount {
        unit: String,
        path: String,
        #[source]
        source: DispatchError,
    },

    #[error("mount `{path}` of unit `{unit}` leads back into an enclosing unit")]
    MountCycle { unit: String, path: String },
}

/// Installs the entry points of one hosted instance. Request bodies above
/// `body_limit` bytes are refused with 413.
pub struct EntryPointController {
    router: Router,
}

impl EntryPointController {
    pub fn new(instance: &Arc<HostedInstance>, body_limit: usize) -> Result<Self, AssemblyError> {
        Ok(Self {
            router: unit_router(instance)?.layer(DefaultBodyLimit::max(body_limit)),
        })
    }
}

impl Controller for EntryPointController {
    fn add_route(&self, router: Router) -> Router {
        router.merge(self.router.clone())
    }
}

/// Router for `instance`: its routes, its mounts resolved recursively and a
/// fallback. Sub-units additionally publish their own `/openapi.json`.
pub fn unit_router(instance: &Arc<HostedInstance>) -> Result<Router, AssemblyError> {
    assemble(instance, "", &mut Vec::new())
}

/// `prefix` is where this unit is mounted, empty at the top.
fn assemble(
    instance: &Arc<HostedInstance>,
    prefix: &str,
    enclosing: &mut Vec<*const HostedInstance>,
) -> Result<Router, AssemblyError> {
    enclosing.push(Arc::as_ptr(instance));
    let routes = instance.routes();
    let mut router = Router::new();

    for (path, methods) in routes.paths() {
        router = router.route(path, method_router(instance, methods));
    }

    for (path, desc) in routes.mounts() {
        let mounted = instance.mount(desc).map_err(|source| AssemblyError::Mount {
            unit: instance.name().to_string(),
            path: path.to_string(),
            source,
        })?;
        let sub = match mounted {
            Mounted::Unit(sub) => {
                if enclosing.contains(&Arc::as_ptr(&sub)) {
                    return Err(AssemblyError::MountCycle {
                        unit: instance.name().to_string(),
                        path: path.to_string(),
                    });
                }
                let nested = assemble(&sub, &format!("{prefix}{path}"), enclosing)?;
                info!(
                    component = "assembly",
                    event = "unit_mounted",
                    unit = instance.name(),
                    path = path,
                    sub_unit = sub.name(),
                    "sub-unit mounted"
                );
                OpenApiController::new(&sub).add_route(nested)
            }
            Mounted::Router(nested) => {
                info!(
                    component = "assembly",
                    event = "router_mounted",
                    unit = instance.name(),
                    path = path,
                    "router mounted"
                );
                nested
            }
        };
        router = router.nest(path, sub);
    }

    let router = match routes.default_entry() {
        Some(methods) => {
            let catch_all = methods.clone();
            let instance = Arc::clone(instance);
            let label = crate::metrics::FallbackRoute(format!("{prefix}/"));
            router.fallback(move |req: Request| async move {
                let mut response = match HttpMethod::from_http(req.method()).and_then(|m| catch_all.get(&m)).cloned() {
                    Some(desc) => handle(instance, desc, req).await,
                    None => method_not_allowed(),
                };
                response.extensions_mut().insert(label);
                response
            })
        }
        None => router.fallback(|| async { not_found() }),
    };

    enclosing.pop();
    Ok(router)
}

fn method_router(instance: &Arc<HostedInstance>, methods: &BTreeMap<HttpMethod, Arc<EntryPointDescriptor>>) -> MethodRouter {
    let mut method_router = MethodRouter::new();
    for (method, desc) in methods {
        let instance = Arc::clone(instance);
        let desc = Arc::clone(desc);
        let endpoint = on(method.filter(), move |req: Request| async move { handle(instance, desc, req).await });
        method_router = method_router.merge(endpoint);
    }
    method_router
}

async fn handle(instance: Arc<HostedInstance>, desc: Arc<EntryPointDescriptor>, req: Request) -> Response {
    let raw = match raw_request(req).await {
        Ok(raw) => raw,
        Err(resp) => return resp,
    };
    match instance.dispatch(&desc, Input::Http(raw)).await {
        Ok(reply) => reply_response(reply),
        Err(err) => {
            let status = err.status();
            if status >= 500 {
                error!(
                    component = "dispatch",
                    event = "request_failed",
                    unit = instance.name(),
                    entry_point = desc.name.as_str(),
                    status = status,
                    error = %err,
                    "entry point failed"
                );
            } else {
                debug!(
                    component = "dispatch",
                    event = "request_rejected",
                    unit = instance.name(),
                    entry_point = desc.name.as_str(),
                    status = status,
                    error = %err,
                    "request rejected"
                );
            }
            crate::metrics::add_dispatch_error(instance.name(), status);
            err.into_response()
        }
    }
}

/// Buffers the request. The body is bounded by the router's
/// `DefaultBodyLimit`.
async fn raw_request(req: Request) -> Result<RawRequest, Response> {
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let headers = req
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect();

    let body = Bytes::from_request(req, &()).await.map_err(|rejection| {
        let status = rejection.status();
        warn!(
            component = "dispatch",
            event = "body_rejected",
            path = path.as_str(),
            status = status.as_u16(),
            error = %rejection,
            "request body rejected"
        );
        (status, Json(json!({"detail": rejection.body_text()}))).into_response()
    })?;

    Ok(RawRequest {
        method,
        path,
        query,
        headers,
        body,
    })
}

/// Turns a handler reply into the HTTP response.
pub fn reply_response(reply: Reply) -> Response {
    match reply {
        Reply::Json(value) => (StatusCode::OK, Json(value)).into_response(),
        Reply::Raw(raw) => raw_response(raw),
    }
}

fn raw_response(raw: RawResponse) -> Response {
    let status = StatusCode::from_u16(raw.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = Response::new(Body::from(raw.body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    for (name, value) in raw.headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(
                component = "dispatch",
                event = "invalid_header",
                header = name.as_str(),
                "raw response header dropped"
            ),
        }
    }
    response
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"detail": "Not Found"}))).into_response()
}

fn method_not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, Json(json!({"detail": "Method Not Allowed"}))).into_response()
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body())).into_response()
    }
}
