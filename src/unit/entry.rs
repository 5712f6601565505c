// Entry-point declarations and the descriptors they resolve into.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::error::DefinitionError;
use crate::http::is_system_path;
use crate::instance::{Captured, Context, HostedInstance};
use crate::schema::{Describe, Param, ParamType, RequestSchema, ResponseSchema};

static PATH_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_\-./]*$").unwrap_or_else(|e| panic!("invalid path pattern: {e}"))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Lower-case form, as used for OpenAPI operation keys.
    pub fn lower(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Patch => "patch",
            HttpMethod::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            _ => None,
        }
    }

    pub fn from_http(method: &axum::http::Method) -> Option<Self> {
        Self::parse(method.as_str())
    }

    pub fn filter(&self) -> axum::routing::MethodFilter {
        use axum::routing::MethodFilter;
        match self {
            HttpMethod::Get => MethodFilter::GET,
            HttpMethod::Post => MethodFilter::POST,
            HttpMethod::Put => MethodFilter::PUT,
            HttpMethod::Patch => MethodFilter::PATCH,
            HttpMethod::Delete => MethodFilter::DELETE,
        }
    }

    /// GET arguments travel in the query string, everything else in a JSON body.
    pub fn reads_query(&self) -> bool {
        matches!(self, HttpMethod::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request as received by the serving layer, handed untouched to raw-args
/// entry points.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RawRequest {
    /// Builds a request carrying `body` as JSON, used for direct invocation.
    pub fn from_json(method: HttpMethod, path: &str, body: &Value) -> Self {
        Self {
            method: method.as_str().to_string(),
            path: path.to_string(),
            query: None,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Bytes::from(body.to_string()),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        serde_json::from_slice(&self.body).map_err(|e| HandlerError::BadArgument {
            name: "body".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Validated arguments of one invocation.
#[derive(Debug, Clone, Default)]
pub struct Args {
    fields: Map<String, Value>,
    raw: Option<RawRequest>,
}

impl Args {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields, raw: None }
    }

    pub fn from_raw(raw: RawRequest) -> Self {
        Self {
            fields: Map::new(),
            raw: Some(raw),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, HandlerError> {
        let value = self.fields.get(name).ok_or_else(|| HandlerError::BadArgument {
            name: name.to_string(),
            reason: "missing".to_string(),
        })?;
        serde_json::from_value(value.clone()).map_err(|e| HandlerError::BadArgument {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, HandlerError> {
        match self.fields.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.get(name).map(Some),
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn raw(&self) -> Option<&RawRequest> {
        self.raw.as_ref()
    }
}

/// Raw response passed through without schema validation.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn png(body: impl Into<Bytes>) -> Self {
        Self::new(200, body).with_header("content-type", "image/png")
    }

    pub fn jpeg(body: impl Into<Bytes>) -> Self {
        Self::new(200, body).with_header("content-type", "image/jpeg")
    }

    pub fn wav(body: impl Into<Bytes>) -> Self {
        Self::new(200, body).with_header("content-type", "audio/wav")
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::new(200, body.into()).with_header("content-type", "text/plain; charset=utf-8")
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Raw(RawResponse),
}

impl Reply {
    pub fn json(value: impl Into<Value>) -> Self {
        Reply::Json(value.into())
    }

    pub fn serialize<T: Serialize>(value: &T) -> Result<Self, HandlerError> {
        serde_json::to_value(value)
            .map(Reply::Json)
            .map_err(|e| HandlerError::Internal(e.into()))
    }

    pub fn raw(response: RawResponse) -> Self {
        Reply::Raw(response)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Reply::Json(v) => Some(v),
            Reply::Raw(_) => None,
        }
    }
}

/// Failure raised by user handler code.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Passed through to the client with the given status and detail.
    #[error("{detail}")]
    Http { status: u16, detail: Value },

    #[error("argument `{name}`: {reason}")]
    BadArgument { name: String, reason: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn http(status: u16, detail: impl Into<Value>) -> Self {
        HandlerError::Http {
            status,
            detail: detail.into(),
        }
    }
}

pub type BlockingFn = Arc<dyn Fn(&Context, Args) -> Result<Reply, HandlerError> + Send + Sync>;
pub type SuspendingFn =
    Arc<dyn Fn(Context, Args) -> BoxFuture<'static, Result<Reply, HandlerError>> + Send + Sync>;
pub type MountFn = Arc<dyn Fn(&Context) -> Result<Mounted, HandlerError> + Send + Sync>;

/// What a mount entry point produces: another hosted unit or a prepared router.
pub enum Mounted {
    Unit(Arc<HostedInstance>),
    Router(axum::Router),
}

#[derive(Clone)]
pub enum Handler {
    /// Runs on the blocking pool under the unit's permit pool.
    Blocking(BlockingFn),
    /// Runs on the event loop, never gated by permits.
    Suspending(SuspendingFn),
    Mount(MountFn),
}

impl Handler {
    pub fn kind(&self) -> &'static str {
        match self {
            Handler::Blocking(_) => "blocking",
            Handler::Suspending(_) => "suspending",
            Handler::Mount(_) => "mount",
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler::{}", self.kind())
    }
}

/// Fully resolved entry point as stored in the route table.
#[derive(Debug)]
pub struct EntryPointDescriptor {
    pub name: String,
    pub path: String,
    pub methods: Vec<HttpMethod>,
    pub handler: Handler,
    pub use_raw_args: bool,
    pub mount: bool,
    pub example: Option<Value>,
    pub doc: Option<String>,
    pub request: Option<RequestSchema>,
    pub response: ResponseSchema,
    pub captures: BTreeMap<String, Captured>,
    pub declared_by: String,
}

impl EntryPointDescriptor {
    pub fn is_default(&self) -> bool {
        self.path == "/"
    }

    /// Key under which captured values of this entry point are kept.
    pub fn scope(&self) -> String {
        format!("{}{}", self.name, self.path)
    }
}

#[derive(Debug, Clone)]
enum Returns {
    Typed(ParamType),
    Raw,
}

/// Declaration of a single entry point, consumed by
/// [`UnitDefinitionBuilder::entry_point`](super::UnitDefinitionBuilder::entry_point).
pub struct EntryPoint {
    name: String,
    path: Option<String>,
    methods: Vec<HttpMethod>,
    handler: Handler,
    params: Vec<Param>,
    extra_fields: bool,
    raw_args: bool,
    returns: Returns,
    example: Option<Value>,
    doc: Option<String>,
    captures: BTreeMap<String, Captured>,
}

impl EntryPoint {
    fn with_handler(name: impl Into<String>, handler: Handler) -> Self {
        Self {
            name: name.into(),
            path: None,
            methods: vec![HttpMethod::Post],
            handler,
            params: Vec::new(),
            extra_fields: false,
            raw_args: false,
            returns: Returns::Typed(ParamType::Any),
            example: None,
            doc: None,
            captures: BTreeMap::new(),
        }
    }

    pub fn blocking<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Context, Args) -> Result<Reply, HandlerError> + Send + Sync + 'static,
    {
        Self::with_handler(name, Handler::Blocking(Arc::new(f)))
    }

    pub fn suspending<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Context, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, HandlerError>> + Send + 'static,
    {
        let handler: SuspendingFn = Arc::new(move |ctx, args| Box::pin(f(ctx, args)));
        Self::with_handler(name, Handler::Suspending(handler))
    }

    pub fn mount<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Context) -> Result<Mounted, HandlerError> + Send + Sync + 'static,
    {
        Self::with_handler(name, Handler::Mount(Arc::new(f)))
    }

    /// Path suffix, defaults to the entry point name. `""` or `"/"` makes it
    /// the unit's default entry point.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.methods = vec![method];
        self
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = HttpMethod>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    pub fn param<T: Describe>(self, name: impl Into<String>) -> Self {
        self.param_typed(name, T::param_type(), None)
    }

    pub fn param_default<T: Describe + Into<Value>>(self, name: impl Into<String>, default: T) -> Self {
        self.param_typed(name, T::param_type(), Some(default.into()))
    }

    pub fn param_typed(mut self, name: impl Into<String>, ty: ParamType, default: Option<Value>) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty,
            default,
        });
        self
    }

    /// Accept and forward fields that are not declared parameters.
    pub fn extra_fields(mut self) -> Self {
        self.extra_fields = true;
        self
    }

    /// Hand the unparsed request to the handler; no request schema.
    pub fn raw_args(mut self) -> Self {
        self.raw_args = true;
        self
    }

    pub fn returns<T: Describe>(mut self) -> Self {
        self.returns = Returns::Typed(T::param_type());
        self
    }

    /// The handler produces a [`RawResponse`]; no response schema.
    pub fn returns_raw(mut self) -> Self {
        self.returns = Returns::Raw;
        self
    }

    pub fn example(mut self, example: Value) -> Self {
        self.example = Some(example);
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn capture(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.captures.insert(name.into(), Captured::plain(value));
        self
    }

    /// Capture a named reference to a catalog binding rather than a value.
    pub fn capture_binding(mut self, name: impl Into<String>, binding: impl Into<String>) -> Self {
        self.captures.insert(name.into(), Captured::binding(binding));
        self
    }

    pub(crate) fn into_descriptor(self, declared_by: &str) -> Result<EntryPointDescriptor, DefinitionError> {
        let raw_path = self.path.clone().unwrap_or_else(|| self.name.clone());
        let path = normalize_path(&raw_path).ok_or_else(|| DefinitionError::InvalidPath {
            entry_point: self.name.clone(),
            path: raw_path.clone(),
        })?;
        let mount = matches!(self.handler, Handler::Mount(_));

        if is_system_path(&path) {
            return Err(DefinitionError::ReservedPath {
                entry_point: self.name,
                path,
            });
        }
        if mount && path == "/" {
            return Err(DefinitionError::RootMount { entry_point: self.name });
        }

        let methods: Vec<HttpMethod> = self.methods.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let Some(&first) = methods.first() else {
            return Err(DefinitionError::NoMethod { entry_point: self.name });
        };

        let request = if mount || self.raw_args || (self.params.is_empty() && !self.extra_fields) {
            None
        } else {
            Some(RequestSchema::synthesize(&self.name, first, self.params, self.extra_fields)?)
        };
        let response = match (mount, self.returns) {
            (true, _) | (_, Returns::Raw) => ResponseSchema::Raw,
            (false, Returns::Typed(ty)) => ResponseSchema::synthesize(&self.name, first, ty)?,
        };

        Ok(EntryPointDescriptor {
            name: self.name,
            path,
            methods,
            handler: self.handler,
            use_raw_args: self.raw_args,
            mount,
            example: self.example,
            doc: self.doc,
            request,
            response,
            captures: self.captures,
            declared_by: declared_by.to_string(),
        })
    }
}

/// Normalizes an entry-point path to a leading-slash form without trailing
/// slash. Returns `None` for paths with characters outside the URL-safe set
/// or with empty or dot segments.
pub fn normalize_path(path: &str) -> Option<String> {
    if !PATH_CHARS.is_match(path) {
        return None;
    }
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Some("/".to_string());
    }
    if trimmed.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return None;
    }
    Some(format!("/{trimmed}"))
}
