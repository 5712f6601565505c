use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::Value;

use crate::http::{Controller, OPENAPI_PATH};
use crate::instance::HostedInstance;

/// Serves the instance's interface document, built once at assembly.
#[derive(Clone)]
pub struct OpenApiController {
    document: Arc<Value>,
}

impl OpenApiController {
    pub fn new(instance: &HostedInstance) -> Self {
        Self {
            document: Arc::new(instance.openapi_document()),
        }
    }
}

impl Controller for OpenApiController {
    fn add_route(&self, router: Router) -> Router {
        let document = Arc::clone(&self.document);
        router.route(
            OPENAPI_PATH,
            get(move || async move { Json(document.as_ref().clone()) }),
        )
    }
}
