use thiserror::Error;

use super::entry::HttpMethod;

/// Raised while a unit type is being defined. A unit whose definition fails
/// never reaches the serving layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("unit `{unit}` declares more than one entry point at {method} {path}")]
    DuplicateRoute {
        unit: String,
        path: String,
        method: HttpMethod,
    },

    #[error("unit `{unit}` declares more than one mount at {path}")]
    DuplicateMount { unit: String, path: String },

    #[error("unit `{unit}` declares both a mount and an entry point at {path}")]
    MountConflict { unit: String, path: String },

    #[error("entry point `{entry_point}` has invalid path `{path}`")]
    InvalidPath { entry_point: String, path: String },

    #[error("entry point `{entry_point}` uses reserved path `{path}`")]
    ReservedPath { entry_point: String, path: String },

    #[error("mount `{entry_point}` cannot be attached at the root path")]
    RootMount { entry_point: String },

    #[error("entry point `{entry_point}` declares no HTTP method")]
    NoMethod { entry_point: String },

    #[error("entry point `{entry_point}` declares parameter `{param}` twice")]
    DuplicateParam { entry_point: String, param: String },

    #[error(
        "parameter `{param}` of entry point `{entry_point}` has type `{ty}` which has no request schema representation"
    )]
    UnsupportedParam {
        entry_point: String,
        param: String,
        ty: String,
    },

    #[error("default of parameter `{param}` of entry point `{entry_point}` is not a valid `{ty}`")]
    InvalidDefault {
        entry_point: String,
        param: String,
        ty: String,
    },

    #[error("entry point `{entry_point}` returns `{ty}` which has no response schema representation")]
    UnsupportedReturn { entry_point: String, ty: String },

    #[error("extra file `{path}` must be a relative path inside the artifact")]
    InvalidExtraFile { path: String },

    #[error("handler_max_concurrency of unit `{unit}` must be at least 1")]
    ZeroConcurrency { unit: String },

    #[error("deployment template of unit `{unit}`: {reason}")]
    Template { unit: String, reason: String },
}
