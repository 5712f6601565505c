use thiserror::Error;

#[derive(Debug, Clone, Copy, Error)]
#[error("liveness probe timeout is too short")]
pub struct TimeoutIsTooShortError;
