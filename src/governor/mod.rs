//! Concurrency governance of a hosted unit: the permit pool that bounds
//! blocking invocations and the once-only initializer.

pub mod init_once;
pub mod permits;

#[cfg(test)]
mod governor_test;

pub use init_once::{InitError, InitOnce, InitState};
pub use permits::{GovernorError, PermitPool};
