//! Key pool module
//!
//! The credential-rotating request dispatcher and its data model: an
//! ordered pool of API keys, two rotation policies, and the dispatcher that
//! walks the pool one sequential attempt at a time.

mod credential;
mod dispatcher;
mod policy;

pub use credential::{ApiKey, KeyHealth, KeyPool};
pub use dispatcher::{DispatchOutcome, Dispatcher, ALL_KEYS_FAILED};
pub use policy::RotationPolicy;
