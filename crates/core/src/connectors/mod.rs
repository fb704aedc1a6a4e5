//! Capability interfaces for the external systems.
//!
//! The raw HTTP clients live outside this crate; the engine only sees these
//! traits.

mod errors;
mod models;
mod traits;

pub use errors::{ApiError, RetryClass};
pub use models::*;
pub use traits::{SourcePager, TargetApi, TargetLookup, TargetMutate};
