//! Matching of source records against the target system.

mod match_model;
mod matcher;
pub mod normalize;

pub use match_model::{MatchAction, MatchResult};
pub use matcher::{normalize_key, Matcher, RecordMatcher};
