//! Identity resolution over visitor fingerprints.
//!
//! Orchestrates canonicalization, LSH bucket matching, and behavioral
//! scoring into the decision protocol that answers: is this visitor one we
//! have already seen, and with what confidence?

mod matcher;
mod metrics;
mod resolver;
mod types;

pub use metrics::{set_resolve_metrics, ResolveMetrics};
pub use resolver::IdentityResolver;
pub use types::{MatchKind, ResolutionResult, ResolveError, ResolverConfig};
