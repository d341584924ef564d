//! Client and wire types for the remote rule/inference service.
//!
//! The service owns the rule book and both chaining engines; this crate only
//! consumes them. The backward-verification step endpoint receives the full
//! evidence on every call (the service keeps no dialogue state), forward
//! chaining and rule CRUD are plain request/response pass-throughs.

mod client;
mod types;


pub use client::{EngineClient, InferenceOracle};
pub use types::{
    AnimalCatalog, FeatureCatalog, ForwardOutcome, ForwardQuery, Rule, RuleBook, RuleDraft,
    RuleKind, RuleRemoved, RuleSaved, StepDecision, StepQuery,
};

#[cfg(test)]
pub use client::MockInferenceOracle;
