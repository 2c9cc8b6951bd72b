//! Relation analysis and strategy selection.
//!
//! Passes, leaves first:
//! - `features`: classify each relation's own rewrite tree
//! - `graph`: arena of relations and their dependency edges
//! - `closure`: inherited parents, userset patterns, depth and indirect anchors
//! - `capabilities` / `strategy`: decide specialization and pick a strategy
//!
//! [`SchemaAnalyzer`] runs them in order and returns a [`SchemaAnalysis`]
//! that is a pure function of the schema.

mod analyzer;
mod capabilities;
mod closure;
mod config;
mod features;
mod graph;
mod strategy;
#[cfg(test)]
mod strategy_proptest;

pub use analyzer::{analyze, RelationAnalysis, SchemaAnalysis, SchemaAnalyzer};
pub use capabilities::{
    determine_capabilities, local_denials, GenerationCapabilities, REASON_EXCLUSION_IN_INTERSECTION,
    REASON_INTERSECTION_UNDER_SUBTRACT, REASON_SELF_REF_COMPOUND, REASON_TTU_UNDER_SUBTRACT,
};
pub use closure::{
    find_indirect_anchor, propagate, AnchorHop, ClosureOutcome, ClosureStats, IndirectAnchor,
    RelationClosure,
};
pub use config::{AnalyzerConfig, DEFAULT_MAX_DEPTH};
pub use features::{detect_features, RelationFeatures, RewriteFacts};
pub use graph::{Condensation, Edge, EdgeKind, RelationGraph, RelationId};
pub use strategy::{determine_check_strategy, determine_list_strategy, Strategy, StrategyFacts};
