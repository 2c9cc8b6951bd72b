//! relgen-domain: schema model and relation analysis
//!
//! This crate contains the static analysis core of the schema compiler:
//! - Schema model and DSL parsing
//! - Model validation
//! - Feature detection, closure propagation, capability and strategy selection
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                relgen-domain                │
//! ├─────────────────────────────────────────────┤
//! │  model/      - Schema types & DSL parser    │
//! │  validation/ - Model validation             │
//! │  analysis/   - Relation analysis engine     │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Everything here is synchronous and performs no I/O. Analysis runs once
//! per schema compilation and is deterministic for a given schema.

pub mod analysis;
pub mod error;
pub mod model;
pub mod validation;

// Re-export commonly used types at the crate root
pub use analysis::{
    AnalyzerConfig, GenerationCapabilities, RelationAnalysis, SchemaAnalysis, SchemaAnalyzer,
    Strategy,
};
pub use error::{DomainError, DomainResult};
