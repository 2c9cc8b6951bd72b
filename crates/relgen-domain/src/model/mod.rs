//! Schema model types and DSL parser.
//!
//! This module contains:
//! - Schema structures (types, relations, rewrite trees)
//! - Relation keys and direct type restrictions
//! - DSL parser for the OpenFGA 1.1 model format

mod parser;
mod types;
#[cfg(test)]
mod types_proptest;

pub use parser::{parse, ParserError, ParserResult};
pub use types::*;
