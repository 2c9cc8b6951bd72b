//! Strategy renderers.
//!
//! A renderer turns one (relation, operation, strategy) triple into function
//! text. Renderers are pure: the same request always yields the same output.

use std::fmt::{self, Write};

use relgen_domain::analysis::{RelationAnalysis, Strategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::naming::function_name;

/// Error code raised at runtime by depth-exceeded functions (OpenFGA 2002).
pub const DEPTH_EXCEEDED_CODE: &str = "M2002";
pub const DEPTH_EXCEEDED_MESSAGE: &str = "resolution too complex";

/// Generated operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Check,
    ListObjects,
    ListSubjects,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::Check, Operation::ListObjects, Operation::ListSubjects];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Check => "check",
            Operation::ListObjects => "list_objects",
            Operation::ListSubjects => "list_subjects",
        }
    }

    pub fn is_list(&self) -> bool {
        !matches!(self, Operation::Check)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Renderer failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("renderer '{renderer}' does not support {strategy} for {operation}")]
    Unsupported {
        renderer: String,
        strategy: Strategy,
        operation: Operation,
    },

    #[error("template error: {message}")]
    Template { message: String },
}

impl From<fmt::Error> for RenderError {
    fn from(err: fmt::Error) -> Self {
        RenderError::Template {
            message: format!("failed to write function text: {err}"),
        }
    }
}

/// Everything a renderer needs for one function.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub operation: Operation,
    pub strategy: Strategy,
    pub function_name: &'a str,
    pub analysis: &'a RelationAnalysis,
}

impl<'a> RenderRequest<'a> {
    /// Request for `operation`, using the strategy the analysis selected for it.
    pub fn new(operation: Operation, function_name: &'a str, analysis: &'a RelationAnalysis) -> Self {
        let strategy = if operation.is_list() {
            analysis.list_strategy
        } else {
            analysis.check_strategy
        };
        Self {
            operation,
            strategy,
            function_name,
            analysis,
        }
    }
}

/// Turns render requests into function text.
pub trait StrategyRenderer: Send + Sync {
    /// Registration name; unique within a [`GenerationConfig`](crate::GenerationConfig).
    fn name(&self) -> &str;

    fn render(&self, request: &RenderRequest<'_>) -> Result<String, RenderError>;
}

/// Human-readable outline of each generated function.
///
/// Used by `relgen explain` and as the default renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutlineRenderer;

impl OutlineRenderer {
    pub const NAME: &'static str = "outline";
}

fn join_keys<'k>(keys: impl IntoIterator<Item = &'k relgen_domain::model::RelationKey>) -> String {
    keys.into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl StrategyRenderer for OutlineRenderer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn render(&self, request: &RenderRequest<'_>) -> Result<String, RenderError> {
        let mut out = String::new();
        write_outline(&mut out, request)?;
        Ok(out)
    }
}

fn write_outline<W: Write>(out: &mut W, request: &RenderRequest<'_>) -> Result<(), RenderError> {
    let analysis = request.analysis;
    writeln!(out, "function {} ({})", request.function_name, analysis.key)?;
    writeln!(out, "  operation: {}", request.operation)?;
    writeln!(out, "  strategy: {}", request.strategy)?;
    writeln!(out, "  features: {}", analysis.features)?;

    match request.strategy {
        Strategy::DepthExceeded => {
            writeln!(
                out,
                "  raise {DEPTH_EXCEEDED_CODE} \"{DEPTH_EXCEEDED_MESSAGE}\" (chain depth {})",
                analysis.max_chain_depth
            )?;
            return Ok(());
        }
        Strategy::SelfRefUserset => {
            writeln!(out, "  expand {} recursively through its own userset", analysis.key)?;
        }
        Strategy::Composed => {
            let anchor = analysis.indirect_anchor.as_ref().ok_or_else(|| RenderError::Template {
                message: format!("{} is Composed but has no indirect anchor", analysis.key),
            })?;
            for hop in &anchor.path {
                writeln!(out, "  follow {} to {}", hop.linking_relation, hop.target)?;
            }
            writeln!(
                out,
                "  delegate to {}",
                function_name(request.operation, &anchor.anchor)
            )?;
            return Ok(());
        }
        Strategy::Intersection => {
            writeln!(out, "  intersect every operand of {}", analysis.key)?;
        }
        Strategy::Recursive => {
            writeln!(
                out,
                "  traverse parents: {}",
                join_keys(&analysis.closure_parent_relations)
            )?;
        }
        Strategy::Userset | Strategy::Direct => {
            writeln!(out, "  match direct tuples on {}", analysis.key)?;
        }
    }

    if analysis.features.has_wildcard {
        writeln!(out, "  match wildcard subjects")?;
    }
    if analysis.features.has_implied {
        writeln!(out, "  include implied relations")?;
    }
    let usersets: Vec<_> = analysis
        .userset_patterns
        .union(&analysis.closure_userset_patterns)
        .collect();
    if !usersets.is_empty() {
        writeln!(out, "  expand usersets: {}", join_keys(usersets))?;
    }
    if analysis.features.has_exclusion {
        writeln!(out, "  subtract excluded subjects")?;
    }
    Ok(())
}
