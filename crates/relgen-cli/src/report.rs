//! Human- and machine-readable reports.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use relgen_codegen::{CompiledSchema, Operation, Route};
use relgen_domain::analysis::{RelationAnalysis, SchemaAnalysis, Strategy};
use relgen_domain::model::RelationKey;

/// Report format selected by `output.format` or `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// Relations per list strategy, including strategies no relation uses.
pub fn strategy_counts(analysis: &SchemaAnalysis) -> BTreeMap<Strategy, usize> {
    let mut counts: BTreeMap<Strategy, usize> = Strategy::ALL.iter().map(|&s| (s, 0)).collect();
    for relation in analysis.iter() {
        *counts.entry(relation.list_strategy).or_default() += 1;
    }
    counts
}

fn keys_or_dash<'a>(keys: impl IntoIterator<Item = &'a RelationKey>) -> String {
    let joined = keys
        .into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined
    }
}

fn write_relation(out: &mut String, relation: &RelationAnalysis) -> fmt::Result {
    let caps = &relation.capabilities;
    writeln!(out, "{}", relation.key)?;
    writeln!(out, "  features:          {}", relation.features)?;
    writeln!(out, "  check strategy:    {}", relation.check_strategy)?;
    writeln!(out, "  list strategy:     {}", relation.list_strategy)?;
    writeln!(
        out,
        "  closure parents:   {}",
        keys_or_dash(&relation.closure_parent_relations)
    )?;
    writeln!(
        out,
        "  userset patterns:  {}",
        keys_or_dash(relation.userset_patterns.union(&relation.closure_userset_patterns))
    )?;
    let anchor = relation
        .indirect_anchor
        .as_ref()
        .map(|a| format!("{} ({} hops)", a.anchor, a.path.len()))
        .unwrap_or_else(|| "-".to_string());
    writeln!(out, "  indirect anchor:   {anchor}")?;
    writeln!(
        out,
        "  chain depth:       {}{}",
        relation.max_chain_depth,
        if relation.exceeds_depth_limit { " (exceeds limit)" } else { "" }
    )?;
    if !caps.check_allowed {
        writeln!(out, "  check fallback:    {}", caps.check_reason)?;
    }
    if !caps.list_allowed {
        writeln!(out, "  list fallback:     {}", caps.list_reason)?;
    }
    Ok(())
}

/// Inventory report: one block per relation plus a strategy summary.
///
/// With `only`, just that relation's block is written.
pub fn render_text(analysis: &SchemaAnalysis, only: Option<&RelationKey>) -> Result<String, fmt::Error> {
    let mut out = String::new();
    if let Some(key) = only {
        if let Some(relation) = analysis.get(&key.object_type, &key.relation) {
            write_relation(&mut out, relation)?;
        }
        return Ok(out);
    }

    writeln!(
        out,
        "{} relations, depth limit {}, {} closure components ({} cyclic)",
        analysis.len(),
        analysis.max_depth,
        analysis.stats.components,
        analysis.stats.cyclic_components
    )?;
    for relation in analysis.iter() {
        writeln!(out)?;
        write_relation(&mut out, relation)?;
    }

    writeln!(out)?;
    writeln!(out, "list strategies:")?;
    for (strategy, count) in strategy_counts(analysis) {
        writeln!(out, "  {:<16}{count}", strategy.name())?;
    }
    Ok(out)
}

/// The analysis as pretty-printed JSON; with `only`, a single relation.
pub fn render_json(analysis: &SchemaAnalysis, only: Option<&RelationKey>) -> serde_json::Result<String> {
    match only.and_then(|key| analysis.get(&key.object_type, &key.relation)) {
        Some(relation) => serde_json::to_string_pretty(relation),
        None => serde_json::to_string_pretty(analysis),
    }
}

/// Rendered functions followed by the routing table.
pub fn render_explain(compiled: &CompiledSchema) -> Result<String, fmt::Error> {
    let mut out = String::new();
    for function in &compiled.functions {
        out.push_str(&function.body);
        out.push('\n');
    }

    writeln!(out, "dispatch:")?;
    for (object_type, relation, operation, route) in compiled.dispatch.routes() {
        let target = match route {
            Route::Specialized { function, .. } => function.clone(),
            Route::Generic { function, reason } => format!("{function} ({reason})"),
        };
        writeln!(
            out,
            "  {:<13} {object_type}#{relation} -> {target}",
            operation_label(operation)
        )?;
    }
    Ok(out)
}

fn operation_label(operation: Operation) -> &'static str {
    match operation {
        Operation::Check => "check",
        Operation::ListObjects => "list objects",
        Operation::ListSubjects => "list subjects",
    }
}
