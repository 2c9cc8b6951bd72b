//! relgen binary
//!
//! Analyzes relationship-based access-control schemas and explains the
//! functions a generation run would emit.
//!
//! # Usage
//!
//! ```bash
//! relgen analyze schema.fga
//! relgen analyze schema.json --format json --relation document#viewer
//! relgen --config relgen.yaml explain schema.fga
//! RELGEN_ANALYSIS__MAX_DEPTH=10 relgen analyze schema.fga
//! ```

use std::path::PathBuf;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tracing::info;

use relgen_cli::report::{render_explain, render_json, render_text};
use relgen_cli::{init_logging, load_schema, LoggingConfig, OutputFormat, RelgenConfig};
use relgen_codegen::{compile, GenerationConfig, OutlineRenderer};
use relgen_domain::model::RelationKey;
use relgen_domain::validation::validate_model;
use relgen_domain::SchemaAnalyzer;

/// relgen - relationship schema compiler
#[derive(Parser, Debug)]
#[command(name = "relgen")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report features, strategies and capabilities per relation
    Analyze {
        /// Schema file (`.fga` DSL or `.json` model)
        schema: PathBuf,

        /// Output format; overrides `output.format`
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// Report a single relation, written as `type#relation`
        #[arg(long)]
        relation: Option<String>,
    },
    /// Compile with the outline renderer and print every generated function
    Explain {
        /// Schema file (`.fga` DSL or `.json` model)
        schema: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => RelgenConfig::load(path)?,
        None => RelgenConfig::from_env()?,
    };
    init_logging(LoggingConfig::from(&config.logging));

    info!(version = env!("CARGO_PKG_VERSION"), "relgen starting");

    match args.command {
        Command::Analyze {
            schema,
            format,
            relation,
        } => analyze(&config, &schema, format, relation.as_deref()),
        Command::Explain { schema } => explain(&config, &schema),
    }
}

fn analyze(
    config: &RelgenConfig,
    schema: &std::path::Path,
    format: Option<OutputFormat>,
    relation: Option<&str>,
) -> anyhow::Result<()> {
    let model = load_schema(schema)?;
    validate_model(&model)?;

    let only = relation
        .map(|value| {
            let key = RelationKey::parse(value)
                .map_err(|reason| anyhow!("invalid --relation '{value}': {reason}"))?;
            model.require_relation(&key.object_type, &key.relation)?;
            Ok::<_, anyhow::Error>(key)
        })
        .transpose()?;

    let analysis = SchemaAnalyzer::new(config.analysis.analyzer_config())?.analyze(&model)?;

    let format = match format {
        Some(format) => format,
        None => OutputFormat::from_name(&config.output.format)
            .ok_or_else(|| anyhow!("unknown output format '{}'", config.output.format))?,
    };
    let output = match format {
        OutputFormat::Text => render_text(&analysis, only.as_ref())?,
        OutputFormat::Json => render_json(&analysis, only.as_ref())?,
    };
    println!("{}", output.trim_end());
    Ok(())
}

fn explain(config: &RelgenConfig, schema: &std::path::Path) -> anyhow::Result<()> {
    let model = load_schema(schema)?;
    let generation = GenerationConfig::builder()
        .with_renderer(OutlineRenderer)
        .with_selected(OutlineRenderer::NAME)
        .with_analyzer_config(config.analysis.analyzer_config())
        .build()?;

    let compiled = compile(&model, &generation)?;
    println!("{}", render_explain(&compiled)?.trim_end());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_analyze() {
        let args = Args::try_parse_from([
            "relgen",
            "analyze",
            "schema.fga",
            "--format",
            "json",
            "--relation",
            "doc#viewer",
        ])
        .unwrap();
        match args.command {
            Command::Analyze {
                schema,
                format,
                relation,
            } => {
                assert_eq!(schema, PathBuf::from("schema.fga"));
                assert_eq!(format, Some(OutputFormat::Json));
                assert_eq!(relation.as_deref(), Some("doc#viewer"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_config_flag_is_global() {
        let args = Args::try_parse_from(["relgen", "explain", "schema.fga", "--config", "relgen.yaml"])
            .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("relgen.yaml")));
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        assert!(Args::try_parse_from(["relgen", "analyze", "s.fga", "--format", "xml"]).is_err());
    }
}
