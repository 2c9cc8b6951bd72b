//! Generation entry point.

use std::collections::BTreeSet;

use relgen_domain::model::AuthorizationModel;
use relgen_domain::validation::validate_model;
use relgen_domain::{DomainError, SchemaAnalysis, SchemaAnalyzer};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::GenerationConfig;
use crate::dispatch::{collect_function_names, DispatchPlan, Route};
use crate::error::{CodegenError, CodegenResult};
use crate::renderer::{Operation, RenderRequest};

/// One rendered specialized function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedFunction {
    pub name: String,
    pub object_type: String,
    pub relation: String,
    pub operation: Operation,
    pub body: String,
}

/// Output of a successful generation run.
#[derive(Debug, Clone, Serialize)]
pub struct CompiledSchema {
    pub renderer: String,
    pub analysis: SchemaAnalysis,
    pub dispatch: DispatchPlan,
    /// Specialized functions in declaration order, check before list.
    pub functions: Vec<GeneratedFunction>,
}

impl CompiledSchema {
    pub fn function(&self, name: &str) -> Option<&GeneratedFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// See [`collect_function_names`].
    pub fn function_names(&self) -> BTreeSet<String> {
        collect_function_names(&self.dispatch)
    }
}

/// Validate, analyze and render `model`.
///
/// Relations that cannot be specialized are routed to the generic evaluator
/// and logged; any fatal error returns before anything is rendered.
#[instrument(skip_all, fields(renderer = config.renderer().name()))]
pub fn compile(model: &AuthorizationModel, config: &GenerationConfig) -> CodegenResult<CompiledSchema> {
    validate_model(model)?;
    let analysis = SchemaAnalyzer::new(config.analyzer().clone())?.analyze(model)?;
    let dispatch = DispatchPlan::build(&analysis)?;

    let renderer = config.renderer();
    let mut functions = Vec::new();
    for relation in analysis.iter() {
        for operation in Operation::ALL {
            let route = dispatch
                .route(&relation.key.object_type, &relation.key.relation, operation)
                .ok_or_else(|| DomainError::InvariantViolation {
                    key: relation.key.to_string(),
                    message: format!("no {operation} route in the dispatch plan"),
                })?;
            match route {
                Route::Generic { function, reason } => {
                    warn!(
                        relation = %relation.key,
                        %operation,
                        fallback = %function,
                        reason = %reason,
                        "relation not specialized"
                    );
                }
                Route::Specialized { function, strategy } => {
                    let request = RenderRequest::new(operation, function, relation);
                    let body = renderer.render(&request).map_err(|source| CodegenError::Render {
                        function: function.clone(),
                        source,
                    })?;
                    debug!(function = %function, %strategy, "function rendered");
                    functions.push(GeneratedFunction {
                        name: function.clone(),
                        object_type: relation.key.object_type.clone(),
                        relation: relation.key.relation.clone(),
                        operation,
                        body,
                    });
                }
            }
        }
    }

    info!(
        relations = analysis.len(),
        functions = functions.len(),
        generic_routes = dispatch.generic_count(),
        "schema compiled"
    );
    Ok(CompiledSchema {
        renderer: renderer.name().to_string(),
        analysis,
        dispatch,
        functions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgen_domain::model::parse;

    #[test]
    fn test_compile_renders_every_allowed_function() {
        let model = parse("type user\ntype doc\n  relations\n    define viewer: [user]\n").unwrap();
        let compiled = compile(&model, &GenerationConfig::default()).unwrap();
        let names: Vec<_> = compiled.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["check_doc_viewer", "list_doc_viewer_objects", "list_doc_viewer_subjects"]
        );
        assert_eq!(compiled.renderer, "outline");
        assert!(compiled
            .function("check_doc_viewer")
            .unwrap()
            .body
            .contains("strategy: Direct"));
    }

    #[test]
    fn test_invalid_model_fails_before_rendering() {
        let model = parse("type doc\n  relations\n    define viewer: editor\n").unwrap();
        let err = compile(&model, &GenerationConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            CodegenError::Domain(DomainError::ModelValidationError { .. })
        ));
    }
}
