//! Generation configuration.
//!
//! Renderers are registered on a builder and handed to [`compile`](crate::compile)
//! explicitly. Name clashes and unknown selections fail at construction.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use relgen_domain::AnalyzerConfig;

use crate::error::{CodegenError, CodegenResult};
use crate::renderer::{OutlineRenderer, StrategyRenderer};

/// Renderers plus analysis settings for one generation run.
#[derive(Clone)]
pub struct GenerationConfig {
    renderers: Vec<Arc<dyn StrategyRenderer>>,
    selected: usize,
    analyzer: AnalyzerConfig,
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("renderers", &self.renderer_names())
            .field("selected", &self.renderer().name())
            .field("analyzer", &self.analyzer)
            .finish()
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            renderers: vec![Arc::new(OutlineRenderer)],
            selected: 0,
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl GenerationConfig {
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder::default()
    }

    /// The renderer used for every specialized function.
    pub fn renderer(&self) -> &dyn StrategyRenderer {
        self.renderers[self.selected].as_ref()
    }

    /// Registered renderer names, in registration order.
    pub fn renderer_names(&self) -> Vec<&str> {
        self.renderers.iter().map(|r| r.name()).collect()
    }

    pub fn analyzer(&self) -> &AnalyzerConfig {
        &self.analyzer
    }
}

/// Builder for [`GenerationConfig`].
#[derive(Default)]
pub struct GenerationConfigBuilder {
    renderers: Vec<Arc<dyn StrategyRenderer>>,
    selected: Option<String>,
    analyzer: AnalyzerConfig,
}

impl GenerationConfigBuilder {
    /// Register a renderer. Duplicate names are reported by [`build`](Self::build).
    pub fn with_renderer(mut self, renderer: impl StrategyRenderer + 'static) -> Self {
        self.renderers.push(Arc::new(renderer));
        self
    }

    /// Select a renderer by name. Defaults to the first one registered.
    pub fn with_selected(mut self, name: impl Into<String>) -> Self {
        self.selected = Some(name.into());
        self
    }

    pub fn with_analyzer_config(mut self, analyzer: AnalyzerConfig) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// With no renderers registered, the outline renderer is used.
    pub fn build(self) -> CodegenResult<GenerationConfig> {
        self.analyzer.validate()?;

        let mut renderers = self.renderers;
        if renderers.is_empty() {
            renderers.push(Arc::new(OutlineRenderer));
        }

        let mut seen = BTreeSet::new();
        for renderer in &renderers {
            if !seen.insert(renderer.name().to_string()) {
                return Err(CodegenError::DuplicateRenderer {
                    name: renderer.name().to_string(),
                });
            }
        }

        let selected = match self.selected {
            None => 0,
            Some(name) => renderers
                .iter()
                .position(|r| r.name() == name)
                .ok_or_else(|| CodegenError::UnknownRenderer {
                    available: seen.into_iter().collect::<Vec<_>>().join(", "),
                    name,
                })?,
        };

        Ok(GenerationConfig {
            renderers,
            selected,
            analyzer: self.analyzer,
        })
    }
}
