//! Schema analyzer: runs every analysis pass once per schema.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::capabilities::{determine_capabilities, local_denials, GenerationCapabilities};
use super::closure::{find_indirect_anchor, propagate, ClosureStats, IndirectAnchor};
use super::config::AnalyzerConfig;
use super::features::{detect_features, RelationFeatures, RewriteFacts};
use super::graph::RelationGraph;
use super::strategy::{determine_check_strategy, determine_list_strategy, Strategy, StrategyFacts};
use crate::error::{DomainError, DomainResult};
use crate::model::{AuthorizationModel, RelationKey};

/// Everything derived about one relation. Computed once, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationAnalysis {
    pub key: RelationKey,
    /// Flags from the relation's own rewrite tree.
    pub features: RelationFeatures,
    /// Userset restrictions declared by the relation itself.
    pub userset_patterns: BTreeSet<RelationKey>,
    pub closure_parent_relations: BTreeSet<RelationKey>,
    pub closure_userset_patterns: BTreeSet<RelationKey>,
    pub indirect_anchor: Option<IndirectAnchor>,
    pub max_chain_depth: u32,
    pub exceeds_depth_limit: bool,
    pub has_self_referential_userset: bool,
    pub capabilities: GenerationCapabilities,
    pub check_strategy: Strategy,
    pub list_strategy: Strategy,
}

impl RelationAnalysis {
    pub fn strategy_facts(&self) -> StrategyFacts {
        StrategyFacts {
            exceeds_depth_limit: self.exceeds_depth_limit,
            has_self_referential_userset: self.has_self_referential_userset,
            has_indirect_anchor: self.indirect_anchor.is_some(),
            has_intersection: self.features.has_intersection,
            has_recursive: self.features.has_recursive,
            has_closure_parents: !self.closure_parent_relations.is_empty(),
            has_userset: self.features.has_userset,
            has_closure_usersets: !self.closure_userset_patterns.is_empty(),
        }
    }
}

impl From<&RelationAnalysis> for StrategyFacts {
    fn from(analysis: &RelationAnalysis) -> Self {
        analysis.strategy_facts()
    }
}

/// Analysis of a whole schema, in declaration order.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaAnalysis {
    pub max_depth: u32,
    pub relations: Vec<RelationAnalysis>,
    pub stats: ClosureStats,
    #[serde(skip)]
    index: BTreeMap<RelationKey, usize>,
}

impl SchemaAnalysis {
    fn new(max_depth: u32, relations: Vec<RelationAnalysis>, stats: ClosureStats) -> Self {
        let index = relations
            .iter()
            .enumerate()
            .map(|(i, r)| (r.key.clone(), i))
            .collect();
        Self {
            max_depth,
            relations,
            stats,
            index,
        }
    }

    pub fn get(&self, object_type: &str, relation: &str) -> Option<&RelationAnalysis> {
        self.index
            .get(&RelationKey::new(object_type, relation))
            .map(|&i| &self.relations[i])
    }

    /// Like [`get`](Self::get), but a missing entry is a fatal contract violation.
    pub fn require(&self, object_type: &str, relation: &str) -> DomainResult<&RelationAnalysis> {
        self.get(object_type, relation)
            .ok_or_else(|| DomainError::MissingAnalysis {
                type_name: object_type.to_string(),
                relation: relation.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelationAnalysis> {
        self.relations.iter()
    }

    /// Relations of one object type, in declaration order.
    pub fn for_type<'a>(&'a self, object_type: &'a str) -> impl Iterator<Item = &'a RelationAnalysis> + 'a {
        self.relations
            .iter()
            .filter(move |r| r.key.object_type == object_type)
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Check that every relation of `model` has an analysis record with justified capabilities.
    pub fn verify_against(&self, model: &AuthorizationModel) -> DomainResult<()> {
        for (type_def, relation) in model.relations() {
            let analysis = self.require(&type_def.type_name, &relation.name)?;
            analysis.capabilities.ensure_reasons(&analysis.key)?;
        }
        Ok(())
    }
}

/// Runs feature detection, closure propagation, capability and strategy selection.
#[derive(Debug, Clone)]
pub struct SchemaAnalyzer {
    config: AnalyzerConfig,
}

impl Default for SchemaAnalyzer {
    fn default() -> Self {
        Self {
            config: AnalyzerConfig::default(),
        }
    }
}

impl SchemaAnalyzer {
    pub fn new(config: AnalyzerConfig) -> DomainResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze every relation of `model`.
    ///
    /// Unresolved references and malformed rewrites abort the run; relations
    /// that cannot be specialized are recorded on their capabilities instead.
    #[instrument(skip_all, fields(types = model.type_definitions.len()))]
    pub fn analyze(&self, model: &AuthorizationModel) -> DomainResult<SchemaAnalysis> {
        let max_depth = self.config.max_depth;
        let graph = RelationGraph::build(model)?;

        let facts: Vec<RewriteFacts> = graph
            .ids()
            .map(|id| detect_features(&graph.key(id).object_type, graph.definition(id)))
            .collect::<DomainResult<_>>()?;

        let outcome = propagate(&graph, &facts, max_depth);

        let self_referential: Vec<bool> = graph
            .ids()
            .map(|id| {
                let key = graph.key(id);
                facts[id.index()].userset_patterns.contains(key)
                    || outcome.closures[id.index()].userset_patterns.contains(key)
            })
            .collect();

        let local: Vec<_> = graph
            .ids()
            .map(|id| local_denials(&facts[id.index()], self_referential[id.index()]))
            .collect();
        // Dependency sets are transitive, so a relation inherits a denial
        // exactly when one of its dependencies is denied locally.
        let list_denied: Vec<bool> = graph
            .ids()
            .map(|id| {
                local[id.index()].1.is_some()
                    || outcome.closures[id.index()]
                        .dependencies
                        .iter()
                        .filter_map(|dependency| graph.id_of(dependency))
                        .any(|d| local[d.index()].1.is_some())
            })
            .collect();
        let dependency_list_denied =
            |key: &RelationKey| graph.id_of(key).is_some_and(|id| list_denied[id.index()]);

        let mut relations = Vec::with_capacity(graph.len());
        for id in graph.ids() {
            let key = graph.key(id);
            let own = &facts[id.index()];
            let closure = &outcome.closures[id.index()];

            let capabilities = determine_capabilities(
                key,
                local[id.index()],
                &closure.dependencies,
                &dependency_list_denied,
            );

            let mut analysis = RelationAnalysis {
                key: key.clone(),
                features: own.features,
                userset_patterns: own.userset_patterns.clone(),
                closure_parent_relations: closure.parent_relations.clone(),
                closure_userset_patterns: closure.userset_patterns.clone(),
                indirect_anchor: find_indirect_anchor(&graph, &facts, id, max_depth),
                max_chain_depth: closure.max_chain_depth,
                exceeds_depth_limit: closure.exceeds_depth_limit,
                has_self_referential_userset: self_referential[id.index()],
                capabilities,
                check_strategy: Strategy::Direct,
                list_strategy: Strategy::Direct,
            };
            let strategy_facts = analysis.strategy_facts();
            analysis.check_strategy = determine_check_strategy(&strategy_facts);
            analysis.list_strategy = determine_list_strategy(&strategy_facts);

            debug!(
                relation = %analysis.key,
                features = %analysis.features,
                list_strategy = %analysis.list_strategy,
                check_allowed = analysis.capabilities.check_allowed,
                list_allowed = analysis.capabilities.list_allowed,
                "relation analyzed"
            );
            relations.push(analysis);
        }

        let analysis = SchemaAnalysis::new(max_depth, relations, outcome.stats);
        analysis.verify_against(model)?;

        info!(
            relations = analysis.len(),
            depth_exceeded = analysis
                .iter()
                .filter(|r| r.exceeds_depth_limit)
                .count(),
            list_denied = analysis
                .iter()
                .filter(|r| !r.capabilities.list_allowed)
                .count(),
            "schema analyzed"
        );
        Ok(analysis)
    }
}

/// Analyze `model` with the default configuration.
pub fn analyze(model: &AuthorizationModel) -> DomainResult<SchemaAnalysis> {
    SchemaAnalyzer::default().analyze(model)
}
