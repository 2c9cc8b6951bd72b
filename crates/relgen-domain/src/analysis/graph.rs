//! Arena-backed relation graph.
//!
//! Every (type, relation) pair gets a dense [`RelationId`]; edges point at
//! ids, so cycle and depth handling is bounded iteration over indices.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::model::{AuthorizationModel, RelationDefinition, RelationKey, TypeConstraint, Userset};

/// Dense index of a relation in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationId(u32);

impl RelationId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Why one relation depends on another.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// `computed from linking_relation`: the target lives on a related object.
    TupleToUserset { linking_relation: String },
    /// Computed userset on the same object.
    Implied,
    /// `[type#relation]` direct restriction.
    Userset,
}

impl EdgeKind {
    /// Edges the closure walk follows.
    pub fn is_closure_edge(&self) -> bool {
        !matches!(self, EdgeKind::Userset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub target: RelationId,
    pub kind: EdgeKind,
}

/// Strongly connected components of the graph, sinks first.
#[derive(Debug, Clone)]
pub struct Condensation {
    components: Vec<Vec<RelationId>>,
    component_of: Vec<usize>,
    cyclic: Vec<bool>,
}

impl Condensation {
    /// Components in reverse topological order: every component appears
    /// after all components reachable from it.
    pub fn components(&self) -> &[Vec<RelationId>] {
        &self.components
    }

    pub fn component_of(&self, id: RelationId) -> usize {
        self.component_of[id.index()]
    }

    /// True if the component contains a cycle (more than one member, or a self-loop).
    pub fn is_cyclic(&self, component: usize) -> bool {
        self.cyclic[component]
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

const UNVISITED: u32 = u32::MAX;

/// The schema's relations and the dependencies between them.
#[derive(Debug)]
pub struct RelationGraph<'m> {
    keys: Vec<RelationKey>,
    definitions: Vec<&'m RelationDefinition>,
    index: BTreeMap<RelationKey, RelationId>,
    edges: Vec<Vec<Edge>>,
}

impl<'m> RelationGraph<'m> {
    /// Build the graph, failing on any reference that does not resolve.
    pub fn build(model: &'m AuthorizationModel) -> DomainResult<Self> {
        let mut graph = Self {
            keys: Vec::new(),
            definitions: Vec::new(),
            index: BTreeMap::new(),
            edges: Vec::new(),
        };

        for (type_def, relation) in model.relations() {
            let key = RelationKey::new(&type_def.type_name, &relation.name);
            if graph.index.contains_key(&key) {
                return Err(DomainError::InvariantViolation {
                    key: key.to_string(),
                    message: "relation defined more than once".to_string(),
                });
            }
            let id = RelationId(graph.keys.len() as u32);
            graph.index.insert(key.clone(), id);
            graph.keys.push(key);
            graph.definitions.push(relation);
        }

        for position in 0..graph.keys.len() {
            let mut edges = Vec::new();
            let key = &graph.keys[position];
            let definition = graph.definitions[position];
            graph.collect_edges(model, key, definition, &definition.rewrite, &mut edges)?;
            graph.edges.push(edges);
        }

        Ok(graph)
    }

    fn unresolved(key: &RelationKey, reference: String) -> DomainError {
        DomainError::UnresolvedReference {
            type_name: key.object_type.clone(),
            relation: key.relation.clone(),
            reference,
        }
    }

    fn resolve(&self, from: &RelationKey, target: &RelationKey) -> DomainResult<RelationId> {
        self.id_of(target)
            .ok_or_else(|| Self::unresolved(from, target.to_string()))
    }

    fn collect_edges(
        &self,
        model: &AuthorizationModel,
        key: &RelationKey,
        definition: &RelationDefinition,
        node: &Userset,
        edges: &mut Vec<Edge>,
    ) -> DomainResult<()> {
        match node {
            Userset::This => {
                for constraint in &definition.type_constraints {
                    match constraint.userset_key() {
                        Some(target) => {
                            let target = self.resolve(key, &target)?;
                            push_unique(edges, target, EdgeKind::Userset);
                        }
                        None => {
                            if model.find_type(constraint.subject_type()).is_none() {
                                return Err(Self::unresolved(key, constraint.type_name.clone()));
                            }
                        }
                    }
                }
            }
            Userset::ComputedUserset { relation } => {
                let target = self.resolve(key, &RelationKey::new(&key.object_type, relation))?;
                push_unique(edges, target, EdgeKind::Implied);
            }
            Userset::TupleToUserset {
                tupleset,
                computed_userset,
            } => {
                let tupleset_key = RelationKey::new(&key.object_type, tupleset);
                let tupleset_id = self.resolve(key, &tupleset_key)?;

                let mut resolved = false;
                for parent_type in parent_types(self.definitions[tupleset_id.index()]) {
                    if let Some(target) = self.id_of(&RelationKey::new(parent_type, computed_userset)) {
                        resolved = true;
                        push_unique(
                            edges,
                            target,
                            EdgeKind::TupleToUserset {
                                linking_relation: tupleset.clone(),
                            },
                        );
                    }
                }
                if !resolved {
                    return Err(Self::unresolved(
                        key,
                        format!("{computed_userset} from {tupleset}"),
                    ));
                }
            }
            Userset::Union { children } | Userset::Intersection { children } => {
                for child in children {
                    self.collect_edges(model, key, definition, child, edges)?;
                }
            }
            Userset::Exclusion { base, subtract } => {
                self.collect_edges(model, key, definition, base, edges)?;
                self.collect_edges(model, key, definition, subtract, edges)?;
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// All ids in schema declaration order.
    pub fn ids(&self) -> impl Iterator<Item = RelationId> + '_ {
        (0..self.keys.len()).map(|i| RelationId(i as u32))
    }

    pub fn key(&self, id: RelationId) -> &RelationKey {
        &self.keys[id.index()]
    }

    pub fn definition(&self, id: RelationId) -> &'m RelationDefinition {
        self.definitions[id.index()]
    }

    pub fn id_of(&self, key: &RelationKey) -> Option<RelationId> {
        self.index.get(key).copied()
    }

    /// Outgoing edges in rewrite-tree order.
    pub fn edges(&self, id: RelationId) -> &[Edge] {
        &self.edges[id.index()]
    }

    /// Tarjan's algorithm over the edges selected by `follow`.
    ///
    /// Iterative, so deep schemas cannot exhaust the call stack.
    pub fn condense(&self, follow: impl Fn(&EdgeKind) -> bool) -> Condensation {
        let n = self.keys.len();
        let mut index = vec![UNVISITED; n];
        let mut lowlink = vec![0u32; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<usize> = Vec::new();
        let mut next_index = 0u32;
        let mut component_of = vec![usize::MAX; n];
        let mut components: Vec<Vec<RelationId>> = Vec::new();

        for root in 0..n {
            if index[root] != UNVISITED {
                continue;
            }
            index[root] = next_index;
            lowlink[root] = next_index;
            next_index += 1;
            stack.push(root);
            on_stack[root] = true;

            // (node, position of the next edge to inspect)
            let mut frames: Vec<(usize, usize)> = vec![(root, 0)];
            while let Some(frame) = frames.last_mut() {
                let (v, pos) = *frame;
                if pos < self.edges[v].len() {
                    frame.1 += 1;
                    let edge = &self.edges[v][pos];
                    if !follow(&edge.kind) {
                        continue;
                    }
                    let w = edge.target.index();
                    if index[w] == UNVISITED {
                        index[w] = next_index;
                        lowlink[w] = next_index;
                        next_index += 1;
                        stack.push(w);
                        on_stack[w] = true;
                        frames.push((w, 0));
                    } else if on_stack[w] {
                        lowlink[v] = lowlink[v].min(index[w]);
                    }
                    continue;
                }

                frames.pop();
                if let Some(&(parent, _)) = frames.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }
                if lowlink[v] == index[v] {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component_of[w] = components.len();
                        component.push(RelationId(w as u32));
                        if w == v {
                            break;
                        }
                    }
                    component.sort();
                    components.push(component);
                }
            }
        }

        let cyclic = components
            .iter()
            .map(|members| {
                members.len() > 1
                    || members.iter().any(|&m| {
                        self.edges(m)
                            .iter()
                            .any(|e| e.target == m && follow(&e.kind))
                    })
            })
            .collect();

        Condensation {
            components,
            component_of,
            cyclic,
        }
    }
}

/// Object types a tupleset relation links to: its plain restrictions, deduplicated in order.
pub(crate) fn parent_types(tupleset: &RelationDefinition) -> Vec<&str> {
    let mut types: Vec<&str> = Vec::new();
    for subject_type in tupleset
        .type_constraints
        .iter()
        .filter(|c| c.is_plain())
        .map(TypeConstraint::subject_type)
    {
        if !types.contains(&subject_type) {
            types.push(subject_type);
        }
    }
    types
}

fn push_unique(edges: &mut Vec<Edge>, target: RelationId, kind: EdgeKind) {
    if !edges.iter().any(|e| e.target == target && e.kind == kind) {
        edges.push(Edge { target, kind });
    }
}
