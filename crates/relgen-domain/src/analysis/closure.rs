//! Closure propagation across relations.
//!
//! Inherited facts flow along tuple-to-userset and implied edges. Each
//! strongly connected component is computed once, sinks first, and every
//! member reads the shared result. Depth is measured separately over all
//! edge kinds, including userset restrictions.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::features::RewriteFacts;
use super::graph::{Condensation, EdgeKind, RelationGraph, RelationId};
use crate::model::RelationKey;

/// Counters describing one propagation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureStats {
    /// Relations in the schema.
    pub relations: usize,
    /// Components of the closure graph.
    pub components: usize,
    /// Components that contain a cycle.
    pub cyclic_components: usize,
    /// Component closures built. Each component is built exactly once.
    pub closures_computed: usize,
    /// Finished downstream closures merged into an upstream component instead of being rebuilt.
    pub closures_reused: usize,
}

/// Inherited facts for one relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationClosure {
    /// Targets of every tuple-to-userset edge reachable from the relation.
    pub parent_relations: BTreeSet<RelationKey>,
    /// Every relation reachable over tuple-to-userset and implied edges, excluding this one.
    pub dependencies: BTreeSet<RelationKey>,
    /// Userset restrictions declared by relations reachable from (not including) this one.
    pub userset_patterns: BTreeSet<RelationKey>,
    /// Longest dependency chain starting at this relation, in hops.
    pub max_chain_depth: u32,
    pub exceeds_depth_limit: bool,
}

/// One hop of an indirect anchor chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorHop {
    /// The tupleset relation followed at this hop.
    pub linking_relation: String,
    /// The relation reached.
    pub target: RelationKey,
}

/// Terminal direct-grant relation reached through a pure tuple-to-userset chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndirectAnchor {
    pub anchor: RelationKey,
    pub path: Vec<AnchorHop>,
}

/// Result of a propagation run, indexed by [`RelationId`].
#[derive(Debug, Clone)]
pub struct ClosureOutcome {
    pub closures: Vec<RelationClosure>,
    pub stats: ClosureStats,
}

#[derive(Debug, Default)]
struct ComponentClosure {
    parents: BTreeSet<RelationId>,
    /// Relations reachable from any member; includes the members when the component is cyclic.
    reachable: BTreeSet<RelationId>,
    /// Patterns declared strictly downstream of the component.
    downstream_patterns: BTreeSet<RelationKey>,
}

/// Propagate closure facts for every relation in `graph`.
///
/// `facts` holds each relation's own rewrite facts, indexed by id.
pub fn propagate(graph: &RelationGraph<'_>, facts: &[RewriteFacts], max_depth: u32) -> ClosureOutcome {
    let closure_graph = graph.condense(EdgeKind::is_closure_edge);
    let mut stats = ClosureStats {
        relations: graph.len(),
        components: closure_graph.len(),
        cyclic_components: (0..closure_graph.len())
            .filter(|&c| closure_graph.is_cyclic(c))
            .count(),
        ..ClosureStats::default()
    };
    let components = compute_component_closures(graph, &closure_graph, facts, &mut stats);
    let depths = chain_depths(graph);

    let closures = graph
        .ids()
        .map(|id| {
            let c = closure_graph.component_of(id);
            let shared = &components[c];

            let mut userset_patterns = shared.downstream_patterns.clone();
            for &peer in &closure_graph.components()[c] {
                if peer != id {
                    userset_patterns.extend(facts[peer.index()].userset_patterns.iter().cloned());
                }
            }

            let max_chain_depth = depths[id.index()];
            RelationClosure {
                parent_relations: shared.parents.iter().map(|&p| graph.key(p).clone()).collect(),
                dependencies: shared
                    .reachable
                    .iter()
                    .filter(|&&r| r != id)
                    .map(|&r| graph.key(r).clone())
                    .collect(),
                userset_patterns,
                max_chain_depth,
                exceeds_depth_limit: max_chain_depth >= max_depth,
            }
        })
        .collect();

    debug!(
        relations = stats.relations,
        components = stats.components,
        cyclic_components = stats.cyclic_components,
        closures_reused = stats.closures_reused,
        "closure propagated"
    );

    ClosureOutcome { closures, stats }
}

fn compute_component_closures(
    graph: &RelationGraph<'_>,
    scc: &Condensation,
    facts: &[RewriteFacts],
    stats: &mut ClosureStats,
) -> Vec<ComponentClosure> {
    let member_patterns: Vec<BTreeSet<RelationKey>> = scc
        .components()
        .iter()
        .map(|members| {
            members
                .iter()
                .flat_map(|m| facts[m.index()].userset_patterns.iter().cloned())
                .collect()
        })
        .collect();

    let mut closures: Vec<ComponentClosure> = Vec::with_capacity(scc.len());
    for (c, members) in scc.components().iter().enumerate() {
        let mut closure = ComponentClosure::default();
        if scc.is_cyclic(c) {
            closure.reachable.extend(members.iter().copied());
        }
        for &member in members {
            for edge in graph.edges(member) {
                if !edge.kind.is_closure_edge() {
                    continue;
                }
                closure.reachable.insert(edge.target);
                if matches!(edge.kind, EdgeKind::TupleToUserset { .. }) {
                    closure.parents.insert(edge.target);
                }
                let d = scc.component_of(edge.target);
                if d != c {
                    // sinks come first, so `d` is already final
                    let downstream = &closures[d];
                    stats.closures_reused += 1;
                    closure.parents.extend(downstream.parents.iter().copied());
                    closure.reachable.extend(downstream.reachable.iter().copied());
                    closure
                        .downstream_patterns
                        .extend(downstream.downstream_patterns.iter().cloned());
                    closure
                        .downstream_patterns
                        .extend(member_patterns[d].iter().cloned());
                }
            }
        }
        stats.closures_computed += 1;
        closures.push(closure);
    }
    closures
}

/// Longest chain from each relation over every edge kind.
///
/// A cyclic component contributes `size - 1` hops; self-loops add nothing.
fn chain_depths(graph: &RelationGraph<'_>) -> Vec<u32> {
    let scc = graph.condense(|_| true);
    let mut component_depth = vec![0u32; scc.len()];
    for (c, members) in scc.components().iter().enumerate() {
        let internal = members.len().saturating_sub(1) as u32;
        let mut longest = 0u32;
        for &member in members {
            for edge in graph.edges(member) {
                let d = scc.component_of(edge.target);
                if d != c {
                    longest = longest.max(component_depth[d].saturating_add(1));
                }
            }
        }
        component_depth[c] = internal.saturating_add(longest);
    }
    graph
        .ids()
        .map(|id| component_depth[scc.component_of(id)])
        .collect()
}

/// Follow a pure tuple-to-userset chain from `start` to a plain direct grant.
///
/// Returns `None` when the start is not a single TTU, a hop fans out to more
/// than one relation, a hop is impure, a relation is revisited, or the chain
/// reaches `max_depth` hops.
pub fn find_indirect_anchor(
    graph: &RelationGraph<'_>,
    facts: &[RewriteFacts],
    start: RelationId,
    max_depth: u32,
) -> Option<IndirectAnchor> {
    if !facts[start.index()].is_single_ttu {
        return None;
    }

    let mut visited = HashSet::from([start]);
    let mut path = Vec::new();
    let mut current = start;
    loop {
        let mut ttu_edges = graph.edges(current).iter().filter_map(|e| match &e.kind {
            EdgeKind::TupleToUserset { linking_relation } => Some((e.target, linking_relation)),
            _ => None,
        });
        let (next, linking_relation) = ttu_edges.next()?;
        if ttu_edges.next().is_some() {
            return None;
        }

        path.push(AnchorHop {
            linking_relation: linking_relation.clone(),
            target: graph.key(next).clone(),
        });
        if path.len() as u32 >= max_depth || !visited.insert(next) {
            return None;
        }

        let next_facts = &facts[next.index()];
        if next_facts.is_plain_direct {
            return Some(IndirectAnchor {
                anchor: graph.key(next).clone(),
                path,
            });
        }
        if !next_facts.is_single_ttu {
            return None;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::features::detect_features;
    use crate::model::{parse, AuthorizationModel};

    struct Fixture {
        model: AuthorizationModel,
    }

    impl Fixture {
        fn new(dsl: &str) -> Self {
            Self {
                model: parse(dsl).unwrap(),
            }
        }

        fn run(&self, max_depth: u32) -> (RelationGraph<'_>, Vec<RewriteFacts>, ClosureOutcome) {
            let graph = RelationGraph::build(&self.model).unwrap();
            let facts: Vec<_> = graph
                .ids()
                .map(|id| detect_features(&graph.key(id).object_type, graph.definition(id)).unwrap())
                .collect();
            let outcome = propagate(&graph, &facts, max_depth);
            (graph, facts, outcome)
        }
    }

    fn closure<'a>(graph: &RelationGraph<'_>, outcome: &'a ClosureOutcome, key: &str) -> &'a RelationClosure {
        let id = graph.id_of(&RelationKey::parse(key).unwrap()).unwrap();
        &outcome.closures[id.index()]
    }

    fn keys(set: &BTreeSet<RelationKey>) -> Vec<String> {
        set.iter().map(ToString::to_string).collect()
    }

    /// `t0.rel -> t1.rel -> ... -> t{hops}.rel`, the last one granted by `terminal`.
    fn chain_dsl(hops: usize, terminal: &str) -> String {
        let mut dsl = String::from("type user\ntype group\n  relations\n    define member: [user]\n");
        for i in 0..hops {
            dsl.push_str(&format!(
                "type t{i}\n  relations\n    define parent: [t{}]\n    define rel: rel from parent\n",
                i + 1
            ));
        }
        dsl.push_str(&format!("type t{hops}\n  relations\n    define rel: {terminal}\n"));
        dsl
    }

    #[test]
    fn test_direct_relation_has_empty_closure() {
        let fixture = Fixture::new("type user\ntype doc\n  relations\n    define viewer: [user]\n");
        let (graph, _, outcome) = fixture.run(25);
        let c = closure(&graph, &outcome, "doc#viewer");
        assert!(c.parent_relations.is_empty());
        assert!(c.userset_patterns.is_empty());
        assert_eq!(c.max_chain_depth, 0);
        assert!(!c.exceeds_depth_limit);
    }

    #[test]
    fn test_parents_and_patterns_are_inherited_through_ttu() {
        let fixture = Fixture::new(
            r#"
type user
type group
  relations
    define member: [user]
type folder
  relations
    define viewer: [group#member]
type document
  relations
    define parent: [folder]
    define viewer: viewer from parent
    define can_view: viewer
"#,
        );
        let (graph, _, outcome) = fixture.run(25);

        let viewer = closure(&graph, &outcome, "document#viewer");
        assert_eq!(keys(&viewer.parent_relations), vec!["folder#viewer"]);
        assert_eq!(keys(&viewer.userset_patterns), vec!["group#member"]);

        let can_view = closure(&graph, &outcome, "document#can_view");
        assert_eq!(keys(&can_view.parent_relations), vec!["folder#viewer"]);
        assert_eq!(keys(&can_view.userset_patterns), vec!["group#member"]);
        assert_eq!(can_view.max_chain_depth, 3);
    }

    #[test]
    fn test_dependencies_follow_implied_and_ttu_edges() {
        let fixture = Fixture::new(
            r#"
type user
type folder
  relations
    define a: [user]
    define inner: a
    define viewer: inner
type document
  relations
    define parent: [folder]
    define owner: [user]
    define viewer: owner or viewer from parent
"#,
        );
        let (graph, _, outcome) = fixture.run(25);
        let document = closure(&graph, &outcome, "document#viewer");
        assert_eq!(
            keys(&document.dependencies),
            vec!["document#owner", "folder#a", "folder#inner", "folder#viewer"]
        );
        assert_eq!(keys(&document.parent_relations), vec!["folder#viewer"]);
        assert!(closure(&graph, &outcome, "folder#a").dependencies.is_empty());
    }

    #[test]
    fn test_userset_edges_do_not_carry_closure() {
        let fixture = Fixture::new(
            r#"
type user
type folder
  relations
    define parent: [folder]
    define viewer: [user] or viewer from parent
type team
  relations
    define member: [folder#viewer]
"#,
        );
        let (graph, _, outcome) = fixture.run(25);
        let member = closure(&graph, &outcome, "team#member");
        assert!(member.parent_relations.is_empty());
        assert!(member.dependencies.is_empty());
        assert_eq!(member.max_chain_depth, 1);
    }

    #[test]
    fn test_self_loop_is_recursive_not_deep() {
        let fixture = Fixture::new(
            r#"
type user
type folder
  relations
    define parent: [folder]
    define viewer: [user] or viewer from parent
"#,
        );
        let (graph, _, outcome) = fixture.run(25);
        let viewer = closure(&graph, &outcome, "folder#viewer");
        assert_eq!(keys(&viewer.parent_relations), vec!["folder#viewer"]);
        assert!(viewer.dependencies.is_empty());
        assert_eq!(viewer.max_chain_depth, 0);
        assert!(!viewer.exceeds_depth_limit);
        assert_eq!(outcome.stats.cyclic_components, 1);
    }

    #[test]
    fn test_diamond_shares_grandparent_closure() {
        let fixture = Fixture::new(
            r#"
type user
type group
  relations
    define member: [user]
type org
  relations
    define admin: [group#member]
type folder
  relations
    define org: [org]
    define viewer: admin from org
type drive
  relations
    define org: [org]
    define viewer: admin from org
type document
  relations
    define folder: [folder]
    define drive: [drive]
    define viewer: viewer from folder or viewer from drive
"#,
        );
        let (graph, _, outcome) = fixture.run(25);

        assert_eq!(outcome.stats.relations, graph.len());
        assert_eq!(outcome.stats.components, graph.len());
        assert_eq!(outcome.stats.closures_computed, outcome.stats.components);
        // org#admin is built once and read by both folder#viewer and drive#viewer;
        // document#viewer reads those two in turn.
        assert_eq!(outcome.stats.closures_reused, 4);

        let via_folder = closure(&graph, &outcome, "folder#viewer");
        let via_drive = closure(&graph, &outcome, "drive#viewer");
        assert_eq!(via_folder.userset_patterns, via_drive.userset_patterns);
        assert_eq!(keys(&via_folder.parent_relations), vec!["org#admin"]);

        let document = closure(&graph, &outcome, "document#viewer");
        assert_eq!(
            keys(&document.parent_relations),
            vec!["drive#viewer", "folder#viewer", "org#admin"]
        );
        assert_eq!(
            keys(&document.dependencies),
            vec!["drive#viewer", "folder#viewer", "org#admin"]
        );
        assert_eq!(keys(&document.userset_patterns), vec!["group#member"]);
    }

    #[test]
    fn test_cyclic_component_excludes_own_patterns_only() {
        let fixture = Fixture::new(
            r#"
type user
type group
  relations
    define member: [user]
type team
  relations
    define member: [user]
type folder
  relations
    define parent: [folder]
    define a: [group#member] or b from parent
    define b: [team#member] or a from parent
"#,
        );
        let (graph, _, outcome) = fixture.run(25);
        let a = closure(&graph, &outcome, "folder#a");
        assert_eq!(keys(&a.userset_patterns), vec!["team#member"]);
        assert_eq!(keys(&a.parent_relations), vec!["folder#a", "folder#b"]);
        let b = closure(&graph, &outcome, "folder#b");
        assert_eq!(keys(&b.userset_patterns), vec!["group#member"]);
        assert_eq!(keys(&a.dependencies), vec!["folder#b"]);
        assert_eq!(keys(&b.dependencies), vec!["folder#a"]);

        assert_eq!(outcome.stats.relations, 5);
        assert_eq!(outcome.stats.components, 4);
        assert_eq!(outcome.stats.closures_computed, 4);
        assert_eq!(outcome.stats.closures_reused, 0);
    }

    #[test]
    fn test_chain_of_26_hops_exceeds_ceiling() {
        let fixture = Fixture::new(&chain_dsl(26, "[group#member]"));
        let (graph, _, outcome) = fixture.run(25);
        let start = closure(&graph, &outcome, "t0#rel");
        assert_eq!(start.max_chain_depth, 27);
        assert!(start.exceeds_depth_limit);
    }

    #[test]
    fn test_chain_of_25_hops_reaches_ceiling() {
        let fixture = Fixture::new(&chain_dsl(25, "[user]"));
        let (graph, _, outcome) = fixture.run(25);
        assert!(closure(&graph, &outcome, "t0#rel").exceeds_depth_limit);
        assert!(!closure(&graph, &outcome, "t1#rel").exceeds_depth_limit);
    }

    #[test]
    fn test_chain_of_24_hops_to_direct_grant_is_within_ceiling() {
        let fixture = Fixture::new(&chain_dsl(24, "[user]"));
        let (graph, facts, outcome) = fixture.run(25);
        let start = closure(&graph, &outcome, "t0#rel");
        assert_eq!(start.max_chain_depth, 24);
        assert!(!start.exceeds_depth_limit);

        let id = graph.id_of(&RelationKey::new("t0", "rel")).unwrap();
        let anchor = find_indirect_anchor(&graph, &facts, id, 25).unwrap();
        assert_eq!(anchor.anchor, RelationKey::new("t24", "rel"));
        assert_eq!(anchor.path.len(), 24);
        assert_eq!(anchor.path[0].linking_relation, "parent");
        assert_eq!(anchor.path[0].target, RelationKey::new("t1", "rel"));
    }

    #[test]
    fn test_anchor_for_single_hop() {
        let fixture = Fixture::new(&chain_dsl(1, "[user, user:*]"));
        let (graph, facts, _) = fixture.run(25);
        let id = graph.id_of(&RelationKey::new("t0", "rel")).unwrap();
        let anchor = find_indirect_anchor(&graph, &facts, id, 25).unwrap();
        assert_eq!(anchor.anchor, RelationKey::new("t1", "rel"));
    }

    #[test]
    fn test_anchor_unset_when_terminal_has_userset() {
        let fixture = Fixture::new(&chain_dsl(2, "[user, group#member]"));
        let (graph, facts, _) = fixture.run(25);
        let id = graph.id_of(&RelationKey::new("t0", "rel")).unwrap();
        assert!(find_indirect_anchor(&graph, &facts, id, 25).is_none());
    }

    #[test]
    fn test_anchor_unset_when_hop_is_impure() {
        let fixture = Fixture::new(&chain_dsl(2, "[user]").replace(
            "type t1\n  relations\n    define parent: [t2]\n    define rel: rel from parent\n",
            "type t1\n  relations\n    define parent: [t2]\n    define rel: [user] or rel from parent\n",
        ));
        let (graph, facts, _) = fixture.run(25);
        let id = graph.id_of(&RelationKey::new("t0", "rel")).unwrap();
        assert!(find_indirect_anchor(&graph, &facts, id, 25).is_none());
    }

    #[test]
    fn test_anchor_unset_on_fan_out() {
        let fixture = Fixture::new(
            r#"
type user
type folder
  relations
    define viewer: [user]
type drive
  relations
    define viewer: [user]
type document
  relations
    define parent: [folder, drive]
    define viewer: viewer from parent
"#,
        );
        let (graph, facts, _) = fixture.run(25);
        let id = graph.id_of(&RelationKey::new("document", "viewer")).unwrap();
        assert!(find_indirect_anchor(&graph, &facts, id, 25).is_none());
    }

    #[test]
    fn test_anchor_unset_on_revisit() {
        let fixture = Fixture::new(
            r#"
type user
type folder
  relations
    define parent: [folder]
    define viewer: viewer from parent
    define owner: [user]
"#,
        );
        let (graph, facts, _) = fixture.run(25);
        let id = graph.id_of(&RelationKey::new("folder", "viewer")).unwrap();
        assert!(find_indirect_anchor(&graph, &facts, id, 25).is_none());
    }

    #[test]
    fn test_anchor_unset_at_depth_ceiling() {
        let fixture = Fixture::new(&chain_dsl(5, "[user]"));
        let (graph, facts, _) = fixture.run(5);
        let id = graph.id_of(&RelationKey::new("t0", "rel")).unwrap();
        assert!(find_indirect_anchor(&graph, &facts, id, 5).is_none());
        assert!(find_indirect_anchor(&graph, &facts, id, 6).is_some());
    }
}
