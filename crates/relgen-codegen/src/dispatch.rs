//! Dispatch assembly.
//!
//! Every (type, relation, operation) gets a route: the specialized function
//! when its capability allows it, the generic runtime evaluator otherwise.

use std::collections::{BTreeMap, BTreeSet};

use relgen_domain::analysis::{RelationAnalysis, SchemaAnalysis, Strategy};
use relgen_domain::model::RelationKey;
use serde::Serialize;

use crate::error::{CodegenError, CodegenResult};
use crate::naming::{dispatcher_name, function_name, generic_function_name};
use crate::renderer::Operation;

/// Where a dispatcher sends one (type, relation, operation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Route {
    Specialized { function: String, strategy: Strategy },
    Generic { function: String, reason: String },
}

impl Route {
    pub fn function(&self) -> &str {
        match self {
            Route::Specialized { function, .. } | Route::Generic { function, .. } => function,
        }
    }

    pub fn is_specialized(&self) -> bool {
        matches!(self, Route::Specialized { .. })
    }
}

/// Routes for one relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationRoutes {
    pub relation: String,
    pub check: Route,
    pub list_objects: Route,
    pub list_subjects: Route,
}

impl RelationRoutes {
    fn for_analysis(analysis: &RelationAnalysis) -> Self {
        let caps = &analysis.capabilities;
        let route = |operation: Operation| {
            let (allowed, reason, strategy) = if operation.is_list() {
                (caps.list_allowed, &caps.list_reason, analysis.list_strategy)
            } else {
                (caps.check_allowed, &caps.check_reason, analysis.check_strategy)
            };
            if allowed {
                Route::Specialized {
                    function: function_name(operation, &analysis.key),
                    strategy,
                }
            } else {
                Route::Generic {
                    function: generic_function_name(operation).to_string(),
                    reason: reason.clone(),
                }
            }
        };
        Self {
            relation: analysis.key.relation.clone(),
            check: route(Operation::Check),
            list_objects: route(Operation::ListObjects),
            list_subjects: route(Operation::ListSubjects),
        }
    }

    pub fn route(&self, operation: Operation) -> &Route {
        match operation {
            Operation::Check => &self.check,
            Operation::ListObjects => &self.list_objects,
            Operation::ListSubjects => &self.list_subjects,
        }
    }
}

/// Routes for one object type, relations in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeRoutes {
    pub object_type: String,
    pub relations: Vec<RelationRoutes>,
}

/// Dispatcher routing table for a whole schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchPlan {
    pub types: Vec<TypeRoutes>,
}

impl DispatchPlan {
    /// Build routes from an analysis.
    ///
    /// Fails when two relations sanitise to the same specialized function name.
    pub fn build(analysis: &SchemaAnalysis) -> CodegenResult<Self> {
        let mut owners: BTreeMap<String, &RelationKey> = BTreeMap::new();
        let mut types: Vec<TypeRoutes> = Vec::new();

        for relation in analysis.iter() {
            let routes = RelationRoutes::for_analysis(relation);
            for operation in Operation::ALL {
                let route = routes.route(operation);
                if !route.is_specialized() {
                    continue;
                }
                if let Some(first) = owners.insert(route.function().to_string(), &relation.key) {
                    return Err(CodegenError::FunctionNameCollision {
                        function: route.function().to_string(),
                        first: first.to_string(),
                        second: relation.key.to_string(),
                    });
                }
            }

            match types.last_mut() {
                Some(last) if last.object_type == relation.key.object_type => {
                    last.relations.push(routes)
                }
                _ => types.push(TypeRoutes {
                    object_type: relation.key.object_type.clone(),
                    relations: vec![routes],
                }),
            }
        }
        Ok(Self { types })
    }

    pub fn route(&self, object_type: &str, relation: &str, operation: Operation) -> Option<&Route> {
        self.types
            .iter()
            .find(|t| t.object_type == object_type)?
            .relations
            .iter()
            .find(|r| r.relation == relation)
            .map(|r| r.route(operation))
    }

    /// Every route, in declaration order.
    pub fn routes(&self) -> impl Iterator<Item = (&str, &str, Operation, &Route)> {
        self.types.iter().flat_map(|t| {
            t.relations.iter().flat_map(move |r| {
                Operation::ALL
                    .into_iter()
                    .map(move |op| (t.object_type.as_str(), r.relation.as_str(), op, r.route(op)))
            })
        })
    }

    /// Routes that fall back to the generic evaluator.
    pub fn generic_count(&self) -> usize {
        self.routes().filter(|(.., route)| !route.is_specialized()).count()
    }
}

/// Every function a generation run emits: specialized functions plus the
/// dispatchers, which are always present. Used to find stale functions left
/// behind by an earlier schema.
pub fn collect_function_names(plan: &DispatchPlan) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = plan
        .routes()
        .filter(|(.., route)| route.is_specialized())
        .map(|(.., route)| route.function().to_string())
        .collect();
    for operation in Operation::ALL {
        names.insert(dispatcher_name(operation).to_string());
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgen_domain::analysis::analyze;
    use relgen_domain::model::parse;

    fn plan(dsl: &str) -> CodegenResult<DispatchPlan> {
        DispatchPlan::build(&analyze(&parse(dsl).unwrap()).unwrap())
    }

    #[test]
    fn test_allowed_relation_is_specialized() {
        let plan = plan("type user\ntype doc\n  relations\n    define viewer: [user]\n").unwrap();
        assert_eq!(
            plan.route("doc", "viewer", Operation::Check),
            Some(&Route::Specialized {
                function: "check_doc_viewer".to_string(),
                strategy: Strategy::Direct,
            })
        );
        assert_eq!(
            plan.route("doc", "viewer", Operation::ListSubjects).map(Route::function),
            Some("list_doc_viewer_subjects")
        );
        assert_eq!(plan.generic_count(), 0);
        assert!(plan.route("doc", "owner", Operation::Check).is_none());
    }

    #[test]
    fn test_list_denied_relation_routes_to_generic() {
        let plan = plan(
            r#"
type user
type doc
  relations
    define a: [user]
    define b: [user]
    define c: [user]
    define viewer: a and (b but not c)
"#,
        )
        .unwrap();
        assert!(plan.route("doc", "viewer", Operation::Check).unwrap().is_specialized());
        let list = plan.route("doc", "viewer", Operation::ListObjects).unwrap();
        assert_eq!(list.function(), "list_accessible_objects_generic");
        assert!(matches!(list, Route::Generic { reason, .. } if reason.contains("intersection")));
        assert_eq!(plan.generic_count(), 2);
    }

    #[test]
    fn test_types_group_in_declaration_order() {
        let plan = plan(
            r#"
type user
type folder
  relations
    define viewer: [user]
type doc
  relations
    define owner: [user]
    define viewer: owner
"#,
        )
        .unwrap();
        let layout: Vec<(&str, Vec<&str>)> = plan
            .types
            .iter()
            .map(|t| {
                (
                    t.object_type.as_str(),
                    t.relations.iter().map(|r| r.relation.as_str()).collect(),
                )
            })
            .collect();
        assert_eq!(
            layout,
            vec![("folder", vec!["viewer"]), ("doc", vec!["owner", "viewer"])]
        );
    }

    #[test]
    fn test_sanitised_name_collision_is_fatal() {
        let err = plan(
            r#"
type user
type team-a
  relations
    define member: [user]
type team_a
  relations
    define member: [user]
"#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "function name 'check_team_a_member' is generated for both team-a#member and team_a#member"
        );
    }

    #[test]
    fn test_collect_function_names() {
        let plan = plan(
            r#"
type user
type doc
  relations
    define a: [user]
    define b: [user]
    define c: [user]
    define viewer: a and (b but not c)
"#,
        )
        .unwrap();
        let names = collect_function_names(&plan);
        assert!(names.contains("check_doc_viewer"));
        assert!(!names.contains("list_doc_viewer_objects"));
        assert!(names.contains("list_doc_a_objects"));
        assert!(names.contains("check_permission"));
        assert!(names.contains("list_accessible_objects"));
        assert!(names.contains("list_accessible_subjects"));
        // 4 checks + 3 x 2 lists + 3 dispatchers
        assert_eq!(names.len(), 13);
    }
}
