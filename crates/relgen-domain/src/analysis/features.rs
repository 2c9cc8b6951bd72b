//! Feature detection over a single relation's rewrite tree.
//!
//! This pass never follows edges into other relations; inherited facts are
//! the closure propagator's concern.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::model::{RelationDefinition, RelationKey, Userset};

/// Shape flags of one relation's own rewrite tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationFeatures {
    /// Direct grant of concrete subjects (`[user]`).
    pub has_direct: bool,
    /// Computed userset on the same object (`viewer: editor`).
    pub has_implied: bool,
    /// Public grant (`[user:*]`).
    pub has_wildcard: bool,
    /// Userset restriction (`[group#member]`).
    pub has_userset: bool,
    /// Tuple-to-userset (`viewer from parent`).
    pub has_recursive: bool,
    /// `but not`.
    pub has_exclusion: bool,
    /// `and`.
    pub has_intersection: bool,
}

impl RelationFeatures {
    /// True when the relation needs more than a flat tuple lookup.
    pub fn is_complex(&self) -> bool {
        self.has_userset || self.has_recursive || self.has_exclusion || self.has_intersection
    }

    fn flag_names(&self) -> Vec<&'static str> {
        [
            (self.has_direct, "Direct"),
            (self.has_implied, "Implied"),
            (self.has_wildcard, "Wildcard"),
            (self.has_userset, "Userset"),
            (self.has_recursive, "Recursive"),
            (self.has_exclusion, "Exclusion"),
            (self.has_intersection, "Intersection"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
    }
}

impl fmt::Display for RelationFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.flag_names();
        if names.is_empty() {
            f.write_str("None")
        } else {
            f.write_str(&names.join("+"))
        }
    }
}

/// Everything the detector learns from one rewrite tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteFacts {
    pub features: RelationFeatures,
    /// Userset restrictions declared by this relation (`group#member`).
    pub userset_patterns: BTreeSet<RelationKey>,
    /// An intersection appears under the subtracted side of an exclusion.
    pub intersection_under_subtract: bool,
    /// An exclusion appears inside an intersection operand.
    pub exclusion_in_intersection: bool,
    /// A tuple-to-userset appears under the subtracted side of an exclusion.
    pub ttu_under_subtract: bool,
    /// The whole rewrite is one tuple-to-userset node.
    pub is_single_ttu: bool,
    /// The whole rewrite is a direct grant with no userset restriction.
    pub is_plain_direct: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Position {
    in_intersection: bool,
    in_subtract: bool,
}

struct Detector<'a> {
    key: RelationKey,
    definition: &'a RelationDefinition,
    facts: RewriteFacts,
}

impl<'a> Detector<'a> {
    fn malformed(&self, reason: &str) -> DomainError {
        DomainError::MalformedRewrite {
            type_name: self.key.object_type.clone(),
            relation: self.key.relation.clone(),
            reason: reason.to_string(),
        }
    }

    fn visit(&mut self, node: &Userset, pos: Position) -> DomainResult<()> {
        match node {
            Userset::This => {
                if self.definition.type_constraints.is_empty() {
                    return Err(self.malformed("direct grant without a type restriction"));
                }
                for constraint in &self.definition.type_constraints {
                    if let Some(pattern) = constraint.userset_key() {
                        self.facts.features.has_userset = true;
                        self.facts.userset_patterns.insert(pattern);
                    } else if constraint.is_wildcard() {
                        self.facts.features.has_wildcard = true;
                    } else {
                        self.facts.features.has_direct = true;
                    }
                }
            }
            Userset::ComputedUserset { .. } => {
                self.facts.features.has_implied = true;
            }
            Userset::TupleToUserset { .. } => {
                self.facts.features.has_recursive = true;
                if pos.in_subtract {
                    self.facts.ttu_under_subtract = true;
                }
            }
            Userset::Union { children } => {
                if children.is_empty() {
                    return Err(self.malformed("union without operands"));
                }
                for child in children {
                    self.visit(child, pos)?;
                }
            }
            Userset::Intersection { children } => {
                if children.is_empty() {
                    return Err(self.malformed("intersection without operands"));
                }
                self.facts.features.has_intersection = true;
                if pos.in_subtract {
                    self.facts.intersection_under_subtract = true;
                }
                let inner = Position {
                    in_intersection: true,
                    ..pos
                };
                for child in children {
                    self.visit(child, inner)?;
                }
            }
            Userset::Exclusion { base, subtract } => {
                self.facts.features.has_exclusion = true;
                if pos.in_intersection {
                    self.facts.exclusion_in_intersection = true;
                }
                self.visit(base, pos)?;
                self.visit(
                    subtract,
                    Position {
                        in_subtract: true,
                        ..pos
                    },
                )?;
            }
        }
        Ok(())
    }
}

/// Classify one relation's own rewrite tree.
///
/// Fails with [`DomainError::MalformedRewrite`] on nodes that cannot be
/// classified: empty unions or intersections, and direct grants without a
/// type restriction.
pub fn detect_features(object_type: &str, definition: &RelationDefinition) -> DomainResult<RewriteFacts> {
    let mut detector = Detector {
        key: RelationKey::new(object_type, &definition.name),
        definition,
        facts: RewriteFacts::default(),
    };
    detector.visit(&definition.rewrite, Position::default())?;

    let mut facts = detector.facts;
    facts.is_single_ttu = matches!(definition.rewrite, Userset::TupleToUserset { .. });
    facts.is_plain_direct =
        matches!(definition.rewrite, Userset::This) && facts.userset_patterns.is_empty();
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TypeConstraint;

    fn relation(constraints: &[&str], rewrite: Userset) -> RelationDefinition {
        RelationDefinition::new(
            "viewer",
            constraints.iter().copied().map(TypeConstraint::from).collect(),
            rewrite,
        )
    }

    fn exclusion(base: Userset, subtract: Userset) -> Userset {
        Userset::Exclusion {
            base: Box::new(base),
            subtract: Box::new(subtract),
        }
    }

    #[test]
    fn test_plain_direct_grant() {
        let facts = detect_features("document", &relation(&["user"], Userset::This)).unwrap();
        assert!(facts.features.has_direct);
        assert!(!facts.features.is_complex());
        assert!(facts.is_plain_direct);
        assert!(!facts.is_single_ttu);
        assert_eq!(facts.features.to_string(), "Direct");
    }

    #[test]
    fn test_wildcard_stays_plain() {
        let facts =
            detect_features("document", &relation(&["user", "user:*"], Userset::This)).unwrap();
        assert!(facts.features.has_wildcard);
        assert!(facts.is_plain_direct);
    }

    #[test]
    fn test_userset_restriction_collects_pattern() {
        let facts =
            detect_features("document", &relation(&["group#member"], Userset::This)).unwrap();
        assert!(facts.features.has_userset);
        assert!(!facts.features.has_direct);
        assert!(!facts.is_plain_direct);
        assert_eq!(
            facts.userset_patterns.into_iter().collect::<Vec<_>>(),
            vec![RelationKey::new("group", "member")]
        );
    }

    #[test]
    fn test_computed_userset_is_implied() {
        let facts = detect_features("document", &relation(&[], Userset::computed("editor"))).unwrap();
        assert_eq!(facts.features.to_string(), "Implied");
        assert!(!facts.features.is_complex());
    }

    #[test]
    fn test_single_tuple_to_userset() {
        let facts =
            detect_features("document", &relation(&[], Userset::ttu("parent", "viewer"))).unwrap();
        assert!(facts.features.has_recursive);
        assert!(facts.is_single_ttu);
    }

    #[test]
    fn test_union_with_ttu_is_not_single() {
        let rewrite = Userset::Union {
            children: vec![Userset::This, Userset::ttu("parent", "viewer")],
        };
        let facts = detect_features("folder", &relation(&["user"], rewrite)).unwrap();
        assert!(!facts.is_single_ttu);
        assert_eq!(facts.features.to_string(), "Direct+Recursive");
    }

    #[test]
    fn test_intersection_flags() {
        let rewrite = Userset::Intersection {
            children: vec![Userset::computed("writer"), Userset::computed("editor")],
        };
        let facts = detect_features("document", &relation(&[], rewrite)).unwrap();
        assert!(facts.features.has_intersection);
        assert!(!facts.exclusion_in_intersection);
    }

    #[test]
    fn test_nesting_facts() {
        let rewrite = Userset::Intersection {
            children: vec![
                Userset::computed("a"),
                exclusion(
                    Userset::computed("b"),
                    Userset::Union {
                        children: vec![
                            Userset::ttu("parent", "blocked"),
                            Userset::Intersection {
                                children: vec![Userset::computed("c"), Userset::computed("d")],
                            },
                        ],
                    },
                ),
            ],
        };
        let facts = detect_features("document", &relation(&[], rewrite)).unwrap();
        assert!(facts.exclusion_in_intersection);
        assert!(facts.ttu_under_subtract);
        assert!(facts.intersection_under_subtract);
        assert_eq!(
            facts.features.to_string(),
            "Implied+Recursive+Exclusion+Intersection"
        );
    }

    #[test]
    fn test_exclusion_base_is_not_subtract() {
        let rewrite = exclusion(Userset::ttu("parent", "viewer"), Userset::computed("blocked"));
        let facts = detect_features("document", &relation(&[], rewrite)).unwrap();
        assert!(facts.features.has_exclusion);
        assert!(!facts.ttu_under_subtract);
    }

    #[test]
    fn test_empty_union_is_malformed() {
        let err = detect_features("document", &relation(&[], Userset::Union { children: vec![] }))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "malformed rewrite in document#viewer: union without operands"
        );
    }

    #[test]
    fn test_direct_grant_without_restriction_is_malformed() {
        let err = detect_features("document", &relation(&[], Userset::This)).unwrap_err();
        assert!(matches!(err, DomainError::MalformedRewrite { .. }));
    }

    #[test]
    fn test_no_flags_display_none() {
        assert_eq!(RelationFeatures::default().to_string(), "None");
    }
}
