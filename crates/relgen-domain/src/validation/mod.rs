//! Schema validation.
//!
//! Validates that a schema is semantically correct before analysis:
//! - Type and relation names are unique
//! - All referenced types and relations exist
//! - Tuple-to-userset rewrites resolve on at least one related type
//! - Direct grants and type restrictions agree
//! - No cycles made only of same-object computed usersets

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{DomainError, DomainResult};
use crate::model::{AuthorizationModel, RelationDefinition, TypeConstraint, TypeDefinition, Userset};

/// Validation error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Empty model (no type definitions)
    EmptyModel,
    /// Two type definitions share a name
    DuplicateType { type_name: String },
    /// Two relations on one type share a name
    DuplicateRelation {
        type_name: String,
        relation_name: String,
    },
    /// Type restriction references an undefined type or relation
    InvalidTypeConstraint {
        type_name: String,
        relation_name: String,
        invalid_type: String,
    },
    /// A referenced relation does not exist on this type
    UndefinedRelation {
        type_name: String,
        relation_name: String,
        referenced_relation: String,
    },
    /// The tupleset relation admits no concrete object types
    TuplesetWithoutObjectTypes {
        type_name: String,
        relation_name: String,
        tupleset: String,
    },
    /// The computed relation exists on none of the tupleset's object types
    UnresolvableTupleToUserset {
        type_name: String,
        relation_name: String,
        tupleset: String,
        computed_relation: String,
    },
    /// Direct grant without any type restriction
    MissingTypeRestriction {
        type_name: String,
        relation_name: String,
    },
    /// Type restriction on a relation that never grants directly
    UnusedTypeRestriction {
        type_name: String,
        relation_name: String,
    },
    /// Union or intersection without operands
    EmptyOperands {
        type_name: String,
        relation_name: String,
        operator: &'static str,
    },
    /// A relation definition contains a cycle
    CyclicRelation {
        type_name: String,
        relation_name: String,
        cycle_path: Vec<String>,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyModel => {
                write!(f, "model must have at least one type definition")
            }
            ValidationError::DuplicateType { type_name } => {
                write!(f, "duplicate type '{}'", type_name)
            }
            ValidationError::DuplicateRelation {
                type_name,
                relation_name,
            } => write!(
                f,
                "duplicate relation '{}' on type '{}'",
                relation_name, type_name
            ),
            ValidationError::InvalidTypeConstraint {
                type_name,
                relation_name,
                invalid_type,
            } => write!(
                f,
                "invalid type constraint '{}' in {}#{}",
                invalid_type, type_name, relation_name
            ),
            ValidationError::UndefinedRelation {
                type_name,
                relation_name,
                referenced_relation,
            } => write!(
                f,
                "undefined relation '{}' referenced in {}#{}",
                referenced_relation, type_name, relation_name
            ),
            ValidationError::TuplesetWithoutObjectTypes {
                type_name,
                relation_name,
                tupleset,
            } => write!(
                f,
                "tupleset '{}' used in {}#{} admits no object types",
                tupleset, type_name, relation_name
            ),
            ValidationError::UnresolvableTupleToUserset {
                type_name,
                relation_name,
                tupleset,
                computed_relation,
            } => write!(
                f,
                "'{} from {}' in {}#{} is not defined on any type related through '{}'",
                computed_relation, tupleset, type_name, relation_name, tupleset
            ),
            ValidationError::MissingTypeRestriction {
                type_name,
                relation_name,
            } => write!(
                f,
                "{}#{} grants directly but declares no type restriction",
                type_name, relation_name
            ),
            ValidationError::UnusedTypeRestriction {
                type_name,
                relation_name,
            } => write!(
                f,
                "{}#{} declares a type restriction but never grants directly",
                type_name, relation_name
            ),
            ValidationError::EmptyOperands {
                type_name,
                relation_name,
                operator,
            } => write!(
                f,
                "{} without operands in {}#{}",
                operator, type_name, relation_name
            ),
            ValidationError::CyclicRelation {
                type_name,
                relation_name,
                cycle_path,
            } => write!(
                f,
                "cyclic relation definition in {}#{}: {}",
                type_name,
                relation_name,
                cycle_path.join(" -> ")
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, Vec<ValidationError>>;

/// Model validator
pub struct ModelValidator<'m> {
    /// Type definitions by name (first definition wins on duplicates)
    types: BTreeMap<&'m str, &'m TypeDefinition>,
}

impl<'m> ModelValidator<'m> {
    /// Create a new validator for the given model
    pub fn new(model: &'m AuthorizationModel) -> Self {
        let mut types = BTreeMap::new();
        for type_def in &model.type_definitions {
            types.entry(type_def.type_name.as_str()).or_insert(type_def);
        }
        Self { types }
    }

    /// Validate the model and return every error found
    pub fn validate(&self, model: &AuthorizationModel) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if model.type_definitions.is_empty() {
            errors.push(ValidationError::EmptyModel);
            return Err(errors);
        }

        let mut seen_types = BTreeSet::new();
        for type_def in &model.type_definitions {
            if !seen_types.insert(type_def.type_name.as_str()) {
                errors.push(ValidationError::DuplicateType {
                    type_name: type_def.type_name.clone(),
                });
            }
            self.validate_type_definition(type_def, &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate a single type definition
    fn validate_type_definition(
        &self,
        type_def: &TypeDefinition,
        errors: &mut Vec<ValidationError>,
    ) {
        let mut seen_relations = BTreeSet::new();
        for relation_def in &type_def.relations {
            if !seen_relations.insert(relation_def.name.as_str()) {
                errors.push(ValidationError::DuplicateRelation {
                    type_name: type_def.type_name.clone(),
                    relation_name: relation_def.name.clone(),
                });
            }

            self.validate_type_constraints(
                &type_def.type_name,
                &relation_def.name,
                &relation_def.type_constraints,
                errors,
            );
            self.validate_direct_grant(&type_def.type_name, relation_def, errors);
            self.validate_userset(
                type_def,
                &relation_def.name,
                &relation_def.rewrite,
                errors,
            );
        }

        if let Some((relation_name, cycle_path)) = detect_cycle_in_type(type_def) {
            errors.push(ValidationError::CyclicRelation {
                type_name: type_def.type_name.clone(),
                relation_name,
                cycle_path,
            });
        }
    }

    /// Validate type constraints (e.g., [user], [user:*], [group#member])
    fn validate_type_constraints(
        &self,
        type_name: &str,
        relation_name: &str,
        constraints: &[TypeConstraint],
        errors: &mut Vec<ValidationError>,
    ) {
        for constraint in constraints {
            let ref_type = constraint.subject_type();
            let resolves = match constraint.subject_relation() {
                Some(relation) => self.relation_exists(ref_type, relation),
                None => self.type_exists(ref_type),
            };
            if !resolves {
                errors.push(ValidationError::InvalidTypeConstraint {
                    type_name: type_name.to_string(),
                    relation_name: relation_name.to_string(),
                    invalid_type: constraint.type_name.clone(),
                });
            }
        }
    }

    /// `This` and the type restriction must appear together
    fn validate_direct_grant(
        &self,
        type_name: &str,
        relation_def: &RelationDefinition,
        errors: &mut Vec<ValidationError>,
    ) {
        let uses_this = relation_def.rewrite.uses_this();
        let restricted = !relation_def.type_constraints.is_empty();
        if uses_this && !restricted {
            errors.push(ValidationError::MissingTypeRestriction {
                type_name: type_name.to_string(),
                relation_name: relation_def.name.clone(),
            });
        } else if restricted && !uses_this {
            errors.push(ValidationError::UnusedTypeRestriction {
                type_name: type_name.to_string(),
                relation_name: relation_def.name.clone(),
            });
        }
    }

    /// Validate a userset expression
    fn validate_userset(
        &self,
        type_def: &TypeDefinition,
        relation_name: &str,
        userset: &Userset,
        errors: &mut Vec<ValidationError>,
    ) {
        let type_name = type_def.type_name.as_str();
        match userset {
            Userset::This => {}
            Userset::ComputedUserset { relation } => {
                if type_def.find_relation(relation).is_none() {
                    errors.push(ValidationError::UndefinedRelation {
                        type_name: type_name.to_string(),
                        relation_name: relation_name.to_string(),
                        referenced_relation: relation.clone(),
                    });
                }
            }
            Userset::TupleToUserset {
                tupleset,
                computed_userset,
            } => {
                let Some(tupleset_def) = type_def.find_relation(tupleset) else {
                    errors.push(ValidationError::UndefinedRelation {
                        type_name: type_name.to_string(),
                        relation_name: relation_name.to_string(),
                        referenced_relation: tupleset.clone(),
                    });
                    return;
                };

                let object_types: Vec<&str> = tupleset_def
                    .type_constraints
                    .iter()
                    .filter(|c| c.is_plain())
                    .map(TypeConstraint::subject_type)
                    .collect();
                if object_types.is_empty() {
                    errors.push(ValidationError::TuplesetWithoutObjectTypes {
                        type_name: type_name.to_string(),
                        relation_name: relation_name.to_string(),
                        tupleset: tupleset.clone(),
                    });
                } else if !object_types
                    .iter()
                    .any(|t| self.relation_exists(t, computed_userset))
                {
                    errors.push(ValidationError::UnresolvableTupleToUserset {
                        type_name: type_name.to_string(),
                        relation_name: relation_name.to_string(),
                        tupleset: tupleset.clone(),
                        computed_relation: computed_userset.clone(),
                    });
                }
            }
            Userset::Union { children } | Userset::Intersection { children } => {
                if children.is_empty() {
                    errors.push(ValidationError::EmptyOperands {
                        type_name: type_name.to_string(),
                        relation_name: relation_name.to_string(),
                        operator: if matches!(userset, Userset::Union { .. }) {
                            "union"
                        } else {
                            "intersection"
                        },
                    });
                }
                for child in children {
                    self.validate_userset(type_def, relation_name, child, errors);
                }
            }
            Userset::Exclusion { base, subtract } => {
                self.validate_userset(type_def, relation_name, base, errors);
                self.validate_userset(type_def, relation_name, subtract, errors);
            }
        }
    }

    /// Check if a type exists in the model
    pub fn type_exists(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Check if a relation exists on a type
    pub fn relation_exists(&self, type_name: &str, relation_name: &str) -> bool {
        self.types
            .get(type_name)
            .is_some_and(|t| t.find_relation(relation_name).is_some())
    }
}

/// Collect same-object relations referenced through computed usersets
fn collect_referenced_relations<'a>(userset: &'a Userset, refs: &mut Vec<&'a str>) {
    match userset {
        Userset::This => {}
        Userset::ComputedUserset { relation } => {
            if !refs.contains(&relation.as_str()) {
                refs.push(relation);
            }
        }
        // Tuple to userset moves to another object; no local cycle
        Userset::TupleToUserset { .. } => {}
        Userset::Union { children } | Userset::Intersection { children } => {
            for child in children {
                collect_referenced_relations(child, refs);
            }
        }
        Userset::Exclusion { base, subtract } => {
            collect_referenced_relations(base, refs);
            collect_referenced_relations(subtract, refs);
        }
    }
}

/// Detect cycles in computed-userset references using DFS in declaration order
fn detect_cycle_in_type(type_def: &TypeDefinition) -> Option<(String, Vec<String>)> {
    let graph: BTreeMap<&str, Vec<&str>> = type_def
        .relations
        .iter()
        .map(|r| {
            let mut refs = Vec::new();
            collect_referenced_relations(&r.rewrite, &mut refs);
            (r.name.as_str(), refs)
        })
        .collect();

    let mut visited = BTreeSet::new();
    let mut path = Vec::new();
    for relation in &type_def.relations {
        let start = relation.name.as_str();
        if dfs_cycle_detect(start, &graph, &mut visited, &mut path) {
            let cycle_start = path.last().map(|s| s.to_string()).unwrap_or_default();
            return Some((cycle_start, path.iter().map(|s| s.to_string()).collect()));
        }
    }
    None
}

/// DFS-based cycle detection; on success `path` holds the cycle, first node repeated last
fn dfs_cycle_detect<'a>(
    node: &'a str,
    graph: &BTreeMap<&'a str, Vec<&'a str>>,
    visited: &mut BTreeSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> bool {
    if let Some(pos) = path.iter().position(|n| *n == node) {
        path.drain(..pos);
        path.push(node);
        return true;
    }
    if visited.contains(node) {
        return false;
    }

    visited.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(node) {
        for neighbor in neighbors {
            // Only follow edges to relations that exist in this type
            if graph.contains_key(neighbor) && dfs_cycle_detect(*neighbor, graph, visited, path) {
                return true;
            }
        }
    }

    path.pop();
    false
}

/// Validate a schema
pub fn validate(model: &AuthorizationModel) -> ValidationResult<()> {
    ModelValidator::new(model).validate(model)
}

/// Validate a schema, folding every violation into one fatal [`DomainError`].
pub fn validate_model(model: &AuthorizationModel) -> DomainResult<()> {
    validate(model).map_err(|errors| DomainError::ModelValidationError { errors })
}
