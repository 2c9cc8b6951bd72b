//! Core type definitions for the schema model.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Default schema version assumed when a model does not declare one.
pub const DEFAULT_SCHEMA_VERSION: &str = "1.1";

/// Identifies a relation on an object type (e.g., `document#viewer`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationKey {
    /// The object type (e.g., "document").
    pub object_type: String,
    /// The relation name on that type (e.g., "viewer").
    pub relation: String,
}

impl RelationKey {
    /// Creates a new RelationKey from type and relation.
    pub fn new(object_type: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            relation: relation.into(),
        }
    }

    /// Parses a key from "type#relation" format.
    pub fn parse(value: &str) -> Result<Self, &'static str> {
        let (object_type, relation) = value
            .split_once('#')
            .ok_or("relation key must be in 'type#relation' format")?;
        if object_type.is_empty() || relation.is_empty() {
            return Err("relation key type and relation cannot be empty");
        }
        Ok(Self::new(object_type, relation))
    }
}

impl fmt::Display for RelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.object_type, self.relation)
    }
}

/// One entry of a direct type restriction.
///
/// The stored form is the DSL spelling: `user`, `user:*` or `group#member`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeConstraint {
    /// The restriction as written (e.g., "user", "user:*", "group#member").
    pub type_name: String,
}

impl TypeConstraint {
    /// Creates a constraint from its DSL spelling.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
        }
    }

    /// The subject type this constraint admits.
    pub fn subject_type(&self) -> &str {
        let end = self
            .type_name
            .find(['#', ':'])
            .unwrap_or(self.type_name.len());
        &self.type_name[..end]
    }

    /// The subject relation for a userset restriction (`group#member` -> `member`).
    pub fn subject_relation(&self) -> Option<&str> {
        self.type_name.split_once('#').map(|(_, relation)| relation)
    }

    /// True for public-access restrictions such as `user:*`.
    pub fn is_wildcard(&self) -> bool {
        self.type_name.ends_with(":*")
    }

    /// True when the restriction admits concrete objects of a type (no wildcard, no userset).
    pub fn is_plain(&self) -> bool {
        !self.is_wildcard() && self.subject_relation().is_none()
    }

    /// The userset this restriction references, if any.
    pub fn userset_key(&self) -> Option<RelationKey> {
        self.subject_relation()
            .map(|relation| RelationKey::new(self.subject_type(), relation))
    }
}

impl From<&str> for TypeConstraint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for TypeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name)
    }
}

/// An authorization schema: types and their relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationModel {
    /// Schema version (e.g., "1.1").
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Type definitions in declaration order.
    pub type_definitions: Vec<TypeDefinition>,
}

fn default_schema_version() -> String {
    DEFAULT_SCHEMA_VERSION.to_string()
}

impl AuthorizationModel {
    /// Creates a model with the default schema version.
    pub fn new(type_definitions: Vec<TypeDefinition>) -> Self {
        Self {
            schema_version: default_schema_version(),
            type_definitions,
        }
    }

    /// Looks up a type definition by name.
    pub fn find_type(&self, type_name: &str) -> Option<&TypeDefinition> {
        self.type_definitions
            .iter()
            .find(|t| t.type_name == type_name)
    }

    /// Looks up a relation definition by type and relation name.
    pub fn find_relation(&self, type_name: &str, relation: &str) -> Option<&RelationDefinition> {
        self.find_type(type_name)
            .and_then(|t| t.find_relation(relation))
    }

    /// Like [`find_relation`](Self::find_relation), but reports which part is missing.
    pub fn require_relation(&self, type_name: &str, relation: &str) -> DomainResult<&RelationDefinition> {
        let type_def = self
            .find_type(type_name)
            .ok_or_else(|| DomainError::TypeNotFound {
                type_name: type_name.to_string(),
            })?;
        type_def
            .find_relation(relation)
            .ok_or_else(|| DomainError::RelationNotFound {
                type_name: type_name.to_string(),
                relation: relation.to_string(),
            })
    }

    /// Iterates every (type, relation) pair in declaration order.
    pub fn relations(&self) -> impl Iterator<Item = (&TypeDefinition, &RelationDefinition)> {
        self.type_definitions
            .iter()
            .flat_map(|t| t.relations.iter().map(move |r| (t, r)))
    }
}

/// A type definition within the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinition {
    /// The type name (e.g., "document", "folder").
    pub type_name: String,
    /// Relations defined on this type, in declaration order.
    #[serde(default)]
    pub relations: Vec<RelationDefinition>,
}

impl TypeDefinition {
    /// Creates a type definition.
    pub fn new(type_name: impl Into<String>, relations: Vec<RelationDefinition>) -> Self {
        Self {
            type_name: type_name.into(),
            relations,
        }
    }

    /// Looks up a relation on this type.
    pub fn find_relation(&self, relation: &str) -> Option<&RelationDefinition> {
        self.relations.iter().find(|r| r.name == relation)
    }
}

/// A relation definition on a type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDefinition {
    /// The relation name.
    pub name: String,
    /// Direct type restrictions; the subject set of the `This` node.
    #[serde(default)]
    pub type_constraints: Vec<TypeConstraint>,
    /// The userset rewrite for this relation.
    pub rewrite: Userset,
}

impl RelationDefinition {
    /// Creates a relation definition.
    pub fn new(name: impl Into<String>, type_constraints: Vec<TypeConstraint>, rewrite: Userset) -> Self {
        Self {
            name: name.into(),
            type_constraints,
            rewrite,
        }
    }

    /// A relation whose only rewrite is a direct grant of the given types.
    pub fn direct(name: impl Into<String>, constraints: &[&str]) -> Self {
        Self::new(
            name,
            constraints.iter().copied().map(TypeConstraint::from).collect(),
            Userset::This,
        )
    }
}

/// A userset defines how a relation is computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Userset {
    /// Direct assignment (this).
    This,
    /// Computed userset from another relation on the same object.
    ComputedUserset { relation: String },
    /// Tuple to userset (relation from parent).
    TupleToUserset {
        tupleset: String,
        computed_userset: String,
    },
    /// Union of multiple usersets.
    Union { children: Vec<Userset> },
    /// Intersection of multiple usersets.
    Intersection { children: Vec<Userset> },
    /// Exclusion (base but not subtract).
    Exclusion {
        base: Box<Userset>,
        subtract: Box<Userset>,
    },
}

impl Userset {
    /// Shorthand for a computed userset node.
    pub fn computed(relation: impl Into<String>) -> Self {
        Self::ComputedUserset {
            relation: relation.into(),
        }
    }

    /// Shorthand for a `computed from tupleset` node.
    pub fn ttu(tupleset: impl Into<String>, computed_userset: impl Into<String>) -> Self {
        Self::TupleToUserset {
            tupleset: tupleset.into(),
            computed_userset: computed_userset.into(),
        }
    }

    /// True if a `This` node appears anywhere in the tree.
    pub fn uses_this(&self) -> bool {
        match self {
            Userset::This => true,
            Userset::ComputedUserset { .. } | Userset::TupleToUserset { .. } => false,
            Userset::Union { children } | Userset::Intersection { children } => {
                children.iter().any(Userset::uses_this)
            }
            Userset::Exclusion { base, subtract } => base.uses_this() || subtract.uses_this(),
        }
    }
}
