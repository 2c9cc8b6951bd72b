//! Generation capabilities: whether check and list can be specialized.
//!
//! A denied capability is not an error. The dispatcher routes the relation
//! to the generic evaluator and the reason is surfaced for operators.

use serde::{Deserialize, Serialize};

use super::features::RewriteFacts;
use crate::error::{DomainError, DomainResult};
use crate::model::RelationKey;

pub const REASON_SELF_REF_COMPOUND: &str =
    "self-referential userset combined with intersection or exclusion";
pub const REASON_INTERSECTION_UNDER_SUBTRACT: &str =
    "intersection nested under the subtracted side of an exclusion";
pub const REASON_EXCLUSION_IN_INTERSECTION: &str = "exclusion nested inside an intersection";
pub const REASON_TTU_UNDER_SUBTRACT: &str =
    "tuple-to-userset nested under the subtracted side of an exclusion";

/// Whether specialized check/list functions can be generated for a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationCapabilities {
    pub check_allowed: bool,
    pub list_allowed: bool,
    /// Why `check_allowed` is false; empty when allowed.
    pub check_reason: String,
    /// Why `list_allowed` is false; empty when allowed.
    pub list_reason: String,
}

impl GenerationCapabilities {
    pub fn allowed() -> Self {
        Self::from_reasons(None, None)
    }

    /// Deny both operations.
    pub fn denied(check_reason: impl Into<String>, list_reason: impl Into<String>) -> Self {
        Self::from_reasons(Some(check_reason.into()), Some(list_reason.into()))
    }

    /// `None` allows the operation; `Some(reason)` denies it.
    pub fn from_reasons(check_reason: Option<String>, list_reason: Option<String>) -> Self {
        Self {
            check_allowed: check_reason.is_none(),
            list_allowed: list_reason.is_none(),
            check_reason: check_reason.unwrap_or_default(),
            list_reason: list_reason.unwrap_or_default(),
        }
    }

    /// Every denied operation must carry a non-empty reason.
    pub fn ensure_reasons(&self, key: &RelationKey) -> DomainResult<()> {
        let silent = (!self.check_allowed && self.check_reason.trim().is_empty())
            || (!self.list_allowed && self.list_reason.trim().is_empty());
        if silent {
            return Err(DomainError::InvariantViolation {
                key: key.to_string(),
                message: "capability denied without a reason".to_string(),
            });
        }
        Ok(())
    }
}

/// Rules that only look at the relation itself. Returns (check, list) denials.
pub fn local_denials(
    facts: &RewriteFacts,
    has_self_referential_userset: bool,
) -> (Option<&'static str>, Option<&'static str>) {
    let features = &facts.features;
    if has_self_referential_userset && (features.has_intersection || features.has_exclusion) {
        return (Some(REASON_SELF_REF_COMPOUND), Some(REASON_SELF_REF_COMPOUND));
    }

    let list = if facts.intersection_under_subtract {
        Some(REASON_INTERSECTION_UNDER_SUBTRACT)
    } else if facts.exclusion_in_intersection {
        Some(REASON_EXCLUSION_IN_INTERSECTION)
    } else if facts.ttu_under_subtract {
        Some(REASON_TTU_UNDER_SUBTRACT)
    } else {
        None
    };
    (None, list)
}

/// Combine a relation's local denials with those of the relations it depends on.
///
/// `dependencies` are the relations reachable over tuple-to-userset and implied
/// edges, in key order. `dependency_list_denied` reports whether a dependency's
/// list generation is denied, locally or through its own dependencies. The
/// first denied dependency names the reason.
pub fn determine_capabilities<'a>(
    key: &RelationKey,
    local: (Option<&'static str>, Option<&'static str>),
    dependencies: impl IntoIterator<Item = &'a RelationKey>,
    dependency_list_denied: impl Fn(&RelationKey) -> bool,
) -> GenerationCapabilities {
    let (check, list) = local;
    let list = list.map(str::to_string).or_else(|| {
        dependencies
            .into_iter()
            .filter(|dependency| *dependency != key)
            .find(|dependency| dependency_list_denied(dependency))
            .map(|dependency| {
                format!("depends on {dependency}, whose list generation is not supported")
            })
    });
    GenerationCapabilities::from_reasons(check.map(str::to_string), list)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts() -> RewriteFacts {
        RewriteFacts::default()
    }

    #[test]
    fn test_allowed_has_no_reasons() {
        let caps = GenerationCapabilities::allowed();
        assert!(caps.check_allowed && caps.list_allowed);
        assert!(caps.check_reason.is_empty() && caps.list_reason.is_empty());
        assert!(caps.ensure_reasons(&RelationKey::new("doc", "viewer")).is_ok());
    }

    #[test]
    fn test_silent_denial_breaks_invariant() {
        let caps = GenerationCapabilities {
            check_allowed: true,
            list_allowed: false,
            check_reason: String::new(),
            list_reason: "  ".to_string(),
        };
        let err = caps.ensure_reasons(&RelationKey::new("doc", "viewer")).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation { .. }));
    }

    #[test]
    fn test_self_reference_with_exclusion_denies_both() {
        let mut f = facts();
        f.features.has_exclusion = true;
        assert_eq!(
            local_denials(&f, true),
            (Some(REASON_SELF_REF_COMPOUND), Some(REASON_SELF_REF_COMPOUND))
        );
        assert_eq!(local_denials(&f, false), (None, None));
    }

    #[test]
    fn test_first_list_rule_wins() {
        let mut f = facts();
        f.exclusion_in_intersection = true;
        f.ttu_under_subtract = true;
        assert_eq!(
            local_denials(&f, false),
            (None, Some(REASON_EXCLUSION_IN_INTERSECTION))
        );
    }

    #[test]
    fn test_denied_parent_propagates_with_name() {
        let key = RelationKey::new("document", "viewer");
        let parents = [
            RelationKey::new("folder", "viewer"),
            RelationKey::new("org", "admin"),
        ];
        let caps = determine_capabilities(&key, (None, None), &parents, |p| p.object_type == "org");
        assert!(caps.check_allowed);
        assert!(!caps.list_allowed);
        assert_eq!(
            caps.list_reason,
            "depends on org#admin, whose list generation is not supported"
        );
    }

    #[test]
    fn test_inherited_denial_counts_like_local() {
        let key = RelationKey::new("document", "can_view");
        let dependencies = [
            RelationKey::new("document", "a"),
            RelationKey::new("document", "viewer"),
        ];
        let denied = |d: &RelationKey| d.relation == "viewer";
        let caps = determine_capabilities(&key, (None, None), &dependencies, denied);
        assert_eq!(
            caps.list_reason,
            "depends on document#viewer, whose list generation is not supported"
        );
    }

    #[test]
    fn test_own_key_in_parents_is_ignored() {
        let key = RelationKey::new("folder", "viewer");
        let parents = [key.clone()];
        let caps = determine_capabilities(&key, (None, None), &parents, |_| true);
        assert_eq!(caps, GenerationCapabilities::allowed());
    }
}
