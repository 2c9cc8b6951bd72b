//! Generated function names.
//!
//! Names are stable identifiers: migrations compare them across schema
//! versions to find functions that are no longer generated.

use relgen_domain::model::RelationKey;

use crate::renderer::Operation;

pub const CHECK_DISPATCHER: &str = "check_permission";
pub const LIST_OBJECTS_DISPATCHER: &str = "list_accessible_objects";
pub const LIST_SUBJECTS_DISPATCHER: &str = "list_accessible_subjects";

pub const CHECK_GENERIC: &str = "check_permission_generic_internal";
pub const LIST_OBJECTS_GENERIC: &str = "list_accessible_objects_generic";
pub const LIST_SUBJECTS_GENERIC: &str = "list_accessible_subjects_generic";

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

pub fn check_function_name(key: &RelationKey) -> String {
    format!(
        "check_{}_{}",
        sanitize_identifier(&key.object_type),
        sanitize_identifier(&key.relation)
    )
}

pub fn list_objects_function_name(key: &RelationKey) -> String {
    format!(
        "list_{}_{}_objects",
        sanitize_identifier(&key.object_type),
        sanitize_identifier(&key.relation)
    )
}

pub fn list_subjects_function_name(key: &RelationKey) -> String {
    format!(
        "list_{}_{}_subjects",
        sanitize_identifier(&key.object_type),
        sanitize_identifier(&key.relation)
    )
}

/// Specialized function name for `key` and `operation`.
pub fn function_name(operation: Operation, key: &RelationKey) -> String {
    match operation {
        Operation::Check => check_function_name(key),
        Operation::ListObjects => list_objects_function_name(key),
        Operation::ListSubjects => list_subjects_function_name(key),
    }
}

pub fn dispatcher_name(operation: Operation) -> &'static str {
    match operation {
        Operation::Check => CHECK_DISPATCHER,
        Operation::ListObjects => LIST_OBJECTS_DISPATCHER,
        Operation::ListSubjects => LIST_SUBJECTS_DISPATCHER,
    }
}

/// Runtime evaluator used when a relation cannot be specialized.
pub fn generic_function_name(operation: Operation) -> &'static str {
    match operation {
        Operation::Check => CHECK_GENERIC,
        Operation::ListObjects => LIST_OBJECTS_GENERIC,
        Operation::ListSubjects => LIST_SUBJECTS_GENERIC,
    }
}
