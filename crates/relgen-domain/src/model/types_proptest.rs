//! Property-based tests for model types and the DSL parser.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::model::{parse, RelationKey, TypeConstraint};

    /// Lowercase names that can never collide with a reserved keyword.
    fn name_strategy() -> impl Strategy<Value = String> {
        "[a-z]{1,8}".prop_map(|s| format!("x{s}"))
    }

    proptest! {
        #[test]
        fn test_relation_key_display_parse_agree(
            object_type in name_strategy(),
            relation in name_strategy()
        ) {
            let key = RelationKey::new(&object_type, &relation);
            let parsed = RelationKey::parse(&key.to_string());
            prop_assert_eq!(parsed, Ok(key));
        }

        #[test]
        fn test_userset_constraint_splits_type_and_relation(
            subject_type in name_strategy(),
            relation in name_strategy()
        ) {
            let c = TypeConstraint::new(format!("{subject_type}#{relation}"));
            prop_assert_eq!(c.subject_type(), subject_type.as_str());
            prop_assert_eq!(c.subject_relation(), Some(relation.as_str()));
            prop_assert!(!c.is_wildcard());
        }

        #[test]
        fn test_parser_never_panics(input in "(type|define|relations|or|and|but not|from|[a-z]{1,4}|[\\[\\]():#*, ]|\n){0,60}") {
            let _ = parse(&input);
        }

        #[test]
        fn test_parser_reads_generated_direct_relations(
            type_name in name_strategy(),
            relations in prop::collection::btree_set(name_strategy(), 1..6)
        ) {
            let mut dsl = format!("type user\n\ntype {type_name}\n  relations\n");
            for relation in &relations {
                dsl.push_str(&format!("    define {relation}: [user]\n"));
            }
            let model = parse(&dsl).unwrap();
            let defined = &model.type_definitions[1];
            prop_assert_eq!(&defined.type_name, &type_name);
            let names: Vec<_> = defined.relations.iter().map(|r| r.name.clone()).collect();
            let expected: Vec<_> = relations.into_iter().collect();
            prop_assert_eq!(names, expected);
        }
    }
}
