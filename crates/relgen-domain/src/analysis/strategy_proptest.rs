//! Property-based tests for strategy selection and analysis determinism.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::analysis::{
        analyze, determine_check_strategy, determine_list_strategy, Strategy as Selected,
        StrategyFacts,
    };
    use crate::model::parse;

    fn facts_strategy() -> impl Strategy<Value = StrategyFacts> {
        prop::array::uniform8(any::<bool>()).prop_map(|b| StrategyFacts {
            exceeds_depth_limit: b[0],
            has_self_referential_userset: b[1],
            has_indirect_anchor: b[2],
            has_intersection: b[3],
            has_recursive: b[4],
            has_closure_parents: b[5],
            has_userset: b[6],
            has_closure_usersets: b[7],
        })
    }

    /// Small schemas mixing every rewrite shape; all reference the same base relations.
    fn schema_strategy() -> impl Strategy<Value = String> {
        let rewrite = prop::sample::select(vec![
            "[user]",
            "[user, user:*]",
            "[group#member]",
            "editor",
            "viewer from parent",
            "editor and owner",
            "editor but not owner",
            "(editor or owner) and viewer from parent",
            "[user] or viewer from parent",
        ]);
        prop::collection::vec(rewrite, 1..4).prop_map(|rewrites| {
            let mut dsl = String::from(
                "type user\ntype group\n  relations\n    define member: [user, group#member]\n\
                 type folder\n  relations\n    define parent: [folder]\n    define owner: [user]\n    define editor: [user]\n",
            );
            for (i, rewrite) in rewrites.iter().enumerate() {
                dsl.push_str(&format!("    define r{i}: {rewrite}\n"));
            }
            dsl.push_str("    define viewer: [user] or viewer from parent\n");
            dsl
        })
    }

    proptest! {
        #[test]
        fn test_selection_is_total(facts in facts_strategy()) {
            let strategy = determine_list_strategy(&facts);
            prop_assert!(Selected::ALL.contains(&strategy));
            prop_assert_eq!(strategy, determine_check_strategy(&facts));
        }

        #[test]
        fn test_depth_exceeded_always_wins(facts in facts_strategy()) {
            let facts = StrategyFacts { exceeds_depth_limit: true, ..facts };
            prop_assert_eq!(determine_list_strategy(&facts), Selected::DepthExceeded);
        }

        #[test]
        fn test_self_reference_wins_below_depth(facts in facts_strategy()) {
            let facts = StrategyFacts {
                exceeds_depth_limit: false,
                has_self_referential_userset: true,
                ..facts
            };
            prop_assert_eq!(determine_list_strategy(&facts), Selected::SelfRefUserset);
        }

        #[test]
        fn test_anchor_wins_below_self_reference(facts in facts_strategy()) {
            let facts = StrategyFacts {
                exceeds_depth_limit: false,
                has_self_referential_userset: false,
                has_indirect_anchor: true,
                ..facts
            };
            prop_assert_eq!(determine_list_strategy(&facts), Selected::Composed);
        }

        #[test]
        fn test_intersection_wins_below_anchor(facts in facts_strategy()) {
            let facts = StrategyFacts {
                exceeds_depth_limit: false,
                has_self_referential_userset: false,
                has_indirect_anchor: false,
                has_intersection: true,
                ..facts
            };
            prop_assert_eq!(determine_list_strategy(&facts), Selected::Intersection);
        }

        #[test]
        fn test_recursive_wins_below_intersection(facts in facts_strategy()) {
            let facts = StrategyFacts {
                exceeds_depth_limit: false,
                has_self_referential_userset: false,
                has_indirect_anchor: false,
                has_intersection: false,
                ..facts
            };
            let expected = if facts.has_recursive || facts.has_closure_parents {
                Selected::Recursive
            } else if facts.has_userset || facts.has_closure_usersets {
                Selected::Userset
            } else {
                Selected::Direct
            };
            prop_assert_eq!(determine_list_strategy(&facts), expected);
        }

        #[test]
        fn test_analysis_is_byte_for_byte_deterministic(dsl in schema_strategy()) {
            let model = parse(&dsl).unwrap();
            let first = serde_json::to_string(&analyze(&model).unwrap()).unwrap();
            let second = serde_json::to_string(&analyze(&model.clone()).unwrap()).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn test_denied_capability_always_has_reason(dsl in schema_strategy()) {
            let analysis = analyze(&parse(&dsl).unwrap()).unwrap();
            for relation in analysis.iter() {
                let caps = &relation.capabilities;
                prop_assert!(caps.check_allowed || !caps.check_reason.is_empty());
                prop_assert!(caps.list_allowed || !caps.list_reason.is_empty());
            }
        }

        #[test]
        fn test_allowed_list_never_depends_on_denied_parent(dsl in schema_strategy()) {
            let analysis = analyze(&parse(&dsl).unwrap()).unwrap();
            for relation in analysis.iter().filter(|r| r.capabilities.list_allowed) {
                for parent in relation.closure_parent_relations.iter().filter(|p| **p != relation.key) {
                    let parent = analysis.require(&parent.object_type, &parent.relation).unwrap();
                    prop_assert!(parent.capabilities.list_allowed);
                }
            }
        }
    }
}
