//! Fuzz target for schema analysis
//!
//! Builds arbitrary models over a small vocabulary of type and relation
//! names so references resolve often enough to reach the analyzer. Any
//! model that passes validation must analyze without panicking, and every
//! denied capability must carry a reason.

#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use relgen_domain::analysis::analyze;
use relgen_domain::model::{
    AuthorizationModel, RelationDefinition, TypeConstraint, TypeDefinition, Userset,
};
use relgen_domain::validation::validate;

const TYPES: &[&str] = &["user", "group", "folder", "doc"];
const RELATIONS: &[&str] = &["member", "owner", "viewer", "parent", "editor"];

/// Maximum nesting of rewrite operators
const MAX_REWRITE_DEPTH: u32 = 4;

fn pick<'a>(u: &mut Unstructured, options: &[&'a str]) -> arbitrary::Result<&'a str> {
    u.choose(options).copied()
}

fn arbitrary_rewrite(u: &mut Unstructured, depth: u32) -> arbitrary::Result<Userset> {
    let leaf_only = depth >= MAX_REWRITE_DEPTH;
    let choice = if leaf_only {
        u.int_in_range(0..=2)?
    } else {
        u.int_in_range(0..=5)?
    };
    Ok(match choice {
        0 => Userset::This,
        1 => Userset::computed(pick(u, RELATIONS)?),
        2 => Userset::ttu(pick(u, RELATIONS)?, pick(u, RELATIONS)?),
        3 | 4 => {
            let len = u.int_in_range(2..=3)?;
            let children = (0..len)
                .map(|_| arbitrary_rewrite(u, depth + 1))
                .collect::<arbitrary::Result<Vec<_>>>()?;
            if choice == 3 {
                Userset::Union { children }
            } else {
                Userset::Intersection { children }
            }
        }
        _ => Userset::Exclusion {
            base: Box::new(arbitrary_rewrite(u, depth + 1)?),
            subtract: Box::new(arbitrary_rewrite(u, depth + 1)?),
        },
    })
}

fn arbitrary_constraint(u: &mut Unstructured) -> arbitrary::Result<TypeConstraint> {
    let subject = pick(u, TYPES)?;
    Ok(match u.int_in_range(0..=2)? {
        0 => TypeConstraint::new(subject),
        1 => TypeConstraint::new(format!("{subject}:*")),
        _ => TypeConstraint::new(format!("{subject}#{}", pick(u, RELATIONS)?)),
    })
}

/// Fuzz input: an arbitrary model over the fixed vocabulary
#[derive(Debug)]
struct FuzzModel(AuthorizationModel);

impl<'a> Arbitrary<'a> for FuzzModel {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let mut type_definitions = vec![TypeDefinition::new("user", Vec::new())];
        for &type_name in &TYPES[1..] {
            let mut relations = Vec::new();
            for &relation in RELATIONS {
                if !u.arbitrary::<bool>()? {
                    continue;
                }
                let constraints = (0..u.int_in_range(0..=2)?)
                    .map(|_| arbitrary_constraint(u))
                    .collect::<arbitrary::Result<Vec<_>>>()?;
                let rewrite = arbitrary_rewrite(u, 0)?;
                relations.push(RelationDefinition::new(relation, constraints, rewrite));
            }
            type_definitions.push(TypeDefinition::new(type_name, relations));
        }
        Ok(FuzzModel(AuthorizationModel::new(type_definitions)))
    }
}

fuzz_target!(|input: FuzzModel| {
    let model = input.0;
    if validate(&model).is_err() {
        return;
    }

    let Ok(analysis) = analyze(&model) else {
        return;
    };
    for relation in analysis.iter() {
        let caps = &relation.capabilities;
        assert!(caps.check_allowed || !caps.check_reason.is_empty());
        assert!(caps.list_allowed || !caps.list_reason.is_empty());
    }
});
