//! Strategy selection.
//!
//! One guard-clause cascade decides the generation strategy for both check
//! and list. Higher rows preempt lower ones even when both hold:
//!
//! | Priority | Condition | Strategy |
//! |---|---|---|
//! | 1 | depth ceiling reached | `DepthExceeded` |
//! | 2 | self-referential userset | `SelfRefUserset` |
//! | 3 | indirect anchor | `Composed` |
//! | 4 | intersection | `Intersection` |
//! | 5 | tuple-to-userset, own or inherited | `Recursive` |
//! | 6 | userset, own or inherited | `Userset` |
//! | 7 | otherwise | `Direct` |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Query-generation strategy; the only values a renderer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Direct and implied tuple lookups, with optional exclusions.
    Direct,
    /// `[group#member]` expansion via joins.
    Userset,
    /// Tuple-to-userset traversal.
    Recursive,
    /// AND-combination of sub-patterns.
    Intersection,
    /// Unconditionally raises the depth-limit error.
    DepthExceeded,
    /// Userset that expands into itself.
    SelfRefUserset,
    /// Thin call into an indirect anchor's function.
    Composed,
}

impl Strategy {
    pub const ALL: [Strategy; 7] = [
        Strategy::Direct,
        Strategy::Userset,
        Strategy::Recursive,
        Strategy::Intersection,
        Strategy::DepthExceeded,
        Strategy::SelfRefUserset,
        Strategy::Composed,
    ];

    /// Stable name used in logs and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Direct => "Direct",
            Strategy::Userset => "Userset",
            Strategy::Recursive => "Recursive",
            Strategy::Intersection => "Intersection",
            Strategy::DepthExceeded => "DepthExceeded",
            Strategy::SelfRefUserset => "SelfRefUserset",
            Strategy::Composed => "Composed",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The facts the cascade reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyFacts {
    pub exceeds_depth_limit: bool,
    pub has_self_referential_userset: bool,
    pub has_indirect_anchor: bool,
    pub has_intersection: bool,
    pub has_recursive: bool,
    pub has_closure_parents: bool,
    pub has_userset: bool,
    pub has_closure_usersets: bool,
}

fn select(facts: &StrategyFacts) -> Strategy {
    if facts.exceeds_depth_limit {
        return Strategy::DepthExceeded;
    }
    if facts.has_self_referential_userset {
        return Strategy::SelfRefUserset;
    }
    if facts.has_indirect_anchor {
        return Strategy::Composed;
    }
    if facts.has_intersection {
        return Strategy::Intersection;
    }
    if facts.has_recursive || facts.has_closure_parents {
        return Strategy::Recursive;
    }
    if facts.has_userset || facts.has_closure_usersets {
        return Strategy::Userset;
    }
    Strategy::Direct
}

/// Strategy for list-objects and list-subjects generation.
pub fn determine_list_strategy(facts: &StrategyFacts) -> Strategy {
    select(facts)
}

/// Strategy for check generation; shares the list precedence.
pub fn determine_check_strategy(facts: &StrategyFacts) -> Strategy {
    select(facts)
}
