//! Resolution rules: predicate over a target plus flag assignments.

pub mod model;
pub mod set;

pub use model::{AssignMode, Assignment, EffectiveAssignment, Rule, TargetPredicate};
pub use set::{RULES_SCHEMA_VERSION, RuleSet};
