//! Rule evaluation and action application.
//!
//! A rule is a predicate (its own query, or the query of a linked view) plus a
//! flat set of actions. Rules are applied in bulk when created or edited, and
//! one notification at a time as new notifications arrive.

mod actions;
mod engine;

pub use actions::{
    ActionApplier, ActionErrors, ActionFailure, ActionTarget, FlagAction, RuleAction, RuleActions,
};
pub use engine::{BulkApplyReport, DEFAULT_APPLY_PAGE_SIZE, RuleEngine, RuleEngineConfig};
