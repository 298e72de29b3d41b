//! Archiving decision engine.
//!
//! Given a classification of one document, decide where it belongs and put
//! it there: the rule table maps metadata to actions, planners propose tool
//! calls, the decision protocol validates and executes them through the
//! action primitives, and the runner drives a whole drop folder.

pub mod actions;
pub mod folders;
pub mod planner;
pub mod protocol;
pub mod rules;
pub mod runner;
pub mod types;

pub use actions::{ActionExecutor, Placement};
pub use folders::FolderIndex;
pub use planner::{LlmPlanner, Planner, RulePlanner};
pub use protocol::DecisionProtocol;
pub use rules::RuleTable;
pub use runner::{Archiver, PlannedDocument, bootstrap_roots};
