//! Communication planning.
//!
//! Flow per customer:
//! 1. Classify the letter (cache first)
//! 2. Rules → `Constraint`
//! 3. Selector → `CommunicationPlan` priced by the active scenario
//!
//! `batch` runs that flow across a worker pool; `report` summarises the result.

pub mod batch;
pub mod cost;
pub mod report;
pub mod rules;
pub mod selector;
pub mod types;

pub use batch::{Assignment, BatchPlanner, StopSignal};
pub use cost::{ChannelCost, CostModel, CostScenario};
pub use report::BatchSummary;
pub use rules::BusinessRuleSet;
pub use selector::ChannelSelector;
