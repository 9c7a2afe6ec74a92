//! Execution plan builder for drun.
//!
//! Turns a target recipe name plus an execution context into a
//! topologically ordered, level-annotated [`ExecutionPlan`], expanding
//! matrix recipes into one node per Cartesian tuple and rejecting cycles
//! and unknown names.

mod builder;
mod error;
mod plan;

pub use builder::PlanBuilder;
pub use error::GraphError;
pub use plan::{ExecutionPlan, PlanNode};
