//! Plan node and execution plan types.

use std::sync::Arc;

use drun_jinja::ExecutionContext;
use drun_recipe::Recipe;

/// One schedulable unit. Matrix recipes expand into one node per tuple,
/// with ids `recipe[0]`, `recipe[1]`, ….
#[derive(Debug, Clone)]
pub struct PlanNode {
    /// Display id: the recipe name, with a `[k]` suffix for matrix tuples.
    pub id: String,
    /// Canonical recipe name this node was expanded from.
    pub recipe_name: String,
    /// The recipe, shared across matrix siblings.
    pub recipe: Arc<Recipe>,
    /// Per-node context: the base context plus the recipe env overlay and,
    /// for matrix nodes, `matrix_<dim>` vars. Owned by this node.
    pub ctx: ExecutionContext,
    /// Indices of the nodes this one waits for.
    pub depends_on: Vec<usize>,
}

/// A topologically ordered plan with explicit edges and parallel levels.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    /// Nodes in topological order (dependencies precede dependents).
    pub nodes: Vec<PlanNode>,
    /// Edges as (from, to) node-index pairs.
    pub edges: Vec<(usize, usize)>,
    /// Index groups where every member's dependencies are in earlier
    /// groups. Executed as parallel stages with a barrier in between.
    pub levels: Vec<Vec<usize>>,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}
