//! Building a level-annotated execution plan from a target recipe.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use drun_jinja::{ExecutionContext, Variable};
use drun_recipe::{Recipe, Specification};
use petgraph::graph::DiGraph;

use crate::error::GraphError;
use crate::plan::{ExecutionPlan, PlanNode};

/// Builds execution plans rooted at a target recipe.
pub struct PlanBuilder<'a> {
    spec: &'a Specification,
    ctx: &'a ExecutionContext,
}

#[derive(Default)]
struct BuildState {
    nodes: Vec<PlanNode>,
    edges: Vec<(usize, usize)>,
    visiting: HashSet<String>,
    done: HashMap<String, Vec<usize>>,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(spec: &'a Specification, ctx: &'a ExecutionContext) -> Self {
        Self { spec, ctx }
    }

    /// Produce a topologically ordered, level-annotated plan for `target`
    /// (a recipe name or alias).
    pub fn build(&self, target: &str) -> Result<ExecutionPlan, GraphError> {
        let mut state = BuildState::default();
        self.visit(target, &mut state)?;

        let BuildState { nodes, edges, .. } = state;

        // DFS already emits dependencies before dependents; petgraph's
        // toposort doubles as the belt-and-braces cycle check.
        let mut graph = DiGraph::<usize, ()>::new();
        let petgraph_nodes: Vec<_> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();
        for (from, to) in &edges {
            graph.add_edge(petgraph_nodes[*from], petgraph_nodes[*to], ());
        }
        let order = petgraph::algo::toposort(&graph, None).map_err(|cycle| {
            GraphError::CycleDetected {
                name: nodes[graph[cycle.node_id()]].id.clone(),
            }
        })?;
        debug_assert_eq!(order.len(), nodes.len());

        let levels = assign_levels(nodes.len(), &edges);

        Ok(ExecutionPlan {
            nodes,
            edges,
            levels,
        })
    }

    /// Depth-first insertion. Returns the node indices produced for the
    /// recipe (one per matrix tuple).
    fn visit(&self, name: &str, state: &mut BuildState) -> Result<Vec<usize>, GraphError> {
        let (canonical, recipe) =
            self.spec
                .resolve_recipe(name)
                .ok_or_else(|| GraphError::RecipeNotFound {
                    name: name.to_string(),
                    suggestions: suggestions(self.spec, name),
                })?;

        if let Some(indices) = state.done.get(canonical) {
            return Ok(indices.clone());
        }
        if !state.visiting.insert(canonical.to_string()) {
            return Err(GraphError::CycleDetected {
                name: canonical.to_string(),
            });
        }

        let mut dep_indices: Vec<usize> = Vec::new();
        for dep in &recipe.deps {
            for index in self.visit(dep, state)? {
                if !dep_indices.contains(&index) {
                    dep_indices.push(index);
                }
            }
        }

        let indices = self.expand(canonical, recipe, &dep_indices, state);

        state.visiting.remove(canonical);
        state.done.insert(canonical.to_string(), indices.clone());
        Ok(indices)
    }

    /// Append nodes for one recipe: a single node, or one per Cartesian
    /// tuple of the matrix. Dimensions enumerate in lexicographic name
    /// order with values in declared order; the last dimension varies
    /// fastest.
    fn expand(
        &self,
        name: &str,
        recipe: &Recipe,
        dep_indices: &[usize],
        state: &mut BuildState,
    ) -> Vec<usize> {
        let recipe_arc = Arc::new(recipe.clone());

        if recipe.matrix.is_empty() {
            let index = push_node(
                state,
                PlanNode {
                    id: name.to_string(),
                    recipe_name: name.to_string(),
                    recipe: recipe_arc,
                    ctx: self.node_ctx(recipe, &[]),
                    depends_on: dep_indices.to_vec(),
                },
                dep_indices,
            );
            return vec![index];
        }

        let mut dimensions: Vec<(&String, &Vec<Variable>)> = recipe.matrix.iter().collect();
        dimensions.sort_by(|(a, _), (b, _)| a.cmp(b));

        let total: usize = dimensions.iter().map(|(_, values)| values.len()).product();
        let mut counter = vec![0usize; dimensions.len()];
        let mut indices = Vec::with_capacity(total);

        for k in 0..total {
            let overlay: Vec<(String, Variable)> = dimensions
                .iter()
                .zip(&counter)
                .map(|((dim, values), &i)| (format!("matrix_{dim}"), values[i].clone()))
                .collect();

            let index = push_node(
                state,
                PlanNode {
                    id: format!("{name}[{k}]"),
                    recipe_name: name.to_string(),
                    recipe: recipe_arc.clone(),
                    ctx: self.node_ctx(recipe, &overlay),
                    depends_on: dep_indices.to_vec(),
                },
                dep_indices,
            );
            indices.push(index);

            for position in (0..dimensions.len()).rev() {
                counter[position] += 1;
                if counter[position] < dimensions[position].1.len() {
                    break;
                }
                counter[position] = 0;
            }
        }
        indices
    }

    fn node_ctx(&self, recipe: &Recipe, matrix_vars: &[(String, Variable)]) -> ExecutionContext {
        let mut ctx = self.ctx.clone();
        for (key, value) in &recipe.env {
            ctx.env.insert(key.clone(), value.clone());
        }
        for (key, value) in matrix_vars {
            ctx.vars.insert(key.clone(), value.clone());
        }
        ctx
    }
}

fn push_node(state: &mut BuildState, node: PlanNode, dep_indices: &[usize]) -> usize {
    let index = state.nodes.len();
    state.nodes.push(node);
    for &dep in dep_indices {
        state.edges.push((dep, index));
    }
    index
}

/// Minimum-depth level partition: repeatedly emit the zero-in-degree set.
/// Ties within a level are stable by node insertion order.
fn assign_levels(node_count: usize, edges: &[(usize, usize)]) -> Vec<Vec<usize>> {
    let mut in_degree = vec![0usize; node_count];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    for &(from, to) in edges {
        in_degree[to] += 1;
        successors[from].push(to);
    }

    let mut levels = Vec::new();
    let mut ready: Vec<usize> = (0..node_count).filter(|&i| in_degree[i] == 0).collect();

    while !ready.is_empty() {
        let mut next = Vec::new();
        for &node in &ready {
            for &succ in &successors[node] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    next.push(succ);
                }
            }
        }
        next.sort_unstable();
        levels.push(std::mem::replace(&mut ready, next));
    }
    levels
}

fn suggestions(spec: &Specification, name: &str) -> Vec<String> {
    let mut scored: Vec<(usize, &String)> = spec
        .recipes
        .keys()
        .map(|candidate| (strsim::levenshtein(name, candidate), candidate))
        .collect();
    scored.sort_by_key(|(distance, _)| *distance);
    scored
        .into_iter()
        .filter(|(distance, _)| *distance <= 3)
        .take(3)
        .map(|(_, candidate)| candidate.clone())
        .collect()
}
