//! Plan construction errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("recipe `{name}` not found{}", format_suggestions(.suggestions))]
    RecipeNotFound {
        name: String,
        suggestions: Vec<String>,
    },

    #[error("dependency cycle detected involving recipe `{name}`")]
    CycleDetected { name: String },
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(
            "; did you mean {}?",
            suggestions
                .iter()
                .map(|s| format!("`{s}`"))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}
