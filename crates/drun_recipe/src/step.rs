//! The `Step` type: the ordered script lines of a recipe.

use drun_jinja::{ExecutionContext, Jinja, TemplateError};
use serde::{Deserialize, Deserializer};

/// Ordered command lines. YAML accepts either a scalar (split on newlines,
/// empty lines stripped) or a sequence of lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    lines: Vec<String>,
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawStep {
            Scalar(String),
            Lines(Vec<String>),
        }

        Ok(match RawStep::deserialize(deserializer)? {
            RawStep::Scalar(text) => Step::from_script(&text),
            RawStep::Lines(lines) => Step { lines },
        })
    }
}

impl Step {
    /// Build a step from scalar script text: split on newlines, dropping
    /// empty lines.
    pub fn from_script(text: &str) -> Self {
        Step {
            lines: text
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| line.to_string())
                .collect(),
        }
    }

    /// Build a step from explicit lines.
    pub fn from_lines(lines: Vec<String>) -> Self {
        Step { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// "No script": a recipe with an empty step must have dependencies.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Append another step's lines (used by include merging of lifecycle
    /// blocks).
    pub fn extend_from(&mut self, other: &Step) {
        self.lines.extend(other.lines.iter().cloned());
    }

    /// Render this step as one template, optionally surrounded by lifecycle
    /// pre/post lines. The concatenation renders as a single template, is
    /// re-split on newlines, and leading/trailing blank lines are stripped
    /// while interior blanks survive.
    pub fn rendered(
        &self,
        jinja: &Jinja,
        name: &str,
        ctx: &ExecutionContext,
        pre: &Step,
        post: &Step,
    ) -> Result<Step, TemplateError> {
        let source = pre
            .lines
            .iter()
            .chain(self.lines.iter())
            .chain(post.lines.iter())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");

        let rendered = jinja.render_named(name, &source, ctx)?;
        let mut lines: Vec<String> = rendered.lines().map(|l| l.to_string()).collect();

        while lines.first().is_some_and(|l| l.trim().is_empty()) {
            lines.remove(0);
        }
        while lines.last().is_some_and(|l| l.trim().is_empty()) {
            lines.pop();
        }

        Ok(Step { lines })
    }
}
