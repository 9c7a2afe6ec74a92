//! Template engine for drun recipes, powered by minijinja.
//!
//! Exposes the dynamic [`Variable`] value type, the layered
//! [`ExecutionContext`] templates render against, and the [`Jinja`] engine
//! with the drun function set (snippets, environment and tool probes, git
//! and CI introspection, hashing, quoting, status echoes).

mod context;
mod docker;
mod functions;
mod jinja;
mod variable;

pub use context::{ExecutionContext, host_os_tag};
pub use jinja::{Jinja, TemplateError, UndefinedBehavior};
pub use variable::Variable;
