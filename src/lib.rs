//! drun: a YAML-driven, cross-platform task runner.
//!
//! Declarative recipes form a dependency graph; drun renders their scripts
//! and environments through a template engine, expands matrix recipes,
//! computes parallel execution levels, and runs them level by level under a
//! bounded worker pool with per-node timeouts and content-addressed
//! caching.

pub mod console_utils;
pub mod opt;
pub mod runner;

pub use drun_cache::{CacheManager, CacheStats, default_cache_dir};
pub use drun_graph::{ExecutionPlan, GraphError, PlanBuilder, PlanNode};
pub use drun_jinja::{ExecutionContext, Jinja, TemplateError, Variable, host_os_tag};
pub use drun_recipe::{
    ArgError, ConfigError, Loader, Recipe, Specification, Step, bind_args,
};
pub use drun_script::{BufferSink, OutputSink, ShellConfig, StdoutSink, select_shell};
pub use runner::{Runner, RunnerError, mask_secret};
