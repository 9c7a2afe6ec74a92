//! Plan execution: level-by-level scheduling with a bounded worker pool.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use drun_cache::CacheManager;
use drun_graph::{ExecutionPlan, PlanNode};
use drun_jinja::{Jinja, TemplateError};
use drun_recipe::{Lifecycle, Specification};
use drun_script::{
    ExecError, ExecRequest, OutputSink, ShellConfig, ShellError, select_shell, translate,
};
use indexmap::IndexMap;
use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error("recipe `{id}` failed: {source}")]
    Node {
        id: String,
        #[source]
        source: ExecError,
    },
}

/// Executes a plan. Shares its template engine, shell table and cache
/// manager read-only across workers; all informational and child output
/// goes through one sink in arrival order.
pub struct Runner {
    shells: IndexMap<String, ShellConfig>,
    lifecycle: Lifecycle,
    inherit_env: bool,
    export_env: bool,
    jinja: Jinja,
    cache: CacheManager,
    sink: Arc<dyn OutputSink>,
    dry_run: bool,
    explain: bool,
}

impl Runner {
    pub fn new(
        spec: &Specification,
        jinja: Jinja,
        cache: CacheManager,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            shells: spec.shell.clone(),
            lifecycle: spec.lifecycle.clone(),
            inherit_env: spec.defaults.inherit_env(),
            export_env: spec.defaults.export_env(),
            jinja,
            cache,
            sink,
            dry_run: false,
            explain: false,
        }
    }

    /// Render and print instead of spawning processes; the cache is left
    /// untouched.
    pub fn set_dry_run(&mut self, on: bool) {
        self.dry_run = on;
    }

    /// Print rendered artifacts (with secrets masked) before executing.
    pub fn set_explain(&mut self, on: bool) {
        self.explain = on;
    }

    /// Execute the plan. Returns the first error encountered; a failure in
    /// level k lets its peers finish but prevents level k+1 from starting.
    pub async fn execute(
        self: &Arc<Self>,
        plan: ExecutionPlan,
        max_parallelism: usize,
    ) -> Result<(), RunnerError> {
        if plan.is_empty() {
            return Ok(());
        }
        let plan = Arc::new(plan);
        let completed = Arc::new(Mutex::new(0usize));
        let jobs = max_parallelism.max(1);

        if jobs == 1 {
            for index in 0..plan.len() {
                self.run_node(&plan, index, &completed).await?;
            }
            return Ok(());
        }

        if plan.levels.is_empty() {
            // Fallback for plans without level annotations: everything in
            // parallel, edges ignored. Normal builds always carry levels.
            let all: Vec<usize> = (0..plan.len()).collect();
            return self.run_level(&plan, &all, jobs, &completed).await;
        }

        for level in &plan.levels {
            self.run_level(&plan, level, jobs, &completed).await?;
        }
        Ok(())
    }

    /// Dispatch one level to the pool and wait for every member (the level
    /// barrier). Concurrency is capped at `min(level size, jobs)`.
    async fn run_level(
        self: &Arc<Self>,
        plan: &Arc<ExecutionPlan>,
        indices: &[usize],
        jobs: usize,
        completed: &Arc<Mutex<usize>>,
    ) -> Result<(), RunnerError> {
        let effective = indices.len().min(jobs).max(1);
        let semaphore = Arc::new(Semaphore::new(effective));
        let first_error: Arc<Mutex<Option<RunnerError>>> = Arc::default();

        let mut handles = Vec::with_capacity(indices.len());
        for &index in indices {
            let runner = self.clone();
            let plan = plan.clone();
            let semaphore = semaphore.clone();
            let completed = completed.clone();
            let first_error = first_error.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                if let Err(error) = runner.run_node(&plan, index, &completed).await {
                    let mut slot = first_error.lock().expect("error slot poisoned");
                    // Later failures in the same level are discarded.
                    if slot.is_none() {
                        *slot = Some(error);
                    }
                }
            }));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("worker panicked: {e}");
            }
        }

        match first_error.lock().expect("error slot poisoned").take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn run_node(
        &self,
        plan: &ExecutionPlan,
        index: usize,
        completed: &Arc<Mutex<usize>>,
    ) -> Result<(), RunnerError> {
        let node = &plan.nodes[index];
        {
            let mut count = completed.lock().expect("progress counter poisoned");
            *count += 1;
            self.sink
                .line(&format!("[{}/{}] {}", *count, plan.len(), node.id));
        }

        let key = self
            .cache
            .rendered_key(&node.recipe_name, &node.recipe, &node.ctx, &self.jinja)?;
        if let Some(key) = &key
            && self.cache.is_valid(key)
        {
            self.sink.line(&format!("skipping {} (cache hit)", node.id));
            return Ok(());
        }

        if node.recipe.run.is_empty() {
            // Aggregation-only recipe: dependencies are the work.
            self.finish(node, key);
            return Ok(());
        }

        // Pre-render templated env values in place, on this node's own
        // context copy.
        let mut ctx = node.ctx.clone();
        let env_snapshot: Vec<(String, String)> = ctx
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (name, raw) in env_snapshot {
            let rendered = self.jinja.render_named(&format!("env:{name}"), &raw, &ctx)?;
            ctx.env.insert(name, rendered);
        }

        let rendered = node.recipe.run.rendered(
            &self.jinja,
            &format!("recipe:{}", node.id),
            &ctx,
            &self.lifecycle.pre_run,
            &self.lifecycle.post_run,
        )?;
        let mut script = rendered.lines().join("\n");

        let shell = select_shell(&self.shells, node.recipe.shell_preference(), &ctx.os)?;
        if ctx.os == drun_script::OS_WINDOWS {
            script = translate::to_powershell(&script);
        }

        let cwd = node
            .recipe
            .working_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));

        if self.explain || self.dry_run {
            self.print_explain(node, &shell, &script, &cwd, &ctx.env);
        }
        if self.dry_run {
            return Ok(());
        }

        let env = if self.export_env {
            ctx.env.clone()
        } else {
            IndexMap::new()
        };
        let request = ExecRequest {
            shell: &shell,
            script: &script,
            env: &env,
            inherit_env: self.inherit_env,
            cwd: &cwd,
            timeout: node.recipe.timeout.unwrap_or(drun_recipe::DEFAULT_TIMEOUT),
        };

        match drun_script::run_script(request, self.sink.as_ref()).await {
            Ok(()) => {}
            Err(ExecError::Exit { code }) if node.recipe.ignore_error => {
                self.sink
                    .line(&format!("{} exited with status {code} (ignored)", node.id));
            }
            Err(source) => {
                return Err(RunnerError::Node {
                    id: node.id.clone(),
                    source,
                });
            }
        }

        self.finish(node, key);
        Ok(())
    }

    /// Record completion. Cache trouble is a warning, never a failure.
    fn finish(&self, node: &PlanNode, key: Option<String>) {
        if self.dry_run {
            return;
        }
        if let Some(key) = key
            && let Err(e) = self.cache.mark_complete(&key)
        {
            tracing::warn!("failed to write cache marker for {}: {e}", node.id);
        }
    }

    fn print_explain(
        &self,
        node: &PlanNode,
        shell: &ShellConfig,
        script: &str,
        cwd: &std::path::Path,
        env: &IndexMap<String, String>,
    ) {
        self.sink.line(&format!("─── {} ───", node.id));
        self.sink.line(&format!("working dir: {}", cwd.display()));
        self.sink
            .line(&format!("shell: {} {}", shell.command, shell.args.join(" ")));
        self.sink.line("script:");
        for (number, line) in script.lines().enumerate() {
            self.sink.line(&format!("  {:>3} | {}", number + 1, line));
        }
        if !env.is_empty() {
            self.sink.line("env:");
            for (name, value) in env {
                self.sink
                    .line(&format!("  {}={}", name, mask_secret(name, value)));
            }
        }
    }
}

/// Display-only heuristic: values of keys that look secret never appear in
/// explain output.
pub fn mask_secret(key: &str, value: &str) -> String {
    const MARKERS: &[&str] = &["TOKEN", "SECRET", "PASSWORD", "PASS", "KEY"];
    let upper = key.to_uppercase();
    if MARKERS.iter().any(|marker| upper.contains(marker)) {
        "********".to_string()
    } else {
        value.to_string()
    }
}
