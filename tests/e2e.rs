//! End-to-end scenarios: load or parse a spec, build a plan, execute it
//! with an in-memory sink, and check the observable output contract.

#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use drun::runner::RunnerError;
use drun::{
    BufferSink, CacheManager, ExecutionContext, Jinja, Loader, PlanBuilder, Runner, Specification,
    Variable,
};
use drun_graph::GraphError;
use drun_script::ExecError;
use pretty_assertions::assert_eq;

fn spec(yaml: &str) -> Specification {
    serde_yaml::from_str(yaml).expect("spec parses")
}

fn base_ctx(spec: &Specification) -> ExecutionContext {
    let mut ctx = ExecutionContext::for_host();
    ctx.vars = spec.vars.clone();
    ctx.env = spec.env.clone();
    ctx.secrets = spec.secrets.clone();
    ctx
}

struct Harness {
    spec: Specification,
    ctx: ExecutionContext,
    sink: Arc<BufferSink>,
    cache: Option<CacheManager>,
    dry_run: bool,
    explain: bool,
}

impl Harness {
    fn new(yaml: &str) -> Self {
        let spec = spec(yaml);
        let ctx = base_ctx(&spec);
        Self {
            spec,
            ctx,
            sink: Arc::new(BufferSink::new()),
            cache: None,
            dry_run: false,
            explain: false,
        }
    }

    fn set_var(mut self, key: &str, value: &str) -> Self {
        self.ctx.vars.insert(key.to_string(), Variable::from(value));
        self
    }

    fn with_cache(mut self, cache: CacheManager) -> Self {
        self.cache = Some(cache);
        self
    }

    fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    fn explain(mut self) -> Self {
        self.explain = true;
        self
    }

    async fn run(self, target: &str, jobs: usize) -> (Result<(), RunnerError>, Vec<String>) {
        let plan = PlanBuilder::new(&self.spec, &self.ctx)
            .build(target)
            .expect("plan builds");
        let cache = self
            .cache
            .unwrap_or_else(|| CacheManager::new("/nonexistent-cache", false));
        let jinja = Jinja::new(self.spec.snippets.clone(), self.spec.defaults.strict());
        let mut runner = Runner::new(&self.spec, jinja, cache, self.sink.clone());
        runner.set_dry_run(self.dry_run);
        runner.set_explain(self.explain);
        let result = Arc::new(runner).execute(plan, jobs).await;
        (result, self.sink.lines())
    }
}

const S1_LINEAR: &str = "
recipes:
  a: { run: echo A }
  b: { deps: [a], run: echo B }
  c: { deps: [b], run: echo C }
";

#[tokio::test]
async fn s1_linear_deps_run_in_order() {
    let (result, lines) = Harness::new(S1_LINEAR).run("c", 4).await;
    result.unwrap();
    assert_eq!(lines, ["[1/3] a", "A", "[2/3] b", "B", "[3/3] c", "C"]);
}

const S2_DIAMOND: &str = "
recipes:
  a: { run: echo A }
  b: { deps: [a], run: echo B }
  c: { deps: [a], run: echo C }
  d: { deps: [b, c], run: echo D }
";

#[tokio::test]
async fn s2_diamond_respects_level_order() {
    let (result, lines) = Harness::new(S2_DIAMOND).run("d", 2).await;
    result.unwrap();

    let position = |needle: &str| {
        lines
            .iter()
            .position(|l| l == needle)
            .unwrap_or_else(|| panic!("missing `{needle}` in {lines:?}"))
    };
    assert!(position("A") < position("B"));
    assert!(position("A") < position("C"));
    assert!(position("B") < position("D"));
    assert!(position("C") < position("D"));
}

#[tokio::test]
async fn s3_matrix_expands_to_all_tuples() {
    let yaml = "
recipes:
  t:
    matrix: { os: [linux, darwin], ver: ['16', '18'] }
    run: echo {{ matrix_os }}/{{ matrix_ver }}
";
    let (result, lines) = Harness::new(yaml).run("t", 4).await;
    result.unwrap();

    let outputs: std::collections::BTreeSet<&str> = lines
        .iter()
        .map(|l| l.as_str())
        .filter(|l| l.contains('/'))
        .collect();
    assert_eq!(
        outputs,
        ["linux/16", "linux/18", "darwin/16", "darwin/18"]
            .into_iter()
            .collect()
    );
    assert_eq!(lines.iter().filter(|l| l.starts_with('[')).count(), 4);
}

#[test]
fn s4_cycle_is_rejected_before_any_execution() {
    let spec = spec(
        "recipes:\n  a: { deps: [b], run: echo A }\n  b: { deps: [a], run: echo B }\n",
    );
    let ctx = base_ctx(&spec);
    let err = PlanBuilder::new(&spec, &ctx).build("a").unwrap_err();
    match err {
        GraphError::CycleDetected { name } => assert!(name == "a" || name == "b"),
        other => panic!("expected CycleDetected, got {other}"),
    }
}

#[tokio::test]
async fn s5_ignore_error_lets_successors_run() {
    let yaml = "
recipes:
  x: { run: exit 3, ignore_error: true }
  y: { deps: [x], run: echo Y }
";
    let (result, lines) = Harness::new(yaml).run("y", 2).await;
    result.unwrap();
    assert!(lines.contains(&"Y".to_string()));
    assert!(lines.iter().any(|l| l.contains("ignored")));
}

#[tokio::test]
async fn s6_timeout_kills_the_recipe_quickly() {
    let yaml = "
recipes:
  s: { run: sleep 5, timeout: 100ms }
";
    let started = Instant::now();
    let (result, _) = Harness::new(yaml).run("s", 1).await;
    let elapsed = started.elapsed();

    match result.unwrap_err() {
        RunnerError::Node { id, source } => {
            assert_eq!(id, "s");
            assert!(matches!(source, ExecError::Timeout { .. }));
        }
        other => panic!("expected node timeout, got {other}"),
    }
    assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");
}

const S7_CACHED: &str = "
recipes:
  b: { cache_key: 'v1-{{ version }}', run: echo build }
";

#[tokio::test]
async fn s7_cache_skips_identical_reruns() {
    let dir = tempfile::tempdir().unwrap();
    let cache = || CacheManager::new(dir.path(), true);

    let (result, lines) = Harness::new(S7_CACHED)
        .set_var("version", "1")
        .with_cache(cache())
        .run("b", 1)
        .await;
    result.unwrap();
    assert!(lines.contains(&"build".to_string()));

    let (result, lines) = Harness::new(S7_CACHED)
        .set_var("version", "1")
        .with_cache(cache())
        .run("b", 1)
        .await;
    result.unwrap();
    assert!(lines.iter().any(|l| l.contains("cache hit")));
    assert!(!lines.contains(&"build".to_string()));

    let (result, lines) = Harness::new(S7_CACHED)
        .set_var("version", "2")
        .with_cache(cache())
        .run("b", 1)
        .await;
    result.unwrap();
    assert!(lines.contains(&"build".to_string()));
}

#[tokio::test]
async fn failure_in_a_level_blocks_the_next_level() {
    let yaml = "
recipes:
  bad: { run: exit 1 }
  slow: { run: 'sleep 0.4 && echo SLOW' }
  after: { deps: [bad, slow], run: echo AFTER }
";
    let (result, lines) = Harness::new(yaml).run("after", 2).await;
    assert!(result.is_err());

    // The failing node's level peer still completes; the next level never
    // starts.
    assert!(lines.contains(&"SLOW".to_string()));
    assert!(!lines.contains(&"AFTER".to_string()));
}

#[tokio::test]
async fn peers_in_a_level_actually_run_in_parallel() {
    let yaml = "
recipes:
  p1: { run: sleep 0.4 }
  p2: { run: sleep 0.4 }
  both: { deps: [p1, p2], run: echo DONE }
";
    let started = Instant::now();
    let (result, lines) = Harness::new(yaml).run("both", 2).await;
    result.unwrap();
    assert!(lines.contains(&"DONE".to_string()));
    assert!(
        started.elapsed() < Duration::from_millis(750),
        "level did not run in parallel: {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn parallelism_stays_within_the_jobs_bound() {
    let dir = tempfile::tempdir().unwrap();
    let stamp = |name: &str| dir.path().join(name).display().to_string();

    let mut yaml = String::from("recipes:\n");
    for i in 0..4 {
        yaml.push_str(&format!(
            "  p{i}: {{ run: 'date +%s%N > {start}; sleep 0.4; date +%s%N > {end}' }}\n",
            start = stamp(&format!("start_{i}")),
            end = stamp(&format!("end_{i}")),
        ));
    }
    yaml.push_str("  all: { deps: [p0, p1, p2, p3] }\n");

    let (result, _) = Harness::new(&yaml).run("all", 2).await;
    result.unwrap();

    let read = |name: String| -> u128 {
        std::fs::read_to_string(dir.path().join(name))
            .unwrap()
            .trim()
            .parse()
            .unwrap()
    };
    let mut events: Vec<(u128, i32)> = Vec::new();
    for i in 0..4 {
        events.push((read(format!("start_{i}")), 1));
        events.push((read(format!("end_{i}")), -1));
    }
    events.sort();

    let mut running = 0;
    let mut peak = 0;
    for (_, delta) in events {
        running += delta;
        peak = peak.max(running);
    }
    assert!(peak <= 2, "observed {peak} concurrent recipes with --jobs 2");
}

#[tokio::test]
async fn dry_run_prints_the_script_but_spawns_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheManager::new(dir.path(), true);
    let yaml = "
recipes:
  b: { cache_key: fixed, run: echo REAL }
";
    let (result, lines) = Harness::new(yaml).with_cache(cache).dry_run().run("b", 1).await;
    result.unwrap();

    assert!(!lines.contains(&"REAL".to_string()));
    assert!(lines.iter().any(|l| l.contains("echo REAL")));

    // The cache must be untouched: a real run afterwards executes.
    let cache = CacheManager::new(dir.path(), true);
    let (result, lines) = Harness::new(yaml).with_cache(cache).run("b", 1).await;
    result.unwrap();
    assert!(lines.contains(&"REAL".to_string()));
}

#[tokio::test]
async fn explain_masks_secret_looking_env_values() {
    let yaml = "
env:
  API_TOKEN: super-sensitive
  MODE: fast
recipes:
  b: { run: echo ok }
";
    let (result, lines) = Harness::new(yaml).explain().run("b", 1).await;
    result.unwrap();

    let env_lines: Vec<&String> = lines.iter().filter(|l| l.contains('=')).collect();
    assert!(env_lines.iter().any(|l| l.contains("API_TOKEN=********")));
    assert!(env_lines.iter().any(|l| l.contains("MODE=fast")));
    assert!(!lines.iter().any(|l| l.contains("super-sensitive")));
    assert!(lines.contains(&"ok".to_string()), "explain still executes");
}

#[tokio::test]
async fn recipe_env_and_templated_env_reach_the_child() {
    let yaml = "
vars:
  who: world
env:
  GREETING: 'hello {{ who }}'
recipes:
  b: { run: 'echo \"$GREETING\"' }
";
    let (result, lines) = Harness::new(yaml).run("b", 1).await;
    result.unwrap();
    assert!(lines.contains(&"hello world".to_string()));
}

#[tokio::test]
async fn lifecycle_hooks_wrap_every_step() {
    let yaml = "
lifecycle:
  pre_run: echo PRE
  post_run: echo POST
recipes:
  b: { run: echo BODY }
";
    let (result, lines) = Harness::new(yaml).run("b", 1).await;
    result.unwrap();
    let body: Vec<&String> = lines.iter().filter(|l| !l.starts_with('[')).collect();
    assert_eq!(body, ["PRE", "BODY", "POST"]);
}

#[tokio::test]
async fn loader_to_runner_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("drun.yml"),
        "snippets:\n  banner: echo {{ project }}\nvars:\n  project: demo\nrecipes:\n  hello:\n    run: '{{ snippet(''banner'') }}'\n",
    )
    .unwrap();

    let loader = Loader::new(dir.path());
    let spec = loader.load(None).unwrap();
    let ctx = base_ctx(&spec);
    let plan = PlanBuilder::new(&spec, &ctx).build("hello").unwrap();

    let sink = Arc::new(BufferSink::new());
    let jinja = Jinja::new(spec.snippets.clone(), spec.defaults.strict());
    let cache = CacheManager::new(dir.path().join(".drun/cache"), true);
    let runner = Arc::new(Runner::new(&spec, jinja, cache, sink.clone()));
    runner.execute(plan, 1).await.unwrap();

    assert!(sink.lines().contains(&"demo".to_string()));
}

#[tokio::test]
async fn aggregation_only_recipes_spawn_nothing() {
    let yaml = "
recipes:
  a: { run: echo A }
  all: { deps: [a] }
";
    let (result, lines) = Harness::new(yaml).run("all", 1).await;
    result.unwrap();
    assert_eq!(lines, ["[1/2] a", "A", "[2/2] all"]);
}
