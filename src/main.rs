use std::sync::Arc;

use clap::Parser;
use miette::{Context, IntoDiagnostic, bail};

use drun::opt::App;
use drun::{
    CacheManager, ExecutionContext, Jinja, Loader, PlanBuilder, Runner, StdoutSink, Variable,
    bind_args, console_utils, default_cache_dir,
};

#[tokio::main]
async fn main() -> miette::Result<()> {
    let app = App::parse();
    console_utils::init_logging(app.verbose);

    let base_dir = std::env::current_dir()
        .into_diagnostic()
        .wrap_err("cannot determine working directory")?;

    let loader = Loader::new(&base_dir);
    let spec = loader.load(app.file.as_deref()).into_diagnostic()?;

    if app.list {
        for (name, recipe) in &spec.recipes {
            match &recipe.help {
                Some(help) => println!("{name:<24} {help}"),
                None => println!("{name}"),
            }
        }
        return Ok(());
    }

    let Some((target, recipe_args)) = app.recipe_and_args.split_first() else {
        bail!("no recipe given; use --list to see what is available");
    };

    let mut ctx = ExecutionContext::for_host();
    if let Some(shell) = &app.shell {
        // Target another OS tag (or a custom shell-table entry); process
        // launch semantics stay those of the host.
        ctx = ctx.with_target_os(shell.clone());
    }
    ctx.vars = spec.vars.clone();
    ctx.env = spec.env.clone();
    ctx.secrets = spec.secrets.clone();
    for pair in &app.set {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("--set expects KEY=VALUE, got `{pair}`");
        };
        ctx.vars.insert(key.to_string(), Variable::from(value));
    }

    let Some((_, recipe)) = spec.resolve_recipe(target) else {
        // Build the plan anyway so the error carries suggestions.
        PlanBuilder::new(&spec, &ctx)
            .build(target)
            .into_diagnostic()?;
        unreachable!("plan build must fail for an unknown recipe");
    };
    let bound = bind_args(recipe, recipe_args).into_diagnostic()?;
    ctx.flags = bound.flags;
    ctx.positionals = bound.positionals;

    let plan = PlanBuilder::new(&spec, &ctx)
        .build(target)
        .into_diagnostic()?;

    let cache_dir = spec
        .cache
        .path
        .clone()
        .map(|path| base_dir.join(path))
        .unwrap_or_else(|| default_cache_dir(&base_dir));
    let cache = CacheManager::new(cache_dir, !app.no_cache)
        .with_extra_keys(spec.cache.keys.clone());

    let jinja = Jinja::new(spec.snippets.clone(), spec.defaults.strict());
    let mut runner = Runner::new(&spec, jinja, cache, Arc::new(StdoutSink));
    runner.set_dry_run(app.dry_run);
    runner.set_explain(app.explain);

    let jobs = app.jobs.unwrap_or_else(num_cpus::get);
    Arc::new(runner)
        .execute(plan, jobs)
        .await
        .into_diagnostic()?;
    Ok(())
}
