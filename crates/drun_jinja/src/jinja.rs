//! Minijinja environment setup and the drun function set.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexMap;
use minijinja::{Environment, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use minijinja::UndefinedBehavior;

use crate::context::ExecutionContext;
use crate::docker::DockerTool;
use crate::functions;

/// Snippets may reference other snippets; this bounds the expansion so a
/// self-referential snippet fails instead of looping.
const MAX_SNIPPET_DEPTH: usize = 16;

/// Template failure, carrying the identifier of the offending template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to parse template `{name}`: {source}")]
    Parse {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("failed to render template `{name}`: {source}")]
    Execute {
        name: String,
        #[source]
        source: minijinja::Error,
    },
}

impl TemplateError {
    fn from_render(name: &str, source: minijinja::Error) -> Self {
        if source.kind() == minijinja::ErrorKind::SyntaxError {
            TemplateError::Parse {
                name: name.to_string(),
                source,
            }
        } else {
            TemplateError::Execute {
                name: name.to_string(),
                source,
            }
        }
    }
}

/// The template engine. Read-only after construction and freely shared
/// across workers; each render builds a fresh function set bound to the
/// node's context, so renders are pure given their inputs (probes like
/// `env` and `now` excepted, by design).
#[derive(Debug, Clone)]
pub struct Jinja {
    snippets: Arc<IndexMap<String, String>>,
    undefined_behavior: UndefinedBehavior,
}

impl Jinja {
    /// Create an engine over the spec's snippets. `strict` makes undefined
    /// context variables a render error instead of empty output.
    pub fn new(snippets: IndexMap<String, String>, strict: bool) -> Self {
        Self {
            snippets: Arc::new(snippets),
            undefined_behavior: if strict {
                UndefinedBehavior::Strict
            } else {
                UndefinedBehavior::Lenient
            },
        }
    }

    /// Render a template string against a context.
    pub fn render(&self, text: &str, ctx: &ExecutionContext) -> Result<String, TemplateError> {
        self.render_named("inline", text, ctx)
    }

    /// Render with an explicit template identifier used in error messages.
    pub fn render_named(
        &self,
        name: &str,
        text: &str,
        ctx: &ExecutionContext,
    ) -> Result<String, TemplateError> {
        let state = Arc::new(RenderState {
            snippets: self.snippets.clone(),
            flat: ctx.flattened(),
            secrets: ctx.secrets.clone(),
            os: ctx.os.clone(),
            arch: ctx.arch.clone(),
            hostname: ctx.hostname.clone(),
            undefined_behavior: self.undefined_behavior,
            snippet_depth: AtomicUsize::new(0),
        });
        render_with_state(&state, name, text)
    }
}

/// Per-render state shared with the registered functions.
#[derive(Debug)]
struct RenderState {
    snippets: Arc<IndexMap<String, String>>,
    flat: BTreeMap<String, Value>,
    secrets: IndexMap<String, String>,
    os: String,
    arch: String,
    hostname: String,
    undefined_behavior: UndefinedBehavior,
    snippet_depth: AtomicUsize,
}

fn render_with_state(
    state: &Arc<RenderState>,
    name: &str,
    text: &str,
) -> Result<String, TemplateError> {
    let env = build_environment(state);
    env.render_str(text, &state.flat)
        .map_err(|e| TemplateError::from_render(name, e))
}

fn invalid_op(msg: String) -> minijinja::Error {
    minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, msg)
}

fn build_environment(state: &Arc<RenderState>) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(state.undefined_behavior);

    // Snippet inlining. The snippet body is rendered against the same
    // context, so snippets may reference variables, helpers and each other.
    let st = state.clone();
    env.add_function(
        "snippet",
        move |name: String| -> Result<Value, minijinja::Error> {
            let body = st
                .snippets
                .get(&name)
                .ok_or_else(|| invalid_op(format!("unknown snippet `{name}`")))?
                .clone();

            if st.snippet_depth.fetch_add(1, Ordering::SeqCst) >= MAX_SNIPPET_DEPTH {
                st.snippet_depth.fetch_sub(1, Ordering::SeqCst);
                return Err(invalid_op(format!(
                    "snippet expansion depth exceeded while expanding `{name}` \
                     (self-referential snippet?)"
                )));
            }
            let rendered = render_with_state(&st, &format!("snippet:{name}"), &body)
                .map_err(|e| invalid_op(e.to_string()));
            st.snippet_depth.fetch_sub(1, Ordering::SeqCst);
            rendered.map(Value::from)
        },
    );

    // Process environment, resolved at render time.
    env.add_function("env", |name: String, default: Option<String>| -> String {
        std::env::var(&name).ok().or(default).unwrap_or_default()
    });

    env.add_function(
        "now",
        |layout: Option<String>| -> Result<String, minijinja::Error> {
            let layout = layout.unwrap_or_else(|| "%Y-%m-%dT%H:%M:%S%:z".to_string());
            functions::format_now(&layout)
                .ok_or_else(|| invalid_op(format!("invalid time layout `{layout}`")))
        },
    );

    env.add_function("sha256", |s: String| -> String {
        hex::encode(Sha256::digest(s.as_bytes()))
    });

    env.add_function("shellquote", |s: String| -> String {
        drun_script::quote::posix(&s)
    });

    let os = state.os.clone();
    env.add_function("os", move || -> String { os.clone() });
    let arch = state.arch.clone();
    env.add_function("arch", move || -> String { arch.clone() });
    let host = state.hostname.clone();
    env.add_function("hostname", move || -> String { host.clone() });

    // Presence probes.
    env.add_function("hasCommand", |name: String| -> bool {
        which::which(&name).is_ok()
    });
    env.add_function("hasFile", |path: String| -> bool {
        std::path::Path::new(&path).exists()
    });
    env.add_function("isCI", || -> bool { functions::is_ci() });
    env.add_function("packageManager", || -> String {
        functions::package_manager(std::path::Path::new("."))
    });

    // Git introspection.
    env.add_function("gitBranch", || -> String { functions::git_branch() });
    env.add_function("gitCommit", || -> String { functions::git_commit() });
    env.add_function("gitShortCommit", || -> String { functions::git_short_commit() });
    env.add_function("gitDirty", || -> bool { functions::git_dirty() });

    env.add_function("dockerCompose", || -> Value {
        Value::from_object(DockerTool::compose())
    });
    env.add_function("dockerBuildx", || -> Value {
        Value::from_object(DockerTool::buildx())
    });

    // Status echoes: each expands to a single shell `echo` command.
    env.add_function("info", |msg: String| functions::echo_command("ℹ", &msg));
    env.add_function("warn", |msg: String| functions::echo_command("⚠", &msg));
    env.add_function("error", |msg: String| functions::echo_command("✖", &msg));
    env.add_function("success", |msg: String| functions::echo_command("✔", &msg));
    env.add_function("step", |msg: String| functions::echo_command("▶", &msg));

    // Argument order matches the name, unlike the collection-generic
    // `in` test.
    env.add_function("stringContains", |haystack: String, needle: String| -> bool {
        haystack.contains(&needle)
    });

    let secrets = state.clone();
    env.add_function("secret", move |name: String| -> String {
        secrets.secrets.get(&name).cloned().unwrap_or_default()
    });
    let secrets = state.clone();
    env.add_function("hasSecret", move |name: String| -> bool {
        secrets.secrets.contains_key(&name)
    });

    env
}
