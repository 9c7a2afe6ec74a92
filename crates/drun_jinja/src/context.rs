//! The layered execution context templates render against.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use minijinja::Value;

use crate::variable::Variable;

/// Everything a template can see for one plan node.
///
/// One context is built per run; the DAG builder clones it per node and
/// overlays recipe-local env and matrix variables. The env map may be
/// rewritten in place during pre-render and must therefore never be aliased
/// across nodes.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Spec-level `vars` plus `--set` overrides and `matrix_*` entries.
    pub vars: IndexMap<String, Variable>,
    /// Effective environment overlay for the child process.
    pub env: IndexMap<String, String>,
    /// Bound flag values for the target recipe.
    pub flags: IndexMap<String, Variable>,
    /// Bound positional values for the target recipe.
    pub positionals: IndexMap<String, Variable>,
    /// Spec-level secrets, served only through `secret()`/`hasSecret()`.
    pub secrets: IndexMap<String, String>,
    /// Target OS tag (`linux`, `darwin`, `windows`, or custom).
    pub os: String,
    /// Host architecture.
    pub arch: String,
    /// Host name.
    pub hostname: String,
}

/// The host OS expressed as a drun OS tag.
pub fn host_os_tag() -> String {
    match std::env::consts::OS {
        "macos" => "darwin".to_string(),
        other => other.to_string(),
    }
}

impl ExecutionContext {
    /// A context describing the host machine with no variables bound.
    pub fn for_host() -> Self {
        Self {
            os: host_os_tag(),
            arch: std::env::consts::ARCH.to_string(),
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Retarget the shell-facing OS tag, e.g. for `--shell windows`.
    pub fn with_target_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    /// Flatten the layers into the single name→value map templates see.
    ///
    /// Later layers override earlier ones: os/arch/hostname, then vars,
    /// env, flags, positionals.
    pub fn flattened(&self) -> BTreeMap<String, Value> {
        let mut map = BTreeMap::new();
        map.insert("os".to_string(), Value::from(self.os.clone()));
        map.insert("arch".to_string(), Value::from(self.arch.clone()));
        map.insert("hostname".to_string(), Value::from(self.hostname.clone()));

        for (k, v) in &self.vars {
            map.insert(k.clone(), v.clone().into());
        }
        for (k, v) in &self.env {
            map.insert(k.clone(), Value::from(v.clone()));
        }
        for (k, v) in &self.flags {
            map.insert(k.clone(), v.clone().into());
        }
        for (k, v) in &self.positionals {
            map.insert(k.clone(), v.clone().into());
        }
        map
    }
}
