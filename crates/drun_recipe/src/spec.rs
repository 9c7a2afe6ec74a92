//! The top-level specification document.

use std::path::{Path, PathBuf};
use std::time::Duration;

use drun_jinja::Variable;
use drun_script::ShellConfig;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::duration::opt_duration;
use crate::recipe::Recipe;
use crate::step::Step;

/// Default timeout when neither the recipe nor the defaults set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// A fully merged specification. Constructed by the loader and immutable
/// thereafter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Specification {
    /// Informational version string.
    #[serde(default)]
    pub version: Option<String>,

    /// OS tag (or custom name) → shell invocation.
    #[serde(default)]
    pub shell: IndexMap<String, ShellConfig>,

    /// Global env overlay; values may contain template syntax.
    #[serde(default)]
    pub env: IndexMap<String, String>,

    /// Global variables of arbitrary shape.
    #[serde(default)]
    pub vars: IndexMap<String, Variable>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Reusable text blocks inlined by `snippet()`.
    #[serde(default)]
    pub snippets: IndexMap<String, String>,

    /// Include patterns: local globs or remote URIs, optionally namespaced
    /// with `NAME::pattern`.
    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub recipes: IndexMap<String, Recipe>,

    #[serde(default)]
    pub cache: CacheSettings,

    /// In-file secrets map, served to templates via `secret()`.
    #[serde(default)]
    pub secrets: IndexMap<String, String>,

    /// Lines wrapped around every executed step.
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl Specification {
    /// Look a recipe up by name or alias, returning its canonical name.
    pub fn resolve_recipe(&self, name: &str) -> Option<(&str, &Recipe)> {
        if let Some((key, recipe)) = self.recipes.get_key_value(name) {
            return Some((key.as_str(), recipe));
        }
        self.recipes
            .iter()
            .find(|(_, recipe)| recipe.aliases.iter().any(|alias| alias == name))
            .map(|(key, recipe)| (key.as_str(), recipe))
    }
}

/// Spec-level fallbacks. All fields optional so include merging can tell
/// "set" from "defaulted"; accessors supply the built-in values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub shell: Option<String>,

    #[serde(default, deserialize_with = "opt_duration")]
    pub timeout: Option<Duration>,

    #[serde(default)]
    pub inherit_env: Option<bool>,

    #[serde(default)]
    pub export_env: Option<bool>,

    #[serde(default)]
    pub strict: Option<bool>,
}

impl Defaults {
    pub fn working_dir(&self) -> &Path {
        self.working_dir.as_deref().unwrap_or(Path::new("."))
    }

    pub fn shell(&self) -> &str {
        self.shell.as_deref().unwrap_or("auto")
    }

    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }

    pub fn inherit_env(&self) -> bool {
        self.inherit_env.unwrap_or(true)
    }

    pub fn export_env(&self) -> bool {
        self.export_env.unwrap_or(true)
    }

    pub fn strict(&self) -> bool {
        self.strict.unwrap_or(true)
    }

    /// Overlay `other`'s set fields onto self (used when a later merge
    /// layer wins).
    pub(crate) fn overlay(&mut self, other: Defaults) {
        if other.working_dir.is_some() {
            self.working_dir = other.working_dir;
        }
        if other.shell.is_some() {
            self.shell = other.shell;
        }
        if other.timeout.is_some() {
            self.timeout = other.timeout;
        }
        if other.inherit_env.is_some() {
            self.inherit_env = other.inherit_env;
        }
        if other.export_env.is_some() {
            self.export_env = other.export_env;
        }
        if other.strict.is_some() {
            self.strict = other.strict;
        }
    }
}

/// Cache directory override plus extra key fragments appended to every
/// recipe cache key.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub keys: Vec<String>,
}

/// Script lines wrapped around every executed step. Sequences append
/// across include merges.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Lifecycle {
    #[serde(default)]
    pub pre_run: Step,

    #[serde(default)]
    pub post_run: Step,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let spec: Specification = serde_yaml::from_str("{}").unwrap();
        assert!(spec.recipes.is_empty());
        assert_eq!(spec.defaults.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(spec.defaults.working_dir(), Path::new("."));
        assert!(spec.defaults.strict());
    }

    #[test]
    fn resolve_recipe_honors_aliases() {
        let spec: Specification = serde_yaml::from_str(
            "recipes:\n  build:\n    run: echo hi\n    aliases: [b]\n",
        )
        .unwrap();
        assert_eq!(spec.resolve_recipe("build").unwrap().0, "build");
        assert_eq!(spec.resolve_recipe("b").unwrap().0, "build");
        assert!(spec.resolve_recipe("missing").is_none());
    }

    #[test]
    fn defaults_overlay_keeps_unset_fields() {
        let mut base = Defaults {
            shell: Some("bash".to_string()),
            strict: Some(false),
            ..Defaults::default()
        };
        base.overlay(Defaults {
            shell: Some("zsh".to_string()),
            ..Defaults::default()
        });
        assert_eq!(base.shell(), "zsh");
        assert!(!base.strict());
    }

    #[test]
    fn full_document_parses() {
        let spec: Specification = serde_yaml::from_str(
            r#"
version: "3"
shell:
  linux: { command: /bin/bash, args: ["-c"] }
env:
  RUST_LOG: info
vars:
  project: demo
defaults:
  timeout: 10m
  strict: false
snippets:
  banner: echo {{ project }}
cache:
  path: .cache/drun
  keys: ["{{ os }}"]
secrets:
  token: sekrit
lifecycle:
  pre_run: "set -x"
recipes:
  build:
    help: build the project
    run: cargo build
"#,
        )
        .unwrap();
        assert_eq!(spec.version.as_deref(), Some("3"));
        assert_eq!(spec.defaults.timeout(), Duration::from_secs(600));
        assert_eq!(spec.cache.keys.len(), 1);
        assert_eq!(spec.lifecycle.pre_run.lines(), ["set -x"]);
        assert_eq!(spec.recipes["build"].help.as_deref(), Some("build the project"));
    }
}
