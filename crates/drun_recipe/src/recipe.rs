//! Recipe, flag and positional-argument types.

use std::path::PathBuf;
use std::time::Duration;

use drun_jinja::Variable;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::duration::opt_duration;
use crate::step::Step;

/// A named unit of work: a shell script plus optional inputs, dependencies
/// and expansion axes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    /// One-line description shown by `--list`.
    #[serde(default)]
    pub help: Option<String>,

    /// Ordered positional argument specs; at most one variadic, last.
    #[serde(default)]
    pub positionals: Vec<PositionalArg>,

    /// Named flags accepted by this recipe.
    #[serde(default)]
    pub flags: IndexMap<String, Flag>,

    /// Recipe-local env overlay; values may contain template syntax.
    #[serde(default)]
    pub env: IndexMap<String, String>,

    /// Recipes that must complete before this one may start.
    #[serde(default)]
    pub deps: Vec<String>,

    /// Reserved hint; level assignment currently ignores it.
    #[serde(default)]
    pub parallel_deps: bool,

    /// The script lines.
    #[serde(default)]
    pub run: Step,

    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Shell preference; empty or `auto` means the target OS default.
    #[serde(default)]
    pub shell: Option<String>,

    #[serde(default, deserialize_with = "opt_duration")]
    pub timeout: Option<Duration>,

    /// Convert a non-zero exit into success for this recipe.
    #[serde(default)]
    pub ignore_error: bool,

    /// Alternate names resolving to this recipe.
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Expansion axes: one plan node per Cartesian tuple.
    #[serde(default)]
    pub matrix: IndexMap<String, Vec<Variable>>,

    /// Template-rendered fingerprint gating execution.
    #[serde(default)]
    pub cache_key: Option<String>,
}

impl Recipe {
    /// The shell preference, `auto` when unset.
    pub fn shell_preference(&self) -> &str {
        self.shell.as_deref().unwrap_or("auto")
    }
}

/// One positional argument spec.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PositionalArg {
    pub name: String,

    #[serde(default)]
    pub required: bool,

    /// Accepted values; empty means unrestricted.
    #[serde(default)]
    pub one_of: Vec<String>,

    /// Regex the value must match.
    #[serde(default)]
    pub pattern: Option<String>,

    #[serde(default)]
    pub default: Option<Variable>,

    /// Collects all remaining positionals; must be last.
    #[serde(default)]
    pub variadic: bool,
}

/// A named flag spec.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Flag {
    #[serde(rename = "type", default)]
    pub kind: FlagType,

    #[serde(default)]
    pub default: Option<Variable>,

    #[serde(default)]
    pub help: Option<String>,
}

/// The closed set of flag types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum FlagType {
    #[default]
    #[serde(rename = "string")]
    String,
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "string-list")]
    StringList,
}

impl FlagType {
    pub fn name(&self) -> &'static str {
        match self {
            FlagType::String => "string",
            FlagType::Int => "int",
            FlagType::Bool => "bool",
            FlagType::StringList => "string-list",
        }
    }

    /// Whether a default value satisfies this type.
    pub fn admits(&self, value: &Variable) -> bool {
        match self {
            FlagType::String => value.as_str().is_some(),
            FlagType::Int => value.is_int(),
            FlagType::Bool => value.is_bool(),
            FlagType::StringList => value.is_string_list(),
        }
    }
}
