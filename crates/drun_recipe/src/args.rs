//! Binding command-line tokens to a recipe's declared positionals and
//! flags.

use drun_jinja::Variable;
use indexmap::IndexMap;
use thiserror::Error;

use crate::recipe::{Flag, FlagType, Recipe};

#[derive(Debug, Error)]
pub enum ArgError {
    #[error("missing required positional `{name}`")]
    MissingPositional { name: String },

    #[error("unexpected positional `{value}`")]
    UnexpectedPositional { value: String },

    #[error("unknown flag `{name}`")]
    UnknownFlag { name: String },

    #[error("flag `{name}` requires a {expected} value, got `{value}`")]
    InvalidFlagValue {
        name: String,
        value: String,
        expected: &'static str,
    },

    #[error("flag `{name}` requires a value")]
    MissingFlagValue { name: String },

    #[error("positional `{name}` must be one of [{}], got `{value}`", .allowed.join(", "))]
    NotOneOf {
        name: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("positional `{name}` value `{value}` does not match pattern `{pattern}`")]
    PatternMismatch {
        name: String,
        value: String,
        pattern: String,
    },
}

/// Values bound to a recipe invocation, ready to overlay on the context.
#[derive(Debug, Default)]
pub struct BoundArgs {
    pub positionals: IndexMap<String, Variable>,
    pub flags: IndexMap<String, Variable>,
}

/// Parse the raw tokens following the recipe name.
///
/// Recognized forms: `--flag`, `--flag=value`, `name=value` (for a declared
/// flag name) and bare positionals, in any order.
pub fn bind_args(recipe: &Recipe, tokens: &[String]) -> Result<BoundArgs, ArgError> {
    let mut positionals: Vec<&str> = Vec::new();
    let mut flag_values: IndexMap<String, Vec<Option<String>>> = IndexMap::new();

    for token in tokens {
        if let Some(body) = token.strip_prefix("--") {
            let (name, value) = match body.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (body, None),
            };
            if !recipe.flags.contains_key(name) {
                return Err(ArgError::UnknownFlag {
                    name: name.to_string(),
                });
            }
            flag_values.entry(name.to_string()).or_default().push(value);
        } else if let Some((name, value)) = token.split_once('=')
            && recipe.flags.contains_key(name)
        {
            flag_values
                .entry(name.to_string())
                .or_default()
                .push(Some(value.to_string()));
        } else {
            positionals.push(token);
        }
    }

    let mut bound = BoundArgs::default();
    bind_positionals(recipe, &positionals, &mut bound)?;
    bind_flags(recipe, flag_values, &mut bound)?;
    Ok(bound)
}

fn bind_positionals(
    recipe: &Recipe,
    values: &[&str],
    bound: &mut BoundArgs,
) -> Result<(), ArgError> {
    let mut remaining = values.iter().copied();

    for spec in &recipe.positionals {
        if spec.variadic {
            let rest: Vec<&str> = remaining.by_ref().collect();
            if rest.is_empty() {
                if spec.required {
                    return Err(ArgError::MissingPositional {
                        name: spec.name.clone(),
                    });
                }
                if let Some(default) = &spec.default {
                    bound.positionals.insert(spec.name.clone(), default.clone());
                }
                continue;
            }
            for value in &rest {
                check_constraints(spec, value)?;
            }
            bound.positionals.insert(
                spec.name.clone(),
                Variable::from(rest.iter().map(|v| Variable::from(*v)).collect::<Vec<_>>()),
            );
            continue;
        }

        match remaining.next() {
            Some(value) => {
                check_constraints(spec, value)?;
                bound
                    .positionals
                    .insert(spec.name.clone(), Variable::from(value));
            }
            None if spec.required => {
                return Err(ArgError::MissingPositional {
                    name: spec.name.clone(),
                });
            }
            None => {
                if let Some(default) = &spec.default {
                    bound.positionals.insert(spec.name.clone(), default.clone());
                }
            }
        }
    }

    if let Some(extra) = remaining.next() {
        return Err(ArgError::UnexpectedPositional {
            value: extra.to_string(),
        });
    }
    Ok(())
}

fn check_constraints(spec: &crate::recipe::PositionalArg, value: &str) -> Result<(), ArgError> {
    if !spec.one_of.is_empty() && !spec.one_of.iter().any(|allowed| allowed == value) {
        return Err(ArgError::NotOneOf {
            name: spec.name.clone(),
            value: value.to_string(),
            allowed: spec.one_of.clone(),
        });
    }
    if let Some(pattern) = &spec.pattern {
        // Validation guarantees the pattern compiles.
        let re = regex::Regex::new(pattern).map_err(|_| ArgError::PatternMismatch {
            name: spec.name.clone(),
            value: value.to_string(),
            pattern: pattern.clone(),
        })?;
        if !re.is_match(value) {
            return Err(ArgError::PatternMismatch {
                name: spec.name.clone(),
                value: value.to_string(),
                pattern: pattern.clone(),
            });
        }
    }
    Ok(())
}

fn bind_flags(
    recipe: &Recipe,
    mut given: IndexMap<String, Vec<Option<String>>>,
    bound: &mut BoundArgs,
) -> Result<(), ArgError> {
    for (name, flag) in &recipe.flags {
        match given.swap_remove(name) {
            Some(occurrences) => {
                let value = parse_flag(name, flag, &occurrences)?;
                bound.flags.insert(name.clone(), value);
            }
            None => {
                if let Some(default) = &flag.default {
                    bound.flags.insert(name.clone(), default.clone());
                } else if flag.kind == FlagType::Bool {
                    bound.flags.insert(name.clone(), Variable::from(false));
                }
            }
        }
    }
    Ok(())
}

fn parse_flag(name: &str, flag: &Flag, occurrences: &[Option<String>]) -> Result<Variable, ArgError> {
    let last = occurrences.last().expect("at least one occurrence");

    match flag.kind {
        FlagType::Bool => match last.as_deref() {
            None => Ok(Variable::from(true)),
            Some(text) => parse_bool(text).map(Variable::from).ok_or_else(|| {
                ArgError::InvalidFlagValue {
                    name: name.to_string(),
                    value: text.to_string(),
                    expected: "bool",
                }
            }),
        },
        FlagType::Int => {
            let text = last.as_deref().ok_or_else(|| ArgError::MissingFlagValue {
                name: name.to_string(),
            })?;
            text.parse::<i64>()
                .map(Variable::from)
                .map_err(|_| ArgError::InvalidFlagValue {
                    name: name.to_string(),
                    value: text.to_string(),
                    expected: "int",
                })
        }
        FlagType::String => {
            let text = last.as_deref().ok_or_else(|| ArgError::MissingFlagValue {
                name: name.to_string(),
            })?;
            Ok(Variable::from(text))
        }
        FlagType::StringList => {
            let mut items = Vec::with_capacity(occurrences.len());
            for occurrence in occurrences {
                let text = occurrence
                    .as_deref()
                    .ok_or_else(|| ArgError::MissingFlagValue {
                        name: name.to_string(),
                    })?;
                items.push(Variable::from(text));
            }
            Ok(Variable::from(items))
        }
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
