//! Structural validation of a merged specification.

use crate::error::ConfigError;
use crate::spec::Specification;

pub fn validate(spec: &Specification) -> Result<(), ConfigError> {
    if spec.recipes.is_empty() {
        return Err(ConfigError::validation("no recipes defined"));
    }

    for (name, recipe) in &spec.recipes {
        if recipe.run.is_empty() && recipe.deps.is_empty() {
            return Err(ConfigError::validation(format!(
                "recipe `{name}` must define a run step or at least one dependency"
            )));
        }

        for dep in &recipe.deps {
            if spec.resolve_recipe(dep).is_none() {
                return Err(ConfigError::validation(format!(
                    "recipe `{name}` depends on unknown recipe `{dep}`"
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for (index, positional) in recipe.positionals.iter().enumerate() {
            if !seen.insert(positional.name.as_str()) {
                return Err(ConfigError::validation(format!(
                    "recipe `{name}` declares positional `{}` more than once",
                    positional.name
                )));
            }
            if positional.variadic && index + 1 != recipe.positionals.len() {
                return Err(ConfigError::validation(format!(
                    "recipe `{name}`: variadic positional `{}` must be last",
                    positional.name
                )));
            }
            if let Some(pattern) = &positional.pattern
                && regex::Regex::new(pattern).is_err()
            {
                return Err(ConfigError::validation(format!(
                    "recipe `{name}`: positional `{}` has invalid pattern `{pattern}`",
                    positional.name
                )));
            }
        }

        for (flag_name, flag) in &recipe.flags {
            if let Some(default) = &flag.default
                && !flag.kind.admits(default)
            {
                return Err(ConfigError::validation(format!(
                    "recipe `{name}`: default for flag `{flag_name}` is not a valid {}",
                    flag.kind.name()
                )));
            }
        }

        for (dimension, values) in &recipe.matrix {
            if values.is_empty() {
                return Err(ConfigError::validation(format!(
                    "recipe `{name}`: matrix dimension `{dimension}` has no values"
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(yaml: &str) -> Specification {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn empty_spec_is_rejected() {
        let err = validate(&spec("{}")).unwrap_err();
        assert!(err.to_string().contains("no recipes"));
    }

    #[test]
    fn recipe_needs_step_or_deps() {
        let err = validate(&spec("recipes:\n  idle: { help: nothing }\n")).unwrap_err();
        assert!(err.to_string().contains("idle"));

        validate(&spec(
            "recipes:\n  a: { run: echo hi }\n  group: { deps: [a] }\n",
        ))
        .unwrap();
    }

    #[test]
    fn unknown_dep_is_rejected() {
        let err = validate(&spec("recipes:\n  a: { run: echo hi, deps: [ghost] }\n")).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn dep_may_use_an_alias() {
        validate(&spec(
            "recipes:\n  build: { run: echo hi, aliases: [b] }\n  all: { deps: [b] }\n",
        ))
        .unwrap();
    }

    #[test]
    fn duplicate_positional_names_are_rejected() {
        let err = validate(&spec(
            "recipes:\n  a:\n    run: echo hi\n    positionals:\n      - { name: x }\n      - { name: x }\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn variadic_must_be_last() {
        let err = validate(&spec(
            "recipes:\n  a:\n    run: echo hi\n    positionals:\n      - { name: rest, variadic: true }\n      - { name: x }\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("must be last"));
    }

    #[test]
    fn flag_default_must_match_type() {
        let err = validate(&spec(
            "recipes:\n  a:\n    run: echo hi\n    flags:\n      count: { type: int, default: lots }\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("count"));

        validate(&spec(
            "recipes:\n  a:\n    run: echo hi\n    flags:\n      count: { type: int, default: 3 }\n",
        ))
        .unwrap();
    }

    #[test]
    fn empty_matrix_dimension_is_rejected() {
        let err = validate(&spec(
            "recipes:\n  a:\n    run: echo hi\n    matrix: { os: [] }\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("os"));
    }

    #[test]
    fn invalid_positional_pattern_is_rejected() {
        let err = validate(&spec(
            "recipes:\n  a:\n    run: echo hi\n    positionals:\n      - { name: v, pattern: '([' }\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("pattern"));
    }
}
