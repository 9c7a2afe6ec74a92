//! Loading, include merging and memoization.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use sha2::{Digest, Sha256};

use crate::error::ConfigError;
use crate::spec::Specification;
use crate::validate::validate;

/// Candidate file names probed when no `--file` is given, in order.
pub const DEFAULT_CANDIDATES: &[&str] =
    &["drun.yml", "drun.yaml", ".drun/drun.yml", ".drun/drun.yaml"];

/// Hook supplying the raw bytes of a remote include. Transport (HTTP, Git,
/// its byte cache) lives outside this crate; the loader only needs
/// "given URI, return bytes".
pub trait IncludeFetcher: Send + Sync {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, String>;
}

/// Default fetcher: remote includes are rejected.
#[derive(Debug, Default)]
pub struct NoRemoteIncludes;

impl IncludeFetcher for NoRemoteIncludes {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>, String> {
        Err(format!("no remote fetcher configured for `{uri}`"))
    }
}

struct MemoEntry {
    mtime: SystemTime,
    digest: [u8; 32],
    spec: Arc<Specification>,
}

/// Materializes validated specifications from a root file plus transitive
/// includes, memoizing by (path, mtime, content hash).
pub struct Loader {
    base_dir: PathBuf,
    fetcher: Arc<dyn IncludeFetcher>,
    memo: Mutex<HashMap<PathBuf, MemoEntry>>,
}

impl Loader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            fetcher: Arc::new(NoRemoteIncludes),
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the remote-include hook.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn IncludeFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Load a specification. With `file` set, that exact file is used;
    /// otherwise the default candidates are probed in the base directory.
    pub fn load(&self, file: Option<&Path>) -> Result<Arc<Specification>, ConfigError> {
        let path = self.resolve_root(file)?;

        let metadata = fs_err::metadata(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let mtime = metadata.modified().map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let bytes = fs_err::read(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let digest: [u8; 32] = Sha256::digest(&bytes).into();

        {
            let memo = self.memo.lock().expect("loader memo poisoned");
            if let Some(entry) = memo.get(&path)
                && entry.mtime == mtime
                && entry.digest == digest
            {
                tracing::debug!("using memoized spec for {}", path.display());
                return Ok(entry.spec.clone());
            }
        }

        let mut stack = HashSet::new();
        let mut spec = self.load_merged(&path, &bytes, &mut stack)?;
        apply_defaults(&mut spec);
        validate(&spec)?;

        let spec = Arc::new(spec);
        self.memo.lock().expect("loader memo poisoned").insert(
            path,
            MemoEntry {
                mtime,
                digest,
                spec: spec.clone(),
            },
        );
        Ok(spec)
    }

    fn resolve_root(&self, file: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(file) = file {
            let path = self.absolutize(file);
            if !path.is_file() {
                return Err(ConfigError::NotFound {
                    candidates: vec![path.display().to_string()],
                });
            }
            return Ok(path);
        }

        for candidate in DEFAULT_CANDIDATES {
            let path = self.base_dir.join(candidate);
            if path.is_file() {
                return Ok(path);
            }
        }
        Err(ConfigError::NotFound {
            candidates: DEFAULT_CANDIDATES
                .iter()
                .map(|c| self.base_dir.join(c).display().to_string())
                .collect(),
        })
    }

    fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Parse one file and merge its includes, depth-first. Includes act as
    /// defaults: they are merged first (later includes overriding earlier
    /// ones) and the file's own content is overlaid last, so the parent
    /// wins on conflicts at leaf level.
    fn load_merged(
        &self,
        path: &Path,
        bytes: &[u8],
        stack: &mut HashSet<PathBuf>,
    ) -> Result<Specification, ConfigError> {
        let raw: Specification =
            serde_yaml::from_slice(bytes).map_err(|source| ConfigError::Syntax {
                path: path.to_path_buf(),
                source,
            })?;

        if raw.include.is_empty() {
            return Ok(raw);
        }

        if !stack.insert(path.to_path_buf()) {
            return Err(ConfigError::include(
                path.display().to_string(),
                "include cycle detected",
            ));
        }

        let parent_dir = path.parent().unwrap_or(Path::new("."));
        let mut merged = Specification::default();

        for pattern in &raw.include {
            let (namespace, target) = split_namespace(pattern);

            if target.contains("://") {
                let bytes = self
                    .fetcher
                    .fetch(target)
                    .map_err(|message| ConfigError::include(pattern.clone(), message))?;
                let child: Specification = serde_yaml::from_slice(&bytes).map_err(|e| {
                    ConfigError::include(pattern.clone(), format!("parse failure: {e}"))
                })?;
                // Remote fragments are taken as-is; their own includes are
                // not chased (there is no directory to resolve them in).
                merge(&mut merged, child, namespace);
                continue;
            }

            let glob_pattern = parent_dir.join(target);
            let glob_pattern = glob_pattern.to_str().ok_or_else(|| {
                ConfigError::include(pattern.clone(), "pattern is not valid UTF-8")
            })?;
            let matches = glob::glob(glob_pattern)
                .map_err(|e| ConfigError::include(pattern.clone(), e.to_string()))?;

            let mut paths: Vec<PathBuf> = Vec::new();
            for entry in matches {
                paths.push(
                    entry.map_err(|e| ConfigError::include(pattern.clone(), e.to_string()))?,
                );
            }
            paths.sort();
            if paths.is_empty() {
                tracing::debug!("include pattern `{pattern}` matched no files");
            }

            for include_path in paths {
                let child_bytes = fs_err::read(&include_path).map_err(|e| {
                    ConfigError::include(pattern.clone(), format!("{}: {e}", include_path.display()))
                })?;
                let child = self.load_merged(&include_path, &child_bytes, stack)?;
                merge(&mut merged, child, namespace);
            }
        }

        stack.remove(path);
        merge(&mut merged, raw, None);
        Ok(merged)
    }
}

/// Split an optional `NAME::` namespace prefix off an include pattern.
/// `NAME` must look like an identifier; a `scheme://…` URI is not a
/// namespace.
fn split_namespace(pattern: &str) -> (Option<&str>, &str) {
    if let Some((prefix, rest)) = pattern.split_once("::")
        && !rest.starts_with("//")
        && !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        (Some(prefix), rest)
    } else {
        (None, pattern)
    }
}

/// Merge `overlay` into `base`: maps key-union with overlay winning,
/// sequences append, scalars replace when set. With a namespace, overlay
/// recipes land under `NAME:<recipe>` and their intra-file deps and
/// aliases are rewritten to match; non-recipe sections merge unprefixed.
fn merge(base: &mut Specification, overlay: Specification, namespace: Option<&str>) {
    if overlay.version.is_some() {
        base.version = overlay.version;
    }
    base.shell.extend(overlay.shell);
    base.env.extend(overlay.env);
    base.vars.extend(overlay.vars);
    base.snippets.extend(overlay.snippets);
    base.secrets.extend(overlay.secrets);
    base.defaults.overlay(overlay.defaults);

    if overlay.cache.path.is_some() {
        base.cache.path = overlay.cache.path;
    }
    base.cache.keys.extend(overlay.cache.keys);
    base.lifecycle.pre_run.extend_from(&overlay.lifecycle.pre_run);
    base.lifecycle
        .post_run
        .extend_from(&overlay.lifecycle.post_run);

    let local_names: HashSet<String> = overlay.recipes.keys().cloned().collect();
    for (name, mut recipe) in overlay.recipes {
        let key = match namespace {
            Some(ns) => {
                for dep in &mut recipe.deps {
                    if local_names.contains(dep.as_str()) {
                        *dep = format!("{ns}:{dep}");
                    }
                }
                for alias in &mut recipe.aliases {
                    *alias = format!("{ns}:{alias}");
                }
                format!("{ns}:{name}")
            }
            None => name,
        };
        base.recipes.insert(key, recipe);
    }
}

/// Fill built-in shells and materialize per-recipe fallbacks.
fn apply_defaults(spec: &mut Specification) {
    for os in [
        drun_script::OS_LINUX,
        drun_script::OS_DARWIN,
        drun_script::OS_WINDOWS,
    ] {
        if !spec.shell.contains_key(os)
            && let Some(builtin) = drun_script::builtin_shell(os)
        {
            spec.shell.insert(os.to_string(), builtin);
        }
    }

    let working_dir = spec.defaults.working_dir().to_path_buf();
    let shell = spec.defaults.shell().to_string();
    let timeout = spec.defaults.timeout();
    for recipe in spec.recipes.values_mut() {
        recipe.working_dir.get_or_insert_with(|| working_dir.clone());
        recipe.shell.get_or_insert_with(|| shell.clone());
        recipe.timeout.get_or_insert(timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_file_lists_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Loader::new(dir.path());
        let err = loader.load(None).unwrap_err();
        match err {
            ConfigError::NotFound { candidates } => {
                assert_eq!(candidates.len(), DEFAULT_CANDIDATES.len())
            }
            other => panic!("expected NotFound, got {other}"),
        }
    }

    #[test]
    fn probes_default_candidates_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".drun/drun.yml", "recipes:\n  a: { run: echo hi }\n");
        let loader = Loader::new(dir.path());
        let spec = loader.load(None).unwrap();
        assert!(spec.recipes.contains_key("a"));
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Loader::new(dir.path());
        let err = loader.load(Some(Path::new("nope.yml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn yaml_syntax_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "drun.yml", "recipes: [not, a, map");
        let loader = Loader::new(dir.path());
        let err = loader.load(None).unwrap_err();
        assert!(matches!(err, ConfigError::Syntax { .. }));
        assert!(err.to_string().contains("drun.yml"));
    }

    #[test]
    fn includes_merge_and_parent_wins() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "common.yml",
            "vars:\n  owner: include\n  region: eu\nrecipes:\n  fmt: { run: echo fmt }\n",
        );
        write(
            dir.path(),
            "drun.yml",
            "include: [common.yml]\nvars:\n  owner: root\nrecipes:\n  build: { run: echo build }\n",
        );
        let loader = Loader::new(dir.path());
        let spec = loader.load(None).unwrap();

        assert_eq!(spec.vars["owner"].to_string(), "root");
        assert_eq!(spec.vars["region"].to_string(), "eu");
        assert!(spec.recipes.contains_key("fmt"));
        assert!(spec.recipes.contains_key("build"));
    }

    #[test]
    fn merging_an_include_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "common.yml",
            "vars:\n  region: eu\nrecipes:\n  fmt: { run: echo fmt }\n",
        );
        write(
            dir.path(),
            "once.yml",
            "include: [common.yml]\nrecipes:\n  build: { run: echo build }\n",
        );
        write(
            dir.path(),
            "twice.yml",
            "include: [common.yml, common.yml]\nrecipes:\n  build: { run: echo build }\n",
        );
        let loader = Loader::new(dir.path());
        let once = loader.load(Some(Path::new("once.yml"))).unwrap();
        let twice = loader.load(Some(Path::new("twice.yml"))).unwrap();

        assert_eq!(
            once.recipes.keys().collect::<Vec<_>>(),
            twice.recipes.keys().collect::<Vec<_>>()
        );
        assert_eq!(once.vars["region"].to_string(), twice.vars["region"].to_string());
    }

    #[test]
    fn namespaced_include_prefixes_recipes_and_rewrites_deps() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "ci.yml",
            "recipes:\n  build: { run: echo build }\n  test: { run: echo test, deps: [build] }\n",
        );
        write(
            dir.path(),
            "drun.yml",
            "include: ['ci::ci.yml']\nrecipes:\n  all: { deps: ['ci:test'] }\n",
        );
        let loader = Loader::new(dir.path());
        let spec = loader.load(None).unwrap();

        assert!(spec.recipes.contains_key("ci:build"));
        assert_eq!(spec.recipes["ci:test"].deps, vec!["ci:build"]);
    }

    #[test]
    fn include_globs_resolve_relative_to_the_including_file() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "sub/tasks/a.yml",
            "recipes:\n  a: { run: echo a }\n",
        );
        write(
            dir.path(),
            "sub/tasks/b.yml",
            "recipes:\n  b: { run: echo b }\n",
        );
        write(dir.path(), "sub/drun.yml", "include: ['tasks/*.yml']\nrecipes:\n  root: { deps: [a, b] }\n");
        let loader = Loader::new(dir.path());
        let spec = loader.load(Some(Path::new("sub/drun.yml"))).unwrap();
        assert!(spec.recipes.contains_key("a"));
        assert!(spec.recipes.contains_key("b"));
    }

    #[test]
    fn include_cycles_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yml", "include: [b.yml]\nrecipes:\n  a: { run: echo a }\n");
        write(dir.path(), "b.yml", "include: [a.yml]\nrecipes:\n  b: { run: echo b }\n");
        let loader = Loader::new(dir.path());
        let err = loader.load(Some(Path::new("a.yml"))).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn remote_includes_require_a_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "drun.yml",
            "include: ['https://example.com/tasks.yml']\nrecipes:\n  a: { run: echo a }\n",
        );
        let loader = Loader::new(dir.path());
        let err = loader.load(None).unwrap_err();
        assert!(matches!(err, ConfigError::Include { .. }));
    }

    #[test]
    fn remote_include_bytes_are_merged() {
        struct Fixed;
        impl IncludeFetcher for Fixed {
            fn fetch(&self, _uri: &str) -> Result<Vec<u8>, String> {
                Ok(b"recipes:\n  remote: { run: echo remote }\n".to_vec())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "drun.yml",
            "include: ['lib::https://example.com/tasks.yml']\nrecipes:\n  a: { run: echo a }\n",
        );
        let loader = Loader::new(dir.path()).with_fetcher(Arc::new(Fixed));
        let spec = loader.load(None).unwrap();
        assert!(spec.recipes.contains_key("lib:remote"));
    }

    #[test]
    fn defaults_materialize_onto_recipes() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "drun.yml",
            "defaults:\n  timeout: 5m\n  working_dir: srv\nrecipes:\n  a: { run: echo a }\n  b: { run: echo b, timeout: 10s }\n",
        );
        let loader = Loader::new(dir.path());
        let spec = loader.load(None).unwrap();
        assert_eq!(
            spec.recipes["a"].timeout,
            Some(std::time::Duration::from_secs(300))
        );
        assert_eq!(
            spec.recipes["b"].timeout,
            Some(std::time::Duration::from_secs(10))
        );
        assert_eq!(
            spec.recipes["a"].working_dir.as_deref(),
            Some(Path::new("srv"))
        );
        assert!(spec.shell.contains_key("linux"));
        assert!(spec.shell.contains_key("windows"));
    }

    #[test]
    fn memoization_returns_the_same_arc_until_the_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "drun.yml", "recipes:\n  a: { run: echo a }\n");
        let loader = Loader::new(dir.path());

        let first = loader.load(None).unwrap();
        let second = loader.load(None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // Rewrite with different content; the digest check invalidates even
        // if mtime granularity hides the change.
        fs::write(&path, "recipes:\n  a: { run: echo changed }\n").unwrap();
        let third = loader.load(None).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.recipes["a"].run.lines(), ["echo changed"]);
    }

    #[test]
    fn lifecycle_and_cache_keys_append_across_includes() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "base.yml",
            "cache:\n  keys: ['base']\nlifecycle:\n  pre_run: 'echo base-pre'\nrecipes:\n  x: { run: echo x }\n",
        );
        write(
            dir.path(),
            "drun.yml",
            "include: [base.yml]\ncache:\n  keys: ['root']\nlifecycle:\n  pre_run: 'echo root-pre'\nrecipes:\n  y: { run: echo y }\n",
        );
        let loader = Loader::new(dir.path());
        let spec = loader.load(None).unwrap();
        assert_eq!(spec.cache.keys, vec!["base", "root"]);
        assert_eq!(
            spec.lifecycle.pre_run.lines(),
            ["echo base-pre", "echo root-pre"]
        );
    }

    #[test]
    fn namespace_split_rules() {
        assert_eq!(split_namespace("ci::tasks/*.yml"), (Some("ci"), "tasks/*.yml"));
        assert_eq!(
            split_namespace("https://example.com/x.yml"),
            (None, "https://example.com/x.yml")
        );
        assert_eq!(
            split_namespace("lib::https://example.com/x.yml"),
            (Some("lib"), "https://example.com/x.yml")
        );
        assert_eq!(split_namespace("plain.yml"), (None, "plain.yml"));
    }
}
