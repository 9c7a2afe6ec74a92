//! Content-addressed recipe result cache.
//!
//! Execution of a recipe with a `cache_key` is gated on a marker file whose
//! name is a truncated SHA-256 of the rendered key. Markers record when and
//! for which key they were written; validity is bounded by an age window.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use drun_jinja::{ExecutionContext, Jinja, TemplateError};
use drun_recipe::Recipe;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Markers older than this are stale.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Hex digits of the key hash used for marker file names.
const MARKER_NAME_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Rendering the cache key failed; callers treat this as a template
    /// error, not a cache miss.
    #[error(transparent)]
    Render(#[from] TemplateError),

    /// Filesystem trouble; callers log and continue.
    #[error("cache i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Marker counts reported by [`CacheManager::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    pub fresh: usize,
}

/// Gates per-recipe execution by a rendered fingerprint.
///
/// Safe for concurrent use across workers: distinct keys touch distinct
/// files, and same-key writers race only on an idempotent marker where
/// last-writer-wins is fine.
#[derive(Debug)]
pub struct CacheManager {
    dir: PathBuf,
    enabled: bool,
    max_age: Duration,
    /// Spec-level key fragments appended to every recipe key.
    extra_keys: Vec<String>,
}

impl CacheManager {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            enabled,
            max_age: DEFAULT_MAX_AGE,
            extra_keys: Vec::new(),
        }
    }

    /// Override the staleness window.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Spec-level `cache.keys` templates, rendered and appended to every
    /// recipe key.
    pub fn with_extra_keys(mut self, keys: Vec<String>) -> Self {
        self.extra_keys = keys;
        self
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Render the full cache key for a recipe, `None` when the recipe
    /// declares no `cache_key` or caching is disabled.
    pub fn rendered_key(
        &self,
        name: &str,
        recipe: &Recipe,
        ctx: &ExecutionContext,
        jinja: &Jinja,
    ) -> Result<Option<String>, TemplateError> {
        if !self.enabled {
            return Ok(None);
        }
        let Some(template) = &recipe.cache_key else {
            return Ok(None);
        };
        let mut key = jinja.render_named(&format!("cache_key:{name}"), template, ctx)?;
        for (index, extra) in self.extra_keys.iter().enumerate() {
            let fragment =
                jinja.render_named(&format!("cache.keys[{index}]"), extra, ctx)?;
            key.push('|');
            key.push_str(&fragment);
        }
        Ok(Some(key))
    }

    /// True when a fresh marker exists for the rendered key. Always false
    /// when caching is disabled.
    pub fn is_valid(&self, key: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let path = self.marker_path(key);
        match fs_err::metadata(&path) {
            Ok(metadata) => match metadata.modified() {
                Ok(mtime) => {
                    SystemTime::now()
                        .duration_since(mtime)
                        .map(|age| age <= self.max_age)
                        .unwrap_or(true) // marker from the future: keep it
                }
                Err(e) => {
                    tracing::warn!("cannot read mtime of {}: {e}", path.display());
                    false
                }
            },
            Err(_) => false,
        }
    }

    /// Write the completion marker atomically (temp file + rename). A
    /// no-op when caching is disabled.
    pub fn mark_complete(&self, key: &str) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }
        fs_err::create_dir_all(&self.dir)?;

        let body = format!(
            "cached_at: {}\ncache_key: {}\n",
            chrono::Utc::now().to_rfc3339(),
            key
        );
        let temp = tempfile::NamedTempFile::new_in(&self.dir)?;
        fs_err::write(temp.path(), body)?;
        temp.persist(self.marker_path(key))
            .map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }

    /// Remove the cache directory.
    pub fn clear(&self) -> Result<(), CacheError> {
        if self.dir.exists() {
            fs_err::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }

    /// Total markers and how many are within the age window.
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats { total: 0, fresh: 0 };
        if !self.dir.exists() {
            return Ok(stats);
        }
        for entry in fs_err::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path().extension().is_none_or(|ext| ext != "cache") {
                continue;
            }
            stats.total += 1;
            if let Ok(mtime) = entry.metadata()?.modified()
                && SystemTime::now()
                    .duration_since(mtime)
                    .map(|age| age <= self.max_age)
                    .unwrap_or(true)
            {
                stats.fresh += 1;
            }
        }
        Ok(stats)
    }

    fn marker_path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.dir.join(format!("{}.cache", &digest[..MARKER_NAME_LEN]))
    }
}

/// Default cache directory relative to the workspace.
pub fn default_cache_dir(base: &Path) -> PathBuf {
    base.join(".drun").join("cache")
}
