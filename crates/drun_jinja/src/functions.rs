//! Environment probes and status-echo helpers exposed to templates.

use std::path::Path;
use std::process::{Command, Stdio};

use drun_script::quote;

/// CI detection: any of the common CI marker variables being set counts.
pub fn is_ci() -> bool {
    const MARKERS: &[&str] = &[
        "CI",
        "GITHUB_ACTIONS",
        "GITLAB_CI",
        "BUILDKITE",
        "CIRCLECI",
        "JENKINS_URL",
        "TRAVIS",
    ];
    MARKERS.iter().any(|name| std::env::var_os(name).is_some())
}

/// Infer the package manager for a directory from its marker files.
pub fn package_manager(dir: &Path) -> String {
    const MARKERS: &[(&str, &str)] = &[
        ("pnpm-lock.yaml", "pnpm"),
        ("yarn.lock", "yarn"),
        ("bun.lockb", "bun"),
        ("package-lock.json", "npm"),
        ("package.json", "npm"),
        ("Cargo.toml", "cargo"),
        ("go.mod", "go"),
        ("pyproject.toml", "pip"),
        ("requirements.txt", "pip"),
        ("Gemfile", "bundler"),
        ("composer.json", "composer"),
    ];
    for (marker, manager) in MARKERS {
        if dir.join(marker).exists() {
            return (*manager).to_string();
        }
    }
    String::new()
}

/// Format the current local time with a strftime layout. Returns `None` for
/// layouts chrono cannot parse, so callers can report the bad layout
/// instead of panicking inside `Display`.
pub fn format_now(layout: &str) -> Option<String> {
    use chrono::format::{Item, StrftimeItems};

    let items: Vec<Item<'_>> = StrftimeItems::new(layout).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }
    Some(
        chrono::Local::now()
            .format_with_items(items.into_iter())
            .to_string(),
    )
}

/// A single `echo` command printing a symbol-annotated status message.
pub fn echo_command(symbol: &str, message: &str) -> String {
    format!("echo {}", quote::posix(&format!("{symbol} {message}")))
}

fn git_output(args: &[&str]) -> Option<String> {
    let out = Command::new("git")
        .args(args)
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

/// Current branch name, empty outside a repository.
pub fn git_branch() -> String {
    git_output(&["rev-parse", "--abbrev-ref", "HEAD"]).unwrap_or_default()
}

/// Full HEAD commit hash, empty outside a repository.
pub fn git_commit() -> String {
    git_output(&["rev-parse", "HEAD"]).unwrap_or_default()
}

/// Abbreviated HEAD commit hash, empty outside a repository.
pub fn git_short_commit() -> String {
    git_output(&["rev-parse", "--short", "HEAD"]).unwrap_or_default()
}

/// True when the work tree has uncommitted changes.
pub fn git_dirty() -> bool {
    git_output(&["status", "--porcelain"])
        .map(|out| !out.is_empty())
        .unwrap_or(false)
}
