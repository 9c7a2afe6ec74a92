//! Shell configuration and the selection chain.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OS tag for Linux shell defaults.
pub const OS_LINUX: &str = "linux";
/// OS tag for macOS shell defaults.
pub const OS_DARWIN: &str = "darwin";
/// OS tag for Windows shell defaults.
pub const OS_WINDOWS: &str = "windows";

/// A shell invocation: the command path and the arguments placed before the
/// script text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Path or name of the shell executable.
    pub command: String,
    /// Arguments passed before the script text.
    #[serde(default)]
    pub args: Vec<String>,
}

impl ShellConfig {
    /// Assemble the full argv: `[command, args…, script]`.
    pub fn command_line(&self, script: &str) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        argv.push(self.command.clone());
        argv.extend(self.args.iter().cloned());
        argv.push(script.to_string());
        argv
    }
}

/// No shell configuration resolves for the requested (preference, OS) pair.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("no shell configuration resolves for preference `{preference}` on OS `{os}`")]
    NoShell { preference: String, os: String },
}

/// Built-in shell defaults per OS tag.
pub fn builtin_shell(os: &str) -> Option<ShellConfig> {
    match os {
        OS_LINUX => Some(ShellConfig {
            command: "/bin/sh".to_string(),
            args: vec!["-ceu".to_string()],
        }),
        OS_DARWIN => Some(ShellConfig {
            command: "/bin/zsh".to_string(),
            args: vec!["-ceu".to_string()],
        }),
        OS_WINDOWS => Some(ShellConfig {
            command: "pwsh".to_string(),
            args: vec!["-NoLogo".to_string(), "-Command".to_string()],
        }),
        _ => None,
    }
}

/// Resolve a shell for a recipe.
///
/// Lookup order: explicit per-name config, then the target OS default
/// (configured or built-in), then the Linux default. An empty preference or
/// `auto` skips straight to the OS default.
pub fn select_shell(
    configs: &IndexMap<String, ShellConfig>,
    preference: &str,
    target_os: &str,
) -> Result<ShellConfig, ShellError> {
    if !preference.is_empty() && preference != "auto" {
        if let Some(config) = configs.get(preference) {
            return Ok(config.clone());
        }
    }

    configs
        .get(target_os)
        .cloned()
        .or_else(|| builtin_shell(target_os))
        .or_else(|| configs.get(OS_LINUX).cloned())
        .or_else(|| builtin_shell(OS_LINUX))
        .ok_or_else(|| ShellError::NoShell {
            preference: preference.to_string(),
            os: target_os.to_string(),
        })
}
