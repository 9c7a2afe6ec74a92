//! Best-effort translation of POSIX shell idioms to PowerShell.
//!
//! Only a minimal set of forms is translated: `export NAME=value`,
//! `cmdA && cmdB` and `cmdA || cmdB`. Processing is line-oriented; blank
//! lines and lines matching no rule pass through unchanged. Authors writing
//! Windows recipes should prefer native PowerShell.

use crate::quote;

/// Translate a whole script, line by line.
pub fn to_powershell(script: &str) -> String {
    script
        .lines()
        .map(translate_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn translate_line(line: &str) -> String {
    let trimmed = line.trim_start();

    if let Some(assignment) = trimmed.strip_prefix("export ")
        && let Some((name, value)) = assignment.split_once('=')
        && is_env_name(name)
    {
        return format!("$env:{}={}", name, quote::powershell(unquote(value)));
    }

    if let Some((head, tail)) = line.split_once(" && ") {
        return format!(
            "{}; if ($LASTEXITCODE -ne 0) {{ exit $LASTEXITCODE }}; {}",
            head,
            translate_line(tail)
        );
    }

    if let Some((head, tail)) = line.split_once(" || ") {
        return format!(
            "{}; if ($LASTEXITCODE -eq 0) {{ }} else {{ {} }}",
            head,
            translate_line(tail)
        );
    }

    line.to_string()
}

fn is_env_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

/// Strip one matching pair of surrounding quotes so the value can be
/// re-quoted for PowerShell.
fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'\'' || bytes[0] == b'"')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}
