//! Shell quoting rules.

/// Quote a string for a POSIX shell: wrap in single quotes and escape
/// embedded single quotes with the `'\''` idiom.
pub fn posix(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Quote a string for PowerShell: wrap in single quotes, doubling embedded
/// single quotes.
pub fn powershell(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
