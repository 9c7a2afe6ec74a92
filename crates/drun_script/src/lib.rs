//! Shell selection and script execution for drun.
//!
//! This crate resolves which shell runs a recipe script on a given target
//! OS, prepares the script text for that shell (including the best-effort
//! POSIX to PowerShell translation), and spawns the shell under a timeout
//! while streaming its merged output.

mod execution;
pub mod quote;
mod shell;
mod sink;
pub mod translate;

pub use execution::{ExecError, ExecRequest, run_script};
pub use shell::{OS_DARWIN, OS_LINUX, OS_WINDOWS, ShellConfig, ShellError, builtin_shell, select_shell};
pub use sink::{BufferSink, OutputSink, StdoutSink};
