//! Docker tooling probes.
//!
//! `dockerCompose()` and `dockerBuildx()` return an object whose string
//! form is the discovered command and which answers `is_running()` for the
//! daemon, so recipes can write both
//! `{{ dockerCompose() }} up -d` and
//! `{% if dockerCompose().is_running() %}…{% endif %}`.

use std::process::{Command, Stdio};
use std::sync::Arc;

use minijinja::Value;
use minijinja::value::Object;

#[derive(Debug)]
pub struct DockerTool {
    command: String,
}

fn docker_subcommand_works(args: &[&str]) -> bool {
    Command::new("docker")
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

impl DockerTool {
    /// Discover the compose command: the `docker compose` plugin when
    /// available, the legacy `docker-compose` binary otherwise, empty when
    /// neither exists.
    pub fn compose() -> Self {
        let command = if which::which("docker").is_ok() && docker_subcommand_works(&["compose", "version"])
        {
            "docker compose"
        } else if which::which("docker-compose").is_ok() {
            "docker-compose"
        } else {
            ""
        };
        Self {
            command: command.to_string(),
        }
    }

    /// Discover the buildx plugin, empty when unavailable.
    pub fn buildx() -> Self {
        let command =
            if which::which("docker").is_ok() && docker_subcommand_works(&["buildx", "version"]) {
                "docker buildx"
            } else {
                ""
            };
        Self {
            command: command.to_string(),
        }
    }

    fn daemon_running() -> bool {
        docker_subcommand_works(&["info"])
    }
}

impl Object for DockerTool {
    fn call_method(
        self: &Arc<Self>,
        _state: &minijinja::State,
        name: &str,
        _args: &[Value],
    ) -> Result<Value, minijinja::Error> {
        match name {
            "is_running" | "isRunning" => Ok(Value::from(Self::daemon_running())),
            _ => Err(minijinja::Error::from(minijinja::ErrorKind::UnknownMethod)),
        }
    }

    fn render(self: &Arc<Self>, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.command)
    }
}
