//! # `gcloud`-backed fleet.
//!
//! [`GcloudFleet`] shells out to `gcloud compute tpus` for every operation:
//!
//! | operation         | command                                                          |
//! |-------------------|------------------------------------------------------------------|
//! | `resource_exists` | `list --zone - --project P --format json(name)`                  |
//! | `resource_state`  | `describe NAME --zone Z --project P --format json`               |
//! | `create_resource` | `create NAME ... --network N --version V --accelerator-type T-S` |
//! | `delete_resource` | `delete NAME --zone Z --project P --quiet`                       |
//!
//! Authentication is whatever the local `gcloud` installation is logged in as.

use std::ffi::OsString;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::{FleetControl, ResourceState};
use crate::error::ControllerError;
use crate::resource::ResourceSpec;

/// Fleet that drives the `gcloud` CLI.
#[derive(Clone, Debug)]
pub struct GcloudFleet {
    program: OsString,
    network: String,
    async_create: bool,
}

impl Default for GcloudFleet {
    fn default() -> Self {
        Self {
            program: OsString::from("gcloud"),
            network: "default".to_string(),
            async_create: true,
        }
    }
}

/// Exit code and trimmed stderr of a failed command.
type Failure = (Option<i32>, String);

#[derive(Debug, Deserialize)]
struct NodeName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct NodeDescription {
    #[serde(default)]
    state: Option<String>,
}

impl GcloudFleet {
    /// Uses `gcloud` from `PATH` and the `default` network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the CLI binary.
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    /// Overrides the VPC network.
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// Whether `create` returns before the operation finishes (default `true`).
    pub fn with_async_create(mut self, async_create: bool) -> Self {
        self.async_create = async_create;
        self
    }

    fn list_args(project: &str) -> Vec<String> {
        [
            "compute", "tpus", "list", "--zone", "-", "--project", project, "--format",
            "json(name)",
        ]
        .map(String::from)
        .to_vec()
    }

    fn describe_args(name: &str, zone: &str, project: &str) -> Vec<String> {
        [
            "compute", "tpus", "describe", name, "--zone", zone, "--project", project,
            "--format", "json",
        ]
        .map(String::from)
        .to_vec()
    }

    fn create_args(&self, spec: &ResourceSpec) -> Vec<String> {
        let mut args: Vec<String> = [
            "compute",
            "tpus",
            "create",
            spec.name.as_str(),
            "--zone",
            spec.zone.as_str(),
            "--project",
            spec.project.as_str(),
            "--network",
            self.network.as_str(),
            "--version",
            spec.software_version.as_str(),
            "--accelerator-type",
        ]
        .map(String::from)
        .to_vec();
        args.push(spec.accelerator());
        if spec.preemptible {
            args.push("--preemptible".into());
        }
        if self.async_create {
            args.push("--async".into());
        }
        args
    }

    fn delete_args(name: &str, zone: &str, project: &str) -> Vec<String> {
        [
            "compute", "tpus", "delete", name, "--zone", zone, "--project", project, "--quiet",
        ]
        .map(String::from)
        .to_vec()
    }

    fn render(&self, args: &[String]) -> String {
        format!("{} {}", self.program.to_string_lossy(), args.join(" "))
    }

    /// Runs one command. `Ok(Err(..))` is a non-zero exit with its code and stderr.
    async fn exec(&self, args: &[String]) -> Result<Result<String, Failure>, ControllerError> {
        let command = self.render(args);
        tracing::debug!(%command, "running fleet command");

        let out = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ControllerError::Spawn {
                command: command.clone(),
                source,
            })?;

        if out.status.success() {
            Ok(Ok(String::from_utf8_lossy(&out.stdout).into_owned()))
        } else {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            Ok(Err((out.status.code(), stderr)))
        }
    }

    async fn run(&self, args: &[String]) -> Result<String, ControllerError> {
        self.exec(args).await?.map_err(|(code, stderr)| ControllerError::Command {
            command: self.render(args),
            code,
            stderr,
        })
    }
}

fn is_not_found(stderr: &str) -> bool {
    stderr.contains("NOT_FOUND") || stderr.to_ascii_lowercase().contains("not found")
}

fn parse_names(command: &str, stdout: &str) -> Result<Vec<String>, ControllerError> {
    let nodes: Vec<NodeName> = serde_json::from_str(stdout).map_err(|e| ControllerError::Parse {
        command: command.to_string(),
        reason: e.to_string(),
    })?;
    // Full resource paths: projects/P/locations/Z/nodes/NAME
    Ok(nodes
        .into_iter()
        .map(|n| match n.name.rfind('/') {
            Some(i) => n.name[i + 1..].to_string(),
            None => n.name,
        })
        .collect())
}

fn parse_state(command: &str, stdout: &str) -> Result<ResourceState, ControllerError> {
    let node: NodeDescription =
        serde_json::from_str(stdout).map_err(|e| ControllerError::Parse {
            command: command.to_string(),
            reason: e.to_string(),
        })?;
    node.state
        .as_deref()
        .map(ResourceState::parse)
        .ok_or_else(|| ControllerError::Parse {
            command: command.to_string(),
            reason: "missing `state` field".into(),
        })
}

#[async_trait]
impl FleetControl for GcloudFleet {
    async fn resource_exists(&self, name: &str, project: &str) -> Result<bool, ControllerError> {
        let args = Self::list_args(project);
        let stdout = self.run(&args).await?;
        let names = parse_names(&self.render(&args), &stdout)?;
        Ok(names.iter().any(|n| n == name))
    }

    async fn create_resource(&self, spec: &ResourceSpec) -> Result<(), ControllerError> {
        let args = self.create_args(spec);
        tracing::info!(command = %self.render(&args), "creating resource");
        self.run(&args).await.map(drop)
    }

    async fn delete_resource(
        &self,
        name: &str,
        zone: &str,
        project: &str,
    ) -> Result<(), ControllerError> {
        let args = Self::delete_args(name, zone, project);
        tracing::info!(command = %self.render(&args), "deleting resource");
        match self.exec(&args).await? {
            Ok(_) => Ok(()),
            Err((_, stderr)) if is_not_found(&stderr) => Ok(()),
            Err((code, stderr)) => Err(ControllerError::Command {
                command: self.render(&args),
                code,
                stderr,
            }),
        }
    }

    async fn resource_state(
        &self,
        name: &str,
        zone: &str,
        project: &str,
    ) -> Result<Option<ResourceState>, ControllerError> {
        let args = Self::describe_args(name, zone, project);
        match self.exec(&args).await? {
            Ok(stdout) => parse_state(&self.render(&args), &stdout).map(Some),
            Err((_, stderr)) if is_not_found(&stderr) => Ok(None),
            Err((code, stderr)) => Err(ControllerError::Command {
                command: self.render(&args),
                code,
                stderr,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::TopologySize;

    #[test]
    fn test_create_args() {
        let fleet = GcloudFleet::new();
        let spec = ResourceSpec::for_tests("megatron", TopologySize::V256);
        let line = fleet.create_args(&spec).join(" ");
        assert_eq!(
            line,
            "compute tpus create megatron --zone europe-west4-a --project research \
             --network default --version 1.15.2 --accelerator-type v3-256 --preemptible --async"
        );

        let on_demand = ResourceSpec::for_tests("chonk", TopologySize::V8);
        let args = fleet.with_async_create(false).create_args(&on_demand);
        assert!(!args.iter().any(|a| a == "--preemptible" || a == "--async"));
        assert!(args.iter().any(|a| a == "v3-8"));
    }

    #[test]
    fn test_parse_names_strips_paths() {
        let out = r#"[{"name": "projects/research/locations/europe-west4-a/nodes/simon"},
                     {"name": "james"}]"#;
        assert_eq!(parse_names("list", out).unwrap(), vec!["simon", "james"]);
        assert_eq!(
            parse_names("list", "nope").unwrap_err().as_label(),
            "controller_parse"
        );
    }

    #[test]
    fn test_parse_state() {
        let out = r#"{"name": "x", "state": "PREEMPTED", "health": "HEALTHY"}"#;
        assert_eq!(parse_state("d", out).unwrap(), ResourceState::Preempted);
        assert!(parse_state("d", "{}").is_err());
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found("ERROR: (gcloud.compute.tpus.describe) NOT_FOUND: Resource"));
        assert!(is_not_found("Resource not found"));
        assert!(!is_not_found("PERMISSION_DENIED"));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let fleet = GcloudFleet::new().with_program("/definitely/not/gcloud");
        let err = fleet.resource_exists("x", "p").await.unwrap_err();
        assert_eq!(err.as_label(), "controller_spawn");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_program_is_command_error() {
        let fleet = GcloudFleet::new().with_program("false");
        let err = fleet.resource_exists("x", "p").await.unwrap_err();
        match err {
            ControllerError::Command { code, .. } => assert_eq!(code, Some(1)),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
