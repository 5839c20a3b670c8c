use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::cluster::VmType;
use crate::errors::{ExecutionError, SnapshotError};

/// A `pvesh` invocation. Talking to the API through pvesh needs no
/// credentials on a cluster node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PveSh {
    method: String,
    path: String,
    options: Vec<(String, String)>,
}

impl PveSh {
    pub fn new(method: &str, path: impl Into<String>) -> Self {
        Self {
            method: method.to_lowercase(),
            path: path.into(),
            options: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new("get", path)
    }

    pub fn create(path: impl Into<String>) -> Self {
        Self::new("create", path)
    }

    pub fn set(path: impl Into<String>) -> Self {
        Self::new("set", path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new("delete", path)
    }

    /// Options are passed as `-<name> <value>` in insertion order.
    pub fn option(mut self, name: &str, value: impl ToString) -> Self {
        self.options.push((name.to_string(), value.to_string()));
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Arguments following the program name.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![self.method.clone(), self.path.clone()];
        for (name, value) in &self.options {
            args.push(format!("-{}", name));
            args.push(value.clone());
        }
        args
    }
}

impl fmt::Display for PveSh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pvesh {}", self.args().join(" "))
    }
}

/// Online migration of a guest from `source` to `target`.
pub fn migrate_vm(source: &str, vm_type: VmType, vmid: u32, target: &str) -> PveSh {
    PveSh::create(format!("/nodes/{}/{}/{}/migrate", source, vm_type, vmid))
        .option("target", target)
        .option("online", 1)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub return_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.return_code == 0
    }

    /// Parse stdout as JSON. Empty output is read as `T::default()`.
    pub fn json<T: DeserializeOwned + Default>(&self, path: &str) -> Result<T, SnapshotError> {
        if self.stdout.trim().is_empty() {
            return Ok(T::default());
        }

        serde_json::from_str(&self.stdout).map_err(|source| SnapshotError::Json {
            path: path.to_string(),
            source,
        })
    }
}

/// Runs [`PveSh`] commands with the local pvesh binary.
#[derive(Debug, Clone)]
pub struct PveshRunner {
    program: String,
}

impl Default for PveshRunner {
    fn default() -> Self {
        Self::new("pvesh")
    }
}

impl PveshRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the command to completion and capture its output.
    pub async fn run(&self, cmd: &PveSh) -> Result<CommandOutput, ExecutionError> {
        debug!(program = %self.program, args = ?cmd.args(), "running pvesh");

        let output = Command::new(&self.program)
            .args(cmd.args())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ExecutionError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let return_code = output.status.code().ok_or_else(|| ExecutionError::Terminated {
            program: self.program.clone(),
        })?;

        let out = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            return_code,
        };
        trace!(return_code, stdout = %out.stdout, "pvesh finished");

        Ok(out)
    }

    /// Run a read-only call and decode its JSON response.
    pub async fn fetch<T: DeserializeOwned + Default>(&self, cmd: &PveSh) -> Result<T, SnapshotError> {
        let out = self.run(cmd).await?;
        if !out.success() {
            return Err(SnapshotError::Command {
                path: cmd.path().to_string(),
                code: out.return_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        out.json(cmd.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_command_line() {
        let cmd = migrate_vm("pve1", VmType::Qemu, 100, "pve3");
        assert_eq!(
            cmd.args(),
            vec!["create", "/nodes/pve1/qemu/100/migrate", "-target", "pve3", "-online", "1"]
        );
        assert_eq!(
            cmd.to_string(),
            "pvesh create /nodes/pve1/qemu/100/migrate -target pve3 -online 1"
        );
    }

    #[test]
    fn test_method_is_lowercased() {
        assert_eq!(PveSh::new("GET", "/version").method(), "get");
    }

    #[test]
    fn test_empty_output_is_default_value() {
        let out = CommandOutput {
            stdout: " \n".into(),
            ..Default::default()
        };
        let list: Vec<serde_json::Value> = out.json("/cluster/ha/resources").unwrap();
        assert!(list.is_empty());

        let map: serde_json::Map<String, serde_json::Value> = out.json("/version").unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let out = CommandOutput {
            stdout: "not json".into(),
            ..Default::default()
        };
        let err = out.json::<serde_json::Value>("/cluster/resources").unwrap_err();
        assert!(matches!(err, SnapshotError::Json { .. }));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_run_captures_return_code() {
        let runner = PveshRunner::new("false");
        let out = runner.run(&PveSh::get("/version")).await.unwrap();
        assert_eq!(out.return_code, 1);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let runner = PveshRunner::new("/nonexistent/pvesh-binary");
        let err = runner.run(&PveSh::get("/version")).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn { .. }));
    }
}
