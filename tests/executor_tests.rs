use async_trait::async_trait;
use std::sync::Mutex;

use pve_vman::cluster::VmType;
use pve_vman::core::{CommandOutput, PveSh, PveshRunner};
use pve_vman::errors::ExecutionError;
use pve_vman::migration::{Executor, Migration, RelocationBackend};

/// Records every command and fails the one at `fail_at`.
struct FakeBackend {
    calls: Mutex<Vec<String>>,
    fail_at: Option<usize>,
}

impl FakeBackend {
    fn new(fail_at: Option<usize>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_at,
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelocationBackend for FakeBackend {
    async fn run(&self, command: &PveSh) -> Result<CommandOutput, ExecutionError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(command.to_string());

        if Some(calls.len() - 1) == self.fail_at {
            return Ok(CommandOutput {
                stdout: String::new(),
                stderr: "migration aborted".to_string(),
                return_code: 255,
            });
        }
        Ok(CommandOutput {
            stdout: "UPID:pve1:0001".to_string(),
            stderr: String::new(),
            return_code: 0,
        })
    }
}

fn batch() -> Vec<Migration> {
    (0..3)
        .map(|i| Migration {
            vm_id: 100 + i,
            vm_type: VmType::Qemu,
            source: "pve1".to_string(),
            target: "pve2".to_string(),
        })
        .collect()
}

#[tokio::test]
async fn test_all_migrations_run_in_order() {
    let executor = Executor::new(FakeBackend::new(None));
    let report = executor.execute(&batch()).await.unwrap();

    assert_eq!(report.completed, 3);
    assert!(!report.dry_run);
    assert_eq!(report.commands, executor.backend().calls());
    assert_eq!(
        report.commands[0],
        "pvesh create /nodes/pve1/qemu/100/migrate -target pve2 -online 1"
    );
}

#[tokio::test]
async fn test_execution_halts_on_first_failure() {
    let executor = Executor::new(FakeBackend::new(Some(1)));
    let err = executor.execute(&batch()).await.unwrap_err();

    assert_eq!(executor.backend().calls().len(), 2);
    match err {
        ExecutionError::Failed {
            migration,
            code,
            stderr,
        } => {
            assert_eq!(migration, "Migration: VM 101 from pve1 to pve2");
            assert_eq!(code, 255);
            assert_eq!(stderr, "migration aborted");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_dry_run_never_touches_backend() {
    let executor = Executor::new(FakeBackend::new(Some(0))).dry_run(true);
    let report = executor.execute(&batch()).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.completed, 0);
    assert_eq!(report.commands.len(), 3);
    assert!(executor.backend().calls().is_empty());
}

#[tokio::test]
async fn test_empty_batch() {
    let executor = Executor::new(FakeBackend::new(Some(0)));
    let report = executor.execute(&[]).await.unwrap();
    assert_eq!(report.completed, 0);
    assert!(report.commands.is_empty());
}

#[tokio::test]
async fn test_process_runner_exit_codes() {
    let ok = Executor::new(PveshRunner::new("true"));
    assert_eq!(ok.execute(&batch()).await.unwrap().completed, 3);

    let failing = Executor::new(PveshRunner::new("false"));
    let err = failing.execute(&batch()).await.unwrap_err();
    assert!(matches!(err, ExecutionError::Failed { code: 1, .. }));
}
