use async_trait::async_trait;
use tracing::{debug, info, info_span, Instrument};

use super::Migration;
use crate::core::pvesh::{CommandOutput, PveSh, PveshRunner};
use crate::errors::ExecutionError;

/// Issues relocation commands against the platform.
#[async_trait]
pub trait RelocationBackend: Send + Sync {
    async fn run(&self, command: &PveSh) -> Result<CommandOutput, ExecutionError>;
}

#[async_trait]
impl RelocationBackend for PveshRunner {
    async fn run(&self, command: &PveSh) -> Result<CommandOutput, ExecutionError> {
        PveshRunner::run(self, command).await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Command lines in execution order, also filled in dry-run mode.
    pub commands: Vec<String>,
    /// Migrations that completed with return code 0.
    pub completed: usize,
    pub dry_run: bool,
}

/// Runs migrations one at a time, in order.
///
/// The first command with a non-zero return code aborts the batch; earlier
/// migrations stay applied. In dry-run mode the commands are only built and
/// logged.
pub struct Executor<B> {
    backend: B,
    dry_run: bool,
}

impl<B: RelocationBackend> Executor<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn execute(&self, migrations: &[Migration]) -> Result<ExecutionReport, ExecutionError> {
        let span = info_span!("execute", migrations = migrations.len(), dry_run = self.dry_run);
        self.execute_all(migrations).instrument(span).await
    }

    async fn execute_all(&self, migrations: &[Migration]) -> Result<ExecutionReport, ExecutionError> {
        let mut report = ExecutionReport {
            dry_run: self.dry_run,
            ..Default::default()
        };

        info!("running {} migrations", migrations.len());

        for migration in migrations {
            let command = migration.command();
            info!("running '{}'", migration);
            debug!("{}", command);
            report.commands.push(command.to_string());

            if self.dry_run {
                info!("dry run -- skipping migration");
                continue;
            }

            let out = self.backend.run(&command).await?;
            if !out.stderr.trim().is_empty() {
                info!("{}", out.stderr.trim());
            }
            debug!("{}", out.stdout.trim());

            if !out.success() {
                return Err(ExecutionError::Failed {
                    migration: migration.to_string(),
                    code: out.return_code,
                    stderr: out.stderr.trim().to_string(),
                });
            }
            report.completed += 1;
        }

        Ok(report)
    }
}
