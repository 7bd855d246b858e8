use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use ukiryu_shell::{ExecError, ExecRequest, ProcessOutput, ProcessRunner, SpawnPlan};

/// Short-lived helper commands: alias listings and version probes.
///
/// Separate from normal execution so discovery can be exercised against a
/// scripted runner.
#[async_trait]
pub trait ProbeRunner: Send + Sync + fmt::Debug {
    async fn probe(&self, plan: &SpawnPlan, timeout: Duration) -> Result<ProcessOutput, ExecError>;
}

/// Runs probes as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbeRunner;

#[async_trait]
impl ProbeRunner for SystemProbeRunner {
    async fn probe(&self, plan: &SpawnPlan, timeout: Duration) -> Result<ProcessOutput, ExecError> {
        let request = ExecRequest::new(plan.program.clone())
            .args(plan.args.clone())
            .timeout(timeout);
        ProcessRunner::run(plan, &request).await
    }
}
