//! Run pipeline: gateway execution followed by demultiplexing

use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use momos_common::{ActionScript, ExecutionResult, Result};

use crate::demux::demux;
use crate::gateway::ExecutionGateway;

/// Executes scripts and turns raw program output into an [`ExecutionResult`]
pub struct Runner {
    gateway: ExecutionGateway,
}

impl Runner {
    pub fn new(gateway: ExecutionGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &ExecutionGateway {
        &self.gateway
    }

    /// Execute `script` and split its output into trace, spotlight and
    /// plain stdout.
    pub async fn run(&self, script: &ActionScript) -> Result<ExecutionResult> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, actions = script.actions.len());

        async move {
            info!("Starting run");
            let raw = self.gateway.execute(script).await?;
            let demuxed = demux(&raw.stdout);

            match &demuxed.trace {
                Some(trace) => info!(
                    "Run finished: exit code {}, success {}, {} steps",
                    raw.exit_code,
                    trace.success,
                    trace.steps.len()
                ),
                None => info!("Run finished: exit code {}, no trace", raw.exit_code),
            }

            Ok(ExecutionResult {
                exit_code: raw.exit_code,
                stdout: demuxed.clean_stdout,
                stderr: raw.stderr,
                trace: demuxed.trace,
                spotlight: demuxed.spotlight,
            })
        }
        .instrument(span)
        .await
    }
}
