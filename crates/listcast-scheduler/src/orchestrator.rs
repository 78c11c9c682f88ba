//! Render orchestrator - admits one render at a time and supervises it to completion.

use listcast_config::{JobConfig, PipelineConfig};
use listcast_core::{Error, Job, JobId, JobReport, JobState, RenderRequest, Result, Supervisor};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{error, info};

use crate::cancel::{CancelOutcome, CancellationHandler, watch_disconnect};
use crate::gate::AdmissionGate;
use crate::runtime::JobRuntime;

/// Runs render jobs through a [`Supervisor`], one at a time.
pub struct RenderOrchestrator {
    supervisor: Arc<dyn Supervisor>,
    pipeline: PipelineConfig,
    job: JobConfig,
    gate: AdmissionGate<Arc<JobRuntime>>,
    cancellation: CancellationHandler,
}

impl RenderOrchestrator {
    pub fn new(supervisor: Arc<dyn Supervisor>, pipeline: PipelineConfig, job: JobConfig) -> Self {
        let gate = AdmissionGate::new();
        Self {
            supervisor,
            pipeline,
            job,
            cancellation: CancellationHandler::new(gate.clone()),
            gate,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    pub fn active_job(&self) -> Option<JobId> {
        self.gate.active_job()
    }

    /// Variant used when a request does not name one.
    pub fn default_variant(&self) -> &str {
        &self.job.default_variant
    }

    pub fn cancellation(&self) -> &CancellationHandler {
        &self.cancellation
    }

    /// Cancel the active job. See [`CancellationHandler::cancel_active`].
    pub async fn cancel(&self) -> CancelOutcome {
        self.cancellation.cancel_active().await
    }

    /// Admit and start a render.
    ///
    /// Fails with [`Error::Busy`] while another job holds the gate, without
    /// spawning anything. A spawn failure frees the gate before returning.
    pub async fn submit(&self, request: RenderRequest) -> Result<RenderSession> {
        let mut job = Job::new(request, self.job.log_limit_bytes);
        let ticket = self.gate.try_acquire(job.id)?;
        let job_id = job.id;

        info!(
            %job_id,
            listing_id = %job.listing_id,
            variant = %job.variant,
            supervisor = self.supervisor.name(),
            "Job accepted"
        );

        let spec = self.pipeline.spec_for(job.listing_id, &job.variant);
        let process = match self.supervisor.spawn(spec).await {
            Ok(process) => process,
            Err(e) => {
                error!(%job_id, error = %e, "Failed to spawn pipeline");
                job.advance(JobState::Released)?;
                ticket.release();
                return Err(e);
            }
        };

        job.advance(JobState::Running)?;
        info!(%job_id, pid = process.handle.pid(), "Job running");

        let (runtime, report) =
            JobRuntime::start(job, process, self.supervisor.clone(), ticket, &self.job);

        let token = CancellationToken::new();
        watch_disconnect(runtime, token.clone());

        Ok(RenderSession {
            job_id,
            report,
            guard: token.drop_guard(),
        })
    }
}

/// The submitter's side of a running job.
///
/// Dropping the session before the report arrives cancels the job, the same
/// way a client disconnect does.
pub struct RenderSession {
    job_id: JobId,
    report: oneshot::Receiver<JobReport>,
    guard: DropGuard,
}

impl RenderSession {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Wait for the job's final report.
    pub async fn wait(self) -> Result<JobReport> {
        let RenderSession { report, guard, .. } = self;
        let report = report
            .await
            .map_err(|_| Error::Internal("job finished without a report".to_string()))?;
        guard.disarm();
        Ok(report)
    }
}
