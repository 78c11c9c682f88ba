//! State shared by the tasks that race to finish a running job.

use futures::StreamExt;
use futures::stream::BoxStream;
use listcast_config::JobConfig;
use listcast_core::{
    CancelReason, Job, JobOutcome, JobReport, JobState, LogLine, ProcessHandle, SupervisedProcess,
    Supervisor,
};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::gate::Ticket;
use crate::reporter::ResultReporter;
use crate::watchdog::Watchdog;

pub(crate) struct JobRuntime {
    job: Arc<Mutex<Job>>,
    handle: ProcessHandle,
    supervisor: Arc<dyn Supervisor>,
    reporter: ResultReporter,
    ticket: Ticket<Arc<JobRuntime>>,
    watchdog: OnceLock<Watchdog>,
    pump: Mutex<Option<JoinHandle<()>>>,
    released: watch::Sender<bool>,
    grace: Duration,
}

impl JobRuntime {
    /// Take over a freshly spawned, running job.
    ///
    /// Arms the deadline, starts collecting output, publishes the runtime in
    /// the gate and starts waiting for the process to exit.
    pub(crate) fn start(
        job: Job,
        process: SupervisedProcess,
        supervisor: Arc<dyn Supervisor>,
        ticket: Ticket<Arc<JobRuntime>>,
        config: &JobConfig,
    ) -> (Arc<Self>, oneshot::Receiver<JobReport>) {
        let (reporter, report) = ResultReporter::new();
        let (released, _) = watch::channel(false);

        let runtime = Arc::new(Self {
            job: Arc::new(Mutex::new(job)),
            handle: process.handle,
            supervisor,
            reporter,
            ticket,
            watchdog: OnceLock::new(),
            pump: Mutex::new(None),
            released,
            grace: config.grace,
        });

        let on_timeout = runtime.clone();
        let _ = runtime
            .watchdog
            .set(Watchdog::arm(config.timeout, move || on_timeout.on_timeout()));

        runtime.start_pump(process.output);
        runtime.ticket.attach(runtime.clone());
        tokio::spawn(runtime.clone().on_exit());

        (runtime, report)
    }

    fn lock_job(&self) -> MutexGuard<'_, Job> {
        self.job.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn start_pump(&self, mut output: BoxStream<'static, LogLine>) {
        let job = self.job.clone();
        let job_id = self.ticket.job_id();

        let task = tokio::spawn(async move {
            while let Some(line) = output.next().await {
                debug!(target: "listcast::pipeline", %job_id, stream = ?line.stream, "{}", line.content);
                job.lock().unwrap_or_else(|e| e.into_inner()).record(&line);
            }
        });

        *self.pump.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
    }

    fn take_pump(&self) -> Option<JoinHandle<()>> {
        self.pump.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    fn disarm(&self) {
        if let Some(watchdog) = self.watchdog.get() {
            watchdog.disarm();
        }
    }

    async fn terminate(&self) {
        if let Err(e) = self.supervisor.terminate(&self.handle, self.grace).await {
            error!(job_id = %self.ticket.job_id(), pid = self.handle.pid(), error = %e, "Failed to terminate pipeline");
        }
        if let Some(pump) = self.take_pump() {
            pump.abort();
        }
    }

    /// Natural exit path.
    async fn on_exit(self: Arc<Self>) {
        let exit = self.handle.wait().await;
        if !self.reporter.claim() {
            return;
        }
        self.disarm();

        // Descendants can hold the pipes open after the leader exits.
        if let Some(mut pump) = self.take_pump() {
            if tokio::time::timeout(self.grace, &mut pump).await.is_err() {
                warn!(job_id = %self.ticket.job_id(), "Output still open after exit, dropping the rest");
                pump.abort();
            }
        }

        // The gate must not free while background children still run.
        if let Err(e) = self.supervisor.sweep(&self.handle).await {
            error!(job_id = %self.ticket.job_id(), pid = self.handle.pid(), error = %e, "Failed to sweep pipeline descendants");
        }

        debug!(job_id = %self.ticket.job_id(), code = ?exit.code, signal = ?exit.signal, "Pipeline exited");
        let outcome = self.lock_job().exit_outcome(exit.code);
        self.finish(outcome);
    }

    /// Deadline path, run by the watchdog.
    async fn on_timeout(self: Arc<Self>) {
        if !self.reporter.claim() {
            return;
        }
        warn!(job_id = %self.ticket.job_id(), pid = self.handle.pid(), "Job exceeded its deadline, terminating");
        self.terminate().await;
        self.finish(JobOutcome::TimedOut);
    }

    /// Cancellation path. Returns `true` if this call finalized the job.
    pub(crate) async fn cancel(self: Arc<Self>, reason: CancelReason) -> bool {
        if !self.reporter.claim() {
            return false;
        }
        self.disarm();
        info!(job_id = %self.ticket.job_id(), pid = self.handle.pid(), %reason, "Cancelling job");
        self.terminate().await;
        self.finish(JobOutcome::Cancelled { reason });
        true
    }

    /// Record the outcome, free the gate and hand the report to the waiter.
    ///
    /// Only the path that won [`ResultReporter::claim`] calls this.
    fn finish(&self, outcome: JobOutcome) {
        let report = {
            let mut job = self.lock_job();
            if let Err(e) = job.advance(outcome.state()) {
                error!(job_id = %job.id, error = %e, "Unexpected job transition");
            }
            let report = job.report(outcome);
            if let Err(e) = job.advance(JobState::Released) {
                error!(job_id = %job.id, error = %e, "Unexpected job transition");
            }
            report
        };

        info!(
            job_id = %report.job_id,
            listing_id = %report.listing_id,
            variant = %report.variant,
            outcome = %report.outcome.state(),
            duration_ms = report.duration.as_millis() as u64,
            "Job finished"
        );

        self.ticket.release();
        self.released.send_replace(true);

        if !self.reporter.deliver(report) {
            debug!(job_id = %self.ticket.job_id(), "Nobody waiting for the job report");
        }
    }

    /// Resolves once the job has been finalized and the gate freed.
    pub(crate) async fn wait_released(&self) {
        let mut rx = self.released.subscribe();
        let _ = rx.wait_for(|released| *released).await;
    }
}
