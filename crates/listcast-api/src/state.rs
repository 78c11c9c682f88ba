//! Application state.

use listcast_config::ServiceConfig;
use listcast_executor::LocalProcessSupervisor;
use listcast_scheduler::RenderOrchestrator;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RenderOrchestrator>,
}

impl AppState {
    pub fn new(config: &ServiceConfig) -> Self {
        let orchestrator = RenderOrchestrator::new(
            Arc::new(LocalProcessSupervisor::new()),
            config.pipeline.clone(),
            config.job.clone(),
        );
        Self::with_orchestrator(orchestrator)
    }

    pub fn with_orchestrator(orchestrator: RenderOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}
