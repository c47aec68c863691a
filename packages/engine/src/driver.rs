// ABOUTME: Background execution of crews with durable run records
// ABOUTME: One worker per run; cancellation is cooperative and terminal states are absorbing

use crewyard_core::EntityKind;
use crewyard_crews::CrewWithRelations;
use crewyard_knowledge::KnowledgeLoader;
use crewyard_runs::{Run, RunStatus};
use crewyard_services::{CrewService, ServiceError, ServiceResult, Stores};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::planner::compile;
use crate::runtime::RuntimeFactory;

/// `error_text` recorded on runs cancelled through `cancel`
pub const CANCELLED_REASON: &str = "cancelled by request";

/// Starts, tracks and cancels crew runs
pub struct ExecutionDriver<R: RuntimeFactory> {
    stores: Stores,
    crews: CrewService,
    loader: Arc<dyn KnowledgeLoader>,
    factory: Arc<R>,
    live: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl<R: RuntimeFactory> Clone for ExecutionDriver<R> {
    fn clone(&self) -> Self {
        Self {
            stores: self.stores.clone(),
            crews: self.crews.clone(),
            loader: self.loader.clone(),
            factory: self.factory.clone(),
            live: self.live.clone(),
        }
    }
}

impl<R: RuntimeFactory> ExecutionDriver<R> {
    pub fn new(
        stores: Stores,
        crews: CrewService,
        loader: Arc<dyn KnowledgeLoader>,
        factory: Arc<R>,
    ) -> Self {
        Self {
            stores,
            crews,
            loader,
            factory,
            live: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn factory(&self) -> &Arc<R> {
        &self.factory
    }

    /// Validate the crew, record a pending run and hand it to a background worker.
    ///
    /// Validation problems surface here as `ValidationError`. Anything that
    /// goes wrong after the run row exists is recorded on the run instead.
    pub async fn start(
        &self,
        crew_id: &str,
        inputs: BTreeMap<String, Value>,
    ) -> ServiceResult<String> {
        let crew = self.crews.validate_for_execution(crew_id).await?;
        let run = self.stores.runs.create_run(crew_id, &inputs).await?;

        let token = CancellationToken::new();
        self.live.lock().await.insert(run.id.clone(), token.clone());

        info!("Created run {} for crew {}", run.id, crew_id);

        let worker = self.clone();
        let run_id = run.id.clone();
        tokio::spawn(async move {
            worker.drive(&run_id, crew, inputs, &token).await;
            worker.live.lock().await.remove(&run_id);
        });

        Ok(run.id)
    }

    pub async fn status(&self, run_id: &str) -> ServiceResult<Run> {
        self.stores
            .runs
            .get_run(run_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Run, run_id))
    }

    /// Runs of a crew, newest first
    pub async fn list_runs(&self, crew_id: &str, limit: i64) -> ServiceResult<Vec<Run>> {
        if !self.stores.crews.crew_exists(crew_id).await? {
            return Err(ServiceError::not_found(EntityKind::Crew, crew_id));
        }
        Ok(self.stores.runs.list_runs(crew_id, limit).await?)
    }

    /// Cancel a pending or running run. Cancelling a cancelled run is a no-op.
    pub async fn cancel(&self, run_id: &str) -> ServiceResult<Run> {
        let run = self.status(run_id).await?;
        match run.status {
            RunStatus::Cancelled => return Ok(run),
            RunStatus::Completed | RunStatus::Failed => {
                return Err(ServiceError::IllegalState(format!(
                    "run {} is already {}",
                    run_id, run.status
                )));
            }
            RunStatus::Pending | RunStatus::Running => {}
        }

        // Record the terminal state before signalling so a late result cannot win
        if self
            .stores
            .runs
            .mark_cancelled(run_id, CANCELLED_REASON)
            .await?
        {
            info!("Cancelled run {}", run_id);
        } else {
            let current = self.status(run_id).await?;
            if current.status != RunStatus::Cancelled {
                return Err(ServiceError::IllegalState(format!(
                    "run {} finished as {} before it could be cancelled",
                    run_id, current.status
                )));
            }
        }

        if let Some(token) = self.live.lock().await.get(run_id) {
            token.cancel();
        }

        self.status(run_id).await
    }

    /// Fail runs a previous process left pending or running. Call once at start-up.
    pub async fn recover_interrupted_runs(&self) -> ServiceResult<u64> {
        let count = self.stores.runs.fail_interrupted_runs().await?;
        if count > 0 {
            warn!("Marked {} interrupted runs as failed", count);
        }
        Ok(count)
    }

    async fn drive(
        &self,
        run_id: &str,
        crew: CrewWithRelations,
        inputs: BTreeMap<String, Value>,
        token: &CancellationToken,
    ) {
        if token.is_cancelled() {
            debug!("Run {} cancelled before it started", run_id);
            return;
        }

        match self.stores.runs.mark_running(run_id).await {
            Ok(true) => info!("Run {} started", run_id),
            Ok(false) => {
                debug!("Run {} is no longer pending; worker exits", run_id);
                return;
            }
            Err(e) => {
                self.record_failure(run_id, format!("could not start run: {}", e))
                    .await;
                return;
            }
        }

        let plan = match compile(self.factory.clone(), self.loader.clone(), crew).await {
            Ok(plan) => plan,
            Err(e) => {
                self.record_failure(run_id, format!("plan compilation failed: {}", e))
                    .await;
                return;
            }
        };

        if token.is_cancelled() {
            debug!("Run {} cancelled after compilation; kickoff skipped", run_id);
            return;
        }

        // A panic inside the runtime surfaces as a JoinError instead of killing the worker
        let factory = self.factory.clone();
        let kickoff = tokio::spawn(async move { factory.kickoff(&plan.crew, &inputs).await });

        match kickoff.await {
            Ok(Ok(output)) => match self.stores.runs.mark_completed(run_id, &output).await {
                Ok(true) => info!("Run {} completed", run_id),
                Ok(false) => warn!(
                    "Run {} finished after it was cancelled; result discarded",
                    run_id
                ),
                Err(e) => error!("Failed to record completion of run {}: {}", run_id, e),
            },
            Ok(Err(err)) => self.record_failure(run_id, format!("{:?}", err)).await,
            Err(join_err) if join_err.is_panic() => {
                let payload = join_err.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                self.record_failure(run_id, format!("runtime panicked: {}", message))
                    .await;
            }
            Err(join_err) => {
                self.record_failure(run_id, format!("kickoff task failed: {}", join_err))
                    .await;
            }
        }
    }

    async fn record_failure(&self, run_id: &str, message: String) {
        error!("Run {} failed: {}", run_id, message);
        match self.stores.runs.mark_failed(run_id, &message).await {
            Ok(true) => {}
            Ok(false) => warn!("Run {} already finished; failure not recorded", run_id),
            Err(e) => error!("Failed to record failure of run {}: {}", run_id, e),
        }
    }
}
