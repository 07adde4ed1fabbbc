//! Service container for dependency injection.

use std::sync::Arc;

use github_api::NotificationsApi;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::Result;
use crate::cleanup::{CleanupConfig, RetentionCleanup};
use crate::clock::{Clock, system_clock};
use crate::database::DbPool;
use crate::database::repositories::{
    SqlxJobRepository, SqlxNotificationRepository, SqlxRuleRepository, SqlxSyncStateRepository,
    SqlxTagRepository, SqlxUserRepository,
};
use crate::jobs::{JobDrainReport, JobQueueConfig, JobWorker};
use crate::processor::NotificationProcessor;
use crate::query::TermQueryBuilder;
use crate::rules::{RuleEngine, RuleEngineConfig};
use crate::sync::{GithubIngestor, JobTableEnqueuer, SyncService};

/// Per-service settings. Everything defaults.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub rules: RuleEngineConfig,
    pub cleanup: CleanupConfig,
    pub jobs: JobQueueConfig,
}

/// Service container holding all application services.
pub struct ServiceContainer {
    pub pool: DbPool,
    pub users: Arc<SqlxUserRepository>,
    pub notifications: Arc<SqlxNotificationRepository>,
    pub jobs: Arc<SqlxJobRepository>,
    pub sync_service: Arc<SyncService>,
    pub processor: Arc<NotificationProcessor>,
    pub rule_engine: Arc<RuleEngine>,
    pub cleanup: Arc<RetentionCleanup>,
    worker: JobWorker,
    drain_lock: Mutex<()>,
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    pub fn new(pool: DbPool, api: Arc<dyn NotificationsApi>) -> Self {
        Self::with_config(pool, api, system_clock(), ServiceConfig::default())
    }

    pub fn with_config(
        pool: DbPool,
        api: Arc<dyn NotificationsApi>,
        clock: Clock,
        config: ServiceConfig,
    ) -> Self {
        info!("Initializing service container");

        let users = Arc::new(SqlxUserRepository::new(pool.clone()));
        let notifications = Arc::new(SqlxNotificationRepository::new(pool.clone()));
        let rules = Arc::new(SqlxRuleRepository::new(pool.clone()));
        let tags = Arc::new(SqlxTagRepository::new(pool.clone()));
        let sync_state = Arc::new(SqlxSyncStateRepository::new(pool.clone()));
        let jobs = Arc::new(SqlxJobRepository::new(pool.clone()));

        let enqueuer = JobTableEnqueuer::new(jobs.clone(), clock.clone());

        let sync_service = Arc::new(SyncService::new(
            api.clone(),
            users.clone(),
            sync_state,
            Arc::new(enqueuer),
            clock.clone(),
        ));

        let rule_engine = Arc::new(
            RuleEngine::new(
                notifications.clone(),
                rules,
                tags,
                Arc::new(TermQueryBuilder::new()),
            )
            .with_config(config.rules),
        );

        let ingestor = Arc::new(GithubIngestor::new(api, notifications.clone(), clock.clone()));
        let processor = Arc::new(NotificationProcessor::new(
            notifications.clone(),
            ingestor,
            rule_engine.clone(),
        ));

        let worker = JobWorker::new(jobs.clone(), processor.clone(), clock.clone())
            .with_config(config.jobs);

        let cleanup = Arc::new(
            RetentionCleanup::new(notifications.clone(), users.clone(), clock)
                .with_config(config.cleanup),
        );

        Self {
            pool,
            users,
            notifications,
            jobs,
            sync_service,
            processor,
            rule_engine,
            cleanup,
            worker,
            drain_lock: Mutex::new(()),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Run every queued job that is due. Jobs left behind by a cancelled or
    /// crashed run are picked up by the next call.
    pub async fn process_pending_jobs(&self) -> Result<JobDrainReport> {
        let _guard = self.drain_lock.lock().await;
        self.worker.drain(&self.cancellation_token).await
    }

    pub fn shutdown(&self) {
        info!("Shutting down services");
        self.cancellation_token.cancel();
    }
}
