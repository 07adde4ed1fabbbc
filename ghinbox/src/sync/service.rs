use std::sync::Arc;

use chrono::{DateTime, Utc};
use github_api::{NotificationThread, NotificationsApi};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{Clock, days_before};
use crate::database::models::SyncStateUpdate;
use crate::database::repositories::{SyncStateRepository, UserRepository};
use crate::sync::NotificationEnqueuer;
use crate::{Error, Result};

/// The fetch window and limits for one sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncContext {
    pub user_id: String,
    pub since: Option<DateTime<Utc>>,
    pub is_initial_sync: bool,
    pub unread_only: bool,
    pub max_count: Option<usize>,
}

/// What a completed batch observed. Drives the sync state update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    pub user_id: String,
    pub threads_enqueued: usize,
    pub latest_update: Option<DateTime<Utc>>,
    /// Only tracked during the initial sync.
    pub oldest_notification: Option<DateTime<Utc>>,
    pub is_initial_sync: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No user, or the user has not finished setup.
    NotConfigured,
    NoNewNotifications,
    /// The initial sync found nothing to import and was marked complete.
    InitialSyncCompleted,
    Enqueued(SyncResult),
}

/// A one-off backfill of `[until - days, until)`.
#[derive(Debug, Clone)]
pub struct SyncOlderArgs {
    pub user_id: String,
    pub days: u32,
    pub until: DateTime<Utc>,
    pub max_count: Option<usize>,
    pub unread_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOlderReport {
    pub fetched: usize,
    pub enqueued: usize,
    pub failed: usize,
    pub oldest_notification: Option<DateTime<Utc>>,
}

pub struct SyncService {
    api: Arc<dyn NotificationsApi>,
    users: Arc<dyn UserRepository>,
    sync_state: Arc<dyn SyncStateRepository>,
    enqueuer: Arc<dyn NotificationEnqueuer>,
    clock: Clock,
}

impl SyncService {
    pub fn new(
        api: Arc<dyn NotificationsApi>,
        users: Arc<dyn UserRepository>,
        sync_state: Arc<dyn SyncStateRepository>,
        enqueuer: Arc<dyn NotificationEnqueuer>,
        clock: Clock,
    ) -> Self {
        Self {
            api,
            users,
            sync_state,
            enqueuer,
            clock,
        }
    }

    /// Work out the window for the next run, or `None` if sync is not set up.
    pub async fn sync_context(&self, user_id: &str) -> Result<Option<SyncContext>> {
        let user = match self.users.get_user(user_id).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let Some(settings) = user.sync_settings()?.filter(|s| s.setup_completed) else {
            return Ok(None);
        };

        let state = self.sync_state.get_sync_state(user_id).await?;
        let initial_done = state.as_ref().is_some_and(|s| s.initial_sync_completed());

        let context = if initial_done {
            SyncContext {
                user_id: user_id.to_string(),
                since: state.as_ref().and_then(|s| s.latest_notification()),
                is_initial_sync: false,
                unread_only: false,
                max_count: None,
            }
        } else {
            SyncContext {
                user_id: user_id.to_string(),
                since: settings.initial_sync_days.and_then(|days| {
                    let since = days_before((self.clock)(), i64::from(days));
                    if since.is_none() {
                        warn!(user_id = %user_id, days, "Initial sync window out of range, fetching everything");
                    }
                    since
                }),
                is_initial_sync: true,
                unread_only: settings.initial_sync_unread_only,
                max_count: settings.initial_sync_max_count,
            }
        };
        Ok(Some(context))
    }

    /// Fetch everything new and enqueue it for processing.
    ///
    /// State only advances once every thread in the batch is enqueued.
    pub async fn sync(&self, user_id: &str, cancel: &CancellationToken) -> Result<SyncOutcome> {
        let Some(ctx) = self.sync_context(user_id).await? else {
            debug!("Sync not configured for user {}", user_id);
            return Ok(SyncOutcome::NotConfigured);
        };

        let mut threads = self
            .fetch(ctx.since, None, ctx.unread_only, cancel)
            .await?;
        if ctx.is_initial_sync {
            if ctx.unread_only {
                threads.retain(|t| t.unread);
            }
            if let Some(max) = ctx.max_count {
                threads.truncate(max);
            }
        }

        if threads.is_empty() {
            if ctx.is_initial_sync {
                let now = (self.clock)();
                let update = SyncStateUpdate::default()
                    .with_initial_sync_completed(now)
                    .with_last_successful_poll(now);
                self.sync_state.upsert_sync_state(user_id, &update).await?;
                info!("Initial sync for {} found nothing to import", user_id);
                return Ok(SyncOutcome::InitialSyncCompleted);
            }
            return Ok(SyncOutcome::NoNewNotifications);
        }

        // A thread that cannot be encoded poisons the whole batch.
        let payloads = threads
            .iter()
            .map(serde_json::to_vec)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut result = SyncResult {
            user_id: user_id.to_string(),
            threads_enqueued: 0,
            latest_update: None,
            oldest_notification: None,
            is_initial_sync: ctx.is_initial_sync,
        };

        for (thread, payload) in threads.iter().zip(payloads) {
            if let Err(e) = self
                .enqueuer
                .enqueue_process_notification(user_id, payload)
                .await
            {
                warn!(
                    github_id = %thread.id,
                    enqueued = result.threads_enqueued,
                    error = %e,
                    "Enqueue failed, abandoning batch without advancing sync state"
                );
                return Err(e);
            }

            result.threads_enqueued += 1;
            result.latest_update = result.latest_update.max(Some(thread.updated_at));
            if ctx.is_initial_sync {
                result.oldest_notification = Some(match result.oldest_notification {
                    Some(oldest) => oldest.min(thread.updated_at),
                    None => thread.updated_at,
                });
            }
        }

        self.update_sync_state(&result).await?;
        info!(
            "Enqueued {} notifications for {} (initial: {})",
            result.threads_enqueued, user_id, result.is_initial_sync
        );
        Ok(SyncOutcome::Enqueued(result))
    }

    /// Persist what a fully enqueued batch observed. A no-op when nothing was
    /// observed.
    pub async fn update_sync_state(&self, result: &SyncResult) -> Result<()> {
        if result.latest_update.is_none() && result.oldest_notification.is_none() {
            return Ok(());
        }

        let now = (self.clock)();
        let mut update = SyncStateUpdate::default().with_last_successful_poll(now);
        if let Some(latest) = result.latest_update {
            update = update.with_latest_notification(latest);
        }
        if result.is_initial_sync {
            update = update.with_initial_sync_completed(now);
            if let Some(oldest) = result.oldest_notification {
                update = update.with_oldest_notification(oldest);
            }
        }

        self.sync_state
            .upsert_sync_state(&result.user_id, &update)
            .await?;
        Ok(())
    }

    /// Backfill an explicit window. Best effort: individual failures are
    /// counted and skipped, and the window can always be run again.
    pub async fn sync_older(
        &self,
        args: &SyncOlderArgs,
        cancel: &CancellationToken,
    ) -> Result<SyncOlderReport> {
        if args.days == 0 {
            return Err(Error::validation("backfill window must span at least one day"));
        }
        let since = days_before(args.until, i64::from(args.days)).ok_or_else(|| {
            Error::validation(format!("backfill window of {} days is out of range", args.days))
        })?;

        let mut threads = self
            .fetch(Some(since), Some(args.until), args.unread_only, cancel)
            .await?;
        if let Some(max) = args.max_count {
            threads.truncate(max);
        }

        let mut report = SyncOlderReport {
            fetched: threads.len(),
            ..Default::default()
        };

        for thread in &threads {
            let payload = match serde_json::to_vec(thread) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(github_id = %thread.id, error = %e, "Failed to encode thread");
                    report.failed += 1;
                    continue;
                }
            };
            if let Err(e) = self
                .enqueuer
                .enqueue_process_notification(&args.user_id, payload)
                .await
            {
                warn!(github_id = %thread.id, error = %e, "Failed to enqueue thread");
                report.failed += 1;
                continue;
            }
            report.enqueued += 1;
            report.oldest_notification = Some(match report.oldest_notification {
                Some(oldest) => oldest.min(thread.updated_at),
                None => thread.updated_at,
            });
        }

        if let Some(oldest) = report.oldest_notification {
            let update = SyncStateUpdate::default().with_oldest_notification(oldest);
            if let Err(e) = self
                .sync_state
                .upsert_sync_state(&args.user_id, &update)
                .await
            {
                warn!(user_id = %args.user_id, error = %e, "Failed to record backfill progress");
            }
        }

        info!(
            "Backfill for {} enqueued {} of {} notifications",
            args.user_id, report.enqueued, report.fetched
        );
        Ok(report)
    }

    async fn fetch(
        &self,
        since: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
        unread_only: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<NotificationThread>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            threads = self.api.fetch_notifications(since, before, unread_only) => Ok(threads?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::fixed_clock;
    use crate::database::DbPool;
    use crate::database::models::SyncSettings;
    use crate::database::repositories::{SqlxSyncStateRepository, SqlxUserRepository};
    use crate::test_support::{FakeApi, RecordingEnqueuer, insert_user, setup_test_db, thread, ts};

    const NOW: &str = "2025-03-10T00:00:00Z";

    fn service(pool: &DbPool, api: Arc<FakeApi>, enqueuer: Arc<RecordingEnqueuer>) -> SyncService {
        SyncService::new(
            api,
            Arc::new(SqlxUserRepository::new(pool.clone())),
            Arc::new(SqlxSyncStateRepository::new(pool.clone())),
            enqueuer,
            fixed_clock(ts(NOW)),
        )
    }

    fn configured() -> SyncSettings {
        SyncSettings {
            setup_completed: true,
            ..Default::default()
        }
    }

    async fn state(pool: &DbPool) -> Option<crate::database::models::SyncStateDbModel> {
        SqlxSyncStateRepository::new(pool.clone())
            .get_sync_state("u1")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_unconfigured_sync_is_a_no_op() {
        let pool = setup_test_db().await;
        let api = Arc::new(FakeApi::with_threads(vec![thread("1", "2025-03-01T00:00:00Z")]));
        let svc = service(&pool, api.clone(), Arc::new(RecordingEnqueuer::default()));

        let cancel = CancellationToken::new();
        assert_eq!(svc.sync("u1", &cancel).await.unwrap(), SyncOutcome::NotConfigured);

        insert_user(&pool, "u1", Some(SyncSettings::default()), None).await;
        assert_eq!(svc.sync("u1", &cancel).await.unwrap(), SyncOutcome::NotConfigured);
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_initial_sync_applies_limits_and_records_bounds() {
        let pool = setup_test_db().await;
        let settings = SyncSettings {
            initial_sync_days: Some(7),
            initial_sync_max_count: Some(2),
            initial_sync_unread_only: true,
            setup_completed: true,
        };
        insert_user(&pool, "u1", Some(settings), None).await;

        let mut read = thread("2", "2025-03-08T00:00:00Z");
        read.unread = false;
        let api = Arc::new(FakeApi::with_threads(vec![
            thread("1", "2025-03-09T00:00:00Z"),
            read,
            thread("3", "2025-03-05T00:00:00Z"),
            thread("4", "2025-03-04T00:00:00Z"),
        ]));
        let enqueuer = Arc::new(RecordingEnqueuer::default());
        let svc = service(&pool, api.clone(), enqueuer.clone());

        let outcome = svc.sync("u1", &CancellationToken::new()).await.unwrap();
        let SyncOutcome::Enqueued(result) = outcome else {
            panic!("expected an enqueued batch");
        };
        assert!(result.is_initial_sync);
        assert_eq!(result.threads_enqueued, 2);
        assert_eq!(enqueuer.enqueued_ids(), vec!["1", "3"]);

        let calls = api.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![(Some(ts("2025-03-03T00:00:00Z")), None, true)]);

        let state = state(&pool).await.unwrap();
        assert!(state.initial_sync_completed());
        assert_eq!(state.latest_notification(), Some(ts("2025-03-09T00:00:00Z")));
        assert_eq!(state.oldest_notification(), Some(ts("2025-03-05T00:00:00Z")));
        assert_eq!(state.last_successful_poll, Some(ts(NOW).timestamp_millis()));
    }

    #[tokio::test]
    async fn test_empty_initial_sync_is_marked_complete() {
        let pool = setup_test_db().await;
        insert_user(&pool, "u1", Some(configured()), None).await;
        let svc = service(
            &pool,
            Arc::new(FakeApi::default()),
            Arc::new(RecordingEnqueuer::default()),
        );

        let outcome = svc.sync("u1", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, SyncOutcome::InitialSyncCompleted);
        assert!(state(&pool).await.unwrap().initial_sync_completed());

        let outcome = svc.sync("u1", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, SyncOutcome::NoNewNotifications);
    }

    #[tokio::test]
    async fn test_incremental_sync_starts_at_latest_and_never_regresses() {
        let pool = setup_test_db().await;
        insert_user(&pool, "u1", Some(configured()), None).await;
        let latest = ts("2025-03-09T00:00:00Z");
        SqlxSyncStateRepository::new(pool.clone())
            .upsert_sync_state(
                "u1",
                &SyncStateUpdate::default()
                    .with_initial_sync_completed(ts("2025-03-01T00:00:00Z"))
                    .with_latest_notification(latest),
            )
            .await
            .unwrap();

        // The remote reports an older item; the stored high-water mark stays.
        let api = Arc::new(FakeApi::with_threads(vec![thread("1", "2025-03-08T00:00:00Z")]));
        let svc = service(&pool, api.clone(), Arc::new(RecordingEnqueuer::default()));
        let outcome = svc.sync("u1", &CancellationToken::new()).await.unwrap();

        assert!(matches!(outcome, SyncOutcome::Enqueued(ref r) if !r.is_initial_sync));
        assert_eq!(api.calls.lock().unwrap()[0], (Some(latest), None, false));
        let state = state(&pool).await.unwrap();
        assert_eq!(state.latest_notification(), Some(latest));
        assert_eq!(state.oldest_notification_synced_at, None);
    }

    #[tokio::test]
    async fn test_enqueue_failure_leaves_state_untouched() {
        let pool = setup_test_db().await;
        insert_user(&pool, "u1", Some(configured()), None).await;
        let api = Arc::new(FakeApi::with_threads(vec![
            thread("1", "2025-03-09T00:00:00Z"),
            thread("2", "2025-03-08T00:00:00Z"),
            thread("3", "2025-03-07T00:00:00Z"),
        ]));
        let enqueuer = Arc::new(RecordingEnqueuer::failing_on(vec![1]));
        let svc = service(&pool, api, enqueuer.clone());

        let err = svc.sync("u1", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::Enqueue(_)));
        assert_eq!(enqueuer.enqueued_ids(), vec!["1"]);
        assert!(state(&pool).await.is_none());
    }

    #[tokio::test]
    async fn test_upstream_error_and_cancellation() {
        let pool = setup_test_db().await;
        insert_user(&pool, "u1", Some(configured()), None).await;
        let api = Arc::new(FakeApi {
            fail_with_status: Some(503),
            ..Default::default()
        });
        let svc = service(&pool, api, Arc::new(RecordingEnqueuer::default()));

        let err = svc.sync("u1", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::Github(_)));
        assert!(err.is_retriable());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = svc.sync("u1", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_update_sync_state_without_observations_is_a_no_op() {
        let pool = setup_test_db().await;
        insert_user(&pool, "u1", Some(configured()), None).await;
        let svc = service(
            &pool,
            Arc::new(FakeApi::default()),
            Arc::new(RecordingEnqueuer::default()),
        );

        svc.update_sync_state(&SyncResult {
            user_id: "u1".into(),
            threads_enqueued: 0,
            latest_update: None,
            oldest_notification: None,
            is_initial_sync: true,
        })
        .await
        .unwrap();
        assert!(state(&pool).await.is_none());
    }

    #[tokio::test]
    async fn test_backfill_continues_past_failures_and_only_moves_oldest() {
        let pool = setup_test_db().await;
        insert_user(&pool, "u1", Some(configured()), None).await;
        let latest = ts("2025-03-09T00:00:00Z");
        SqlxSyncStateRepository::new(pool.clone())
            .upsert_sync_state(
                "u1",
                &SyncStateUpdate::default()
                    .with_initial_sync_completed(latest)
                    .with_latest_notification(latest)
                    .with_oldest_notification(ts("2025-02-20T00:00:00Z")),
            )
            .await
            .unwrap();

        let api = Arc::new(FakeApi::with_threads(vec![
            thread("1", "2025-02-19T00:00:00Z"),
            thread("2", "2025-02-15T00:00:00Z"),
            thread("3", "2025-02-12T00:00:00Z"),
            thread("4", "2025-02-11T00:00:00Z"),
        ]));
        let enqueuer = Arc::new(RecordingEnqueuer::failing_on(vec![1]));
        let svc = service(&pool, api.clone(), enqueuer.clone());

        let until = ts("2025-02-20T00:00:00Z");
        let args = SyncOlderArgs {
            user_id: "u1".into(),
            days: 10,
            until,
            max_count: Some(3),
            unread_only: false,
        };
        let report = svc.sync_older(&args, &CancellationToken::new()).await.unwrap();

        assert_eq!(report.fetched, 3);
        assert_eq!(report.enqueued, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(enqueuer.enqueued_ids(), vec!["1", "3"]);
        assert_eq!(
            api.calls.lock().unwrap()[0],
            (Some(ts("2025-02-10T00:00:00Z")), Some(until), false)
        );

        let state = state(&pool).await.unwrap();
        assert_eq!(state.oldest_notification(), Some(ts("2025-02-12T00:00:00Z")));
        assert_eq!(state.latest_notification(), Some(latest));
    }

    #[tokio::test]
    async fn test_backfill_state_write_failure_is_not_fatal() {
        // No users row, so the state write violates its foreign key.
        let pool = setup_test_db().await;
        let api = Arc::new(FakeApi::with_threads(vec![thread("1", "2025-02-19T00:00:00Z")]));
        let svc = service(&pool, api, Arc::new(RecordingEnqueuer::default()));

        let args = SyncOlderArgs {
            user_id: "ghost".into(),
            days: 30,
            until: ts("2025-02-20T00:00:00Z"),
            max_count: None,
            unread_only: true,
        };
        let report = svc.sync_older(&args, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.enqueued, 1);
    }

    #[tokio::test]
    async fn test_backfill_window_out_of_range_is_rejected() {
        let pool = setup_test_db().await;
        insert_user(&pool, "u1", Some(configured()), None).await;
        let api = Arc::new(FakeApi::with_threads(vec![thread("1", "2025-02-19T00:00:00Z")]));
        let svc = service(&pool, api.clone(), Arc::new(RecordingEnqueuer::default()));

        let cancel = CancellationToken::new();
        for days in [0, u32::MAX] {
            let args = SyncOlderArgs {
                user_id: "u1".into(),
                days,
                until: ts("2025-02-20T00:00:00Z"),
                max_count: None,
                unread_only: false,
            };
            let err = svc.sync_older(&args, &cancel).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "days = {}", days);
        }
        assert!(api.calls.lock().unwrap().is_empty());
        assert!(state(&pool).await.is_none());
    }

    #[tokio::test]
    async fn test_huge_initial_window_fetches_without_lower_bound() {
        let pool = setup_test_db().await;
        let settings = SyncSettings {
            initial_sync_days: Some(u32::MAX),
            ..configured()
        };
        insert_user(&pool, "u1", Some(settings), None).await;
        let api = Arc::new(FakeApi::with_threads(vec![thread("1", "2025-03-01T00:00:00Z")]));
        let svc = service(&pool, api.clone(), Arc::new(RecordingEnqueuer::default()));

        let ctx = svc.sync_context("u1").await.unwrap().unwrap();
        assert!(ctx.is_initial_sync);
        assert_eq!(ctx.since, None);

        let outcome = svc.sync("u1", &CancellationToken::new()).await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Enqueued(ref r) if r.threads_enqueued == 1));
        assert_eq!(api.calls.lock().unwrap()[0].0, None);
    }
}
