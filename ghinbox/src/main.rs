use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use github_api::GithubClient;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ghinbox::cleanup::ManualCleanup;
use ghinbox::cli::{Args, CleanupArgs, Commands, InitArgs};
use ghinbox::config::AppConfig;
use ghinbox::database::models::{RetentionSettings, SyncSettings, UserDbModel};
use ghinbox::database::repositories::{SyncStateRepository, SqlxSyncStateRepository, UserRepository};
use ghinbox::services::ServiceContainer;
use ghinbox::sync::{SyncOlderArgs, SyncOutcome};
use ghinbox::{database, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(user) = args.user.clone() {
        config.user_id = user;
    }
    if args.log_dir.is_some() {
        config.log_dir = args.log_dir.clone();
    }

    let _log_guard = logging::init_logging(config.log_dir.as_deref())?;

    let pool = database::init_pool(&config.database_url)
        .await
        .with_context(|| format!("opening database {}", config.database_url))?;
    database::run_migrations(&pool).await?;

    if let Commands::Migrate = args.command {
        info!("Database migrations applied");
        return Ok(());
    }

    let mut client = GithubClient::new(config.client_config())?;
    if needs_token(&args.command) {
        let token = config
            .github_token
            .as_deref()
            .context("GITHUB_TOKEN is required for this command")?;
        client.set_token(token).await?;
    }

    let container = ServiceContainer::new(pool.clone(), Arc::new(client));
    let cancel = container.cancellation_token();
    spawn_ctrl_c_handler(cancel.clone());

    let user_id = config.user_id.as_str();
    match args.command {
        Commands::Init(init) => init_user(&container, user_id, init).await?,
        Commands::Sync => {
            match container.sync_service.sync(user_id, &cancel).await? {
                SyncOutcome::NotConfigured => {
                    warn!("User {} is not set up; run `ghinbox init` first", user_id)
                }
                SyncOutcome::NoNewNotifications => info!("No new notifications"),
                SyncOutcome::InitialSyncCompleted => info!("Initial sync complete, nothing to import"),
                SyncOutcome::Enqueued(result) => {
                    info!("Fetched {} notifications", result.threads_enqueued);
                }
            }
            let report = container.process_pending_jobs().await?;
            info!(
                "Stored {} new notifications, {} matched rules, {} failed ({} queued for retry)",
                report.created, report.rules_matched, report.failed, report.retried
            );
        }
        Commands::SyncOlder {
            days,
            until,
            max_count,
            unread_only,
        } => {
            let until = match until {
                Some(until) => until,
                None => SqlxSyncStateRepository::new(pool.clone())
                    .get_sync_state(user_id)
                    .await?
                    .and_then(|state| state.oldest_notification())
                    .unwrap_or_else(Utc::now),
            };
            let sync_args = SyncOlderArgs {
                user_id: user_id.to_string(),
                days,
                until,
                max_count,
                unread_only,
            };
            let report = container.sync_service.sync_older(&sync_args, &cancel).await?;
            let jobs = container.process_pending_jobs().await?;
            info!(
                "Backfilled {} of {} notifications ({} new)",
                report.enqueued, report.fetched, jobs.created
            );
        }
        Commands::ApplyRule { rule_id } => {
            let report = container
                .rule_engine
                .apply_rule_to_existing(user_id, &rule_id, &cancel)
                .await?;
            if report.skipped_disabled {
                warn!("Rule {} is disabled", rule_id);
            } else {
                info!(
                    "Rule {} applied to {} of {} notifications ({} failed)",
                    rule_id, report.processed, report.total, report.failed
                );
            }
        }
        Commands::Cleanup(cleanup) => {
            let result = match cleanup.days {
                Some(_) => {
                    let params = manual_params(&container, user_id, &cleanup).await?;
                    container
                        .cleanup
                        .run_manual_cleanup(user_id, params, &cancel)
                        .await?
                }
                None => container.cleanup.run_cleanup(user_id, &cancel).await?,
            };
            match result.skipped {
                Some(reason) => info!("Cleanup skipped: {}", reason),
                None => info!(
                    "Deleted {} notifications and {} pull requests{}",
                    result.notifications_deleted,
                    result.pull_requests_deleted,
                    if result.cancelled { " before cancellation" } else { "" }
                ),
            }
        }
        Commands::CleanupPreview(cleanup) => {
            let params = manual_params(&container, user_id, &cleanup).await?;
            let count = container.cleanup.count_eligible(user_id, params).await?;
            info!(
                "{} notifications are older than {} days and eligible for cleanup",
                count, params.retention_days
            );
        }
        Commands::Migrate => {}
    }

    container.shutdown();
    Ok(())
}

fn needs_token(command: &Commands) -> bool {
    matches!(command, Commands::Sync | Commands::SyncOlder { .. })
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping after the current step");
            cancel.cancel();
        }
    });
}

async fn init_user(container: &ServiceContainer, user_id: &str, args: InitArgs) -> anyhow::Result<()> {
    let existing = match container.users.get_user(user_id).await {
        Ok(user) => Some(user),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };
    let mut user = existing.unwrap_or_else(|| UserDbModel::new(user_id));

    let sync = SyncSettings {
        initial_sync_days: args.initial_sync_days,
        initial_sync_max_count: args.initial_sync_max_count,
        initial_sync_unread_only: args.initial_sync_unread_only,
        setup_completed: true,
    };
    let mut retention = user.retention_settings()?.unwrap_or_default();
    if let Some(days) = args.retention_days {
        retention = RetentionSettings {
            enabled: days > 0,
            retention_days: days,
            protect_starred: !args.no_protect_starred,
            protect_tagged: !args.no_protect_tagged,
            last_cleanup_at: retention.last_cleanup_at,
        };
    }

    user.updated_at = Utc::now().timestamp_millis();
    let user = user.with_sync_settings(&sync)?.with_retention_settings(&retention)?;
    container.users.upsert_user(&user).await?;
    info!("User {} is set up", user_id);
    Ok(())
}

/// Parameters for an explicit cleanup, filling gaps from stored settings.
async fn manual_params(
    container: &ServiceContainer,
    user_id: &str,
    args: &CleanupArgs,
) -> anyhow::Result<ManualCleanup> {
    let stored = container.cleanup.retention_settings(user_id).await?;
    Ok(ManualCleanup {
        retention_days: args.days.unwrap_or(stored.retention_days),
        protect_starred: stored.protect_starred && !args.no_protect_starred,
        protect_tagged: stored.protect_tagged && !args.no_protect_tagged,
    })
}
