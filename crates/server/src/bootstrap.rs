use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use slashgate_commands::{
    AuthorizationGate, CommandExecutor, CommandRegistry, CommandService, DispatchError,
    ExecutionSettings, MembershipPermissionOracle, NetworkPolicy, WebhookDispatcher,
};
use slashgate_core::audit::{AuditSink, TracingAuditSink};
use slashgate_core::config::{AppConfig, ConfigError, LoadOptions};
use slashgate_core::permissions::PermissionOracle;
use slashgate_db::repositories::{
    CommandRepository, DirectoryRepository, SqlCommandRepository, SqlDirectoryRepository,
};
use slashgate_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::{info, warn};

use crate::{api, health};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub api: api::ApiState,
}

impl Application {
    /// Health and command routes on one listener.
    pub fn router(&self) -> Router {
        health::router(self.db_pool.clone(), self.config.commands.enabled)
            .merge(api::router(self.api.clone()))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("webhook client setup failed: {0}")]
    WebhookClient(#[source] DispatchError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let policy =
        NetworkPolicy::from_allow_list(&config.commands.allowed_untrusted_internal_connections);
    if !policy.is_empty() {
        warn!(
            event_name = "system.bootstrap.internal_connections_allowed",
            correlation_id = "bootstrap",
            allow_list = %config.commands.allowed_untrusted_internal_connections,
            "integrations may reach allow-listed internal destinations"
        );
    }
    let dispatcher =
        WebhookDispatcher::new(policy, Duration::from_secs(config.commands.webhook_timeout_secs))
            .map_err(BootstrapError::WebhookClient)?;

    let directory: Arc<dyn DirectoryRepository> =
        Arc::new(SqlDirectoryRepository::new(db_pool.clone()));
    let commands: Arc<dyn CommandRepository> = Arc::new(SqlCommandRepository::new(db_pool.clone()));
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let oracle: Arc<dyn PermissionOracle> =
        Arc::new(MembershipPermissionOracle::new(directory.clone()));
    let registry = CommandRegistry::new(commands, audit.clone());

    let executor = CommandExecutor::new(
        ExecutionSettings {
            enabled: config.commands.enabled,
            site_url: config.commands.site_url.clone(),
        },
        registry.clone(),
        AuthorizationGate::new(directory.clone(), oracle.clone()),
        directory.clone(),
        dispatcher,
        audit,
    );
    let service = CommandService::new(registry, directory.clone(), oracle, config.commands.enabled);

    info!(
        event_name = "system.bootstrap.commands_ready",
        correlation_id = "bootstrap",
        commands_enabled = config.commands.enabled,
        webhook_timeout_secs = config.commands.webhook_timeout_secs,
        "slash command subsystem wired"
    );

    Ok(Application {
        api: api::ApiState::new(Arc::new(executor), service, directory),
        config,
        db_pool,
    })
}
