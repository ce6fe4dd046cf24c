use access_control::{AccessControlEngine, Role};
use anyhow::{Context, Result};
use database_layer::{EntityStore, MemoryStore, NewUser, PgStore, StoreTx};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::auth::{password, TokenService};
use crate::config::AppConfig;
use crate::error::ApiResult;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct RecordsServer {
    /// Loaded configuration
    pub config: Arc<AppConfig>,
    /// Entity store backend
    pub store: Arc<dyn EntityStore>,
    /// Authorization decisions
    pub engine: AccessControlEngine,
    /// Access token signing and verification
    pub tokens: Arc<TokenService>,
    started_at: Instant,
}

impl RecordsServer {
    /// Build the server, connecting to PostgreSQL when a database URL is configured
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store: Arc<dyn EntityStore> = match &config.database.url {
            Some(url) => {
                let store = PgStore::connect(url, config.database.max_connections)
                    .await
                    .context("Failed to connect to PostgreSQL")?;
                if config.database.run_migrations {
                    store.migrate().await.context("Failed to run migrations")?;
                    info!("Database migrations applied");
                }
                Arc::new(store)
            }
            None => {
                warn!("No database URL configured; using the in-memory store (data is lost on exit)");
                Arc::new(MemoryStore::new())
            }
        };

        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: AppConfig, store: Arc<dyn EntityStore>) -> Self {
        let secret = if config.auth.jwt_secret.is_empty() {
            warn!("No JWT secret configured; generated a per-process secret, tokens will not survive a restart");
            format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
        } else {
            config.auth.jwt_secret.clone()
        };
        let tokens = TokenService::new(
            &secret,
            config.auth.token_lifetime_secs,
            config.auth.refresh_lifetime_secs,
        );

        Self {
            config: Arc::new(config),
            store,
            engine: AccessControlEngine::new(),
            tokens: Arc::new(tokens),
            started_at: Instant::now(),
        }
    }

    /// In-memory server for tests and local experiments
    pub fn in_memory(config: AppConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub async fn begin(&self) -> ApiResult<Box<dyn StoreTx>> {
        Ok(self.store.begin().await?)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Create the configured bootstrap administrator if it does not exist yet.
    ///
    /// An existing user with that username is left untouched.
    pub async fn ensure_bootstrap_admin(&self) -> Result<()> {
        let Some(admin) = self.config.bootstrap_admin.clone() else {
            return Ok(());
        };

        let mut tx = self.store.begin().await?;
        if tx.find_user_by_username(&admin.username).await?.is_some() {
            info!(username = %admin.username, "Bootstrap admin already present");
            return Ok(());
        }

        let password_hash = password::hash_password_blocking(&admin.password).await?;
        let user = tx
            .insert_user(NewUser {
                username: admin.username,
                email: admin.email,
                password_hash,
                role: Role::Admin,
                first_name: String::new(),
                last_name: String::new(),
                is_active: true,
            })
            .await?;
        tx.commit().await?;

        info!(user_id = user.id, username = %user.username, "Bootstrap admin created");
        Ok(())
    }
}
