use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;
use uuid::Uuid;

use crate::{
    config::AppConfig, generator::GeneratorClient, modules::filters::SessionStore, web::auth,
};

const SEED_ADMIN_EMAIL: &str = "admin@sacmaudisan.vn";
const SEED_ADMIN_PASSWORD: &str = "admin123";

#[derive(Clone)]
pub struct AppState {
    pool: PgPool,
    config: Arc<AppConfig>,
    generator: GeneratorClient,
    filter_sessions: SessionStore,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("failed to connect to Postgres")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run database migrations")?;

        tokio::fs::create_dir_all(&config.uploads_dir)
            .await
            .with_context(|| format!("failed to create uploads dir {}", config.uploads_dir))?;

        let generator = GeneratorClient::new(config.generator_base_url.as_str());

        Ok(Self {
            pool,
            config: Arc::new(config),
            generator,
            filter_sessions: SessionStore::new(),
        })
    }

    pub async fn ensure_seed_admin(&self) -> Result<()> {
        let has_users: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users)")
            .fetch_one(&self.pool)
            .await
            .context("failed to verify user presence")?;

        if !has_users {
            let password_hash = auth::hash_password(SEED_ADMIN_PASSWORD)
                .map_err(|err| anyhow!("failed to hash seed admin password: {err}"))?;

            sqlx::query(
                "INSERT INTO users (id, email, password, name, role) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(SEED_ADMIN_EMAIL)
            .bind(password_hash)
            .bind("Admin User")
            .bind("admin")
            .execute(&self.pool)
            .await
            .context("failed to insert seed admin user")?;

            info!(
                "Seeded default admin user '{SEED_ADMIN_EMAIL}' (password: '{SEED_ADMIN_PASSWORD}'). Update it promptly."
            );
        }

        Ok(())
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    pub fn pool_ref(&self) -> &PgPool {
        &self.pool
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn generator(&self) -> &GeneratorClient {
        &self.generator
    }

    pub fn filter_sessions(&self) -> &SessionStore {
        &self.filter_sessions
    }
}
