use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::config::AppConfig;
use crate::notify::{EventPublisher, RedisQueuePublisher};
use crate::users::repo::{PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub queue: Arc<dyn EventPublisher>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
            tracing::warn!(error = %e, "migration failed; continuing");
        }

        let queue = RedisQueuePublisher::connect(&config.queue.url, &config.queue.queue_name)
            .await
            .context("connect to queue transport")?;
        // Provisioning is idempotent and repeated before every publish; a
        // failure here only means degraded event delivery, not a dead app.
        if let Err(e) = queue.ensure_channel().await {
            tracing::warn!(error = %e, "queue transport unreachable at startup");
        }

        Ok(Self {
            users: Arc::new(PgUserStore::new(db)),
            queue: Arc::new(queue),
            config,
        })
    }
}
