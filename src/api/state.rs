// src/api/state.rs
use crate::config::AppConfig;
use crate::database::{self, SqliteStore};
use crate::errors::Result;
use crate::providers;
use crate::runner::BatchGradingCoordinator;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<BatchGradingCoordinator>,
    pub backend: String,
}

impl AppState {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let pool = database::init_db(config.database_url.as_deref()).await?;
        let store = Arc::new(SqliteStore::new(pool));

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.grading.job_timeout().max(Duration::from_secs(30)))
            .build()?;
        let job_client = providers::from_config(config, client);

        let coordinator = BatchGradingCoordinator::new(job_client, store, config.grading.clone());
        Ok(Self::from_parts(coordinator, config.backend.name()))
    }

    pub fn from_parts(coordinator: BatchGradingCoordinator, backend: impl Into<String>) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            backend: backend.into(),
        }
    }
}
