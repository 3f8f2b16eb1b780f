use crate::api::SocialApi;
use crate::breaker::Breaker;
use crate::db::{self, Pool};
use crate::model::Credential;
use crate::settings::Settings;
use anyhow::Result;
use std::sync::Arc;

/// Shared state handed to every job at construction: one pool, one API
/// client, one breaker. No ambient globals.
pub struct AppContext {
    pub pool: Pool,
    pub settings: Settings,
    pub api: Arc<dyn SocialApi>,
    pub breaker: Breaker,
    /// Credential of the target flagged `is_global_credential`, resolved once
    /// at startup. Discovery has no credential of its own and borrows this.
    pub global_credential: Option<Credential>,
}

impl AppContext {
    pub async fn resolve(pool: Pool, api: Arc<dyn SocialApi>) -> Result<Arc<Self>> {
        let settings = Settings::new(pool.clone());
        let global_credential = db::global_credential(&pool).await?;
        Ok(Arc::new(Self {
            pool,
            settings,
            api,
            breaker: Breaker::new(),
            global_credential,
        }))
    }
}
