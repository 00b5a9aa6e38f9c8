use std::sync::Arc;

use axum::extract::FromRef;
use config::{Environment, File};
use tokio::sync::Mutex;
use tower_sessions::ExpiredDeletion;

use crate::{
    db::{bill::BillStore, memory::InMemStore, user::UserStore},
    web::{cache::BillCache, files::FileStore, rate_limit::RateLimiter, session::InMemSessionStore},
};

pub mod db;
pub mod web;

#[derive(Clone, Debug, serde::Deserialize)]
pub struct Config {
    pub address: std::net::SocketAddr,
    pub domain: String,
    pub cookie_secure: bool,
    pub log_level: String,
    pub db_user: String,
    pub db_password: String,
    pub db_name: String,
    pub db_host: String,
    pub upload_dir: String,
}

impl Config {
    pub fn db_connection_string(&self) -> String {
        let db_name = if self.db_name.is_empty() {
            "".to_string()
        } else {
            format!("/{}", self.db_name)
        };
        format!(
            "postgres://{}:{}@{}?host={}",
            self.db_user, self.db_password, db_name, self.db_host
        )
    }
}

impl Config {
    pub fn new() -> Self {
        let s = config::Config::builder()
            .add_source(File::with_name(&format!(
                "{}/config/config.toml",
                env!("CARGO_MANIFEST_DIR")
            )))
            .add_source(Environment::with_prefix("BILLPAY").separator("__"))
            .build()
            .expect("failed to build config");

        s.try_deserialize().expect("failed to parse config")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, FromRef)]
pub struct Ctx {
    pub bill_store: Arc<dyn BillStore>,
    pub user_store: Arc<dyn UserStore>,
    pub config: Config,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
    pub session_store: InMemSessionStore,
    pub bill_cache: BillCache,
    pub files: FileStore,
}

impl Ctx {
    pub async fn new(cfg: &Config) -> Result<Self, anyhow::Error> {
        let db = db::PostgresStore::new(&cfg.db_connection_string()).await?;
        db.init().await?;
        let store = Arc::new(db);

        let session_store = InMemSessionStore::default();

        // Delete expired sessions regularly
        let session_store_clone = session_store.clone();
        tokio::spawn(async move {
            if let Err(e) = session_store_clone
                .continuously_delete_expired(tokio::time::Duration::from_secs(60))
                .await
            {
                tracing::error!("Error deleting expired sessions: {e}");
            }
        });

        Ok(Self {
            bill_store: store.clone(),
            user_store: store,
            config: cfg.to_owned(),
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new())),
            session_store,
            bill_cache: BillCache::default(),
            files: FileStore::new(&cfg.upload_dir)?,
        })
    }

    /// Context backed by in-memory stores, for tests and storage-free development.
    pub fn in_memory(cfg: &Config) -> Result<Self, anyhow::Error> {
        let store = Arc::new(InMemStore::default());

        Ok(Self {
            bill_store: store.clone(),
            user_store: store,
            config: cfg.to_owned(),
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new())),
            session_store: InMemSessionStore::default(),
            bill_cache: BillCache::default(),
            files: FileStore::new(&cfg.upload_dir)?,
        })
    }
}
