#[macro_use]
extern crate serde;
#[macro_use]
extern crate lazy_static;

use mongodb::Client;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::error::{BackendError, ConfigurationError};
use crate::store::{MongoStore, Store};

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod resp;
pub mod role;
pub mod store;
pub mod util;

/// Everything an operation needs: the document store and loaded settings.
#[derive(Debug, Clone)]
pub struct Backend<S: Store> {
    pub store: S,
    pub config: Config,
}

impl<S: Store> Backend<S> {
    pub fn new(store: S, config: Config) -> Backend<S> {
        Backend { store, config }
    }
}

fn load_config() -> Result<Config, ConfigurationError> {
    tracing::info!("Loading configuration...");
    match Config::load() {
        Ok(c) => {
            tracing::info!("Configuration loaded from {}", c.file_path().display());
            Ok(c)
        }
        Err(ConfigurationError::NotFound(dir)) => {
            tracing::warn!(
                "No configuration in {}, generating defaults.",
                dir.display()
            );
            let c = Config::default();
            if let Err(e) = c.save() {
                tracing::warn!("Unable to save generated configuration: {}", e);
            }
            Ok(c)
        }
        Err(other) => {
            tracing::error!("Configuration error: {}", other);
            Err(other)
        }
    }
}

pub async fn create(log_level: Option<Level>) -> Result<Backend<MongoStore>, BackendError> {
    if let Some(l) = log_level {
        let subscriber = FmtSubscriber::builder().with_max_level(l).finish();

        if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Unable to set global logger: {}", err);
        };
        if let Err(err) = tracing_log::LogTracer::init() {
            eprintln!("Unable to forward log records: {}", err);
        }
    }

    tracing::info!("Reading .env file...");
    if dotenv::dotenv().is_err() {
        tracing::warn!("Unable to load .env file.");
    }

    let c = load_config()?;

    tracing::info!("Connecting to MongoDB: {}", c.mongodb_uri);
    let client = Client::with_uri_str(c.mongodb_uri.as_str()).await?;

    tracing::info!("Using MongoDB database: {}", c.mongodb_db);
    let store = MongoStore::new(client, c.mongodb_db.as_str(), c.use_transactions);

    if let Err(e) = store.database().list_collection_names(None).await {
        tracing::error!("Unable to connect to MongoDB.");
        return Err(e.into());
    }

    tracing::info!("Ensuring unique indexes...");
    store.ensure_indexes().await?;

    if !c.use_transactions {
        tracing::warn!(
            "Multi-document transactions are disabled; failed operations may leave partial writes."
        );
    }

    Ok(Backend::new(store, c))
}
