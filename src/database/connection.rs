use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};

use crate::config::{AppConfig, DEFAULT_DATABASE};
use crate::services::storage::StorageError;

/// Connects and pings MongoDB, giving up after the configured timeout.
pub async fn connect_database(config: &AppConfig) -> Result<Database, StorageError> {
    let mut options = ClientOptions::parse(&config.mongodb_uri).await?;
    options.connect_timeout = Some(config.db_connect_timeout);
    options.server_selection_timeout = Some(config.db_connect_timeout);
    options.app_name = Some("imf-pay-api".to_string());

    let db_name = config
        .mongodb_database
        .clone()
        .or_else(|| options.default_database.clone())
        .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

    let client = Client::with_options(options)?;
    let db = client.database(&db_name);

    let ping = tokio::time::timeout(
        config.db_connect_timeout * 2,
        db.run_command(doc! { "ping": 1 }),
    )
    .await;

    match ping {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(StorageError::Unavailable(format!(
                "no answer from MongoDB within {:?}",
                config.db_connect_timeout * 2
            )))
        }
    }

    match db.list_collection_names().await {
        Ok(collections) => {
            tracing::info!("✅ Connected to database: {}", db_name);
            tracing::info!("📂 Collections found: {:?}", collections);
            if !collections.iter().any(|c| c == "payments") {
                tracing::info!("'payments' collection will be created on first insert");
            }
        }
        Err(e) => {
            tracing::warn!("⚠️ Connected to '{}' but could not list collections: {}", db_name, e);
        }
    }

    Ok(db)
}
