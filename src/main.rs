mod auth;
mod config;
mod console;
mod form;
mod store;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::auth::AuthProvider;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load()?;

    let client = reqwest::Client::new();
    let auth = auth::SupabaseAuth::new(&config, client.clone());
    let store = Arc::new(store::PostgrestStore::new(&config, client, auth.subscribe()));

    console::run(auth, store).await?;

    info!("Editor closed");
    Ok(())
}
