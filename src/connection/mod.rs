//! Connection management for MongoDB
//!
//! Parses the connection URI, applies timeouts, and verifies the server
//! answers before any export starts.

use mongodb::bson::doc;
use mongodb::{Client, Database, options::ClientOptions};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{ConnectionError, Result};

/// Application name reported to the server.
const APP_NAME: &str = "docsnap";

/// MongoDB connection manager
pub struct ConnectionManager {
    /// MongoDB client instance, present once connected
    client: Option<Client>,

    /// Store configuration (URI, database, timeout)
    config: StoreConfig,
}

impl ConnectionManager {
    /// Create a new, disconnected manager
    pub fn new(config: StoreConfig) -> Self {
        Self {
            client: None,
            config,
        }
    }

    /// Establish connection to MongoDB and ping the server
    pub async fn connect(&mut self) -> Result<()> {
        let options = self.client_options().await?;
        let client = Client::with_options(options).map_err(ConnectionError::from)?;

        let round_trip = Self::ping(&client).await?;
        debug!(response_time_ms = round_trip.as_millis() as u64, "server answered ping");

        self.client = Some(client);
        info!(database = %self.config.database, "connected to store");
        Ok(())
    }

    /// Parse the URI and apply the configured timeout
    async fn client_options(&self) -> Result<ClientOptions> {
        let mut options = ClientOptions::parse(&self.config.uri)
            .await
            .map_err(|e| ConnectionError::InvalidUri(format!("{}: {e}", sanitize(&self.config.uri))))?;

        let timeout = self.config.connection_timeout();
        options.app_name = Some(APP_NAME.to_string());
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);
        Ok(options)
    }

    async fn ping(client: &Client) -> Result<Duration> {
        let started = Instant::now();
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ConnectionError::PingFailed(ConnectionError::from(e).to_string()))?;
        Ok(started.elapsed())
    }

    /// Disconnect from MongoDB
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.shutdown().await;
            debug!("store connection closed");
        }
        Ok(())
    }

    /// Get the MongoDB client
    pub fn get_client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| ConnectionError::NotConnected.into())
    }

    /// Handle on the configured database
    pub fn database(&self) -> Result<Database> {
        Ok(self.get_client()?.database(&self.config.database))
    }
}

/// Hide the password of a connection URI
pub fn sanitize(uri: &str) -> String {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return uri.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return uri.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:****@{host}"),
        None => uri.to_string(),
    }
}
