//! Bus connection for the messaging commands

use anyhow::{Context, Result};
use bridge_lib::messaging::{MessagingClient, StompConfig, StompConnector};
use std::sync::Arc;
use std::time::Duration;

/// Connection options shared by the bus commands
#[derive(Debug, Clone, clap::Args)]
pub struct BusArgs {
    /// STOMP host of the message bus
    #[arg(long, env = "BRIDGE_BUS_HOST", default_value = "localhost")]
    pub bus_host: String,

    /// STOMP port of the message bus
    #[arg(long, env = "BRIDGE_BUS_PORT", default_value_t = 61613)]
    pub bus_port: u16,

    #[arg(long, env = "BRIDGE_BUS_USERNAME")]
    pub bus_username: Option<String>,

    #[arg(long, env = "BRIDGE_BUS_PASSWORD", hide_env_values = true)]
    pub bus_password: Option<String>,

    /// Seconds to wait for the connection and for replies
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,
}

impl BusArgs {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Connect and wait until the bus is open
    pub async fn connect(&self) -> Result<MessagingClient> {
        let connector = StompConnector::new(StompConfig {
            host: self.bus_host.clone(),
            port: self.bus_port,
            username: self.bus_username.clone(),
            password: self.bus_password.clone(),
            connect_timeout: self.timeout(),
        });
        let client = MessagingClient::builder()
            .connector(Arc::new(connector))
            .best_effort_timeout(self.timeout())
            .instance("appctl")
            .build()
            .context("Failed to create messaging client")?;

        client.start();
        if !client.wait_until_open(self.timeout()).await {
            let reason = client
                .connection_stats()
                .last_error
                .unwrap_or_else(|| "timed out".to_string());
            client.shutdown().await;
            anyhow::bail!(
                "Could not connect to {}:{} ({})",
                self.bus_host,
                self.bus_port,
                reason
            );
        }
        Ok(client)
    }
}
