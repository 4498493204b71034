//! Service registration: presence heartbeat and router-tier advertisement.
//!
//! Both loops are best effort. A failed heartbeat or a dropped bus
//! connection is logged and retried; it never takes the process down.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use quay_store::{PresenceKeeper, ReceptorPresence};

use crate::shutdown::Shutdown;

/// How the facade advertises itself to the routing tier.
#[derive(Debug, Clone)]
pub struct RouterRegistration {
    /// NATS server addresses, e.g. `nats://127.0.0.1:4222`.
    pub nats_addresses: Vec<String>,
    /// Bus credentials, when the bus requires them.
    pub nats_username: Option<String>,
    /// Bus credentials, when the bus requires them.
    pub nats_password: Option<String>,
    /// Host names routed to this facade.
    pub uris: Vec<String>,
    /// Address the router should forward to.
    pub host: String,
    /// Port the router should forward to.
    pub port: u16,
    /// How often the registration is re-published.
    pub interval: Duration,
}

/// The payload the routing tier expects on `router.register`.
#[derive(Debug, Serialize)]
struct RegistryMessage<'a> {
    uris: &'a [String],
    host: &'a str,
    port: u16,
}

const REGISTER_SUBJECT: &str = "router.register";
const UNREGISTER_SUBJECT: &str = "router.unregister";

/// Periodically advertises the facade's URIs to the routing tier, and
/// unregisters them on shutdown.
///
/// Reconnects are the NATS client's concern; publish failures are logged
/// and retried on the next tick.
pub async fn run_router_registration(config: RouterRegistration, mut shutdown: Shutdown) {
    let mut options = async_nats::ConnectOptions::new();
    if let (Some(username), Some(password)) = (&config.nats_username, &config.nats_password) {
        options = options.user_and_password(username.clone(), password.clone());
    }

    let client = match options.connect(config.nats_addresses.join(",")).await {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %err, "Router registration disabled: NATS connect failed");
            return;
        }
    };
    tracing::info!(uris = ?config.uris, "Router registration started");

    let message = RegistryMessage {
        uris: &config.uris,
        host: &config.host,
        port: config.port,
    };
    let payload = match serde_json::to_vec(&message) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::error!(error = %err, "Router registration disabled: payload encoding failed");
            return;
        }
    };

    let mut ticker = tokio::time::interval(config.interval);
    loop {
        tokio::select! {
            () = shutdown.triggered() => break,
            _ = ticker.tick() => {
                if let Err(err) = client
                    .publish(REGISTER_SUBJECT.to_string(), payload.clone().into())
                    .await
                {
                    tracing::warn!(error = %err, "Failed to publish router registration");
                }
            }
        }
    }

    if let Err(err) = client
        .publish(UNREGISTER_SUBJECT.to_string(), payload.into())
        .await
    {
        tracing::warn!(error = %err, "Failed to publish router unregistration");
    }
    if let Err(err) = client.flush().await {
        tracing::warn!(error = %err, "Failed to flush router unregistration");
    }
    tracing::info!("Router registration stopped");
}

/// Re-writes the facade's presence record on an interval until shutdown.
///
/// The interval must be shorter than `ttl` or the record will flap.
pub async fn run_presence_heartbeat(
    keeper: Arc<dyn PresenceKeeper>,
    presence: ReceptorPresence,
    ttl: Duration,
    interval: Duration,
    mut shutdown: Shutdown,
) {
    tracing::info!(receptor_id = %presence.receptor_id, "Presence heartbeat started");
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            () = shutdown.triggered() => break,
            _ = ticker.tick() => {
                if let Err(err) = keeper.set_presence(&presence, ttl).await {
                    tracing::warn!(error = %err, "Failed to refresh presence record");
                }
            }
        }
    }
    tracing::info!("Presence heartbeat stopped");
}
