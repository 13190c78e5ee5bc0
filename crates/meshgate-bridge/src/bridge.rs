//! Startup wiring: shared state, both sessions and their tasks.

use std::path::Path;
use std::sync::Arc;

use meshgate_geo::{ArcGisGeocoder, DisabledGeocoder, LocationCache, ReverseGeocoder};
use meshgate_store::Database;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::BridgeSettings;
use crate::error::Result;
use crate::mqtt;
use crate::router::{LocalRouter, RemoteRouter};
use crate::session::{BrokerSession, ReconnectPolicy, SessionHandle};
use crate::telemetry::PositionTracker;
use crate::transport::{BrokerLink, EventSource};

/// One side of the bridge before its session is built.
pub struct Endpoint<E> {
    pub link: Arc<dyn BrokerLink>,
    pub events: E,
}

/// The running local and remote sessions.
pub struct Bridge {
    local: SessionHandle,
    remote: SessionHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Open the position store, seed the cache and connect both brokers.
    pub async fn start(settings: &BridgeSettings, state_path: &Path) -> Result<Self> {
        let geocoder: Arc<dyn ReverseGeocoder> = if settings.geocoder.enabled {
            info!(endpoint = %settings.geocoder.endpoint, "Reverse geocoding enabled");
            Arc::new(ArcGisGeocoder::new(
                settings.geocoder.endpoint.clone(),
                settings.geocoder.timeout(),
            )?)
        } else {
            info!("Reverse geocoding disabled");
            Arc::new(DisabledGeocoder)
        };
        let cache = Arc::new(LocationCache::new(geocoder));

        let local_db = Database::open_at(state_path)?;
        let remote_db = Database::open_at(state_path)?;
        seed_cache(&cache, &local_db).await?;

        let (local_link, local_events) = mqtt::connect("local", &settings.local);
        let (remote_link, remote_events) = mqtt::connect("remote", &settings.remote);

        Ok(Self::spawn(
            settings,
            cache,
            (local_db, remote_db),
            Endpoint {
                link: Arc::new(local_link),
                events: local_events,
            },
            Endpoint {
                link: Arc::new(remote_link),
                events: remote_events,
            },
        ))
    }

    /// Build both sessions on the given transports and spawn their tasks.
    pub fn spawn<L, R>(
        settings: &BridgeSettings,
        cache: Arc<LocationCache>,
        (local_db, remote_db): (Database, Database),
        local: Endpoint<L>,
        remote: Endpoint<R>,
    ) -> Self
    where
        L: EventSource + 'static,
        R: EventSource + 'static,
    {
        let local_handle = SessionHandle::new("local", local.link);
        let remote_handle = SessionHandle::new("remote", remote.link);

        let local_router = LocalRouter::new(
            PositionTracker::new("local", local_db, cache.clone()),
            settings.clients.clone(),
            settings.telemetry.clone(),
            local_handle.clone(),
        );
        let remote_router = RemoteRouter::new(
            PositionTracker::new("remote", remote_db, cache),
            settings.clients.clone(),
            settings.remote.subscriptions.clone(),
            local_handle.clone(),
        );

        let local_session = BrokerSession::new(
            local_handle.clone(),
            local.events,
            local_router,
            ReconnectPolicy::default(),
        );
        let remote_session = BrokerSession::new(
            remote_handle.clone(),
            remote.events,
            remote_router,
            ReconnectPolicy::default(),
        );

        let tasks = vec![
            tokio::spawn(local_session.run()),
            tokio::spawn(remote_session.run()),
        ];

        Self {
            local: local_handle,
            remote: remote_handle,
            tasks,
        }
    }

    pub fn local(&self) -> &SessionHandle {
        &self.local
    }

    pub fn remote(&self) -> &SessionHandle {
        &self.remote
    }

    /// Stop both sessions.
    pub async fn stop(&self) {
        tokio::join!(self.local.stop(), self.remote.stop());
    }

    /// Wait for both session tasks to finish.
    pub async fn wait(self) -> Result<()> {
        for task in self.tasks {
            task.await?;
        }
        Ok(())
    }
}

async fn seed_cache(cache: &LocationCache, db: &Database) -> Result<()> {
    let positions = db.load_positions()?;
    cache.load(&positions).await;
    info!(count = positions.len(), "Loaded stored node positions");
    Ok(())
}
