//! Statement publication
//!
//! A `Publisher` makes a hosted entity's statements reachable by others:
//! `start_serving` before a challenge-solving window, `stop_serving` after.

use async_trait::async_trait;
use fedcert_core::EntityId;
use fedcert_trust::StatementFetcher;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::api::{create_router, handlers::AppState};
use crate::error::{PlaneError, Result};
use crate::host::HostedEntity;

/// Publication lifecycle for hosted entities
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Start publishing `entity`'s statements
    async fn start_serving(&self, entity: Arc<HostedEntity>) -> Result<()>;

    /// Stop publishing the statements of `id`
    async fn stop_serving(&self, id: &EntityId) -> Result<()>;

    /// Whether `id` is currently published
    fn is_serving(&self, id: &EntityId) -> bool;
}

struct Served {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Entry per entity; `Starting` reserves the id while the listener binds
enum Slot {
    Starting,
    Running(Served),
}

/// Publisher running one axum listener per hosted entity
///
/// Listeners bind to consecutive ports starting at `base_port`. A base port
/// of 0 gives every listener an ephemeral port.
pub struct HttpPublisher {
    bind_host: String,
    next_port: Mutex<u16>,
    fetcher: Arc<dyn StatementFetcher>,
    servers: Mutex<HashMap<EntityId, Slot>>,
}

impl HttpPublisher {
    /// Create a publisher; `fetcher` is what served entities use to reach
    /// the subordinates they are asked to register
    pub fn new(
        bind_host: impl Into<String>,
        base_port: u16,
        fetcher: Arc<dyn StatementFetcher>,
    ) -> Self {
        Self {
            bind_host: bind_host.into(),
            next_port: Mutex::new(base_port),
            fetcher,
            servers: Mutex::new(HashMap::new()),
        }
    }

    /// Address `id` is served on
    pub fn local_addr(&self, id: &EntityId) -> Option<SocketAddr> {
        match self.servers.lock().unwrap().get(id) {
            Some(Slot::Running(served)) => Some(served.addr),
            _ => None,
        }
    }

    /// Base URL `id` is served from
    pub fn base_url(&self, id: &EntityId) -> Option<String> {
        self.local_addr(id).map(|addr| format!("http://{}", addr))
    }

    fn allocate_port(&self) -> Result<u16> {
        let mut next = self.next_port.lock().unwrap();
        let port = *next;
        if port != 0 {
            *next = port
                .checked_add(1)
                .ok_or_else(|| PlaneError::Publish("port range exhausted".into()))?;
        }
        Ok(port)
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn start_serving(&self, entity: Arc<HostedEntity>) -> Result<()> {
        let id = entity.id().clone();
        {
            let mut servers = self.servers.lock().unwrap();
            if servers.contains_key(&id) {
                return Err(PlaneError::AlreadyServing(id.to_string()));
            }
            servers.insert(id.clone(), Slot::Starting);
        }

        let bound = match self.allocate_port() {
            Ok(port) => bind(&self.bind_host, port).await,
            Err(e) => Err(e),
        };
        let (listener, addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                self.servers.lock().unwrap().remove(&id);
                return Err(e);
            }
        };

        let state = Arc::new(AppState {
            entity,
            fetcher: self.fetcher.clone(),
        });
        let app = create_router(state);

        let (shutdown, signal) = oneshot::channel::<()>();
        let served_id = id.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = signal.await;
                })
                .await;
            if let Err(e) = result {
                error!(entity = %served_id, error = %e, "Publication server failed");
            }
        });

        info!(entity = %id, addr = %addr, "Serving entity statements");
        self.servers.lock().unwrap().insert(
            id,
            Slot::Running(Served {
                addr,
                shutdown,
                task,
            }),
        );
        Ok(())
    }

    async fn stop_serving(&self, id: &EntityId) -> Result<()> {
        let served = {
            let mut servers = self.servers.lock().unwrap();
            match servers.remove(id) {
                Some(Slot::Running(served)) => served,
                Some(Slot::Starting) => {
                    servers.insert(id.clone(), Slot::Starting);
                    return Err(PlaneError::Publish(format!("{} is still starting", id)));
                }
                None => return Err(PlaneError::EntityNotFound(id.to_string())),
            }
        };

        // Receiver is gone only if the server already exited
        let _ = served.shutdown.send(());
        served
            .task
            .await
            .map_err(|e| PlaneError::Publish(e.to_string()))?;

        info!(entity = %id, addr = %served.addr, "Stopped serving entity statements");
        Ok(())
    }

    fn is_serving(&self, id: &EntityId) -> bool {
        self.servers.lock().unwrap().contains_key(id)
    }
}

async fn bind(host: &str, port: u16) -> Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind((host, port)).await?;
    let addr = listener.local_addr()?;
    Ok((listener, addr))
}
