//! Process lifecycle
//!
//! [`Server`] runs the RADIUS and health listeners side by side. The first
//! listener to fail (or stop on its own) ends the run; otherwise the run
//! lasts until the shutdown signal fires, after which both listeners are
//! stopped concurrently, each bounded by the grace period.

use crate::health::HealthServer;
use crate::transport::{PacketServer, TransportError};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Time each listener gets to stop once shutdown begins
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RADIUS transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("{0} listener stopped unexpectedly")]
    ListenerStopped(&'static str),
    #[error("listener task failed: {0}")]
    ListenerTask(#[from] tokio::task::JoinError),
    #[error("{listener} listener did not stop within {grace:?}")]
    ShutdownTimeout {
        listener: &'static str,
        grace: Duration,
    },
    #[error("shutdown failed: {}", join_errors(.0))]
    Shutdown(Vec<ServerError>),
}

fn join_errors(errors: &[ServerError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Something [`Server`] can start and stop
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Runs until the listener stops
    async fn serve(&self) -> Result<(), ServerError>;

    /// Makes a running `serve` return and waits for in-flight work
    async fn shutdown(&self) -> Result<(), ServerError>;
}

#[async_trait]
impl Listener for PacketServer {
    fn name(&self) -> &'static str {
        "radius"
    }

    async fn serve(&self) -> Result<(), ServerError> {
        Ok(PacketServer::serve(self).await?)
    }

    async fn shutdown(&self) -> Result<(), ServerError> {
        Ok(PacketServer::shutdown(self).await?)
    }
}

#[async_trait]
impl Listener for HealthServer {
    fn name(&self) -> &'static str {
        "health"
    }

    async fn serve(&self) -> Result<(), ServerError> {
        Ok(HealthServer::serve(self).await?)
    }

    async fn shutdown(&self) -> Result<(), ServerError> {
        Ok(HealthServer::shutdown(self).await?)
    }
}

pub struct Server {
    radius: Arc<dyn Listener>,
    health: Arc<dyn Listener>,
    shutdown_grace: Duration,
}

impl Server {
    pub fn new(radius: Arc<dyn Listener>, health: Arc<dyn Listener>) -> Self {
        Server {
            radius,
            health,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Serve both listeners until `shutdown` completes or one of them stops
    pub async fn run<F>(&self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let mut tasks = JoinSet::new();
        for listener in [&self.radius, &self.health] {
            let listener = Arc::clone(listener);
            tasks.spawn(async move { (listener.name(), listener.serve().await) });
        }

        let result = tokio::select! {
            _ = shutdown => {
                info!("Shutdown signal received, stopping listeners");
                self.stop().await
            }
            Some(joined) = tasks.join_next() => {
                let e = match joined {
                    Ok((name, Ok(()))) => ServerError::ListenerStopped(name),
                    Ok((name, Err(e))) => {
                        error!(listener = name, error = %e, "Listener failed");
                        e
                    }
                    Err(e) => e.into(),
                };
                Err(e)
            }
        };

        tasks.abort_all();
        result
    }

    async fn stop(&self) -> Result<(), ServerError> {
        let (radius, health) = tokio::join!(
            stop_listener(self.radius.as_ref(), self.shutdown_grace),
            stop_listener(self.health.as_ref(), self.shutdown_grace),
        );

        let errors: Vec<ServerError> = [radius, health].into_iter().filter_map(Result::err).collect();
        if errors.is_empty() {
            info!("All listeners stopped");
            Ok(())
        } else {
            Err(ServerError::Shutdown(errors))
        }
    }
}

async fn stop_listener(listener: &dyn Listener, grace: Duration) -> Result<(), ServerError> {
    let name = listener.name();
    match tokio::time::timeout(grace, listener.shutdown()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(listener = name, error = %e, "Stopping listener");
            Err(e)
        }
        Err(_) => {
            error!(listener = name, ?grace, "Listener did not stop in time");
            Err(ServerError::ShutdownTimeout {
                listener: name,
                grace,
            })
        }
    }
}
