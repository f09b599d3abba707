//! TCP front: the accept loop with its advisory client limit and graceful
//! shutdown.

pub mod connection;

use crate::config::ServerProperties;
use crate::db::MultiDb;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};

pub struct Server {
    db: Arc<MultiDb>,
    max_clients: usize,
    connection_semaphore: Arc<Semaphore>,
}

impl Server {
    pub fn new(db: Arc<MultiDb>, props: &ServerProperties) -> Self {
        let max_clients = props.maxclients.max(1);
        Self {
            db,
            max_clients,
            connection_semaphore: Arc::new(Semaphore::new(max_clients)),
        }
    }

    pub async fn run(&self, addr: &str) -> anyhow::Result<()> {
        self.run_with_shutdown(addr, watch::channel(()).1).await
    }

    pub async fn run_with_shutdown(
        &self,
        addr: &str,
        mut shutdown_rx: watch::Receiver<()>,
    ) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(
            address = %addr,
            max_clients = self.max_clients,
            "server listening"
        );

        let mut connection_tasks = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((socket, peer_addr)) => {
                            // maxclients is advisory and enforced only here
                            let permit = match self.connection_semaphore.clone().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    warn!(
                                        peer = %peer_addr,
                                        max_clients = self.max_clients,
                                        "connection limit reached, rejecting connection"
                                    );
                                    continue;
                                }
                            };

                            let mut conn = connection::Connection::new(socket, peer_addr, self.db.clone());
                            let conn_span = info_span!("conn_task", peer = %peer_addr);
                            connection_tasks.spawn(
                                async move {
                                    let _permit = permit;
                                    if let Err(e) = conn.handle().await {
                                        error!(error = %e, "connection handler error");
                                    }
                                }
                                .instrument(conn_span),
                            );
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!("shutting down server");
                    break;
                }
            }
        }

        info!(
            connections = connection_tasks.len(),
            "waiting for connection tasks to drain"
        );
        while let Some(joined) = connection_tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "connection task panicked");
            }
        }
        Ok(())
    }
}
