//! The server: listener, accept loop, inactivity audit, shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use rpchat_core::Room;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;

use crate::handler::{handle_connection, HandlerConfig};
use crate::state::ServerState;

/// The room shared by every connection task.
pub type SharedRoom = Arc<Mutex<Room>>;

/// Runtime configuration for the chat server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to listen on (default: 9001)
    pub port: u16,
    /// Maximum concurrent client connections (default: 1019, headroom
    /// under a typical 1024 fd limit for the listener and runtime)
    pub max_clients: usize,
    /// Seconds of silence before a client is disconnected (default: 60)
    pub conn_timeout_secs: u64,
    /// Seconds between inactivity audits (default: 10)
    pub audit_interval_secs: u64,
    /// Worker threads for the runtime the binary builds (default: 4)
    pub worker_threads: usize,
    /// Capacity of each session's wakeup channel (default: 8)
    pub notify_channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9001,
            max_clients: 1019,
            conn_timeout_secs: 60,
            audit_interval_secs: 10,
            worker_threads: 4,
            notify_channel_capacity: 8,
        }
    }
}

/// A BCP chat server.
pub struct ChatServer {
    state: Arc<ServerState>,
    room: SharedRoom,
    config: ServerConfig,
}

impl ChatServer {
    pub fn new(config: ServerConfig) -> Self {
        let room = Room::new(config.conn_timeout_secs, config.max_clients);
        Self {
            state: Arc::new(ServerState::new()),
            room: Arc::new(Mutex::new(room)),
            config,
        }
    }

    /// Handle to the shared room for external inspection.
    pub fn room(&self) -> &SharedRoom {
        &self.room
    }

    /// Number of active connections.
    pub fn connection_count(&self) -> usize {
        self.state.connection_count()
    }

    /// Run until SIGINT.
    ///
    /// Binds the listener, spawns the audit task, and accepts clients
    /// until the signal arrives; then every connection task finishes its
    /// teardown and is joined before this returns.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = bind_listener(self.config.port)?;
        info!("Server listening on {}", listener.local_addr()?);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let audit = tokio::spawn(audit_task(
            self.state.clone(),
            self.room.clone(),
            self.config.audit_interval_secs,
            shutdown_rx.clone(),
        ));

        let mut handlers = JoinSet::new();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("SIGINT received, shutting down..");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((socket, addr)) => {
                        if self.state.connection_count() >= self.config.max_clients {
                            warn!("Connection limit reached, dropping {}", addr);
                            drop(socket);
                            continue;
                        }
                        let handler_state = self.state.clone();
                        let handler_room = self.room.clone();
                        let handler_config = HandlerConfig {
                            notify_channel_capacity: self.config.notify_channel_capacity,
                        };
                        let handler_shutdown = shutdown_rx.clone();
                        handlers.spawn(async move {
                            if let Err(e) = handle_connection(
                                socket,
                                addr.to_string(),
                                handler_state,
                                handler_room,
                                &handler_config,
                                handler_shutdown,
                            )
                            .await
                            {
                                error!("Client handler error: {}", e);
                            }
                        });
                    }
                    Err(e) => error!("Error accepting connection: {}", e),
                },

                // reap finished connection tasks as we go
                Some(_) = handlers.join_next(), if !handlers.is_empty() => {}
            }
        }

        let _ = shutdown_tx.send(true);
        while handlers.join_next().await.is_some() {}
        let _ = audit.await;
        info!("Shutdown complete");
        Ok(())
    }
}

/// Bind the listening socket the way the protocol expects: wildcard
/// address, address and port reuse enabled.
fn bind_listener(port: u16) -> Result<TcpListener, std::io::Error> {
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.set_reuseport(true)?;
    socket.bind(SocketAddr::from(([0, 0, 0, 0], port)))?;
    socket.listen(1024)
}

/// Periodic inactivity audit.
///
/// Every tick, sessions silent for longer than the connection timeout are
/// marked failed with the standard reason and their handlers are woken to
/// run teardown.
async fn audit_task(
    state: Arc<ServerState>,
    room: SharedRoom,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = state.now_secs();
                let expired = {
                    let mut room = room.lock().await;
                    let expired = room.expired(now);
                    for id in &expired {
                        room.fail(*id, "Disconnected for inactivity.");
                    }
                    expired
                };
                if !expired.is_empty() {
                    info!("Disconnecting {} inactive session(s)", expired.len());
                }
                for id in expired {
                    state.notify_session(id);
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
