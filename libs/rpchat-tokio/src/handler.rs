//! Per-connection task.

use std::sync::Arc;

use bytes::BytesMut;
use log::{debug, info, trace, warn};
use rpchat_core::SessionId;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use crate::io::{read_frame, write_frame};
use crate::server::SharedRoom;
use crate::state::{ConnectionHandle, ServerState};

/// Connection-handling knobs.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Capacity of the per-session wakeup channel
    pub notify_channel_capacity: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            notify_channel_capacity: 8,
        }
    }
}

/// Drive one client connection to completion.
///
/// The task owns the socket and its receive buffer. It waits on three
/// things at once: bytes from the client, a wakeup saying the room queued
/// frames for this session, and the server-wide shutdown signal. All
/// writes happen here, in queue order, so the per-connection frame order
/// is exactly the order the room produced.
pub async fn handle_connection(
    mut socket: TcpStream,
    peer_addr: String,
    state: Arc<ServerState>,
    room: SharedRoom,
    config: &HandlerConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let session_id = state.generate_session_id();
    let (notify_tx, mut notify_rx) = mpsc::channel(config.notify_channel_capacity);

    {
        let mut room = room.lock().await;
        if let Err(e) = room.attach(session_id, state.now_secs()) {
            warn!("Refusing connection from {}: {}", peer_addr, e);
            return Ok(());
        }
    }
    state.register_notification(session_id, notify_tx);
    state.connections.insert(
        session_id,
        ConnectionHandle {
            session_id,
            peer_addr: peer_addr.clone(),
        },
    );
    info!("Session {} connected from {}", session_id, peer_addr);

    let mut read_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            read_result = read_frame(&mut socket, &mut read_buffer) => {
                match read_result {
                    Ok(Some(frame)) => {
                        debug!("Session {}: received {}", session_id, frame.opcode());
                        let now = state.now_secs();
                        let handled = room.lock().await.handle_frame(session_id, frame, now);
                        if let Err(e) = handled {
                            warn!("Session {}: {}", session_id, e);
                            break;
                        }
                        match flush_outbound(&mut socket, &state, &room, session_id).await {
                            Ok(false) => {}
                            Ok(true) => break,
                            Err(e) => {
                                warn!("Session {}: write error: {}", session_id, e);
                                room.lock().await.fail(session_id, "Write failed.");
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        info!("Session {} closed by peer", session_id);
                        room.lock().await.fail(session_id, "Connection closed.");
                        break;
                    }
                    Err(e) => {
                        warn!("Session {}: {}", session_id, e);
                        room.lock().await.fail(session_id, e.to_string());
                        break;
                    }
                }
            }

            Some(()) = notify_rx.recv() => {
                trace!("Session {}: outbound wakeup", session_id);
                match flush_outbound(&mut socket, &state, &room, session_id).await {
                    Ok(false) => {}
                    Ok(true) => break,
                    Err(e) => {
                        warn!("Session {}: write error: {}", session_id, e);
                        room.lock().await.fail(session_id, "Write failed.");
                        break;
                    }
                }
            }

            _ = shutdown.changed() => {
                info!("Session {} stopping for shutdown", session_id);
                break;
            }
        }
    }

    teardown(socket, &state, &room, session_id).await;
    Ok(())
}

/// Send every frame the room currently permits for this session, then
/// wake any other session that gained queued frames.
///
/// Returns `Ok(true)` when the session has been marked failed (by its own
/// dispatch or by the audit task) and the handler should tear down.
async fn flush_outbound(
    socket: &mut TcpStream,
    state: &ServerState,
    room: &SharedRoom,
    session_id: SessionId,
) -> Result<bool, std::io::Error> {
    let (frames, peers, failed) = {
        let mut room = room.lock().await;
        let mut frames = Vec::new();
        while let Some(frame) = room.next_outbound(session_id) {
            frames.push(frame);
        }
        let peers: Vec<SessionId> = room
            .sessions_with_pending()
            .into_iter()
            .filter(|peer| *peer != session_id)
            .collect();
        (frames, peers, room.session_failed(session_id))
    };

    for frame in &frames {
        debug!("Session {}: sending {}", session_id, frame.opcode());
        write_frame(socket, frame).await?;
    }
    for peer in peers {
        state.notify_session(peer);
    }
    Ok(failed)
}

/// Uniform teardown: best-effort farewell STATUS, departure notice to the
/// rest of the room, socket close, state cleanup.
async fn teardown(
    mut socket: TcpStream,
    state: &ServerState,
    room: &SharedRoom,
    session_id: SessionId,
) {
    let (parting, farewell, peers) = {
        let mut room = room.lock().await;
        let parting = room.drain_parting(session_id);
        let farewell = room.close_status(session_id);
        let peers = room.detach(session_id);
        (parting, farewell, peers)
    };
    for frame in &parting {
        let _ = write_frame(&mut socket, frame).await;
    }
    if let Some(frame) = farewell {
        let _ = write_frame(&mut socket, &frame).await;
    }
    let _ = socket.shutdown().await;
    for peer in peers {
        state.notify_session(peer);
    }
    state.remove_notification(session_id);
    state.connections.remove(&session_id);
    info!("Session {} closed", session_id);
}
