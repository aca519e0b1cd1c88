use crate::extractors::authenticated_identity::AuthenticatedIdentity;
use crate::ws::inbound;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use domain::identity::Identity;
use futures::{SinkExt, StreamExt};
use hub::{ConnectionReceiver, EventType};
use log::*;
use service::AppState;
use tokio::time::timeout;

/// Upgrades to a WebSocket carrying the caller's real-time events.
///
/// The connection is registered with the hub only once the upgrade has
/// completed, so an abandoned handshake never occupies a registry slot.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    AuthenticatedIdentity(identity): AuthenticatedIdentity,
    State(app_state): State<AppState>,
) -> Response {
    debug!("WebSocket upgrade requested by user {}", identity.user_id);
    ws.on_upgrade(move |socket| serve_socket(socket, app_state, identity))
}

async fn serve_socket(socket: WebSocket, app_state: AppState, identity: Identity) {
    let hub = app_state.hub.clone();
    let user_id = identity.user_id;

    let (connection, outbound) = hub.open_connection(user_id);
    let connection_id = match hub.register(user_id, connection).await {
        Ok(connection_id) => connection_id,
        Err(e) => {
            warn!("Refusing WebSocket for user {user_id}: {e}");
            return;
        }
    };

    let (sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(write_frames(sink, outbound));
    let idle_timeout = app_state.config.ws_idle_timeout();

    loop {
        tokio::select! {
            // The hub dropped the connection (overflow, shutdown) or the socket stopped accepting writes.
            _ = &mut writer => {
                debug!("Writer for connection {connection_id} finished");
                break;
            }
            next = timeout(idle_timeout, stream.next()) => match next {
                Err(_) => {
                    warn!("Closing idle connection {connection_id} of user {user_id}");
                    break;
                }
                Ok(None) | Ok(Some(Ok(Message::Close(_)))) => break,
                Ok(Some(Err(e))) => {
                    warn!("WebSocket error on connection {connection_id}: {e}");
                    break;
                }
                Ok(Some(Ok(Message::Text(text)))) => {
                    inbound::dispatch(&app_state, identity, connection_id, &text).await;
                }
                // Pings, pongs and binary frames still show the client is alive.
                Ok(Some(Ok(_))) => hub.record_activity(user_id).await,
            }
        }
    }

    hub.unregister(user_id, connection_id).await;
    writer.abort();
    debug!("Connection {connection_id} of user {user_id} closed");
}

async fn write_frames(
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound: ConnectionReceiver,
) {
    while let Some(envelope) = outbound.recv().await {
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize {} frame: {e}", envelope.event_type());
                continue;
            }
        };
        if sink.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
    // Best effort; the peer may already be gone.
    let _ = sink.close().await;
}
