use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{hub::SessionHub, registry::SubscriptionRegistry, router::RequestRouter};

/// Shared state behind the `/ws/market` route.
pub struct GatewayState {
    pub hub: Arc<SessionHub>,
    pub registry: Arc<SubscriptionRegistry>,
    pub router: Arc<RequestRouter>,
}

#[must_use]
pub fn ws_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/ws/market", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One client connection: a write flow draining the session's outbound
/// queue and a read flow feeding the request router. Either side ending
/// tears the session down and runs the disconnect path.
async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>) {
    let session_id = Uuid::new_v4();
    let mut outbound = state.hub.register(session_id);
    info!(%session_id, "Session connected");

    let (mut sink, mut stream) = socket.split();

    let write_flow = async {
        while let Some(frame) = outbound.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!(%session_id, "Frame serialization failed: {e}");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    };

    let read_flow = async {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    state.router.handle(session_id, text.as_str()).await;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(%session_id, "Read error: {e}");
                    break;
                }
            }
        }
    };

    // Whichever flow finishes first ends the session; the other is dropped.
    tokio::select! {
        () = write_flow => {}
        () = read_flow => {}
    }

    // Disconnect path: session table, both correlation maps, then the
    // interest index (which releases realtime rows as needed).
    state.hub.unregister(session_id);
    if let Err(e) = state.registry.on_disconnect(session_id).await {
        warn!(%session_id, "Disconnect cleanup failed: {e:#}");
    }
    info!(%session_id, "Session closed");
}
