use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::Response;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use super::message::{parse_client_message, sanitize_for_log, ClientMessage};
use crate::application::{
    AdmissionDenied, ConnectionGuard, ConnectionTracker, MessageRateLimiter, MonitoringService,
    SubscriberId, Subscription,
};
use crate::domain::{ErrorCode, ServerMessage};
use crate::interface::http::AppState;

const RATE_LIMITED_MESSAGE: &str = "Too many messages. Please slow down.";

/// Limits and shared counters for streaming connections
pub struct WsSettings {
    pub tracker: Arc<ConnectionTracker>,
    pub rate_limiter: Arc<MessageRateLimiter>,
    pub max_message_size: usize,
    pub max_payload: usize,
    pub trust_proxy: bool,
}

/// Origin used for per-IP admission
pub fn client_origin(headers: &HeaderMap, peer: SocketAddr, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());

        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    peer.ip().to_string()
}

/// Handler for GET /ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let settings = Arc::clone(&state.ws);
    let origin = client_origin(&headers, peer, settings.trust_proxy);
    let ws = ws.max_message_size(settings.max_payload);

    match settings.tracker.admit(&origin) {
        Ok(connection) => ws.on_upgrade(move |socket| run_session(socket, state, connection)),
        Err(denied) => {
            let stats = settings.tracker.stats();
            warn!(
                origin = %origin,
                reason = %denied,
                total_connections = stats.total,
                origin_connections = stats.by_origin.get(&origin).copied().unwrap_or(0),
                "Connection rejected"
            );
            ws.on_upgrade(move |socket| reject(socket, denied))
        }
    }
}

/// "Try again later" close frame carrying the denial reason
fn rejection_frame(denied: &AdmissionDenied) -> CloseFrame {
    CloseFrame {
        code: close_code::AGAIN,
        reason: denied.to_string().into(),
    }
}

/// Complete the handshake only to deliver the rejection close frame
async fn reject(mut socket: WebSocket, denied: AdmissionDenied) {
    let _ = socket.send(Message::Close(Some(rejection_frame(&denied)))).await;
}

/// Releases per-connection state however the session ends
struct SessionGuard {
    _connection: ConnectionGuard,
    rate_limiter: Arc<MessageRateLimiter>,
    subscriber: SubscriberId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.rate_limiter.remove_client(self.subscriber);
    }
}

async fn run_session(socket: WebSocket, state: AppState, connection: ConnectionGuard) {
    let settings = Arc::clone(&state.ws);
    // Snapshot first: any update recorded after it is queued behind it
    let initial = ServerMessage::Initial(Box::new(state.monitoring_service.snapshot()));
    let (subscription, mut queue) = state
        .monitoring_service
        .broadcaster()
        .subscribe_with(connection.origin(), &initial);
    let id = subscription.id();
    let admitted_at = subscription.admitted_at();

    info!(
        subscriber = %id,
        origin = %subscription.origin(),
        total_connections = settings.tracker.total(),
        origin_connections = settings.tracker.connections_from(connection.origin()),
        "Client connected"
    );

    let guard = SessionGuard {
        _connection: connection,
        rate_limiter: Arc::clone(&settings.rate_limiter),
        subscriber: id,
    };

    let (mut sink, mut stream) = socket.split();

    // Ends when the queue closes (deregistered) or the socket stops accepting writes
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = queue.recv().await {
            if sink.send(Message::Text(frame.as_ref().into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut writer => {
                debug!(subscriber = %id, "Writer finished");
                break;
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(&state.monitoring_service, &settings, &subscription, text.as_str());
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let text = String::from_utf8_lossy(&bytes);
                    handle_frame(&state.monitoring_service, &settings, &subscription, &text);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    debug!(subscriber = %id, error = %e, "Connection error");
                    break;
                }
            }
        }
    }

    drop(subscription);
    writer.abort();
    drop(guard);

    info!(
        subscriber = %id,
        connected_secs = (Utc::now() - admitted_at).num_seconds(),
        total_connections = settings.tracker.total(),
        "Client disconnected"
    );
}

/// Rate check, then validation, then dispatch
fn handle_frame(
    monitoring: &MonitoringService,
    settings: &WsSettings,
    subscription: &Subscription,
    raw: &str,
) {
    let id = subscription.id();

    if !settings.rate_limiter.is_allowed(id) {
        warn!(subscriber = %id, "Rate limit exceeded");
        subscription.send(&ServerMessage::error(ErrorCode::RateLimited, RATE_LIMITED_MESSAGE));
        return;
    }

    let message = match parse_client_message(raw, settings.max_message_size) {
        Ok(message) => message,
        Err(e) => {
            warn!(
                subscriber = %id,
                error = %e,
                size = raw.len(),
                preview = %sanitize_for_log(raw, 50),
                "Invalid message"
            );
            subscription.send(&ServerMessage::error(e.code(), e.to_string()));
            return;
        }
    };

    match message {
        ClientMessage::Ping(_) => {
            subscription.send(&ServerMessage::pong());
        }
        ClientMessage::Subscribe(_) | ClientMessage::Unsubscribe(_) => {
            debug!(
                subscriber = %id,
                message_type = message.type_name(),
                live_subscribers = monitoring.broadcaster().count(),
                "Subscription message"
            );
        }
    }
}
