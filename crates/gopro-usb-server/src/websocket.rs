//! WebSocket handlers for the method and event channels

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use gopro_usb_core::{MethodReply, MethodRequest};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// WebSocket handler for method calls
pub async fn methods_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_method_socket(socket, state))
}

/// WebSocket handler for attach/detach events
pub async fn events_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_event_socket(socket, state))
}

/// Handle a method-channel connection
pub async fn handle_method_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, receiver) = socket.split();
    serve_methods(sender, receiver, state).await;
}

/// Handle an event-channel connection
pub async fn handle_event_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, receiver) = socket.split();
    serve_events(sender, receiver, state).await;
}

/// Method-channel loop over any message sink and stream
///
/// Calls run concurrently; each reply carries the id of its request. Calls still
/// running when the client goes away are aborted, which cancels their sessions.
pub(crate) async fn serve_methods<S, R, E>(mut sender: S, mut receiver: R, state: Arc<AppState>)
where
    S: Sink<Message> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (reply_tx, mut reply_rx) = mpsc::channel::<MethodReply>(16);
    let mut calls = JoinSet::new();

    info!("Method client connected");

    let send_task = tokio::spawn(async move {
        while let Some(reply) = reply_rx.recv().await {
            match serde_json::to_string(&reply) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Failed to encode reply {}: {}", reply.id, e),
            }
        }
    });

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<MethodRequest>(&text) {
                    Ok(request) => {
                        debug!("Method call {}: {}", request.id, request.method);
                        let state = state.clone();
                        let reply_tx = reply_tx.clone();
                        calls.spawn(async move {
                            let response = state.bridge.call(&request.method).await;
                            let _ = reply_tx
                                .send(MethodReply {
                                    id: request.id,
                                    response,
                                })
                                .await;
                        });
                    }
                    Err(e) => {
                        warn!("Invalid method request: {} - raw: {}", e, text);
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            },
            Some(_) = calls.join_next(), if !calls.is_empty() => {}
        }
    }

    if !calls.is_empty() {
        debug!("Aborting {} in-flight call(s)", calls.len());
    }
    calls.shutdown().await;
    drop(reply_tx);
    send_task.abort();
    info!("Method client disconnected");
}

/// Event-channel loop over any message sink and stream
///
/// Each connection owns its own USB subscription, released on disconnect.
pub(crate) async fn serve_events<S, R, E>(mut sender: S, mut receiver: R, state: Arc<AppState>)
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let _client = state.track_event_client();
    let mut subscription = state.bridge.subscribe_events();

    info!("Event listener attached");

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(connected) = event else { break };
                debug!("Sending device event: {}", connected);
                if sender.send(Message::Text(connected.to_string())).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(data))) => {
                    if sender.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    drop(subscription);
    info!("Event listener cancelled");
}
