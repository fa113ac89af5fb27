/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! WebSocket upgrade and read loop.
//!
//! The write half is handed to the hub; this task only reads. When the
//! client goes away (close frame or read error) the connection is removed,
//! which also stops its monitor and terminal sessions.

use crate::realtime::{FrameSink, Hub, HubError};
use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use nixopus_utils::logging::prelude::*;
use std::sync::Arc;

pub async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<Hub>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

struct WsFrameSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send_text(&mut self, text: String) -> Result<(), HubError> {
        self.0
            .send(Message::Text(text))
            .await
            .map_err(|e| HubError::Write(e.to_string()))
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), HubError> {
        let frame = CloseFrame {
            code,
            reason: reason.to_string().into(),
        };
        self.0
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| HubError::Write(e.to_string()))?;
        self.0
            .close()
            .await
            .map_err(|e| HubError::Write(e.to_string()))
    }
}

async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (sender, mut receiver) = socket.split();
    let connection = hub.register(Box::new(WsFrameSink(sender))).await;
    let id = connection.id();
    info!(connection_id = %id, "WebSocket client connected");

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => hub.handle_message(id, &text).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection_id = %id, "WebSocket read failed: {}", e);
                break;
            }
        }
        if connection.is_closed() {
            break;
        }
    }

    hub.remove(id).await;
    info!(connection_id = %id, "WebSocket client disconnected");
}
