//! WebSocket 连接处理
//!
//! 每个连接一个写任务，负责把出站队列写入 socket；读循环按到达顺序逐帧调用网关。

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::state::AppState;

pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let pool = state.gateway.connection_pool().clone();
    let (handle, mut outbound) = pool.open();
    let connection_id = handle.id.clone();

    info!("WebSocket connected: {}", connection_id);

    let send_task = tokio::spawn(async move {
        while let Some(payload) = outbound.recv().await {
            if sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            msg = receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!("Ignoring non-UTF-8 binary frame from {}", connection_id);
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("WebSocket error on {}: {}", connection_id, e);
                        break;
                    }
                };

                debug!("Frame from {}: {}", connection_id, text);
                if let Err(e) = state.gateway.handle_ws_frame(&connection_id, &text).await {
                    warn!("Reply to {} dropped: {}", connection_id, e);
                    break;
                }
            }
        }
    }

    // Last sender gone closes the outbound queue and ends the write task.
    pool.remove(&connection_id);
    drop(handle);
    let _ = send_task.await;

    info!("WebSocket disconnected: {}", connection_id);
}
