use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use shared::protocol::ServerEvent;
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

use crate::{controller::RefreshOutcome, outline::CourseOutline};

/// What the change feed did with one server event.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Applied {
        event: ServerEvent,
        outcome: RefreshOutcome,
    },
    Error(String),
    Closed,
}

pub fn ws_url(server_url: &str) -> Result<String> {
    let server_url = server_url.trim_end_matches('/');
    let ws_url = if let Some(rest) = server_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(anyhow!("server_url must start with http:// or https://"));
    };
    Ok(format!("{ws_url}/ws"))
}

/// Connects to the server's event socket and keeps `outline` in step with
/// orders changed by other clients.
pub async fn spawn_change_feed(
    outline: Arc<CourseOutline>,
    server_url: &str,
    events: broadcast::Sender<FeedEvent>,
) -> Result<JoinHandle<()>> {
    let ws_url = ws_url(server_url)?;
    let (ws_stream, _) = connect_async(&ws_url)
        .await
        .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
    let (_, mut ws_reader) = ws_stream.split();
    info!(%ws_url, course_id = outline.course_id().0, "feed: connected");

    Ok(tokio::spawn(async move {
        while let Some(msg) = ws_reader.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(err) => {
                    let _ = events.send(FeedEvent::Error(format!("websocket error: {err}")));
                    break;
                }
            };
            let event = match serde_json::from_str::<ServerEvent>(&text) {
                Ok(event) => event,
                Err(err) => {
                    warn!(%err, "feed: ignoring undecodable event");
                    continue;
                }
            };
            match outline.apply_server_event(&event).await {
                Ok(Some(outcome)) => {
                    let _ = events.send(FeedEvent::Applied { event, outcome });
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(%err, "feed: refresh after server event failed");
                    let _ = events.send(FeedEvent::Error(format!("refresh failed: {err:#}")));
                }
            }
        }
        info!("feed: disconnected");
        let _ = events.send(FeedEvent::Closed);
    }))
}

#[cfg(test)]
#[path = "tests/feed_tests.rs"]
mod tests;
