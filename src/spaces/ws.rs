use axum::{debug_handler, extract::{ws::WebSocketUpgrade, Path, State}, response::IntoResponse};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tower_sessions::Session;

use crate::{auth, AppResult, AppState};

use super::msg;

#[derive(Deserialize)]
struct IncomingMessage {
    content: String,
}

/// Live chat: inbound frames persist through the same path as the REST
/// endpoint, outbound frames come from the shared broadcast channel.
#[debug_handler(state = AppState)]
pub(crate) async fn space_ws(
    Path(space_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    State(tx): State<broadcast::Sender<String>>,
    session: Session,
    ws: WebSocketUpgrade,
) -> AppResult<impl IntoResponse> {
    let account = auth::require_account(&db_pool, &session).await?;
    msg::require_participant(&db_pool, &space_id, &account.id).await?;

    Ok(ws.on_upgrade(async move |stream| {
        let mut rx = tx.subscribe();
        let (mut sender, mut receiver) = stream.split();

        let mut broadcast_task = tokio::spawn(async move {
            while let Ok(message) = rx.recv().await {
                if sender.send(message.into()).await.is_err() {
                    break;
                }
            }
        });

        while let Some(Ok(frame)) = receiver.next().await {
            let Ok(incoming) = serde_json::from_slice::<IncomingMessage>(&frame.into_data())
            else {
                continue;
            };

            if incoming.content.trim().is_empty() {
                continue;
            }

            if let Err(err) =
                msg::send(&db_pool, &tx, &space_id, &account.id, &incoming.content).await
            {
                tracing::warn!("dropping space message: {err}");
            }
        }

        tokio::select! {
            _ = &mut broadcast_task => broadcast_task.abort(),
        };
    }))
}
