use crate::{
    dto::activity_dto::{ActivityQuery, ActivityView},
    error::Result,
    models::viewer::Viewer,
    services::activity_service::ActivityMonitor,
    services::feed_hub::FeedScope,
    AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::{IntoResponse, Response},
    Extension, Json,
};
use futures::{SinkExt, StreamExt};

pub async fn get_activity(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(class_id): Path<String>,
    Query(query): Query<ActivityQuery>,
) -> Result<impl IntoResponse> {
    let scope = FeedScope::new(class_id, query.content_id.clone());
    let view = state
        .activity_service
        .snapshot_view(&state.store, &viewer, scope, &query)
        .await?;
    Ok(Json(view))
}

pub async fn activity_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(class_id): Path<String>,
    Query(query): Query<ActivityQuery>,
) -> Result<Response> {
    let scope = FeedScope::new(class_id, query.content_id.clone());
    let monitor = state
        .activity_service
        .open(&state.store, &viewer, scope, &query)
        .await?;
    let service = state.activity_service.clone();
    Ok(ws.on_upgrade(move |socket| activity_session(socket, monitor, service)))
}

async fn send_view(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    view: &ActivityView,
) -> bool {
    match serde_json::to_string(view) {
        Ok(text) => sender.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize activity view");
            false
        }
    }
}

/// Streams a view per feed update. A text frame carrying an
/// `ActivityQuery` replaces the filter. The monitor, and with it the feed
/// listener, is dropped when the socket closes.
async fn activity_session(
    socket: WebSocket,
    mut monitor: ActivityMonitor,
    service: crate::services::activity_service::ActivityService,
) {
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            view = monitor.next_view() => {
                let Some(view) = view else { break };
                if !send_view(&mut sender, &view).await {
                    break;
                }
            }
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(query) = serde_json::from_str::<ActivityQuery>(&text) else {
                            tracing::debug!("Ignoring malformed activity filter frame");
                            continue;
                        };
                        let view = monitor.set_filter(service.filter_from_query(&query));
                        if !send_view(&mut sender, &view).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!(scope = ?monitor.scope(), "Activity session closed");
}
