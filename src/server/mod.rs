//! The public HTTP surface: the JSON API the content pages are built on,
//! plus a WebSocket feed for live comment lists.

mod handlers;

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::comments::CommentBoard;
use crate::error::{GazetteError, Result};
use crate::storage::StoreHandle;

/// How often the server checks for writes made by other processes (the
/// moderation console) so live feeds can pick them up.
const EXTERNAL_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct AppState {
    pub store: StoreHandle,
    pub board: CommentBoard,
}

pub struct GazetteServer {
    state: AppState,
}

impl GazetteServer {
    pub fn new(store: StoreHandle) -> Self {
        let board = CommentBoard::new(store.clone());
        Self {
            state: AppState { store, board },
        }
    }

    /// Run until ctrl-c.
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        tracker.spawn(watch_external_writes(
            self.state.store.clone(),
            self.state.board.clone(),
            token.clone(),
        ));

        let app = router(self.state);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("gazette listening on {addr}");

        let shutdown = token.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = tokio::signal::ctrl_c().await;
                shutdown.cancel();
            })
            .await?;

        token.cancel();
        tracker.close();
        tracker.wait().await;
        Ok(())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/insights", get(handlers::list_insights))
        .route("/api/insights/{slug}", get(handlers::fetch_insight))
        .route(
            "/api/insights/{slug}/comments",
            get(handlers::list_comments).post(handlers::submit_comment),
        )
        .route(
            "/api/insights/{slug}/comments/live",
            get(handlers::comments_live),
        )
        .route("/api/insights/{slug}/likes", post(handlers::adjust_likes))
        .with_state(state)
}

/// SQLite's data_version moves when another connection commits. Feeds
/// deduplicate, so waking them on every tick of the counter is harmless.
async fn watch_external_writes(store: StoreHandle, board: CommentBoard, token: CancellationToken) {
    let mut last = match store.with(|s| s.data_version()) {
        Ok(v) => v,
        Err(e) => {
            warn!("external write watcher disabled: {e}");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(EXTERNAL_POLL_INTERVAL) => {
                match store.with(|s| s.data_version()) {
                    Ok(v) if v != last => {
                        last = v;
                        board.notify_external();
                    }
                    Ok(_) => {}
                    Err(e) => warn!("data_version poll failed: {e}"),
                }
            }
        }
    }
}

/// HTTP-facing error: not-found gets its own presentation, validation maps
/// to 422, anything else is a 500 that is also logged.
pub struct ApiError(GazetteError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<GazetteError> for ApiError {
    fn from(e: GazetteError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            GazetteError::InsightNotFound(_) | GazetteError::CommentNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            GazetteError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => {
                error!("request failed: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}
