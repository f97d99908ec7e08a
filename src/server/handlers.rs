use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::{ApiError, ApiResult, AppState};
use crate::comments::CommentFeed;
use crate::entity::{Comment, Insight};
use crate::error::GazetteError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightPage {
    #[serde(flatten)]
    pub insight: Insight,
    pub comment_count: i64,
}

#[derive(Deserialize)]
pub struct CommentPayload {
    #[serde(default)]
    pub author: String,
    pub text: String,
}

#[derive(Deserialize)]
pub struct LikePayload {
    pub delta: i64,
}

#[derive(Serialize)]
pub struct LikeResponse {
    pub likes: i64,
}

fn lookup(state: &AppState, slug: &str) -> ApiResult<Insight> {
    state
        .store
        .with(|s| s.find_by_slug(slug))?
        .ok_or_else(|| ApiError::from(GazetteError::InsightNotFound(slug.to_string())))
}

/// Newest-first insight index. A read failure degrades to an empty list so
/// the page can still render.
pub async fn list_insights(State(state): State<AppState>) -> Json<Vec<Insight>> {
    let insights = state.store.with(|s| s.list_insights()).unwrap_or_else(|e| {
        error!("insight list failed: {e}");
        Vec::new()
    });
    Json(insights)
}

/// The record-load operation: returns the insight and fires the view
/// increment. A failed increment is logged, never surfaced.
pub async fn fetch_insight(
    Path(slug): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<InsightPage>> {
    let mut insight = lookup(&state, &slug)?;

    match state.store.with(|s| s.bump_views(&insight.id)) {
        Ok(views) => insight.views = views,
        Err(e) => warn!("view increment failed for {slug}: {e}"),
    }

    let comment_count = state
        .store
        .with(|s| s.approved_comment_count(&insight.id))
        .unwrap_or_else(|e| {
            warn!("comment count failed for {slug}: {e}");
            0
        });

    Ok(Json(InsightPage {
        insight,
        comment_count,
    }))
}

pub async fn list_comments(
    Path(slug): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Comment>>> {
    let insight = lookup(&state, &slug)?;
    let comments = state.board.approved(&insight.id)?;
    Ok(Json(comments))
}

pub async fn submit_comment(
    Path(slug): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<CommentPayload>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let insight = lookup(&state, &slug)?;
    let comment = state.board.submit(&insight, &payload.author, &payload.text)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// The atomic counter endpoint: applies a ±1 delta server-side and returns
/// the new count.
pub async fn adjust_likes(
    Path(slug): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<LikePayload>,
) -> ApiResult<Json<LikeResponse>> {
    if payload.delta != 1 && payload.delta != -1 {
        return Err(GazetteError::Validation("like delta must be 1 or -1".to_string()).into());
    }

    let insight = lookup(&state, &slug)?;
    let likes = state
        .store
        .with(|s| s.adjust_likes(&insight.id, payload.delta))?;
    Ok(Json(LikeResponse { likes }))
}

/// Upgrade to a WebSocket and stream the approved comment list: the
/// current list first, then the full re-ordered list on every visible
/// change. Closing the socket cancels the subscription.
pub async fn comments_live(
    Path(slug): Path<String>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let insight = lookup(&state, &slug)?;
    let feed = state.board.watch(&insight.id);
    Ok(ws.on_upgrade(move |socket| stream_comments(socket, feed, slug)))
}

async fn stream_comments(mut socket: WebSocket, mut feed: CommentFeed, slug: String) {
    loop {
        tokio::select! {
            update = feed.next() => {
                let Some(list) = update else { break };
                let payload = match serde_json::to_string(&list) {
                    Ok(p) => p,
                    Err(e) => {
                        error!("comment feed for {slug} failed to serialize: {e}");
                        break;
                    }
                };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    debug!("comment feed for {slug} closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments::CommentBoard;
    use crate::entity::InsightDraft;
    use crate::server::router;
    use crate::storage::{SqliteStore, StoreHandle};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app() -> (TempDir, AppState, axum::Router) {
        let tmp = TempDir::new().unwrap();
        let store = StoreHandle::new(SqliteStore::init(tmp.path()).unwrap());
        let state = AppState {
            store: store.clone(),
            board: CommentBoard::new(store),
        };
        let router = router(state.clone());
        (tmp, state, router)
    }

    fn publish(state: &AppState, title: &str) -> Insight {
        state
            .store
            .with(|s| {
                s.add_insight(&InsightDraft {
                    title: title.to_string(),
                    author: "Jordan Vale".to_string(),
                    category: "Strategy".to_string(),
                    content: "<p>Body</p>".to_string(),
                    featured_image: None,
                })
            })
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn index_lists_insights() {
        let (_tmp, state, app) = app();
        publish(&state, "Market Entry");

        let response = app.oneshot(get("/api/insights")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["slug"], "market-entry");
    }

    #[tokio::test]
    async fn unknown_slug_is_a_distinct_not_found() {
        let (_tmp, _state, app) = app();
        let response = app.oneshot(get("/api/insights/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn fetching_an_insight_records_a_view() {
        let (_tmp, state, app) = app();
        publish(&state, "Market Entry");

        let first = app
            .clone()
            .oneshot(get("/api/insights/market-entry"))
            .await
            .unwrap();
        let second = app
            .oneshot(get("/api/insights/market-entry"))
            .await
            .unwrap();

        assert_eq!(body_json(first).await["views"], 1);
        assert_eq!(body_json(second).await["views"], 2);
    }

    #[tokio::test]
    async fn comment_submission_is_gated_until_approval() {
        let (_tmp, state, app) = app();
        let insight = publish(&state, "Market Entry");

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/insights/market-entry/comments",
                serde_json::json!({ "text": "Great insight!" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["author"], "Anonymous");
        assert_eq!(created["approved"], false);

        // Pending comments stay out of the public list.
        let listed = app
            .clone()
            .oneshot(get("/api/insights/market-entry/comments"))
            .await
            .unwrap();
        assert_eq!(body_json(listed).await.as_array().unwrap().len(), 0);

        let comment_id = created["id"].as_str().unwrap().parse().unwrap();
        state
            .board
            .set_approved(&insight.id, &comment_id, true)
            .unwrap();

        let listed = app
            .oneshot(get("/api/insights/market-entry/comments"))
            .await
            .unwrap();
        let json = body_json(listed).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["text"], "Great insight!");
    }

    #[tokio::test]
    async fn empty_comment_text_is_rejected() {
        let (_tmp, state, app) = app();
        publish(&state, "Market Entry");

        let response = app
            .oneshot(post_json(
                "/api/insights/market-entry/comments",
                serde_json::json!({ "author": "Ada", "text": "   " }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(state.board.moderation_queue().unwrap().is_empty());
    }

    #[tokio::test]
    async fn like_deltas_must_be_unit_sized() {
        let (_tmp, state, app) = app();
        publish(&state, "Market Entry");

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/insights/market-entry/likes",
                serde_json::json!({ "delta": 2 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/insights/market-entry/likes",
                serde_json::json!({ "delta": 1 }),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["likes"], 1);

        let response = app
            .oneshot(post_json(
                "/api/insights/market-entry/likes",
                serde_json::json!({ "delta": -1 }),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["likes"], 0);
    }
}
