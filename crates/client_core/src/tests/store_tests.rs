use super::*;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use shared::{
    domain::{ContentItemId, ContentKind, ModuleId},
    error::ErrorCode,
};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct ServerState {
    received: Arc<Mutex<Vec<(i64, ReorderRequest)>>>,
}

async fn handle_list_modules(Path(course_id): Path<i64>) -> Json<Vec<ModuleSummary>> {
    Json(vec![
        ModuleSummary {
            module_id: ModuleId(2),
            course_id: CourseId(course_id),
            title: "Second".to_string(),
            description: None,
        },
        ModuleSummary {
            module_id: ModuleId(1),
            course_id: CourseId(course_id),
            title: "First".to_string(),
            description: Some("intro".to_string()),
        },
    ])
}

async fn handle_list_content(
    Path(chapter_id): Path<i64>,
) -> Result<Json<Vec<ContentItemSummary>>, (StatusCode, Json<ApiError>)> {
    if chapter_id != 4 {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiError::not_found("chapter not found")),
        ));
    }
    Ok(Json(vec![ContentItemSummary {
        content_item_id: ContentItemId(8),
        chapter_id: ChapterId(chapter_id),
        kind: ContentKind::Quiz,
        title: "Check-in".to_string(),
    }]))
}

async fn handle_reorder_content(
    State(state): State<ServerState>,
    Path(chapter_id): Path<i64>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<ReorderResponse>, (StatusCode, Json<ApiError>)> {
    state
        .received
        .lock()
        .expect("received lock")
        .push((chapter_id, req.clone()));
    if req.ordered_item_ids.contains(&99) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError::validation("item 99 does not belong to chapter")),
        ));
    }
    Ok(Json(ReorderResponse {
        scope: ReorderScope::ChapterContent(ChapterId(chapter_id)),
        ordered_item_ids: req.ordered_item_ids,
    }))
}

async fn handle_reorder_chapters() -> (StatusCode, &'static str) {
    (StatusCode::BAD_GATEWAY, "upstream unavailable")
}

async fn spawn_outline_server() -> Result<(String, ServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .route("/courses/:course_id/modules", get(handle_list_modules))
        .route("/chapters/:chapter_id/content", get(handle_list_content))
        .route(
            "/chapters/:chapter_id/content/order",
            put(handle_reorder_content),
        )
        .route(
            "/courses/:course_id/chapters/order",
            put(handle_reorder_chapters),
        )
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

#[tokio::test]
async fn lists_modules_in_server_order() {
    let (server_url, _) = spawn_outline_server().await.expect("spawn server");
    let store = HttpItemStore::new(format!("{server_url}/"));
    assert_eq!(store.server_url(), server_url);

    let modules = store.list_modules(CourseId(3)).await.expect("modules");
    let ids: Vec<i64> = modules.iter().map(|module| module.module_id.0).collect();
    assert_eq!(ids, vec![2, 1]);
    assert!(modules.iter().all(|module| module.course_id == CourseId(3)));
}

#[tokio::test]
async fn reorder_sends_full_order_with_scope_id() {
    let (server_url, state) = spawn_outline_server().await.expect("spawn server");
    let store = HttpItemStore::new(server_url);

    store
        .reorder(ReorderScope::ChapterContent(ChapterId(4)), &[3, 1, 2])
        .await
        .expect("reorder");

    let received = state.received.lock().expect("received lock").clone();
    assert_eq!(received.len(), 1);
    let (chapter_id, request) = &received[0];
    assert_eq!(*chapter_id, 4);
    assert_eq!(request.scope_id, 4);
    assert_eq!(request.ordered_item_ids, vec![3, 1, 2]);
}

#[tokio::test]
async fn rejected_reorder_surfaces_api_exception() {
    let (server_url, _) = spawn_outline_server().await.expect("spawn server");
    let store = HttpItemStore::new(server_url);

    let err = store
        .reorder(ReorderScope::ChapterContent(ChapterId(4)), &[1, 99])
        .await
        .expect_err("validation failure");
    let api = err
        .downcast_ref::<ApiException>()
        .expect("structured api error");
    assert_eq!(api.code, ErrorCode::Validation);
    assert!(api.message.contains("item 99"));
}

#[tokio::test]
async fn missing_chapter_maps_to_not_found() {
    let (server_url, _) = spawn_outline_server().await.expect("spawn server");
    let store = HttpItemStore::new(server_url);

    let err = store
        .list_content(ChapterId(77))
        .await
        .expect_err("missing chapter");
    let api = err
        .downcast_ref::<ApiException>()
        .expect("structured api error");
    assert_eq!(api.code, ErrorCode::NotFound);

    let items = store.list_content(ChapterId(4)).await.expect("content");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, ContentKind::Quiz);
}

#[tokio::test]
async fn non_json_failure_keeps_status_and_body() {
    let (server_url, _) = spawn_outline_server().await.expect("spawn server");
    let store = HttpItemStore::new(server_url);

    let err = store
        .reorder(ReorderScope::CourseChapters(CourseId(1)), &[1, 2])
        .await
        .expect_err("gateway failure");
    assert!(err.downcast_ref::<ApiException>().is_none());
    let message = err.to_string();
    assert!(message.contains("502"));
    assert!(message.contains("upstream unavailable"));
}
