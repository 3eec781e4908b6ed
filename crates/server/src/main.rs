use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use server_api::ApiContext;
use shared::{
    domain::{ChapterId, CourseId, ReorderScope},
    error::{ApiError, ErrorCode},
    protocol::{
        ChapterSummary, ContentItemSummary, CourseSummary, CreateChapterRequest,
        CreateContentItemRequest, CreateCourseRequest, CreateModuleRequest, ModuleSummary,
        ReorderRequest, ReorderResponse, ServerEvent,
    },
};
use storage::Storage;
use tokio::sync::broadcast;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url};

const MAX_REQUEST_BODY_BYTES: usize = 256 * 1024;

#[derive(Clone)]
struct AppState {
    api: ApiContext,
    events: broadcast::Sender<ServerEvent>,
}

type ApiRejection = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let api = ApiContext { storage };
    let (events, _) = broadcast::channel(settings.event_buffer);

    let state = AppState { api, events };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/courses", get(http_list_courses).post(http_create_course))
        .route(
            "/courses/:course_id/modules",
            get(http_list_modules).post(http_create_module),
        )
        .route("/courses/:course_id/modules/order", put(http_reorder_modules))
        .route(
            "/courses/:course_id/chapters",
            get(http_list_chapters).post(http_create_chapter),
        )
        .route("/courses/:course_id/chapters/order", put(http_reorder_chapters))
        .route(
            "/chapters/:chapter_id/content",
            get(http_list_content).post(http_create_content),
        )
        .route("/chapters/:chapter_id/content/order", put(http_reorder_content))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn reject(err: ApiError) -> ApiRejection {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, ApiRejection> {
    state.api.storage.health_check().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    Ok("ok")
}

async fn http_list_courses(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CourseSummary>>, ApiRejection> {
    let courses = server_api::list_courses(&state.api).await.map_err(reject)?;
    Ok(Json(courses))
}

async fn http_create_course(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCourseRequest>,
) -> Result<(StatusCode, Json<CourseSummary>), ApiRejection> {
    let course = server_api::create_course(&state.api, &req)
        .await
        .map_err(reject)?;
    let _ = state.events.send(ServerEvent::CourseCreated {
        course: course.clone(),
    });
    Ok((StatusCode::CREATED, Json(course)))
}

async fn http_list_modules(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i64>,
) -> Result<Json<Vec<ModuleSummary>>, ApiRejection> {
    let modules = server_api::list_modules(&state.api, CourseId(course_id))
        .await
        .map_err(reject)?;
    Ok(Json(modules))
}

async fn http_create_module(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i64>,
    Json(req): Json<CreateModuleRequest>,
) -> Result<(StatusCode, Json<ModuleSummary>), ApiRejection> {
    let module = server_api::create_module(&state.api, CourseId(course_id), &req)
        .await
        .map_err(reject)?;
    let _ = state.events.send(ServerEvent::ModuleCreated {
        module: module.clone(),
    });
    Ok((StatusCode::CREATED, Json(module)))
}

async fn http_list_chapters(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i64>,
) -> Result<Json<Vec<ChapterSummary>>, ApiRejection> {
    let chapters = server_api::list_chapters(&state.api, CourseId(course_id))
        .await
        .map_err(reject)?;
    Ok(Json(chapters))
}

async fn http_create_chapter(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i64>,
    Json(req): Json<CreateChapterRequest>,
) -> Result<(StatusCode, Json<ChapterSummary>), ApiRejection> {
    let chapter = server_api::create_chapter(&state.api, CourseId(course_id), &req)
        .await
        .map_err(reject)?;
    let _ = state.events.send(ServerEvent::ChapterCreated {
        chapter: chapter.clone(),
    });
    Ok((StatusCode::CREATED, Json(chapter)))
}

async fn http_list_content(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<i64>,
) -> Result<Json<Vec<ContentItemSummary>>, ApiRejection> {
    let items = server_api::list_content_items(&state.api, ChapterId(chapter_id))
        .await
        .map_err(reject)?;
    Ok(Json(items))
}

async fn http_create_content(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<i64>,
    Json(req): Json<CreateContentItemRequest>,
) -> Result<(StatusCode, Json<ContentItemSummary>), ApiRejection> {
    let item = server_api::create_content_item(&state.api, ChapterId(chapter_id), &req)
        .await
        .map_err(reject)?;
    let _ = state
        .events
        .send(ServerEvent::ContentItemCreated { item: item.clone() });
    Ok((StatusCode::CREATED, Json(item)))
}

async fn http_reorder_modules(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i64>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<ReorderResponse>, ApiRejection> {
    apply_reorder(&state, ReorderScope::CourseModules(CourseId(course_id)), req).await
}

async fn http_reorder_chapters(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i64>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<ReorderResponse>, ApiRejection> {
    apply_reorder(&state, ReorderScope::CourseChapters(CourseId(course_id)), req).await
}

async fn http_reorder_content(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<i64>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<ReorderResponse>, ApiRejection> {
    apply_reorder(&state, ReorderScope::ChapterContent(ChapterId(chapter_id)), req).await
}

async fn apply_reorder(
    state: &AppState,
    scope: ReorderScope,
    req: ReorderRequest,
) -> Result<Json<ReorderResponse>, ApiRejection> {
    let response = server_api::reorder(&state.api, scope, &req)
        .await
        .map_err(reject)?;
    let _ = state.events.send(ServerEvent::OrderChanged {
        scope,
        ordered_item_ids: response.ordered_item_ids.clone(),
        changed_at: Utc::now(),
    });
    Ok(Json(response))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: axum::extract::ws::WebSocket) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.events.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "ws: subscriber lagged behind event stream");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
