use shared::{
    domain::{ChapterId, CourseId, ReorderScope},
    error::{ApiError, ErrorCode},
    protocol::{
        ChapterSummary, ContentItemSummary, CourseSummary, CreateChapterRequest,
        CreateContentItemRequest, CreateCourseRequest, CreateModuleRequest, ModuleSummary,
        ReorderRequest, ReorderResponse,
    },
};
use storage::{OrderError, Storage};
use tracing::{info, warn};

pub const MAX_TITLE_CHARS: usize = 200;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub async fn list_courses(ctx: &ApiContext) -> Result<Vec<CourseSummary>, ApiError> {
    ctx.storage.list_courses().await.map_err(internal)
}

pub async fn create_course(
    ctx: &ApiContext,
    req: &CreateCourseRequest,
) -> Result<CourseSummary, ApiError> {
    let title = validate_title(&req.title)?;
    let description = normalize_description(req.description.as_deref());
    let course_id = ctx
        .storage
        .create_course(title, description)
        .await
        .map_err(internal)?;
    Ok(CourseSummary {
        course_id,
        title: title.to_string(),
        description: description.map(str::to_string),
    })
}

pub async fn list_modules(
    ctx: &ApiContext,
    course_id: CourseId,
) -> Result<Vec<ModuleSummary>, ApiError> {
    ensure_course(ctx, course_id).await?;
    ctx.storage.list_modules(course_id).await.map_err(internal)
}

pub async fn create_module(
    ctx: &ApiContext,
    course_id: CourseId,
    req: &CreateModuleRequest,
) -> Result<ModuleSummary, ApiError> {
    ensure_course(ctx, course_id).await?;
    let title = validate_title(&req.title)?;
    let description = normalize_description(req.description.as_deref());
    let module_id = ctx
        .storage
        .create_module(course_id, title, description)
        .await
        .map_err(internal)?;
    Ok(ModuleSummary {
        module_id,
        course_id,
        title: title.to_string(),
        description: description.map(str::to_string),
    })
}

pub async fn list_chapters(
    ctx: &ApiContext,
    course_id: CourseId,
) -> Result<Vec<ChapterSummary>, ApiError> {
    ensure_course(ctx, course_id).await?;
    ctx.storage.list_chapters(course_id).await.map_err(internal)
}

pub async fn create_chapter(
    ctx: &ApiContext,
    course_id: CourseId,
    req: &CreateChapterRequest,
) -> Result<ChapterSummary, ApiError> {
    ensure_course(ctx, course_id).await?;
    let title = validate_title(&req.title)?;
    let description = normalize_description(req.description.as_deref());
    let chapter_id = ctx
        .storage
        .create_chapter(course_id, req.module_id, title, description)
        .await
        .map_err(|e| ApiError::validation(e.to_string()))?;
    Ok(ChapterSummary {
        chapter_id,
        course_id,
        module_id: req.module_id,
        title: title.to_string(),
        description: description.map(str::to_string),
    })
}

pub async fn list_content_items(
    ctx: &ApiContext,
    chapter_id: ChapterId,
) -> Result<Vec<ContentItemSummary>, ApiError> {
    ensure_chapter(ctx, chapter_id).await?;
    ctx.storage
        .list_content_items(chapter_id)
        .await
        .map_err(internal)
}

pub async fn create_content_item(
    ctx: &ApiContext,
    chapter_id: ChapterId,
    req: &CreateContentItemRequest,
) -> Result<ContentItemSummary, ApiError> {
    ensure_chapter(ctx, chapter_id).await?;
    let title = validate_title(&req.title)?;
    let content_item_id = ctx
        .storage
        .create_content_item(chapter_id, req.kind, title)
        .await
        .map_err(internal)?;
    Ok(ContentItemSummary {
        content_item_id,
        chapter_id,
        kind: req.kind,
        title: title.to_string(),
    })
}

/// Replaces the order of `scope` with the complete id list in `req`.
pub async fn reorder(
    ctx: &ApiContext,
    scope: ReorderScope,
    req: &ReorderRequest,
) -> Result<ReorderResponse, ApiError> {
    if req.scope_id != scope.parent_id() {
        return Err(ApiError::validation(format!(
            "scope_id {} does not match {scope}",
            req.scope_id
        )));
    }

    match ctx
        .storage
        .replace_order(scope, &req.ordered_item_ids)
        .await
    {
        Ok(()) => {
            info!(%scope, items = req.ordered_item_ids.len(), "api: order replaced");
            Ok(ReorderResponse {
                scope,
                ordered_item_ids: req.ordered_item_ids.clone(),
            })
        }
        Err(OrderError::ScopeNotFound(scope)) => {
            Err(ApiError::not_found(format!("{scope} does not exist")))
        }
        Err(OrderError::Database(err)) => {
            warn!(%scope, %err, "api: reorder failed in storage");
            Err(ApiError::new(ErrorCode::Internal, err.to_string()))
        }
        Err(other) => Err(ApiError::validation(other.to_string())),
    }
}

async fn ensure_course(ctx: &ApiContext, course_id: CourseId) -> Result<(), ApiError> {
    if ctx
        .storage
        .course_exists(course_id)
        .await
        .map_err(internal)?
    {
        Ok(())
    } else {
        Err(ApiError::not_found(format!("course {} not found", course_id.0)))
    }
}

async fn ensure_chapter(ctx: &ApiContext, chapter_id: ChapterId) -> Result<(), ApiError> {
    if ctx
        .storage
        .chapter_exists(chapter_id)
        .await
        .map_err(internal)?
    {
        Ok(())
    } else {
        Err(ApiError::not_found(format!("chapter {} not found", chapter_id.0)))
    }
}

fn validate_title(raw: &str) -> Result<&str, ApiError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(ApiError::validation("title cannot be empty"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ApiError::validation(format!(
            "title exceeds {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title)
}

fn normalize_description(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|d| !d.is_empty())
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}
