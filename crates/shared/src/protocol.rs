use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChapterId, ContentItemId, ContentKind, CourseId, ModuleId, ReorderScope},
    error::ApiError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub course_id: CourseId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub module_id: ModuleId,
    pub course_id: CourseId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub chapter_id: ChapterId,
    pub course_id: CourseId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<ModuleId>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItemSummary {
    pub content_item_id: ContentItemId,
    pub chapter_id: ChapterId,
    pub kind: ContentKind,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCourseRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateModuleRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChapterRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub module_id: Option<ModuleId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateContentItemRequest {
    pub title: String,
    pub kind: ContentKind,
}

/// Replace-order request: always the complete ordered id list for the scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderRequest {
    pub scope_id: i64,
    pub ordered_item_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderResponse {
    pub scope: ReorderScope,
    pub ordered_item_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    CourseCreated {
        course: CourseSummary,
    },
    ModuleCreated {
        module: ModuleSummary,
    },
    ChapterCreated {
        chapter: ChapterSummary,
    },
    ContentItemCreated {
        item: ContentItemSummary,
    },
    OrderChanged {
        scope: ReorderScope,
        ordered_item_ids: Vec<i64>,
        changed_at: DateTime<Utc>,
    },
    Error(ApiError),
}
