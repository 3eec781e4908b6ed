use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(CourseId);
id_newtype!(ModuleId);
id_newtype!(ChapterId);
id_newtype!(ContentItemId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Video,
    Text,
    Quiz,
    File,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Video => "video",
            ContentKind::Text => "text",
            ContentKind::Quiz => "quiz",
            ContentKind::File => "file",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "video" => Some(ContentKind::Video),
            "text" => Some(ContentKind::Text),
            "quiz" => Some(ContentKind::Quiz),
            "file" => Some(ContentKind::File),
            _ => None,
        }
    }
}

/// The parent context that owns one independently ordered sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ReorderScope {
    CourseModules(CourseId),
    CourseChapters(CourseId),
    ChapterContent(ChapterId),
}

impl ReorderScope {
    /// Raw id of the parent entity, as carried in `ReorderRequest::scope_id`.
    pub fn parent_id(self) -> i64 {
        match self {
            ReorderScope::CourseModules(course_id) | ReorderScope::CourseChapters(course_id) => {
                course_id.0
            }
            ReorderScope::ChapterContent(chapter_id) => chapter_id.0,
        }
    }

    /// Path of the replace-order endpoint for this scope.
    pub fn order_route(self) -> String {
        match self {
            ReorderScope::CourseModules(course_id) => format!("/courses/{}/modules/order", course_id.0),
            ReorderScope::CourseChapters(course_id) => {
                format!("/courses/{}/chapters/order", course_id.0)
            }
            ReorderScope::ChapterContent(chapter_id) => {
                format!("/chapters/{}/content/order", chapter_id.0)
            }
        }
    }
}

impl fmt::Display for ReorderScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReorderScope::CourseModules(course_id) => write!(f, "course:{}/modules", course_id.0),
            ReorderScope::CourseChapters(course_id) => write!(f, "course:{}/chapters", course_id.0),
            ReorderScope::ChapterContent(chapter_id) => {
                write!(f, "chapter:{}/content", chapter_id.0)
            }
        }
    }
}
