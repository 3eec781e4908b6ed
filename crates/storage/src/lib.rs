use anyhow::{anyhow, Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::debug;

use shared::{
    domain::{ChapterId, ContentItemId, ContentKind, CourseId, ModuleId, ReorderScope},
    protocol::{ChapterSummary, ContentItemSummary, CourseSummary, ModuleSummary},
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Reasons a replace-order request is refused.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("{0} does not exist")]
    ScopeNotFound(ReorderScope),
    #[error("item {0} appears more than once in the requested order")]
    DuplicateItem(i64),
    #[error("item {0} does not belong to {1}")]
    ForeignItem(i64, ReorderScope),
    #[error("requested order has {actual} items but {scope} holds {expected}")]
    LengthMismatch {
        scope: ReorderScope,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Table, parent column, and parent id backing one ordered scope.
struct ScopeTable {
    table: &'static str,
    parent_table: &'static str,
    parent_column: &'static str,
    parent_id: i64,
}

fn scope_table(scope: ReorderScope) -> ScopeTable {
    match scope {
        ReorderScope::CourseModules(course_id) => ScopeTable {
            table: "modules",
            parent_table: "courses",
            parent_column: "course_id",
            parent_id: course_id.0,
        },
        ReorderScope::CourseChapters(course_id) => ScopeTable {
            table: "chapters",
            parent_table: "courses",
            parent_column: "course_id",
            parent_id: course_id.0,
        },
        ReorderScope::ChapterContent(chapter_id) => ScopeTable {
            table: "content_items",
            parent_table: "chapters",
            parent_column: "chapter_id",
            parent_id: chapter_id.0,
        },
    }
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_course(&self, title: &str, description: Option<&str>) -> Result<CourseId> {
        let rec = sqlx::query("INSERT INTO courses (title, description) VALUES (?, ?) RETURNING id")
            .bind(title)
            .bind(description)
            .fetch_one(&self.pool)
            .await?;
        Ok(CourseId(rec.get::<i64, _>(0)))
    }

    pub async fn list_courses(&self) -> Result<Vec<CourseSummary>> {
        let rows = sqlx::query("SELECT id, title, description FROM courses ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| CourseSummary {
                course_id: CourseId(r.get::<i64, _>(0)),
                title: r.get::<String, _>(1),
                description: r.get::<Option<String>, _>(2),
            })
            .collect())
    }

    pub async fn course_exists(&self, course_id: CourseId) -> Result<bool> {
        self.row_exists("courses", course_id.0).await
    }

    pub async fn chapter_exists(&self, chapter_id: ChapterId) -> Result<bool> {
        self.row_exists("chapters", chapter_id.0).await
    }

    async fn row_exists(&self, table: &'static str, id: i64) -> Result<bool> {
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?)");
        let exists: i64 = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists != 0)
    }

    pub async fn create_module(
        &self,
        course_id: CourseId,
        title: &str,
        description: Option<&str>,
    ) -> Result<ModuleId> {
        let rec = sqlx::query(
            "INSERT INTO modules (course_id, title, description, position)
             VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(position) + 1, 0) FROM modules WHERE course_id = ?1))
             RETURNING id",
        )
        .bind(course_id.0)
        .bind(title)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to create module in course {}", course_id.0))?;
        Ok(ModuleId(rec.get::<i64, _>(0)))
    }

    pub async fn list_modules(&self, course_id: CourseId) -> Result<Vec<ModuleSummary>> {
        let rows = sqlx::query(
            "SELECT id, title, description
             FROM modules
             WHERE course_id = ?
             ORDER BY position, id",
        )
        .bind(course_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| ModuleSummary {
                module_id: ModuleId(r.get::<i64, _>(0)),
                course_id,
                title: r.get::<String, _>(1),
                description: r.get::<Option<String>, _>(2),
            })
            .collect())
    }

    pub async fn create_chapter(
        &self,
        course_id: CourseId,
        module_id: Option<ModuleId>,
        title: &str,
        description: Option<&str>,
    ) -> Result<ChapterId> {
        if let Some(module_id) = module_id {
            let owner: Option<i64> = sqlx::query_scalar("SELECT course_id FROM modules WHERE id = ?")
                .bind(module_id.0)
                .fetch_optional(&self.pool)
                .await?;
            if owner != Some(course_id.0) {
                return Err(anyhow!(
                    "module {} does not belong to course {}",
                    module_id.0,
                    course_id.0
                ));
            }
        }

        let rec = sqlx::query(
            "INSERT INTO chapters (course_id, module_id, title, description, position)
             VALUES (?1, ?2, ?3, ?4, (SELECT COALESCE(MAX(position) + 1, 0) FROM chapters WHERE course_id = ?1))
             RETURNING id",
        )
        .bind(course_id.0)
        .bind(module_id.map(|m| m.0))
        .bind(title)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to create chapter in course {}", course_id.0))?;
        Ok(ChapterId(rec.get::<i64, _>(0)))
    }

    pub async fn list_chapters(&self, course_id: CourseId) -> Result<Vec<ChapterSummary>> {
        let rows = sqlx::query(
            "SELECT id, module_id, title, description
             FROM chapters
             WHERE course_id = ?
             ORDER BY position, id",
        )
        .bind(course_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| ChapterSummary {
                chapter_id: ChapterId(r.get::<i64, _>(0)),
                course_id,
                module_id: r.get::<Option<i64>, _>(1).map(ModuleId),
                title: r.get::<String, _>(2),
                description: r.get::<Option<String>, _>(3),
            })
            .collect())
    }

    pub async fn create_content_item(
        &self,
        chapter_id: ChapterId,
        kind: ContentKind,
        title: &str,
    ) -> Result<ContentItemId> {
        let rec = sqlx::query(
            "INSERT INTO content_items (chapter_id, kind, title, position)
             VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(position) + 1, 0) FROM content_items WHERE chapter_id = ?1))
             RETURNING id",
        )
        .bind(chapter_id.0)
        .bind(kind.as_str())
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to create content item in chapter {}", chapter_id.0))?;
        Ok(ContentItemId(rec.get::<i64, _>(0)))
    }

    pub async fn list_content_items(&self, chapter_id: ChapterId) -> Result<Vec<ContentItemSummary>> {
        let rows = sqlx::query(
            "SELECT id, kind, title
             FROM content_items
             WHERE chapter_id = ?
             ORDER BY position, id",
        )
        .bind(chapter_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let raw_kind = r.get::<String, _>(1);
                let kind = ContentKind::parse(&raw_kind)
                    .ok_or_else(|| anyhow!("unknown content kind '{raw_kind}' in database"))?;
                Ok(ContentItemSummary {
                    content_item_id: ContentItemId(r.get::<i64, _>(0)),
                    chapter_id,
                    kind,
                    title: r.get::<String, _>(2),
                })
            })
            .collect()
    }

    /// Current id order of a scope, or `None` when the parent does not exist.
    pub async fn ordered_ids(&self, scope: ReorderScope) -> Result<Option<Vec<i64>>> {
        let target = scope_table(scope);
        if !self.row_exists(target.parent_table, target.parent_id).await? {
            return Ok(None);
        }
        let sql = format!(
            "SELECT id FROM {} WHERE {} = ? ORDER BY position, id",
            target.table, target.parent_column
        );
        let ids: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(target.parent_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(Some(ids))
    }

    /// Replaces the whole order of `scope` with `ordered_item_ids`.
    ///
    /// The request must be a permutation of the scope's current ids. Applying
    /// the same order twice is a no-op.
    pub async fn replace_order(
        &self,
        scope: ReorderScope,
        ordered_item_ids: &[i64],
    ) -> std::result::Result<(), OrderError> {
        let target = scope_table(scope);
        let mut tx = self.pool.begin().await?;

        let exists_sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)", target.parent_table);
        let parent_exists: i64 = sqlx::query_scalar(&exists_sql)
            .bind(target.parent_id)
            .fetch_one(&mut *tx)
            .await?;
        if parent_exists == 0 {
            return Err(OrderError::ScopeNotFound(scope));
        }

        let current_sql = format!(
            "SELECT id FROM {} WHERE {} = ? ORDER BY position, id",
            target.table, target.parent_column
        );
        let current: Vec<i64> = sqlx::query_scalar(&current_sql)
            .bind(target.parent_id)
            .fetch_all(&mut *tx)
            .await?;
        validate_permutation(scope, &current, ordered_item_ids)?;

        let update_sql = format!(
            "UPDATE {} SET position = ? WHERE id = ? AND {} = ?",
            target.table, target.parent_column
        );
        for (position, item_id) in ordered_item_ids.iter().enumerate() {
            sqlx::query(&update_sql)
                .bind(position as i64)
                .bind(item_id)
                .bind(target.parent_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(%scope, items = ordered_item_ids.len(), "storage: order replaced");
        Ok(())
    }
}

/// Checks that `requested` holds exactly the ids in `current`, each once.
pub fn validate_permutation(
    scope: ReorderScope,
    current: &[i64],
    requested: &[i64],
) -> std::result::Result<(), OrderError> {
    let known: HashSet<i64> = current.iter().copied().collect();
    let mut seen = HashSet::with_capacity(requested.len());
    for item_id in requested {
        if !known.contains(item_id) {
            return Err(OrderError::ForeignItem(*item_id, scope));
        }
        if !seen.insert(*item_id) {
            return Err(OrderError::DuplicateItem(*item_id));
        }
    }
    if requested.len() != current.len() {
        return Err(OrderError::LengthMismatch {
            scope,
            expected: current.len(),
            actual: requested.len(),
        });
    }
    Ok(())
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
