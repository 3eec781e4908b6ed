use std::{
    collections::{btree_map::Entry, BTreeMap},
    sync::Arc,
};

use anyhow::{Context, Result};
use shared::{
    domain::{ChapterId, CourseId, ReorderScope},
    protocol::{ChapterSummary, ContentItemSummary, ModuleSummary, ServerEvent},
};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::{
    controller::{RefreshOutcome, ReorderController, ReorderTimings},
    store::ItemStore,
};

pub type ModuleController = ReorderController<ModuleSummary>;
pub type ChapterController = ReorderController<ChapterSummary>;
pub type ContentController = ReorderController<ContentItemSummary>;

const CONTENT_ADDED_BUFFER: usize = 16;

/// All reorderable scopes of one course, each with its own controller.
pub struct CourseOutline {
    course_id: CourseId,
    store: Arc<dyn ItemStore>,
    timings: ReorderTimings,
    modules: Arc<ModuleController>,
    chapters: Arc<ChapterController>,
    content: RwLock<BTreeMap<ChapterId, Arc<ContentController>>>,
    content_added: broadcast::Sender<ChapterId>,
}

impl CourseOutline {
    pub async fn load(
        store: Arc<dyn ItemStore>,
        course_id: CourseId,
        timings: ReorderTimings,
    ) -> Result<Arc<Self>> {
        let modules = store
            .list_modules(course_id)
            .await
            .with_context(|| format!("failed to load modules of course {course_id}"))?;
        let chapters = store
            .list_chapters(course_id)
            .await
            .with_context(|| format!("failed to load chapters of course {course_id}"))?;

        let mut content = BTreeMap::new();
        for chapter in &chapters {
            let controller = load_content_controller(&store, chapter.chapter_id, timings).await?;
            content.insert(chapter.chapter_id, controller);
        }
        info!(
            course_id = course_id.0,
            modules = modules.len(),
            chapters = chapters.len(),
            "outline: loaded course"
        );

        Ok(Arc::new(Self {
            course_id,
            modules: ReorderController::new(
                ReorderScope::CourseModules(course_id),
                Arc::clone(&store),
                timings,
                modules,
            ),
            chapters: ReorderController::new(
                ReorderScope::CourseChapters(course_id),
                Arc::clone(&store),
                timings,
                chapters,
            ),
            content: RwLock::new(content),
            content_added: broadcast::channel(CONTENT_ADDED_BUFFER).0,
            store,
            timings,
        }))
    }

    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    pub fn modules(&self) -> &Arc<ModuleController> {
        &self.modules
    }

    pub fn chapters(&self) -> &Arc<ChapterController> {
        &self.chapters
    }

    pub async fn content(&self, chapter_id: ChapterId) -> Option<Arc<ContentController>> {
        self.content.read().await.get(&chapter_id).cloned()
    }

    /// Chapters whose content controller was created after `load`.
    pub fn content_added(&self) -> broadcast::Receiver<ChapterId> {
        self.content_added.subscribe()
    }

    pub async fn content_chapters(&self) -> Vec<ChapterId> {
        self.content.read().await.keys().copied().collect()
    }

    /// Whether `scope` is one of the sequences managed by this outline.
    pub async fn owns(&self, scope: ReorderScope) -> bool {
        match scope {
            ReorderScope::CourseModules(course_id) | ReorderScope::CourseChapters(course_id) => {
                course_id == self.course_id
            }
            ReorderScope::ChapterContent(chapter_id) => {
                self.content.read().await.contains_key(&chapter_id)
            }
        }
    }

    /// Fetches the authoritative sequence for `scope` and hands it to the
    /// scope's controller. Returns `None` for scopes outside this course.
    pub async fn refresh_scope(&self, scope: ReorderScope) -> Result<Option<RefreshOutcome>> {
        if !self.owns(scope).await {
            return Ok(None);
        }
        let outcome = match scope {
            ReorderScope::CourseModules(course_id) => {
                let modules = self.store.list_modules(course_id).await?;
                self.modules.initialize(modules).await
            }
            ReorderScope::CourseChapters(course_id) => {
                let chapters = self.store.list_chapters(course_id).await?;
                self.sync_content_controllers(&chapters).await?;
                self.chapters.initialize(chapters).await
            }
            ReorderScope::ChapterContent(chapter_id) => {
                let Some(controller) = self.content(chapter_id).await else {
                    return Ok(None);
                };
                let items = self.store.list_content(chapter_id).await?;
                controller.initialize(items).await
            }
        };
        debug!(%scope, ?outcome, "outline: refreshed scope");
        Ok(Some(outcome))
    }

    /// Routes a server broadcast to the controller whose sequence it touches.
    pub async fn apply_server_event(&self, event: &ServerEvent) -> Result<Option<RefreshOutcome>> {
        let scope = match event {
            ServerEvent::OrderChanged { scope, .. } => *scope,
            ServerEvent::ModuleCreated { module } if module.course_id == self.course_id => {
                ReorderScope::CourseModules(self.course_id)
            }
            ServerEvent::ChapterCreated { chapter } if chapter.course_id == self.course_id => {
                ReorderScope::CourseChapters(self.course_id)
            }
            ServerEvent::ContentItemCreated { item } => ReorderScope::ChapterContent(item.chapter_id),
            _ => return Ok(None),
        };
        self.refresh_scope(scope).await
    }

    async fn sync_content_controllers(&self, chapters: &[ChapterSummary]) -> Result<()> {
        for chapter in chapters {
            if self.content.read().await.contains_key(&chapter.chapter_id) {
                continue;
            }
            let controller =
                load_content_controller(&self.store, chapter.chapter_id, self.timings).await?;
            if let Entry::Vacant(slot) = self.content.write().await.entry(chapter.chapter_id) {
                slot.insert(controller);
                info!(chapter_id = chapter.chapter_id.0, "outline: tracking new chapter");
                let _ = self.content_added.send(chapter.chapter_id);
            }
        }
        Ok(())
    }
}

async fn load_content_controller(
    store: &Arc<dyn ItemStore>,
    chapter_id: ChapterId,
    timings: ReorderTimings,
) -> Result<Arc<ContentController>> {
    let items = store
        .list_content(chapter_id)
        .await
        .with_context(|| format!("failed to load content of chapter {chapter_id}"))?;
    Ok(ReorderController::new(
        ReorderScope::ChapterContent(chapter_id),
        Arc::clone(store),
        timings,
        items,
    ))
}

#[cfg(test)]
#[path = "tests/outline_tests.rs"]
mod tests;
