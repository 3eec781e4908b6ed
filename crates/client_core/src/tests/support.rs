use std::{collections::HashMap, sync::Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{ChapterId, ContentItemId, ContentKind, CourseId, ModuleId, ReorderScope},
    protocol::{ChapterSummary, ContentItemSummary, ModuleSummary},
};

use crate::{ordering::OrderedItem, store::ItemStore};

pub(crate) const COURSE: CourseId = CourseId(1);

pub(crate) fn module(id: i64) -> ModuleSummary {
    ModuleSummary {
        module_id: ModuleId(id),
        course_id: COURSE,
        title: format!("Module {id}"),
        description: None,
    }
}

pub(crate) fn chapter(id: i64) -> ChapterSummary {
    ChapterSummary {
        chapter_id: ChapterId(id),
        course_id: COURSE,
        module_id: Some(ModuleId(10)),
        title: format!("Chapter {id}"),
        description: None,
    }
}

pub(crate) fn item(id: i64, chapter_id: i64) -> ContentItemSummary {
    ContentItemSummary {
        content_item_id: ContentItemId(id),
        chapter_id: ChapterId(chapter_id),
        kind: ContentKind::Text,
        title: format!("Item {id}"),
    }
}

/// In-memory outline of course 1: modules 10, 11; chapters 20, 21, 22;
/// content 30-32 in chapter 20 and 33 in chapter 21.
pub(crate) struct MemoryStore {
    pub modules: Mutex<Vec<ModuleSummary>>,
    pub chapters: Mutex<Vec<ChapterSummary>>,
    pub content: Mutex<HashMap<ChapterId, Vec<ContentItemSummary>>>,
    pub reorders: Mutex<Vec<(ReorderScope, Vec<i64>)>>,
}

impl MemoryStore {
    pub fn seeded() -> Self {
        let content = HashMap::from([
            (ChapterId(20), vec![item(30, 20), item(31, 20), item(32, 20)]),
            (ChapterId(21), vec![item(33, 21)]),
            (ChapterId(22), Vec::new()),
        ]);
        Self {
            modules: Mutex::new(vec![module(10), module(11)]),
            chapters: Mutex::new(vec![chapter(20), chapter(21), chapter(22)]),
            content: Mutex::new(content),
            reorders: Mutex::new(Vec::new()),
        }
    }

    pub fn reorders(&self) -> Vec<(ReorderScope, Vec<i64>)> {
        self.reorders.lock().expect("reorders lock").clone()
    }
}

fn arrange<T: OrderedItem>(items: &mut Vec<T>, ordered_item_ids: &[i64]) -> Result<()> {
    let mut arranged = Vec::with_capacity(items.len());
    for id in ordered_item_ids {
        let item = items
            .iter()
            .find(|item| item.item_id() == *id)
            .ok_or_else(|| anyhow!("unknown item {id}"))?;
        arranged.push(item.clone());
    }
    if arranged.len() != items.len() {
        return Err(anyhow!("expected {} ids", items.len()));
    }
    *items = arranged;
    Ok(())
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn list_modules(&self, _course_id: CourseId) -> Result<Vec<ModuleSummary>> {
        Ok(self.modules.lock().expect("modules lock").clone())
    }

    async fn list_chapters(&self, _course_id: CourseId) -> Result<Vec<ChapterSummary>> {
        Ok(self.chapters.lock().expect("chapters lock").clone())
    }

    async fn list_content(&self, chapter_id: ChapterId) -> Result<Vec<ContentItemSummary>> {
        self.content
            .lock()
            .expect("content lock")
            .get(&chapter_id)
            .cloned()
            .ok_or_else(|| anyhow!("chapter {chapter_id} not found"))
    }

    async fn reorder(&self, scope: ReorderScope, ordered_item_ids: &[i64]) -> Result<()> {
        self.reorders
            .lock()
            .expect("reorders lock")
            .push((scope, ordered_item_ids.to_vec()));
        match scope {
            ReorderScope::CourseModules(_) => arrange(
                &mut *self.modules.lock().expect("modules lock"),
                ordered_item_ids,
            ),
            ReorderScope::CourseChapters(_) => arrange(
                &mut *self.chapters.lock().expect("chapters lock"),
                ordered_item_ids,
            ),
            ReorderScope::ChapterContent(chapter_id) => {
                let mut content = self.content.lock().expect("content lock");
                let items = content
                    .get_mut(&chapter_id)
                    .ok_or_else(|| anyhow!("chapter {chapter_id} not found"))?;
                arrange(items, ordered_item_ids)
            }
        }
    }
}
