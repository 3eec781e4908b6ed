use super::*;
use std::time::Duration;

use chrono::Utc;
use shared::domain::ModuleId;

use crate::{
    controller::ReorderStatus,
    ordering::{item_ids, OrderedItem},
    tests::support::{chapter, item, module, MemoryStore, COURSE},
};

async fn load(store: &Arc<MemoryStore>) -> Arc<CourseOutline> {
    CourseOutline::load(store.clone(), COURSE, ReorderTimings::default())
        .await
        .expect("load outline")
}

fn order_changed(scope: ReorderScope, ordered_item_ids: Vec<i64>) -> ServerEvent {
    ServerEvent::OrderChanged {
        scope,
        ordered_item_ids,
        changed_at: Utc::now(),
    }
}

#[tokio::test]
async fn load_builds_one_controller_per_scope() {
    let store = Arc::new(MemoryStore::seeded());
    let outline = load(&store).await;

    assert_eq!(item_ids(&outline.modules().view().items), vec![10, 11]);
    assert_eq!(item_ids(&outline.chapters().view().items), vec![20, 21, 22]);
    assert_eq!(
        outline.content_chapters().await,
        vec![ChapterId(20), ChapterId(21), ChapterId(22)]
    );
    let content = outline.content(ChapterId(20)).await.expect("chapter 20");
    assert_eq!(item_ids(&content.view().items), vec![30, 31, 32]);
    assert_eq!(content.scope(), ReorderScope::ChapterContent(ChapterId(20)));

    assert!(outline.owns(ReorderScope::CourseModules(COURSE)).await);
    assert!(!outline.owns(ReorderScope::CourseModules(CourseId(2))).await);
    assert!(!outline.owns(ReorderScope::ChapterContent(ChapterId(99))).await);
}

#[tokio::test]
async fn order_changed_refreshes_only_matching_scope() {
    let store = Arc::new(MemoryStore::seeded());
    let outline = load(&store).await;

    store
        .content
        .lock()
        .expect("content lock")
        .insert(ChapterId(20), vec![item(32, 20), item(30, 20), item(31, 20)]);
    let outcome = outline
        .apply_server_event(&order_changed(
            ReorderScope::ChapterContent(ChapterId(20)),
            vec![32, 30, 31],
        ))
        .await
        .expect("apply event");
    assert_eq!(outcome, Some(RefreshOutcome::Applied));

    let chapter_20 = outline.content(ChapterId(20)).await.expect("chapter 20");
    assert_eq!(item_ids(&chapter_20.view().items), vec![32, 30, 31]);
    let chapter_21 = outline.content(ChapterId(21)).await.expect("chapter 21");
    assert_eq!(item_ids(&chapter_21.view().items), vec![33]);
    assert_eq!(item_ids(&outline.chapters().view().items), vec![20, 21, 22]);
}

#[tokio::test]
async fn events_for_other_courses_are_ignored() {
    let store = Arc::new(MemoryStore::seeded());
    let outline = load(&store).await;

    let foreign_order = order_changed(ReorderScope::CourseModules(CourseId(2)), vec![1, 2]);
    assert_eq!(
        outline
            .apply_server_event(&foreign_order)
            .await
            .expect("apply"),
        None
    );

    let mut foreign_module = module(40);
    foreign_module.course_id = CourseId(2);
    let created = ServerEvent::ModuleCreated {
        module: foreign_module,
    };
    assert_eq!(outline.apply_server_event(&created).await.expect("apply"), None);
    assert_eq!(item_ids(&outline.modules().view().items), vec![10, 11]);
}

#[tokio::test]
async fn created_chapter_gets_its_own_content_controller() {
    let store = Arc::new(MemoryStore::seeded());
    let outline = load(&store).await;

    store
        .chapters
        .lock()
        .expect("chapters lock")
        .insert(0, chapter(23));
    store
        .content
        .lock()
        .expect("content lock")
        .insert(ChapterId(23), vec![item(34, 23)]);

    let outcome = outline
        .apply_server_event(&ServerEvent::ChapterCreated {
            chapter: chapter(23),
        })
        .await
        .expect("apply");
    assert_eq!(outcome, Some(RefreshOutcome::Applied));
    assert_eq!(item_ids(&outline.chapters().view().items), vec![23, 20, 21, 22]);
    let content = outline.content(ChapterId(23)).await.expect("chapter 23");
    assert_eq!(item_ids(&content.view().items), vec![34]);
}

#[tokio::test]
async fn new_chapter_is_announced_once() {
    let store = Arc::new(MemoryStore::seeded());
    let outline = load(&store).await;
    let mut added = outline.content_added();

    store
        .chapters
        .lock()
        .expect("chapters lock")
        .push(chapter(23));
    store
        .content
        .lock()
        .expect("content lock")
        .insert(ChapterId(23), vec![item(34, 23)]);

    let created = ServerEvent::ChapterCreated {
        chapter: chapter(23),
    };
    outline.apply_server_event(&created).await.expect("apply");
    outline.apply_server_event(&created).await.expect("apply again");

    assert_eq!(added.recv().await.expect("announced"), ChapterId(23));
    assert!(matches!(
        added.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
    assert!(outline.content(ChapterId(23)).await.is_some());
}

#[tokio::test]
async fn created_module_is_listed_after_refresh() {
    let store = Arc::new(MemoryStore::seeded());
    let outline = load(&store).await;

    store.modules.lock().expect("modules lock").push(module(12));
    let outcome = outline
        .apply_server_event(&ServerEvent::ModuleCreated { module: module(12) })
        .await
        .expect("apply");
    assert_eq!(outcome, Some(RefreshOutcome::Applied));
    let ids: Vec<ModuleId> = outline
        .modules()
        .view()
        .items
        .iter()
        .map(|module| module.module_id)
        .collect();
    assert_eq!(ids, vec![ModuleId(10), ModuleId(11), ModuleId(12)]);
}

#[tokio::test(start_paused = true)]
async fn moves_persist_per_scope_and_echo_is_harmless() {
    let store = Arc::new(MemoryStore::seeded());
    let outline = load(&store).await;
    let chapters = Arc::clone(outline.chapters());

    assert!(chapters.request_reorder(22, 2, 0).await);
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(
        store.reorders(),
        vec![(ReorderScope::CourseChapters(COURSE), vec![22, 20, 21])]
    );
    assert_eq!(chapters.view().status, ReorderStatus::Success);

    let echo = order_changed(ReorderScope::CourseChapters(COURSE), vec![22, 20, 21]);
    assert_eq!(
        outline.apply_server_event(&echo).await.expect("apply"),
        Some(RefreshOutcome::Unchanged)
    );
    let listed: Vec<i64> = store
        .chapters
        .lock()
        .expect("chapters lock")
        .iter()
        .map(OrderedItem::item_id)
        .collect();
    assert_eq!(listed, vec![22, 20, 21]);
}

#[tokio::test(start_paused = true)]
async fn refresh_during_local_edit_is_deferred() {
    let store = Arc::new(MemoryStore::seeded());
    let outline = load(&store).await;
    let content = outline.content(ChapterId(20)).await.expect("chapter 20");

    content.enter_manual_reorder_mode().await;
    assert!(content.request_reorder(30, 0, 2).await);
    let outcome = outline
        .refresh_scope(ReorderScope::ChapterContent(ChapterId(20)))
        .await
        .expect("refresh");
    assert_eq!(outcome, Some(RefreshOutcome::Deferred));
    assert_eq!(item_ids(&content.view().items), vec![31, 32, 30]);
}
