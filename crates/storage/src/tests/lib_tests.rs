use super::*;

async fn course_with_chapters(storage: &Storage, titles: &[&str]) -> (CourseId, Vec<i64>) {
    let course = storage
        .create_course("Rust 101", None)
        .await
        .expect("course");
    let mut ids = Vec::new();
    for title in titles {
        let chapter = storage
            .create_chapter(course, None, title, None)
            .await
            .expect("chapter");
        ids.push(chapter.0);
    }
    (course, ids)
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("courses.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn new_rows_are_appended_to_their_scope() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let (course, ids) = course_with_chapters(&storage, &["Intro", "Ownership", "Traits"]).await;

    let chapters = storage.list_chapters(course).await.expect("chapters");
    let listed: Vec<i64> = chapters.iter().map(|c| c.chapter_id.0).collect();
    assert_eq!(listed, ids);
    assert_eq!(chapters[1].title, "Ownership");
}

#[tokio::test]
async fn replace_order_is_listed_back() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let (course, ids) = course_with_chapters(&storage, &["A", "B", "C"]).await;
    let reordered = vec![ids[2], ids[0], ids[1]];

    storage
        .replace_order(ReorderScope::CourseChapters(course), &reordered)
        .await
        .expect("reorder");

    let listed = storage
        .ordered_ids(ReorderScope::CourseChapters(course))
        .await
        .expect("ids")
        .expect("scope exists");
    assert_eq!(listed, reordered);

    storage
        .replace_order(ReorderScope::CourseChapters(course), &reordered)
        .await
        .expect("same order again");
    let titles: Vec<String> = storage
        .list_chapters(course)
        .await
        .expect("chapters")
        .into_iter()
        .map(|c| c.title)
        .collect();
    assert_eq!(titles, vec!["C", "A", "B"]);
}

#[tokio::test]
async fn replace_order_rejects_partial_and_foreign_ids() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let (course, ids) = course_with_chapters(&storage, &["A", "B"]).await;
    let (_other_course, other_ids) = course_with_chapters(&storage, &["X"]).await;
    let scope = ReorderScope::CourseChapters(course);

    let err = storage
        .replace_order(scope, &[ids[1]])
        .await
        .expect_err("partial order");
    assert!(matches!(err, OrderError::LengthMismatch { expected: 2, actual: 1, .. }));

    let err = storage
        .replace_order(scope, &[ids[0], other_ids[0]])
        .await
        .expect_err("foreign id");
    assert!(matches!(err, OrderError::ForeignItem(id, _) if id == other_ids[0]));

    let listed = storage.ordered_ids(scope).await.expect("ids").expect("scope");
    assert_eq!(listed, ids, "rejected orders must not be partially applied");
}

#[tokio::test]
async fn replace_order_reports_missing_scope() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let err = storage
        .replace_order(ReorderScope::ChapterContent(ChapterId(404)), &[])
        .await
        .expect_err("missing chapter");
    assert!(matches!(err, OrderError::ScopeNotFound(_)));
    assert!(storage
        .ordered_ids(ReorderScope::ChapterContent(ChapterId(404)))
        .await
        .expect("query")
        .is_none());
}

#[tokio::test]
async fn content_items_keep_kind_and_order_per_chapter() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let (_course, chapters) = course_with_chapters(&storage, &["One", "Two"]).await;
    let first = ChapterId(chapters[0]);
    let second = ChapterId(chapters[1]);

    let video = storage
        .create_content_item(first, ContentKind::Video, "Welcome")
        .await
        .expect("video");
    let quiz = storage
        .create_content_item(first, ContentKind::Quiz, "Check")
        .await
        .expect("quiz");
    storage
        .create_content_item(second, ContentKind::Text, "Notes")
        .await
        .expect("text");

    storage
        .replace_order(ReorderScope::ChapterContent(first), &[quiz.0, video.0])
        .await
        .expect("reorder");

    let items = storage.list_content_items(first).await.expect("items");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].content_item_id, quiz);
    assert_eq!(items[0].kind, ContentKind::Quiz);
    assert_eq!(storage.list_content_items(second).await.expect("items").len(), 1);
}

#[tokio::test]
async fn chapter_module_must_belong_to_same_course() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let course = storage.create_course("A", None).await.expect("course");
    let other = storage.create_course("B", None).await.expect("course");
    let module = storage
        .create_module(other, "Basics", None)
        .await
        .expect("module");

    let err = storage
        .create_chapter(course, Some(module), "Intro", None)
        .await
        .expect_err("cross-course module");
    assert!(err.to_string().contains("does not belong"));
}

#[test]
fn validate_permutation_flags_duplicates() {
    let scope = ReorderScope::CourseModules(CourseId(1));
    let err = validate_permutation(scope, &[1, 2, 3], &[1, 1, 2]).expect_err("duplicate");
    assert!(matches!(err, OrderError::DuplicateItem(1)));
    validate_permutation(scope, &[1, 2, 3], &[3, 1, 2]).expect("permutation");
}
