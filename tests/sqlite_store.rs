//! SQLite store behaviour through the real `CourseIndex`.

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use course_rag::db;
use course_rag::migrate::run_migrations;
use course_rag::sqlite_store::SqliteStore;
use course_rag_core::embedding::HashEmbedder;
use course_rag_core::index::{CourseIndex, IndexConfig};
use course_rag_core::models::{Chunk, ChunkFilter, Course};
use course_rag_core::store::Store;

const INTRO: &str = "Course Title: Intro to X
Course Link: https://example.com/x
Course Instructor: Ada Lovelace

Lesson 0: Welcome
Welcome to the course. We meet once a week.

Lesson 1: Foundations
Lesson Link: https://example.com/x/1
Foundations cover variables and loops.
";

const BREAD: &str = "Course Title: Baking Bread Basics

Lesson 1: Starters
Feed the sourdough starter every day.

Lesson 2: Shaping
Knead the dough and shape the loaf.
";

async fn open(path: &Path) -> Arc<SqliteStore> {
    let pool = db::connect(path).await.unwrap();
    run_migrations(&pool).await.unwrap();
    Arc::new(SqliteStore::new(pool))
}

fn index(store: Arc<SqliteStore>) -> CourseIndex {
    CourseIndex::new(store, Arc::new(HashEmbedder::default()), IndexConfig::default())
}

async fn chunk_rows(store: &SqliteStore) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(store.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("data/courses.sqlite");
    let pool = db::connect(&path).await.unwrap();
    run_migrations(&pool).await.unwrap();
    run_migrations(&pool).await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn test_catalog_round_trip() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp.path().join("c.sqlite")).await;
    let index = index(store.clone());

    index.ingest_document("intro.txt", INTRO).await.unwrap();
    index.ingest_document("bread.txt", BREAD).await.unwrap();

    let course = index.get_course("Intro to X").await.unwrap().unwrap();
    assert_eq!(course.instructor.as_deref(), Some("Ada Lovelace"));
    assert_eq!(course.link.as_deref(), Some("https://example.com/x"));
    assert_eq!(course.lessons.len(), 2);
    assert_eq!(
        course.lesson(1).and_then(|l| l.link.as_deref()),
        Some("https://example.com/x/1")
    );

    let catalog = index.list_courses().await.unwrap();
    assert_eq!(catalog.total_courses, 2);
    assert_eq!(catalog.course_titles, vec!["Baking Bread Basics", "Intro to X"]);
    assert!(index.get_course("Nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_filtered_search() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp.path().join("c.sqlite")).await;
    let index = index(store.clone());
    index.ingest_document("intro.txt", INTRO).await.unwrap();
    index.ingest_document("bread.txt", BREAD).await.unwrap();

    let hits = index
        .search("knead the dough", Some("bread"), None, 5)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.chunk.course_title == "Baking Bread Basics"));
    assert_eq!(hits[0].chunk.lesson_number, Some(2));
    assert!(hits[0].distance <= hits[1].distance);
    assert!(hits[0].chunk.body().starts_with("Knead the dough"));

    let hits = index.search("anything", None, Some(1), 10).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.chunk.lesson_number == Some(1)));

    let hits = index.search("anything", None, Some(7), 10).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_reingest_replaces_chunks() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp.path().join("c.sqlite")).await;
    let index = index(store.clone());

    index.ingest_document("bread.txt", BREAD).await.unwrap();
    assert_eq!(chunk_rows(&store).await, 2);

    let shorter = "Course Title: Baking Bread Basics\n\nLesson 1: Flatbreads\nFlatbreads need no yeast.\n";
    index.ingest_document("bread.txt", shorter).await.unwrap();
    assert_eq!(chunk_rows(&store).await, 1);

    let hits = index.search("sourdough", None, None, 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].chunk.body().contains("Flatbreads"));
    assert_eq!(index.list_courses().await.unwrap().total_courses, 1);
}

#[tokio::test]
async fn test_delete_course_removes_everything() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp.path().join("c.sqlite")).await;
    let index = index(store.clone());
    index.ingest_document("intro.txt", INTRO).await.unwrap();

    store.delete_course("Intro to X").await.unwrap();
    store.delete_course("Intro to X").await.unwrap();

    assert_eq!(chunk_rows(&store).await, 0);
    assert!(store.course_titles().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_mismatched_vectors_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = open(&tmp.path().join("c.sqlite")).await;

    let chunk = Chunk {
        id: "c1".into(),
        course_title: "T".into(),
        lesson_number: Some(1),
        chunk_index: 0,
        text: "Course T Lesson 1 content: body".into(),
        body_offset: 27,
        hash: "h".into(),
    };
    let err = store.replace_chunks("T", &[chunk], &[]).await.unwrap_err();
    assert_eq!(err.code(), "index_unavailable");
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("c.sqlite");
    {
        let store = open(&path).await;
        index(store.clone())
            .ingest_document("intro.txt", INTRO)
            .await
            .unwrap();
        store.pool().close().await;
    }

    let store = open(&path).await;
    let index = index(store.clone());
    assert_eq!(
        index.resolve_course_name("intro x").await.unwrap().as_deref(),
        Some("Intro to X")
    );

    let filter = ChunkFilter {
        course_title: Some("Intro to X".into()),
        lesson_number: Some(0),
    };
    let vec = HashEmbedder::default().embed_text("welcome");
    let hits = store.search_chunks(&vec, &filter, 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.chunk_index, 0);

    let empty = Course {
        title: "Empty".into(),
        instructor: None,
        link: None,
        lessons: Vec::new(),
    };
    index.add_course(&empty, &[]).await.unwrap();
    assert_eq!(index.list_courses().await.unwrap().total_courses, 2);
}
