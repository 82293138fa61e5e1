//! The course vector index.
//!
//! [`CourseIndex`] combines a [`Store`] with an [`Embedder`] and exposes the
//! operations the rest of the pipeline needs: fuzzy course-name resolution,
//! filtered semantic search over chunks, idempotent course ingestion, and a
//! catalog summary.
//!
//! # Course resolution
//!
//! A loose course name ("the intro course") is embedded and compared to the
//! embedding of every course title. The nearest title wins if its cosine
//! distance is at most `course_match_max_distance`; otherwise the name does
//! not resolve. Exact title lookups go through [`CourseIndex::get_course`].
//!
//! # Ingestion as one unit
//!
//! [`CourseIndex::add_course`] embeds everything before touching the store,
//! then writes chunks and finally the catalog entry. If either write fails,
//! the course is deleted entirely so the catalog never lists a course whose
//! chunks are missing.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chunk::{chunk_course, ChunkConfig};
use crate::document::parse_course_document;
use crate::embedding::{embed_one, Embedder};
use crate::error::{RagError, Result};
use crate::models::{Chunk, ChunkFilter, ChunkHit, Course, CourseCatalog};
use crate::store::Store;

/// Retrieval and chunking parameters for a [`CourseIndex`].
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub chunking: ChunkConfig,
    /// Largest cosine distance at which a course name still resolves.
    pub course_match_max_distance: f32,
    /// Chunk hits farther than this are dropped. `None` keeps everything.
    pub max_chunk_distance: Option<f32>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkConfig::default(),
            course_match_max_distance: 0.9,
            max_chunk_distance: None,
        }
    }
}

/// Summary of one ingested document.
#[derive(Debug, Clone)]
pub struct IngestedCourse {
    pub course: Course,
    pub chunk_count: usize,
}

/// Vector index over courses and their chunks.
#[derive(Clone)]
pub struct CourseIndex {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    config: IndexConfig,
}

impl CourseIndex {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<dyn Embedder>, config: IndexConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Resolve a loose course name to an exact catalog title.
    ///
    /// Returns `Ok(None)` when the catalog is empty or the nearest title is
    /// beyond the configured distance cutoff.
    pub async fn resolve_course_name(&self, partial: &str) -> Result<Option<String>> {
        let query_vec = embed_one(self.embedder.as_ref(), partial).await?;
        let nearest = self.store.nearest_courses(&query_vec, 1).await?;

        match nearest.into_iter().next() {
            Some(m) if m.distance <= self.config.course_match_max_distance => {
                debug!(partial, title = %m.title, distance = m.distance, "resolved course name");
                Ok(Some(m.title))
            }
            Some(m) => {
                debug!(partial, nearest = %m.title, distance = m.distance, "course name too far from any title");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Semantic search over chunks.
    ///
    /// `course_name` is resolved with [`resolve_course_name`](Self::resolve_course_name)
    /// first; an unresolvable name is [`RagError::CourseNotFound`] rather
    /// than an unfiltered search. An empty result means the filters matched
    /// nothing and is not an error.
    pub async fn search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
        limit: usize,
    ) -> Result<Vec<ChunkHit>> {
        let course_title = match course_name {
            Some(name) => Some(
                self.resolve_course_name(name)
                    .await?
                    .ok_or_else(|| RagError::CourseNotFound(name.to_string()))?,
            ),
            None => None,
        };

        let filter = ChunkFilter {
            course_title,
            lesson_number,
        };
        let query_vec = embed_one(self.embedder.as_ref(), query).await?;
        let mut hits = self.store.search_chunks(&query_vec, &filter, limit).await?;

        if let Some(max) = self.config.max_chunk_distance {
            hits.retain(|h| h.distance <= max);
        }

        debug!(
            query,
            course = ?filter.course_title,
            lesson = ?filter.lesson_number,
            hits = hits.len(),
            "chunk search"
        );
        Ok(hits)
    }

    /// Insert or replace a course and all of its chunks.
    ///
    /// Re-adding a title replaces its previous chunks and metadata. On a
    /// store failure the course is removed rather than left half-written.
    pub async fn add_course(&self, course: &Course, chunks: &[Chunk]) -> Result<()> {
        let course_vec = embed_one(self.embedder.as_ref(), &course.title).await?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed(&texts).await?
        };
        if vectors.len() != chunks.len() {
            return Err(RagError::generation(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        if let Err(e) = self
            .store
            .replace_chunks(&course.title, chunks, &vectors)
            .await
        {
            self.rollback(&course.title).await;
            return Err(e);
        }
        if let Err(e) = self.store.upsert_course(course, &course_vec).await {
            self.rollback(&course.title).await;
            return Err(e);
        }

        info!(
            course = %course.title,
            lessons = course.lessons.len(),
            chunks = chunks.len(),
            "indexed course"
        );
        Ok(())
    }

    async fn rollback(&self, title: &str) {
        if let Err(e) = self.store.delete_course(title).await {
            warn!(course = %title, error = %e, "failed to roll back partially indexed course");
        }
    }

    /// Parse, chunk and index one course document.
    pub async fn ingest_document(&self, source_name: &str, text: &str) -> Result<IngestedCourse> {
        let doc = parse_course_document(source_name, text)?;
        let chunks = chunk_course(&doc, &self.config.chunking);
        self.add_course(&doc.course, &chunks).await?;
        Ok(IngestedCourse {
            chunk_count: chunks.len(),
            course: doc.course,
        })
    }

    /// Catalog summary: course count and sorted titles.
    pub async fn list_courses(&self) -> Result<CourseCatalog> {
        let course_titles = self.store.course_titles().await?;
        Ok(CourseCatalog {
            total_courses: course_titles.len(),
            course_titles,
        })
    }

    /// Exact catalog lookup.
    pub async fn get_course(&self, title: &str) -> Result<Option<Course>> {
        self.store.get_course(title).await
    }

    /// Link of one lesson, if the course and lesson exist and have one.
    pub async fn lesson_link(&self, course_title: &str, lesson_number: u32) -> Result<Option<String>> {
        Ok(self
            .store
            .get_course(course_title)
            .await?
            .and_then(|c| c.lesson(lesson_number).and_then(|l| l.link.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::models::Lesson;
    use crate::store::memory::InMemoryStore;
    use crate::store::CourseMatch;
    use async_trait::async_trait;

    const INTRO: &str = "Course Title: Intro to X
Course Link: https://example.com/x
Course Instructor: Ada

Lesson 0: Welcome
Lesson Link: https://example.com/x/0
Welcome to the course. We set up the toolchain.

Lesson 1: Foundations
Lesson Link: https://example.com/x/1
Foundations cover variables and loops. Loops repeat work.
";

    const COOKING: &str = "Course Title: Baking Bread
Lesson 1: Dough
Flour water salt and yeast make dough. Knead it well.
";

    fn index() -> CourseIndex {
        CourseIndex::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(HashEmbedder::default()),
            IndexConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_ingest_and_list() {
        let idx = index();
        let first = idx.ingest_document("intro.txt", INTRO).await.unwrap();
        assert_eq!(first.course.lessons.len(), 2);
        assert_eq!(first.chunk_count, 2);
        idx.ingest_document("bread.txt", COOKING).await.unwrap();

        let a = idx.list_courses().await.unwrap();
        let b = idx.list_courses().await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.total_courses, 2);
        assert_eq!(a.course_titles, vec!["Baking Bread", "Intro to X"]);
    }

    #[tokio::test]
    async fn test_resolve_course_name() {
        let idx = index();
        idx.ingest_document("intro.txt", INTRO).await.unwrap();
        idx.ingest_document("bread.txt", COOKING).await.unwrap();

        assert_eq!(
            idx.resolve_course_name("intro x").await.unwrap().as_deref(),
            Some("Intro to X")
        );
        assert_eq!(
            idx.resolve_course_name("bread baking").await.unwrap().as_deref(),
            Some("Baking Bread")
        );
        assert_eq!(idx.resolve_course_name("quantum chemistry").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_search_with_filters() {
        let idx = index();
        idx.ingest_document("intro.txt", INTRO).await.unwrap();
        idx.ingest_document("bread.txt", COOKING).await.unwrap();

        let hits = idx
            .search("loops and variables", Some("Intro to X"), Some(1), 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.course_title, "Intro to X");
        assert_eq!(hits[0].chunk.lesson_number, Some(1));

        let empty = idx
            .search("loops", Some("Intro to X"), Some(9), 5)
            .await
            .unwrap();
        assert!(empty.is_empty());

        let err = idx
            .search("loops", Some("organic chemistry"), None, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::CourseNotFound(name) if name == "organic chemistry"));
    }

    #[tokio::test]
    async fn test_search_results_ascend() {
        let idx = index();
        idx.ingest_document("intro.txt", INTRO).await.unwrap();
        idx.ingest_document("bread.txt", COOKING).await.unwrap();
        let hits = idx.search("knead the dough", None, None, 10).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert_eq!(hits[0].chunk.course_title, "Baking Bread");
    }

    #[tokio::test]
    async fn test_reingest_replaces_content() {
        let idx = index();
        idx.ingest_document("intro.txt", INTRO).await.unwrap();
        let replacement = "Course Title: Intro to X\nLesson 0: Fresh\nEntirely different material about gardens.\n";
        idx.ingest_document("intro.txt", replacement).await.unwrap();

        let hits = idx
            .search("variables loops", Some("Intro to X"), Some(1), 5)
            .await
            .unwrap();
        assert!(hits.is_empty());

        let course = idx.get_course("Intro to X").await.unwrap().unwrap();
        assert_eq!(course.lessons.len(), 1);
        assert_eq!(idx.list_courses().await.unwrap().total_courses, 1);
    }

    #[tokio::test]
    async fn test_lesson_link_lookup() {
        let idx = index();
        idx.ingest_document("intro.txt", INTRO).await.unwrap();
        assert_eq!(
            idx.lesson_link("Intro to X", 1).await.unwrap().as_deref(),
            Some("https://example.com/x/1")
        );
        assert_eq!(idx.lesson_link("Intro to X", 7).await.unwrap(), None);
        assert_eq!(idx.lesson_link("Nope", 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_parse_error_leaves_index_untouched() {
        let idx = index();
        let err = idx
            .ingest_document("bad.txt", "Lesson 1: Orphan\nbody\n")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "parse_error");
        assert_eq!(idx.list_courses().await.unwrap().total_courses, 0);
    }

    /// Delegates to an in-memory store but fails every catalog write.
    struct CatalogWriteFails(InMemoryStore);

    #[async_trait]
    impl Store for CatalogWriteFails {
        async fn upsert_course(&self, _course: &Course, _vector: &[f32]) -> Result<()> {
            Err(RagError::index("catalog offline"))
        }
        async fn replace_chunks(&self, t: &str, c: &[Chunk], v: &[Vec<f32>]) -> Result<()> {
            self.0.replace_chunks(t, c, v).await
        }
        async fn delete_course(&self, t: &str) -> Result<()> {
            self.0.delete_course(t).await
        }
        async fn nearest_courses(&self, v: &[f32], l: usize) -> Result<Vec<CourseMatch>> {
            self.0.nearest_courses(v, l).await
        }
        async fn search_chunks(&self, v: &[f32], f: &ChunkFilter, l: usize) -> Result<Vec<ChunkHit>> {
            self.0.search_chunks(v, f, l).await
        }
        async fn get_course(&self, t: &str) -> Result<Option<Course>> {
            self.0.get_course(t).await
        }
        async fn course_titles(&self) -> Result<Vec<String>> {
            self.0.course_titles().await
        }
    }

    #[tokio::test]
    async fn test_failed_catalog_write_rolls_back_chunks() {
        let store = Arc::new(CatalogWriteFails(InMemoryStore::new()));
        let idx = CourseIndex::new(
            store.clone(),
            Arc::new(HashEmbedder::default()),
            IndexConfig::default(),
        );
        let err = idx.ingest_document("intro.txt", INTRO).await.unwrap_err();
        assert_eq!(err.code(), "index_unavailable");
        assert_eq!(store.0.chunk_count(), 0);
    }

    #[tokio::test]
    async fn test_add_course_without_chunks() {
        let idx = index();
        let course = Course {
            title: "Empty".into(),
            instructor: None,
            link: None,
            lessons: vec![Lesson {
                number: 1,
                title: "Nothing yet".into(),
                link: None,
            }],
        };
        idx.add_course(&course, &[]).await.unwrap();
        assert_eq!(idx.list_courses().await.unwrap().course_titles, vec!["Empty"]);
        assert!(idx.search("anything", None, None, 5).await.unwrap().is_empty());
    }
}
