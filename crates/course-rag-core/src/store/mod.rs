//! Storage abstraction for the course index.
//!
//! The [`Store`] trait holds two logical collections: a course catalog
//! (one entry per [`Course`], with an embedding of its title for fuzzy
//! name resolution) and the chunk collection (one entry per [`Chunk`],
//! with its embedding and filterable metadata).
//!
//! Backends report connectivity and I/O failures as
//! [`RagError::IndexUnavailable`](crate::error::RagError::IndexUnavailable).
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Chunk, ChunkFilter, ChunkHit, Course};

/// A catalog entry returned from a nearest-course query.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseMatch {
    pub title: String,
    /// Cosine distance between the query and the course title embedding.
    pub distance: f32,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_course`](Store::upsert_course) | Insert or replace a catalog entry |
/// | [`replace_chunks`](Store::replace_chunks) | Replace all chunks of a course |
/// | [`delete_course`](Store::delete_course) | Remove a course and its chunks |
/// | [`nearest_courses`](Store::nearest_courses) | Nearest catalog entries to a vector |
/// | [`search_chunks`](Store::search_chunks) | Filtered nearest-chunk search |
/// | [`get_course`](Store::get_course) | Exact catalog lookup by title |
/// | [`course_titles`](Store::course_titles) | All catalog titles |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or replace the catalog entry for `course.title`.
    async fn upsert_course(&self, course: &Course, vector: &[f32]) -> Result<()>;

    /// Replace every chunk of a course. `vectors[i]` belongs to `chunks[i]`.
    async fn replace_chunks(
        &self,
        course_title: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()>;

    /// Remove a course's catalog entry and all of its chunks. Missing
    /// courses are not an error.
    async fn delete_course(&self, course_title: &str) -> Result<()>;

    /// Up to `limit` catalog entries ordered by ascending distance.
    async fn nearest_courses(&self, query_vec: &[f32], limit: usize) -> Result<Vec<CourseMatch>>;

    /// Up to `limit` chunks matching `filter`, ordered by ascending distance
    /// with ties broken by chunk index.
    async fn search_chunks(
        &self,
        query_vec: &[f32],
        filter: &ChunkFilter,
        limit: usize,
    ) -> Result<Vec<ChunkHit>>;

    async fn get_course(&self, title: &str) -> Result<Option<Course>>;

    /// All catalog titles, sorted.
    async fn course_titles(&self) -> Result<Vec<String>>;
}

/// Order hits best-first: ascending distance, then course title, then chunk index.
pub fn sort_hits(hits: &mut [ChunkHit]) {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.course_title.cmp(&b.chunk.course_title))
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
}
