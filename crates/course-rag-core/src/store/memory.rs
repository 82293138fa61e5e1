//! In-memory [`Store`] implementation.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Vector search is brute-force cosine distance over all stored vectors.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::error::{RagError, Result};
use crate::models::{Chunk, ChunkFilter, ChunkHit, Course};

use super::{sort_hits, CourseMatch, Store};

struct StoredCourse {
    course: Course,
    vector: Vec<f32>,
}

struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-memory store for tests and the `memory` backend.
pub struct InMemoryStore {
    courses: RwLock<HashMap<String, StoredCourse>>,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            courses: RwLock::new(HashMap::new()),
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored chunks across all courses.
    pub fn chunk_count(&self) -> usize {
        self.chunks.read().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> RagError {
    RagError::index("in-memory store lock poisoned")
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_course(&self, course: &Course, vector: &[f32]) -> Result<()> {
        let mut courses = self.courses.write().map_err(poisoned)?;
        courses.insert(
            course.title.clone(),
            StoredCourse {
                course: course.clone(),
                vector: vector.to_vec(),
            },
        );
        Ok(())
    }

    async fn replace_chunks(
        &self,
        course_title: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(RagError::index(format!(
                "{} chunks but {} vectors for course '{}'",
                chunks.len(),
                vectors.len(),
                course_title
            )));
        }

        let mut stored = self.chunks.write().map_err(poisoned)?;
        stored.retain(|sc| sc.chunk.course_title != course_title);
        for (c, v) in chunks.iter().zip(vectors.iter()) {
            stored.push(StoredChunk {
                chunk: c.clone(),
                vector: v.clone(),
            });
        }
        Ok(())
    }

    async fn delete_course(&self, course_title: &str) -> Result<()> {
        self.chunks
            .write()
            .map_err(poisoned)?
            .retain(|sc| sc.chunk.course_title != course_title);
        self.courses.write().map_err(poisoned)?.remove(course_title);
        Ok(())
    }

    async fn nearest_courses(&self, query_vec: &[f32], limit: usize) -> Result<Vec<CourseMatch>> {
        let courses = self.courses.read().map_err(poisoned)?;
        let mut matches: Vec<CourseMatch> = courses
            .values()
            .map(|sc| CourseMatch {
                title: sc.course.title.clone(),
                distance: cosine_distance(query_vec, &sc.vector),
            })
            .collect();
        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.title.cmp(&b.title))
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn search_chunks(
        &self,
        query_vec: &[f32],
        filter: &ChunkFilter,
        limit: usize,
    ) -> Result<Vec<ChunkHit>> {
        let stored = self.chunks.read().map_err(poisoned)?;
        let mut hits: Vec<ChunkHit> = stored
            .iter()
            .filter(|sc| filter.matches(&sc.chunk))
            .map(|sc| ChunkHit {
                chunk: sc.chunk.clone(),
                distance: cosine_distance(query_vec, &sc.vector),
            })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn get_course(&self, title: &str) -> Result<Option<Course>> {
        let courses = self.courses.read().map_err(poisoned)?;
        Ok(courses.get(title).map(|sc| sc.course.clone()))
    }

    async fn course_titles(&self) -> Result<Vec<String>> {
        let courses = self.courses.read().map_err(poisoned)?;
        let mut titles: Vec<String> = courses.keys().cloned().collect();
        titles.sort();
        Ok(titles)
    }
}
