//! Core data models for the course pipeline.
//!
//! A [`Course`] owns its ordered [`Lesson`]s and is identified by its title.
//! A [`Chunk`] is the unit stored in the vector index: a bounded span of one
//! lesson's text, prefixed with a context line so it reads on its own when
//! retrieved. [`SourceRef`]s are the human-facing attributions a search
//! produces for display next to an answer.

use serde::{Deserialize, Serialize};

/// One lesson within a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    /// Lesson number as declared by the `Lesson N:` marker.
    pub number: u32,
    pub title: String,
    pub link: Option<String>,
}

/// A course parsed from one source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    /// Unique identifier of the course.
    pub title: String,
    pub instructor: Option<String>,
    pub link: Option<String>,
    /// Lessons in document order.
    pub lessons: Vec<Lesson>,
}

impl Course {
    /// Look up a lesson by its declared number.
    pub fn lesson(&self, number: u32) -> Option<&Lesson> {
        self.lessons.iter().find(|l| l.number == number)
    }
}

/// A context-prefixed span of course text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    /// Title of the owning course.
    pub course_title: String,
    /// Owning lesson, `None` for course-level chunks.
    pub lesson_number: Option<u32>,
    /// Position of this chunk within its course, contiguous from 0.
    pub chunk_index: i64,
    /// Context line followed by the body span.
    pub text: String,
    /// Byte offset in `text` where the body span starts.
    pub body_offset: usize,
    /// SHA-256 of `text`.
    pub hash: String,
}

impl Chunk {
    /// The body span, without the generated context line.
    pub fn body(&self) -> &str {
        self.text.get(self.body_offset..).unwrap_or("")
    }
}

/// A chunk returned from a nearest-neighbour query.
#[derive(Debug, Clone)]
pub struct ChunkHit {
    pub chunk: Chunk,
    /// Cosine distance to the query (`0.0` = identical direction).
    pub distance: f32,
}

/// Metadata filter applied to chunk searches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkFilter {
    /// Exact course title.
    pub course_title: Option<String>,
    pub lesson_number: Option<u32>,
}

impl ChunkFilter {
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if let Some(title) = &self.course_title {
            if &chunk.course_title != title {
                return false;
            }
        }
        if let Some(n) = self.lesson_number {
            if chunk.lesson_number != Some(n) {
                return false;
            }
        }
        true
    }
}

/// Attribution for a piece of retrieved content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Course title.
    pub title: String,
    /// Lesson label such as `"Lesson 2"` or `"Course Outline"`.
    pub lesson: Option<String>,
    pub url: Option<String>,
}

impl SourceRef {
    /// Display label, e.g. `"Intro to X - Lesson 1"`.
    pub fn label(&self) -> String {
        match &self.lesson {
            Some(lesson) => format!("{} - {}", self.title, lesson),
            None => self.title.clone(),
        }
    }
}

/// Catalog summary returned by `list_courses`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseCatalog {
    pub total_courses: usize,
    /// Sorted course titles.
    pub course_titles: Vec<String>,
}
