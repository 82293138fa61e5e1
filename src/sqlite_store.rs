//! SQLite-backed [`Store`] implementation.
//!
//! Courses and chunks live in two tables (see [`crate::migrate`]).
//! Embeddings are stored as little-endian `f32` blobs and compared by
//! brute-force cosine distance, which is fine for a course catalog.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use course_rag_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use course_rag_core::models::{Chunk, ChunkFilter, ChunkHit, Course, Lesson};
use course_rag_core::store::{sort_hits, CourseMatch, Store};
use course_rag_core::{RagError, Result};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn db_err(e: sqlx::Error) -> RagError {
    RagError::index(format!("sqlite: {}", e))
}

fn row_to_course(row: &SqliteRow) -> Result<Course> {
    let lessons_json: String = row.get("lessons_json");
    let lessons: Vec<Lesson> = serde_json::from_str(&lessons_json)
        .map_err(|e| RagError::index(format!("corrupt lessons_json: {}", e)))?;
    Ok(Course {
        title: row.get("title"),
        instructor: row.get("instructor"),
        link: row.get("link"),
        lessons,
    })
}

fn row_to_chunk(row: &SqliteRow) -> Chunk {
    let lesson_number: Option<i64> = row.get("lesson_number");
    let body_offset: i64 = row.get("body_offset");
    Chunk {
        id: row.get("id"),
        course_title: row.get("course_title"),
        lesson_number: lesson_number.map(|n| n as u32),
        chunk_index: row.get("chunk_index"),
        text: row.get("text"),
        body_offset: body_offset as usize,
        hash: row.get("hash"),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_course(&self, course: &Course, vector: &[f32]) -> Result<()> {
        let lessons_json = serde_json::to_string(&course.lessons)
            .map_err(|e| RagError::index(format!("failed to encode lessons: {}", e)))?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO courses (title, instructor, link, lessons_json, embedding, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(title) DO UPDATE SET
                instructor = excluded.instructor,
                link = excluded.link,
                lessons_json = excluded.lessons_json,
                embedding = excluded.embedding,
                ingested_at = excluded.ingested_at
            "#,
        )
        .bind(&course.title)
        .bind(&course.instructor)
        .bind(&course.link)
        .bind(&lessons_json)
        .bind(vec_to_blob(vector))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

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

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("DELETE FROM chunks WHERE course_title = ?")
            .bind(course_title)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, course_title, lesson_number, chunk_index, text,
                                    body_offset, hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.course_title)
            .bind(chunk.lesson_number.map(i64::from))
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(chunk.body_offset as i64)
            .bind(&chunk.hash)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn delete_course(&self, course_title: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM chunks WHERE course_title = ?")
            .bind(course_title)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM courses WHERE title = ?")
            .bind(course_title)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn nearest_courses(&self, query_vec: &[f32], limit: usize) -> Result<Vec<CourseMatch>> {
        let rows = sqlx::query("SELECT title, embedding FROM courses")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut matches: Vec<CourseMatch> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                CourseMatch {
                    title: row.get("title"),
                    distance: cosine_distance(query_vec, &blob_to_vec(&blob)),
                }
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
        let rows = sqlx::query(
            r#"
            SELECT id, course_title, lesson_number, chunk_index, text, body_offset, hash, embedding
            FROM chunks
            WHERE (?1 IS NULL OR course_title = ?1)
              AND (?2 IS NULL OR lesson_number = ?2)
            "#,
        )
        .bind(&filter.course_title)
        .bind(filter.lesson_number.map(i64::from))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut hits: Vec<ChunkHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ChunkHit {
                    chunk: row_to_chunk(row),
                    distance: cosine_distance(query_vec, &blob_to_vec(&blob)),
                }
            })
            .collect();

        sort_hits(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn get_course(&self, title: &str) -> Result<Option<Course>> {
        let row = sqlx::query("SELECT title, instructor, link, lessons_json FROM courses WHERE title = ?")
            .bind(title)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(row_to_course).transpose()
    }

    async fn course_titles(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT title FROM courses ORDER BY title ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }
}
