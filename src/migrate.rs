//! Schema creation. Every statement is idempotent, so this runs on every
//! start as well as from `crag init`.

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS courses (
            title TEXT PRIMARY KEY,
            instructor TEXT,
            link TEXT,
            lessons_json TEXT NOT NULL DEFAULT '[]',
            embedding BLOB NOT NULL,
            ingested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            course_title TEXT NOT NULL,
            lesson_number INTEGER,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            body_offset INTEGER NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            UNIQUE(course_title, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_course ON chunks(course_title, lesson_number)")
        .execute(pool)
        .await?;

    Ok(())
}
