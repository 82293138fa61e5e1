//! Directory ingestion.
//!
//! Walks the documents root, keeps files matching the include globs and
//! not matching the exclude globs, and feeds each one through
//! [`CourseIndex::ingest_document`]. A document that fails to read or parse
//! is recorded in the report and skipped; the rest of the batch continues.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{info, warn};
use walkdir::WalkDir;

use course_rag_core::index::{CourseIndex, IngestedCourse};

use crate::config::DocumentsConfig;

/// One document that could not be ingested.
#[derive(Debug, Clone)]
pub struct IngestFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of one ingestion pass.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub courses: Vec<IngestedCourse>,
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    pub fn chunk_count(&self) -> usize {
        self.courses.iter().map(|c| c.chunk_count).sum()
    }
}

/// List the course documents under `root`, sorted by relative path.
pub fn scan_documents(root: &Path, docs: &DocumentsConfig) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        bail!("Documents root does not exist: {}", root.display());
    }

    let include_set = build_globset(&docs.include_globs)?;

    let mut excludes = vec!["**/.git/**".to_string()];
    excludes.extend(docs.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        paths.push(path.to_path_buf());
    }

    Ok(paths)
}

/// Ingest every matching document under `root`.
///
/// Fails only if the directory cannot be scanned. Per-document errors end
/// up in [`IngestReport::failures`].
pub async fn ingest_directory(
    index: &CourseIndex,
    root: &Path,
    docs: &DocumentsConfig,
) -> Result<IngestReport> {
    let paths = scan_documents(root, docs)?;
    info!(root = %root.display(), files = paths.len(), "ingesting course documents");

    let mut report = IngestReport::default();
    for path in paths {
        match ingest_file(index, &path).await {
            Ok(ingested) => {
                info!(
                    course = %ingested.course.title,
                    lessons = ingested.course.lessons.len(),
                    chunks = ingested.chunk_count,
                    "indexed course"
                );
                report.courses.push(ingested);
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping document");
                report.failures.push(IngestFailure { path, error });
            }
        }
    }

    Ok(report)
}

/// Read and ingest a single document.
pub async fn ingest_file(
    index: &CourseIndex,
    path: &Path,
) -> std::result::Result<IngestedCourse, String> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let source_name = path.display().to_string();
    index
        .ingest_document(&source_name, &text)
        .await
        .map_err(|e| e.to_string())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_rag_core::embedding::HashEmbedder;
    use course_rag_core::index::IndexConfig;
    use course_rag_core::store::memory::InMemoryStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn docs_config(include: &[&str], exclude: &[&str]) -> DocumentsConfig {
        DocumentsConfig {
            root: PathBuf::from("unused"),
            include_globs: include.iter().map(|s| s.to_string()).collect(),
            exclude_globs: exclude.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn write(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, body).unwrap();
    }

    fn index() -> CourseIndex {
        CourseIndex::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(HashEmbedder::default()),
            IndexConfig::default(),
        )
    }

    #[test]
    fn test_scan_applies_globs() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.txt", "x");
        write(tmp.path(), "b.md", "x");
        write(tmp.path(), "drafts/c.txt", "x");
        write(tmp.path(), "nested/d.txt", "x");

        let paths = scan_documents(tmp.path(), &docs_config(&["**/*.txt"], &["drafts/**"])).unwrap();
        let names: Vec<String> = paths
            .iter()
            .map(|p| p.strip_prefix(tmp.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "nested/d.txt"]);
    }

    #[test]
    fn test_scan_missing_root_fails() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(scan_documents(&missing, &docs_config(&["**/*.txt"], &[])).is_err());
    }

    #[tokio::test]
    async fn test_bad_document_does_not_stop_batch() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "good.txt",
            "Course Title: Good Course\nLesson 1: Only\nSome text here.\n",
        );
        write(tmp.path(), "bad.txt", "Lesson 1: No header\nBody.\n");

        let index = index();
        let report = ingest_directory(&index, tmp.path(), &docs_config(&["**/*.txt"], &[]))
            .await
            .unwrap();

        assert_eq!(report.courses.len(), 1);
        assert_eq!(report.courses[0].course.title, "Good Course");
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("bad.txt"));
        assert_eq!(report.chunk_count(), 1);
        assert_eq!(index.list_courses().await.unwrap().total_courses, 1);
    }
}
