//! Error taxonomy shared by every layer of the query pipeline.
//!
//! Each variant corresponds to one failure class with its own propagation
//! rule: parse errors are per-document and never abort a batch, index and
//! generation errors are surfaced to the caller of a query, and course
//! resolution failures are normally turned into tool output before they
//! reach anyone.

/// Errors produced by ingestion, retrieval, and generation.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// A course document could not be parsed.
    #[error("parse error in {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// The vector storage backend could not be reached or failed a query.
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// The embedding or language-model provider failed or timed out.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Fuzzy course-name resolution found nothing close enough.
    #[error("no course matching '{0}'")]
    CourseNotFound(String),
}

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    /// Create a parse error for the named document.
    pub fn parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create an index error from any displayable backend failure.
    pub fn index(err: impl std::fmt::Display) -> Self {
        Self::IndexUnavailable(err.to_string())
    }

    /// Create a generation error from any displayable provider failure.
    pub fn generation(err: impl std::fmt::Display) -> Self {
        Self::Generation(err.to_string())
    }

    /// Stable machine-readable code for transport layers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse_error",
            Self::IndexUnavailable(_) => "index_unavailable",
            Self::Generation(_) => "generation_failed",
            Self::CourseNotFound(_) => "course_not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_document() {
        let err = RagError::parse("intro.txt", "missing 'Course Title:' header");
        assert_eq!(
            err.to_string(),
            "parse error in intro.txt: missing 'Course Title:' header"
        );
        assert_eq!(err.code(), "parse_error");
    }

    #[test]
    fn test_codes_are_distinct() {
        let codes = [
            RagError::parse("a", "b").code(),
            RagError::index("down").code(),
            RagError::generation("timeout").code(),
            RagError::CourseNotFound("x".into()).code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
