//! # course-rag core
//!
//! Runtime-agnostic logic for the course question-answering pipeline:
//! data models, the course document parser, the sentence-aware chunker,
//! the embedder trait, the store abstraction, and the [`CourseIndex`]
//! that ties them together.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! Network-backed embedders, the SQLite store and the language-model loop
//! live in the `course-rag` app crate.
//!
//! [`CourseIndex`]: index::CourseIndex

pub mod chunk;
pub mod document;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod store;

pub use error::{RagError, Result};
