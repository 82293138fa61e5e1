//! # Course RAG
//!
//! Question answering over a folder of course documents. Documents are
//! parsed into courses and lessons, chunked, embedded and indexed; a
//! language model answers questions and decides for itself whether to
//! search the index or fetch a course outline first.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────────┐   ┌─────────────┐
//! │ docs/*.txt │──▶│ parse + chunk │──▶│ CourseIndex │
//! └────────────┘   │   + embed     │   │ SQLite/mem  │
//!                  └───────────────┘   └──────▲──────┘
//!                                             │ tools
//!   ┌──────────┐   ┌───────────┐   ┌──────────┴────┐
//!   │ CLI/HTTP │──▶│ RagSystem │──▶│   ToolLoop    │◀──▶ LLM
//!   └──────────┘   │ + sessions│   └───────────────┘
//!                  └───────────┘
//! ```
//!
//! The runtime-independent pieces (models, parser, chunker, index, store
//! trait) live in the `course-rag-core` crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Language-model clients with tool calling |
//! | [`tools`] | Search and outline tools offered to the model |
//! | [`orchestrator`] | Bounded tool-calling loop |
//! | [`session`] | Per-session conversation history |
//! | [`rag`] | Query entry point |
//! | [`ingest`] | Directory ingestion |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite-backed store |

pub mod config;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod orchestrator;
pub mod rag;
pub mod server;
pub mod session;
pub mod sqlite_store;
pub mod tools;
