//! Tools exposed to the language model.
//!
//! Two tools are offered:
//!
//! | Name | Arguments | Purpose |
//! |------|-----------|---------|
//! | `search_course_content` | `query`, `course_name?`, `lesson_number?` | Semantic search over lesson text |
//! | `get_course_outline` | `course_title` | Title, link, instructor and lesson list of one course |
//!
//! The model names a tool and sends loosely-typed JSON arguments.
//! [`ToolCall::parse`] turns that into a typed variant or a
//! [`ToolArgumentError`], which the orchestrator feeds back to the model
//! instead of failing the query.
//!
//! Each execution returns its own [`ToolOutput`]: the text the model reads
//! plus the [`SourceRef`]s to show the user. Nothing is kept between
//! calls, so concurrent queries cannot see each other's sources.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use course_rag_core::index::CourseIndex;
use course_rag_core::models::{ChunkHit, Course, SourceRef};
use course_rag_core::{RagError, Result};

use crate::llm::ToolDefinition;

pub const SEARCH_COURSE_CONTENT: &str = "search_course_content";
pub const GET_COURSE_OUTLINE: &str = "get_course_outline";

/// Invalid tool invocation by the model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolArgumentError {
    #[error("Tool '{0}' not found")]
    UnknownTool(String),

    #[error("Invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },
}

impl ToolArgumentError {
    fn invalid(tool: &str, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.to_string(),
            message: message.into(),
        }
    }
}

/// Arguments of `search_course_content`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchArgs {
    pub query: String,
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub lesson_number: Option<u32>,
}

/// Arguments of `get_course_outline`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutlineArgs {
    pub course_title: String,
}

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    SearchCourseContent(SearchArgs),
    GetCourseOutline(OutlineArgs),
}

impl ToolCall {
    /// Validate a model-supplied tool name and argument object.
    pub fn parse(name: &str, arguments: &Value) -> std::result::Result<Self, ToolArgumentError> {
        match name {
            SEARCH_COURSE_CONTENT => {
                let mut args: SearchArgs = decode(name, arguments)?;
                if args.query.trim().is_empty() {
                    return Err(ToolArgumentError::invalid(name, "query must not be empty"));
                }
                // An empty hint means "no filter", not "match the empty name".
                args.course_name = args.course_name.filter(|c| !c.trim().is_empty());
                Ok(Self::SearchCourseContent(args))
            }
            GET_COURSE_OUTLINE => {
                let args: OutlineArgs = decode(name, arguments)?;
                if args.course_title.trim().is_empty() {
                    return Err(ToolArgumentError::invalid(
                        name,
                        "course_title must not be empty",
                    ));
                }
                Ok(Self::GetCourseOutline(args))
            }
            other => Err(ToolArgumentError::UnknownTool(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SearchCourseContent(_) => SEARCH_COURSE_CONTENT,
            Self::GetCourseOutline(_) => GET_COURSE_OUTLINE,
        }
    }
}

fn decode<T: DeserializeOwned>(
    tool: &str,
    arguments: &Value,
) -> std::result::Result<T, ToolArgumentError> {
    if !arguments.is_object() {
        return Err(ToolArgumentError::invalid(
            tool,
            "arguments must be a JSON object",
        ));
    }
    serde_json::from_value(arguments.clone())
        .map_err(|e| ToolArgumentError::invalid(tool, e.to_string()))
}

/// Schemas for every tool, in the shape the model clients send.
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: SEARCH_COURSE_CONTENT.to_string(),
            description: "Search course materials with smart course name matching and lesson filtering"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to search for in the course content"
                    },
                    "course_name": {
                        "type": "string",
                        "description": "Course title (partial matches work, e.g. 'MCP', 'Introduction')"
                    },
                    "lesson_number": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Specific lesson number to search within (e.g. 1, 2, 3)"
                    }
                },
                "required": ["query"]
            }),
        },
        ToolDefinition {
            name: GET_COURSE_OUTLINE.to_string(),
            description: "Get complete course outline including title, course link, and all lessons"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "course_title": {
                        "type": "string",
                        "description": "Course title to get outline for (partial matches work)"
                    }
                },
                "required": ["course_title"]
            }),
        },
    ]
}

/// Result of one tool execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    /// Text returned to the model.
    pub text: String,
    /// Attribution for the user. Empty when nothing was found.
    pub sources: Vec<SourceRef>,
}

/// Executes [`ToolCall`]s against a [`CourseIndex`].
#[derive(Clone)]
pub struct CourseTools {
    index: CourseIndex,
    max_results: usize,
}

impl CourseTools {
    pub fn new(index: CourseIndex, max_results: usize) -> Self {
        Self { index, max_results }
    }

    /// Run a tool.
    ///
    /// "Nothing found" outcomes (unknown course, empty result) are tool
    /// output for the model. Only index and embedding failures are errors.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolOutput> {
        match call {
            ToolCall::SearchCourseContent(args) => self.search(args).await,
            ToolCall::GetCourseOutline(args) => self.outline(&args.course_title).await,
        }
    }

    async fn search(&self, args: &SearchArgs) -> Result<ToolOutput> {
        let hits = match self
            .index
            .search(
                &args.query,
                args.course_name.as_deref(),
                args.lesson_number,
                self.max_results,
            )
            .await
        {
            Ok(hits) => hits,
            Err(RagError::CourseNotFound(name)) => {
                return Ok(ToolOutput {
                    text: format!("No course found matching '{}'", name),
                    sources: Vec::new(),
                })
            }
            Err(e) => return Err(e),
        };

        if hits.is_empty() {
            let mut filter_info = String::new();
            if let Some(course) = &args.course_name {
                filter_info.push_str(&format!(" in course '{}'", course));
            }
            if let Some(lesson) = args.lesson_number {
                filter_info.push_str(&format!(" in lesson {}", lesson));
            }
            return Ok(ToolOutput {
                text: format!("No relevant content found{}.", filter_info),
                sources: Vec::new(),
            });
        }

        self.format_hits(&hits).await
    }

    async fn format_hits(&self, hits: &[ChunkHit]) -> Result<ToolOutput> {
        let mut blocks = Vec::with_capacity(hits.len());
        let mut sources: Vec<SourceRef> = Vec::new();

        for hit in hits {
            let chunk = &hit.chunk;
            let header = match chunk.lesson_number {
                Some(n) => format!("[{} - Lesson {}]", chunk.course_title, n),
                None => format!("[{}]", chunk.course_title),
            };
            blocks.push(format!("{}\n{}", header, chunk.body()));

            let source = match chunk.lesson_number {
                Some(n) => SourceRef {
                    title: chunk.course_title.clone(),
                    lesson: Some(format!("Lesson {}", n)),
                    url: self.index.lesson_link(&chunk.course_title, n).await?,
                },
                None => SourceRef {
                    title: chunk.course_title.clone(),
                    lesson: None,
                    url: None,
                },
            };
            if !sources.contains(&source) {
                sources.push(source);
            }
        }

        Ok(ToolOutput {
            text: blocks.join("\n\n"),
            sources,
        })
    }

    async fn outline(&self, course_title: &str) -> Result<ToolOutput> {
        let Some(title) = self.index.resolve_course_name(course_title).await? else {
            let catalog = self.index.list_courses().await?;
            return Ok(ToolOutput {
                text: format!(
                    "No course found matching '{}'. Available courses: {}",
                    course_title,
                    catalog.course_titles.join(", ")
                ),
                sources: Vec::new(),
            });
        };

        let Some(course) = self.index.get_course(&title).await? else {
            return Ok(ToolOutput {
                text: format!("Course metadata not found for '{}'", title),
                sources: Vec::new(),
            });
        };

        Ok(ToolOutput {
            text: format_outline(&course),
            sources: vec![SourceRef {
                title: course.title.clone(),
                lesson: Some("Course Outline".to_string()),
                url: course.link.clone(),
            }],
        })
    }
}

/// Human-readable outline of a course.
pub fn format_outline(course: &Course) -> String {
    let mut parts = vec![format!("**{}**", course.title)];

    if let Some(instructor) = &course.instructor {
        parts.push(format!("Instructor: {}", instructor));
    }
    if let Some(link) = &course.link {
        parts.push(format!("Course Link: {}", link));
    }

    if course.lessons.is_empty() {
        parts.push("\nNo lessons found for this course.".to_string());
    } else {
        parts.push(format!("\nLessons ({} total):", course.lessons.len()));
        for lesson in &course.lessons {
            parts.push(format!("  {}. {}", lesson.number, lesson.title));
        }
    }

    parts.join("\n")
}
