//! Course document parser.
//!
//! Course files are plain text with a header block followed by lesson
//! sections:
//!
//! ```text
//! Course Title: Intro to X
//! Course Link: https://example.com/x
//! Course Instructor: Ada Lovelace
//!
//! Lesson 0: Welcome
//! Lesson Link: https://example.com/x/0
//! Body text until the next lesson marker...
//!
//! Lesson 1: Foundations
//! ...
//! ```
//!
//! Only `Course Title:` is mandatory. Header keys and lesson markers are
//! matched case-insensitively. Text between the header and the first
//! lesson marker is not part of any lesson and is dropped.

use crate::error::{RagError, Result};
use crate::models::{Course, Lesson};

/// A parsed document: course metadata plus raw body text per lesson.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub course: Course,
    /// `(lesson number, body)` in document order. Bodies may be empty.
    pub lesson_bodies: Vec<(u32, String)>,
}

/// Parse a course document.
///
/// `source_name` is only used to label errors (usually the file name).
///
/// # Errors
///
/// Returns [`RagError::Parse`] when the `Course Title:` header is missing
/// or empty, or when two lesson markers declare the same number.
pub fn parse_course_document(source_name: &str, text: &str) -> Result<ParsedDocument> {
    let mut title: Option<String> = None;
    let mut link = None;
    let mut instructor = None;

    let mut lessons: Vec<Lesson> = Vec::new();
    let mut bodies: Vec<(u32, String)> = Vec::new();
    let mut current: Option<(Lesson, Vec<&str>)> = None;
    let mut expect_lesson_link = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if let Some((number, lesson_title)) = parse_lesson_marker(trimmed) {
            if let Some((lesson, body)) = current.take() {
                finish_lesson(source_name, lesson, &body, &mut lessons, &mut bodies)?;
            }
            current = Some((
                Lesson {
                    number,
                    title: lesson_title,
                    link: None,
                },
                Vec::new(),
            ));
            expect_lesson_link = true;
            continue;
        }

        match current.as_mut() {
            None => {
                if let Some(value) = header_value(trimmed, "course title:") {
                    title = Some(value.to_string());
                } else if let Some(value) = header_value(trimmed, "course link:") {
                    link = non_empty(value);
                } else if let Some(value) = header_value(trimmed, "course instructor:") {
                    instructor = non_empty(value);
                }
            }
            Some((lesson, body)) => {
                if expect_lesson_link {
                    if trimmed.is_empty() {
                        continue;
                    }
                    expect_lesson_link = false;
                    if let Some(value) = header_value(trimmed, "lesson link:") {
                        lesson.link = non_empty(value);
                        continue;
                    }
                }
                body.push(line);
            }
        }
    }

    if let Some((lesson, body)) = current.take() {
        finish_lesson(source_name, lesson, &body, &mut lessons, &mut bodies)?;
    }

    let title = title
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RagError::parse(source_name, "missing 'Course Title:' header"))?;

    Ok(ParsedDocument {
        course: Course {
            title,
            instructor,
            link,
            lessons,
        },
        lesson_bodies: bodies,
    })
}

fn finish_lesson(
    source_name: &str,
    lesson: Lesson,
    body: &[&str],
    lessons: &mut Vec<Lesson>,
    bodies: &mut Vec<(u32, String)>,
) -> Result<()> {
    if lessons.iter().any(|l| l.number == lesson.number) {
        return Err(RagError::parse(
            source_name,
            format!("duplicate lesson number {}", lesson.number),
        ));
    }
    bodies.push((lesson.number, body.join("\n").trim().to_string()));
    lessons.push(lesson);
    Ok(())
}

/// Match `Lesson <n>: <title>` and return the number and title.
fn parse_lesson_marker(line: &str) -> Option<(u32, String)> {
    let rest = strip_prefix_ignore_case(line, "lesson")?;
    let rest = rest.trim_start();
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits_end == 0 {
        return None;
    }
    let number: u32 = rest[..digits_end].parse().ok()?;
    let after = rest[digits_end..].trim_start();
    let title = after.strip_prefix(':')?;
    Some((number, title.trim().to_string()))
}

fn header_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    strip_prefix_ignore_case(line, key).map(str::trim)
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        line.get(prefix.len()..)
    } else {
        None
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
