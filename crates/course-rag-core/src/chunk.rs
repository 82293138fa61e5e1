//! Sentence-aware text chunker with overlap.
//!
//! Lesson bodies are split into sentences, and sentences are packed greedily
//! into chunks of at most `chunk_size` characters. When a chunk closes, the
//! next one starts with the trailing sentences of the previous chunk whose
//! combined length is as large as possible without exceeding
//! `chunk_overlap`, so text near a boundary is retrievable from both sides.
//!
//! # Algorithm
//!
//! 1. Collapse whitespace and split the body into sentences on `.`, `!`, `?`
//!    followed by whitespace and an uppercase letter or digit. Periods that
//!    end an abbreviation (`Dr.`, `e.g.`, single-letter initials) are not
//!    boundaries; decimals never are because no whitespace follows the dot.
//! 2. Hard-split any sentence longer than `chunk_size - chunk_overlap - 1`
//!    at word boundaries, so a carried overlap plus the next sentence always
//!    fits in one chunk.
//! 3. Pack sentences into a buffer until the next one would overflow, then
//!    flush and seed the buffer with the overlap.
//! 4. If not even the last sentence fits in the overlap budget, the overlap
//!    is the longest word-aligned tail of that sentence that does.
//!
//! All lengths are counted in characters and apply to the chunk body. The
//! stored chunk text additionally carries a context line
//! (`"Course {title} Lesson {n} content: "`) that is not counted.
//!
//! # Example
//!
//! ```rust
//! use course_rag_core::chunk::{chunk_text, ChunkConfig};
//!
//! let cfg = ChunkConfig { chunk_size: 40, chunk_overlap: 12 };
//! let chunks = chunk_text("One sentence here. Another one there. A third one.", &cfg);
//! assert!(chunks.len() > 1);
//! assert!(chunks.iter().all(|c| c.chars().count() <= 40));
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::document::ParsedDocument;
use crate::models::Chunk;

/// Chunk sizing, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    /// Must be smaller than `chunk_size`.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
        }
    }
}

const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "inc", "ltd", "co", "corp",
    "fig", "figs", "no", "approx", "dept", "est", "cf", "al",
];

/// Chunk every lesson of a parsed document.
///
/// Lessons with an empty body produce no chunks. Chunk indices are
/// contiguous across the whole course, in document order.
pub fn chunk_course(doc: &ParsedDocument, config: &ChunkConfig) -> Vec<Chunk> {
    let title = &doc.course.title;
    let mut chunks = Vec::new();
    let mut index: i64 = 0;

    for (lesson_number, body) in &doc.lesson_bodies {
        let prefix = context_prefix(title, Some(*lesson_number));
        for piece in chunk_text(body, config) {
            chunks.push(make_chunk(title, Some(*lesson_number), index, &prefix, &piece));
            index += 1;
        }
    }

    chunks
}

/// The context line prepended to every stored chunk.
pub fn context_prefix(course_title: &str, lesson_number: Option<u32>) -> String {
    match lesson_number {
        Some(n) => format!("Course {} Lesson {} content: ", course_title, n),
        None => format!("Course {} content: ", course_title),
    }
}

/// Split text into overlapping chunk bodies.
///
/// Returns an empty vector for blank input.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<String> {
    let size = config.chunk_size.max(1);
    let overlap = config.chunk_overlap.min(size - 1);
    let unit_limit = if overlap > 0 {
        size.saturating_sub(overlap + 1).max(1)
    } else {
        size
    };

    let units: Vec<String> = split_sentences(text)
        .into_iter()
        .flat_map(|s| hard_split(&s, unit_limit))
        .collect();

    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for unit in units {
        let unit_len = char_len(&unit);
        if !current.is_empty() && joined_len(&current) + 1 + unit_len > size {
            chunks.push(current.join(" "));
            current = overlap_tail(&current, overlap);
            while !current.is_empty() && joined_len(&current) + 1 + unit_len > size {
                current.remove(0);
            }
        }
        current.push(unit);
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    chunks
}

/// Split text into sentences, collapsing runs of whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let chars: Vec<(usize, char)> = normalized.char_indices().collect();

    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let (_, c) = chars[i];
        if matches!(c, '.' | '!' | '?') {
            let mut j = i + 1;
            while j < chars.len() && matches!(chars[j].1, '"' | '\'' | ')' | ']' | '”' | '’') {
                j += 1;
            }
            let space_follows = j < chars.len() && chars[j].1 == ' ';
            let next_starts_sentence = chars
                .get(j + 1)
                .map(|(_, n)| n.is_uppercase() || n.is_ascii_digit() || matches!(n, '"' | '“' | '('))
                .unwrap_or(false);

            if space_follows && next_starts_sentence && !(c == '.' && ends_with_abbreviation(&normalized[start..chars[i].0])) {
                let end = chars[j].0;
                let sentence = normalized[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                start = end + 1;
                i = j + 1;
                continue;
            }
        }
        i += 1;
    }

    let tail = normalized[start.min(normalized.len())..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }

    sentences
}

/// Whether the word right before a period is an abbreviation or initial.
fn ends_with_abbreviation(before_period: &str) -> bool {
    let token = before_period
        .rsplit(' ')
        .next()
        .unwrap_or("")
        .trim_start_matches(['(', '"', '\'', '“']);
    if token.is_empty() {
        return false;
    }

    let lower = token.to_lowercase();
    if ABBREVIATIONS.contains(&lower.as_str()) {
        return true;
    }

    // Initials and dotted abbreviations: "J", "e.g", "U.S"
    token
        .split('.')
        .all(|part| part.chars().count() == 1 && part.chars().all(char::is_alphabetic))
}

/// Split an over-long sentence at word boundaries into pieces of at most
/// `limit` characters. Words longer than `limit` are cut mid-word.
fn hard_split(sentence: &str, limit: usize) -> Vec<String> {
    if char_len(sentence) <= limit {
        return vec![sentence.to_string()];
    }

    let mut pieces = Vec::new();
    let mut buf = String::new();

    for word in sentence.split(' ') {
        let word_len = char_len(word);
        let would_be = if buf.is_empty() {
            word_len
        } else {
            char_len(&buf) + 1 + word_len
        };
        if would_be <= limit {
            if !buf.is_empty() {
                buf.push(' ');
            }
            buf.push_str(word);
            continue;
        }

        if !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }
        if word_len <= limit {
            buf.push_str(word);
        } else {
            let chars: Vec<char> = word.chars().collect();
            for part in chars.chunks(limit) {
                let part: String = part.iter().collect();
                if char_len(&part) == limit {
                    pieces.push(part);
                } else {
                    buf = part;
                }
            }
        }
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
}

/// Trailing units of a closed chunk that fit in the overlap budget.
fn overlap_tail(units: &[String], overlap: usize) -> Vec<String> {
    if overlap == 0 {
        return Vec::new();
    }

    let mut taken: Vec<String> = Vec::new();
    let mut len = 0usize;
    for unit in units.iter().rev() {
        let add = if taken.is_empty() {
            char_len(unit)
        } else {
            char_len(unit) + 1
        };
        if len + add > overlap {
            break;
        }
        len += add;
        taken.push(unit.clone());
    }

    if taken.is_empty() {
        if let Some(last) = units.last() {
            let fragment = tail_fragment(last, overlap);
            if !fragment.is_empty() {
                taken.push(fragment);
            }
        }
    }

    taken.reverse();
    taken
}

/// Longest word-aligned suffix of `unit` within `max` characters, falling
/// back to the last `max` characters when the final word alone is too long.
fn tail_fragment(unit: &str, max: usize) -> String {
    let mut words: Vec<&str> = Vec::new();
    let mut len = 0usize;
    for word in unit.rsplit(' ') {
        let add = if words.is_empty() {
            char_len(word)
        } else {
            char_len(word) + 1
        };
        if len + add > max {
            break;
        }
        len += add;
        words.push(word);
    }

    if words.is_empty() {
        let total = char_len(unit);
        return unit.chars().skip(total.saturating_sub(max)).collect();
    }

    words.reverse();
    words.join(" ")
}

fn joined_len(units: &[String]) -> usize {
    units.iter().map(|u| char_len(u)).sum::<usize>() + units.len().saturating_sub(1)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(
    course_title: &str,
    lesson_number: Option<u32>,
    index: i64,
    prefix: &str,
    body: &str,
) -> Chunk {
    let text = format!("{}{}", prefix, body);

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let id = Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}\u{0}{}", course_title, index).as_bytes(),
    );

    Chunk {
        id: id.to_string(),
        course_title: course_title.to_string(),
        lesson_number,
        chunk_index: index,
        text,
        body_offset: prefix.len(),
        hash,
    }
}
