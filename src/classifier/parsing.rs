//! Classifier Reply Parsing
//!
//! Turns the classifier's free-text batch reply into one [`Classification`]
//! per requested article. Blocks are located by their leading `N.` marker,
//! parsed independently, and validated against the request: the reply must
//! contain exactly one block per article, numbered 1..=k in order. Anything
//! else fails the whole batch.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::types::{Classification, Importance, Topic};

/// Reply does not line up with the request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlignmentError {
    #[error("expected {expected} classification blocks, found {found}")]
    CountMismatch { expected: usize, found: usize },
    #[error("block at position {position} is numbered {found}")]
    IndexMismatch { position: usize, found: usize },
    #[error("block {index} is malformed: {reason}")]
    MalformedBlock { index: usize, reason: String },
}

/// One parsed block, still carrying the index the classifier echoed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedClassification {
    pub index: usize,
    pub classification: Classification,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    topic: String,
    #[serde(default)]
    location: Option<String>,
    importance: String,
}

/// Start of a block: optional indent, the number, `.`/`)`/`:`, then `{`.
#[allow(clippy::expect_used)]
fn block_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(\d+)[ \t]*[.):][ \t]*\{").expect("block start pattern is valid")
    })
}

/// Parse and validate a reply for a batch of `expected` articles.
pub fn parse_aligned(reply: &str, expected: usize) -> Result<Vec<Classification>, AlignmentError> {
    let blocks = parse_blocks(reply)?;

    if blocks.len() != expected {
        return Err(AlignmentError::CountMismatch {
            expected,
            found: blocks.len(),
        });
    }

    blocks
        .into_iter()
        .enumerate()
        .map(|(position, block)| {
            if block.index != position + 1 {
                Err(AlignmentError::IndexMismatch {
                    position: position + 1,
                    found: block.index,
                })
            } else {
                Ok(block.classification)
            }
        })
        .collect()
}

/// Split a reply into numbered blocks and parse each one.
///
/// Text before the first block (preambles) is ignored. A block that fails to
/// parse is an error, never skipped: dropping it would shift every later
/// classification onto the wrong article.
pub fn parse_blocks(reply: &str) -> Result<Vec<IndexedClassification>, AlignmentError> {
    let text = normalize(reply);

    let starts: Vec<(usize, usize)> = block_start()
        .captures_iter(&text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let index = caps.get(1)?.as_str().parse().ok()?;
            // Position of the opening brace (last char of the match).
            Some((index, whole.end() - 1))
        })
        .collect();

    if starts.is_empty() {
        return parse_json_array(&text);
    }

    let mut blocks = Vec::with_capacity(starts.len());
    for (i, &(index, brace)) in starts.iter().enumerate() {
        let end = starts
            .get(i + 1)
            .map(|&(_, next_brace)| line_start(&text, next_brace))
            .unwrap_or(text.len());
        let body = text[brace..end].trim();
        let classification = parse_block(body).map_err(|reason| AlignmentError::MalformedBlock { index, reason })?;
        blocks.push(IndexedClassification { index, classification });
    }
    Ok(blocks)
}

/// Parse one JSON object, tolerating trailing text after the closing brace.
fn parse_block(body: &str) -> Result<Classification, String> {
    let mut stream = serde_json::Deserializer::from_str(body).into_iter::<RawBlock>();
    let raw = match stream.next() {
        Some(Ok(raw)) => raw,
        Some(Err(e)) => return Err(e.to_string()),
        None => return Err("empty block".to_string()),
    };
    into_classification(raw)
}

fn into_classification(raw: RawBlock) -> Result<Classification, String> {
    let importance: Importance = raw.importance.parse().map_err(|e: crate::types::UnknownImportance| e.to_string())?;
    Ok(Classification {
        topic: Topic::parse_lenient(&raw.topic),
        location: raw.location.map(|l| l.trim().to_string()).unwrap_or_default(),
        importance,
    })
}

/// Fallback for replies that are a bare JSON array instead of numbered lines.
/// Positions stand in for the missing indices.
fn parse_json_array(text: &str) -> Result<Vec<IndexedClassification>, AlignmentError> {
    let trimmed = text.trim();
    if !trimmed.starts_with('[') {
        return Ok(Vec::new());
    }
    let raws: Vec<serde_json::Value> = serde_json::from_str(trimmed).map_err(|e| AlignmentError::MalformedBlock {
        index: 0,
        reason: format!("reply is not a valid JSON array: {e}"),
    })?;

    raws.into_iter()
        .enumerate()
        .map(|(i, value)| {
            let index = i + 1;
            let raw: RawBlock = serde_json::from_value(value)
                .map_err(|e| AlignmentError::MalformedBlock { index, reason: e.to_string() })?;
            let classification =
                into_classification(raw).map_err(|reason| AlignmentError::MalformedBlock { index, reason })?;
            Ok(IndexedClassification { index, classification })
        })
        .collect()
}

/// Byte offset of the start of the line containing `pos`.
fn line_start(text: &str, pos: usize) -> usize {
    text[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

/// Strip reasoning blocks, code fences and escaped newlines.
fn normalize(reply: &str) -> String {
    let mut text = unescape_newlines(&reply.replace("\r\n", "\n"));

    // ASCII lowering keeps byte offsets valid for the original text.
    if let Some(end) = text.to_ascii_lowercase().find("</think>") {
        text = text[end + "</think>".len()..].to_string();
    }

    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Turn literal `\n` sequences into line breaks, except inside JSON strings
/// where serde_json owns the escape.
fn unescape_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') if !in_string => out.push('\n'),
                Some(next) => {
                    out.push(c);
                    out.push(next);
                }
                None => out.push(c),
            },
            '"' => {
                in_string = !in_string;
                out.push(c);
            }
            '\n' => {
                // JSON strings never span raw line breaks.
                in_string = false;
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
