//! Outline parser: turns raw model text into a candidate slide tree.
//!
//! Two encodings are understood. The prompt asks for JSON:
//!
//! ```text
//! [{"title": "...", "summary": "...",
//!   "points": [{"main_point": "...",
//!               "supporting_facts": [{"fact": "...", "explanation": "..."}]}]}]
//! ```
//!
//! Models do not always comply, so headed text blocks are accepted too:
//!
//! ```text
//! Slide 1: Why oceans matter
//! Summary: Oceans cover most of the planet.
//! - They regulate climate
//!   - Absorb a quarter of CO2 emissions
//! ```

use crate::config::ParserOptions;
use crate::error::ParseError;
use crate::types::{ContentNode, NodeKind, ParsedCandidate, SourceFormat};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

/// Slide headings like "Slide 3: Title", "## Page 3 - Title" or "**Slide 3.** Title".
static HEADING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:#{1,6}\s*)?(?:\*\*)?(?:slide|page)\s*(\d+)\s*(?:\*\*)?\s*[:：.)\-–—]?\s*(.*)$")
        .unwrap()
});

/// Slide headings like "第3页：Title".
static CJK_HEADING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:#{1,6}\s*)?第\s*(\d+)\s*页\s*[:：.\-]?\s*(.*)$").unwrap());

/// Plain Markdown headings like "# Threats" or "## Why it matters ##".
static MARKDOWN_HEADING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#{1,6}\s+(.+?)\s*#*\s*$").unwrap());

/// Bullet lines: leading indentation, a marker, then the text.
static BULLET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)(?:[-*•+]|\d+[.)])\s+(.*)$").unwrap());

/// Summary lines like "Summary: ..." or "总结：...".
static SUMMARY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:summary|总结|概述)\s*[:：]\s*(.*)$").unwrap());

/// Width of a tab when measuring bullet indentation.
const TAB_WIDTH: usize = 4;

/// Parser for model responses.
#[derive(Debug, Clone, Default)]
pub struct OutlineParser {
    options: ParserOptions,
}

impl OutlineParser {
    /// Create a parser with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parser with the given options.
    pub fn with_options(options: ParserOptions) -> Self {
        Self { options }
    }

    /// Parse a raw model response into a candidate outline.
    pub fn parse(&self, raw: &str) -> Result<ParsedCandidate, ParseError> {
        let body = strip_code_fence(raw.trim());
        if body.is_empty() {
            return Err(ParseError::Empty);
        }

        let candidate = if body.starts_with('[') || body.starts_with('{') {
            log::debug!("Parsing model response as JSON");
            ParsedCandidate {
                slides: parse_json(body)?,
                format: SourceFormat::Json,
            }
        } else if let Some(slides) = embedded_json(body) {
            log::debug!("Parsing JSON embedded in the model response");
            ParsedCandidate {
                slides,
                format: SourceFormat::Json,
            }
        } else {
            log::debug!("Parsing model response as headed text");
            ParsedCandidate {
                slides: parse_text(body)?,
                format: SourceFormat::Text,
            }
        };

        if !self.options.allow_title_only_slides {
            if let Some(idx) = candidate.slides.iter().position(|s| s.children.is_empty()) {
                return Err(ParseError::Unparseable(format!(
                    "no bullet lines found in segment {}",
                    idx + 1
                )));
            }
        }

        Ok(candidate)
    }
}

/// Return the contents of the first fenced code block, or the input unchanged.
fn strip_code_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after_open = &text[open + 3..];
    // Skip the info string ("json") up to the end of the fence line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(after_open.len());
    let body = &after_open[body_start..];
    let body = match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    };
    body.trim()
}

/// Slides from a JSON array or object wrapped in prose, if one parses.
fn embedded_json(body: &str) -> Option<Vec<ContentNode>> {
    [('[', ']'), ('{', '}')].into_iter().find_map(|(open, close)| {
        let start = body.find(open)?;
        let end = body.rfind(close)?;
        if end <= start {
            return None;
        }
        parse_json(&body[start..=end])
            .ok()
            .filter(|slides| !slides.is_empty())
    })
}

#[derive(Debug, Deserialize)]
struct JsonSlide {
    #[serde(default, alias = "heading")]
    title: Option<String>,
    #[serde(default, alias = "introduction")]
    summary: Option<String>,
    #[serde(default, alias = "bullets")]
    points: Vec<JsonPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonPoint {
    Text(String),
    Detailed {
        #[serde(alias = "point", alias = "text")]
        main_point: String,
        #[serde(default, alias = "facts")]
        supporting_facts: Vec<JsonFact>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonFact {
    Text(String),
    Detailed {
        #[serde(alias = "text")]
        fact: String,
        #[serde(default)]
        explanation: Option<String>,
        #[serde(default, alias = "details")]
        supporting_facts: Vec<JsonFact>,
    },
}

fn parse_json(body: &str) -> Result<Vec<ContentNode>, ParseError> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        ParseError::Unparseable(format!(
            "expected a JSON array of slide objects, found invalid JSON at line {} column {}: {}",
            e.line(),
            e.column(),
            e
        ))
    })?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("slides") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ParseError::Unparseable(
                    "expected a JSON array of slide objects, found an object without a \"slides\" array"
                        .to_string(),
                ))
            }
        },
        other => {
            return Err(ParseError::Unparseable(format!(
                "expected a JSON array of slide objects, found {}",
                json_type_name(&other)
            )))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            let segment = idx + 1;
            if !item.is_object() {
                return Err(ParseError::Unparseable(format!(
                    "expected a slide object in segment {}, found {}",
                    segment,
                    json_type_name(&item)
                )));
            }
            let slide: JsonSlide = serde_json::from_value(item).map_err(|e| {
                ParseError::Unparseable(format!("malformed slide object in segment {}: {}", segment, e))
            })?;
            let title = slide.title.ok_or_else(|| {
                ParseError::Unparseable(format!("no title found in segment {}", segment))
            })?;

            let mut node = ContentNode::slide(title.trim());
            node.summary = slide
                .summary
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            node.children = slide.points.into_iter().map(point_node).collect();
            Ok(node)
        })
        .collect()
}

fn point_node(point: JsonPoint) -> ContentNode {
    match point {
        JsonPoint::Text(text) => ContentNode::bullet(text.trim()),
        JsonPoint::Detailed {
            main_point,
            supporting_facts,
        } => {
            let mut node = ContentNode::bullet(main_point.trim());
            node.children = supporting_facts.into_iter().map(|f| fact_node(f, 2)).collect();
            node
        }
    }
}

fn fact_node(fact: JsonFact, depth: usize) -> ContentNode {
    let kind = NodeKind::for_depth(depth);
    match fact {
        JsonFact::Text(text) => ContentNode {
            kind,
            text: text.trim().to_string(),
            summary: None,
            children: Vec::new(),
        },
        JsonFact::Detailed {
            fact,
            explanation,
            supporting_facts,
        } => {
            let fact = fact.trim();
            let text = match explanation.as_deref().map(str::trim) {
                Some(explanation) if !explanation.is_empty() => format!("{}: {}", fact, explanation),
                _ => fact.to_string(),
            };
            ContentNode {
                kind,
                text,
                summary: None,
                children: supporting_facts
                    .into_iter()
                    .map(|f| fact_node(f, depth + 1))
                    .collect(),
            }
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Slide heading text, if the line is a heading.
fn match_heading(line: &str) -> Option<String> {
    let title = match HEADING_REGEX
        .captures(line)
        .or_else(|| CJK_HEADING_REGEX.captures(line))
    {
        Some(caps) => caps.get(2).map(|m| m.as_str()).unwrap_or(""),
        None => MARKDOWN_HEADING_REGEX.captures(line)?.get(1)?.as_str(),
    };
    Some(title.trim().trim_matches('*').trim().to_string())
}

fn indent_width(indent: &str) -> usize {
    indent
        .chars()
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}

/// A slide being assembled from text lines.
struct TextSegment {
    title: String,
    summary: Option<String>,
    /// (level, text) in reading order; level 1 is a top-level bullet.
    bullets: Vec<(usize, String)>,
    indents: Vec<usize>,
}

impl TextSegment {
    fn new(title: String) -> Self {
        Self {
            title,
            summary: None,
            bullets: Vec::new(),
            indents: Vec::new(),
        }
    }

    fn push_bullet(&mut self, indent: usize, text: &str) {
        while self.indents.last().is_some_and(|&top| top > indent) {
            self.indents.pop();
        }
        if self.indents.last().map_or(true, |&top| top < indent) {
            self.indents.push(indent);
        }
        self.bullets.push((self.indents.len(), text.trim().to_string()));
    }

    fn push_plain(&mut self, text: &str) {
        let text = text.trim();
        if let Some((_, last)) = self.bullets.last_mut() {
            // Wrapped continuation of the previous bullet.
            last.push(' ');
            last.push_str(text);
        } else {
            match &mut self.summary {
                Some(summary) => {
                    summary.push(' ');
                    summary.push_str(text);
                }
                None => self.summary = Some(text.to_string()),
            }
        }
    }

    fn into_node(self) -> ContentNode {
        let mut node = ContentNode::slide(self.title);
        node.summary = self.summary.filter(|s| !s.is_empty());
        let mut idx = 0;
        node.children = build_level(&self.bullets, &mut idx, 1);
        node
    }
}

/// Build sibling nodes at `level`, consuming their descendants as children.
fn build_level(items: &[(usize, String)], idx: &mut usize, level: usize) -> Vec<ContentNode> {
    let mut nodes = Vec::new();
    while let Some((item_level, text)) = items.get(*idx) {
        if *item_level != level {
            break;
        }
        *idx += 1;
        let mut node = ContentNode {
            kind: NodeKind::for_depth(level),
            text: text.clone(),
            summary: None,
            children: Vec::new(),
        };
        if items.get(*idx).is_some_and(|(next, _)| *next > level) {
            node.children = build_level(items, idx, level + 1);
        }
        nodes.push(node);
    }
    nodes
}

fn parse_text(body: &str) -> Result<Vec<ContentNode>, ParseError> {
    let mut segments: Vec<TextSegment> = Vec::new();

    for (line_idx, line) in body.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        if let Some(title) = match_heading(line) {
            segments.push(TextSegment::new(title));
            continue;
        }

        let Some(segment) = segments.last_mut() else {
            if BULLET_REGEX.is_match(line) {
                return Err(ParseError::Unparseable(format!(
                    "found bullet on line {} before any slide heading; expected \"Slide 1: Title\"",
                    line_idx + 1
                )));
            }
            // Preamble chatter ("Here is your outline:") is ignored.
            continue;
        };

        if let Some(caps) = SUMMARY_REGEX.captures(line) {
            segment.summary = Some(caps[1].trim().to_string());
        } else if let Some(caps) = BULLET_REGEX.captures(line) {
            segment.push_bullet(indent_width(&caps[1]), &caps[2]);
        } else {
            segment.push_plain(line);
        }
    }

    if segments.is_empty() {
        return Err(ParseError::Unparseable(
            "no slide heading found; expected a JSON array or lines like \"Slide 1: Title\""
                .to_string(),
        ));
    }

    Ok(segments.into_iter().map(TextSegment::into_node).collect())
}
