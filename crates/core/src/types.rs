//! Domain types for requests and presentation content.

use crate::error::RequestError;
use serde::{Deserialize, Serialize};

/// Inclusive bounds on the number of slides a request may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlideCountBounds {
    /// Fewest slides a request may ask for.
    pub min: usize,
    /// Most slides a request may ask for.
    pub max: usize,
}

impl Default for SlideCountBounds {
    fn default() -> Self {
        Self { min: 1, max: 50 }
    }
}

impl SlideCountBounds {
    /// Check whether a raw slide count falls within the bounds.
    ///
    /// A deck always has at least one slide, whatever `min` says.
    pub fn contains(&self, count: i64) -> bool {
        count >= self.min.max(1) as i64 && count <= self.max as i64
    }
}

/// A single user request: what the deck is about and how many slides it has.
///
/// Immutable once built. The constructor is the only way in, so a value of
/// this type always has a non-empty topic and an in-bounds slide count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    topic: String,
    slide_count: usize,
}

impl GenerationRequest {
    /// Build a request, rejecting an empty topic or an out-of-bounds count.
    pub fn new(
        topic: impl Into<String>,
        slide_count: i64,
        bounds: &SlideCountBounds,
    ) -> Result<Self, RequestError> {
        let topic = topic.into().trim().to_string();
        if topic.is_empty() {
            return Err(RequestError::EmptyTopic);
        }
        if !bounds.contains(slide_count) {
            return Err(RequestError::InvalidSlideCount {
                requested: slide_count,
                min: bounds.min,
                max: bounds.max,
            });
        }

        Ok(Self {
            topic,
            slide_count: slide_count as usize,
        })
    }

    /// The presentation topic, trimmed.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The exact number of slides the outline must contain.
    pub fn slide_count(&self) -> usize {
        self.slide_count
    }

    /// Re-check the slide count against a (possibly narrower) set of bounds.
    pub fn check_bounds(&self, bounds: &SlideCountBounds) -> Result<(), RequestError> {
        if bounds.contains(self.slide_count as i64) {
            Ok(())
        } else {
            Err(RequestError::InvalidSlideCount {
                requested: self.slide_count as i64,
                min: bounds.min,
                max: bounds.max,
            })
        }
    }
}

/// The role a node plays in the slide hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Slide heading; the root of each slide.
    Title,
    /// Top-level point on a slide.
    Bullet,
    /// Supporting detail under a bullet.
    SubBullet,
}

impl NodeKind {
    /// The kind a node should have at the given depth (0 = slide root).
    pub fn for_depth(depth: usize) -> Self {
        match depth {
            0 => NodeKind::Title,
            1 => NodeKind::Bullet,
            _ => NodeKind::SubBullet,
        }
    }
}

/// One slide, bullet or sub-bullet together with its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentNode {
    pub kind: NodeKind,
    pub text: String,

    /// Lead-in sentence shown above the bullets. Only slide roots carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ContentNode>,
}

impl ContentNode {
    /// Create a slide root with the given title.
    pub fn slide(title: impl Into<String>) -> Self {
        Self::new(NodeKind::Title, title)
    }

    /// Create a top-level bullet.
    pub fn bullet(text: impl Into<String>) -> Self {
        Self::new(NodeKind::Bullet, text)
    }

    /// Create a sub-bullet.
    pub fn sub_bullet(text: impl Into<String>) -> Self {
        Self::new(NodeKind::SubBullet, text)
    }

    fn new(kind: NodeKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            summary: None,
            children: Vec::new(),
        }
    }

    /// Builder method: attach a summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Builder method: append a child node.
    pub fn with_child(mut self, child: ContentNode) -> Self {
        self.children.push(child);
        self
    }

    /// Depth of the deepest descendant below this node (0 for a leaf).
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Total number of descendants at every level.
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|c| 1 + c.descendant_count())
            .sum()
    }
}

/// How the model's response was encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// JSON array of slide objects.
    Json,
    /// Headed text blocks with marker bullets.
    Text,
}

/// Parser output: a slide tree that has not been validated yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCandidate {
    pub slides: Vec<ContentNode>,
    pub format: SourceFormat,
}

/// A validated, ordered list of slides.
///
/// The validator is the only producer inside the pipeline. Deserializing a
/// saved outline bypasses validation, so downstream consumers still check
/// their own structural preconditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outline {
    slides: Vec<ContentNode>,
}

impl Outline {
    pub(crate) fn new(slides: Vec<ContentNode>) -> Self {
        Self { slides }
    }

    /// Slides in presentation order.
    pub fn slides(&self) -> &[ContentNode] {
        &self.slides
    }

    /// Number of slides.
    pub fn len(&self) -> usize {
        self.slides.len()
    }

    /// Whether the outline has no slides.
    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    /// Render the outline as an indented plain-text preview.
    pub fn to_preview(&self) -> String {
        let mut out = String::new();
        for (idx, slide) in self.slides.iter().enumerate() {
            out.push_str(&format!("Slide {}: {}\n", idx + 1, slide.text));
            if let Some(summary) = &slide.summary {
                out.push_str(&format!("  {}\n", summary));
            }
            push_preview_children(&mut out, &slide.children, 1);
            out.push('\n');
        }
        out
    }
}

fn push_preview_children(out: &mut String, nodes: &[ContentNode], level: usize) {
    for node in nodes {
        out.push_str(&"  ".repeat(level));
        out.push_str("- ");
        out.push_str(&node.text);
        out.push('\n');
        push_preview_children(out, &node.children, level + 1);
    }
}
