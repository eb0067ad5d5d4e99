//! Schema validator for candidate outlines.
//!
//! Every rule runs on every slide; nothing short-circuits, so one corrective
//! prompt can address all defects at once. Violations come back ordered by
//! slide (deck-level first) and then by rule.

use crate::config::ValidationPolicy;
use crate::error::ParseError;
use crate::types::{ContentNode, GenerationRequest, NodeKind, Outline, ParsedCandidate};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

/// Identifier of a validation rule, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleId {
    SlideCount,
    TitlePresent,
    NoConsecutiveDuplicates,
    NestingDepth,
    BulletCap,
    BulletText,
}

impl RuleId {
    /// Short code such as "R1".
    pub fn code(&self) -> &'static str {
        match self {
            RuleId::SlideCount => "R1",
            RuleId::TitlePresent => "R2",
            RuleId::NoConsecutiveDuplicates => "R3",
            RuleId::NestingDepth => "R4",
            RuleId::BulletCap => "R5",
            RuleId::BulletText => "R6",
        }
    }

    /// Human-readable rule name.
    pub fn name(&self) -> &'static str {
        match self {
            RuleId::SlideCount => "slide-count",
            RuleId::TitlePresent => "title",
            RuleId::NoConsecutiveDuplicates => "duplicate-bullet",
            RuleId::NestingDepth => "nesting",
            RuleId::BulletCap => "bullet-cap",
            RuleId::BulletText => "bullet-text",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.name())
    }
}

/// A single rule breach. Slide numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    SlideCount { expected: usize, actual: usize },
    EmptyTitle { slide: usize },
    DuplicateBullet { slide: usize, text: String },
    NestingTooDeep { slide: usize, depth: usize, max: usize },
    MisplacedKind { slide: usize, found: NodeKind, expected: NodeKind },
    TooManyBullets { slide: usize, count: usize, max: usize },
    EmptyBullet { slide: usize, count: usize },
}

impl Violation {
    /// The rule this violation breaks.
    pub fn rule(&self) -> RuleId {
        match self {
            Violation::SlideCount { .. } => RuleId::SlideCount,
            Violation::EmptyTitle { .. } => RuleId::TitlePresent,
            Violation::DuplicateBullet { .. } => RuleId::NoConsecutiveDuplicates,
            Violation::NestingTooDeep { .. } | Violation::MisplacedKind { .. } => {
                RuleId::NestingDepth
            }
            Violation::TooManyBullets { .. } => RuleId::BulletCap,
            Violation::EmptyBullet { .. } => RuleId::BulletText,
        }
    }

    /// Slide the violation is attached to, or `None` for deck-level rules.
    pub fn slide(&self) -> Option<usize> {
        match self {
            Violation::SlideCount { .. } => None,
            Violation::EmptyTitle { slide }
            | Violation::DuplicateBullet { slide, .. }
            | Violation::NestingTooDeep { slide, .. }
            | Violation::MisplacedKind { slide, .. }
            | Violation::TooManyBullets { slide, .. }
            | Violation::EmptyBullet { slide, .. } => Some(*slide),
        }
    }

    /// Slides missing (positive) or surplus (negative), for slide-count breaches.
    pub fn delta(&self) -> Option<i64> {
        match self {
            Violation::SlideCount { expected, actual } => Some(*expected as i64 - *actual as i64),
            _ => None,
        }
    }

    /// Instruction for the model describing how to fix this violation.
    pub fn correction(&self) -> String {
        match self {
            Violation::SlideCount { expected, actual } if actual < expected => {
                let missing = expected - actual;
                format!(
                    "The previous attempt returned {} {}; {} additional {} needed to reach exactly {}.",
                    actual,
                    plural(*actual, "slide", "slides"),
                    missing,
                    plural(missing, "slide", "slides"),
                    expected
                )
            }
            Violation::SlideCount { expected, actual } => {
                let surplus = actual - expected;
                format!(
                    "The previous attempt returned {} slides; remove {} {} to reach exactly {}.",
                    actual,
                    surplus,
                    plural(surplus, "slide", "slides"),
                    expected
                )
            }
            Violation::EmptyTitle { slide } => format!(
                "Slide {} had an empty title; every slide needs a non-empty title.",
                slide
            ),
            Violation::DuplicateBullet { slide, text } => format!(
                "Slide {} repeated the bullet \"{}\" twice in a row; consecutive bullets must differ.",
                slide, text
            ),
            Violation::NestingTooDeep { slide, depth, max } => format!(
                "Slide {} nested bullets {} levels deep; use at most {} levels (main point, then supporting fact).",
                slide, depth, max
            ),
            Violation::MisplacedKind { slide, found, expected } => format!(
                "Slide {} used a {:?} where a {:?} belongs; only the slide heading may be a title.",
                slide, found, expected
            ),
            Violation::TooManyBullets { slide, count, max } => format!(
                "Slide {} had {} bullets; use at most {} including supporting facts.",
                slide, count, max
            ),
            Violation::EmptyBullet { slide, count } => format!(
                "Slide {} had empty bullet text ({} {}); every bullet must contain text.",
                slide,
                count,
                plural(*count, "bullet", "bullets")
            ),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.rule())?;
        match self {
            Violation::SlideCount { expected, actual } => write!(
                f,
                "expected {} slides, found {} (delta {:+})",
                expected,
                actual,
                *expected as i64 - *actual as i64
            ),
            Violation::EmptyTitle { slide } => write!(f, "slide {} has an empty title", slide),
            Violation::DuplicateBullet { slide, text } => {
                write!(f, "slide {} repeats \"{}\"", slide, text)
            }
            Violation::NestingTooDeep { slide, depth, max } => {
                write!(f, "slide {} is nested {} deep (max {})", slide, depth, max)
            }
            Violation::MisplacedKind { slide, found, expected } => {
                write!(f, "slide {} has {:?} where {:?} belongs", slide, found, expected)
            }
            Violation::TooManyBullets { slide, count, max } => {
                write!(f, "slide {} has {} bullets (max {})", slide, count, max)
            }
            Violation::EmptyBullet { slide, count } => {
                write!(f, "slide {} has {} empty bullet(s)", slide, count)
            }
        }
    }
}

fn plural<'a>(n: usize, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 {
        one
    } else {
        many
    }
}

/// Outcome of validating a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid(Outline),
    Invalid(Vec<Violation>),
}

impl ValidationResult {
    /// Whether the candidate passed every rule.
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid(_))
    }
}

/// Why a planning attempt was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The response could not be parsed at all.
    Unparseable(ParseError),
    /// The response parsed but broke schema rules.
    Invalid(Vec<Violation>),
}

impl Rejection {
    /// Violations carried by the rejection (empty for parse failures).
    pub fn violations(&self) -> &[Violation] {
        match self {
            Rejection::Unparseable(_) => &[],
            Rejection::Invalid(violations) => violations,
        }
    }

    /// One corrective instruction per defect, ready for the next prompt.
    pub fn corrections(&self) -> Vec<String> {
        match self {
            Rejection::Unparseable(ParseError::Empty) => vec![
                "The previous response was empty. Return the complete JSON array described above."
                    .to_string(),
            ],
            Rejection::Unparseable(ParseError::Unparseable(reason)) => vec![format!(
                "The previous response could not be parsed ({}). Return only the JSON array described above, with no commentary.",
                reason
            )],
            Rejection::Invalid(violations) => violations.iter().map(Violation::correction).collect(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Unparseable(e) => write!(f, "{}", e),
            Rejection::Invalid(violations) => {
                write!(f, "{} violation(s)", violations.len())?;
                for (idx, v) in violations.iter().enumerate() {
                    write!(f, "{}{}", if idx == 0 { ": " } else { "; " }, v)?;
                }
                Ok(())
            }
        }
    }
}

/// Rule engine enforcing structural invariants on parser output.
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    policy: ValidationPolicy,
}

impl SchemaValidator {
    /// Create a validator with the default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a validator with the given policy.
    pub fn with_policy(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    /// The policy in force.
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Check a candidate against the request and every rule.
    pub fn validate(&self, candidate: ParsedCandidate, request: &GenerationRequest) -> ValidationResult {
        let mut violations = Vec::new();

        if candidate.slides.len() != request.slide_count() {
            violations.push(Violation::SlideCount {
                expected: request.slide_count(),
                actual: candidate.slides.len(),
            });
        }

        for (idx, slide) in candidate.slides.iter().enumerate() {
            self.check_slide(idx + 1, slide, &mut violations);
        }

        if violations.is_empty() {
            ValidationResult::Valid(Outline::new(candidate.slides))
        } else {
            // Stable sort keeps discovery order within one slide and rule.
            violations.sort_by_key(|v| (v.slide().unwrap_or(0), v.rule()));
            log::debug!("Candidate rejected with {} violation(s)", violations.len());
            ValidationResult::Invalid(violations)
        }
    }

    fn check_slide(&self, number: usize, slide: &ContentNode, out: &mut Vec<Violation>) {
        if slide.text.trim().is_empty() {
            out.push(Violation::EmptyTitle { slide: number });
        }

        collect_duplicates(number, &slide.children, out);

        let depth = slide.depth();
        if depth > self.policy.max_depth {
            out.push(Violation::NestingTooDeep {
                slide: number,
                depth,
                max: self.policy.max_depth,
            });
        }
        if let Some((found, expected)) = first_kind_mismatch(slide, 0) {
            out.push(Violation::MisplacedKind {
                slide: number,
                found,
                expected,
            });
        }

        let count = slide.descendant_count();
        if count > self.policy.max_bullets_per_slide {
            out.push(Violation::TooManyBullets {
                slide: number,
                count,
                max: self.policy.max_bullets_per_slide,
            });
        }

        let empty = count_empty(&slide.children);
        if empty > 0 {
            out.push(Violation::EmptyBullet {
                slide: number,
                count: empty,
            });
        }
    }
}

/// Normalize bullet text for repetition checks.
fn comparison_key(text: &str) -> String {
    text.nfkc()
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn collect_duplicates(slide: usize, siblings: &[ContentNode], out: &mut Vec<Violation>) {
    for pair in siblings.windows(2) {
        let key = comparison_key(&pair[1].text);
        if !key.is_empty() && key == comparison_key(&pair[0].text) {
            out.push(Violation::DuplicateBullet {
                slide,
                text: pair[1].text.trim().to_string(),
            });
        }
    }
    for node in siblings {
        collect_duplicates(slide, &node.children, out);
    }
}

fn first_kind_mismatch(node: &ContentNode, depth: usize) -> Option<(NodeKind, NodeKind)> {
    let expected = NodeKind::for_depth(depth);
    if node.kind != expected {
        return Some((node.kind, expected));
    }
    node.children
        .iter()
        .find_map(|child| first_kind_mismatch(child, depth + 1))
}

fn count_empty(nodes: &[ContentNode]) -> usize {
    nodes
        .iter()
        .map(|n| usize::from(n.text.trim().is_empty()) + count_empty(&n.children))
        .sum()
}
