//! Outline to PPTX rendering.

use crate::package::{self, xml_text, PackageWriter, SLIDE_WIDTH};
use smartppt_core::{ContentNode, NodeKind, Outline, RenderError, RenderLimits};
use std::fmt::{self, Write as FmtWrite};

/// Which piece of slide text a warning refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Title,
    Summary,
    Bullet,
}

impl fmt::Display for TextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextField::Title => write!(f, "title"),
            TextField::Summary => write!(f, "summary"),
            TextField::Bullet => write!(f, "bullet"),
        }
    }
}

/// Non-fatal adjustments made while rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderWarning {
    /// Text exceeded its placeholder limit and was shortened.
    Truncated {
        slide: usize,
        field: TextField,
        original_chars: usize,
        kept_chars: usize,
    },
}

impl fmt::Display for RenderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderWarning::Truncated {
                slide,
                field,
                original_chars,
                kept_chars,
            } => write!(
                f,
                "slide {}: {} truncated from {} to {} characters",
                slide, field, original_chars, kept_chars
            ),
        }
    }
}

/// A finished presentation file.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    bytes: Vec<u8>,
    slide_count: usize,
    warnings: Vec<RenderWarning>,
}

impl RenderedDocument {
    /// The `.pptx` file contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Take ownership of the file contents.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn slide_count(&self) -> usize {
        self.slide_count
    }

    pub fn warnings(&self) -> &[RenderWarning] {
        &self.warnings
    }
}

/// Paragraph styles in the body placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParagraphStyle {
    /// Unbulleted lead-in (the slide summary).
    Lead,
    /// Bulleted paragraph at the given outline level.
    Bullet(u8),
}

#[derive(Debug)]
struct SlideLayout {
    title: String,
    paragraphs: Vec<(ParagraphStyle, String)>,
}

/// Renders validated outlines as Office Open XML presentations.
#[derive(Debug, Clone, Default)]
pub struct PptxRenderer {
    limits: RenderLimits,
}

impl PptxRenderer {
    /// Create a renderer with default text limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the text limits.
    pub fn with_limits(mut self, limits: RenderLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Render the outline into a complete `.pptx` package.
    ///
    /// Slide i of the outline becomes slide i of the deck. Output is
    /// byte-for-byte reproducible for the same outline and limits.
    pub fn render(&self, outline: &Outline) -> Result<RenderedDocument, RenderError> {
        if outline.is_empty() {
            return Err(RenderError::EmptyOutline);
        }

        let mut warnings = Vec::new();
        let layouts = outline
            .slides()
            .iter()
            .enumerate()
            .map(|(idx, node)| self.layout_slide(idx + 1, node, &mut warnings))
            .collect::<Result<Vec<_>, _>>()?;

        for warning in &warnings {
            log::warn!("{}", warning);
        }

        let slide_count = layouts.len();
        let mut pkg = PackageWriter::new();
        pkg.write_part("[Content_Types].xml", &package::content_types(slide_count))?;
        pkg.write_part("docProps/core.xml", &package::core_props(&layouts[0].title))?;
        pkg.write_part("docProps/app.xml", &package::app_props(slide_count))?;
        pkg.write_part("ppt/presentation.xml", &package::presentation_xml(slide_count))?;
        pkg.write_part(
            "ppt/_rels/presentation.xml.rels",
            &package::presentation_rels(slide_count),
        )?;
        pkg.write_static_parts()?;

        for (idx, layout) in layouts.iter().enumerate() {
            let number = idx + 1;
            log::debug!(
                "Writing slide {} \"{}\" ({} paragraphs)",
                number,
                layout.title,
                layout.paragraphs.len()
            );
            pkg.write_part(&package::slide_part_name(number), &slide_xml(layout))?;
            pkg.write_part(
                &format!("ppt/slides/_rels/slide{}.xml.rels", number),
                &package::slide_rels(),
            )?;
        }

        let bytes = pkg.finish()?;
        log::info!(
            "Rendered {} slide(s) into {} bytes ({} warning(s))",
            slide_count,
            bytes.len(),
            warnings.len()
        );

        Ok(RenderedDocument {
            bytes,
            slide_count,
            warnings,
        })
    }

    /// Map one slide tree onto a title and body paragraphs.
    fn layout_slide(
        &self,
        number: usize,
        node: &ContentNode,
        warnings: &mut Vec<RenderWarning>,
    ) -> Result<SlideLayout, RenderError> {
        if node.kind != NodeKind::Title {
            return Err(structure(number, format!("root is a {:?}, not a title", node.kind)));
        }

        let limits = self.limits;
        let title = fit(number, TextField::Title, &node.text, limits.max_title_chars, warnings);
        let mut paragraphs = Vec::new();

        if let Some(summary) = node.summary.as_deref().filter(|s| !s.trim().is_empty()) {
            let text = fit(number, TextField::Summary, summary, limits.max_text_chars, warnings);
            paragraphs.push((ParagraphStyle::Lead, text));
        }

        for bullet in &node.children {
            if bullet.kind != NodeKind::Bullet {
                return Err(structure(
                    number,
                    format!("expected a bullet under the title, found {:?}", bullet.kind),
                ));
            }
            let text = fit(number, TextField::Bullet, &bullet.text, limits.max_text_chars, warnings);
            paragraphs.push((ParagraphStyle::Bullet(0), text));

            for sub in &bullet.children {
                if sub.kind != NodeKind::SubBullet {
                    return Err(structure(
                        number,
                        format!("expected a sub-bullet under a bullet, found {:?}", sub.kind),
                    ));
                }
                if !sub.children.is_empty() {
                    return Err(structure(number, "bullets nest deeper than two levels".to_string()));
                }
                let text = fit(number, TextField::Bullet, &sub.text, limits.max_text_chars, warnings);
                paragraphs.push((ParagraphStyle::Bullet(1), text));
            }
        }

        Ok(SlideLayout { title, paragraphs })
    }
}

/// Trim and, if needed, truncate one piece of text, recording a warning.
fn fit(
    slide: usize,
    field: TextField,
    text: &str,
    max_chars: usize,
    warnings: &mut Vec<RenderWarning>,
) -> String {
    let text = text.trim();
    match truncate(text, max_chars) {
        Some(short) => {
            warnings.push(RenderWarning::Truncated {
                slide,
                field,
                original_chars: text.chars().count(),
                kept_chars: short.chars().count(),
            });
            short
        }
        None => text.to_string(),
    }
}

fn structure(slide: usize, reason: String) -> RenderError {
    RenderError::Structure { slide, reason }
}

/// Shorten `text` to at most `max_chars` characters ending in an ellipsis,
/// or `None` if it already fits.
fn truncate(text: &str, max_chars: usize) -> Option<String> {
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return None;
    }
    let mut short: String = text.chars().take(max_chars - 1).collect();
    short.truncate(short.trim_end().len());
    short.push('…');
    Some(short)
}

const SLIDE_OPEN: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">"#,
    "<p:cSld><p:spTree>",
    r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>"#,
    r#"<p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#,
);

const SLIDE_CLOSE: &str =
    "</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>";

const MARGIN_X: i64 = 457_200;

fn slide_xml(layout: &SlideLayout) -> String {
    let mut xml = String::with_capacity(2048 + layout.paragraphs.len() * 256);
    xml.push_str(SLIDE_OPEN);

    // Title placeholder. id 1 is the group shape.
    xml.push_str(r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="Title 1"/><p:cNvSpPr><a:spLocks noGrp="1"/></p:cNvSpPr><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr>"#);
    let _ = write!(
        xml,
        r#"<p:spPr><a:xfrm><a:off x="{}" y="274638"/><a:ext cx="{}" cy="1143000"/></a:xfrm></p:spPr>"#,
        MARGIN_X,
        SLIDE_WIDTH - 2 * MARGIN_X
    );
    xml.push_str("<p:txBody><a:bodyPr><a:normAutofit/></a:bodyPr><a:lstStyle/><a:p>");
    push_run(&mut xml, &layout.title);
    xml.push_str("</a:p></p:txBody></p:sp>");

    if !layout.paragraphs.is_empty() {
        xml.push_str(r#"<p:sp><p:nvSpPr><p:cNvPr id="3" name="Content Placeholder 2"/><p:cNvSpPr><a:spLocks noGrp="1"/></p:cNvSpPr><p:nvPr><p:ph idx="1"/></p:nvPr></p:nvSpPr>"#);
        let _ = write!(
            xml,
            r#"<p:spPr><a:xfrm><a:off x="{}" y="1600200"/><a:ext cx="{}" cy="4525963"/></a:xfrm></p:spPr>"#,
            MARGIN_X,
            SLIDE_WIDTH - 2 * MARGIN_X
        );
        xml.push_str(r#"<p:txBody><a:bodyPr><a:normAutofit fontScale="85000" lnSpcReduction="10000"/></a:bodyPr><a:lstStyle/>"#);
        for (style, text) in &layout.paragraphs {
            xml.push_str("<a:p>");
            match style {
                ParagraphStyle::Lead => {
                    xml.push_str(r#"<a:pPr marL="0" indent="0"><a:buNone/></a:pPr>"#);
                }
                ParagraphStyle::Bullet(0) => {
                    xml.push_str(r#"<a:pPr marL="342900" lvl="0" indent="-342900"><a:buFont typeface="Arial"/><a:buChar char="•"/></a:pPr>"#);
                }
                ParagraphStyle::Bullet(level) => {
                    let _ = write!(
                        xml,
                        r#"<a:pPr marL="742950" lvl="{}" indent="-285750"><a:buFont typeface="Arial"/><a:buChar char="–"/></a:pPr>"#,
                        level
                    );
                }
            }
            push_run(&mut xml, text);
            xml.push_str("</a:p>");
        }
        xml.push_str("</p:txBody></p:sp>");
    }

    xml.push_str(SLIDE_CLOSE);
    xml
}

fn push_run(xml: &mut String, text: &str) {
    let _ = write!(
        xml,
        r#"<a:r><a:rPr lang="en-US" dirty="0"/><a:t>{}</a:t></a:r>"#,
        xml_text(text)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_presentation;

    fn outline(slides: Vec<ContentNode>) -> Outline {
        serde_json::from_value(serde_json::to_value(slides).unwrap()).unwrap()
    }

    fn ocean_deck() -> Outline {
        let titles = [
            "Why the Ocean Matters",
            "Threats to Marine Life",
            "Protected Areas",
            "What You Can Do",
            "Summary",
        ];
        outline(
            titles
                .iter()
                .map(|t| {
                    ContentNode::slide(*t)
                        .with_summary(format!("An overview of {}.", t.to_lowercase()))
                        .with_child(
                            ContentNode::bullet("Oceans absorb a quarter of CO2 emissions")
                                .with_child(ContentNode::sub_bullet("About 2.5 billion tonnes a year")),
                        )
                        .with_child(ContentNode::bullet("Fish & coral < 30% protected"))
                })
                .collect(),
        )
    }

    #[test]
    fn test_render_round_trips_titles_and_levels() {
        let doc = PptxRenderer::new().render(&ocean_deck()).unwrap();
        assert_eq!(doc.slide_count(), 5);
        assert!(doc.warnings().is_empty());

        let slides = read_presentation(doc.as_bytes()).unwrap();
        assert_eq!(slides.len(), 5);
        assert_eq!(slides[0].title, "Why the Ocean Matters");
        assert_eq!(slides[4].title, "Summary");

        let first = &slides[0];
        assert_eq!(first.paragraphs.len(), 4);
        assert!(!first.paragraphs[0].bulleted);
        assert_eq!(first.paragraphs[0].text, "An overview of why the ocean matters.");
        assert_eq!(first.paragraphs[1].level, 0);
        assert!(first.paragraphs[1].bulleted);
        assert_eq!(first.paragraphs[2].level, 1);
        assert_eq!(first.paragraphs[2].text, "About 2.5 billion tonnes a year");
        assert_eq!(first.paragraphs[3].text, "Fish & coral < 30% protected");
    }

    #[test]
    fn test_render_is_deterministic() {
        let renderer = PptxRenderer::new();
        let a = renderer.render(&ocean_deck()).unwrap();
        let b = renderer.render(&ocean_deck()).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_empty_outline_is_rejected() {
        let empty: Outline = serde_json::from_str("[]").unwrap();
        assert!(matches!(
            PptxRenderer::new().render(&empty),
            Err(RenderError::EmptyOutline)
        ));
    }

    #[test]
    fn test_malformed_tree_is_structure_error() {
        let bad_root = outline(vec![ContentNode::bullet("Not a title")]);
        assert!(matches!(
            PptxRenderer::new().render(&bad_root),
            Err(RenderError::Structure { slide: 1, .. })
        ));

        let too_deep = outline(vec![
            ContentNode::slide("Fine"),
            ContentNode::slide("Deep").with_child(
                ContentNode::bullet("a").with_child(
                    ContentNode::sub_bullet("b").with_child(ContentNode::sub_bullet("c")),
                ),
            ),
        ]);
        match PptxRenderer::new().render(&too_deep) {
            Err(RenderError::Structure { slide, reason }) => {
                assert_eq!(slide, 2);
                assert!(reason.contains("deeper"));
            }
            other => panic!("unexpected result: {:?}", other.map(|d| d.slide_count())),
        }
    }

    #[test]
    fn test_long_text_is_truncated_with_warning() {
        let long_title = "t".repeat(200);
        let deck = outline(vec![
            ContentNode::slide(long_title).with_child(ContentNode::bullet("b".repeat(20)))
        ]);
        let limits = RenderLimits {
            max_title_chars: 50,
            max_text_chars: 10,
        };
        let doc = PptxRenderer::new().with_limits(limits).render(&deck).unwrap();

        assert_eq!(
            doc.warnings(),
            &[
                RenderWarning::Truncated {
                    slide: 1,
                    field: TextField::Title,
                    original_chars: 200,
                    kept_chars: 50,
                },
                RenderWarning::Truncated {
                    slide: 1,
                    field: TextField::Bullet,
                    original_chars: 20,
                    kept_chars: 10,
                },
            ]
        );
        let slides = read_presentation(doc.as_bytes()).unwrap();
        assert_eq!(slides[0].title.chars().count(), 50);
        assert!(slides[0].title.ends_with('…'));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), None);
        assert_eq!(truncate("海洋保护很重要", 4).as_deref(), Some("海洋保…"));
        assert_eq!(truncate("word then more", 6).as_deref(), Some("word…"));
    }

    #[test]
    fn test_title_only_slide_has_no_body() {
        let deck = outline(vec![ContentNode::slide("Questions?")]);
        let doc = PptxRenderer::new().render(&deck).unwrap();
        let slides = read_presentation(doc.as_bytes()).unwrap();
        assert_eq!(slides[0].title, "Questions?");
        assert!(slides[0].paragraphs.is_empty());
    }

    #[test]
    fn test_control_characters_never_reach_any_part() {
        let deck = outline(vec![
            ContentNode::slide("Ocean\u{1}Deck").with_child(ContentNode::bullet("Tide\u{FFFF}s")),
        ]);
        let doc = PptxRenderer::new().render(&deck).unwrap();

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(doc.as_bytes())).unwrap();
        for name in ["docProps/core.xml", "ppt/slides/slide1.xml"] {
            let mut xml = String::new();
            std::io::Read::read_to_string(&mut archive.by_name(name).unwrap(), &mut xml).unwrap();
            assert!(!xml.contains('\u{1}'), "{} carries U+0001", name);
            assert!(!xml.contains('\u{FFFF}'), "{} carries U+FFFF", name);
        }

        let slides = read_presentation(doc.as_bytes()).unwrap();
        assert_eq!(slides[0].title, "OceanDeck");
        assert_eq!(slides[0].paragraphs[0].text, "Tides");
    }
}
