//! PPTX text extraction.
//!
//! Reads a deck back into titles and body paragraphs in presentation order.
//! Used to summarize written files and to check rendered output.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use thiserror::Error;
use zip::ZipArchive;

/// Errors reading a presentation package.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("ZIP error: {0}")]
    Zip(String),

    #[error("Missing part '{0}'")]
    MissingPart(String),

    #[error("XML error: {0}")]
    Xml(String),
}

/// One paragraph of body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    /// Outline level (0 = top-level bullet).
    pub level: u8,
    /// Whether the paragraph shows a bullet glyph.
    pub bulleted: bool,
    pub text: String,
}

/// Text recovered from one slide.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtractedSlide {
    /// 1-based position in the deck.
    pub number: usize,
    pub title: String,
    pub paragraphs: Vec<Paragraph>,
}

/// Reader for PPTX (Office Open XML) files.
#[derive(Debug, Default)]
pub struct PptxReader;

/// Read slides from an in-memory `.pptx`.
pub fn read_presentation(bytes: &[u8]) -> Result<Vec<ExtractedSlide>, ReadError> {
    PptxReader::new().read(Cursor::new(bytes))
}

impl PptxReader {
    pub fn new() -> Self {
        Self
    }

    /// Read every slide in deck order.
    pub fn read<R: Read + Seek>(&self, reader: R) -> Result<Vec<ExtractedSlide>, ReadError> {
        let mut archive = ZipArchive::new(reader)
            .map_err(|e| ReadError::Zip(format!("Failed to open ZIP: {}", e)))?;

        let slide_paths = self.slide_order(&mut archive)?;
        log::debug!("Found {} slide part(s)", slide_paths.len());

        slide_paths
            .iter()
            .enumerate()
            .map(|(idx, path)| {
                let xml = read_part(&mut archive, path)?;
                let mut slide = parse_slide_xml(&xml);
                slide.number = idx + 1;
                Ok(slide)
            })
            .collect()
    }

    /// Slide part paths in deck order.
    ///
    /// `p:sldIdLst` in `presentation.xml` is authoritative. Decks without it
    /// fall back to numeric order of the relationship ids or targets.
    fn slide_order<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
    ) -> Result<Vec<String>, ReadError> {
        let rels = read_part(archive, "ppt/_rels/presentation.xml.rels")?;
        let slide_rels = parse_slide_rels(&rels)?;

        let listed = match read_part(archive, "ppt/presentation.xml") {
            Ok(xml) => parse_slide_id_list(&xml)?,
            Err(e) => {
                log::warn!("Reading slide order from relationships: {}", e);
                Vec::new()
            }
        };

        if !listed.is_empty() {
            let targets: HashMap<&str, &str> = slide_rels
                .iter()
                .map(|(id, target)| (id.as_str(), target.as_str()))
                .collect();
            return Ok(listed
                .iter()
                .filter_map(|id| targets.get(id.as_str()).map(|t| resolve_target(t)))
                .collect());
        }

        let mut ordered: Vec<(String, Option<usize>)> = slide_rels
            .iter()
            .map(|(id, target)| {
                let order = extract_slide_number(target).or_else(|| extract_slide_number(id));
                (resolve_target(target), order)
            })
            .collect();
        ordered.sort_by(|a, b| match (a.1, b.1) {
            (Some(na), Some(nb)) => na.cmp(&nb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.0.cmp(&b.0),
        });
        Ok(ordered.into_iter().map(|(path, _)| path).collect())
    }
}

/// `(id, target)` for every slide relationship in `presentation.xml.rels`.
fn parse_slide_rels(xml: &str) -> Result<Vec<(String, String)>, ReadError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut slides = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                let rel_type = attr_value(e, b"Type").unwrap_or_default();
                if rel_type.ends_with("/slide") {
                    if let (Some(id), Some(target)) = (attr_value(e, b"Id"), attr_value(e, b"Target")) {
                        slides.push((id, target));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ReadError::Xml(format!("Error parsing relationships: {}", e)));
            }
            _ => {}
        }
    }

    Ok(slides)
}

/// Relationship ids from `p:sldIdLst`, in order.
fn parse_slide_id_list(xml: &str) -> Result<Vec<String>, ReadError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut ids = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"sldId" =>
            {
                if let Some(id) = rel_id(e) {
                    ids.push(id);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ReadError::Xml(format!("Error parsing presentation: {}", e)));
            }
            _ => {}
        }
    }

    Ok(ids)
}

/// The `r:id` attribute, whatever prefix the namespace is bound to.
fn rel_id(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| {
            let key = attr.key.as_ref();
            key != local_name(key) && local_name(key) == b"id"
        })
        .map(|attr| String::from_utf8_lossy(&attr.value).to_string())
}

#[derive(Debug, Default)]
struct ShapeText {
    is_title: bool,
    paragraphs: Vec<Paragraph>,
}

/// Pull the title and body paragraphs out of one slide part.
///
/// Malformed XML is logged and skipped; whatever was read so far is kept.
fn parse_slide_xml(xml: &str) -> ExtractedSlide {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut slide = ExtractedSlide::default();
    let mut shape: Option<ShapeText> = None;
    let mut paragraph: Option<Paragraph> = None;
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()) {
                b"sp" => shape = Some(ShapeText::default()),
                b"p" if shape.is_some() => {
                    paragraph = Some(Paragraph {
                        level: 0,
                        bulleted: true,
                        text: String::new(),
                    })
                }
                b"pPr" => apply_paragraph_props(e, paragraph.as_mut()),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match local_name(e.name().as_ref()) {
                b"ph" => {
                    let ph_type = attr_value(e, b"type").unwrap_or_default();
                    if let Some(s) = shape.as_mut() {
                        s.is_title = ph_type == "title" || ph_type == "ctrTitle";
                    }
                }
                b"pPr" => apply_paragraph_props(e, paragraph.as_mut()),
                b"buNone" => {
                    if let Some(p) = paragraph.as_mut() {
                        p.bulleted = false;
                    }
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_text => {
                if let Some(p) = paragraph.as_mut() {
                    let text = e.unescape().unwrap_or_default();
                    p.text.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match local_name(e.name().as_ref()) {
                b"t" => in_text = false,
                b"p" => {
                    if let (Some(p), Some(s)) = (paragraph.take(), shape.as_mut()) {
                        if !p.text.trim().is_empty() {
                            s.paragraphs.push(p);
                        }
                    }
                }
                b"sp" => {
                    if let Some(s) = shape.take() {
                        if s.is_title {
                            let parts: Vec<&str> =
                                s.paragraphs.iter().map(|p| p.text.trim()).collect();
                            slide.title = parts.join(" ");
                        } else {
                            slide.paragraphs.extend(s.paragraphs);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("XML parsing error at {}: {}", reader.buffer_position(), e);
                break;
            }
            _ => {}
        }
    }

    slide
}

fn apply_paragraph_props(e: &BytesStart<'_>, paragraph: Option<&mut Paragraph>) {
    if let Some(p) = paragraph {
        if let Some(level) = attr_value(e, b"lvl").and_then(|v| v.parse().ok()) {
            p.level = level;
        }
    }
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| String::from_utf8_lossy(&attr.value).to_string())
}

/// Resolve a target from `ppt/_rels/presentation.xml.rels` to a part path.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("ppt/{}", target),
    }
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String, ReadError> {
    let mut file = archive
        .by_name(path)
        .map_err(|_| ReadError::MissingPart(path.to_string()))?;

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| ReadError::Zip(format!("Failed to read '{}': {}", path, e)))?;

    Ok(content)
}

/// Extract the local name from a potentially namespaced XML element name.
fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}

/// Extract a slide number from a string like "rId2" or "slide3.xml".
fn extract_slide_number(s: &str) -> Option<usize> {
    let s = s.trim_end_matches(".xml").trim_end_matches(".rels");

    let digits: String = s.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let digits: String = digits.chars().rev().collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_slide_number() {
        assert_eq!(extract_slide_number("rId1"), Some(1));
        assert_eq!(extract_slide_number("rId12"), Some(12));
        assert_eq!(extract_slide_number("slides/slide1.xml"), Some(1));
        assert_eq!(extract_slide_number("slide123.xml"), Some(123));
        assert_eq!(extract_slide_number("nodigits"), None);
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name(b"p:sp"), b"sp");
        assert_eq!(local_name(b"a:t"), b"t");
        assert_eq!(local_name(b"sp"), b"sp");
    }

    #[test]
    fn test_slide_id_list_order_wins() {
        let pres = r#"<p:presentation xmlns:p="p" xmlns:r="r"><p:sldIdLst><p:sldId id="257" r:id="rId9"/><p:sldId id="256" r:id="rId3"/></p:sldIdLst></p:presentation>"#;
        assert_eq!(parse_slide_id_list(pres).unwrap(), vec!["rId9", "rId3"]);
    }

    #[test]
    fn test_slide_rels_skip_layouts_and_masters() {
        let rels = r#"<Relationships xmlns="x">
            <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="slideMasters/slideMaster1.xml"/>
            <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide1.xml"/>
            <Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="slideLayouts/slideLayout1.xml"/>
        </Relationships>"#;
        assert_eq!(
            parse_slide_rels(rels).unwrap(),
            vec![("rId3".to_string(), "slides/slide1.xml".to_string())]
        );
        assert_eq!(resolve_target("slides/slide1.xml"), "ppt/slides/slide1.xml");
        assert_eq!(resolve_target("/ppt/slides/slide1.xml"), "ppt/slides/slide1.xml");
    }

    #[test]
    fn test_parse_slide_separates_title_and_body() {
        let xml = r#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree>
            <p:sp><p:nvSpPr><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr>
              <p:txBody><a:p><a:r><a:t>Ocean Facts</a:t></a:r></a:p></p:txBody></p:sp>
            <p:sp><p:nvSpPr><p:nvPr><p:ph idx="1"/></p:nvPr></p:nvSpPr>
              <p:txBody>
                <a:p><a:pPr marL="0" indent="0"><a:buNone/></a:pPr><a:r><a:t>Lead</a:t></a:r></a:p>
                <a:p><a:pPr lvl="0"/><a:r><a:t>Point</a:t></a:r></a:p>
                <a:p><a:pPr lvl="1"><a:buChar char="-"/></a:pPr><a:r><a:t>Fact &amp; figure</a:t></a:r></a:p>
                <a:p/>
              </p:txBody></p:sp>
        </p:spTree></p:cSld></p:sld>"#;

        let slide = parse_slide_xml(xml);
        assert_eq!(slide.title, "Ocean Facts");
        assert_eq!(
            slide.paragraphs,
            vec![
                Paragraph { level: 0, bulleted: false, text: "Lead".into() },
                Paragraph { level: 0, bulleted: true, text: "Point".into() },
                Paragraph { level: 1, bulleted: true, text: "Fact & figure".into() },
            ]
        );
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(
            read_presentation(b"definitely not a zip"),
            Err(ReadError::Zip(_))
        ));
    }
}
