//! PresentationML package parts and the ZIP container.
//!
//! Everything except the slides is fixed: one master, one "Title and
//! Content" layout and one theme. Parts are written in a fixed order with a
//! fixed timestamp so identical input gives identical bytes.

use quick_xml::escape::escape;
use smartppt_core::RenderError;
use std::fmt::Write as FmtWrite;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Slide width in EMUs (10 inches).
pub const SLIDE_WIDTH: i64 = 9_144_000;
/// Slide height in EMUs (7.5 inches).
pub const SLIDE_HEIGHT: i64 = 6_858_000;

/// First `p:sldId` value; PowerPoint reserves everything below 256.
const FIRST_SLIDE_ID: usize = 256;

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

const REL_OFFICE_DOC: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const REL_CORE_PROPS: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";
const REL_APP_PROPS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties";
const REL_SLIDE_MASTER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster";
const REL_SLIDE_LAYOUT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout";
pub(crate) const REL_SLIDE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
const REL_THEME: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme";

/// Relationship id of slide `number` (1-based) in `presentation.xml.rels`.
///
/// rId1 is the master and rId2 the theme, so slides start at rId3.
pub(crate) fn slide_rel_id(number: usize) -> String {
    format!("rId{}", number + 2)
}

/// Part name of slide `number` (1-based), without the leading slash.
pub(crate) fn slide_part_name(number: usize) -> String {
    format!("ppt/slides/slide{}.xml", number)
}

/// Writes parts into an in-memory ZIP archive.
pub(crate) struct PackageWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    options: FileOptions,
}

impl PackageWriter {
    pub fn new() -> Self {
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            options,
        }
    }

    /// Add one part to the archive.
    pub fn write_part(&mut self, name: &str, content: &str) -> Result<(), RenderError> {
        self.zip
            .start_file(name, self.options)
            .map_err(|e| RenderError::Package(format!("Failed to start part '{}': {}", name, e)))?;
        self.zip
            .write_all(content.as_bytes())
            .map_err(|e| RenderError::Package(format!("Failed to write part '{}': {}", name, e)))?;
        Ok(())
    }

    /// Add every fixed part that does not depend on slide content.
    pub fn write_static_parts(&mut self) -> Result<(), RenderError> {
        self.write_part("_rels/.rels", &root_rels())?;
        self.write_part("ppt/slideMasters/slideMaster1.xml", SLIDE_MASTER)?;
        self.write_part("ppt/slideMasters/_rels/slideMaster1.xml.rels", &master_rels())?;
        self.write_part("ppt/slideLayouts/slideLayout1.xml", SLIDE_LAYOUT)?;
        self.write_part("ppt/slideLayouts/_rels/slideLayout1.xml.rels", &layout_rels())?;
        self.write_part("ppt/theme/theme1.xml", THEME)?;
        Ok(())
    }

    /// Close the archive and return its bytes.
    pub fn finish(mut self) -> Result<Vec<u8>, RenderError> {
        self.zip
            .finish()
            .map(Cursor::into_inner)
            .map_err(|e| RenderError::Package(format!("Failed to finish archive: {}", e)))
    }
}

/// Open a `Relationships` document.
fn rels_header() -> String {
    format!("{}<Relationships xmlns=\"{}\">", XML_DECL, NS_RELS)
}

fn relationship(xml: &mut String, id: &str, rel_type: &str, target: &str) {
    let _ = write!(
        xml,
        r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
        id, rel_type, target
    );
}

fn root_rels() -> String {
    let mut xml = rels_header();
    relationship(&mut xml, "rId1", REL_OFFICE_DOC, "ppt/presentation.xml");
    relationship(&mut xml, "rId2", REL_CORE_PROPS, "docProps/core.xml");
    relationship(&mut xml, "rId3", REL_APP_PROPS, "docProps/app.xml");
    xml.push_str("</Relationships>");
    xml
}

fn master_rels() -> String {
    let mut xml = rels_header();
    relationship(&mut xml, "rId1", REL_SLIDE_LAYOUT, "../slideLayouts/slideLayout1.xml");
    relationship(&mut xml, "rId2", REL_THEME, "../theme/theme1.xml");
    xml.push_str("</Relationships>");
    xml
}

fn layout_rels() -> String {
    let mut xml = rels_header();
    relationship(&mut xml, "rId1", REL_SLIDE_MASTER, "../slideMasters/slideMaster1.xml");
    xml.push_str("</Relationships>");
    xml
}

/// Relationships of a slide part: just its layout.
pub(crate) fn slide_rels() -> String {
    let mut xml = rels_header();
    relationship(&mut xml, "rId1", REL_SLIDE_LAYOUT, "../slideLayouts/slideLayout1.xml");
    xml.push_str("</Relationships>");
    xml
}

/// `[Content_Types].xml` for a deck with `slide_count` slides.
pub(crate) fn content_types(slide_count: usize) -> String {
    let mut xml = String::with_capacity(1024 + slide_count * 160);
    xml.push_str(XML_DECL);
    xml.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
    xml.push_str(r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#);
    xml.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
    xml.push_str(r#"<Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>"#);
    xml.push_str(r#"<Override PartName="/ppt/slideMasters/slideMaster1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml"/>"#);
    xml.push_str(r#"<Override PartName="/ppt/slideLayouts/slideLayout1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"/>"#);
    xml.push_str(r#"<Override PartName="/ppt/theme/theme1.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/>"#);
    for number in 1..=slide_count {
        let _ = write!(
            xml,
            r#"<Override PartName="/{}" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#,
            slide_part_name(number)
        );
    }
    xml.push_str(r#"<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>"#);
    xml.push_str(r#"<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>"#);
    xml.push_str("</Types>");
    xml
}

/// `ppt/presentation.xml` listing slides in deck order.
pub(crate) fn presentation_xml(slide_count: usize) -> String {
    let mut xml = String::with_capacity(1024 + slide_count * 48);
    xml.push_str(XML_DECL);
    let _ = write!(
        xml,
        r#"<p:presentation xmlns:a="{}" xmlns:r="{}" xmlns:p="{}" saveSubsetFonts="1">"#,
        NS_A, NS_R, NS_P
    );
    xml.push_str(r#"<p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>"#);
    xml.push_str("<p:sldIdLst>");
    for number in 1..=slide_count {
        let _ = write!(
            xml,
            r#"<p:sldId id="{}" r:id="{}"/>"#,
            FIRST_SLIDE_ID + number - 1,
            slide_rel_id(number)
        );
    }
    xml.push_str("</p:sldIdLst>");
    let _ = write!(
        xml,
        r#"<p:sldSz cx="{}" cy="{}" type="screen4x3"/><p:notesSz cx="6858000" cy="9144000"/>"#,
        SLIDE_WIDTH, SLIDE_HEIGHT
    );
    xml.push_str("<p:defaultTextStyle><a:defPPr><a:defRPr lang=\"en-US\"/></a:defPPr></p:defaultTextStyle>");
    xml.push_str("</p:presentation>");
    xml
}

/// `ppt/_rels/presentation.xml.rels`.
pub(crate) fn presentation_rels(slide_count: usize) -> String {
    let mut xml = rels_header();
    relationship(&mut xml, "rId1", REL_SLIDE_MASTER, "slideMasters/slideMaster1.xml");
    relationship(&mut xml, "rId2", REL_THEME, "theme/theme1.xml");
    for number in 1..=slide_count {
        relationship(
            &mut xml,
            &slide_rel_id(number),
            REL_SLIDE,
            &format!("slides/slide{}.xml", number),
        );
    }
    xml.push_str("</Relationships>");
    xml
}

/// Drop characters XML 1.0 cannot carry, then escape markup.
pub(crate) fn xml_text(text: &str) -> String {
    let clean: String = text
        .chars()
        .filter(|&c| match c {
            '\t' | '\n' | '\r' => true,
            '\u{FFFE}' | '\u{FFFF}' => false,
            c => c >= ' ',
        })
        .collect();
    escape(clean.as_str()).into_owned()
}

/// `docProps/core.xml`. No timestamps, so output stays reproducible.
pub(crate) fn core_props(title: &str) -> String {
    let mut xml = String::with_capacity(512);
    xml.push_str(XML_DECL);
    xml.push_str(r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#);
    let _ = write!(xml, "<dc:title>{}</dc:title>", xml_text(title));
    xml.push_str("<dc:creator>SmartPPT</dc:creator>");
    xml.push_str("</cp:coreProperties>");
    xml
}

/// `docProps/app.xml`.
pub(crate) fn app_props(slide_count: usize) -> String {
    format!(
        concat!(
            "{}",
            r#"<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">"#,
            "<Application>SmartPPT</Application>",
            "<PresentationFormat>On-screen Show (4:3)</PresentationFormat>",
            "<Slides>{}</Slides>",
            "</Properties>"
        ),
        XML_DECL, slide_count
    )
}

const SLIDE_MASTER: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<p:sldMaster xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">"#,
    "<p:cSld><p:bg><p:bgRef idx=\"1001\"><a:schemeClr val=\"bg1\"/></p:bgRef></p:bg><p:spTree>",
    r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>"#,
    r#"<p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#,
    r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="Title Placeholder 1"/><p:cNvSpPr><a:spLocks noGrp="1"/></p:cNvSpPr><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr>"#,
    r#"<p:spPr><a:xfrm><a:off x="457200" y="274638"/><a:ext cx="8229600" cy="1143000"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr>"#,
    r#"<p:txBody><a:bodyPr vert="horz" lIns="91440" tIns="45720" rIns="91440" bIns="45720" rtlCol="0" anchor="ctr"><a:normAutofit/></a:bodyPr><a:lstStyle/><a:p><a:r><a:rPr lang="en-US"/><a:t>Click to edit Master title style</a:t></a:r></a:p></p:txBody></p:sp>"#,
    r#"<p:sp><p:nvSpPr><p:cNvPr id="3" name="Text Placeholder 2"/><p:cNvSpPr><a:spLocks noGrp="1"/></p:cNvSpPr><p:nvPr><p:ph type="body" idx="1"/></p:nvPr></p:nvSpPr>"#,
    r#"<p:spPr><a:xfrm><a:off x="457200" y="1600200"/><a:ext cx="8229600" cy="4525963"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr>"#,
    r#"<p:txBody><a:bodyPr vert="horz" lIns="91440" tIns="45720" rIns="91440" bIns="45720" rtlCol="0"><a:normAutofit/></a:bodyPr><a:lstStyle/><a:p><a:pPr lvl="0"/><a:r><a:rPr lang="en-US"/><a:t>Click to edit Master text styles</a:t></a:r></a:p></p:txBody></p:sp>"#,
    "</p:spTree></p:cSld>",
    r#"<p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/>"#,
    r#"<p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst>"#,
    "<p:txStyles>",
    r#"<p:titleStyle><a:lvl1pPr algn="l" defTabSz="914400" rtl="0" eaLnBrk="1" latinLnBrk="0" hangingPunct="1"><a:spcBef><a:spcPct val="0"/></a:spcBef><a:buNone/><a:defRPr sz="3600" kern="1200"><a:solidFill><a:schemeClr val="tx1"/></a:solidFill><a:latin typeface="+mj-lt"/><a:ea typeface="+mj-ea"/><a:cs typeface="+mj-cs"/></a:defRPr></a:lvl1pPr></p:titleStyle>"#,
    "<p:bodyStyle>",
    r#"<a:lvl1pPr marL="342900" indent="-342900" algn="l" defTabSz="914400" rtl="0" eaLnBrk="1" latinLnBrk="0" hangingPunct="1"><a:spcBef><a:spcPct val="20000"/></a:spcBef><a:buFont typeface="Arial"/><a:buChar char="&#8226;"/><a:defRPr sz="2400" kern="1200"><a:solidFill><a:schemeClr val="tx1"/></a:solidFill><a:latin typeface="+mn-lt"/><a:ea typeface="+mn-ea"/><a:cs typeface="+mn-cs"/></a:defRPr></a:lvl1pPr>"#,
    r#"<a:lvl2pPr marL="742950" indent="-285750" algn="l" defTabSz="914400" rtl="0" eaLnBrk="1" latinLnBrk="0" hangingPunct="1"><a:spcBef><a:spcPct val="20000"/></a:spcBef><a:buFont typeface="Arial"/><a:buChar char="&#8211;"/><a:defRPr sz="2000" kern="1200"><a:solidFill><a:schemeClr val="tx1"/></a:solidFill><a:latin typeface="+mn-lt"/><a:ea typeface="+mn-ea"/><a:cs typeface="+mn-cs"/></a:defRPr></a:lvl2pPr>"#,
    "</p:bodyStyle>",
    r#"<p:otherStyle><a:defPPr><a:defRPr lang="en-US"/></a:defPPr></p:otherStyle>"#,
    "</p:txStyles>",
    "</p:sldMaster>"
);

const SLIDE_LAYOUT: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<p:sldLayout xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" type="obj" preserve="1">"#,
    r#"<p:cSld name="Title and Content"><p:spTree>"#,
    r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>"#,
    r#"<p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#,
    r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="Title 1"/><p:cNvSpPr><a:spLocks noGrp="1"/></p:cNvSpPr><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:lstStyle/><a:p><a:r><a:rPr lang="en-US"/><a:t>Click to edit Master title style</a:t></a:r></a:p></p:txBody></p:sp>"#,
    r#"<p:sp><p:nvSpPr><p:cNvPr id="3" name="Content Placeholder 2"/><p:cNvSpPr><a:spLocks noGrp="1"/></p:cNvSpPr><p:nvPr><p:ph idx="1"/></p:nvPr></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:lstStyle/><a:p><a:pPr lvl="0"/><a:r><a:rPr lang="en-US"/><a:t>Click to edit Master text styles</a:t></a:r></a:p></p:txBody></p:sp>"#,
    "</p:spTree></p:cSld>",
    "<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr>",
    "</p:sldLayout>"
);

const THEME: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office Theme"><a:themeElements>"#,
    r#"<a:clrScheme name="Office">"#,
    r#"<a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1><a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1>"#,
    r#"<a:dk2><a:srgbClr val="1F497D"/></a:dk2><a:lt2><a:srgbClr val="EEECE1"/></a:lt2>"#,
    r#"<a:accent1><a:srgbClr val="4F81BD"/></a:accent1><a:accent2><a:srgbClr val="C0504D"/></a:accent2>"#,
    r#"<a:accent3><a:srgbClr val="9BBB59"/></a:accent3><a:accent4><a:srgbClr val="8064A2"/></a:accent4>"#,
    r#"<a:accent5><a:srgbClr val="4BACC6"/></a:accent5><a:accent6><a:srgbClr val="F79646"/></a:accent6>"#,
    r#"<a:hlink><a:srgbClr val="0000FF"/></a:hlink><a:folHlink><a:srgbClr val="800080"/></a:folHlink>"#,
    "</a:clrScheme>",
    r#"<a:fontScheme name="Office">"#,
    r#"<a:majorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont>"#,
    r#"<a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont>"#,
    "</a:fontScheme>",
    r#"<a:fmtScheme name="Office">"#,
    r#"<a:fillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:fillStyleLst>"#,
    r#"<a:lnStyleLst><a:ln w="9525"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="25400"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="38100"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln></a:lnStyleLst>"#,
    r#"<a:effectStyleLst><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle></a:effectStyleLst>"#,
    r#"<a:bgFillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:bgFillStyleLst>"#,
    "</a:fmtScheme>",
    "</a:themeElements><a:objectDefaults/><a:extraClrSchemeLst/></a:theme>"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slide_ids_follow_master_and_theme() {
        assert_eq!(slide_rel_id(1), "rId3");
        assert_eq!(slide_part_name(4), "ppt/slides/slide4.xml");

        let xml = presentation_xml(2);
        assert!(xml.contains(r#"<p:sldId id="256" r:id="rId3"/>"#));
        assert!(xml.contains(r#"<p:sldId id="257" r:id="rId4"/>"#));
        assert!(xml.contains(r#"cx="9144000" cy="6858000""#));
    }

    #[test]
    fn test_content_types_list_every_slide() {
        let xml = content_types(3);
        for n in 1..=3 {
            assert!(xml.contains(&format!("/ppt/slides/slide{}.xml", n)));
        }
        assert!(!xml.contains("slide4.xml"));
    }

    #[test]
    fn test_core_props_escape_title() {
        let xml = core_props("Fish & Chips <2024>");
        assert!(xml.contains("<dc:title>Fish &amp; Chips &lt;2024&gt;</dc:title>"));

        let xml = core_props("Ocean\u{1}Deck");
        assert!(xml.contains("<dc:title>OceanDeck</dc:title>"));
    }

    #[test]
    fn test_xml_text_drops_non_xml_characters() {
        assert_eq!(xml_text("a\u{0}b\u{7}c & d"), "abc &amp; d");
        assert_eq!(xml_text("tab\tok\u{FFFE}\u{FFFF}"), "tab\tok");
        assert_eq!(xml_text("海洋 🌊"), "海洋 🌊");
    }
}
