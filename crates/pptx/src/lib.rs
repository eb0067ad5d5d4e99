//! PPTX (Office Open XML) backend for SmartPPT.
//!
//! Renders outlines into `.pptx` packages (ZIP archives of PresentationML
//! parts) and reads decks back into plain text.

mod package;
pub mod reader;
pub mod writer;

pub use reader::{read_presentation, ExtractedSlide, Paragraph, PptxReader, ReadError};
pub use writer::{PptxRenderer, RenderWarning, RenderedDocument, TextField};
