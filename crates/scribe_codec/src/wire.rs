//! Wire-level constants and the output writer seam.

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::CodecError;

pub(crate) const DOC_ROOT: &str = "Scripture";
pub(crate) const ATTR_SECRETS: &str = "secretsIncluded";
pub(crate) const ATTR_TAG: &str = "tag";
pub(crate) const ATTR_DIGEST: &str = "digest";
pub(crate) const ATTR_ID: &str = "id";
pub(crate) const ATTR_REF: &str = "ref";

// -----------------------------------------------------------------------------
// XmlOut

/// Thin event writer over an in-memory buffer.
pub(crate) struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    pub fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
        }
    }

    pub fn decl(&mut self) -> Result<(), CodecError> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(())
    }

    pub fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), CodecError> {
        let mut start = BytesStart::new(name);
        for (key, value) in attrs {
            start.push_attribute((*key, *value));
        }
        self.writer.write_event(Event::Start(start))?;
        Ok(())
    }

    /// Writes a self-closed element.
    pub fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), CodecError> {
        let mut start = BytesStart::new(name);
        for (key, value) in attrs {
            start.push_attribute((*key, *value));
        }
        self.writer.write_event(Event::Empty(start))?;
        Ok(())
    }

    pub fn text(&mut self, text: &str) -> Result<(), CodecError> {
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        Ok(())
    }

    pub fn end(&mut self, name: &str) -> Result<(), CodecError> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    /// A complete element with text content.
    pub fn leaf(&mut self, name: &str, text: &str) -> Result<(), CodecError> {
        self.start(name, &[])?;
        self.text(text)?;
        self.end(name)
    }

    pub fn finish(self) -> Result<String, CodecError> {
        Ok(String::from_utf8(self.writer.into_inner())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_and_text_are_escaped() {
        let mut out = XmlOut::new();
        out.start("Leaf", &[("note", "a \"b\" & <c>")]).unwrap();
        out.text("x < y").unwrap();
        out.end("Leaf").unwrap();
        let text = out.finish().unwrap();
        assert!(text.contains("&lt;c&gt;"));
        assert!(text.contains("x &lt; y"));
    }

    #[test]
    fn empty_elements_self_close() {
        let mut out = XmlOut::new();
        out.empty("Nothing", &[]).unwrap();
        assert_eq!(out.finish().unwrap(), "<Nothing/>");
    }
}
