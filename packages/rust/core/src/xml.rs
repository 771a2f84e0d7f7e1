//! Text-level XML helpers shared by every renderer.

use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::events::{BytesCData, Event};

/// Declaration every generated document starts with.
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Escape the five XML metacharacters.
pub fn escape_xml(text: &str) -> String {
    escape(text).into_owned()
}

/// Wrap `text` in a CDATA section.
///
/// An embedded `]]>` is split across two sections so the result always parses.
pub fn cdata(text: &str) -> String {
    let mut writer = Writer::new(Vec::with_capacity(text.len() + 12));
    for section in cdata_sections(text) {
        if writer.write_event(Event::CData(BytesCData::new(section))).is_err() {
            break;
        }
    }
    String::from_utf8(writer.into_inner()).unwrap_or_default()
}

/// Split `text` so no section contains `]]>`: `a]]>b` becomes `a]]` and `>b`.
fn cdata_sections(text: &str) -> Vec<String> {
    let parts: Vec<&str> = text.split("]]>").collect();
    let last = parts.len() - 1;
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let lead = if i == 0 { "" } else { ">" };
            let tail = if i == last { "" } else { "]]" };
            format!("{lead}{part}{tail}")
        })
        .collect()
}

/// Prepend the XML declaration unless the document already has one.
pub fn ensure_declaration(document: String) -> String {
    if document.trim_start().starts_with("<?xml") {
        document
    } else {
        format!("{XML_DECLARATION}\n{document}")
    }
}
