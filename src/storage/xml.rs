//! XML checks and canonical serialisation for forced-XML stores.

use crate::error::{Result, StoreError};
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::{Reader, Writer};

/// UTF-8 byte order mark, dropped before parsing.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Parses `content` as a single-rooted XML document and re-serialises it as
/// UTF-8 with a fresh declaration, indented when `pretty` is set.
///
/// Only UTF-8 (or its ASCII subset) is accepted; any other declared encoding
/// is a format error rather than being relabelled.
pub fn normalize(content: &[u8], pretty: bool) -> Result<Vec<u8>> {
    let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);
    std::str::from_utf8(content)
        .map_err(|e| StoreError::format(format!("XML content is not valid UTF-8: {}", e)))?;

    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(pretty);

    let mut writer = if pretty {
        Writer::new_with_indent(Vec::with_capacity(content.len()), b' ', 2)
    } else {
        Writer::new(Vec::with_capacity(content.len()))
    };
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| StoreError::format(format!("Failed to write XML declaration: {}", e)))?;

    let mut depth = 0usize;
    let mut seen_root = false;
    loop {
        let event = reader.read_event().map_err(|e| {
            StoreError::format(format!(
                "Malformed XML at position {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match &event {
            Event::Eof => break,
            Event::Decl(decl) => {
                check_declared_encoding(decl)?;
                continue;
            }
            Event::Start(element) | Event::Empty(element) => {
                if depth == 0 && seen_root {
                    return Err(StoreError::format("XML document has more than one root element"));
                }
                check_attributes(element)?;
                seen_root = true;
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
            }
            Event::Text(text) if depth == 0 => {
                if text.iter().any(|b| !b.is_ascii_whitespace()) {
                    return Err(StoreError::format("Text content outside of the root element"));
                }
                continue;
            }
            Event::Text(text) => {
                text.unescape()
                    .map_err(|e| StoreError::format(format!("Invalid XML text: {}", e)))?;
            }
            Event::CData(_) if depth == 0 => {
                return Err(StoreError::format("CDATA outside of the root element"));
            }
            _ => {}
        }

        writer
            .write_event(event)
            .map_err(|e| StoreError::format(format!("Failed to serialise XML: {}", e)))?;
    }

    if !seen_root {
        return Err(StoreError::format("Content has no root element"));
    }
    if depth != 0 {
        return Err(StoreError::format("XML document ends inside an open element"));
    }

    let mut bytes = writer.into_inner();
    if pretty {
        bytes.push(b'\n');
    }
    Ok(bytes)
}

fn check_declared_encoding(decl: &BytesDecl<'_>) -> Result<()> {
    let Some(encoding) = decl.encoding() else {
        return Ok(());
    };
    let encoding = encoding
        .map_err(|e| StoreError::format(format!("Invalid XML declaration: {}", e)))?;
    let name = String::from_utf8_lossy(&encoding).to_ascii_lowercase();
    match name.as_str() {
        "utf-8" | "utf8" | "us-ascii" | "ascii" => Ok(()),
        _ => Err(StoreError::format(format!(
            "Unsupported XML encoding '{}', only UTF-8 is stored",
            name
        ))),
    }
}

/// Rejects unquoted, valueless and duplicate attributes and bad entity
/// references in attribute values.
fn check_attributes(element: &BytesStart<'_>) -> Result<()> {
    let mut attributes = element.attributes();
    attributes.with_checks(true);
    for attribute in attributes {
        let attribute = attribute
            .map_err(|e| StoreError::format(format!("Malformed XML attribute: {}", e)))?;
        attribute
            .unescape_value()
            .map_err(|e| StoreError::format(format!("Invalid XML attribute value: {}", e)))?;
    }
    Ok(())
}

/// Local name of the root element, or `None` if `content` is not XML.
pub fn root_element_name(content: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(content);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pretty() {
        let out = normalize(b"<root><a x=\"1\">text</a><b/></root>", true).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("\n  <a x=\"1\">text</a>"));
        assert!(text.contains("\n  <b/>"));
    }

    #[test]
    fn test_normalize_raw_replaces_declaration() {
        let input = b"<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"yes\"?><root> <a/> </root>";
        let out = normalize(input, false).unwrap();
        assert_eq!(
            out,
            b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><root> <a/> </root>".to_vec()
        );
    }

    #[test]
    fn test_strips_byte_order_mark() {
        let out = normalize(b"\xEF\xBB\xBF<root>caf\xC3\xA9</root>", false).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><root>caf\u{e9}</root>"
        );
    }

    #[test]
    fn test_rejects_other_encodings() {
        for bad in [
            &b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>caf\xE9</a>"[..],
            &b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>cafe</a>"[..],
            &b"<a>caf\xE9</a>"[..],
        ] {
            assert!(
                matches!(normalize(bad, false), Err(StoreError::Format(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize(b"<root><child>v</child></root>", true).unwrap();
        let twice = normalize(&once, true).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_rejects_non_xml() {
        for bad in [
            &b"plain text"[..],
            &b""[..],
            &b"<a><b></a>"[..],
            &b"<a/><b/>"[..],
            &b"<open>"[..],
            &[0x89, 0x50, 0x4e, 0x47, 0x00, 0x01][..],
            &b"<a b=c/>"[..],
            &b"<a foo/>"[..],
            &b"<a x=\"1\" x=\"2\"/>"[..],
            &b"<a x=\"&bogus;\"/>"[..],
            &b"<a>&</a>"[..],
            &b"<a>&undefined;</a>"[..],
        ] {
            assert!(
                matches!(normalize(bad, true), Err(StoreError::Format(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_root_element_name() {
        assert_eq!(
            root_element_name(b"<?xml version=\"1.0\"?><mods:mods xmlns:mods=\"x\"/>"),
            Some("mods".to_string())
        );
        assert_eq!(root_element_name(b"binary"), None);
    }
}
