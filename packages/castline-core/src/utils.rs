//! General utilities shared across the crate.

use std::time::{SystemTime, UNIX_EPOCH};

use quick_xml::events::Event;
use quick_xml::reader::Reader;

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// XML Parsing Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Extracts text content from the first occurrence of an XML element.
///
/// Searches by local name (namespace prefixes are ignored) and returns the
/// trimmed text with HTML entities decoded. Empty elements yield `None`.
///
/// # Example
/// ```ignore
/// let xml = r#"<device-info><model-name>Roku Ultra</model-name></device-info>"#;
/// assert_eq!(extract_xml_text(xml, "model-name"), Some("Roku Ultra".to_string()));
/// ```
pub fn extract_xml_text(xml: &str, element_name: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let target_bytes = element_name.as_bytes();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == target_bytes => {
                return reader.read_text(e.name()).ok().and_then(clean_xml_text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::trace!("[XML] Parse error while looking for <{}>: {:?}", element_name, e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    None
}

/// Trims raw element text and decodes HTML entities. Blank text yields `None`.
pub fn clean_xml_text(raw: impl AsRef<str>) -> Option<String> {
    let decoded = html_escape::decode_html_entities(raw.as_ref().trim());
    (!decoded.is_empty()).then(|| decoded.into_owned())
}
