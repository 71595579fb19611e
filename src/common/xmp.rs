//! XMP packets. The packet is an XML/RDF document; it is extracted as text and escaped for
//! embedding into HTML, but not parsed.

use std::str;

use log::{debug, warn};

use crate::types::Anomaly;

/// Namespace identifier prefixing an XMP packet inside a JPEG APP1 segment.
pub const XMP_IDENTIFIER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Metadata {
    /// The packet text with HTML special characters replaced by entities.
    pub packet: String,
    /// Length of the raw packet in bytes.
    pub len: usize,
    pub notes: Vec<Anomaly>
}

/// Extracts an XMP packet located at absolute offset `base`, stripping the JPEG namespace
/// identifier if present.
pub fn read_xmp(data: &[u8], base: usize) -> Metadata {
    let (prefix_len, data) = match data.strip_prefix(XMP_IDENTIFIER) {
        Some(packet) => (XMP_IDENTIFIER.len(), packet),
        None => (0, data)
    };
    let start = base + prefix_len;

    let mut notes = Vec::new();
    let text = match str::from_utf8(data) {
        Ok(s) => s.into(),
        Err(e) => {
            warn!("XMP packet at {} is not valid UTF-8: {}", start, e);
            notes.push(Anomaly::FormatInvariant {
                offset: start + e.valid_up_to(),
                context: "XMP packet is not valid UTF-8".into()
            });
            String::from_utf8_lossy(data)
        }
    };
    debug!("XMP packet at {}, {} bytes", start, data.len());

    Metadata {
        packet: escape_html(&text),
        len: data.len(),
        notes: notes
    }
}

pub fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + s.len() / 8);
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#039;"),
            c => result.push(c)
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use crate::types::Anomaly;

    use super::{escape_html, read_xmp, XMP_IDENTIFIER};

    const PACKET: &str = "<x:xmpmeta xmlns:x='adobe:ns:meta/'>a & b</x:xmpmeta>";

    #[test]
    fn test_escape() {
        assert_eq!(
            escape_html(PACKET),
            "&lt;x:xmpmeta xmlns:x=&#039;adobe:ns:meta/&#039;&gt;a &amp; b&lt;/x:xmpmeta&gt;"
        );
        assert_eq!(escape_html("\"plain\""), "&quot;plain&quot;");
    }

    #[test]
    fn test_raw_packet() {
        let md = read_xmp(PACKET.as_bytes(), 0);
        assert_eq!(md.len, PACKET.len());
        assert_eq!(md.packet, escape_html(PACKET));
        assert!(md.notes.is_empty());
    }

    #[test]
    fn test_jpeg_identifier_is_stripped() {
        let mut data = XMP_IDENTIFIER.to_vec();
        data.extend_from_slice(PACKET.as_bytes());

        let md = read_xmp(&data, 0);
        assert_eq!(md.len, PACKET.len());
        assert!(md.packet.starts_with("&lt;x:xmpmeta"));
    }

    #[test]
    fn test_invalid_utf8() {
        let md = read_xmp(b"<a>\xff</a>", 100);
        assert_eq!(md.packet, "&lt;a&gt;\u{fffd}&lt;/a&gt;");
        assert_eq!(md.notes, vec![Anomaly::FormatInvariant {
            offset: 103,
            context: "XMP packet is not valid UTF-8".into()
        }]);
    }

    #[test]
    fn test_invalid_utf8_after_jpeg_identifier() {
        let mut data = XMP_IDENTIFIER.to_vec();
        data.extend_from_slice(b"<a>\xff");

        let md = read_xmp(&data, 100);
        assert_eq!(md.len, 4);
        assert_eq!(md.notes, vec![Anomaly::FormatInvariant {
            offset: 100 + XMP_IDENTIFIER.len() + 3,
            context: "XMP packet is not valid UTF-8".into()
        }]);
        assert_eq!(md.notes[0].offset(), 132);
    }
}
