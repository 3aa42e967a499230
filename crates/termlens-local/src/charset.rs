//! Character-set detection for fetched HTML.
//!
//! Search pages for some regions are still served as Shift_JIS / EUC-JP / ISO-2022-JP.
//! Decoding those as UTF-8 does not fail loudly, it silently produces mojibake, so the
//! charset is resolved explicitly before any text reaches the model.

use encoding_rs::{Encoding, EUC_JP, ISO_2022_JP, SHIFT_JIS, UTF_8};

/// Where the chosen encoding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharsetSource {
    Header,
    Meta,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedCharset {
    pub encoding: &'static Encoding,
    pub source: CharsetSource,
}

/// Map a charset label to an encoding. Only the labels the search surface is known to emit
/// are recognized; anything else is treated as absent.
pub fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    let l = label
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_ascii_lowercase();
    match l.as_str() {
        "shift_jis" | "shift-jis" | "shiftjis" => Some(SHIFT_JIS),
        "euc-jp" => Some(EUC_JP),
        "iso-2022-jp" => Some(ISO_2022_JP),
        "utf-8" => Some(UTF_8),
        _ => None,
    }
}

fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle.as_bytes()))
}

/// `charset=` parameter of a `Content-Type` header value.
pub fn charset_from_content_type(content_type: &str) -> Option<&'static Encoding> {
    let at = find_ascii_ci(content_type, "charset=")?;
    let rest = &content_type[at + "charset=".len()..];
    let value = rest
        .split(|c: char| c == ';' || c == ',' || c.is_whitespace())
        .next()
        .unwrap_or("");
    encoding_for_label(value)
}

/// First `charset=` occurrence in the document itself (typically a `<meta>` tag).
///
/// The body is viewed as lossy ASCII: non-ASCII bytes cannot be part of a charset label,
/// so replacing them keeps offsets aligned without guessing an encoding first.
pub fn charset_from_body(bytes: &[u8]) -> Option<&'static Encoding> {
    let ascii: String = bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect();
    let at = find_ascii_ci(&ascii, "charset=")?;
    let rest = ascii[at + "charset=".len()..].trim_start_matches(['"', '\'']);
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(rest.len());
    encoding_for_label(&rest[..end])
}

/// Resolve the encoding of a response: header, then document, then UTF-8.
pub fn detect(content_type: Option<&str>, body: &[u8]) -> DetectedCharset {
    if let Some(encoding) = content_type.and_then(charset_from_content_type) {
        return DetectedCharset {
            encoding,
            source: CharsetSource::Header,
        };
    }
    if let Some(encoding) = charset_from_body(body) {
        return DetectedCharset {
            encoding,
            source: CharsetSource::Meta,
        };
    }
    DetectedCharset {
        encoding: UTF_8,
        source: CharsetSource::Default,
    }
}

/// Strict decode: malformed input is an error, never replacement characters.
pub fn decode(bytes: &[u8], encoding: &'static Encoding) -> Result<String, String> {
    let bytes = if encoding == UTF_8 {
        bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes)
    } else {
        bytes
    };
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|s| s.into_owned())
        .ok_or_else(|| format!("body is not valid {}", encoding.name()))
}
